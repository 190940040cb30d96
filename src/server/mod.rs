mod app;
mod middleware;
mod run;
mod state;

pub use app::create_app;
pub use middleware::api_key_auth;
pub use run::run_until;
pub use state::AppState;
