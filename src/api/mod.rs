//! API layer - HTTP endpoint handlers organized by domain.

mod handlers;
mod health;
mod metrics;
mod routes;

pub use handlers::{
    get_notification_details, pop_from_queue, push_to_queue, subscribe_user, subscription_status,
    trigger_notification, unsubscribe_user, SubscriptionStatus,
};
pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
