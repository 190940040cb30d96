use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::handlers::{
    get_notification_details, pop_from_queue, push_to_queue, subscribe_user, subscription_status,
    trigger_notification, unsubscribe_user,
};
use super::health::health;
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    let v1 = Router::new()
        // Trigger & details
        .route("/notifications/trigger", post(trigger_notification))
        .route("/notifications/{notification_id}", get(get_notification_details))
        // Durable queue
        .route("/queue", post(push_to_queue))
        .route("/queue/pop", post(pop_from_queue))
        // Subscription registry
        .route(
            "/subscriptions/{notification_type}/{user_id}",
            put(subscribe_user)
                .delete(unsubscribe_user)
                .get(subscription_status),
        )
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", v1)
}
