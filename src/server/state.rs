use std::sync::Arc;
use std::time::Instant;

use crate::channel::PublishChannel;
use crate::config::Settings;
use crate::notification::{NotificationBroker, TriggerOrchestrator};
use crate::store::BackingStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn BackingStore>,
    pub broker: Arc<NotificationBroker>,
    pub channel: Arc<PublishChannel>,
    pub orchestrator: Arc<TriggerOrchestrator>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the core around an already created store. The store's lifecycle
    /// stays with the caller.
    pub fn new(settings: Settings, store: Arc<dyn BackingStore>) -> Self {
        let broker = Arc::new(NotificationBroker::with_queue_order(
            store.clone(),
            settings.store.queue_order,
        ));
        let channel = Arc::new(PublishChannel::new(
            store.clone(),
            settings.listener.topic.clone(),
        ));
        let orchestrator = Arc::new(TriggerOrchestrator::new(broker.clone(), channel.clone()));

        Self {
            settings: Arc::new(settings),
            store,
            broker,
            channel,
            orchestrator,
            started_at: Instant::now(),
        }
    }
}
