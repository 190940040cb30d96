mod broker;
mod trigger;
mod types;

pub use broker::{NotificationBroker, QueueOrder};
pub use trigger::TriggerOrchestrator;
pub use types::{EventData, Notification};
