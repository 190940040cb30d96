//! Live fan-out: the publish side used by the trigger and the listener side
//! that reacts to every broadcast notification.

mod handler;
mod listener;
mod publisher;

pub use handler::{handler_fn, FnHandler, ForwardingHandler, LoggingHandler, MessageHandler};
pub use listener::{DispatchReport, ListenerStatsSnapshot, NotificationListener};
pub use publisher::PublishChannel;
