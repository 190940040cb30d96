//! Key and topic names shared with every other producer and consumer of the
//! store. These strings are part of the wire contract and must not change.

/// Pub/Sub topic carrying live notifications
pub const NOTIFICATION_CHANNEL: &str = "notification:channel";

/// List holding pending notifications
pub const QUEUE_KEY: &str = "notification:queue";

/// Set of users subscribed to a notification type
pub fn subscribers_key(notification_type: &str) -> String {
    format!("notification:{}:subscribers", notification_type)
}

/// Hash holding the detail record of one notification
pub fn detail_key(notification_id: &str) -> String {
    format!("notification:{}", notification_id)
}

/// Whether `notification_id` would place its detail record on the queue,
/// the channel or a subscriber set.
pub fn is_reserved_detail_id(notification_id: &str) -> bool {
    let key = detail_key(notification_id);
    key == QUEUE_KEY || key == NOTIFICATION_CHANNEL || notification_id.ends_with(":subscribers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(subscribers_key("KYC_UPDATE"), "notification:KYC_UPDATE:subscribers");
        assert_eq!(detail_key("notification_id_123"), "notification:notification_id_123");
        assert_eq!(QUEUE_KEY, "notification:queue");
        assert_eq!(NOTIFICATION_CHANNEL, "notification:channel");
    }

    #[test]
    fn test_reserved_detail_ids() {
        assert!(is_reserved_detail_id("queue"));
        assert!(is_reserved_detail_id("channel"));
        assert!(is_reserved_detail_id("KYC_UPDATE:subscribers"));
        assert!(!is_reserved_detail_id("queue-1"));
        assert!(!is_reserved_detail_id("notification_id_123"));
    }
}
