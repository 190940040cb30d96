use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::store::keys::is_reserved_detail_id;
use crate::store::HashFields;

/// Canonical notification record.
///
/// Serialized field names (`notificationId`, `eventType`, `userId`,
/// `kycDocumentId`, `updateDetails`, `timestamp`) are shared with other
/// producers and consumers of the queue and channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Detail store key; never empty
    #[serde(alias = "eventId")]
    pub notification_id: String,
    /// Category tag, e.g. "KYC_UPDATE"
    pub event_type: String,
    pub user_id: String,
    /// Domain correlation id (KYC document id for KYC events)
    #[serde(
        rename = "kycDocumentId",
        alias = "referenceId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub update_details: Value,
    /// Creation time in milliseconds since epoch
    pub timestamp: i64,
}

/// Raw domain event accepted by the trigger. Every field is optional on the
/// wire; `eventType` and `userId` are checked when the event is turned into
/// a [`Notification`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventData {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    /// Caller-chosen id; generated when absent
    #[serde(alias = "notificationId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(
        rename = "kycDocumentId",
        alias = "referenceId",
        skip_serializing_if = "Option::is_none"
    )]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub update_details: Value,
}

impl EventData {
    pub fn new(event_type: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn update_details(mut self, details: impl Into<Value>) -> Self {
        self.update_details = details.into();
        self
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(NotificationError::InvalidEvent(format!(
            "missing required field {}",
            field
        ))),
    }
}

const UPDATE_DETAILS_FIELD: &str = "updateDetails";

/// Check that `notification_id` addresses its own detail record: non-blank
/// and not colliding with the queue, channel or subscriber keys.
pub(crate) fn detail_id(notification_id: &str) -> Result<&str> {
    if notification_id.trim().is_empty() {
        return Err(NotificationError::InvalidKey(
            "notification id must not be empty".to_string(),
        ));
    }
    if is_reserved_detail_id(notification_id) {
        return Err(NotificationError::InvalidKey(format!(
            "notification id {:?} collides with a reserved key",
            notification_id
        )));
    }
    Ok(notification_id)
}

impl Notification {
    /// Build the canonical record for an event.
    ///
    /// Fails with `InvalidEvent` when `eventType` or `userId` is missing or
    /// blank, and with `InvalidKey` when the event's own id is reserved. The
    /// id is the event's own `eventId` when non-blank, otherwise a fresh
    /// UUID v4.
    pub fn from_event(event: EventData) -> Result<Self> {
        let event_type = required(event.event_type, "eventType")?;
        let user_id = required(event.user_id, "userId")?;

        let notification_id = match event.event_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                detail_id(&id)?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };

        Ok(Self {
            notification_id,
            event_type,
            user_id,
            reference_id: event.reference_id,
            update_details: event.update_details,
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Flatten into detail store fields: strings stay verbatim, other values
    /// are JSON-encoded, absent values are omitted. `updateDetails` is always
    /// JSON-encoded so its type survives the round trip.
    pub fn to_detail_fields(&self) -> Result<HashFields> {
        let mut fields = HashFields::new();
        if let Value::Object(map) = serde_json::to_value(self)? {
            for (name, value) in map {
                match value {
                    Value::Null => {}
                    other if name == UPDATE_DETAILS_FIELD => {
                        fields.insert(name, other.to_string());
                    }
                    Value::String(s) => {
                        fields.insert(name, s);
                    }
                    other => {
                        fields.insert(name, other.to_string());
                    }
                }
            }
        }
        Ok(fields)
    }

    /// Rebuild a notification from its detail record. Returns `None` when the
    /// record does not describe a notification (e.g. arbitrary stored fields).
    pub fn from_detail_fields(fields: &HashFields) -> Option<Self> {
        let mut map = Map::new();
        for (name, raw) in fields {
            let value = match name.as_str() {
                "timestamp" => Value::from(raw.parse::<i64>().ok()?),
                UPDATE_DETAILS_FIELD => decode_details(raw),
                _ => Value::String(raw.clone()),
            };
            map.insert(name.clone(), value);
        }
        serde_json::from_value(Value::Object(map)).ok()
    }
}

/// Details are JSON on write; text that is not JSON came from another writer
/// and is kept as a plain string.
fn decode_details(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
