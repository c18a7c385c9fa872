use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use thiserror::Error;

/// Queue envelope announcing a newly created item: `{"type": "item", "id": 42}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Item,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("message body is not JSON: {0}")]
    NotJson(String),
    #[error("'type' or 'id' field missing in message")]
    MissingField,
    #[error("unsupported message type '{0}'")]
    UnsupportedType(String),
    #[error("'id' is not an integer: {0}")]
    InvalidId(String),
}

impl NotificationEvent {
    pub fn item_created(id: i64) -> Self {
        Self {
            kind: EventKind::Item,
            id,
        }
    }

    pub fn to_body(&self) -> String {
        // Serializing a two-field struct of plain values cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"type":"item","id":{}}}"#, self.id))
    }

    /// Parses a raw queue body, distinguishing the ways a message can be malformed.
    pub fn parse(body: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| EnvelopeError::NotJson(e.to_string()))?;

        let (Some(kind), Some(id)) = (value.get("type"), value.get("id")) else {
            return Err(EnvelopeError::MissingField);
        };

        let kind = match kind.as_str() {
            Some("item") => EventKind::Item,
            _ => return Err(EnvelopeError::UnsupportedType(kind.to_string())),
        };
        let id = id
            .as_i64()
            .ok_or_else(|| EnvelopeError::InvalidId(id.to_string()))?;

        Ok(Self { kind, id })
    }
}

/// A message received from the notification queue.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct QueueMessage {
    pub id: i64,
    pub body: String,
    pub receive_count: i32,
}
