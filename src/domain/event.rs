//! Lifecycle events and the normalized notifications derived from them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::transaction::{Transaction, TransactionStatus};

pub const FIELD_TYPE: &str = "type";
pub const FIELD_DATA: &str = "data";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Kind of entry appended to the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Review,
    Approved,
    Rejected,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Created,
        EventType::Review,
        EventType::Approved,
        EventType::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "transaction.created",
            EventType::Review => "transaction.review",
            EventType::Approved => "transaction.approved",
            EventType::Rejected => "transaction.rejected",
        }
    }

    /// Status the transaction holds once this event has been appended.
    pub fn status(&self) -> TransactionStatus {
        match self {
            EventType::Created => TransactionStatus::Pending,
            EventType::Review => TransactionStatus::Review,
            EventType::Approved => TransactionStatus::Approved,
            EventType::Rejected => TransactionStatus::Rejected,
        }
    }

    /// Type carried by the broadcast notification. Newly created transactions
    /// surface to live viewers as pending work.
    pub fn notification_type(&self) -> &'static str {
        match self {
            EventType::Created => "transaction.pending",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// Flat field set as stored on either log. Every field is optional on read
/// because entries written by other producers may be partial.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRecord {
    pub kind: Option<String>,
    pub data: Option<String>,
    pub status: Option<String>,
    pub timestamp: i64,
}

impl LogRecord {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(4);
        if let Some(kind) = &self.kind {
            fields.push((FIELD_TYPE, kind.clone()));
        }
        if let Some(data) = &self.data {
            fields.push((FIELD_DATA, data.clone()));
        }
        if let Some(status) = &self.status {
            fields.push((FIELD_STATUS, status.clone()));
        }
        fields.push((FIELD_TIMESTAMP, self.timestamp.to_string()));
        fields
    }

    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, String)>,
    {
        let mut record = LogRecord::default();
        for (key, value) in fields {
            match key.as_ref() {
                FIELD_TYPE => record.kind = Some(value),
                FIELD_DATA => record.data = Some(value),
                FIELD_STATUS => record.status = Some(value),
                FIELD_TIMESTAMP => record.timestamp = value.parse().unwrap_or_default(),
                _ => {}
            }
        }
        record
    }

    pub fn event_type(&self) -> Option<EventType> {
        self.kind.as_deref().and_then(|kind| kind.parse().ok())
    }
}

/// Typed event produced by the API layer after a successful state change.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub kind: EventType,
    pub transaction: Transaction,
    pub timestamp: i64,
}

impl LifecycleEvent {
    pub fn new(kind: EventType, transaction: Transaction) -> Self {
        Self {
            kind,
            transaction,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn to_record(&self) -> Result<LogRecord, serde_json::Error> {
        Ok(LogRecord {
            kind: Some(self.kind.as_str().to_string()),
            data: Some(serde_json::to_string(&self.transaction)?),
            status: None,
            timestamp: self.timestamp,
        })
    }
}

/// Self-contained entry on the broadcast log: either a full snapshot or an
/// explicit status token, never a reference that needs a store lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub timestamp: i64,
}

impl Notification {
    pub fn with_payload(kind: &str, data: Value) -> Self {
        Self {
            kind: Some(kind.to_string()),
            data: Some(data),
            status: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn status_only(kind: Option<&str>, status: &str) -> Self {
        Self {
            kind: kind.map(str::to_string),
            data: None,
            status: Some(status.to_string()),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            kind: self.kind.clone(),
            data: self.data.as_ref().map(Value::to_string),
            status: self.status.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn from_record(record: &LogRecord) -> Self {
        let data = record.data.as_deref().map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        });
        Self {
            kind: record.kind.clone(),
            data,
            status: record.status.clone(),
            timestamp: record.timestamp,
        }
    }

    /// Body of a live push frame: the JSON envelope when a payload is present,
    /// otherwise the bare status token.
    pub fn frame(&self) -> String {
        if self.data.is_some() {
            if let Ok(json) = serde_json::to_string(self) {
                return json;
            }
        }
        self.status.clone().unwrap_or_else(|| "unknown".to_string())
    }
}
