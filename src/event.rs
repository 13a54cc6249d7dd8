use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{id, user::HackleUser};

/// A custom event tracked by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub key: String,
    pub value: Option<f64>,
    pub properties: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(key: impl Into<String>) -> Event {
        Event {
            key: key.into(),
            value: None,
            properties: HashMap::new(),
        }
    }

    pub fn property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_owned(), value.into());
        self
    }
}

/// A tracked event bound to the user who produced it. In-app message triggers are matched
/// against these.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    pub insert_id: String,
    pub timestamp: DateTime<Utc>,
    pub user: HackleUser,
    pub event: Event,
}

impl TrackEvent {
    pub fn new(event: Event, user: HackleUser, timestamp: DateTime<Utc>) -> TrackEvent {
        TrackEvent {
            insert_id: id::generate(),
            timestamp,
            user,
            event,
        }
    }
}
