//! Storage contracts for in-app message impressions and "do not show again" markers, with
//! in-memory implementations.
use std::{collections::HashMap, sync::RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{model::InAppMessage, user::Identifiers};

/// Impressions kept per message.
pub const IMPRESSION_MAX_SIZE: usize = 100;

/// One presentation of a message, as seen by frequency capping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppMessageImpression {
    pub identifiers: Identifiers,
    pub timestamp: DateTime<Utc>,
}

pub trait InAppMessageImpressionStorage: Send + Sync {
    /// Impressions of the message, oldest first.
    fn get(&self, in_app_message: &InAppMessage) -> Vec<InAppMessageImpression>;
    fn set(&self, in_app_message: &InAppMessage, impressions: Vec<InAppMessageImpression>);

    /// Append an impression and drop the oldest ones beyond `max_size`, as one atomic step.
    fn append(
        &self,
        in_app_message: &InAppMessage,
        impression: InAppMessageImpression,
        max_size: usize,
    );
}

#[derive(Default)]
pub struct InMemoryImpressionStorage {
    impressions: RwLock<HashMap<i64, Vec<InAppMessageImpression>>>,
}

impl InMemoryImpressionStorage {
    pub fn new() -> Self {
        InMemoryImpressionStorage::default()
    }
}

impl InAppMessageImpressionStorage for InMemoryImpressionStorage {
    fn get(&self, in_app_message: &InAppMessage) -> Vec<InAppMessageImpression> {
        let impressions = self
            .impressions
            .read()
            .expect("thread holding impression lock should not panic");
        impressions
            .get(&in_app_message.id)
            .cloned()
            .unwrap_or_default()
    }

    fn set(&self, in_app_message: &InAppMessage, impressions: Vec<InAppMessageImpression>) {
        self.impressions
            .write()
            .expect("thread holding impression lock should not panic")
            .insert(in_app_message.id, impressions);
    }

    fn append(
        &self,
        in_app_message: &InAppMessage,
        impression: InAppMessageImpression,
        max_size: usize,
    ) {
        let mut all = self
            .impressions
            .write()
            .expect("thread holding impression lock should not panic");
        let impressions = all.entry(in_app_message.id).or_default();
        impressions.push(impression);
        if impressions.len() > max_size {
            let overflow = impressions.len() - max_size;
            impressions.drain(..overflow);
        }
    }
}

/// Messages the user asked not to see until some point in time.
pub trait InAppMessageHiddenStorage: Send + Sync {
    /// `true` while `now <= expire_at`. Expired entries are removed.
    fn exist(&self, in_app_message: &InAppMessage, now: DateTime<Utc>) -> bool;
    fn put(&self, in_app_message: &InAppMessage, expire_at: DateTime<Utc>);
}

#[derive(Default)]
pub struct InMemoryHiddenStorage {
    expire_at: RwLock<HashMap<i64, DateTime<Utc>>>,
}

impl InMemoryHiddenStorage {
    pub fn new() -> Self {
        InMemoryHiddenStorage::default()
    }
}

impl InAppMessageHiddenStorage for InMemoryHiddenStorage {
    fn exist(&self, in_app_message: &InAppMessage, now: DateTime<Utc>) -> bool {
        let expire_at = {
            let hidden = self
                .expire_at
                .read()
                .expect("thread holding hidden lock should not panic");
            match hidden.get(&in_app_message.id) {
                Some(expire_at) => *expire_at,
                None => return false,
            }
        };

        if now <= expire_at {
            return true;
        }

        let mut hidden = self
            .expire_at
            .write()
            .expect("thread holding hidden lock should not panic");
        // Another thread may have put a fresh entry in between.
        if hidden.get(&in_app_message.id) == Some(&expire_at) {
            hidden.remove(&in_app_message.id);
        }
        false
    }

    fn put(&self, in_app_message: &InAppMessage, expire_at: DateTime<Utc>) {
        self.expire_at
            .write()
            .expect("thread holding hidden lock should not panic")
            .insert(in_app_message.id, expire_at);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use chrono::{Duration, TimeZone, Utc};

    use super::{
        InAppMessageHiddenStorage, InAppMessageImpression, InAppMessageImpressionStorage,
        InMemoryHiddenStorage, InMemoryImpressionStorage,
    };
    use crate::testing::in_app_message;

    #[test]
    fn impressions_are_kept_per_message() {
        let storage = InMemoryImpressionStorage::new();
        let first = in_app_message(1);
        let second = in_app_message(2);
        assert!(storage.get(&first).is_empty());

        let impression = InAppMessageImpression {
            identifiers: [("$id".to_owned(), "user".to_owned())].into(),
            timestamp: Utc.timestamp_opt(100, 0).unwrap(),
        };
        storage.set(&first, vec![impression.clone()]);

        assert_eq!(storage.get(&first), vec![impression]);
        assert!(storage.get(&second).is_empty());
    }

    #[test]
    fn concurrent_appends_keep_every_impression() {
        let storage = Arc::new(InMemoryImpressionStorage::new());
        let message = Arc::new(in_app_message(1));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = storage.clone();
                let message = message.clone();
                thread::spawn(move || {
                    for j in 0..10 {
                        storage.append(
                            &message,
                            InAppMessageImpression {
                                identifiers: Default::default(),
                                timestamp: Utc.timestamp_opt(i * 100 + j, 0).unwrap(),
                            },
                            1000,
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(storage.get(&message).len(), 80);
    }

    #[test]
    fn append_trims_oldest() {
        let storage = InMemoryImpressionStorage::new();
        let message = in_app_message(1);
        for seconds in 0..5 {
            storage.append(
                &message,
                InAppMessageImpression {
                    identifiers: Default::default(),
                    timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
                },
                3,
            );
        }

        let timestamps: Vec<_> = storage
            .get(&message)
            .into_iter()
            .map(|it| it.timestamp.timestamp())
            .collect();
        assert_eq!(timestamps, vec![2, 3, 4]);
    }

    #[test]
    fn hidden_until_expiration() {
        let storage = InMemoryHiddenStorage::new();
        let message = in_app_message(1);
        let expire_at = Utc.timestamp_opt(1000, 0).unwrap();
        assert!(!storage.exist(&message, expire_at));

        storage.put(&message, expire_at);
        assert!(storage.exist(&message, expire_at - Duration::seconds(1)));
        assert!(storage.exist(&message, expire_at));
        assert!(!storage.exist(&message, expire_at + Duration::milliseconds(1)));

        // Removed once expired.
        assert!(!storage.exist(&message, expire_at - Duration::seconds(1)));
    }
}
