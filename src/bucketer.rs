//! Maps identifiers into bucket slots.
use crate::{
    hasher::{Hasher, Murmur3Hasher},
    model::{Bucket, Slot},
};

pub trait Bucketer: Send + Sync {
    /// Returns the slot `identifier` falls into, or `None` if the slot number is not covered by
    /// any slot of the bucket.
    fn bucketing<'a>(&self, bucket: &'a Bucket, identifier: &str) -> Option<&'a Slot>;
}

pub struct DefaultBucketer {
    hasher: Box<dyn Hasher + Send + Sync>,
}

impl Default for DefaultBucketer {
    fn default() -> Self {
        DefaultBucketer::new(Murmur3Hasher)
    }
}

impl DefaultBucketer {
    pub fn new(hasher: impl Hasher + Send + Sync + 'static) -> Self {
        DefaultBucketer {
            hasher: Box::new(hasher),
        }
    }

    /// `abs(hash(identifier, seed)) % slot_size`, or `None` for an empty slot space.
    pub fn calculate_slot_number(&self, seed: i32, slot_size: i32, identifier: &str) -> Option<i32> {
        if slot_size <= 0 {
            return None;
        }
        let hash = self.hasher.hash(identifier, seed) as i64;
        Some((hash.abs() % slot_size as i64) as i32)
    }
}

impl Bucketer for DefaultBucketer {
    fn bucketing<'a>(&self, bucket: &'a Bucket, identifier: &str) -> Option<&'a Slot> {
        let slot_number = self.calculate_slot_number(bucket.seed, bucket.slot_size, identifier)?;
        bucket.get_slot(slot_number)
    }
}
