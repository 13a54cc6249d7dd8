use serde::Deserialize;

/// A deterministic partition of `[0, slot_size)` into variation-labeled slots.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub id: i64,
    pub seed: i32,
    pub slot_size: i32,
    pub slots: Vec<Slot>,
}

/// `[start_inclusive, end_exclusive)` range of slot numbers assigned to a variation (or to a
/// container group when the bucket belongs to a container).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub start_inclusive: i32,
    pub end_exclusive: i32,
    pub variation_id: i64,
}

impl Bucket {
    pub fn get_slot(&self, slot_number: i32) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.contains(slot_number))
    }
}

impl Slot {
    pub fn contains(&self, slot_number: i32) -> bool {
        self.start_inclusive <= slot_number && slot_number < self.end_exclusive
    }
}
