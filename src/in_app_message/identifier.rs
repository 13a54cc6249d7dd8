use crate::user::{IdentifierType, Identifiers};

/// Decides whether two identifier snapshots belong to different users.
#[derive(Debug, Default, Clone, Copy)]
pub struct InAppMessageIdentifierChecker;

impl InAppMessageIdentifierChecker {
    /// Different user ids always mean a different user. Otherwise, unless both user ids are
    /// present and equal, different device ids do.
    pub fn is_identifier_changed(&self, old: &Identifiers, new: &Identifiers) -> bool {
        let old_user_id = old.get(IdentifierType::USER);
        let new_user_id = new.get(IdentifierType::USER);
        if let (Some(old_user_id), Some(new_user_id)) = (old_user_id, new_user_id) {
            return old_user_id != new_user_id;
        }

        let old_device_id = old.get(IdentifierType::DEVICE);
        let new_device_id = new.get(IdentifierType::DEVICE);
        matches!((old_device_id, new_device_id), (Some(old), Some(new)) if old != new)
    }
}
