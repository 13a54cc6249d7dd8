use std::sync::Arc;

use crate::user::HackleUser;

use super::{InAppMessageDelay, InAppMessageDelayManager, InAppMessageIdentifierChecker};

/// Drops pending deliveries when the current user becomes someone else.
pub struct InAppMessageResetProcessor {
    identifier_checker: InAppMessageIdentifierChecker,
    delay_manager: Arc<InAppMessageDelayManager>,
}

impl InAppMessageResetProcessor {
    pub fn new(delay_manager: Arc<InAppMessageDelayManager>) -> Self {
        InAppMessageResetProcessor {
            identifier_checker: InAppMessageIdentifierChecker,
            delay_manager,
        }
    }

    /// Returns the cancelled delays.
    pub fn process(&self, old_user: &HackleUser, new_user: &HackleUser) -> Vec<InAppMessageDelay> {
        if !self
            .identifier_checker
            .is_identifier_changed(&old_user.identifiers, &new_user.identifiers)
        {
            return Vec::new();
        }

        let cancelled = self.delay_manager.cancel_all();
        log::debug!(target: "hackle",
            cancelled = cancelled.len();
            "user changed, in-app message delays reset");
        cancelled
    }
}
