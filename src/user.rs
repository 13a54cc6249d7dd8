use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifier types with special meaning. Any other string is a custom identifier type.
pub struct IdentifierType;

impl IdentifierType {
    pub const ID: &'static str = "$id";
    pub const USER: &'static str = "$userId";
    pub const DEVICE: &'static str = "$deviceId";
    pub const SESSION: &'static str = "$sessionId";
    pub const HACKLE_DEVICE: &'static str = "$hackleDeviceId";
}

/// Identifier type -> identifier value.
pub type Identifiers = HashMap<String, String>;

/// Normalized user the engine evaluates against.
///
/// Resolving a raw application user into a `HackleUser` (filling in device ids, session ids,
/// etc.) is done by the host SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HackleUser {
    pub identifiers: Identifiers,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub hackle_properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub cohorts: Vec<i64>,
}

impl HackleUser {
    pub fn builder() -> HackleUserBuilder {
        HackleUserBuilder::default()
    }

    pub fn of(user_id: impl Into<String>) -> HackleUser {
        HackleUser::builder()
            .identifier(IdentifierType::ID, user_id)
            .build()
    }

    pub fn identifier(&self, identifier_type: &str) -> Option<&str> {
        self.identifiers.get(identifier_type).map(String::as_str)
    }
}

/// Supplies the current user, resolved from whatever the application set.
pub trait UserResolver: Send + Sync {
    fn resolve(&self) -> HackleUser;
}

#[derive(Debug, Default)]
pub struct HackleUserBuilder {
    user: HackleUser,
}

impl HackleUserBuilder {
    /// Adds an identifier. Empty values are ignored.
    pub fn identifier(mut self, identifier_type: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.user.identifiers.insert(identifier_type.to_owned(), value);
        }
        self
    }

    pub fn property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.user.properties.insert(key.to_owned(), value.into());
        self
    }

    pub fn hackle_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.user
            .hackle_properties
            .insert(key.to_owned(), value.into());
        self
    }

    pub fn cohort(mut self, cohort_id: i64) -> Self {
        self.user.cohorts.push(cohort_id);
        self
    }

    pub fn build(self) -> HackleUser {
        self.user
    }
}
