use std::{cmp::Ordering, fmt, sync::OnceLock};

use derive_more::From;
use regex::Regex;
use semver::{BuildMetadata, Prerelease};
use serde::{Deserialize, Serialize};

/// A scalar value as it appears in targeting conditions, remote config values, and user
/// properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum HackleValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Null,
}

/// Declared type of a value. Drives which value matcher is used for a condition and which type a
/// remote config parameter returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Null,
    String,
    Number,
    #[serde(rename = "BOOLEAN")]
    Bool,
    Version,
    Json,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::String => "STRING",
            ValueType::Number => "NUMBER",
            ValueType::Bool => "BOOLEAN",
            ValueType::Version => "VERSION",
            ValueType::Json => "JSON",
        }
    }
}

impl HackleValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            HackleValue::String(_) => ValueType::String,
            HackleValue::Int(_) | HackleValue::Double(_) => ValueType::Number,
            HackleValue::Bool(_) => ValueType::Bool,
            HackleValue::Null => ValueType::Null,
        }
    }

    /// Converts a json value. Arrays and objects have no scalar representation and become
    /// [`HackleValue::Null`].
    pub fn from_json(value: &serde_json::Value) -> HackleValue {
        match value {
            serde_json::Value::Bool(b) => HackleValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => HackleValue::Int(i),
                None => n.as_f64().map_or(HackleValue::Null, HackleValue::Double),
            },
            serde_json::Value::String(s) => HackleValue::String(s.clone()),
            _ => HackleValue::Null,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            HackleValue::Bool(b) => serde_json::Value::Bool(*b),
            HackleValue::Int(i) => serde_json::Value::from(*i),
            HackleValue::Double(d) => serde_json::Value::from(*d),
            HackleValue::String(s) => serde_json::Value::String(s.clone()),
            HackleValue::Null => serde_json::Value::Null,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            HackleValue::String(s) => Some(s.clone()),
            HackleValue::Int(i) => Some(i.to_string()),
            HackleValue::Double(d) => Some(d.to_string()),
            HackleValue::Bool(_) | HackleValue::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HackleValue::String(s) => s.parse().ok(),
            HackleValue::Int(i) => Some(*i as f64),
            HackleValue::Double(d) => Some(*d),
            HackleValue::Bool(_) | HackleValue::Null => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HackleValue::Bool(b) => Some(*b),
            HackleValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            HackleValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_version(&self) -> Option<Version> {
        match self {
            HackleValue::String(s) => Version::parse(s),
            _ => None,
        }
    }
}

impl From<&str> for HackleValue {
    fn from(value: &str) -> Self {
        HackleValue::String(value.to_owned())
    }
}

/// Semantic version with optional minor and patch components (`1`, `1.2`, `1.2.3-beta+build`).
///
/// Ordering follows semver precedence; build metadata is kept for display only.
#[derive(Debug, Clone)]
pub struct Version {
    inner: semver::Version,
}

fn version_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<major>0|[1-9]\d*)",
            r"(?:\.(?P<minor>0|[1-9]\d*))?",
            r"(?:\.(?P<patch>0|[1-9]\d*))?",
            r"(?:-(?P<prerelease>(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?",
            r"(?:\+(?P<build>[0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
        ))
        .expect("version pattern should be a valid regex")
    })
}

impl Version {
    pub fn parse(value: &str) -> Option<Version> {
        let captures = version_regex().captures(value)?;
        let number = |name: &str| -> Option<u64> {
            match captures.name(name) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };

        let mut inner = semver::Version::new(number("major")?, number("minor")?, number("patch")?);
        if let Some(pre) = captures.name("prerelease") {
            inner.pre = Prerelease::new(pre.as_str()).ok()?;
        }
        if let Some(build) = captures.name("build") {
            inner.build = BuildMetadata::new(build.as_str()).ok()?;
        }
        Some(Version { inner })
    }

    fn precedence(&self) -> (u64, u64, u64, &Prerelease) {
        (
            self.inner.major,
            self.inner.minor,
            self.inner.patch,
            &self.inner.pre,
        )
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.precedence() == other.precedence()
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::{HackleValue, ValueType, Version};

    #[test]
    fn deserializes_untagged_values() {
        let values: Vec<HackleValue> =
            serde_json::from_str(r#"[true, 42, 4.2, "a", null]"#).unwrap();
        assert_eq!(
            values,
            vec![
                HackleValue::Bool(true),
                HackleValue::Int(42),
                HackleValue::Double(4.2),
                HackleValue::String("a".into()),
                HackleValue::Null,
            ]
        );
        assert_eq!(values[1].value_type(), ValueType::Number);
        assert_eq!(values[2].value_type(), ValueType::Number);
    }

    #[test]
    fn coerces_values() {
        assert_eq!(HackleValue::from("42").as_f64(), Some(42.0));
        assert_eq!(HackleValue::from(42_i64).as_string(), Some("42".to_owned()));
        assert_eq!(HackleValue::from("TRUE").as_bool(), Some(true));
        assert_eq!(HackleValue::from(1_i64).as_bool(), None);
        assert_eq!(HackleValue::from(true).as_string(), None);
    }

    #[test]
    fn parses_partial_versions() {
        assert_eq!(Version::parse("1").unwrap(), Version::parse("1.0.0").unwrap());
        assert_eq!(Version::parse("1.2").unwrap(), Version::parse("1.2.0").unwrap());
        assert!(Version::parse("01.0.0").is_none());
        assert!(Version::parse("1.0.0.0").is_none());
        assert!(Version::parse("a.b.c").is_none());
    }

    #[test]
    fn orders_by_precedence() {
        let v = |s: &str| Version::parse(s).unwrap();
        assert!(v("1.0.0") > v("1.0.0-beta"));
        assert!(v("1.0.0-alpha") < v("1.0.0-alpha.1"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert_eq!(v("1.0.0+build.1"), v("1.0.0+build.2"));
        assert_eq!(v("1.0.0+build.1").to_string(), "1.0.0+build.1");
    }
}
