use regex::Regex;

use crate::{
    model::{Match, MatchOperator},
    value::{HackleValue, ValueType},
};

/// Matches a user-side value against the values of a condition.
///
/// The condition's value type decides how both sides are coerced. Array user values match if any
/// of their elements match. `null` is treated as a missing value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueOperatorMatcher;

impl ValueOperatorMatcher {
    pub fn matches(&self, user_value: Option<&serde_json::Value>, matcher: &Match) -> bool {
        let user_value = user_value.filter(|it| !it.is_null());

        let is_matched = match user_value {
            _ if matcher.operator == MatchOperator::Exists => user_value.is_some(),
            None => false,
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter(|it| !it.is_null())
                .any(|it| matches_any(&HackleValue::from_json(it), matcher)),
            Some(value) => matches_any(&HackleValue::from_json(value), matcher),
        };

        matcher.match_type.matches(is_matched)
    }
}

fn matches_any(user_value: &HackleValue, matcher: &Match) -> bool {
    matcher
        .values
        .iter()
        .any(|match_value| matches_value(matcher, user_value, match_value))
}

fn matches_value(matcher: &Match, user_value: &HackleValue, match_value: &HackleValue) -> bool {
    let operator = matcher.operator;
    match matcher.value_type {
        ValueType::String | ValueType::Json => {
            let is_raw_string = matches!(user_value, HackleValue::String(_));
            match (user_value.as_string(), match_value.as_string()) {
                (Some(user_value), Some(match_value)) => {
                    match_string(operator, &user_value, &match_value, is_raw_string)
                }
                _ => false,
            }
        }
        ValueType::Number => user_value
            .as_f64()
            .zip(match_value.as_f64())
            .map(|(user_value, match_value)| compare(operator, &user_value, &match_value))
            .unwrap_or(false),
        ValueType::Bool => {
            operator == MatchOperator::In
                && user_value
                    .as_bool()
                    .zip(match_value.as_bool())
                    .map(|(user_value, match_value)| user_value == match_value)
                    .unwrap_or(false)
        }
        ValueType::Version => user_value
            .as_version()
            .zip(match_value.as_version())
            .map(|(user_value, match_value)| compare(operator, &user_value, &match_value))
            .unwrap_or(false),
        ValueType::Null => false,
    }
}

fn match_string(
    operator: MatchOperator,
    user_value: &str,
    match_value: &str,
    is_raw_string: bool,
) -> bool {
    match operator {
        MatchOperator::Contains => user_value.contains(match_value),
        MatchOperator::StartsWith => user_value.starts_with(match_value),
        MatchOperator::EndsWith => user_value.ends_with(match_value),
        MatchOperator::Regex => {
            is_raw_string
                && Regex::new(match_value)
                    .map(|regex| regex.is_match(user_value))
                    .unwrap_or(false)
        }
        _ => compare(operator, user_value, match_value),
    }
}

fn compare<T: PartialOrd + ?Sized>(operator: MatchOperator, user_value: &T, match_value: &T) -> bool {
    match operator {
        MatchOperator::In => user_value == match_value,
        MatchOperator::Gt => user_value > match_value,
        MatchOperator::Gte => user_value >= match_value,
        MatchOperator::Lt => user_value < match_value,
        MatchOperator::Lte => user_value <= match_value,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ValueOperatorMatcher;
    use crate::{
        model::{Match, MatchOperator, MatchType},
        value::{HackleValue, ValueType},
    };

    fn matcher(
        operator: MatchOperator,
        value_type: ValueType,
        values: Vec<HackleValue>,
    ) -> Match {
        Match {
            match_type: MatchType::Match,
            operator,
            value_type,
            values,
        }
    }

    fn matches(user_value: serde_json::Value, matcher: &Match) -> bool {
        ValueOperatorMatcher.matches(Some(&user_value), matcher)
    }

    #[test]
    fn string_operators() {
        let m = |operator| matcher(operator, ValueType::String, vec!["abc".into()]);

        assert!(matches(json!("abc"), &m(MatchOperator::In)));
        assert!(!matches(json!("abcd"), &m(MatchOperator::In)));
        assert!(matches(json!("xabcx"), &m(MatchOperator::Contains)));
        assert!(matches(json!("abcx"), &m(MatchOperator::StartsWith)));
        assert!(matches(json!("xabc"), &m(MatchOperator::EndsWith)));
        assert!(matches(json!("abd"), &m(MatchOperator::Gt)));
        assert!(matches(json!("abb"), &m(MatchOperator::Lt)));
        assert!(!matches(json!(true), &m(MatchOperator::In)));
    }

    #[test]
    fn numbers_coerce_to_strings() {
        let m = matcher(MatchOperator::In, ValueType::String, vec!["42".into()]);
        assert!(matches(json!(42), &m));
    }

    #[test]
    fn regex_requires_raw_string() {
        let m = matcher(MatchOperator::Regex, ValueType::String, vec![r"^\d+$".into()]);
        assert!(matches(json!("123"), &m));
        assert!(!matches(json!("12a"), &m));
        assert!(!matches(json!(123), &m));

        let invalid = matcher(MatchOperator::Regex, ValueType::String, vec!["(".into()]);
        assert!(!matches(json!("("), &invalid));
    }

    #[test]
    fn number_operators() {
        let m = |operator| matcher(operator, ValueType::Number, vec![HackleValue::Int(20)]);

        assert!(matches(json!(20), &m(MatchOperator::In)));
        assert!(matches(json!(20.0), &m(MatchOperator::In)));
        assert!(matches(json!("20"), &m(MatchOperator::In)));
        assert!(matches(json!(21), &m(MatchOperator::Gt)));
        assert!(matches(json!(20), &m(MatchOperator::Gte)));
        assert!(!matches(json!(20), &m(MatchOperator::Lt)));
        assert!(matches(json!(19.5), &m(MatchOperator::Lte)));
        assert!(!matches(json!("twenty"), &m(MatchOperator::In)));
        assert!(!matches(json!(20), &m(MatchOperator::Contains)));
    }

    #[test]
    fn bool_only_supports_in() {
        let m = |operator| matcher(operator, ValueType::Bool, vec![HackleValue::Bool(true)]);

        assert!(matches(json!(true), &m(MatchOperator::In)));
        assert!(matches(json!("true"), &m(MatchOperator::In)));
        assert!(!matches(json!(false), &m(MatchOperator::In)));
        assert!(!matches(json!(true), &m(MatchOperator::Gt)));
    }

    #[test]
    fn version_operators() {
        let m = |operator| matcher(operator, ValueType::Version, vec!["1.2.0".into()]);

        assert!(matches(json!("1.2"), &m(MatchOperator::In)));
        assert!(matches(json!("1.10.0"), &m(MatchOperator::Gt)));
        assert!(matches(json!("1.2.0-beta"), &m(MatchOperator::Lt)));
        assert!(!matches(json!("invalid"), &m(MatchOperator::Lte)));
    }

    #[test]
    fn null_type_never_matches() {
        let m = matcher(MatchOperator::In, ValueType::Null, vec![HackleValue::Null]);
        assert!(!matches(json!("a"), &m));
    }

    #[test]
    fn arrays_match_any_element() {
        let m = matcher(MatchOperator::In, ValueType::Number, vec![HackleValue::Int(3)]);
        assert!(matches(json!([1, null, 3]), &m));
        assert!(!matches(json!([1, 2]), &m));
        assert!(!matches(json!([]), &m));
    }

    #[test]
    fn any_match_value_is_enough() {
        let m = matcher(
            MatchOperator::In,
            ValueType::String,
            vec!["a".into(), "b".into()],
        );
        assert!(matches(json!("b"), &m));
    }

    #[test]
    fn missing_values() {
        let m = matcher(MatchOperator::In, ValueType::String, vec!["a".into()]);
        assert!(!ValueOperatorMatcher.matches(None, &m));
        assert!(!matches(json!(null), &m));

        let exists = matcher(MatchOperator::Exists, ValueType::String, vec![]);
        assert!(matches(json!("anything"), &exists));
        assert!(!matches(json!(null), &exists));
        assert!(!ValueOperatorMatcher.matches(None, &exists));
    }

    #[test]
    fn not_match_inverts() {
        let mut m = matcher(MatchOperator::In, ValueType::String, vec!["a".into()]);
        m.match_type = MatchType::NotMatch;

        assert!(!matches(json!("a"), &m));
        assert!(matches(json!("b"), &m));
        assert!(ValueOperatorMatcher.matches(None, &m));
    }
}
