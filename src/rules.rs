use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::error::RuleDataError;
use crate::models::{Limits, RuleSpec, Scheme, Subject};

/// Credit rules of one scheme, parsed once and reused for every subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeRules {
    defaults: Limits,
    rules: Vec<RuleSpec>,
}

impl SchemeRules {
    /// Unreadable payloads degrade to the scheme defaults and are logged.
    pub fn from_scheme(scheme: &Scheme) -> Self {
        let defaults = Limits {
            max_internal: scheme.max_internal,
            max_external: scheme.max_external,
            max_total: scheme.max_total,
            min_total: None,
        };

        let rules = match scheme.credit_rules.as_deref().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(raw) => parse_credit_rules(raw).unwrap_or_else(|err| {
                warn!(
                    scheme_id = scheme.scheme_id,
                    error = %err,
                    "ignoring unreadable credit rules"
                );
                Vec::new()
            }),
        };

        Self { defaults, rules }
    }

    pub fn rules(&self) -> &[RuleSpec] {
        &self.rules
    }

    pub fn limits_for(&self, subject: &Subject) -> Limits {
        match select_rule(&self.rules, subject) {
            Some(rule) => Limits {
                max_internal: Some(rule.max_internal),
                max_external: Some(rule.max_external),
                max_total: Some(rule.max_total),
                min_total: rule.min_total,
            },
            None => self.defaults,
        }
    }
}

/// Effective mark limits for `subject` under `scheme`. Never fails.
pub fn resolve_limits(scheme: &Scheme, subject: &Subject) -> Limits {
    SchemeRules::from_scheme(scheme).limits_for(subject)
}

/// Picks the winning rule for a subject.
///
/// The scan stops at the first rule matching both credit and type. Until then
/// every credit match typed `"All"` replaces the previous fallback, so the
/// last such rule seen before the scan ends is used when no exact match exists.
pub fn select_rule<'a>(rules: &'a [RuleSpec], subject: &Subject) -> Option<&'a RuleSpec> {
    let mut fallback = None;

    for rule in rules {
        if rule.credit != subject.credits {
            continue;
        }
        if rule.subject_type == subject.type_code {
            return Some(rule);
        }
        if rule.subject_type == RuleSpec::ALL_TYPES {
            fallback = Some(rule);
        }
    }

    fallback
}

pub fn parse_credit_rules(raw: &str) -> Result<Vec<RuleSpec>, RuleDataError> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(parse_entries(items, "credit rule")),
        other => Err(RuleDataError::NotAList(json_kind(&other))),
    }
}

/// Deserializes each entry on its own; entries that fail validation are dropped.
pub(crate) fn parse_entries<T: DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(entry) => Some(entry),
            Err(err) if err.to_string().starts_with("duplicate field") => {
                warn!(
                    index,
                    error = %err,
                    "dropping {what} entry that spells a key two ways"
                );
                None
            }
            Err(err) => {
                warn!(index, error = %err, "dropping invalid {what} entry");
                None
            }
        })
        .collect()
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            Numeric::Number(n) => Ok(n),
            Numeric::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("`{s}` is not a number"))),
        }
    }
}

/// Accepts `4`, `4.0` and `"4"` alike.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Numeric::deserialize(deserializer)?.into_f64()
}

pub(crate) fn lenient_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Numeric>::deserialize(deserializer)?
        .map(Numeric::into_f64)
        .transpose()
}
