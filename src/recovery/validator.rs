//! Structural validation of stored values
//!
//! Rules are registered per key pattern (a regex matched against the
//! logical key). A value is either a single object or an array of objects;
//! each object is checked against the rules:
//!
//! - required fields present and non-null
//! - enum-domain fields hold one of the allowed strings
//! - date pairs are RFC 3339 strings with `earlier <= later`
//! - the identifier field is unique across the array (duplicates warn)
//!
//! Null values and empty collections always produce warnings, with or
//! without rules.

use std::collections::{BTreeMap, HashSet};

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{StoreError, StoreResult};

/// Rules for one family of keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default)]
    pub required: Vec<String>,
    /// field -> allowed values
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,
    /// (earlier, later) field pairs
    #[serde(default)]
    pub date_order: Vec<(String, String)>,
    #[serde(default)]
    pub id_field: Option<String>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: &str) -> Self {
        self.required.push(field.to_string());
        self
    }

    pub fn one_of<I, S>(mut self, field: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums
            .insert(field.to_string(), allowed.into_iter().map(Into::into).collect());
        self
    }

    pub fn ordered(mut self, earlier: &str, later: &str) -> Self {
        self.date_order
            .push((earlier.to_string(), later.to_string()));
        self
    }

    pub fn unique_id(mut self, field: &str) -> Self {
        self.id_field = Some(field.to_string());
        self
    }
}

/// Errors and warnings from one validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Rules keyed by key pattern; the first matching pattern wins
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    entries: Vec<(Regex, ValidationRules)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rules` for keys matching `pattern`
    pub fn register(&mut self, pattern: &str, rules: ValidationRules) -> StoreResult<()> {
        let regex = Regex::new(pattern).map_err(|e| {
            StoreError::validation(pattern, format!("invalid key pattern: {}", e))
        })?;
        self.entries.push((regex, rules));
        Ok(())
    }

    pub fn rules_for(&self, key: &str) -> Option<&ValidationRules> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.is_match(key))
            .map(|(_, rules)| rules)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Validate `data` against optional rules
pub fn validate(data: &Value, rules: Option<&ValidationRules>) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    match data {
        Value::Null => {
            outcome.warnings.push("data is null".to_string());
            return outcome;
        }
        Value::Array(items) if items.is_empty() => {
            outcome.warnings.push("collection is empty".to_string());
        }
        Value::Object(map) if map.is_empty() => {
            outcome.warnings.push("collection is empty".to_string());
        }
        Value::Object(map) => collection_warnings(map, "", &mut outcome),
        _ => {}
    }

    let Some(rules) = rules else {
        return outcome;
    };

    match data {
        Value::Array(items) => {
            let mut seen_ids = HashSet::new();
            for (i, item) in items.iter().enumerate() {
                let path = format!("[{}]", i);
                match item.as_object() {
                    Some(obj) => {
                        check_object(obj, &path, rules, &mut outcome);
                        check_duplicate_id(obj, &path, rules, &mut seen_ids, &mut outcome);
                    }
                    None => outcome.errors.push(format!("{}: expected an object", path)),
                }
            }
        }
        Value::Object(obj) => check_object(obj, "", rules, &mut outcome),
        other => outcome.errors.push(format!(
            "expected an object or array, found {}",
            json_type_name(other)
        )),
    }

    outcome
}

fn collection_warnings(map: &Map<String, Value>, path: &str, outcome: &mut ValidationOutcome) {
    for (field, value) in map {
        match value {
            Value::Array(items) if items.is_empty() => outcome
                .warnings
                .push(format!("{}: empty collection", join(path, field))),
            Value::Null => outcome
                .warnings
                .push(format!("{}: null value", join(path, field))),
            _ => {}
        }
    }
}

fn check_object(
    obj: &Map<String, Value>,
    path: &str,
    rules: &ValidationRules,
    outcome: &mut ValidationOutcome,
) {
    for field in &rules.required {
        if obj.get(field).map(Value::is_null).unwrap_or(true) {
            outcome.errors.push(format!(
                "{}: missing required field '{}'",
                label(path),
                field
            ));
        }
    }

    for (field, allowed) in &rules.enums {
        match obj.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if allowed.iter().any(|a| a == s) => {}
            Some(other) => outcome.errors.push(format!(
                "{}: field '{}' has value {} outside [{}]",
                label(path),
                field,
                other,
                allowed.join(", ")
            )),
        }
    }

    for (earlier, later) in &rules.date_order {
        let (Some(a), Some(b)) = (
            parse_date(obj, earlier, path, outcome),
            parse_date(obj, later, path, outcome),
        ) else {
            continue;
        };
        if a > b {
            outcome.errors.push(format!(
                "{}: '{}' is after '{}'",
                label(path),
                earlier,
                later
            ));
        }
    }

    if !path.is_empty() {
        collection_warnings(obj, path, outcome);
    }
}

fn check_duplicate_id(
    obj: &Map<String, Value>,
    path: &str,
    rules: &ValidationRules,
    seen: &mut HashSet<String>,
    outcome: &mut ValidationOutcome,
) {
    let Some(field) = &rules.id_field else {
        return;
    };
    let Some(id) = obj.get(field).filter(|v| !v.is_null()) else {
        return;
    };
    let id = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if !seen.insert(id.clone()) {
        outcome
            .warnings
            .push(format!("{}: duplicate {} '{}'", path, field, id));
    }
}

fn parse_date(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
    outcome: &mut ValidationOutcome,
) -> Option<i64> {
    match obj.get(field)? {
        Value::Null => None,
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Some(dt.timestamp_millis()),
            Err(_) => {
                outcome.errors.push(format!(
                    "{}: field '{}' is not an RFC 3339 date",
                    label(path),
                    field
                ));
                None
            }
        },
        _ => {
            outcome.errors.push(format!(
                "{}: field '{}' is not an RFC 3339 date",
                label(path),
                field
            ));
            None
        }
    }
}

fn label(path: &str) -> &str {
    if path.is_empty() {
        "$root"
    } else {
        path
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_rules() -> ValidationRules {
        ValidationRules::new()
            .require("id")
            .require("title")
            .one_of("status", ["todo", "doing", "done"])
            .ordered("createdAt", "dueDate")
            .unique_id("id")
    }

    #[test]
    fn test_valid_tasks() {
        let data = json!([
            {"id": 1, "title": "a", "status": "todo",
             "createdAt": "2026-01-01T00:00:00Z", "dueDate": "2026-01-02T00:00:00Z"},
            {"id": 2, "title": "b", "status": "done"}
        ]);
        let outcome = validate(&data, Some(&task_rules()));
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_and_bad_enum() {
        let data = json!([{"id": 1, "status": "blocked"}]);
        let outcome = validate(&data, Some(&task_rules()));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("missing required field 'title'"));
        assert!(outcome.errors[1].contains("status"));
    }

    #[test]
    fn test_date_ordering() {
        let data = json!({"id": 1, "title": "a",
            "createdAt": "2026-03-01T00:00:00Z", "dueDate": "2026-02-01T00:00:00Z"});
        let outcome = validate(&data, Some(&task_rules()));
        assert_eq!(outcome.errors, vec!["$root: 'createdAt' is after 'dueDate'"]);

        let data = json!({"id": 1, "title": "a", "createdAt": "yesterday"});
        let outcome = validate(&data, Some(&task_rules()));
        assert!(outcome.errors[0].contains("not an RFC 3339 date"));
    }

    #[test]
    fn test_duplicate_ids_warn() {
        let data = json!([{"id": 7, "title": "a"}, {"id": 7, "title": "b"}]);
        let outcome = validate(&data, Some(&task_rules()));
        assert!(outcome.is_valid());
        assert_eq!(outcome.warnings, vec!["[1]: duplicate id '7'"]);
    }

    #[test]
    fn test_null_and_empty_warn_without_rules() {
        assert_eq!(validate(&Value::Null, None).warnings, vec!["data is null"]);
        assert_eq!(validate(&json!([]), None).warnings, vec!["collection is empty"]);
        let outcome = validate(&json!({"tags": [], "note": null}), None);
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.is_valid());
    }

    #[test]
    fn test_rule_set_first_match() {
        let mut rules = RuleSet::new();
        rules.register("^tasks", task_rules()).unwrap();
        rules.register(".*", ValidationRules::new()).unwrap();
        assert_eq!(rules.rules_for("tasks_archive"), Some(&task_rules()));
        assert_eq!(rules.rules_for("prefs"), Some(&ValidationRules::new()));
        assert!(rules.register("(", ValidationRules::new()).is_err());
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_scalar_rejected_when_rules_apply() {
        let outcome = validate(&json!(42), Some(&task_rules()));
        assert_eq!(outcome.errors, vec!["expected an object or array, found number"]);
    }
}
