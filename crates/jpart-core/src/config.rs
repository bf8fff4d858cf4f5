//! Partitioning configuration schema and validation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::rule::{is_filename_safe, RawPart, FILTER_MARKER};

/// The configuration a run is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Filter name (as used in rules) -> plugin reference.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filter_mappings: BTreeMap<String, String>,
    /// Rule name -> parts. Rules run in document order.
    pub rules: IndexMap<String, Vec<RawPart>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration must define at least one rule")]
    NoRules,

    #[error("rule names cannot be empty")]
    EmptyRuleName,

    #[error("rule name '{0}' can't be used as an output directory name")]
    UnsafeRuleName(String),

    #[error("rule '{0}' must have at least one part")]
    EmptyRule(String),

    #[error("rule '{0}' has a part with an empty field reference")]
    EmptyFieldReference(String),

    #[error("rule '{rule}': filter reference '{reference}' must be prefixed with '!'")]
    MissingFilterMarker { rule: String, reference: String },

    #[error("rule '{rule}' uses filter '{filter}' which is not declared in filter_mappings")]
    UndeclaredFilter { rule: String, filter: String },

    #[error("filter mapping '{0}' has an empty plugin reference")]
    EmptyPluginReference(String),
}

/// Check a configuration before any rule is built, collecting every problem.
pub fn validate_config(config: &PartitionConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.rules.is_empty() {
        errors.push(ConfigError::NoRules);
    }

    for (name, reference) in &config.filter_mappings {
        if reference.trim().is_empty() {
            errors.push(ConfigError::EmptyPluginReference(name.clone()));
        }
    }

    for (name, parts) in &config.rules {
        validate_rule(name, parts, &config.filter_mappings, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rule(
    name: &str,
    parts: &[RawPart],
    filter_mappings: &BTreeMap<String, String>,
    errors: &mut Vec<ConfigError>,
) {
    // The rule name becomes a directory under the output root.
    if name.trim().is_empty() {
        errors.push(ConfigError::EmptyRuleName);
    } else if !is_filename_safe(name) || name == "." || name == ".." {
        errors.push(ConfigError::UnsafeRuleName(name.to_string()));
    }

    if parts.is_empty() {
        errors.push(ConfigError::EmptyRule(name.to_string()));
    }

    for part in parts {
        if part.field().trim().is_empty() {
            errors.push(ConfigError::EmptyFieldReference(name.to_string()));
        }

        if let RawPart::Filtered(_, reference) = part {
            match reference.strip_prefix(FILTER_MARKER) {
                None => errors.push(ConfigError::MissingFilterMarker {
                    rule: name.to_string(),
                    reference: reference.clone(),
                }),
                Some(filter) if !filter_mappings.contains_key(filter) => {
                    errors.push(ConfigError::UndeclaredFilter {
                        rule: name.to_string(),
                        filter: filter.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> PartitionConfig {
        serde_json::from_str(
            r#"{
                "filter_mappings": {"active_only": "default"},
                "rules": {
                    "by_user": ["user.id"],
                    "by_day_status": ["day", ["status", "!active_only"]]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize_keeps_rule_order() {
        let config: PartitionConfig = serde_json::from_str(
            r#"{"rules": {"zeta": ["a"], "alpha": ["b"], "mid": ["c"]}}"#,
        )
        .unwrap();

        let names: Vec<&str> = config.rules.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(config.filter_mappings.is_empty());
    }

    #[test]
    fn test_deserialize_parts() {
        let config = valid_config();
        assert_eq!(config.rules.get_index_of("by_day_status"), Some(1));
        assert_eq!(
            config.rules["by_day_status"],
            vec![
                RawPart::Field("day".to_string()),
                RawPart::Filtered("status".to_string(), "!active_only".to_string()),
            ]
        );
        assert_eq!(config.filter_mappings["active_only"], "default");
    }

    #[test]
    fn test_deserialize_repeated_rule_name_keeps_one_rule() {
        let config: PartitionConfig =
            serde_json::from_str(r#"{"rules": {"r1": ["a"], "r2": ["c"], "r1": ["b"]}}"#).unwrap();

        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules.get_index_of("r1"), Some(0));
        assert_eq!(config.rules["r1"], vec![RawPart::Field("b".to_string())]);
    }

    #[test]
    fn test_deserialize_missing_rules() {
        assert!(serde_json::from_str::<PartitionConfig>(r#"{"filter_mappings": {}}"#).is_err());
    }

    #[test]
    fn test_deserialize_malformed_part() {
        let result = serde_json::from_str::<PartitionConfig>(r#"{"rules": {"r1": [["a", "!f", "extra"]]}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip_keeps_order() {
        let config = valid_config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.find("by_user").unwrap() < json.find("by_day_status").unwrap());

        let parsed: PartitionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_no_rules() {
        let config = PartitionConfig::default();
        assert_eq!(validate_config(&config).unwrap_err(), vec![ConfigError::NoRules]);
    }

    #[test]
    fn test_empty_rule() {
        let mut config = valid_config();
        config.rules.insert("empty".to_string(), vec![]);
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ConfigError::EmptyRule("empty".to_string())));
    }

    #[test]
    fn test_missing_marker_and_undeclared_filter() {
        let mut config = valid_config();
        config.rules.insert(
            "bad".to_string(),
            vec![
                RawPart::Filtered("a".to_string(), "active_only".to_string()),
                RawPart::Filtered("b".to_string(), "!unknown".to_string()),
            ],
        );

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| matches!(e, ConfigError::MissingFilterMarker { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::UndeclaredFilter { filter, .. } if filter == "unknown")));
    }

    #[test]
    fn test_multiple_errors_accumulated() {
        let mut config = valid_config();
        config.filter_mappings.insert("blank".to_string(), " ".to_string());
        config.rules.insert("".to_string(), vec![RawPart::Field("".to_string())]);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
        assert!(errors.contains(&ConfigError::EmptyRuleName));
        assert!(errors.contains(&ConfigError::EmptyPluginReference("blank".to_string())));
    }

    #[test]
    fn test_rule_name_must_be_a_safe_directory_name() {
        for name in ["../x", "a/b", "..", "."] {
            let mut config = valid_config();
            config.rules.insert(name.to_string(), vec![RawPart::Field("f".to_string())]);

            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors, vec![ConfigError::UnsafeRuleName(name.to_string())], "name: {}", name);
        }

        let mut config = valid_config();
        config.rules.insert("by day.v2_x-y".to_string(), vec![RawPart::Field("f".to_string())]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UndeclaredFilter {
            rule: "r1".to_string(),
            filter: "f".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("r1"));
        assert!(msg.contains("filter_mappings"));
    }
}
