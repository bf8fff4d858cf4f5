//! Loading partition configuration from JSON or YAML files

use anyhow::{Context, Result};
use jpart_core::PartitionConfig;
use std::path::Path;

/// Read a configuration file. `.yaml`/`.yml` files are parsed as YAML,
/// anything else as JSON.
pub fn load_config(path: &Path) -> Result<PartitionConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );

    if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML config {:?}", path))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON config {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpart_core::RawPart;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rules.json", r#"{"rules": {"r1": ["f1", "f2"]}}"#);

        let config = load_config(&path).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(config.rules.contains_key("r1"));
    }

    #[test]
    fn test_load_yaml_keeps_order_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "rules.yaml",
            "filter_mappings:\n  active: default\nrules:\n  second:\n    - day\n    - [status, '!active']\n  first:\n    - user.id\n",
        );

        let config = load_config(&path).unwrap();
        let names: Vec<&str> = config.rules.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(
            config.rules["second"][1],
            RawPart::Filtered("status".to_string(), "!active".to_string())
        );
        assert_eq!(config.filter_mappings["active"], "default");
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rules.json", "{not json");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON config"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/no/such/rules.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
