use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::info;

use crate::config::{CacheConfig, CacheConfigFile};
use crate::errors::CacheConfigError;

const ENV_PREFIX: &str = "AUTHZ_CACHE__";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

/// Defaults, then `path` (YAML) if it exists, then `AUTHZ_CACHE__*` env vars.
pub fn load_config(path: Option<&Path>) -> Result<CacheConfig, CacheConfigError> {
    let mut options = LoadOptions {
        include_env: true,
        ..LoadOptions::default()
    };
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    load_config_with_options(&options)
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<CacheConfig, CacheConfigError> {
    let mut tree = match serde_json::to_value(CacheConfigFile::default()) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(CacheConfigError::Invalid(format!(
                "defaults did not serialize to an object: {other}"
            )))
        }
        Err(err) => return Err(CacheConfigError::Invalid(err.to_string())),
    };

    for path in &options.paths {
        if path.exists() {
            merge(&mut tree, overlay_from_file(path)?);
            info!(target: "authz::cache", path = %path.display(), "loaded cache config file");
        }
    }

    if options.include_env {
        merge(&mut tree, overlay_from_env());
    }

    let file: CacheConfigFile = serde_json::from_value(Value::Object(tree))
        .map_err(|err| CacheConfigError::Invalid(err.to_string()))?;
    CacheConfig::try_from(file)
}

fn merge(tree: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        tree.insert(key, value);
    }
}

fn overlay_from_file(path: &Path) -> Result<Map<String, Value>, CacheConfigError> {
    let content = fs::read_to_string(path).map_err(|err| CacheConfigError::Io(err.to_string()))?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| CacheConfigError::Invalid(err.to_string()))?;
    match serde_json::to_value(yaml).map_err(|err| CacheConfigError::Invalid(err.to_string()))? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(CacheConfigError::Invalid(format!(
            "expected a mapping in {}, got {other}",
            path.display()
        ))),
    }
}

fn overlay_from_env() -> Map<String, Value> {
    let mut overlay = Map::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let field = stripped.trim().to_ascii_lowercase();
            if field.is_empty() {
                continue;
            }
            overlay.insert(field, parse_env_value(&raw));
        }
    }
    overlay
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    fn clear_env() {
        for (key, _) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_without_sources() {
        clear_env();
        let config = load_config(None).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    #[serial]
    fn file_then_env_layering() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.yaml");
        fs::write(
            &path,
            "enabled: true\nmax_size: 50\nttl_seconds: 2.5\npolicy_aware: false\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_size, 50);
        assert_eq!(config.ttl, Duration::from_millis(2500));
        assert!(!config.policy_aware);

        env::set_var("AUTHZ_CACHE__MAX_SIZE", "75");
        env::set_var("AUTHZ_CACHE__POLICY_AWARE", "true");
        let config = load_config(Some(&path)).unwrap();
        clear_env();
        assert_eq!(config.max_size, 75);
        assert!(config.policy_aware);
        assert_eq!(config.ttl, Duration::from_millis(2500));
    }

    #[test]
    #[serial]
    fn invalid_values_are_config_errors() {
        clear_env();
        env::set_var("AUTHZ_CACHE__MAX_SIZE", "0");
        let err = load_config(None).unwrap_err();
        clear_env();
        assert_eq!(err, CacheConfigError::InvalidCapacity(0));

        env::set_var("AUTHZ_CACHE__TTL_SECONDS", "-1");
        let err = load_config(None).unwrap_err();
        clear_env();
        assert!(matches!(err, CacheConfigError::InvalidTtl(_)));
    }

    #[test]
    #[serial]
    fn unknown_file_keys_are_rejected() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.yaml");
        fs::write(&path, "max_entries: 10\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(CacheConfigError::Invalid(_))
        ));
    }

    #[test]
    #[serial]
    fn missing_file_falls_back_to_defaults() {
        clear_env();
        let options = LoadOptions {
            paths: vec![PathBuf::from("/nonexistent/authz-cache.yaml")],
            include_env: false,
        };
        assert_eq!(
            load_config_with_options(&options).unwrap(),
            CacheConfig::default()
        );
    }
}
