/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Layering of defaults, configuration file, environment and explicit overrides.
 */

//! Configuration loading.
//!
//! Layers are merged on a JSON value tree, lowest precedence first:
//!
//! 1. Built-in defaults ([`Configuration::default`])
//! 2. Optional configuration file (JSON, or YAML for `.yml`/`.yaml`)
//! 3. Environment variables named `DATAMD_<SECTION>_<KEY>`
//! 4. Explicit overrides (command-line flags)
//!
//! The merged tree is then deserialized into [`Configuration`] and validated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use datamd_error_reporting::{DiagnosticMessage, DiagnosticMessageBuilder};
use serde_json::{Map, Value};

use crate::env::{env_var_name, parse_env_value};
use crate::{ConfigError, Configuration};

/// Environment variable that names the configuration file.
pub const CONFIG_FILE_ENV: &str = "DATAMD_CONFIG_FILE";

/// The result of a lenient load: the effective configuration plus the
/// warnings for every layer that had to be skipped.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Configuration,
    /// The configuration file that was applied, if any.
    pub source_file: Option<PathBuf>,
    pub warnings: Vec<DiagnosticMessage>,
}

/// Builder that layers configuration sources over the defaults.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    file: Option<PathBuf>,
    env: HashMap<String, String>,
    overrides: Vec<(String, Value)>,
}

impl Loader {
    /// Start a loader seeded with the built-in defaults only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer a configuration file over the defaults.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use the given variables as the environment layer.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Use the process environment as the environment layer.
    ///
    /// When no file was set explicitly, `DATAMD_CONFIG_FILE` names one.
    pub fn with_process_env(self) -> Self {
        let loader = self.with_env(std::env::vars());
        let named_file = match &loader.file {
            Some(_) => None,
            None => loader
                .env
                .get(CONFIG_FILE_ENV)
                .filter(|file| !file.is_empty())
                .map(PathBuf::from),
        };
        match named_file {
            Some(file) => loader.with_file(file),
            None => loader,
        }
    }

    /// Apply a single dotted key/value override (useful for CLI settings).
    pub fn set_override(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Load strictly: any unreadable layer or invalid value is an error.
    pub fn build(self) -> Result<Configuration, ConfigError> {
        let defaults = defaults_tree()?;
        let mut tree = defaults.clone();

        if let Some(path) = &self.file {
            let layer = read_config_file(path)?;
            merge_values(&mut tree, layer);
        }

        for (var, raw, path) in env_candidates(&defaults, &self.env) {
            let parsed = parse_env_value(&var, raw, &value_type(&defaults, &path))?;
            set_path(&mut tree, &path, parsed);
        }

        for (key, value) in &self.overrides {
            let path: Vec<String> = key.split('.').map(str::to_string).collect();
            set_path(&mut tree, &path, value.clone());
        }

        let config: Configuration = serde_json::from_value(tree)?;
        config.validate()?;
        Ok(config)
    }

    /// Load leniently: a broken file or environment value is skipped with a
    /// warning and the lower layers are kept. Only an invalid final
    /// configuration is an error.
    pub fn load(self) -> Result<LoadedConfig, ConfigError> {
        let mut warnings = Vec::new();
        let defaults = defaults_tree()?;
        let mut tree = defaults.clone();
        let mut source_file = None;

        if let Some(path) = &self.file {
            let layered = read_config_file(path).and_then(|layer| {
                let mut candidate = tree.clone();
                merge_values(&mut candidate, layer);
                check_tree(&candidate)?;
                Ok(candidate)
            });
            match layered {
                Ok(candidate) => {
                    tree = candidate;
                    source_file = Some(path.clone());
                }
                Err(e) => warnings.push(file_warning(path, &e.to_string())),
            }
        }

        for (var, raw, path) in env_candidates(&defaults, &self.env) {
            let layered =
                parse_env_value(&var, raw, &value_type(&defaults, &path)).and_then(|parsed| {
                    let mut candidate = tree.clone();
                    set_path(&mut candidate, &path, parsed);
                    check_tree(&candidate)?;
                    Ok(candidate)
                });
            match layered {
                Ok(candidate) => tree = candidate,
                Err(e) => {
                    tracing::warn!(variable = %var, "Ignoring environment override: {}", e);
                    warnings.push(
                        DiagnosticMessageBuilder::warning("Invalid environment override")
                            .with_code("DMD-6-2")
                            .problem(format!("`{}` could not be applied", var))
                            .add_detail(e.to_string())
                            .build(),
                    );
                }
            }
        }

        for (key, value) in &self.overrides {
            let path: Vec<String> = key.split('.').map(str::to_string).collect();
            set_path(&mut tree, &path, value.clone());
        }

        let config: Configuration = serde_json::from_value(tree)?;
        config.validate()?;

        Ok(LoadedConfig {
            config,
            source_file,
            warnings,
        })
    }
}

/// Deserialize and validate a candidate tree without keeping the result.
fn check_tree(tree: &Value) -> Result<(), ConfigError> {
    serde_json::from_value::<Configuration>(tree.clone())?.validate()
}

/// The default value at `path`; env values are typed by it, not by whatever a file wrote there.
fn value_type(defaults: &Value, path: &[String]) -> Value {
    lookup(defaults, path).cloned().unwrap_or(Value::Null)
}

fn file_warning(path: &Path, reason: &str) -> DiagnosticMessage {
    tracing::warn!(path = %path.display(), "Could not load config file: {}", reason);
    DiagnosticMessageBuilder::warning("Configuration file not loaded")
        .with_code("DMD-6-1")
        .problem(format!("`{}` could not be loaded", path.display()))
        .add_detail(reason.to_string())
        .add_info("Built-in defaults and environment overrides are used instead")
        .build()
}

fn defaults_tree() -> Result<Value, ConfigError> {
    Ok(serde_json::to_value(Configuration::default())?)
}

/// Read a configuration file into a value tree.
pub fn read_config_file(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));

    let value: Value = if is_yaml {
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: "top level must be a mapping of sections".to_string(),
        }),
    }
}

/// Deep-merge `layer` into `base`. Objects merge key by key; anything else replaces.
pub fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Every `section.key` leaf of the tree that has a matching environment variable.
fn env_candidates<'e>(
    tree: &Value,
    env: &'e HashMap<String, String>,
) -> Vec<(String, &'e str, Vec<String>)> {
    let mut found = Vec::new();
    let Value::Object(sections) = tree else {
        return found;
    };
    for (section, body) in sections {
        let Value::Object(keys) = body else {
            continue;
        };
        for key in keys.keys() {
            let var = env_var_name(section, key);
            if let Some(raw) = env.get(&var) {
                found.push((var, raw.as_str(), vec![section.clone(), key.clone()]));
            }
        }
    }
    found
}

fn lookup<'a>(tree: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(tree, |value, key| value.get(key))
}

fn set_path(tree: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = tree;
    for key in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_only() {
        let config = Loader::new().build().unwrap();
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn test_json_file_merges_partially() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datamd.json",
            r#"{"performance": {"chunk_size": 500}, "security": {"max_file_size_mb": 5}}"#,
        );

        let config = Loader::new().with_file(&path).build().unwrap();
        assert_eq!(config.performance.chunk_size, 500);
        assert_eq!(config.security.max_file_size_mb, 5.0);
        // untouched keys in a touched section keep their defaults
        assert_eq!(config.performance.streaming_threshold_mb, 10.0);
        assert_eq!(config.application.name, "DataMD Processor");
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datamd.yaml",
            "security:\n  allow_directory_traversal: true\n  allowed_file_extensions: [csv]\n",
        );

        let config = Loader::new().with_file(&path).build().unwrap();
        assert!(config.security.allow_directory_traversal);
        assert_eq!(config.security.allowed_file_extensions, vec!["csv"]);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datamd.json",
            r#"{"performance": {"chunk_size": 500}}"#,
        );

        let config = Loader::new()
            .with_file(&path)
            .with_env([
                ("DATAMD_PERFORMANCE_CHUNK_SIZE", "250"),
                ("DATAMD_SECURITY_ALLOW_DIRECTORY_TRAVERSAL", "yes"),
                ("DATAMD_LIMITS_SUPPORTED_LANGUAGES", "eng, deu"),
                ("UNRELATED", "x"),
            ])
            .build()
            .unwrap();

        assert_eq!(config.performance.chunk_size, 250);
        assert!(config.security.allow_directory_traversal);
        assert_eq!(config.limits.supported_languages, vec!["eng", "deu"]);
    }

    #[test]
    fn test_override_beats_env() {
        let config = Loader::new()
            .with_env([("DATAMD_PERFORMANCE_CHUNK_SIZE", "250")])
            .set_override("performance.chunk_size", 42)
            .build()
            .unwrap();
        assert_eq!(config.performance.chunk_size, 42);
    }

    #[test]
    fn test_cache_directory_from_env() {
        let config = Loader::new()
            .with_env([("DATAMD_CACHE_DIRECTORY", "/tmp/datamd-cache")])
            .build()
            .unwrap();
        assert_eq!(
            config.cache.directory,
            Some(PathBuf::from("/tmp/datamd-cache"))
        );
    }

    #[test]
    fn test_strict_build_rejects_missing_file() {
        let err = Loader::new()
            .with_file("/definitely/not/here.json")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_lenient_load_skips_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "datamd.json", "{ not json");

        let loaded = Loader::new()
            .with_file(&path)
            .with_env([("DATAMD_PERFORMANCE_CHUNK_SIZE", "7")])
            .load()
            .unwrap();

        assert_eq!(loaded.config.performance.chunk_size, 7);
        assert!(loaded.source_file.is_none());
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.warnings[0].code.as_deref(), Some("DMD-6-1"));
    }

    #[test]
    fn test_lenient_load_skips_mistyped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datamd.json",
            r#"{"performance": {"chunk_size": "lots"}}"#,
        );

        let loaded = Loader::new().with_file(&path).load().unwrap();
        assert_eq!(loaded.config.performance.chunk_size, 10_000);
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_lenient_load_skips_bad_env_value() {
        let loaded = Loader::new()
            .with_env([
                ("DATAMD_PERFORMANCE_CHUNK_SIZE", "many"),
                ("DATAMD_FEATURES_OCR_ENABLED", "off"),
            ])
            .load()
            .unwrap();

        assert_eq!(loaded.config.performance.chunk_size, 10_000);
        assert!(!loaded.config.features.ocr_enabled);
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.warnings[0].code.as_deref(), Some("DMD-6-2"));
    }

    #[test]
    fn test_invalid_final_configuration_is_an_error() {
        let result = Loader::new()
            .set_override("performance.chunk_size", 0)
            .load();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_lenient_load_skips_file_that_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datamd.json",
            r#"{"performance": {"chunk_size": 0}}"#,
        );

        let loaded = Loader::new()
            .with_file(&path)
            .with_env([("DATAMD_CACHE_TTL_SECONDS", "60")])
            .load()
            .unwrap();

        assert_eq!(loaded.config.performance.chunk_size, 10_000);
        assert_eq!(loaded.config.cache.ttl_seconds, 60);
        assert!(loaded.source_file.is_none());
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.warnings[0].code.as_deref(), Some("DMD-6-1"));
        assert!(loaded.warnings[0].details[0].content.as_str().contains("chunk_size"));
    }

    #[test]
    fn test_lenient_load_skips_env_value_that_fails_validation() {
        let loaded = Loader::new()
            .with_env([("DATAMD_PERFORMANCE_CHUNK_SIZE", "0")])
            .load()
            .unwrap();
        assert_eq!(loaded.config.performance.chunk_size, 10_000);
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.warnings[0].code.as_deref(), Some("DMD-6-2"));
    }

    #[test]
    fn test_env_float_overrides_integer_written_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "datamd.yaml", "security:\n  max_file_size_mb: 50\n");

        let loaded = Loader::new()
            .with_file(&path)
            .with_env([("DATAMD_SECURITY_MAX_FILE_SIZE_MB", "0.5")])
            .load()
            .unwrap();
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.config.security.max_file_size_mb, 0.5);

        let config = Loader::new()
            .with_file(&path)
            .with_env([("DATAMD_SECURITY_MAX_FILE_SIZE_MB", "0.5")])
            .build()
            .unwrap();
        assert_eq!(config.security.max_file_size_mb, 0.5);
    }

    #[test]
    fn test_config_file_named_by_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "datamd.json",
            r#"{"cache": {"ttl_seconds": 60}}"#,
        );

        let loader = Loader::new().with_env([(CONFIG_FILE_ENV, path.to_str().unwrap())]);
        // with_env alone does not pick up the file; only the process-env entry point does
        assert_eq!(loader.clone().build().unwrap().cache.ttl_seconds, 86_400);

        let config = Loader::new().with_file(&path).build().unwrap();
        assert_eq!(config.cache.ttl_seconds, 60);
    }

    #[test]
    fn test_merge_values_replaces_scalars_and_arrays() {
        let mut base = serde_json::json!({"a": {"b": 1, "c": [1, 2]}, "d": true});
        merge_values(
            &mut base,
            serde_json::json!({"a": {"c": [3]}, "e": "new"}),
        );
        assert_eq!(
            base,
            serde_json::json!({"a": {"b": 1, "c": [3]}, "d": true, "e": "new"})
        );
    }
}
