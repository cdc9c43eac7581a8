/*
 * types.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Typed configuration sections and their defaults.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ConfigError;

const MIB: f64 = 1024.0 * 1024.0;

/// Complete DataMD configuration.
///
/// Every section falls back to its defaults when absent, so a configuration
/// file only needs to mention the values it changes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub application: ApplicationConfig,
    pub features: FeaturesConfig,
    pub limits: LimitsConfig,
    pub processing: ProcessingConfig,
    pub performance: PerformanceConfig,
    pub security: SecurityConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub version: String,
    pub environment: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "DataMD Processor".to_string(),
            version: "1.0.0".to_string(),
            environment: "production".to_string(),
        }
    }
}

/// Optional capabilities that directives can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Ocr,
    PdfProcessing,
    VideoSupport,
}

impl Feature {
    /// The configuration key under `features`.
    pub fn key(self) -> &'static str {
        match self {
            Feature::Ocr => "ocr_enabled",
            Feature::PdfProcessing => "pdf_processing",
            Feature::VideoSupport => "video_support",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub ocr_enabled: bool,
    pub pdf_processing: bool,
    pub video_support: bool,
    pub excel_formats: Vec<String>,
}

impl FeaturesConfig {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Ocr => self.ocr_enabled,
            Feature::PdfProcessing => self.pdf_processing,
            Feature::VideoSupport => self.video_support,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            ocr_enabled: true,
            pdf_processing: true,
            video_support: true,
            excel_formats: ["xlsx", "xls", "xlsm", "ods"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_pages_pdf: u32,
    pub supported_languages: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pages_pdf: 50,
            supported_languages: ["eng", "spa", "fra", "deu", "ind"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub default_csv_separator: String,
    pub default_pdf_strategy: String,
    pub default_ocr_language: String,
    pub video_thumb_width: u32,
    pub video_thumb_height: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_csv_separator: ",".to_string(),
            default_pdf_strategy: "lines".to_string(),
            default_ocr_language: "eng".to_string(),
            video_thumb_width: 320,
            video_thumb_height: 240,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Rows per chunk when a tabular source is streamed.
    pub chunk_size: usize,
    pub streaming_threshold_mb: f64,
    pub max_memory_mb: f64,
    /// Worker threads used for directives of one document; 0 means one per core.
    pub max_workers: usize,
}

impl PerformanceConfig {
    pub fn streaming_threshold_bytes(&self) -> u64 {
        mib_to_bytes(self.streaming_threshold_mb)
    }

    pub fn max_memory_bytes(&self) -> u64 {
        mib_to_bytes(self.max_memory_mb)
    }

    /// Whether a source of `size_bytes` must be processed in chunks.
    pub fn should_stream(&self, size_bytes: u64) -> bool {
        size_bytes > self.streaming_threshold_bytes() || size_bytes > self.max_memory_bytes()
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            streaming_threshold_mb: 10.0,
            max_memory_mb: 100.0,
            max_workers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub allow_directory_traversal: bool,
    pub max_file_size_mb: f64,
    pub max_filename_length: usize,
    /// Empty means every extension is accepted.
    pub allowed_file_extensions: Vec<String>,
}

impl SecurityConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        mib_to_bytes(self.max_file_size_mb)
    }

    /// Check an extension (with or without the leading dot) against the allow-list.
    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        if self.allowed_file_extensions.is_empty() {
            return true;
        }
        let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
        self.allowed_file_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').to_ascii_lowercase() == wanted)
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_directory_traversal: false,
            max_file_size_mb: 100.0,
            max_filename_length: 255,
            allowed_file_extensions: [
                ".csv", ".json", ".xlsx", ".xls", ".xlsm", ".ods", ".pdf", ".jpg", ".jpeg", ".png",
                ".gif", ".bmp", ".mp4", ".avi", ".mov", ".wmv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory; when unset the user cache directory is used.
    pub directory: Option<PathBuf>,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    /// The configured directory, or `datamd` under the platform cache
    /// directory, and finally `./.datamd-cache`.
    pub fn resolve_directory(&self) -> PathBuf {
        match (&self.directory, dirs::cache_dir()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(base)) => base.join("datamd"),
            (None, None) => PathBuf::from(".datamd-cache"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl Configuration {
    /// Look up a value by dotted path (e.g. `security.max_file_size_mb`).
    pub fn get(&self, key_path: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        key_path
            .split('.')
            .try_fold(&root, |value, key| value.get(key))
            .cloned()
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.performance.chunk_size == 0 {
            problems.push("performance.chunk_size must be at least 1".to_string());
        }
        if self.performance.streaming_threshold_mb.is_nan() || self.performance.streaming_threshold_mb < 0.0 {
            problems.push("performance.streaming_threshold_mb must not be negative".to_string());
        }
        if !positive(self.performance.max_memory_mb) {
            problems.push("performance.max_memory_mb must be positive".to_string());
        }
        if !positive(self.security.max_file_size_mb) {
            problems.push("security.max_file_size_mb must be positive".to_string());
        }
        if self.security.max_filename_length == 0 {
            problems.push("security.max_filename_length must be at least 1".to_string());
        }
        if self.processing.default_csv_separator.chars().count() != 1 {
            problems.push("processing.default_csv_separator must be a single character".to_string());
        }
        if self.limits.max_pages_pdf == 0 {
            problems.push("limits.max_pages_pdf must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn mib_to_bytes(mib: f64) -> u64 {
    if mib <= 0.0 {
        0
    } else {
        (mib * MIB) as u64
    }
}
