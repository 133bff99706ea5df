use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .path.display())]
    Missing { path: PathBuf },
    #[error("read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("{}: invalid json: {message}", .path.display())]
    Json { path: PathBuf, message: String },
    #[error("{}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
}

/// A named vocabulary category. Membership is configuration, never inferred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub members: Vec<String>,
}

impl BucketSpec {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RatioSpec {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    CorpusSummary,
    WordFrequency,
    CategoryBuckets,
    DerivedRatios,
    RecordCatalogue,
    IntegrityLog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorSpec {
    pub kind: GeneratorKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    pub expected_count: usize,
    pub buckets: Vec<BucketSpec>,
    #[serde(default)]
    pub ratios: Vec<RatioSpec>,
    pub manifest: Vec<String>,
    #[serde(default)]
    pub generators: BTreeMap<String, GeneratorSpec>,
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_title() -> String {
    "Corpus Report".to_string()
}

impl ReportConfig {
    pub fn load(path: &Path) -> Result<ReportConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut config: ReportConfig =
            serde_json::from_slice(&bytes).map_err(|err| ConfigError::Json {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    /// Structural checks that do not depend on the corpus.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = BTreeSet::new();
        for bucket in &self.buckets {
            if bucket.name.trim().is_empty() {
                return Err("bucket with empty name".to_string());
            }
            if !names.insert(bucket.name.as_str()) {
                return Err(format!("duplicate bucket name `{}`", bucket.name));
            }
        }
        let mut ratio_names = BTreeSet::new();
        for ratio in &self.ratios {
            if !ratio_names.insert(ratio.name.as_str()) {
                return Err(format!("duplicate ratio name `{}`", ratio.name));
            }
            for side in [&ratio.numerator, &ratio.denominator] {
                if !names.contains(side.as_str()) {
                    return Err(format!(
                        "ratio `{}` references unknown bucket `{}`",
                        ratio.name, side
                    ));
                }
            }
        }
        if self.manifest.is_empty() {
            return Err("manifest lists no sections".to_string());
        }
        let mut keys = BTreeSet::new();
        for key in &self.manifest {
            if !keys.insert(key.as_str()) {
                return Err(format!("manifest lists section `{}` twice", key));
            }
        }
        Ok(())
    }

    pub fn static_dir_path(&self) -> PathBuf {
        let dir = self
            .static_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));
        if dir.is_absolute() {
            dir
        } else {
            self.base_dir.join(dir)
        }
    }
}
