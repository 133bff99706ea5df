use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::checksum::{sha256_file, ChecksumManifest, ManifestError};
use crate::record::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("required input missing: {}", .path.display())]
    MissingFile { path: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("record count mismatch in {}: expected {expected}, loaded {actual}", .path.display())]
    CountMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("checksum mismatch for {}: manifest {expected}, computed {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("{} is not covered by checksum manifest {}", .path.display(), .manifest.display())]
    Unprotected { path: PathBuf, manifest: PathBuf },
    #[error("hash {}: {message}", .path.display())]
    Hash { path: PathBuf, message: String },
}

impl IntegrityError {
    fn hash(path: &Path, err: std::io::Error) -> Self {
        IntegrityError::Hash {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedFile {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GateReport {
    pub files_checked: Vec<String>,
    pub checksums_verified: Vec<VerifiedFile>,
    pub record_count: usize,
    pub corpus_sha256: String,
    /// Digest the manifest records for the corpus, when a manifest is in use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_manifest_sha256: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifiedCorpus {
    pub store: RecordStore,
    pub report: GateReport,
}

/// Precondition checked before any analysis; every failure is fatal.
#[derive(Debug, Clone)]
pub struct IntegrityGate {
    pub expected_count: usize,
    pub required: Vec<PathBuf>,
    pub checksums: Option<PathBuf>,
}

impl IntegrityGate {
    pub fn new(expected_count: usize) -> Self {
        Self {
            expected_count,
            required: Vec::new(),
            checksums: None,
        }
    }

    pub fn require(mut self, path: impl Into<PathBuf>) -> Self {
        self.required.push(path.into());
        self
    }

    pub fn with_checksums(mut self, manifest: Option<PathBuf>) -> Self {
        self.checksums = manifest;
        self
    }

    pub fn verify(&self, corpus: &Path) -> Result<VerifiedCorpus, IntegrityError> {
        let report = self.preflight(corpus)?;
        self.admit(corpus, report)
    }

    /// File presence and checksum checks; runs before any input is parsed.
    pub fn preflight(&self, corpus: &Path) -> Result<GateReport, IntegrityError> {
        let mut report = GateReport::default();

        for path in self.required.iter().map(PathBuf::as_path).chain([corpus]) {
            if !path.exists() {
                return Err(IntegrityError::MissingFile {
                    path: path.to_path_buf(),
                });
            }
            report.files_checked.push(path.display().to_string());
        }

        if let Some(manifest_path) = &self.checksums {
            let manifest = ChecksumManifest::load(manifest_path)?;
            let mut protected = Vec::with_capacity(manifest.entries.len());
            for entry in &manifest.entries {
                let path = entry.resolve(&manifest.base_dir);
                if !path.exists() {
                    return Err(IntegrityError::MissingFile { path });
                }
                let actual = sha256_file(&path).map_err(|err| IntegrityError::hash(&path, err))?;
                if actual != entry.digest {
                    return Err(IntegrityError::ChecksumMismatch {
                        path,
                        expected: entry.digest.clone(),
                        actual,
                    });
                }
                tracing::debug!(path = %path.display(), "checksum verified");
                let canonical = fs::canonicalize(&path).map_err(|err| IntegrityError::hash(&path, err))?;
                protected.push((canonical, entry.digest.clone()));
                report.checksums_verified.push(VerifiedFile {
                    path: entry.path.clone(),
                    sha256: actual,
                });
            }

            // Every input the run reads must be one of the verified files.
            for path in self.required.iter().map(PathBuf::as_path).chain([corpus]) {
                let canonical = fs::canonicalize(path).map_err(|err| IntegrityError::hash(path, err))?;
                let digest = protected
                    .iter()
                    .find(|(p, _)| *p == canonical)
                    .map(|(_, digest)| digest.clone())
                    .ok_or_else(|| IntegrityError::Unprotected {
                        path: path.to_path_buf(),
                        manifest: manifest_path.clone(),
                    })?;
                if path == corpus {
                    report.corpus_manifest_sha256 = Some(digest);
                }
            }
        }
        Ok(report)
    }

    /// Loads the corpus and holds it to the expected record count.
    pub fn admit(
        &self,
        corpus: &Path,
        mut report: GateReport,
    ) -> Result<VerifiedCorpus, IntegrityError> {
        let store = RecordStore::load(corpus)?;
        // The bytes parsed must be the bytes the manifest vouched for.
        if let Some(expected) = &report.corpus_manifest_sha256 {
            if store.sha256() != expected {
                return Err(IntegrityError::ChecksumMismatch {
                    path: corpus.to_path_buf(),
                    expected: expected.clone(),
                    actual: store.sha256().to_string(),
                });
            }
        }
        if store.count() != self.expected_count {
            return Err(IntegrityError::CountMismatch {
                path: corpus.to_path_buf(),
                expected: self.expected_count,
                actual: store.count(),
            });
        }
        report.record_count = store.count();
        report.corpus_sha256 = store.sha256().to_string();

        tracing::info!(
            corpus = %corpus.display(),
            records = report.record_count,
            checksums = report.checksums_verified.len(),
            "integrity gate passed"
        );
        Ok(VerifiedCorpus { store, report })
    }
}

/// Gate check without keeping the loaded store.
pub fn verify(
    expected_count: usize,
    paths: &[PathBuf],
    corpus: &Path,
) -> Result<(), IntegrityError> {
    let gate = IntegrityGate {
        expected_count,
        required: paths.to_vec(),
        checksums: None,
    };
    gate.verify(corpus).map(|_| ())
}
