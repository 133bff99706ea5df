use std::fmt;
use std::path::PathBuf;

use corpus_store::IntegrityError;
use report_book::{AnalyzeError, AssembleError, ComposeError, ConfigError, RenderFailure};
use thiserror::Error;

/// Failure categories, each with its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    Io,
    DataIntegrity,
    CountMismatch,
    ChecksumMismatch,
    TemplateMissing,
    RenderFailure,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::Config | FailureKind::Io => 1,
            FailureKind::DataIntegrity => 2,
            FailureKind::CountMismatch => 3,
            FailureKind::ChecksumMismatch => 4,
            FailureKind::TemplateMissing => 5,
            FailureKind::RenderFailure => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Config => "config",
            FailureKind::Io => "io",
            FailureKind::DataIntegrity => "data_integrity",
            FailureKind::CountMismatch => "count_mismatch",
            FailureKind::ChecksumMismatch => "checksum_mismatch",
            FailureKind::TemplateMissing => "template_missing",
            FailureKind::RenderFailure => "render_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}: {source}", .path.display())]
    Analyzer {
        path: PathBuf,
        #[source]
        source: AnalyzeError,
    },
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error("assemble: {0}")]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Render(#[from] RenderFailure),
    #[error("{stage}: {}: {message}", .path.display())]
    Io {
        stage: &'static str,
        path: PathBuf,
        message: String,
    },
    #[error("write output: {0}")]
    Output(String),
}

impl PipelineError {
    pub(crate) fn io(stage: &'static str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        PipelineError::Io {
            stage,
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Config(_)
            | PipelineError::Analyzer { .. }
            | PipelineError::Assemble(_) => FailureKind::Config,
            PipelineError::Integrity(err) => match err {
                IntegrityError::CountMismatch { .. } => FailureKind::CountMismatch,
                IntegrityError::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
                IntegrityError::Hash { .. } => FailureKind::Io,
                IntegrityError::MissingFile { .. }
                | IntegrityError::Unprotected { .. }
                | IntegrityError::Store(_)
                | IntegrityError::Manifest(_) => FailureKind::DataIntegrity,
            },
            PipelineError::Compose(err) => match err {
                ComposeError::TemplateMissing { .. } => FailureKind::TemplateMissing,
                ComposeError::DuplicateKey { .. } => FailureKind::Config,
                ComposeError::Io { .. } => FailureKind::Io,
            },
            PipelineError::Render(_) => FailureKind::RenderFailure,
            PipelineError::Io { .. } | PipelineError::Output(_) => FailureKind::Io,
        }
    }
}
