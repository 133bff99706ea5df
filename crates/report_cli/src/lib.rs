//! Pipeline orchestration behind the `report-cli` binary.
//!
//! Every command runs the integrity gate first; nothing is written to the
//! output directory unless it passes.

mod failure;
mod pipeline;

pub use failure::{FailureKind, PipelineError};
pub use pipeline::{
    full_build, generate_chapters, generate_document, seal, stats, validate, BuildSummary,
    PipelineOptions, PipelinePaths, CHAPTERS_DIR, DEFAULT_CONFIG, DEFAULT_CORPUS,
    DEFAULT_OUT_DIR, LATEX_FILE, MARKDOWN_FILE,
};
