//! Turns a verified corpus into report chapters and a typeset document.

mod analyze;
mod compose;
mod config;
mod markdown_latex;
mod model;
mod render;
mod typeset;

pub use analyze::{
    format_percentage, format_tenths, normalize_token, percentage, round_half_even, tokenize,
    AnalyzeError, Analyzer,
};
pub use compose::{
    compose, title_from_key, ComposeContext, ComposeError, Generator, StaticSection,
    StaticSections, Templates,
};
pub use config::{BucketSpec, ConfigError, GeneratorKind, GeneratorSpec, RatioSpec, ReportConfig};
pub use markdown_latex::md_to_latex;
pub use model::*;
pub use render::{assemble, default_latex_template, section_anchor, slugify, AssembleError};
pub use typeset::{
    typeset, CommandTypesetter, RenderFailure, TypesetJob, TypesetPass, Typesetter,
    DEFAULT_TIMEOUT, DEFAULT_TYPESETTER,
};
pub(crate) use render::{latex_escape, section_label};

impl ReportConfig {
    pub fn front_matter(&self) -> FrontMatter {
        FrontMatter {
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            author: self.author.clone(),
            date: self.date.clone(),
        }
    }

    pub fn templates(&self) -> Templates {
        Templates::builtin().with_overrides(&self.generators)
    }
}
