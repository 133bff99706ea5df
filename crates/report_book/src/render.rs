use chrono::Utc;
use thiserror::Error;

use crate::markdown_latex::md_to_latex;
use crate::model::{Document, FrontMatter, Section, TocEntry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("document has no sections")]
    Empty,
    #[error("section `{key}` has ordinal {found}, expected {expected}")]
    OrdinalGap {
        key: String,
        expected: usize,
        found: usize,
    },
}

pub fn default_latex_template() -> &'static str {
    r#"\documentclass[11pt,a4paper]{report}
\usepackage[T1]{fontenc}
\usepackage[utf8]{inputenc}
\usepackage[margin=2.5cm]{geometry}
\usepackage{longtable}
\usepackage{fancyvrb}
\usepackage[hidelinks]{hyperref}
\DefineVerbatimEnvironment{ledgercode}{Verbatim}{fontsize=\small,frame=single}
\title{{{TITLE}}{{SUBTITLE}}}
\author{{{AUTHOR}}}
\date{{{DATE}}}
\begin{document}
\maketitle
\tableofcontents

{{BODY}}
\end{document}
"#
}

/// Numbers are taken as given; they must run 1, 2, 3, ... in order.
pub fn assemble(sections: Vec<Section>, front_matter: FrontMatter) -> Result<Document, AssembleError> {
    if sections.is_empty() {
        return Err(AssembleError::Empty);
    }
    for (idx, section) in sections.iter().enumerate() {
        if section.ordinal != idx + 1 {
            return Err(AssembleError::OrdinalGap {
                key: section.key.clone(),
                expected: idx + 1,
                found: section.ordinal,
            });
        }
    }
    tracing::debug!(sections = sections.len(), "document assembled");
    Ok(Document {
        front_matter,
        sections,
    })
}

pub fn section_anchor(key: &str) -> String {
    format!("sec-{}", slugify(key))
}

impl Document {
    pub fn toc(&self) -> Vec<TocEntry> {
        self.sections
            .iter()
            .map(|s| TocEntry {
                ordinal: s.ordinal,
                title: s.title.clone(),
                anchor: section_anchor(&s.key),
            })
            .collect()
    }

    pub fn to_markdown(&self) -> String {
        let fm = &self.front_matter;
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", fm.title));
        if let Some(subtitle) = &fm.subtitle {
            out.push_str(&format!("_{}_\n\n", subtitle));
        }
        let byline: Vec<&str> = [fm.author.as_deref(), fm.date.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !byline.is_empty() {
            out.push_str(&byline.join(" | "));
            out.push_str("\n\n");
        }

        out.push_str("## Contents\n\n");
        for entry in self.toc() {
            out.push_str(&format!(
                "{}. [{}](#{})\n",
                entry.ordinal, entry.title, entry.anchor
            ));
        }
        out.push_str("\n---\n\n");

        for section in &self.sections {
            out.push_str(&format!("<a id=\"{}\"></a>\n\n", section_anchor(&section.key)));
            out.push_str(&format!("## {}. {}\n\n", section.ordinal, section.title));
            out.push_str(&section.body);
            if !section.body.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("\n---\n\n");
        }
        out
    }

    pub fn to_latex(&self, template: &str) -> String {
        let mut body = String::new();
        for section in &self.sections {
            body.push_str(&format!(
                "\\chapter{{{}}}\\label{{{}}}\n\n",
                latex_escape(&section.title),
                section_label(&section.key)
            ));
            body.push_str(&md_to_latex(section.body.trim_end()));
            body.push('\n');
        }
        let fm = &self.front_matter;
        let subtitle = fm
            .subtitle
            .as_deref()
            .map(|s| format!("\\\\[0.5em]\\large {}", latex_escape(s)))
            .unwrap_or_default();
        let date = fm
            .date
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
        template
            .replace("{{TITLE}}", &latex_escape(&fm.title))
            .replace("{{SUBTITLE}}", &subtitle)
            .replace("{{AUTHOR}}", &latex_escape(fm.author.as_deref().unwrap_or_default()))
            .replace("{{DATE}}", &latex_escape(&date))
            .replace("{{BODY}}", &body)
    }
}

/// Lowercase ASCII words joined by `-`; used for file names, anchors and
/// labels alike.
pub fn slugify(input: &str) -> String {
    let words: Vec<String> = input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    if words.is_empty() {
        "section".to_string()
    } else {
        words.join("-")
    }
}

/// `\label` target of the chapter for `key`.
pub(crate) fn section_label(key: &str) -> String {
    format!("sec:{}", slugify(key))
}

pub(crate) fn latex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '{' | '}' | '$' | '&' | '#' | '_' | '%' => {
                out.push('\\');
                out.push(c);
            }
            '^' | '~' => {
                out.push('\\');
                out.push(c);
                out.push_str("{}");
            }
            '\\' => out.push_str("\\textbackslash{}"),
            '|' => out.push_str("\\textbar{}"),
            '<' => out.push_str("\\textless{}"),
            '>' => out.push_str("\\textgreater{}"),
            _ => match typographic(c) {
                Some(plain) => out.push_str(plain),
                None => out.push(c),
            },
        }
    }
    out
}

/// Curly quotes, dashes and arrows in their plain LaTeX spelling.
fn typographic(c: char) -> Option<&'static str> {
    let plain = match c {
        '\u{2014}' => "---",
        '\u{2013}' => "--",
        '\u{201C}' => "``",
        '\u{201D}' => "''",
        '\u{2018}' => "`",
        '\u{2019}' => "'",
        '\u{2192}' => "$\\rightarrow$",
        _ => return None,
    };
    Some(plain)
}
