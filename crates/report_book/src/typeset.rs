use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_TYPESETTER: &str = "pdflatex";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypesetPass {
    First,
    Second,
}

impl TypesetPass {
    fn number(self) -> u8 {
        match self {
            TypesetPass::First => 1,
            TypesetPass::Second => 2,
        }
    }
}

impl fmt::Display for TypesetPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypesetPass::First => f.write_str("first"),
            TypesetPass::Second => f.write_str("second"),
        }
    }
}

/// The external tool's own output is carried untouched in `diagnostics`.
#[derive(Debug, Clone, Error)]
#[error("typesetting {pass} pass failed ({status})\n{diagnostics}")]
pub struct RenderFailure {
    pub pass: TypesetPass,
    pub status: String,
    pub diagnostics: String,
}

#[derive(Debug, Clone)]
pub struct TypesetJob {
    pub tex_path: PathBuf,
    pub out_dir: PathBuf,
}

impl TypesetJob {
    pub fn new(tex_path: impl Into<PathBuf>) -> Self {
        let tex_path = tex_path.into();
        let out_dir = match tex_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self { tex_path, out_dir }
    }

    fn stem(&self) -> String {
        self.tex_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string())
    }

    fn file_name(&self) -> &OsStr {
        self.tex_path
            .file_name()
            .unwrap_or_else(|| self.tex_path.as_os_str())
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.pdf", self.stem()))
    }

    pub fn log_path(&self, pass: TypesetPass) -> PathBuf {
        self.out_dir
            .join(format!("{}.pass{}.log", self.stem(), pass.number()))
    }
}

/// Two-step typesetting: the first pass resolves references, the second
/// settles the table of contents.
pub trait Typesetter {
    fn first_pass(&self, job: &TypesetJob) -> Result<(), RenderFailure>;
    fn second_pass(&self, job: &TypesetJob) -> Result<(), RenderFailure>;
}

/// Runs both passes in order and returns the produced PDF path.
pub fn typeset(job: &TypesetJob, typesetter: &dyn Typesetter) -> Result<PathBuf, RenderFailure> {
    tracing::info!(tex = %job.tex_path.display(), "typesetting first pass");
    typesetter.first_pass(job)?;
    tracing::info!(tex = %job.tex_path.display(), "typesetting second pass");
    typesetter.second_pass(job)?;
    let pdf = job.pdf_path();
    if !pdf.exists() {
        return Err(RenderFailure {
            pass: TypesetPass::Second,
            status: "no output".to_string(),
            diagnostics: format!("expected {} was not produced", pdf.display()),
        });
    }
    Ok(pdf)
}

#[derive(Debug, Clone)]
pub struct CommandTypesetter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandTypesetter {
    fn default() -> Self {
        Self::new(DEFAULT_TYPESETTER)
    }
}

impl CommandTypesetter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "-interaction=nonstopmode".to_string(),
                "-halt-on-error".to_string(),
            ],
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replaces the flags passed ahead of `-output-directory . <file>`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, pass: TypesetPass, job: &TypesetJob) -> Result<(), RenderFailure> {
        let fail = |status: String, diagnostics: String| RenderFailure {
            pass,
            status,
            diagnostics,
        };
        let log_path = job.log_path(pass);
        let log = File::create(&log_path)
            .map_err(|e| fail("io error".to_string(), format!("create {}: {e}", log_path.display())))?;
        let log_err = log
            .try_clone()
            .map_err(|e| fail("io error".to_string(), format!("clone {}: {e}", log_path.display())))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            // Runs inside the output directory, so paths are relative to it.
            .current_dir(&job.out_dir)
            .arg("-output-directory")
            .arg(".")
            .arg(job.file_name())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| {
                fail(
                    "failed to start".to_string(),
                    format!("failed to run `{}`: {e}", self.program.display()),
                )
            })?;

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::error!(pass = %pass, timeout_secs = self.timeout.as_secs(), "typesetter timed out");
                    return Err(fail(
                        format!("timed out after {}s", self.timeout.as_secs()),
                        read_log(&log_path),
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(fail("wait failed".to_string(), e.to_string())),
            }
        };

        if !status.success() {
            return Err(fail(status.to_string(), read_log(&log_path)));
        }
        tracing::debug!(pass = %pass, log = %log_path.display(), "typesetter pass finished");
        Ok(())
    }
}

fn read_log(path: &Path) -> String {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

impl Typesetter for CommandTypesetter {
    fn first_pass(&self, job: &TypesetJob) -> Result<(), RenderFailure> {
        self.run(TypesetPass::First, job)
    }

    fn second_pass(&self, job: &TypesetJob) -> Result<(), RenderFailure> {
        self.run(TypesetPass::Second, job)
    }
}
