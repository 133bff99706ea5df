use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

const SUPPORTED_ALGORITHM: &str = "sha256";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("checksum manifest not found: {}", .path.display())]
    Missing { path: PathBuf },
    #[error("read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("{}:{line}: {message}", .path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// One `<algorithm>:<hexdigest>  <path>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub algorithm: String,
    pub digest: String,
    pub path: String,
}

impl ChecksumEntry {
    /// Resolves the entry path against the manifest's directory.
    pub fn resolve(&self, base_dir: &Path) -> PathBuf {
        let p = Path::new(&self.path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            base_dir.join(p)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    pub entries: Vec<ChecksumEntry>,
    pub base_dir: PathBuf,
}

impl ChecksumManifest {
    pub fn load(path: &Path) -> Result<ChecksumManifest, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::Missing {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|err| ManifestError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ChecksumManifest::parse(path, &text, base_dir)
    }

    pub fn parse(
        origin: &Path,
        text: &str,
        base_dir: PathBuf,
    ) -> Result<ChecksumManifest, ManifestError> {
        let mut entries = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let syntax = |message: String| ManifestError::Syntax {
                path: origin.to_path_buf(),
                line: idx + 1,
                message,
            };
            let Some((tagged, rest)) = line.split_once(char::is_whitespace) else {
                return Err(syntax("expected `<algorithm>:<hexdigest>  <path>`".to_string()));
            };
            let Some((algorithm, digest)) = tagged.split_once(':') else {
                return Err(syntax(format!("missing algorithm prefix in `{tagged}`")));
            };
            if algorithm != SUPPORTED_ALGORITHM {
                return Err(syntax(format!("unsupported checksum algorithm `{algorithm}`")));
            }
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(syntax(format!("invalid sha256 digest `{digest}`")));
            }
            let path = rest.trim();
            if path.is_empty() {
                return Err(syntax("missing path".to_string()));
            }
            entries.push(ChecksumEntry {
                algorithm: algorithm.to_string(),
                digest: digest.to_ascii_lowercase(),
                path: path.to_string(),
            });
        }
        Ok(ChecksumManifest { entries, base_dir })
    }

    /// Computes a manifest covering `paths`, recorded relative to `base_dir`
    /// when they live under it.
    pub fn seal(paths: &[PathBuf], base_dir: &Path) -> std::io::Result<ChecksumManifest> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let digest = sha256_file(path)?;
            let recorded = path
                .strip_prefix(base_dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            entries.push(ChecksumEntry {
                algorithm: SUPPORTED_ALGORITHM.to_string(),
                digest,
                path: recorded,
            });
        }
        Ok(ChecksumManifest {
            entries,
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "{}:{}  {}\n",
                entry.algorithm, entry.digest, entry.path
            ));
        }
        out
    }
}

pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
