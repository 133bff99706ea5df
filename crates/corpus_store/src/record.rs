use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Column names, in order, of the corpus header line.
pub const CORPUS_COLUMNS: [&str; 3] = ["id", "source_tokens", "translation_text"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corpus file not found: {}", .path.display())]
    Missing { path: PathBuf },
    #[error("read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("{}: corpus is not valid UTF-8", .path.display())]
    Encoding { path: PathBuf },
    #[error("{}: expected header `{}`, found `{found}`", .path.display(), CORPUS_COLUMNS.join("\\t"))]
    Header { path: PathBuf, found: String },
    #[error("{}:{line}: {message}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{}:{line}: duplicate id `{id}` (first seen on line {first_line})", .path.display())]
    DuplicateId {
        path: PathBuf,
        id: String,
        line: usize,
        first_line: usize,
    },
}

/// One inscription paired with its purported translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub source_tokens: Vec<String>,
    pub translation_text: String,
}

impl Record {
    pub fn has_translation(&self) -> bool {
        !self.translation_text.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    sha256: String,
    records: Vec<Record>,
}

impl RecordStore {
    pub fn load(path: &Path) -> Result<RecordStore, StoreError> {
        if !path.exists() {
            return Err(StoreError::Missing {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path).map_err(|err| StoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let sha256 = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        };
        let text = String::from_utf8(bytes).map_err(|_| StoreError::Encoding {
            path: path.to_path_buf(),
        })?;
        let records = parse_records(path, &text)?;
        tracing::debug!(path = %path.display(), records = records.len(), "corpus parsed");
        Ok(RecordStore {
            sha256,
            records,
        })
    }

    /// Builds a store from records already in memory; ids must be unique.
    pub fn from_records(source: &Path, records: Vec<Record>) -> Result<RecordStore, StoreError> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            if let Some(first) = seen.insert(record.id.as_str(), idx + 1) {
                return Err(StoreError::DuplicateId {
                    path: source.to_path_buf(),
                    id: record.id.clone(),
                    line: idx + 1,
                    first_line: first,
                });
            }
        }
        Ok(RecordStore {
            sha256: String::new(),
            records,
        })
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn translated_count(&self) -> usize {
        self.records.iter().filter(|r| r.has_translation()).count()
    }

    /// SHA-256 of the raw corpus bytes; empty for in-memory stores.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

fn parse_records(path: &Path, text: &str) -> Result<Vec<Record>, StoreError> {
    // `lines` also strips the `\r` of CRLF endings.
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(StoreError::Header {
            path: path.to_path_buf(),
            found: String::new(),
        });
    };
    let columns: Vec<&str> = header.split('\t').map(|c| c.trim()).collect();
    if columns != CORPUS_COLUMNS {
        return Err(StoreError::Header {
            path: path.to_path_buf(),
            found: header.to_string(),
        });
    }

    let mut records = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for (line_no, line) in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != CORPUS_COLUMNS.len() {
            return Err(StoreError::Malformed {
                path: path.to_path_buf(),
                line: line_no,
                message: format!(
                    "expected {} tab-separated columns, found {}",
                    CORPUS_COLUMNS.len(),
                    fields.len()
                ),
            });
        }
        let id = fields[0].trim();
        if id.is_empty() {
            return Err(StoreError::Malformed {
                path: path.to_path_buf(),
                line: line_no,
                message: "empty id".to_string(),
            });
        }
        if let Some(first_line) = first_seen.get(id) {
            return Err(StoreError::DuplicateId {
                path: path.to_path_buf(),
                id: id.to_string(),
                line: line_no,
                first_line: *first_line,
            });
        }
        first_seen.insert(id.to_string(), line_no);
        records.push(Record {
            id: id.to_string(),
            source_tokens: fields[1].split_whitespace().map(str::to_string).collect(),
            translation_text: fields[2].to_string(),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Vec<Record>, StoreError> {
        parse_records(Path::new("corpus.tsv"), text)
    }

    #[test]
    fn parses_rows_in_file_order() {
        let records = parse(
            "id\tsource_tokens\ttranslation_text\nH001\t1 342 125\tone grain-sack\nH002\t\t\n",
        )
        .expect("parse");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "H001");
        assert_eq!(records[0].source_tokens, vec!["1", "342", "125"]);
        assert_eq!(records[0].translation_text, "one grain-sack");
        assert!(records[1].source_tokens.is_empty());
        assert_eq!(records[1].translation_text, "");
    }

    #[test]
    fn crlf_and_blank_lines_are_tolerated() {
        let records =
            parse("id\tsource_tokens\ttranslation_text\r\n\r\nA\t1\tfather\r\n\r\n").expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].translation_text, "father");
    }

    #[test]
    fn wrong_header_is_rejected() {
        let err = parse("inscr_id\tsign_seq\tenglish\nA\t1\tx\n").unwrap_err();
        assert!(matches!(err, StoreError::Header { .. }));
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, StoreError::Header { .. }));
    }

    #[test]
    fn wrong_column_count_names_line() {
        let err = parse("id\tsource_tokens\ttranslation_text\nA\t1\tx\nB\t2\n").unwrap_err();
        match err {
            StoreError::Malformed { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_id_reports_both_lines() {
        let err = parse("id\tsource_tokens\ttranslation_text\nA\t1\tx\nB\t2\ty\nA\t3\tz\n")
            .unwrap_err();
        match err {
            StoreError::DuplicateId {
                id,
                line,
                first_line,
                ..
            } => {
                assert_eq!(id, "A");
                assert_eq!(line, 4);
                assert_eq!(first_line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn translated_count_ignores_blank_translations() {
        let store = RecordStore::from_records(
            Path::new("mem"),
            vec![
                Record {
                    id: "a".into(),
                    source_tokens: vec![],
                    translation_text: "water".into(),
                },
                Record {
                    id: "b".into(),
                    source_tokens: vec![],
                    translation_text: "   ".into(),
                },
            ],
        )
        .expect("store");
        assert_eq!(store.count(), 2);
        assert_eq!(store.translated_count(), 1);
        assert!(store.get("b").is_some());
    }
}
