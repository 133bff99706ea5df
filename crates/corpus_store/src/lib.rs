//! Loading and verification of the translation corpus.
//!
//! The corpus is a tab-delimited file with a fixed `id`, `source_tokens`,
//! `translation_text` schema. Records are immutable once loaded; downstream
//! stages only ever borrow them.

mod checksum;
mod gate;
mod record;

pub use checksum::{sha256_file, ChecksumEntry, ChecksumManifest, ManifestError};
pub use gate::{verify, GateReport, IntegrityError, IntegrityGate, VerifiedCorpus, VerifiedFile};
pub use record::{Record, RecordStore, StoreError, CORPUS_COLUMNS};
