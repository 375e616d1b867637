//! Tabular artifact parsing.
//!
//! Extraction and enrichment artifacts are loosely specified comma-separated
//! exports. Turning one into typed records takes three steps:
//!
//! 1. [`row`]: split each line into field values (quoting, escaped quotes,
//!    BOM).
//! 2. [`columns`]: infer which header cell holds which logical column from a
//!    synonym table, falling back to a fixed positional layout.
//! 3. [`records`]: build [`ParsedRecord`]s, skipping short rows, and expose
//!    the aggregates a results view needs (grand total, filter, sort).
//!
//! [`money`] holds the numeric normalisation shared by all of them.

pub mod columns;
pub mod money;
pub mod records;
pub mod row;

pub use columns::{ColumnMapping, ColumnSynonyms, MappingKind, RecordColumn};
pub use money::{format_brl, normalize_money};
pub use records::{ParsedRecord, RecordTable, SkippedRow, SortDirection};
pub use row::split_record;
