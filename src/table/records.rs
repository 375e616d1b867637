//! Typed records and table-level aggregates.

use super::columns::{ColumnMapping, ColumnSynonyms, RecordColumn};
use super::money::{format_brl, normalize_money};
use super::row::split_record;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// One data row of a tabular artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRecord {
    pub item_id: String,
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_value: f64,
    pub total_value: f64,
    pub base_product: Option<String>,
    pub similarity: Option<f64>,
}

impl ParsedRecord {
    fn from_values(values: &[String], mapping: &ColumnMapping) -> Self {
        let text = |column| cell(values, mapping, column).unwrap_or("");
        let optional = |column| cell(values, mapping, column).filter(|v| !v.is_empty());

        Self {
            item_id: text(RecordColumn::ItemId).to_string(),
            description: text(RecordColumn::Description).to_string(),
            quantity: normalize_money(text(RecordColumn::Quantity)),
            unit: text(RecordColumn::Unit).to_string(),
            unit_value: normalize_money(text(RecordColumn::UnitValue)),
            total_value: normalize_money(text(RecordColumn::TotalValue)),
            base_product: optional(RecordColumn::BaseProduct).map(str::to_string),
            similarity: optional(RecordColumn::Similarity).map(normalize_money),
        }
    }

    fn numeric_key(&self, column: RecordColumn) -> f64 {
        match column {
            RecordColumn::ItemId => normalize_money(&self.item_id),
            RecordColumn::Quantity => self.quantity,
            RecordColumn::UnitValue => self.unit_value,
            RecordColumn::TotalValue => self.total_value,
            RecordColumn::Similarity => self.similarity.unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn text_key(&self, column: RecordColumn) -> &str {
        match column {
            RecordColumn::Description => &self.description,
            RecordColumn::Unit => &self.unit,
            RecordColumn::BaseProduct => self.base_product.as_deref().unwrap_or(""),
            _ => "",
        }
    }

    /// Case-insensitive match on the description, substring match on the item id.
    pub fn matches(&self, term: &str) -> bool {
        term.is_empty()
            || self.description.to_lowercase().contains(&term.to_lowercase())
            || self.item_id.contains(term)
    }
}

fn cell<'a>(values: &'a [String], mapping: &ColumnMapping, column: RecordColumn) -> Option<&'a str> {
    mapping
        .index(column)
        .and_then(|i| values.get(i))
        .map(String::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Clicking the same column again flips the direction.
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// A data row that did not have enough fields for the mandatory columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    /// 1-based line number among the non-blank lines, header included.
    pub line_number: usize,
    pub field_count: usize,
}

/// Parsed content of one tabular artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RecordTable {
    pub mapping: ColumnMapping,
    pub records: Vec<ParsedRecord>,
    pub skipped: Vec<SkippedRow>,
}

impl RecordTable {
    /// Parse raw artifact text.
    ///
    /// The first non-blank line is the header. Text with no data lines gives
    /// an empty table. Short rows are skipped and reported, never fatal.
    pub fn parse(text: &str, synonyms: &ColumnSynonyms) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let Some(header_line) = lines.next() else {
            return Self::empty(ColumnMapping::positional());
        };
        let header = split_record(header_line);
        let mapping = synonyms.resolve(&header);
        let width = mapping.required_width();

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for (offset, line) in lines.enumerate() {
            let values = split_record(line);
            if values.len() < width {
                let line_number = offset + 2;
                warn!(
                    "Row {} has {} fields, need at least {}; skipped",
                    line_number,
                    values.len(),
                    width
                );
                skipped.push(SkippedRow {
                    line_number,
                    field_count: values.len(),
                });
                continue;
            }
            records.push(ParsedRecord::from_values(&values, &mapping));
        }

        debug!(
            "Parsed {} records ({} skipped, mapping {:?})",
            records.len(),
            skipped.len(),
            mapping.kind
        );
        Self {
            mapping,
            records,
            skipped,
        }
    }

    fn empty(mapping: ColumnMapping) -> Self {
        Self {
            mapping,
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of every record's total value.
    pub fn grand_total(&self) -> f64 {
        self.records.iter().map(|r| r.total_value).sum()
    }

    pub fn grand_total_brl(&self) -> String {
        format_brl(self.grand_total())
    }

    /// Records matching `term`, in source order.
    pub fn filter<'a>(&'a self, term: &str) -> Vec<&'a ParsedRecord> {
        self.records.iter().filter(|r| r.matches(term)).collect()
    }

    /// Filtered and optionally sorted view, as a results table would show it.
    pub fn view<'a>(
        &'a self,
        term: &str,
        sort: Option<(RecordColumn, SortDirection)>,
    ) -> Vec<&'a ParsedRecord> {
        let mut rows = self.filter(term);
        if let Some((column, direction)) = sort {
            sort_records(&mut rows, column, direction);
        }
        rows
    }
}

/// Stable sort. Numeric columns compare normalised numbers; text columns put
/// empty values first when ascending.
pub fn sort_records(rows: &mut [&ParsedRecord], column: RecordColumn, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = if column.is_numeric() {
            a.numeric_key(column).total_cmp(&b.numeric_key(column))
        } else {
            compare_text(a.text_key(column), b.text_key(column))
        };
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

fn compare_text(a: &str, b: &str) -> Ordering {
    (!a.is_empty(), a).cmp(&(!b.is_empty(), b))
}
