//! Header recognition.
//!
//! [`ColumnSynonyms`] is plain data: one list of header substrings per
//! logical column. [`ColumnSynonyms::resolve`] picks, for every column, the
//! first header cell whose uppercase text contains any of its synonyms. If
//! one of the mandatory columns (item id, description, quantity, unit) stays
//! unresolved, the whole inference is discarded in favour of the canonical
//! positional layout.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Logical columns of a tabular artifact, in canonical positional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordColumn {
    ItemId,
    Description,
    Quantity,
    Unit,
    UnitValue,
    TotalValue,
    BaseProduct,
    Similarity,
}

impl RecordColumn {
    pub const ALL: [RecordColumn; 8] = [
        RecordColumn::ItemId,
        RecordColumn::Description,
        RecordColumn::Quantity,
        RecordColumn::Unit,
        RecordColumn::UnitValue,
        RecordColumn::TotalValue,
        RecordColumn::BaseProduct,
        RecordColumn::Similarity,
    ];

    pub const MANDATORY: [RecordColumn; 4] = [
        RecordColumn::ItemId,
        RecordColumn::Description,
        RecordColumn::Quantity,
        RecordColumn::Unit,
    ];

    /// Index used by the positional fallback.
    pub fn position(self) -> usize {
        self as usize
    }

    /// Sorting compares normalised numbers for these columns.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            RecordColumn::ItemId
                | RecordColumn::Quantity
                | RecordColumn::UnitValue
                | RecordColumn::TotalValue
                | RecordColumn::Similarity
        )
    }

    /// Parse a user-supplied column name (`item`, `description`, `total`, …).
    pub fn from_name(name: &str) -> Option<Self> {
        let column = match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "item" | "item_id" => RecordColumn::ItemId,
            "description" | "desc" => RecordColumn::Description,
            "quantity" | "qty" => RecordColumn::Quantity,
            "unit" => RecordColumn::Unit,
            "unit_value" | "price" => RecordColumn::UnitValue,
            "total" | "total_value" => RecordColumn::TotalValue,
            "base_product" | "product" => RecordColumn::BaseProduct,
            "similarity" => RecordColumn::Similarity,
            _ => return None,
        };
        Some(column)
    }
}

/// Header substrings recognised for each logical column.
///
/// Matching is case-insensitive: header cells and synonyms are both
/// uppercased before comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSynonyms {
    pub item_id: Vec<String>,
    pub description: Vec<String>,
    pub quantity: Vec<String>,
    pub unit: Vec<String>,
    pub unit_value: Vec<String>,
    pub total_value: Vec<String>,
    pub base_product: Vec<String>,
    pub similarity: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnSynonyms {
    fn default() -> Self {
        Self {
            item_id: words(&["ITEM"]),
            description: words(&["DESC", "DESCRIÇÃO"]),
            quantity: words(&["QUANT", "QTD"]),
            unit: words(&["UN", "UNIDADE"]),
            unit_value: words(&["UNIT", "VALOR_UNITARIO"]),
            total_value: words(&["TOTAL"]),
            base_product: words(&["PRODUTO_BASE", "PRODUTO BASE"]),
            similarity: words(&["SIMILAR"]),
        }
    }
}

impl ColumnSynonyms {
    pub fn for_column(&self, column: RecordColumn) -> &[String] {
        match column {
            RecordColumn::ItemId => &self.item_id,
            RecordColumn::Description => &self.description,
            RecordColumn::Quantity => &self.quantity,
            RecordColumn::Unit => &self.unit,
            RecordColumn::UnitValue => &self.unit_value,
            RecordColumn::TotalValue => &self.total_value,
            RecordColumn::BaseProduct => &self.base_product,
            RecordColumn::Similarity => &self.similarity,
        }
    }

    /// Add a synonym for `column`. Stored uppercase.
    pub fn with_synonym(mut self, column: RecordColumn, synonym: &str) -> Self {
        let upper = synonym.to_uppercase();
        match column {
            RecordColumn::ItemId => self.item_id.push(upper),
            RecordColumn::Description => self.description.push(upper),
            RecordColumn::Quantity => self.quantity.push(upper),
            RecordColumn::Unit => self.unit.push(upper),
            RecordColumn::UnitValue => self.unit_value.push(upper),
            RecordColumn::TotalValue => self.total_value.push(upper),
            RecordColumn::BaseProduct => self.base_product.push(upper),
            RecordColumn::Similarity => self.similarity.push(upper),
        }
        self
    }

    fn find(&self, column: RecordColumn, header: &[String]) -> Option<usize> {
        let synonyms = self.for_column(column);
        header.iter().position(|cell| {
            let cell = cell.to_uppercase();
            synonyms.iter().any(|s| cell.contains(&s.to_uppercase()))
        })
    }

    /// Map logical columns onto header positions.
    pub fn resolve(&self, header: &[String]) -> ColumnMapping {
        let inferred = ColumnMapping {
            kind: MappingKind::Synonyms,
            indices: RecordColumn::ALL.map(|c| self.find(c, header)),
        };

        let missing: Vec<RecordColumn> = RecordColumn::MANDATORY
            .into_iter()
            .filter(|c| inferred.index(*c).is_none())
            .collect();
        if missing.is_empty() {
            return inferred;
        }

        warn!(
            "Header columns not recognised: {:?}; using positional mapping",
            missing
        );
        ColumnMapping::positional()
    }
}

/// How a [`ColumnMapping`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Synonyms,
    Positional,
}

/// Resolved position of every logical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub kind: MappingKind,
    indices: [Option<usize>; 8],
}

impl ColumnMapping {
    /// Canonical layout: columns 0–7 in [`RecordColumn::ALL`] order.
    pub fn positional() -> Self {
        Self {
            kind: MappingKind::Positional,
            indices: RecordColumn::ALL.map(|c| Some(c.position())),
        }
    }

    pub fn index(&self, column: RecordColumn) -> Option<usize> {
        self.indices[column.position()]
    }

    /// Minimum field count for a data row to be kept.
    pub fn required_width(&self) -> usize {
        RecordColumn::MANDATORY
            .into_iter()
            .filter_map(|c| self.index(c))
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Same column positions, ignoring how they were found.
    pub fn same_layout(&self, other: &ColumnMapping) -> bool {
        self.indices == other.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row::split_record;

    fn header(line: &str) -> Vec<String> {
        split_record(line)
    }

    #[test]
    fn unknown_header_falls_back_to_positional() {
        let m = ColumnSynonyms::default().resolve(&header("a,b,c,d,e,f"));
        assert_eq!(m.kind, MappingKind::Positional);
        assert_eq!(m.index(RecordColumn::Similarity), Some(7));
    }

    #[test]
    fn canonical_header_matches_positional_layout() {
        let m = ColumnSynonyms::default().resolve(&header(
            "ITEM,DESCRIÇÃO,QTD,UN,VALOR_UNITARIO,VALOR_TOTAL,PRODUTO_BASE,SIMILARIDADE",
        ));
        assert_eq!(m.kind, MappingKind::Synonyms);
        assert!(m.same_layout(&ColumnMapping::positional()));
    }

    #[test]
    fn lowercase_headers_are_recognised() {
        let m = ColumnSynonyms::default().resolve(&header("descrição,item,quantidade,unidade"));
        assert_eq!(m.kind, MappingKind::Synonyms);
        assert_eq!(m.index(RecordColumn::Description), Some(0));
        assert_eq!(m.index(RecordColumn::ItemId), Some(1));
        assert_eq!(m.index(RecordColumn::Unit), Some(3));
        assert_eq!(m.index(RecordColumn::TotalValue), None);
        assert_eq!(m.required_width(), 4);
    }

    #[test]
    fn one_missing_mandatory_column_discards_inference() {
        let m = ColumnSynonyms::default().resolve(&header("ITEM,DESCRIÇÃO,QTD,PRECO"));
        assert_eq!(m.kind, MappingKind::Positional);
    }

    #[test]
    fn custom_synonym_is_used() {
        let synonyms = ColumnSynonyms::default().with_synonym(RecordColumn::Unit, "medida");
        let m = synonyms.resolve(&header("ITEM,DESC,QTD,MEDIDA"));
        assert_eq!(m.kind, MappingKind::Synonyms);
        assert_eq!(m.index(RecordColumn::Unit), Some(3));
    }

    #[test]
    fn lowercase_synonyms_in_fields_still_match() {
        let synonyms = ColumnSynonyms {
            unit: vec!["medida".into()],
            ..ColumnSynonyms::default()
        };
        let m = synonyms.resolve(&header("Item,Descrição,Qtd,Medida"));
        assert_eq!(m.kind, MappingKind::Synonyms);
        assert_eq!(m.index(RecordColumn::Unit), Some(3));
    }

    #[test]
    fn column_names_parse() {
        assert_eq!(RecordColumn::from_name("total"), Some(RecordColumn::TotalValue));
        assert_eq!(RecordColumn::from_name("Unit-Value"), Some(RecordColumn::UnitValue));
        assert_eq!(RecordColumn::from_name("nope"), None);
    }
}
