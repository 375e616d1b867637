//! Single-row tokenizer for comma-separated artifacts.
//!
//! A character-scan state machine with one `in_quotes` flag:
//!
//! * a `"` outside quotes opens a quoted section; inside quotes, `""` emits
//!   one literal quote and any other `"` closes the section. Delimiting
//!   quotes never reach the field buffer.
//! * a `,` outside quotes ends the field.
//! * each field is trimmed and loses one surrounding layer of quotes if the
//!   buffer still carries one (only possible through escaped quotes).
//!
//! A leading byte-order mark is dropped. An empty line has no fields; any
//! other line always yields its final field, even when empty (`a,` gives
//! `["a", ""]`).

const BOM: char = '\u{FEFF}';

/// Split one line into its field values.
pub fn split_record(line: &str) -> Vec<String> {
    let line = line.strip_prefix(BOM).unwrap_or(line);
    if line.is_empty() {
        return Vec::new();
    }

    let mut values = Vec::new();
    let mut buffer = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_quotes => in_quotes = true,
            '"' if chars.peek() == Some(&'"') => {
                buffer.push('"');
                chars.next();
            }
            '"' => in_quotes = false,
            ',' if !in_quotes => values.push(finish_field(std::mem::take(&mut buffer))),
            _ => buffer.push(c),
        }
    }
    values.push(finish_field(buffer));
    values
}

fn finish_field(raw: String) -> String {
    let unwrapped = if raw.starts_with('"') && raw.ends_with('"') {
        raw.get(1..raw.len().saturating_sub(1)).unwrap_or_default()
    } else {
        raw.as_str()
    };
    unwrapped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_commas_and_escaped_quotes() {
        assert_eq!(
            split_record(r#"A,"B, with comma","C""quoted""",D"#),
            vec!["A", "B, with comma", "C\"quoted\"", "D"]
        );
    }

    #[test]
    fn strips_bom() {
        assert_eq!(split_record("\u{FEFF}ITEM,DESC"), vec!["ITEM", "DESC"]);
    }

    #[test]
    fn trims_fields() {
        assert_eq!(split_record("  1 , caneta azul ,UN "), vec!["1", "caneta azul", "UN"]);
    }

    #[test]
    fn trailing_separator_yields_empty_field() {
        assert_eq!(split_record("a,"), vec!["a", ""]);
        assert_eq!(split_record(",,"), vec!["", "", ""]);
    }

    #[test]
    fn empty_line_has_no_fields() {
        assert!(split_record("").is_empty());
        assert!(split_record("\u{FEFF}").is_empty());
    }

    #[test]
    fn fully_escaped_value_loses_one_layer() {
        // The buffer holds `"x"` after the scan; one layer is removed.
        assert_eq!(split_record(r#""""x""""#), vec!["x"]);
    }

    #[test]
    fn lone_escaped_quote_becomes_empty() {
        assert_eq!(split_record(r#""""""#), vec![""]);
    }

    #[test]
    fn unterminated_quote_keeps_rest_of_line() {
        assert_eq!(split_record(r#"1,"aberto, sem fim"#), vec!["1", "aberto, sem fim"]);
    }
}
