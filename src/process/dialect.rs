use csv::{ReaderBuilder, StringRecord, Trim};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{io::Cursor, path::Path};

/// `<prefix>_<letter><digits>`, the suffix-inverted id form of `.dat` exports.
static INVERTED_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)_([A-Za-z])(\d+)$").expect("valid column id regex"));

/// The two flat-file layouts the loader understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `.csv`: comma separated, quoted fields, label row after the header.
    QuotedComma,
    /// `.dat`: `|` separated, unquoted, inverted id suffixes, no label row.
    Pipe,
}

impl Dialect {
    /// Picks the dialect from the file extension; `None` for anything else.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(Dialect::QuotedComma)
        } else if ext.eq_ignore_ascii_case("dat") {
            Some(Dialect::Pipe)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::QuotedComma => "csv",
            Dialect::Pipe => "dat",
        }
    }

    pub fn split_line(&self, line: &str) -> Vec<String> {
        match self {
            Dialect::QuotedComma => split_quoted_comma(line),
            Dialect::Pipe => split_pipe(line),
        }
    }

    /// Normalises a header value to its canonical ColumnID.
    pub fn column_id(&self, raw: &str) -> String {
        match self {
            Dialect::QuotedComma => raw.to_string(),
            Dialect::Pipe => correct_column_id(raw),
        }
    }

    /// Whether a human-readable label row follows the header.
    pub fn has_label_row(&self) -> bool {
        matches!(self, Dialect::QuotedComma)
    }
}

/// Comma separated fields with the surrounding quotes dropped and every
/// field trimmed. Commas inside quotes do not split; empty fields keep
/// their position.
pub fn split_quoted_comma(line: &str) -> Vec<String> {
    split_record(line, b',', true)
}

/// `|` separated, trimmed, no quoting.
pub fn split_pipe(line: &str) -> Vec<String> {
    split_record(line, b'|', false)
}

/// Reads exactly one record out of `line`. An empty line is a single empty
/// field, so callers can always index field 0.
fn split_record(line: &str, delimiter: u8, quoting: bool) -> Vec<String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .quoting(quoting)
        .trim(Trim::All)
        .from_reader(Cursor::new(line.as_bytes()));

    let mut record = StringRecord::new();
    match rdr.read_record(&mut record) {
        Ok(true) => record.iter().map(str::to_string).collect(),
        _ => vec![String::new()],
    }
}

/// `B01001_E001` → `B01001_001E`. Ids not of that shape pass through.
pub fn correct_column_id(id: &str) -> String {
    match INVERTED_ID.captures(id) {
        Some(c) => format!("{}_{}{}", &c[1], &c[3], &c[2]),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrects_inverted_suffix() {
        assert_eq!(correct_column_id("B01001_E001"), "B01001_001E");
        assert_eq!(correct_column_id("B01001_M001"), "B01001_001M");
        assert_eq!(correct_column_id("NAME"), "NAME");
        assert_eq!(correct_column_id("B01001_001E"), "B01001_001E");
        assert_eq!(correct_column_id("GEO_ID"), "GEO_ID");
    }

    #[test]
    fn splits_quoted_fields() {
        let line = r#""0600001US06","Town A, California","100","12""#;
        assert_eq!(
            split_quoted_comma(line),
            vec!["0600001US06", "Town A, California", "100", "12"]
        );
    }

    #[test]
    fn splits_unquoted_and_mixed_fields() {
        assert_eq!(
            split_quoted_comma(r#"0600001,"Town A",100"#),
            vec!["0600001", "Town A", "100"]
        );
        assert_eq!(
            split_quoted_comma("GEOID,NAME,B01001_001E"),
            vec!["GEOID", "NAME", "B01001_001E"]
        );
        // empty fields keep their position
        assert_eq!(split_quoted_comma(r#""a",,"c""#), vec!["a", "", "c"]);
        assert_eq!(split_quoted_comma(r#"" padded ","x""#), vec!["padded", "x"]);
        assert_eq!(split_quoted_comma(""), vec![""]);
    }

    #[test]
    fn splits_pipe_fields() {
        assert_eq!(
            split_pipe(" GEO_ID | B01001_E001 |42 "),
            vec!["GEO_ID", "B01001_E001", "42"]
        );
        // quotes are data in the pipe dialect
        assert_eq!(split_pipe(r#"g1|"Town, A"|"#), vec!["g1", r#""Town, A""#, ""]);
    }

    #[test]
    fn dialect_from_extension() {
        assert_eq!(Dialect::from_path("raw/acs.csv"), Some(Dialect::QuotedComma));
        assert_eq!(Dialect::from_path("raw/ACS.DAT"), Some(Dialect::Pipe));
        assert_eq!(Dialect::from_path("raw/cb_2023_us_place_500k.shp"), None);
        assert_eq!(Dialect::from_path("raw/noext"), None);
    }
}
