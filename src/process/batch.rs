use std::collections::HashMap;
use std::fmt::Write;

use super::columns::EstimateColumn;

/// Rows of one file waiting to be merged into `data`.
///
/// A GeoID seen twice before a flush replaces its earlier row: one
/// merge-insert may not touch the same key twice.
pub struct UpsertBatch {
    columns: Vec<String>,
    rows: Vec<(String, Vec<Option<f64>>)>,
    positions: HashMap<String, usize>,
}

impl UpsertBatch {
    pub fn new(columns: &[EstimateColumn], capacity: usize) -> Self {
        Self {
            columns: columns.iter().map(|c| c.id.clone()).collect(),
            rows: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, geo_id: String, values: Vec<Option<f64>>) {
        match self.positions.get(&geo_id) {
            Some(&i) => self.rows[i].1 = values,
            None => {
                self.positions.insert(geo_id.clone(), self.rows.len());
                self.rows.push((geo_id, values));
            }
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.positions.clear();
    }

    /// One `INSERT ... ON CONFLICT` statement for the whole batch. Only the
    /// columns this file carries are updated on conflict, so columns loaded
    /// from other files survive.
    pub fn to_sql(&self) -> String {
        let mut sql = String::with_capacity(64 + self.rows.len() * (16 + self.columns.len() * 8));

        sql.push_str("INSERT INTO data (id");
        for col in &self.columns {
            let _ = write!(sql, ", {}", quote_ident(col));
        }
        sql.push_str(")\nVALUES ");

        for (i, (geo_id, values)) in self.rows.iter().enumerate() {
            if i > 0 {
                sql.push_str(",\n  ");
            }
            sql.push('(');
            sql.push_str(&quote_literal(geo_id));
            for v in values {
                sql.push_str(", ");
                match v {
                    Some(n) => {
                        let _ = write!(sql, "{}", n);
                    }
                    None => sql.push_str("NULL"),
                }
            }
            sql.push(')');
        }

        if self.columns.is_empty() {
            sql.push_str("\nON CONFLICT (id) DO NOTHING;");
        } else {
            sql.push_str("\nON CONFLICT (id) DO UPDATE SET ");
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let q = quote_ident(col);
                let _ = write!(sql, "{q} = excluded.{q}");
            }
            sql.push(';');
        }
        sql
    }
}

/// Best-effort numeric coercion. Anything that is not a finite number
/// (empty, annotations such as `(X)` or `*****`, `NaN`) becomes null.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn quote_ident(id: &str) -> String {
    format!("\"{}\"", id.replace('"', "\"\""))
}

pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(ids: &[&str]) -> Vec<EstimateColumn> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| EstimateColumn {
                index: i + 1,
                id: id.to_string(),
            })
            .collect()
    }

    #[test]
    fn coerces_numbers() {
        assert_eq!(parse_number("100"), Some(100.0));
        assert_eq!(parse_number(" -666666666 "), Some(-666666666.0));
        assert_eq!(parse_number("0.25"), Some(0.25));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("(X)"), None);
        assert_eq!(parse_number("*****"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn builds_merge_insert_for_file_columns_only() {
        let mut batch = UpsertBatch::new(&cols(&["B01001_001E", "B01001_002E"]), 4);
        batch.push("0600001".into(), vec![Some(100.0), None]);
        batch.push("O'Brien".into(), vec![Some(1.5), Some(2.0)]);

        let sql = batch.to_sql();
        assert!(sql.starts_with(r#"INSERT INTO data (id, "B01001_001E", "B01001_002E")"#));
        assert!(sql.contains("('0600001', 100, NULL)"));
        assert!(sql.contains("('O''Brien', 1.5, 2)"));
        assert!(sql.contains(
            r#"ON CONFLICT (id) DO UPDATE SET "B01001_001E" = excluded."B01001_001E", "B01001_002E" = excluded."B01001_002E";"#
        ));
    }

    #[test]
    fn repeated_geoid_replaces_earlier_row() {
        let mut batch = UpsertBatch::new(&cols(&["X"]), 4);
        batch.push("g1".into(), vec![Some(1.0)]);
        batch.push("g2".into(), vec![Some(2.0)]);
        batch.push("g1".into(), vec![Some(3.0)]);
        assert_eq!(batch.len(), 2);

        let sql = batch.to_sql();
        assert!(sql.contains("('g1', 3)"));
        assert!(!sql.contains("('g1', 1)"));

        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn file_without_estimates_only_inserts_ids() {
        let mut batch = UpsertBatch::new(&[], 1);
        batch.push("g1".into(), vec![]);
        assert_eq!(
            batch.to_sql(),
            "INSERT INTO data (id)\nVALUES ('g1')\nON CONFLICT (id) DO NOTHING;"
        );
    }
}
