use super::dialect::Dialect;

/// One estimate column of a source header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateColumn {
    /// Field position in every row of the file.
    pub index: usize,
    /// Canonical ColumnID.
    pub id: String,
}

/// Picks the estimate columns out of a tokenized header.
///
/// Field 0 is the GeoID and never selected. Of the rest, a field is an
/// estimate when its canonical id ends in `E` and is not `NAME`; margin of
/// error (`...M`) and annotation columns fall out.
pub fn classify_header(header: &[String], dialect: Dialect) -> Vec<EstimateColumn> {
    header
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(index, raw)| {
            let id = dialect.column_id(raw);
            is_estimate(&id).then_some(EstimateColumn { index, id })
        })
        .collect()
}

fn is_estimate(id: &str) -> bool {
    id.ends_with('E') && id != "NAME"
}
