use std::collections::HashMap;

/// Tag of the root children that become rows.
pub const RECORD_TAG: &str = "transaction";

//==============================================================================
// Row
//==============================================================================

/// One flattened `<transaction>`: field name to text value, in first-seen order.
///
/// `None` marks a field whose element carried no text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field. A repeated name keeps its original position and takes the new value.
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Value of a field, `None` if the field is missing or has no text.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Field names in first-seen order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

//==============================================================================
// Table
//==============================================================================

/// Ordered rows plus the union of their field names, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a fixed header; rows pushed later may still add columns.
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for name in columns {
            table.add_column(name.into());
        }
        table
    }

    pub fn from_rows(rows: impl IntoIterator<Item = Row>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.push_row(row);
        }
        table
    }

    fn add_column(&mut self, name: String) {
        if !self.column_index.contains_key(&name) {
            self.column_index.insert(name.clone(), self.columns.len());
            self.columns.push(name);
        }
    }

    pub fn push_row(&mut self, row: Row) {
        for name in row.names() {
            if !self.column_index.contains_key(name) {
                self.add_column(name.to_string());
            }
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text at `(row, column)`, `None` for a blank cell.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// One row laid out against the full column set, blanks as `None`.
    pub fn row_values(&self, row: usize) -> Option<Vec<Option<&str>>> {
        let r = self.rows.get(row)?;
        Some(self.columns.iter().map(|c| r.get(c)).collect())
    }

    /// The whole table as a rectangular grid of cell values.
    pub fn values(&self) -> Vec<Vec<Option<&str>>> {
        (0..self.rows.len())
            .filter_map(|i| self.row_values(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, Option<&str>)]) -> Row {
        let mut r = Row::new();
        for (name, value) in fields {
            r.set(*name, value.map(str::to_string));
        }
        r
    }

    #[test]
    fn test_row_repeated_field_last_value_wins_in_first_position() {
        let r = row(&[("id", Some("1")), ("amt", Some("5")), ("id", Some("9"))]);
        assert_eq!(r.names().collect::<Vec<_>>(), vec!["id", "amt"]);
        assert_eq!(r.get("id"), Some("9"));
    }

    #[test]
    fn test_row_absent_value_is_still_a_field() {
        let r = row(&[("memo", None)]);
        assert!(r.contains("memo"));
        assert_eq!(r.get("memo"), None);
    }

    #[test]
    fn test_table_columns_first_seen_order() {
        let table = Table::from_rows(vec![
            row(&[("id", Some("1")), ("amt", Some("10.5"))]),
            row(&[("date", Some("2024-01-02")), ("id", Some("2"))]),
            row(&[("amt", Some("3")), ("note", None)]),
        ]);
        assert_eq!(table.columns(), &["id", "amt", "date", "note"]);
        assert_eq!(table.column_position("date"), Some(2));
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_table_missing_fields_are_blank() {
        let table = Table::from_rows(vec![
            row(&[("id", Some("1")), ("amt", Some("10.5"))]),
            row(&[("id", Some("2"))]),
        ]);
        assert_eq!(
            table.values(),
            vec![vec![Some("1"), Some("10.5")], vec![Some("2"), None]]
        );
        assert_eq!(table.cell(1, "amt"), None);
        assert_eq!(table.row_values(2), None);
    }

    #[test]
    fn test_table_with_columns_keeps_header_order() {
        let mut table = Table::with_columns(["b", "a"]);
        table.push_row(row(&[("a", Some("x")), ("c", Some("y"))]));
        assert_eq!(table.columns(), &["b", "a", "c"]);
        assert_eq!(table.row_values(0), Some(vec![None, Some("x"), Some("y")]));
    }
}
