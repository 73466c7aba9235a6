use std::fmt;

use crate::schema::{COLUMN_COUNT, COLUMNS, Column, Value, column_index};

/// Fields extracted from one CFDI document, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct CfdiRecord {
    values: [Value; COLUMN_COUNT],
}

impl CfdiRecord {
    /// Build a record by computing the value of each column in order.
    pub fn from_columns(mut value_for: impl FnMut(&Column) -> Value) -> Self {
        Self {
            values: std::array::from_fn(|index| value_for(&COLUMNS[index])),
        }
    }

    #[must_use]
    pub const fn values(&self) -> &[Value; COLUMN_COUNT] {
        &self.values
    }

    /// Column name and value pairs in column order.
    pub fn labeled(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        COLUMNS.iter().map(|column| column.name).zip(self.values.iter())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        column_index(name).map(|index| &self.values[index])
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    #[must_use]
    pub fn amount(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_amount)
    }

    /// Folio fiscal, if the document was stamped.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.text("UUID")
    }
}

impl fmt::Display for CfdiRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let width = COLUMNS.iter().map(|column| column.name.len()).max().unwrap_or(0);
        for (name, value) in self.labeled() {
            writeln!(f, "  {name:<width$}  {value}")?;
        }
        Ok(())
    }
}
