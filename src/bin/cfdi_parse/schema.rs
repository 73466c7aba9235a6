//! Output columns and where each one is read from in a CFDI document.
//!
//! The column table is the single source of truth for field order:
//! the parser builds records from it and the sink writes headers and rows from it.

use std::fmt;

/// CFDI 4.0 namespace.
pub const CFDI_NAMESPACE: &str = "http://www.sat.gob.mx/cfd/4";

/// Timbre Fiscal Digital namespace.
pub const STAMP_NAMESPACE: &str = "http://www.sat.gob.mx/TimbreFiscalDigital";

/// Number of output columns.
pub const COLUMN_COUNT: usize = 12;

/// Namespace-qualified element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub namespace: &'static str,
    pub name: &'static str,
}

impl Element {
    const fn cfdi(name: &'static str) -> Self {
        Self {
            namespace: CFDI_NAMESPACE,
            name,
        }
    }
}

const IMPUESTOS: Element = Element::cfdi("Impuestos");
const COMPLEMENTO: Element = Element::cfdi("Complemento");
const EMISOR: Element = Element::cfdi("Emisor");
const RECEPTOR: Element = Element::cfdi("Receptor");
const TIMBRE_FISCAL_DIGITAL: Element = Element {
    namespace: STAMP_NAMESPACE,
    name: "TimbreFiscalDigital",
};

/// Attribute reached by descending from the root element through `path`.
/// An empty path means an attribute of the root element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub path: &'static [Element],
    pub attribute: &'static str,
}

impl Location {
    const fn root(attribute: &'static str) -> Self {
        Self { path: &[], attribute }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text copied as-is, empty when missing.
    Text,
    /// Money amount, always a number.
    Amount,
}

/// One output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Header text in the spreadsheet.
    pub name: &'static str,
    pub kind: ColumnKind,
    pub location: Location,
}

impl Column {
    /// Value used when the source attribute is missing.
    #[must_use]
    pub const fn default_value(&self) -> Value {
        match self.kind {
            ColumnKind::Text => Value::Empty,
            ColumnKind::Amount => Value::Amount(0.0),
        }
    }
}

/// Output columns in spreadsheet order.
pub static COLUMNS: [Column; COLUMN_COUNT] = [
    Column {
        name: "UUID",
        kind: ColumnKind::Text,
        location: Location {
            path: &[COMPLEMENTO, TIMBRE_FISCAL_DIGITAL],
            attribute: "UUID",
        },
    },
    Column {
        name: "Serie",
        kind: ColumnKind::Text,
        location: Location::root("Serie"),
    },
    Column {
        name: "Folio",
        kind: ColumnKind::Text,
        location: Location::root("Folio"),
    },
    Column {
        name: "Fecha",
        kind: ColumnKind::Text,
        location: Location::root("Fecha"),
    },
    Column {
        name: "SubTotal",
        kind: ColumnKind::Amount,
        location: Location::root("SubTotal"),
    },
    Column {
        name: "Descuento",
        kind: ColumnKind::Amount,
        location: Location::root("Descuento"),
    },
    Column {
        name: "Total_Impuestos_trasladados",
        kind: ColumnKind::Amount,
        location: Location {
            path: &[IMPUESTOS],
            attribute: "TotalImpuestosTrasladados",
        },
    },
    Column {
        name: "Total",
        kind: ColumnKind::Amount,
        location: Location::root("Total"),
    },
    Column {
        name: "RFC_Emisor",
        kind: ColumnKind::Text,
        location: Location {
            path: &[EMISOR],
            attribute: "Rfc",
        },
    },
    Column {
        name: "Nombre_Emisor",
        kind: ColumnKind::Text,
        location: Location {
            path: &[EMISOR],
            attribute: "Nombre",
        },
    },
    Column {
        name: "RFC_Receptor",
        kind: ColumnKind::Text,
        location: Location {
            path: &[RECEPTOR],
            attribute: "Rfc",
        },
    },
    Column {
        name: "Nombre_Receptor",
        kind: ColumnKind::Text,
        location: Location {
            path: &[RECEPTOR],
            attribute: "Nombre",
        },
    },
];

/// Header row names in column order.
pub fn header_names() -> impl Iterator<Item = &'static str> {
    COLUMNS.iter().map(|column| column.name)
}

/// Index of the column with the given header name.
#[must_use]
pub fn column_index(name: &str) -> Option<usize> {
    COLUMNS.iter().position(|column| column.name == name)
}

/// Single cell value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Text(String),
    Amount(f64),
}

impl Value {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_amount(&self) -> Option<f64> {
        match self {
            Self::Amount(amount) => Some(*amount),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "-"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Amount(amount) => write!(f, "{amount:.2}"),
        }
    }
}

#[cfg(test)]
mod test_columns {
    use super::*;

    #[test]
    fn header_order_is_fixed() {
        let names: Vec<&str> = header_names().collect();
        assert_eq!(
            names,
            vec![
                "UUID",
                "Serie",
                "Folio",
                "Fecha",
                "SubTotal",
                "Descuento",
                "Total_Impuestos_trasladados",
                "Total",
                "RFC_Emisor",
                "Nombre_Emisor",
                "RFC_Receptor",
                "Nombre_Receptor",
            ]
        );
    }

    #[test]
    fn header_names_are_unique() {
        for (index, column) in COLUMNS.iter().enumerate() {
            assert_eq!(column_index(column.name), Some(index));
        }
    }

    #[test]
    fn amount_columns() {
        let amounts: Vec<&str> = COLUMNS
            .iter()
            .filter(|column| column.kind == ColumnKind::Amount)
            .map(|column| column.name)
            .collect();
        assert_eq!(amounts, vec!["SubTotal", "Descuento", "Total_Impuestos_trasladados", "Total"]);
    }

    #[test]
    fn defaults_follow_kind() {
        for column in &COLUMNS {
            match column.kind {
                ColumnKind::Text => assert_eq!(column.default_value(), Value::Empty),
                ColumnKind::Amount => assert_eq!(column.default_value(), Value::Amount(0.0)),
            }
        }
    }

    #[test]
    fn uuid_is_read_through_complemento_and_stamp() {
        let location = COLUMNS[0].location;
        assert_eq!(location.attribute, "UUID");
        assert_eq!(location.path.len(), 2);
        assert_eq!(location.path[0].namespace, CFDI_NAMESPACE);
        assert_eq!(location.path[0].name, "Complemento");
        assert_eq!(location.path[1].namespace, STAMP_NAMESPACE);
        assert_eq!(location.path[1].name, "TimbreFiscalDigital");
    }

    #[test]
    fn unknown_column_has_no_index() {
        assert_eq!(column_index("Moneda"), None);
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Empty.to_string(), "-");
        assert_eq!(Value::Text("A".to_string()).to_string(), "A");
        assert_eq!(Value::Amount(116.0).to_string(), "116.00");
    }
}
