use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use roxmltree::{Document, Node, ParsingOptions};
use thiserror::Error;

use cfdi_tools::print_warning;

use crate::record::CfdiRecord;
use crate::schema::{ColumnKind, Element, Location, Value};

/// Why a document could not be turned into a record.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is damaged or not well-formed XML: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
}

/// Read and parse a CFDI XML file.
pub fn parse_cfdi_file(path: &Path) -> Result<CfdiRecord, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode_xml(&bytes);
    parse_cfdi_str(&text).map_err(|source| ParseError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Extract a record from CFDI XML text.
///
/// Only a document that is not well-formed is an error.
/// Missing elements or attributes leave the column at its default value.
pub fn parse_cfdi_str(xml: &str) -> Result<CfdiRecord, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(xml, options)?;
    let root = document.root_element();
    Ok(CfdiRecord::from_columns(|column| {
        let raw = find_attribute(root, &column.location);
        match column.kind {
            ColumnKind::Text => raw.map_or(Value::Empty, |text| Value::Text(text.to_string())),
            ColumnKind::Amount => Value::Amount(coerce_amount(raw)),
        }
    }))
}

/// Amount coercion policy.
///
/// Missing, blank and unparseable values become `0.0`,
/// as do values that are not finite.
/// A comma decimal separator is accepted.
#[must_use]
pub fn coerce_amount(raw: Option<&str>) -> f64 {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.replace(',', ".").parse::<f64>().ok())
        .filter(|amount| amount.is_finite())
        .unwrap_or(0.0)
}

fn find_attribute<'a>(root: Node<'a, '_>, location: &Location) -> Option<&'a str> {
    location
        .path
        .iter()
        .try_fold(root, |node, element| find_child(node, element))?
        .attribute(location.attribute)
}

/// First direct child element with the given namespace and name.
fn find_child<'a, 'input>(node: Node<'a, 'input>, element: &Element) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.has_tag_name((element.namespace, element.name)))
}

/// Decode raw file contents to text using the encoding from the XML declaration.
///
/// CFDI files are required to be UTF-8, which is also the fallback.
/// A byte order mark takes precedence over the declaration.
fn decode_xml(bytes: &[u8]) -> Cow<'_, str> {
    let encoding = declared_encoding(bytes).unwrap_or(encoding_rs::UTF_8);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        print_warning!("Warning: Decoding errors occurred, invalid characters were replaced");
    }
    text
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let end = bytes.len().min(256);
    let header = String::from_utf8_lossy(&bytes[..end]).to_lowercase();
    let declaration = header
        .trim_start_matches('\u{feff}')
        .trim_start()
        .strip_prefix("<?xml")?
        .split("?>")
        .next()?;
    // Whitespace is allowed around `=`
    let value = declaration
        .split_once("encoding")?
        .1
        .trim_start()
        .strip_prefix('=')?
        .trim_start();
    let quote = value.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    let label = value[1..].split(quote).next()?;
    Encoding::for_label(label.trim().as_bytes())
}



#[cfg(test)]
mod test_declared_encoding {
    use super::*;

    #[test]
    fn reads_double_quoted_label() {
        let encoding = declared_encoding(br#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#);
        assert_eq!(encoding, Some(encoding_rs::WINDOWS_1252));
    }

    #[test]
    fn reads_single_quoted_label() {
        let encoding = declared_encoding(b"<?xml version='1.0' encoding='utf-8'?><a/>");
        assert_eq!(encoding, Some(encoding_rs::UTF_8));
    }

    #[test]
    fn reads_label_with_spaces_around_equals() {
        let encoding = declared_encoding(b"<?xml version=\"1.0\" encoding = \"ISO-8859-1\"?><a/>");
        assert_eq!(encoding, Some(encoding_rs::WINDOWS_1252));

        let encoding = declared_encoding(b"<?xml version='1.0'\n  encoding\t=\t'latin1' ?><a/>");
        assert_eq!(encoding, Some(encoding_rs::WINDOWS_1252));
    }

    #[test]
    fn decodes_latin1_with_spaced_declaration() {
        let bytes = b"<?xml version=\"1.0\" encoding = \"ISO-8859-1\"?><a n=\"Compa\xf1\xeda\"/>";
        let text = decode_xml(bytes);
        assert!(text.contains("Compañía"));
        assert!(!text.contains('\u{fffd}'));
    }

    #[test]
    fn unquoted_label_is_ignored() {
        assert_eq!(declared_encoding(b"<?xml version=\"1.0\" encoding=latin1?><a/>"), None);
    }

    #[test]
    fn missing_declaration() {
        assert_eq!(declared_encoding(b"<a encoding=\"latin1\"/>"), None);
        assert_eq!(declared_encoding(b""), None);
    }

    #[test]
    fn unknown_label() {
        assert_eq!(declared_encoding(br#"<?xml version="1.0" encoding="klingon"?>"#), None);
    }

    #[test]
    fn decodes_latin1_declared_text() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a n=\"Compa\xf1\xeda\"/>";
        let text = decode_xml(bytes);
        assert!(text.contains("Compañía"));
    }

    #[test]
    fn utf8_bom_is_removed() {
        let bytes = b"\xef\xbb\xbf<a/>";
        assert_eq!(decode_xml(bytes), "<a/>");
    }
}

#[cfg(test)]
mod test_parse_cfdi_file {
    use super::*;

    use std::path::Path;

    #[test]
    fn parses_complete_fixture() {
        let record = parse_cfdi_file(Path::new("tests/fixtures/cfdi_complete.xml")).expect("should parse");

        let expected = vec![
            Value::Text("11111111-2222-3333-4444-555555555555".to_string()),
            Value::Text("A".to_string()),
            Value::Text("100".to_string()),
            Value::Text("2025-01-01T10:00:00".to_string()),
            Value::Amount(100.0),
            Value::Amount(0.0),
            Value::Amount(16.0),
            Value::Amount(116.0),
            Value::Text("AAA010101AAA".to_string()),
            Value::Text("Empresa X".to_string()),
            Value::Text("BBB020202BBB".to_string()),
            Value::Text("Cliente Y".to_string()),
        ];
        assert_eq!(record.values().to_vec(), expected);
    }

    #[test]
    fn parses_fixture_without_stamp() {
        let record = parse_cfdi_file(Path::new("tests/fixtures/cfdi_without_stamp.xml")).expect("should parse");

        assert_eq!(record.uuid(), None);
        assert_eq!(record.text("Serie"), Some("F"));
        assert_eq!(record.text("RFC_Emisor"), Some("CCC030303CCC"));
        assert_eq!(record.text("Nombre_Receptor"), Some("Público en General"));
        assert_eq!(record.amount("SubTotal"), Some(1500.0));
        assert_eq!(record.amount("Descuento"), Some(0.0));
        assert_eq!(record.amount("Total_Impuestos_trasladados"), Some(240.0));
        assert_eq!(record.amount("Total"), Some(1740.0));
    }

    #[test]
    fn parses_latin1_fixture() {
        let record = parse_cfdi_file(Path::new("tests/fixtures/cfdi_latin1.xml")).expect("should parse");
        assert_eq!(record.text("Nombre_Emisor"), Some("Compañía Ñandú"));
    }

    #[test]
    fn malformed_fixture_is_reported() {
        let result = parse_cfdi_file(Path::new("tests/fixtures/cfdi_malformed.xml"));
        assert!(matches!(result, Err(ParseError::Malformed { .. })));
    }

    #[test]
    fn nonexistent_file_is_reported() {
        let result = parse_cfdi_file(Path::new("tests/fixtures/nonexistent.xml"));
        assert!(matches!(result, Err(ParseError::Read { .. })));
    }

    #[test]
    fn error_message_names_the_file() {
        let error = parse_cfdi_file(Path::new("tests/fixtures/cfdi_malformed.xml")).expect_err("should fail");
        assert!(error.to_string().contains("cfdi_malformed.xml"));
    }
}
