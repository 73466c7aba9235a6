//! Excel workbook that collects one row per processed CFDI.
//!
//! xlsx has no append primitive, so every append reads the sheet with calamine,
//! writes the existing cells and the new row to a fresh workbook with `rust_xlsxwriter`,
//! and replaces the file. The new workbook is first saved to a temporary file
//! in the same directory, so a failed write never leaves a partial row behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{ColNum, Format, FormatBorder, RowNum, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use crate::record::CfdiRecord;
use crate::schema::{COLUMNS, ColumnKind, Value, header_names};

/// Worksheet name used for new workbooks.
pub const SHEET_NAME: &str = "CFDI";

/// Default workbook file name without extension.
pub const DEFAULT_SINK_NAME: &str = "facturas";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("workbook name is empty")]
    EmptyName,
    #[error("failed to open workbook {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::XlsxError,
    },
    #[error("workbook {} has no worksheets", .0.display())]
    NoSheet(PathBuf),
    #[error("workbook {} does not start with the CFDI header row", .0.display())]
    UnexpectedHeader(PathBuf),
    #[error("failed to write workbook: {0}")]
    Write(#[from] XlsxError),
    #[error("failed to replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Workbook file that records are appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sink {
    path: PathBuf,
}

/// Existing sheet contents read back from the workbook.
struct LoadedSheet {
    name: String,
    cells: Range<Data>,
}

struct SheetFormats {
    header: Format,
    amount: Format,
}

impl SheetFormats {
    fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_border(FormatBorder::Thin)
                .set_background_color("C6E0B4"),
            amount: Format::new().set_num_format("0.00"),
        }
    }
}

impl Sink {
    /// Create a new workbook containing only the header row.
    ///
    /// An existing file with the same name is replaced.
    pub fn initialize(directory: &Path, name: &str) -> Result<Self, SinkError> {
        let path = sink_path(directory, name)?;
        write_workbook(&path, SHEET_NAME, |worksheet, formats| {
            write_header(worksheet, &formats.header)
        })?;
        Ok(Self { path })
    }

    /// Use an existing workbook created earlier.
    ///
    /// The first sheet must start with the CFDI header row.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        load_sheet(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record as a new row directly after the last used row.
    ///
    /// Returns the zero-based row index that was written.
    pub fn append(&self, record: &CfdiRecord) -> Result<RowNum, SinkError> {
        let sheet = load_sheet(&self.path)?;
        let row = sheet.cells.end().map_or(1, |(last_row, _)| last_row + 1);
        write_workbook(&self.path, &sheet.name, |worksheet, formats| {
            copy_cells(worksheet, &sheet.cells, formats)?;
            write_record(worksheet, row, record, &formats.amount)
        })?;
        Ok(row)
    }

    /// Number of rows below the header.
    pub fn data_rows(&self) -> Result<usize, SinkError> {
        let sheet = load_sheet(&self.path)?;
        Ok(sheet.cells.end().map_or(0, |(last_row, _)| last_row as usize))
    }
}

/// Full workbook path for the given directory and file name.
///
/// The `.xlsx` extension is added unless the name already has it.
pub fn sink_path(directory: &Path, name: &str) -> Result<PathBuf, SinkError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SinkError::EmptyName);
    }
    if !directory.is_dir() {
        return Err(SinkError::MissingDirectory(directory.to_path_buf()));
    }
    let file_name = PathBuf::from(name);
    if cfdi_tools::has_extension(&file_name, "xlsx") {
        Ok(directory.join(file_name))
    } else {
        Ok(directory.join(cfdi_tools::append_extension_to_path(file_name, "xlsx")))
    }
}

fn load_sheet(path: &Path) -> Result<LoadedSheet, SinkError> {
    let open_error = |source| SinkError::Open {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(open_error)?;
    let name = workbook
        .sheet_names()
        .into_iter()
        .next()
        .ok_or_else(|| SinkError::NoSheet(path.to_path_buf()))?;
    let cells = workbook.worksheet_range(&name).map_err(open_error)?;
    if !has_header_row(&cells) {
        return Err(SinkError::UnexpectedHeader(path.to_path_buf()));
    }
    Ok(LoadedSheet { name, cells })
}

fn has_header_row(cells: &Range<Data>) -> bool {
    header_names().enumerate().all(|(col, name)| {
        matches!(cells.get_value((0, col as u32)), Some(Data::String(text)) if text == name)
    })
}

fn write_workbook(
    path: &Path,
    sheet_name: &str,
    fill: impl FnOnce(&mut Worksheet, &SheetFormats) -> Result<(), XlsxError>,
) -> Result<(), SinkError> {
    let formats = SheetFormats::new();
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name(sheet_name)?;
    fill(worksheet, &formats)?;
    worksheet.autofit();

    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    // Keep the mode of an existing sink, otherwise create it like any new file
    let existing_permissions = fs::metadata(path).ok().map(|metadata| metadata.permissions());
    let mut builder = tempfile::Builder::new();
    builder.prefix(".cfdi-").suffix(".xlsx");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if existing_permissions.is_none() {
            builder.permissions(fs::Permissions::from_mode(0o666));
        }
    }
    let mut temp_file = builder.tempfile_in(directory)?;
    if let Some(permissions) = existing_permissions {
        temp_file.as_file().set_permissions(permissions)?;
    }
    workbook.save_to_writer(temp_file.as_file_mut())?;
    temp_file.persist(path).map_err(|error| SinkError::Persist {
        path: path.to_path_buf(),
        source: error.error,
    })?;
    Ok(())
}

fn write_header(worksheet: &mut Worksheet, format: &Format) -> Result<(), XlsxError> {
    for (col, name) in header_names().enumerate() {
        worksheet.write_string_with_format(0, col as ColNum, name, format)?;
    }
    Ok(())
}

fn write_record(worksheet: &mut Worksheet, row: RowNum, record: &CfdiRecord, amount_format: &Format) -> Result<(), XlsxError> {
    for (col, value) in record.values().iter().enumerate() {
        let col = col as ColNum;
        match value {
            Value::Text(text) if !text.is_empty() => {
                worksheet.write_string(row, col, text)?;
            }
            Value::Amount(amount) => {
                worksheet.write_number_with_format(row, col, *amount, amount_format)?;
            }
            Value::Text(_) | Value::Empty => {}
        }
    }
    Ok(())
}

/// Rewrite previously stored cell values at their original positions.
fn copy_cells(worksheet: &mut Worksheet, cells: &Range<Data>, formats: &SheetFormats) -> Result<(), XlsxError> {
    let (start_row, start_col) = cells.start().unwrap_or((0, 0));
    for (row_offset, col_offset, value) in cells.used_cells() {
        let row = start_row + row_offset as RowNum;
        let col = (start_col as usize + col_offset) as ColNum;
        let format = if row == 0 {
            Some(&formats.header)
        } else if COLUMNS
            .get(col as usize)
            .is_some_and(|column| column.kind == ColumnKind::Amount)
        {
            Some(&formats.amount)
        } else {
            None
        };
        write_cell(worksheet, row, col, value, format)?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &Data,
    format: Option<&Format>,
) -> Result<(), XlsxError> {
    match (value, format) {
        (Data::Empty, _) => {}
        (Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text), Some(format)) => {
            worksheet.write_string_with_format(row, col, text, format)?;
        }
        (Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text), None) => {
            worksheet.write_string(row, col, text)?;
        }
        (Data::Float(number), Some(format)) => {
            worksheet.write_number_with_format(row, col, *number, format)?;
        }
        (Data::Float(number), None) => {
            worksheet.write_number(row, col, *number)?;
        }
        (Data::Int(number), Some(format)) => {
            worksheet.write_number_with_format(row, col, *number as f64, format)?;
        }
        (Data::Int(number), None) => {
            worksheet.write_number(row, col, *number as f64)?;
        }
        (Data::Bool(flag), _) => {
            worksheet.write_boolean(row, col, *flag)?;
        }
        (Data::DateTime(date), _) => {
            worksheet.write_number(row, col, date.as_f64())?;
        }
        (Data::Error(error), _) => {
            worksheet.write_string(row, col, error.to_string())?;
        }
    }
    Ok(())
}
