//! Spreadsheet port
//!
//! A client is bound to one named sheet inside one named document.

use crate::domain::result::Result;

pub trait SpreadsheetClient: Send + Sync {
    /// Document and sheet, for reports
    fn target(&self) -> String;

    /// Create the sheet if the document does not have it yet
    fn ensure_sheet(&self) -> Result<()> {
        Ok(())
    }

    /// Values of row 1, empty when the sheet is empty
    fn read_first_row(&self) -> Result<Vec<String>>;

    /// Overwrite row 1
    fn write_first_row(&self, values: &[String]) -> Result<()>;

    /// Append rows after the last non-empty row, returns rows appended
    fn append_rows(&self, rows: &[Vec<String>]) -> Result<usize>;
}
