// Reading the tally spreadsheets.

use calamine::{open_workbook_auto, Data, Reader};

use crate::etl::io_common::simplify_file_name;
use crate::etl::*;

/// Reads the named worksheet, or the first one, of a workbook. The format
/// (xls, xlsx, ods) is detected from the extension.
pub fn read_excel_tally(path: &Path, worksheet_name: Option<&str>) -> EtlResult<RawTable> {
    let p = path.display().to_string();
    let mut workbook =
        open_workbook_auto(path).context(OpeningExcelSnafu { path: p.clone() })?;
    let wrange = match worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(OpeningExcelSnafu { path: p.clone() })?,
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path: p.clone() })?
            .context(OpeningExcelSnafu { path: p.clone() })?,
    };

    // The range starts at the first used cell, not at the top of the sheet.
    let header_row = wrange.start().map(|(r, _)| r as usize + 1).unwrap_or(1);
    let mut iter = wrange.rows();
    let header = iter.next().context(EmptyExcelSnafu { path: p.clone() })?;
    debug!("read_excel_tally: header: {:?}", header);
    let headers: Vec<String> = header
        .iter()
        .map(|c| read_cell(c).as_text().unwrap_or_default())
        .collect();

    let mut rows: Vec<Vec<RawCell>> = Vec::new();
    for (idx, row) in iter.enumerate() {
        let cells: Vec<RawCell> = row.iter().map(read_cell).collect();
        debug!("read_excel_tally: row {}: {:?}", header_row + idx + 1, cells);
        rows.push(cells);
    }
    Ok(RawTable {
        source: simplify_file_name(path),
        header_row,
        headers,
        rows,
    })
}

fn read_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Float(f) => RawCell::Number(*f),
        Data::String(s) if s.trim().is_empty() => RawCell::Empty,
        Data::String(s) => RawCell::Text(s.trim().to_string()),
        Data::Error(e) => {
            warn!("read_excel_tally: error cell {:?} read as empty", e);
            RawCell::Empty
        }
        other => RawCell::Text(other.to_string()),
    }
}
