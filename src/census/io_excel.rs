// Reading the census export from an Excel workbook.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::census::io_common::RawTable;
use crate::census::*;

pub fn read_raw_excel(path: &str, worksheet_name: Option<&str>) -> CensusResult<RawTable> {
    debug!(
        "read_raw_excel: path: {:?} worksheet: {:?}",
        path, worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it. Otherwise the first worksheet.
    let wrange = match worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path })?,
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path })?
            .context(OpeningExcelSnafu { path })?,
    };

    let mut iter = wrange.rows();
    let header: Vec<String> = iter
        .next()
        .context(EmptyExcelSnafu { path })?
        .iter()
        .map(|c| cell_text(c).trim().to_string())
        .collect();
    debug!("read_raw_excel: header: {:?}", header);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in iter {
        let line: Vec<String> = row.iter().map(cell_text).collect();
        if line.iter().all(|s| s.trim().is_empty()) {
            continue;
        }
        rows.push(line);
    }
    info!("read_raw_excel: {}: {} rows", path, rows.len());
    Ok(RawTable {
        source: path.to_string(),
        header,
        rows,
    })
}

// The codec reads text, so numbers go back to their shortest text form.
fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Float(f) => f.to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::Empty => String::new(),
        DataType::Error(e) => {
            debug!("cell_text: cell error {:?}", e);
            String::new()
        }
        other => {
            debug!("cell_text: unexpected cell {:?}", other);
            String::new()
        }
    }
}
