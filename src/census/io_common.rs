// Primitives shared by the readers and the writers.

use std::path::Path;

use census_tables::codec::ValueReader;

use crate::census::*;

/// The content of an input file, as text.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawTable {
    pub source: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Names of the identifying columns of the input.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct InputColumns {
    pub year: String,
    pub entity: String,
    pub municipality: String,
    pub activity: String,
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// A unit name usable as a file name: punctuation removed, whitespace
/// replaced by `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<&str>>().join("_")
}

/// The code of a metric column: `A111A Producción bruta total` -> `A111A`.
pub fn metric_code(header: &str) -> Option<String> {
    header.split_whitespace().next().map(|s| s.to_string())
}

fn read_year(text: &str) -> Option<i32> {
    let s = text.trim();
    if let Ok(y) = s.parse::<i32>() {
        return Some(y);
    }
    // Spreadsheets store years as floats.
    match s.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < 1e6 => Some(f as i32),
        _ => None,
    }
}

fn find_column(raw: &RawTable, name: &str) -> CensusResult<usize> {
    raw.header
        .iter()
        .position(|h| h.trim() == name)
        .context(MissingColumnSnafu {
            path: simplify_file_name(&raw.source),
            column: name,
        })
}

/// Turns every row of the input into one record per metric column.
pub fn explode(
    raw: &RawTable,
    columns: &InputColumns,
    reader: &mut ValueReader,
) -> CensusResult<Vec<CensusRecord>> {
    let year_idx = find_column(raw, &columns.year)?;
    let entity_idx = find_column(raw, &columns.entity)?;
    let municipality_idx = find_column(raw, &columns.municipality)?;
    let activity_idx = find_column(raw, &columns.activity)?;
    let ids = [year_idx, entity_idx, municipality_idx, activity_idx];

    let metrics: Vec<(usize, String)> = raw
        .header
        .iter()
        .enumerate()
        .filter(|(idx, _)| !ids.contains(idx))
        .filter_map(|(idx, h)| metric_code(h).map(|code| (idx, code)))
        .collect();
    debug!("explode: {}: metric columns: {:?}", raw.source, metrics);

    let cell = |row: &Vec<String>, idx: usize| -> String {
        row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default()
    };

    let mut res: Vec<CensusRecord> = Vec::new();
    for (idx, row) in raw.rows.iter().enumerate() {
        // Line numbers start at 1, after the header.
        let lineno = idx + 2;
        let period = match read_year(&cell(row, year_idx)) {
            Some(y) => y,
            None => {
                warn!(
                    "explode: {}: line {}: cannot read the year {:?}, skipping the line",
                    raw.source,
                    lineno,
                    cell(row, year_idx)
                );
                continue;
            }
        };
        let municipality = cell(row, municipality_idx);
        let municipality = if municipality.is_empty() {
            None
        } else {
            Some(municipality)
        };
        for (metric_idx, code) in metrics.iter() {
            res.push(CensusRecord {
                period,
                entity: cell(row, entity_idx),
                municipality: municipality.clone(),
                activity: cell(row, activity_idx),
                metric: code.clone(),
                value: reader.read(&cell(row, *metric_idx)),
            });
        }
    }
    Ok(res)
}
