// Primitives for reading and writing CSV files.

use std::path::Path;

use census_tables::builder::Builder;

use crate::census::io_common::RawTable;
use crate::census::*;

pub fn read_raw_csv(path: &str) -> CensusResult<RawTable> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();

    let header: Vec<String> = records
        .next()
        .context(MissingHeaderSnafu { path })?
        .context(CsvLineParseSnafu { path, lineno: 1_usize })?
        .iter()
        .map(|s| s.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    debug!("read_raw_csv: {}: header: {:?}", path, header);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        if line.iter().all(|s| s.trim().is_empty()) {
            continue;
        }
        rows.push(line.iter().map(|s| s.to_string()).collect());
    }
    info!("read_raw_csv: {}: {} rows", path, rows.len());
    Ok(RawTable {
        source: path.to_string(),
        header,
        rows,
    })
}

/// Writes a table: the activity column, then one column per `<metric>_<period>`.
pub fn write_table<C, F>(path: &Path, activity_header: &str, table: &Table<C>, fmt: F) -> CensusResult<()>
where
    C: Clone + Default,
    F: Fn(&C) -> String,
{
    let p = path.display().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context(CreatingDirSnafu {
            path: parent.display().to_string(),
        })?;
    }
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path: p.clone() })?;

    let mut header: Vec<String> = vec![activity_header.to_string()];
    header.extend(table.columns().iter().map(|c| c.to_string()));
    wtr.write_record(&header)
        .context(CsvWriteSnafu { path: p.clone() })?;
    for row in table.rows() {
        let mut line: Vec<String> = vec![row.key.label.clone()];
        line.extend(row.cells.iter().map(|c| fmt(c)));
        wtr.write_record(&line)
            .context(CsvWriteSnafu { path: p.clone() })?;
    }
    wtr.flush().context(FlushingSnafu { path: p.clone() })?;
    debug!("write_table: {}: {} rows", p, table.rows().len());
    Ok(())
}

/// Reads back a table written by [write_table]. The last row is the total.
pub fn read_table<C, F>(path: &Path, sector_prefix: &str, parse: F) -> CensusResult<Table<C>>
where
    C: Clone + Default,
    F: Fn(&str) -> C,
{
    let p = path.display().to_string();
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .context(CsvOpenSnafu { path: p.clone() })?;
    let mut lines: Vec<csv::StringRecord> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let line = line_r.context(CsvLineParseSnafu {
            path: p.clone(),
            lineno: idx + 1,
        })?;
        lines.push(line);
    }
    let (header, body) = lines.split_first().context(MissingHeaderSnafu { path: p.clone() })?;

    let mut columns: Vec<ColumnKey> = Vec::new();
    for h in header.iter().skip(1) {
        let column = ColumnKey::parse(h).context(InvalidColumnSnafu {
            path: p.clone(),
            column: h,
        })?;
        columns.push(column);
    }

    let mut builder: Builder<C> = Builder::new();
    for c in columns.iter() {
        builder.add_column(c.clone());
    }
    for (idx, line) in body.iter().enumerate() {
        let label = line.get(0).unwrap_or_default().trim();
        let key = if idx + 1 == body.len() {
            RowKey::total(label)
        } else if label.starts_with(sector_prefix) {
            RowKey::sector(label)
        } else {
            RowKey::other(label)
        };
        for (c_idx, c) in columns.iter().enumerate() {
            let text = line.get(c_idx + 1).unwrap_or_default();
            builder
                .add(key.clone(), c.clone(), parse(text))
                .context(BuildingTableSnafu { unit: p.clone() })?;
        }
    }
    builder.build().context(BuildingTableSnafu { unit: p })
}

#[cfg(test)]
mod tests {
    use super::*;
    use census_tables::codec;
    use AnnotatedValue::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("A111A_Nacional.csv");
        let table = Table::new(
            vec![ColumnKey::new("A111A", 2013), ColumnKey::new("A111A", 2018)],
            vec![
                Row {
                    key: RowKey::sector("Sector 11"),
                    cells: vec![Numeric(1.5), Censored { base: 2.0, count: 3 }],
                },
                Row {
                    key: RowKey::other("Subsector 111"),
                    cells: vec![Absent, Numeric(1.0)],
                },
                Row {
                    key: RowKey::total("Total Nacional"),
                    cells: vec![Numeric(1.5), Censored { base: 2.0, count: 3 }],
                },
            ],
        )
        .unwrap();
        write_table(&path, "Actividad Economica", &table, codec::format).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("Actividad Economica,A111A_2013,A111A_2018")
        );
        assert!(text.contains("Sector 11,1.5,2 + 3C"));

        let back: WideTable = read_table(&path, "Sector ", codec::parse).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "Actividad,A111A\nTotal,1\n").unwrap();
        let res: CensusResult<RatioTable> = read_table(&path, "Sector ", codec::parse_ratio);
        assert!(matches!(res, Err(CensusError::InvalidColumn { .. })));
    }
}
