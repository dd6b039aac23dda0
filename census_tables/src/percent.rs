use crate::config::*;

/// Decimal places kept in percentage tables.
pub const PERCENT_DECIMALS: i32 = 2;

/// Rescales every row to a percentage of the total row, column by column.
///
/// The last row of the table must be its total. The total row of the result
/// is exactly 100 in every column; a cell is undefined when either the row
/// value or the total is absent, or when the total is zero.
pub fn to_percentage<C>(table: &Table<C>) -> Result<RatioTable, TableError>
where
    C: Measure + Clone + Default,
{
    let total = table.total_row().ok_or(TableError::MissingTotalRow)?;
    let rows = table
        .rows()
        .iter()
        .map(|r| {
            let cells = if r.key.is_total() {
                vec![RatioCell::Ratio(100.0); table.columns().len()]
            } else {
                r.cells
                    .iter()
                    .zip(total.cells.iter())
                    .map(|(v, t)| percentage(v.base(), t.base()))
                    .collect()
            };
            Row {
                key: r.key.clone(),
                cells,
            }
        })
        .collect();
    Ok(Table::assemble(table.columns().to_vec(), rows))
}

fn percentage(value: Option<f64>, total: Option<f64>) -> RatioCell {
    match (value, total) {
        (Some(v), Some(t)) if t != 0.0 => {
            let scale = 10f64.powi(PERCENT_DECIMALS);
            let p = (100.0 * v / t * scale).round() / scale;
            if p.is_finite() {
                RatioCell::Ratio(p)
            } else {
                RatioCell::Undefined
            }
        }
        _ => RatioCell::Undefined,
    }
}
