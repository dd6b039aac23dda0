//! Ratios between tables of adjacent geographic levels.
//!
//! Tables are always aligned by key, never by position: a row or a column
//! present in only one of the operands produces undefined cells.

use std::collections::BTreeSet;

use log::debug;

use crate::config::*;

/// Divides two tables cell by cell.
///
/// Rows are the numerator's rows followed by the rows found only in the
/// denominator. The total rows of both tables match each other and stay last.
/// Columns are the sorted union of both column sets.
pub fn divide<N, D>(numerator: &Table<N>, denominator: &Table<D>) -> RatioTable
where
    N: Measure + Clone + Default,
    D: Measure + Clone + Default,
{
    zip_tables(numerator, denominator, |n, d| match (n, d) {
        (Some(n), Some(d)) => safe_ratio(n.base(), d.base()),
        _ => RatioCell::Undefined,
    })
}

fn safe_ratio(num: Option<f64>, den: Option<f64>) -> RatioCell {
    match (num, den) {
        (Some(n), Some(d)) if d != 0.0 => {
            let r = n / d;
            if r.is_finite() {
                RatioCell::Ratio(r)
            } else {
                RatioCell::Undefined
            }
        }
        _ => RatioCell::Undefined,
    }
}

/// The ratio between a wider level and a narrower one.
pub fn divide_levels<C>(upper: &Table<C>, lower: &Table<C>, direction: RatioDirection) -> RatioTable
where
    C: Measure + Clone + Default,
{
    match direction {
        RatioDirection::UpperOverLower => divide(upper, lower),
        RatioDirection::LowerOverUpper => divide(lower, upper),
    }
}

/// Combines the national/state and the state/region ratios into a
/// national/region weight.
pub fn compose_ratios(first: &RatioTable, second: &RatioTable, mode: ComposeMode) -> RatioTable {
    match mode {
        ComposeMode::Product => zip_tables(first, second, |a, b| {
            match (a.and_then(|x| x.base()), b.and_then(|x| x.base())) {
                (Some(x), Some(y)) if (x * y).is_finite() => RatioCell::Ratio(x * y),
                _ => RatioCell::Undefined,
            }
        }),
        ComposeMode::Quotient => divide(first, second),
    }
}

// Aligns two tables by key and combines the matching cells.
fn zip_tables<A, B, F>(left: &Table<A>, right: &Table<B>, f: F) -> RatioTable
where
    A: Clone + Default,
    B: Clone + Default,
    F: Fn(Option<&A>, Option<&B>) -> RatioCell,
{
    let columns: Vec<ColumnKey> = left
        .columns()
        .iter()
        .chain(right.columns().iter())
        .cloned()
        .collect::<BTreeSet<ColumnKey>>()
        .into_iter()
        .collect();

    let mut keys: Vec<RowKey> = left
        .rows()
        .iter()
        .filter(|r| !r.key.is_total())
        .map(|r| r.key.clone())
        .collect();
    for r in right.rows().iter().filter(|r| !r.key.is_total()) {
        if !keys.iter().any(|k| k.aligns_with(&r.key)) {
            debug!("zip_tables: row {:?} only in the right table", r.key.label);
            keys.push(r.key.clone());
        }
    }
    // The left label wins for the total row.
    let total = left
        .total_row()
        .map(|r| r.key.clone())
        .or_else(|| right.total_row().map(|r| r.key.clone()));
    keys.extend(total);

    let rows = keys
        .into_iter()
        .map(|key| {
            let cells = columns
                .iter()
                .map(|c| f(left.cell(&key, c), right.cell(&key, c)))
                .collect();
            Row { key, cells }
        })
        .collect();
    Table::assemble(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnnotatedValue::*;

    fn table<C: Clone + Default>(columns: &[&str], rows: Vec<(RowKey, Vec<C>)>) -> Table<C> {
        let columns = columns.iter().map(|c| ColumnKey::parse(c).unwrap()).collect();
        let rows = rows
            .into_iter()
            .map(|(key, cells)| Row { key, cells })
            .collect();
        Table::new(columns, rows).unwrap()
    }

    #[test]
    fn self_ratio_is_one() {
        let t = table(
            &["M1_2020", "M1_2025"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(4.0), Numeric(0.0)]),
                (RowKey::sector("Sector B"), vec![Censored { base: 3.0, count: 2 }, Absent]),
                (RowKey::total("Total X"), vec![Numeric(7.0), Censored { base: 0.0, count: 1 }]),
            ],
        );
        let r = divide(&t, &t);
        assert_eq!(r.rows()[0].cells, vec![RatioCell::Ratio(1.0), RatioCell::Undefined]);
        assert_eq!(r.rows()[1].cells, vec![RatioCell::Ratio(1.0), RatioCell::Undefined]);
        // A censored zero is still a zero denominator.
        assert_eq!(r.rows()[2].cells, vec![RatioCell::Ratio(1.0), RatioCell::Undefined]);
        assert!(r
            .rows()
            .iter()
            .flat_map(|row| row.cells.iter())
            .all(|c| c.base().map(|x| x.is_finite()).unwrap_or(true)));
    }

    #[test]
    fn zero_national_gives_undefined() {
        let state = table(&["M1_2020"], vec![(RowKey::sector("Sector A"), vec![Numeric(50.0)])]);
        let national = table(&["M1_2020"], vec![(RowKey::sector("Sector A"), vec![Numeric(0.0)])]);
        let r = divide(&state, &national);
        assert_eq!(r.rows()[0].cells, vec![RatioCell::Undefined]);
        let r = divide_levels(&national, &state, RatioDirection::UpperOverLower);
        assert_eq!(r.rows()[0].cells, vec![RatioCell::Ratio(0.0)]);
    }

    #[test]
    fn alignment_by_key() {
        let national = table(
            &["M1_2020", "M1_2025"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(100.0), Numeric(10.0)]),
                (RowKey::sector("Sector B"), vec![Numeric(30.0), Numeric(3.0)]),
                (RowKey::total("Total Nacional"), vec![Numeric(130.0), Numeric(13.0)]),
            ],
        );
        let state = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector B"), vec![Numeric(10.0)]),
                (RowKey::sector("Sector C"), vec![Numeric(5.0)]),
                (RowKey::total("Total Tamaulipas"), vec![Numeric(65.0)]),
            ],
        );
        let r = divide_levels(&national, &state, RatioDirection::UpperOverLower);
        let labels: Vec<&str> = r.rows().iter().map(|r| r.key.label.as_str()).collect();
        assert_eq!(labels, vec!["Sector A", "Sector B", "Sector C", "Total Nacional"]);
        assert_eq!(r.columns().len(), 2);
        assert_eq!(r.rows()[0].cells, vec![RatioCell::Undefined, RatioCell::Undefined]);
        assert_eq!(r.rows()[1].cells, vec![RatioCell::Ratio(3.0), RatioCell::Undefined]);
        assert_eq!(r.rows()[2].cells, vec![RatioCell::Undefined, RatioCell::Undefined]);
        assert_eq!(r.rows()[3].cells, vec![RatioCell::Ratio(2.0), RatioCell::Undefined]);

        let share = divide_levels(&national, &state, RatioDirection::LowerOverUpper);
        assert_eq!(share.rows()[3].cells[0], RatioCell::Ratio(0.5));
        assert_eq!(share.rows()[3].key.label, "Total Tamaulipas");
    }

    #[test]
    fn composition() {
        let ns = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![RatioCell::Ratio(4.0)]),
                (RowKey::sector("Sector B"), vec![RatioCell::Undefined]),
                (RowKey::total("Total Nacional"), vec![RatioCell::Ratio(2.0)]),
            ],
        );
        let sr = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![RatioCell::Ratio(0.5)]),
                (RowKey::sector("Sector B"), vec![RatioCell::Ratio(3.0)]),
                (RowKey::total("Total Centro"), vec![RatioCell::Ratio(0.0)]),
            ],
        );
        let product = compose_ratios(&ns, &sr, ComposeMode::Product);
        assert_eq!(product.rows()[0].cells, vec![RatioCell::Ratio(2.0)]);
        assert_eq!(product.rows()[1].cells, vec![RatioCell::Undefined]);
        assert_eq!(product.rows()[2].cells, vec![RatioCell::Ratio(0.0)]);

        let quotient = compose_ratios(&ns, &sr, ComposeMode::Quotient);
        assert_eq!(quotient.rows()[0].cells, vec![RatioCell::Ratio(8.0)]);
        assert_eq!(quotient.rows()[2].cells, vec![RatioCell::Undefined]);
    }
}
