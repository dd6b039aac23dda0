//! Sums of annotated values and the totals built from them.

use std::collections::BTreeSet;
use std::ops::Add;

use log::{debug, info};

use crate::config::*;

impl Add for AnnotatedValue {
    type Output = AnnotatedValue;

    /// Absent values are skipped. Bases and censoring counts add up separately.
    fn add(self, rhs: AnnotatedValue) -> AnnotatedValue {
        use AnnotatedValue::*;
        match (self, rhs) {
            (Absent, x) | (x, Absent) => x,
            (Numeric(a), Numeric(b)) => Numeric(a + b),
            (a, b) => match (a.base(), b.base()) {
                (Some(x), Some(y)) => AnnotatedValue::censored(
                    x + y,
                    a.censored_count().saturating_add(b.censored_count()),
                ),
                // Unreachable: both sides are present here.
                _ => Absent,
            },
        }
    }
}

impl std::iter::Sum for AnnotatedValue {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(AnnotatedValue::Absent, |acc, v| acc + v)
    }
}

impl<'a> std::iter::Sum<&'a AnnotatedValue> for AnnotatedValue {
    fn sum<I: Iterator<Item = &'a AnnotatedValue>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Sums values. The sum of nothing, or of absent values only, is absent.
pub fn sum<'a, I>(values: I) -> AnnotatedValue
where
    I: IntoIterator<Item = &'a AnnotatedValue>,
{
    values.into_iter().sum()
}

/// The total row of a table: the sum of the sector rows, column by column.
///
/// Total and intermediate rows are never part of the sum, so that nothing is
/// counted twice.
pub fn build_total_row(table: &WideTable, label: &str) -> Row<AnnotatedValue> {
    let sectors: Vec<&Row<AnnotatedValue>> = table
        .rows()
        .iter()
        .filter(|r| r.key.kind == RowKind::Sector)
        .collect();
    let cells = (0..table.columns().len())
        .map(|idx| sectors.iter().map(|r| &r.cells[idx]).sum::<AnnotatedValue>())
        .collect();
    Row {
        key: RowKey::total(label),
        cells,
    }
}

/// Returns the table with a total row, deriving it from the sectors if the
/// source did not report one.
pub fn ensure_total_row(
    table: WideTable,
    label: &str,
) -> Result<(WideTable, TotalSource), TableError> {
    if table.total_row().is_some() {
        return Ok((table, TotalSource::Reported));
    }
    debug!("ensure_total_row: deriving total row {:?}", label);
    let total = build_total_row(&table, label);
    Ok((table.with_total_row(total)?, TotalSource::Derived))
}

/// Columns in which the reported total row differs from the sum of the
/// sector rows. Empty when the table has no total row.
pub fn verify_total_row(table: &WideTable) -> Vec<ColumnKey> {
    let reported = match table.total_row() {
        Some(r) => r,
        None => return Vec::new(),
    };
    let derived = build_total_row(table, &reported.key.label);
    table
        .columns()
        .iter()
        .zip(reported.cells.iter().zip(derived.cells.iter()))
        .filter(|(_, (r, d))| !values_agree(r, d))
        .map(|(c, _)| c.clone())
        .collect()
}

// Equality at the precision of the written tables.
fn values_agree(a: &AnnotatedValue, b: &AnnotatedValue) -> bool {
    match (a.base(), b.base()) {
        (None, None) => true,
        (Some(x), Some(y)) => {
            (x - y).abs() < 5e-4 && a.censored_count() == b.censored_count()
        }
        _ => false,
    }
}

/// Builds the table of a region from the tables of its municipalities.
///
/// Each cell is the sum of the corresponding municipal cells; a municipality
/// without the row or the column contributes nothing. The total row follows
/// `policy`; when the reported totals are not available for every
/// municipality, it is derived from the aggregated sector rows.
pub fn aggregate_across_municipalities(
    total_label: &str,
    tables: &[&WideTable],
    policy: TotalPolicy,
) -> Result<(WideTable, TotalSource), TableError> {
    let columns: Vec<ColumnKey> = tables
        .iter()
        .flat_map(|t| t.columns().iter().cloned())
        .collect::<BTreeSet<ColumnKey>>()
        .into_iter()
        .collect();

    // Rows in order of first appearance.
    let mut keys: Vec<RowKey> = Vec::new();
    for t in tables.iter() {
        for r in t.rows().iter().filter(|r| !r.key.is_total()) {
            if !keys.iter().any(|k| k.label == r.key.label) {
                keys.push(r.key.clone());
            }
        }
    }

    let mut rows: Vec<Row<AnnotatedValue>> = keys
        .into_iter()
        .map(|key| {
            let cells = columns
                .iter()
                .map(|c| {
                    tables
                        .iter()
                        .filter_map(|t| t.cell(&key, c))
                        .sum::<AnnotatedValue>()
                })
                .collect();
            Row { key, cells }
        })
        .collect();

    let all_reported = !tables.is_empty() && tables.iter().all(|t| t.total_row().is_some());
    let (total, source) = if policy == TotalPolicy::Reported && all_reported {
        let cells = columns
            .iter()
            .map(|c| {
                tables
                    .iter()
                    .filter_map(|t| {
                        t.total_row()
                            .and_then(|r| t.column_index(c).map(|i| &r.cells[i]))
                    })
                    .sum::<AnnotatedValue>()
            })
            .collect();
        (
            Row {
                key: RowKey::total(total_label),
                cells,
            },
            TotalSource::Reported,
        )
    } else {
        if policy == TotalPolicy::Reported {
            info!(
                "aggregate_across_municipalities: {}: reported totals missing, summing the sectors",
                total_label
            );
        }
        let partial = Table::assemble(columns.clone(), rows.clone());
        (build_total_row(&partial, total_label), TotalSource::Derived)
    };
    rows.push(total);
    Ok((Table::new(columns, rows)?, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnnotatedValue::*;

    fn table(columns: &[&str], rows: Vec<(RowKey, Vec<AnnotatedValue>)>) -> WideTable {
        let columns = columns.iter().map(|c| ColumnKey::parse(c).unwrap()).collect();
        let rows = rows
            .into_iter()
            .map(|(key, cells)| Row { key, cells })
            .collect();
        Table::new(columns, rows).unwrap()
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn sum_rules() {
        assert_eq!(sum(&[] as &[AnnotatedValue]), Absent);
        assert_eq!(sum(&[Absent, Absent]), Absent);
        assert_eq!(sum(&[Absent, Numeric(0.0)]), Numeric(0.0));
        assert_eq!(sum(&[Numeric(1.0), Numeric(2.5)]), Numeric(3.5));
        assert_eq!(
            sum(&[Numeric(1.0), Censored { base: 2.0, count: 1 }, Absent]),
            Censored { base: 3.0, count: 1 }
        );
        assert_eq!(
            sum(&[
                Censored { base: 0.0, count: 2 },
                Censored { base: 4.0, count: 3 }
            ]),
            Censored { base: 4.0, count: 5 }
        );
    }

    #[test]
    fn large_censored_counts() {
        let big = crate::codec::parse("4294967295C");
        assert_eq!(big, Censored { base: 0.0, count: 4_294_967_295 });
        assert_eq!(
            sum(&[big, crate::codec::parse("1 + C")]),
            Censored { base: 1.0, count: 4_294_967_296 }
        );
        assert_eq!(
            sum(&[Censored { base: 1.0, count: u64::MAX }, Censored { base: 2.0, count: 1 }]),
            Censored { base: 3.0, count: u64::MAX }
        );
    }

    #[test]
    fn sum_order_does_not_matter() {
        let values = [
            Numeric(1.5),
            Absent,
            Censored { base: 2.0, count: 1 },
            Numeric(-0.5),
            Censored { base: 0.0, count: 3 },
        ];
        let forward = sum(&values);
        let mut reversed = values;
        reversed.reverse();
        assert_eq!(forward, sum(&reversed));
        let left = sum(&values[..2]) + sum(&values[2..]);
        assert_eq!(forward, left);
        // No censoring is lost.
        assert_eq!(forward.censored_count(), 4);
    }

    #[test]
    fn total_row_from_sectors() {
        let t = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(10.0)]),
                (RowKey::other("Subsector A1"), vec![Numeric(100.0)]),
                (RowKey::sector("Sector B"), vec![Censored { base: 5.0, count: 1 }]),
            ],
        );
        let total = build_total_row(&t, "Total");
        assert_eq!(total.key, RowKey::total("Total"));
        assert_eq!(total.cells, vec![Censored { base: 15.0, count: 1 }]);
        assert_eq!(crate::codec::format(&total.cells[0]), "15 + C");
    }

    #[test]
    fn existing_total_is_not_summed() {
        let t = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(10.0)]),
                (RowKey::total("Total"), vec![Numeric(12.0)]),
            ],
        );
        assert_eq!(build_total_row(&t, "T").cells, vec![Numeric(10.0)]);
        let (same, source) = ensure_total_row(t.clone(), "T").unwrap();
        assert_eq!(source, TotalSource::Reported);
        assert_eq!(same, t);
        assert_eq!(verify_total_row(&t), vec![ColumnKey::new("M1", 2020)]);
    }

    #[test]
    fn derived_total_is_appended() {
        let t = table(
            &["M1_2020", "M1_2021"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(1.0), Absent]),
                (RowKey::sector("Sector B"), vec![Numeric(2.0), Absent]),
            ],
        );
        let (t, source) = ensure_total_row(t, "Total R").unwrap();
        assert_eq!(source, TotalSource::Derived);
        let total = t.total_row().unwrap();
        assert_eq!(total.cells, vec![Numeric(3.0), Absent]);
        assert!(verify_total_row(&t).is_empty());
    }

    #[test]
    fn absent_municipality_does_not_zero_region() {
        init_logs();
        let m1 = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Absent]),
                (RowKey::total("Total 001"), vec![Absent]),
            ],
        );
        let m2 = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(7.0)]),
                (RowKey::total("Total 002"), vec![Numeric(7.0)]),
            ],
        );
        let (region, source) =
            aggregate_across_municipalities("Total R", &[&m1, &m2], TotalPolicy::Reported).unwrap();
        assert_eq!(source, TotalSource::Reported);
        let col = ColumnKey::new("M1", 2020);
        assert_eq!(region.cell(&RowKey::sector("Sector A"), &col), Some(&Numeric(7.0)));
        assert_eq!(region.total_row().unwrap().key.label, "Total R");
    }

    #[test]
    fn region_union_of_rows_and_columns() {
        init_logs();
        let m1 = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(1.0)]),
                (RowKey::total("Total 001"), vec![Numeric(50.0)]),
            ],
        );
        let m2 = table(
            &["M1_2020", "M1_2025"],
            vec![
                (RowKey::sector("Sector B"), vec![Censored { base: 2.0, count: 1 }, Numeric(4.0)]),
                (RowKey::sector("Sector A"), vec![Numeric(3.0), Absent]),
            ],
        );
        // m2 has no reported total: the region total is derived.
        let (region, source) =
            aggregate_across_municipalities("Total R", &[&m1, &m2], TotalPolicy::Reported).unwrap();
        assert_eq!(source, TotalSource::Derived);
        let labels: Vec<&str> = region.rows().iter().map(|r| r.key.label.as_str()).collect();
        assert_eq!(labels, vec!["Sector A", "Sector B", "Total R"]);
        assert_eq!(
            region.columns(),
            &[ColumnKey::new("M1", 2020), ColumnKey::new("M1", 2025)]
        );
        assert_eq!(region.rows()[0].cells, vec![Numeric(4.0), Absent]);
        assert_eq!(
            region.total_row().unwrap().cells,
            vec![Censored { base: 6.0, count: 1 }, Numeric(4.0)]
        );
    }

    #[test]
    fn region_total_from_reported_totals() {
        init_logs();
        let m1 = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(1.0)]),
                (RowKey::total("Total 001"), vec![Numeric(50.0)]),
            ],
        );
        let m2 = table(
            &["M1_2020"],
            vec![
                (RowKey::sector("Sector A"), vec![Numeric(2.0)]),
                (RowKey::total("Total 002"), vec![Censored { base: 10.0, count: 2 }]),
            ],
        );
        let (region, _) =
            aggregate_across_municipalities("Total R", &[&m1, &m2], TotalPolicy::Reported).unwrap();
        assert_eq!(
            region.total_row().unwrap().cells,
            vec![Censored { base: 60.0, count: 2 }]
        );
        let (derived, source) =
            aggregate_across_municipalities("Total R", &[&m1, &m2], TotalPolicy::Derived).unwrap();
        assert_eq!(source, TotalSource::Derived);
        assert_eq!(derived.total_row().unwrap().cells, vec![Numeric(3.0)]);
    }
}
