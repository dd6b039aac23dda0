pub use crate::config::*;

use std::collections::{BTreeSet, HashMap};

use log::debug;

/// A builder for wide tables, fed one cell at a time.
///
/// Rows come out in the order they were first seen, except for the total
/// row which always comes last. Columns are sorted by metric, then period.
///
/// ```
/// use census_tables::builder::Builder;
/// use census_tables::{AnnotatedValue, ColumnKey, RowKey, TableError};
///
/// let mut builder: Builder<AnnotatedValue> = Builder::new();
/// builder.add(RowKey::total("Total"), ColumnKey::new("A111A", 2018), AnnotatedValue::Numeric(3.0))?;
/// builder.add(RowKey::sector("Sector 11"), ColumnKey::new("A111A", 2018), AnnotatedValue::Numeric(3.0))?;
/// builder.add(RowKey::sector("Sector 11"), ColumnKey::new("A111A", 2013), AnnotatedValue::Numeric(2.0))?;
///
/// let table = builder.build()?;
/// assert_eq!(table.rows()[0].key.label, "Sector 11");
/// assert_eq!(table.columns()[0].to_string(), "A111A_2013");
///
/// # Ok::<(), TableError>(())
/// ```
pub struct Builder<C> {
    _rows: Vec<RowKey>,
    _row_index: HashMap<String, usize>,
    _columns: BTreeSet<ColumnKey>,
    _cells: HashMap<(usize, ColumnKey), C>,
}

impl<C: Clone + Default> Builder<C> {
    pub fn new() -> Builder<C> {
        Builder {
            _rows: Vec::new(),
            _row_index: HashMap::new(),
            _columns: BTreeSet::new(),
            _cells: HashMap::new(),
        }
    }

    /// Adds the value of a cell.
    ///
    /// A second value for the same cell is an error: the source data is
    /// inconsistent and neither value can be preferred.
    pub fn add(&mut self, row: RowKey, column: ColumnKey, value: C) -> Result<(), TableError> {
        let row_idx = match self._row_index.get(&row.label) {
            Some(idx) => *idx,
            None => {
                let idx = self._rows.len();
                self._row_index.insert(row.label.clone(), idx);
                self._rows.push(row);
                idx
            }
        };
        if self._cells.contains_key(&(row_idx, column.clone())) {
            return Err(TableError::DuplicateKey {
                row: self._rows[row_idx].label.clone(),
                column: column.to_string(),
            });
        }
        self._columns.insert(column.clone());
        self._cells.insert((row_idx, column), value);
        Ok(())
    }

    /// Declares a column even if no cell is provided for it.
    pub fn add_column(&mut self, column: ColumnKey) {
        self._columns.insert(column);
    }

    pub fn build(mut self) -> Result<Table<C>, TableError> {
        let columns: Vec<ColumnKey> = self._columns.into_iter().collect();

        let mut totals = self._rows.iter().enumerate().filter(|(_, r)| r.is_total());
        let total_idx = match (totals.next(), totals.next()) {
            (Some((_, first)), Some((_, second))) => {
                return Err(TableError::MultipleTotalRows {
                    first: first.label.clone(),
                    second: second.label.clone(),
                });
            }
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        };

        let mut order: Vec<usize> = (0..self._rows.len()).filter(|i| Some(*i) != total_idx).collect();
        order.extend(total_idx);

        let mut rows: Vec<Row<C>> = Vec::with_capacity(order.len());
        for row_idx in order {
            let cells = columns
                .iter()
                .map(|c| self._cells.remove(&(row_idx, c.clone())).unwrap_or_default())
                .collect();
            rows.push(Row {
                key: self._rows[row_idx].clone(),
                cells,
            });
        }
        debug!(
            "Builder::build: {} rows, {} columns",
            rows.len(),
            columns.len()
        );
        Table::new(columns, rows)
    }
}

impl<C: Clone + Default> Default for Builder<C> {
    fn default() -> Self {
        Builder::new()
    }
}

/// Pivots long records into a wide table: one row per activity, one column
/// per (metric, period).
pub fn reshape<'a, I, FR, FC>(records: I, row_key: FR, col_key: FC) -> Result<WideTable, TableError>
where
    I: IntoIterator<Item = &'a CensusRecord>,
    FR: Fn(&CensusRecord) -> RowKey,
    FC: Fn(&CensusRecord) -> ColumnKey,
{
    let mut builder: Builder<AnnotatedValue> = Builder::new();
    for r in records {
        builder.add(row_key(r), col_key(r), r.value)?;
    }
    builder.build()
}
