// ********* Cell values ***********

use std::error::Error;
use std::fmt::Display;

/// The content of one cell of a census table.
///
/// In most cases, values are obtained through [crate::codec::parse] and
/// combined with [crate::aggregate::sum].
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub enum AnnotatedValue {
    /// A plain measured quantity.
    Numeric(f64),
    /// A partial quantity: `base` is what was published, and `count`
    /// contributors were suppressed from it. `count` is never zero.
    Censored { base: f64, count: u64 },
    /// No such activity or period exists. This is not the same as zero.
    #[default]
    Absent,
}

impl AnnotatedValue {
    /// Builds a censored value. A zero count is a plain number.
    pub fn censored(base: f64, count: u64) -> AnnotatedValue {
        if count == 0 {
            AnnotatedValue::Numeric(base)
        } else {
            AnnotatedValue::Censored { base, count }
        }
    }

    pub fn censored_count(&self) -> u64 {
        match self {
            AnnotatedValue::Censored { count, .. } => *count,
            _ => 0,
        }
    }
}

/// The content of one cell of a ratio or percentage table.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub enum RatioCell {
    Ratio(f64),
    /// Zero denominator, or one of the operands does not exist.
    #[default]
    Undefined,
}

/// Anything that can be read as a number for the ratio and percentage
/// computations. The censoring count is not part of the measure.
pub trait Measure {
    fn base(&self) -> Option<f64>;
}

impl Measure for AnnotatedValue {
    fn base(&self) -> Option<f64> {
        match self {
            AnnotatedValue::Numeric(b) => Some(*b),
            AnnotatedValue::Censored { base, .. } => Some(*base),
            AnnotatedValue::Absent => None,
        }
    }
}

impl Measure for RatioCell {
    fn base(&self) -> Option<f64> {
        match self {
            RatioCell::Ratio(v) => Some(*v),
            RatioCell::Undefined => None,
        }
    }
}

// ********* Table structures ***********

/// A column of a wide table: one metric for one census period.
///
/// The derived ordering sorts by metric code first, then by period.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct ColumnKey {
    pub metric: String,
    pub period: i32,
}

impl ColumnKey {
    pub fn new(metric: &str, period: i32) -> ColumnKey {
        ColumnKey {
            metric: metric.to_string(),
            period,
        }
    }

    /// Reads back the `<metric>_<period>` form used in the table headers.
    pub fn parse(s: &str) -> Option<ColumnKey> {
        let (metric, period) = s.trim().rsplit_once('_')?;
        if metric.is_empty() {
            return None;
        }
        let period = period.parse::<i32>().ok()?;
        Some(ColumnKey::new(metric, period))
    }
}

impl Display for ColumnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.metric, self.period)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum RowKind {
    /// An atomic economic activity, the finest aggregation level.
    Sector,
    /// Anything between a sector and the total (sub-sectors, branches).
    Other,
    /// The grand total of the table. Always derived or reported, never summed.
    Total,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct RowKey {
    pub label: String,
    pub kind: RowKind,
}

impl RowKey {
    pub fn sector(label: &str) -> RowKey {
        RowKey {
            label: label.to_string(),
            kind: RowKind::Sector,
        }
    }

    pub fn other(label: &str) -> RowKey {
        RowKey {
            label: label.to_string(),
            kind: RowKind::Other,
        }
    }

    pub fn total(label: &str) -> RowKey {
        RowKey {
            label: label.to_string(),
            kind: RowKind::Total,
        }
    }

    pub fn is_total(&self) -> bool {
        self.kind == RowKind::Total
    }

    /// Two keys designate the same row across tables.
    ///
    /// Total rows carry the name of their unit ("Total Nacional", "Total Centro")
    /// and match each other regardless of the label.
    pub fn aligns_with(&self, other: &RowKey) -> bool {
        match (self.is_total(), other.is_total()) {
            (true, true) => true,
            (false, false) => self.label == other.label,
            _ => false,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Row<C> {
    pub key: RowKey,
    /// One cell per column of the table, in column order.
    pub cells: Vec<C>,
}

/// A table of cells indexed by activity rows and (metric, period) columns.
///
/// Invariants, checked by [Table::new]:
/// - the columns are strictly increasing,
/// - every row has one cell per column,
/// - row keys are unique,
/// - there is at most one total row, and it is the last one.
#[derive(PartialEq, Debug, Clone)]
pub struct Table<C> {
    columns: Vec<ColumnKey>,
    rows: Vec<Row<C>>,
}

pub type WideTable = Table<AnnotatedValue>;
pub type RatioTable = Table<RatioCell>;

impl<C: Clone + Default> Table<C> {
    pub fn new(columns: Vec<ColumnKey>, rows: Vec<Row<C>>) -> Result<Table<C>, TableError> {
        if columns.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TableError::UnorderedColumns);
        }
        for (idx, row) in rows.iter().enumerate() {
            if row.cells.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    row: row.key.label.clone(),
                    expected: columns.len(),
                    found: row.cells.len(),
                });
            }
            if row.key.is_total() && idx + 1 != rows.len() {
                return Err(TableError::MisplacedTotal(row.key.label.clone()));
            }
            if rows[..idx].iter().any(|r| r.key.label == row.key.label) {
                return Err(TableError::DuplicateRow(row.key.label.clone()));
            }
        }
        Ok(Table { columns, rows })
    }

    /// Builds a table whose invariants are guaranteed by construction.
    pub(crate) fn assemble(columns: Vec<ColumnKey>, rows: Vec<Row<C>>) -> Table<C> {
        debug_assert!(columns.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(rows.iter().all(|r| r.cells.len() == columns.len()));
        Table { columns, rows }
    }

    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row<C>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_row(&self) -> Option<&Row<C>> {
        self.rows.last().filter(|r| r.key.is_total())
    }

    pub fn find_row(&self, key: &RowKey) -> Option<&Row<C>> {
        self.rows.iter().find(|r| r.key.aligns_with(key))
    }

    pub fn column_index(&self, column: &ColumnKey) -> Option<usize> {
        self.columns.binary_search(column).ok()
    }

    pub fn cell(&self, row: &RowKey, column: &ColumnKey) -> Option<&C> {
        let idx = self.column_index(column)?;
        self.find_row(row).map(|r| &r.cells[idx])
    }

    /// The metric codes of the table, in column order.
    pub fn metrics(&self) -> Vec<String> {
        let mut res: Vec<String> = Vec::new();
        for c in self.columns.iter() {
            if res.last() != Some(&c.metric) {
                res.push(c.metric.clone());
            }
        }
        res
    }

    /// The sub-table with the columns of a single metric. All rows are kept.
    pub fn select_metric(&self, metric: &str) -> Table<C> {
        let selected: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.metric == metric)
            .map(|(idx, _)| idx)
            .collect();
        let columns = selected.iter().map(|i| self.columns[*i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| Row {
                key: r.key.clone(),
                cells: selected.iter().map(|i| r.cells[*i].clone()).collect(),
            })
            .collect();
        Table::assemble(columns, rows)
    }

    /// Appends a total row. An existing total row is replaced.
    pub fn with_total_row(self, total: Row<C>) -> Result<Table<C>, TableError> {
        let mut rows: Vec<Row<C>> = self.rows.into_iter().filter(|r| !r.key.is_total()).collect();
        let key = RowKey::total(&total.key.label);
        rows.push(Row {
            key,
            cells: total.cells,
        });
        Table::new(self.columns, rows)
    }
}

// ********* Census records ***********

/// The geographic levels of the census hierarchy, widest first.
/// Regions sit between the state and its municipalities and are built by
/// aggregation, so they never appear in the source records.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GeoLevel {
    National,
    State,
    Municipal(String),
}

/// One metric of one row of the source dataset.
#[derive(PartialEq, Debug, Clone)]
pub struct CensusRecord {
    pub period: i32,
    pub entity: String,
    /// Empty for the entity-level aggregates.
    pub municipality: Option<String>,
    pub activity: String,
    pub metric: String,
    pub value: AnnotatedValue,
}

// ********* Configuration **********

/// Which way the ratio between two adjacent levels is taken.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RatioDirection {
    /// The wider level over the narrower one: national/state, state/region.
    UpperOverLower,
    /// The narrower level over the wider one: the share of the wider level.
    LowerOverUpper,
}

/// How the national/state and state/region ratios are combined into a
/// national/region weight.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ComposeMode {
    /// (national/state) × (state/region)
    Product,
    /// (national/state) / (state/region)
    Quotient,
}

/// Where the total row of an aggregated table comes from.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TotalPolicy {
    /// Sum the totals reported by the source, falling back to the sector rows.
    Reported,
    /// Always sum the sector rows.
    Derived,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TotalSource {
    Reported,
    Derived,
}

// ********* Errors **********

/// Errors that prevent a table from being built.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TableError {
    /// Two values were provided for the same cell.
    DuplicateKey { row: String, column: String },
    DuplicateRow(String),
    MultipleTotalRows { first: String, second: String },
    MisplacedTotal(String),
    MissingTotalRow,
    RaggedRow {
        row: String,
        expected: usize,
        found: usize,
    },
    UnorderedColumns,
}

impl Error for TableError {}

impl Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::DuplicateKey { row, column } => {
                write!(f, "more than one value for row {:?}, column {}", row, column)
            }
            TableError::DuplicateRow(row) => write!(f, "row {:?} appears twice", row),
            TableError::MultipleTotalRows { first, second } => {
                write!(f, "two total rows: {:?} and {:?}", first, second)
            }
            TableError::MisplacedTotal(row) => {
                write!(f, "total row {:?} is not the last row", row)
            }
            TableError::MissingTotalRow => write!(f, "the last row is not a total row"),
            TableError::RaggedRow {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {:?} has {} cells, expected {}",
                row, found, expected
            ),
            TableError::UnorderedColumns => write!(f, "columns are not sorted or not unique"),
        }
    }
}

/// Inconsistencies in the static region map.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum GeographyError {
    DuplicateMunicipality {
        municipality: String,
        first_region: String,
        second_region: String,
    },
    DuplicateRegion(String),
    EmptyRegion(String),
}

impl Error for GeographyError {}

impl Display for GeographyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeographyError::DuplicateMunicipality {
                municipality,
                first_region,
                second_region,
            } => write!(
                f,
                "municipality {:?} belongs to both {:?} and {:?}",
                municipality, first_region, second_region
            ),
            GeographyError::DuplicateRegion(name) => write!(f, "region {:?} is defined twice", name),
            GeographyError::EmptyRegion(name) => write!(f, "region {:?} has no municipality", name),
        }
    }
}
