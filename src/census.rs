use log::{debug, error, info, warn};

pub use census_tables::geography::{Geography, PeriodSet, Region, RegionMap};
pub use census_tables::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use census_tables::codec::ValueReader;
use serde::{Deserialize, Serialize};
use text_diff::print_diff;

use crate::census::config_reader::*;
use crate::census::io_common::InputColumns;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod stages;

pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Snafu)]
pub enum CensusError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet {name:?} in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("Empty workbook {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error reading file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error creating directory {path}"))]
    CreatingDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error removing directory {path}"))]
    RemovingDir {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing the run summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("{path}: cannot read line {lineno}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error writing CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Error flushing CSV file {path}"))]
    Flushing {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{path}: no header"))]
    MissingHeader { path: String },
    #[snafu(display("{path}: required column {column:?} not found in the header"))]
    MissingColumn { path: String, column: String },
    #[snafu(display("{path}: cannot read the column name {column:?}"))]
    InvalidColumn { path: String, column: String },
    #[snafu(display("Invalid region configuration"))]
    InvalidGeography { source: GeographyError },
    #[snafu(display("{unit}: cannot build the table"))]
    BuildingTable { source: TableError, unit: String },
    #[snafu(display("Missing parent directory for {path}"))]
    MissingParentDir { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CensusResult<T> = Result<T, CensusError>;

/// The validated rules of a run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PipelineRules {
    pub ratio_direction: RatioDirection,
    pub compose_mode: ComposeMode,
    pub sector_prefix: String,
    pub total_labels: Vec<String>,
    pub metrics: Option<Vec<String>>,
    pub write_percentages: bool,
}

impl PipelineRules {
    pub fn metric_selected(&self, code: &str) -> bool {
        match &self.metrics {
            Some(codes) => codes.iter().any(|c| c == code),
            None => true,
        }
    }
}

/// Everything the stages need, built once from the configuration.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Settings {
    pub geography: Geography,
    pub rules: PipelineRules,
    pub national_label: String,
    pub state_label: String,
    /// Header of the first column of the written tables.
    pub activity_header: String,
}

/// Options of the command line that take precedence over the configuration.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunOverrides {
    pub input: Option<String>,
    pub out: Option<String>,
    pub clear: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub stage: String,
    pub metric: Option<String>,
    pub unit: String,
    pub reason: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TotalMismatch {
    pub unit: String,
    pub columns: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Paths relative to the output directory, in the order of writing.
    #[serde(rename = "tablesWritten")]
    pub tables_written: Vec<String>,
    pub skipped: Vec<SkippedUnit>,
    #[serde(rename = "derivedTotals")]
    pub derived_totals: Vec<String>,
    #[serde(rename = "totalMismatches")]
    pub total_mismatches: Vec<TotalMismatch>,
    #[serde(rename = "uncoveredMunicipalities")]
    pub uncovered_municipalities: Vec<String>,
    #[serde(rename = "unparsableCells")]
    pub unparsable_cells: usize,
    #[serde(rename = "unparsableSamples")]
    pub unparsable_samples: Vec<String>,
}

pub fn validate_rules(rules: &RulesConfig, output: &OutputSettings) -> CensusResult<PipelineRules> {
    let res = PipelineRules {
        ratio_direction: rules.ratio_direction()?,
        compose_mode: rules.compose_mode()?,
        sector_prefix: rules
            .sector_prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_SECTOR_PREFIX.to_string()),
        total_labels: match &rules.total_labels {
            Some(labels) if labels.is_empty() => {
                whatever!("totalLabels may not be empty")
            }
            Some(labels) => labels.clone(),
            None => DEFAULT_TOTAL_LABELS.iter().map(|s| s.to_string()).collect(),
        },
        metrics: rules.metrics.clone(),
        write_percentages: output.write_percentages.unwrap_or(true),
    };
    Ok(res)
}

fn build_geography(config: &CensusConfig, records: &[CensusRecord]) -> CensusResult<Geography> {
    let regions: Vec<Region> = config
        .geography
        .regions
        .iter()
        .map(|r| Region {
            name: r.name.clone(),
            municipalities: r.municipalities.iter().map(|m| m.trim().to_string()).collect(),
        })
        .collect();
    let regions = RegionMap::new(regions).context(InvalidGeographySnafu {})?;

    let years: Vec<i32> = match &config.periods.years {
        Some(years) => years.clone(),
        None => records
            .iter()
            .map(|r| r.period)
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect(),
    };
    let mut periods = PeriodSet::new(years);
    if let Some(minimum) = config.periods.minimum_year {
        periods = periods.with_floor(minimum);
    }
    if periods.years().is_empty() {
        warn!("build_geography: no census year selected");
    }
    info!("build_geography: years: {:?}", periods.years());

    Ok(Geography {
        national_entity: config
            .geography
            .national_entity
            .clone()
            .unwrap_or_else(|| DEFAULT_NATIONAL_ENTITY.to_string()),
        state_entity: config
            .geography
            .state_entity
            .clone()
            .unwrap_or_else(|| DEFAULT_STATE_ENTITY.to_string()),
        regions,
        periods,
    })
}

fn read_records(path: &str, source: &InputSource, reader: &mut ValueReader) -> CensusResult<Vec<CensusRecord>> {
    info!("Attempting to read census file {:?}", path);
    let raw = match source.provider.as_str() {
        "csv" => io_csv::read_raw_csv(path)?,
        "excel" => io_excel::read_raw_excel(path, source.excel_worksheet_name.as_deref())?,
        x => whatever!("Provider not implemented {:?}", x),
    };
    let columns: InputColumns = source.columns();
    let records = io_common::explode(&raw, &columns, reader)?;
    info!("read_records: {} records", records.len());
    Ok(records)
}

fn clear_output(out_dir: &Path) -> CensusResult<()> {
    if out_dir.exists() {
        info!("Removing the output directory {}", out_dir.display());
        fs::remove_dir_all(out_dir).context(RemovingDirSnafu {
            path: out_dir.display().to_string(),
        })?;
    }
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    info!("{} tables written", summary.tables_written.len());
    for s in summary.skipped.iter() {
        info!(
            "skipped: {}: {} {}: {}",
            s.stage,
            s.unit,
            s.metric.clone().unwrap_or_default(),
            s.reason
        );
    }
    if !summary.derived_totals.is_empty() {
        info!("derived totals: {:?}", summary.derived_totals);
    }
    if !summary.total_mismatches.is_empty() {
        warn!("{} reported totals differ from their sectors", summary.total_mismatches.len());
    }
    if summary.unparsable_cells > 0 {
        warn!(
            "{} cells could not be read, for example {:?}",
            summary.unparsable_cells, summary.unparsable_samples
        );
    }
}

// Compares every output with the file at the same place under the reference directory.
fn check_reference(out_dir: &Path, reference: &Path, summary: &RunSummary) -> CensusResult<()> {
    let mut differences = 0;
    let mut rels: Vec<&str> = summary.tables_written.iter().map(|s| s.as_str()).collect();
    rels.push(SUMMARY_FILE);
    for rel in rels {
        let ours_p = out_dir.join(rel);
        let ours = fs::read_to_string(&ours_p).context(OpeningFileSnafu {
            path: ours_p.display().to_string(),
        })?;
        let theirs = match fs::read_to_string(reference.join(rel)) {
            Ok(s) => s,
            Err(e) => {
                warn!("check_reference: {}: not in the reference: {}", rel, e);
                differences += 1;
                continue;
            }
        };
        if ours != theirs {
            warn!("Found differences with the reference file {}", rel);
            print_diff(theirs.as_str(), ours.as_str(), "\n");
            differences += 1;
        } else {
            debug!("check_reference: {}: identical", rel);
        }
    }
    if differences > 0 {
        whatever!(
            "{} outputs differ from the reference {}",
            differences,
            reference.display()
        )
    }
    Ok(())
}

/// Runs all the stages for the given configuration file.
///
/// Relative paths of the configuration are taken from the directory of the
/// configuration file. When a reference directory is provided, the run fails
/// if any output differs from the reference.
pub fn run_pipeline(
    config_path: &str,
    overrides: &RunOverrides,
    reference: Option<String>,
) -> CensusResult<RunSummary> {
    let config = read_config(config_path)?;
    info!("config: {:?}", config);
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu { path: config_path })?;

    let rules = validate_rules(&config.rules, &config.output_settings)?;

    let input_path: String = match &overrides.input {
        Some(p) => p.clone(),
        None => root_p.join(&config.input_source.file_path).display().to_string(),
    };
    let out_dir: PathBuf = match &overrides.out {
        Some(p) => PathBuf::from(p),
        None => root_p.join(
            config
                .output_settings
                .output_directory
                .clone()
                .unwrap_or_else(|| "output".to_string()),
        ),
    };
    if overrides.clear || config.output_settings.clear_output.unwrap_or(false) {
        clear_output(&out_dir)?;
    }
    fs::create_dir_all(&out_dir).context(CreatingDirSnafu {
        path: out_dir.display().to_string(),
    })?;

    let mut reader = ValueReader::new();
    let records = read_records(&input_path, &config.input_source, &mut reader)?;
    let geography = build_geography(&config, &records)?;

    let settings = Settings {
        geography,
        rules,
        national_label: config
            .geography
            .national_label
            .clone()
            .unwrap_or_else(|| DEFAULT_NATIONAL_LABEL.to_string()),
        state_label: config
            .geography
            .state_label
            .clone()
            .unwrap_or_else(|| DEFAULT_STATE_LABEL.to_string()),
        activity_header: config
            .output_settings
            .activity_column
            .clone()
            .unwrap_or_else(|| DEFAULT_OUTPUT_ACTIVITY_COLUMN.to_string()),
    };

    let mut summary = stages::run_stages(&settings, &out_dir, &records)?;
    summary.unparsable_cells = reader.unparsable();
    summary.unparsable_samples = reader.samples().to_vec();

    let pretty_js_summary = serde_json::to_string_pretty(&summary).context(WritingJsonSnafu {})?;
    let summary_p = out_dir.join(SUMMARY_FILE);
    fs::write(&summary_p, pretty_js_summary).context(WritingFileSnafu {
        path: summary_p.display().to_string(),
    })?;
    log_summary(&summary);

    if let Some(reference_p) = reference {
        check_reference(&out_dir, Path::new(&reference_p), &summary)?;
    }

    Ok(summary)
}
