// The stages of a run. Each stage writes its tables under the output
// directory, and the ratio stages read back what the earlier stages wrote.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use census_tables::aggregate::{aggregate_across_municipalities, ensure_total_row, verify_total_row};
use census_tables::builder::reshape;
use census_tables::codec;
use census_tables::percent::to_percentage;
use census_tables::ratio::{compose_ratios, divide_levels};

use crate::census::io_common::sanitize_file_name;
use crate::census::io_csv::{read_table, write_table};
use crate::census::*;

const NATIONAL_STATE_DIR: &str = "proportional_national_state";
const STATE_REGIONS_DIR: &str = "proportional_state_regions";
const REGION_WEIGHT_DIR: &str = "proportional_region_weight";

/// Relative paths of the outputs.
#[derive(Debug, Clone)]
pub struct Layout {
    national: String,
    state: String,
}

impl Layout {
    pub fn new(settings: &Settings) -> Layout {
        Layout {
            national: sanitize_file_name(&settings.national_label),
            state: sanitize_file_name(&settings.state_label),
        }
    }

    pub fn national_dir(&self) -> PathBuf {
        PathBuf::from(&self.national)
    }

    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(&self.state)
    }

    pub fn municipal_table(&self, municipality: &str) -> PathBuf {
        PathBuf::from(format!("{}_Municipal", self.state))
            .join(format!("{}.csv", sanitize_file_name(municipality)))
    }

    pub fn regional_dir(&self, region: &str) -> PathBuf {
        PathBuf::from(format!("{}_Regional", self.state)).join(sanitize_file_name(region))
    }

    /// `<dir>/<label>.csv`, all the metrics of a unit.
    pub fn unit_table(dir: &Path, label: &str) -> PathBuf {
        dir.join(format!("{}.csv", sanitize_file_name(label)))
    }

    /// `<dir>/<code>_<label>.csv`
    pub fn metric_table(dir: &Path, code: &str, label: &str) -> PathBuf {
        dir.join(format!("{}_{}.csv", code, sanitize_file_name(label)))
    }

    pub fn percent_table(dir: &Path, code: &str, label: &str) -> PathBuf {
        dir.join(format!("{}_{}_percent.csv", code, sanitize_file_name(label)))
    }

    pub fn national_state_ratio(&self, code: &str) -> PathBuf {
        PathBuf::from(NATIONAL_STATE_DIR).join(format!("{}_proportional.csv", code))
    }

    pub fn state_region_ratio(&self, region: &str, code: &str) -> PathBuf {
        let r = sanitize_file_name(region);
        PathBuf::from(STATE_REGIONS_DIR)
            .join(&r)
            .join(format!("{}_{}_proportional.csv", code, r))
    }

    pub fn region_weight(&self, region: &str, code: &str) -> PathBuf {
        let r = sanitize_file_name(region);
        PathBuf::from(REGION_WEIGHT_DIR)
            .join(&r)
            .join(format!("{}_{}_weight.csv", code, r))
    }
}

// Relative paths are reported with `/` whatever the platform.
fn rel_string(rel: &Path) -> String {
    rel.iter()
        .map(|c| c.to_string_lossy().to_string())
        .collect::<Vec<String>>()
        .join("/")
}

pub struct StageContext<'a> {
    pub settings: &'a Settings,
    pub layout: Layout,
    pub out_dir: PathBuf,
    pub summary: RunSummary,
    // Ratios written during this run, at full precision.
    ratios: BTreeMap<PathBuf, RatioTable>,
}

impl<'a> StageContext<'a> {
    pub fn new(settings: &'a Settings, out_dir: &Path) -> StageContext<'a> {
        StageContext {
            settings,
            layout: Layout::new(settings),
            out_dir: out_dir.to_path_buf(),
            summary: RunSummary::default(),
            ratios: BTreeMap::new(),
        }
    }

    fn write_wide(&mut self, rel: &Path, table: &WideTable) -> CensusResult<()> {
        write_table(
            &self.out_dir.join(rel),
            &self.settings.activity_header,
            table,
            codec::format,
        )?;
        self.summary.tables_written.push(rel_string(rel));
        Ok(())
    }

    fn write_ratio(&mut self, rel: &Path, table: &RatioTable) -> CensusResult<()> {
        write_table(
            &self.out_dir.join(rel),
            &self.settings.activity_header,
            table,
            codec::format_ratio,
        )?;
        self.summary.tables_written.push(rel_string(rel));
        self.ratios.insert(rel.to_path_buf(), table.clone());
        Ok(())
    }

    fn read_wide(&self, rel: &Path) -> CensusResult<WideTable> {
        read_table(
            &self.out_dir.join(rel),
            &self.settings.rules.sector_prefix,
            codec::parse,
        )
    }

    /// A ratio table of this run, or the file of a previous run. The files
    /// only keep 6 decimals.
    fn read_ratio(&self, rel: &Path) -> CensusResult<RatioTable> {
        if let Some(table) = self.ratios.get(rel) {
            return Ok(table.clone());
        }
        read_table(
            &self.out_dir.join(rel),
            &self.settings.rules.sector_prefix,
            codec::parse_ratio,
        )
    }

    /// The first of the inputs that has not been written, if any.
    fn first_missing<'p>(&self, inputs: &[&'p Path]) -> Option<&'p Path> {
        inputs
            .iter()
            .find(|p| !self.out_dir.join(p).is_file())
            .copied()
    }

    fn skip(&mut self, stage: &str, metric: Option<&str>, unit: &str, reason: String) {
        self.summary.skipped.push(SkippedUnit {
            stage: stage.to_string(),
            metric: metric.map(|m| m.to_string()),
            unit: unit.to_string(),
            reason,
        });
    }
}

/// The row key of an activity in the table of a unit.
pub fn row_key(rules: &PipelineRules, unit_label: &str, activity: &str) -> RowKey {
    let activity = activity.trim();
    if rules
        .total_labels
        .iter()
        .any(|t| t.trim().eq_ignore_ascii_case(activity))
    {
        RowKey::total(&format!("Total {}", unit_label))
    } else if activity.starts_with(rules.sector_prefix.as_str()) {
        RowKey::sector(activity)
    } else {
        RowKey::other(activity)
    }
}

// Builds the table of one unit and checks its total row.
// Failures are reported in the summary and the unit is skipped.
fn unit_table(
    ctx: &mut StageContext,
    stage: &str,
    unit_label: &str,
    records: &[&CensusRecord],
) -> Option<(WideTable, TotalSource)> {
    let settings = ctx.settings;
    let rules = &settings.rules;
    if records.is_empty() {
        warn!("{}: {}: no records, skipping", stage, unit_label);
        ctx.skip(stage, None, unit_label, "no records".to_string());
        return None;
    }
    let reshaped = reshape(
        records.iter().copied(),
        |r| row_key(rules, unit_label, &r.activity),
        |r| ColumnKey::new(&r.metric, r.period),
    )
    .and_then(|t| ensure_total_row(t, &format!("Total {}", unit_label)));
    let (table, source) = match reshaped {
        Ok(x) => x,
        Err(e) => {
            error!("{}: {}: {}", stage, unit_label, e);
            ctx.skip(stage, None, unit_label, e.to_string());
            return None;
        }
    };
    if source == TotalSource::Derived {
        info!("{}: {}: no total reported, summing the sectors", stage, unit_label);
        ctx.summary.derived_totals.push(unit_label.to_string());
    }
    report_mismatches(ctx, stage, unit_label, &table);
    debug!(
        "{}: {}: {} rows, {} columns",
        stage,
        unit_label,
        table.rows().len(),
        table.columns().len()
    );
    Some((table, source))
}

fn report_mismatches(ctx: &mut StageContext, stage: &str, unit_label: &str, table: &WideTable) {
    let mismatches = verify_total_row(table);
    if !mismatches.is_empty() {
        let columns: Vec<String> = mismatches.iter().map(|c| c.to_string()).collect();
        warn!(
            "{}: {}: the reported total differs from the sum of the sectors in {:?}",
            stage, unit_label, columns
        );
        ctx.summary.total_mismatches.push(TotalMismatch {
            unit: unit_label.to_string(),
            columns,
        });
    }
}

// The table of the unit, one table per metric and the percentages.
fn write_unit_tables(ctx: &mut StageContext, dir: &Path, label: &str, table: &WideTable) -> CensusResult<()> {
    ctx.write_wide(&Layout::unit_table(dir, label), table)?;
    for code in table.metrics() {
        let sub = table.select_metric(&code);
        ctx.write_wide(&Layout::metric_table(dir, &code, label), &sub)?;
        if ctx.settings.rules.write_percentages {
            match to_percentage(&sub) {
                Ok(p) => ctx.write_ratio(&Layout::percent_table(dir, &code, label), &p)?,
                Err(e) => {
                    warn!("percentages: {}: {}: {}", label, code, e);
                    ctx.skip("percentages", Some(code.as_str()), label, e.to_string());
                }
            }
        }
    }
    Ok(())
}

fn selected<'r>(ctx: &StageContext, records: &'r [CensusRecord], level: &GeoLevel) -> Vec<&'r CensusRecord> {
    let settings = ctx.settings;
    records
        .iter()
        .filter(|r| settings.rules.metric_selected(&r.metric))
        .filter(|r| settings.geography.level(r).as_ref() == Some(level))
        .collect()
}

/// The national or the state table.
pub fn entity_stage(ctx: &mut StageContext, records: &[CensusRecord], level: GeoLevel) -> CensusResult<Option<WideTable>> {
    let (stage, label, dir) = match &level {
        GeoLevel::National => ("national", ctx.settings.national_label.clone(), ctx.layout.national_dir()),
        GeoLevel::State => ("state", ctx.settings.state_label.clone(), ctx.layout.state_dir()),
        GeoLevel::Municipal(m) => whatever!("entity_stage: not an entity level: {}", m),
    };
    info!("{}: building the tables of {}", stage, label);
    let recs = selected(ctx, records, &level);
    match unit_table(ctx, stage, &label, &recs) {
        Some((table, _)) => {
            write_unit_tables(ctx, &dir, &label, &table)?;
            Ok(Some(table))
        }
        None => Ok(None),
    }
}

/// The tables of the municipalities of the state, by municipality.
pub fn municipal_stage(
    ctx: &mut StageContext,
    records: &[CensusRecord],
) -> CensusResult<BTreeMap<String, (WideTable, TotalSource)>> {
    let settings = ctx.settings;
    let mut groups: BTreeMap<String, Vec<&CensusRecord>> = BTreeMap::new();
    for r in records.iter().filter(|r| settings.rules.metric_selected(&r.metric)) {
        if let Some(GeoLevel::Municipal(m)) = settings.geography.level(r) {
            groups.entry(m).or_default().push(r);
        }
    }
    info!("municipal: {} municipalities", groups.len());

    let uncovered = settings.geography.regions.uncovered(groups.keys());
    for m in uncovered.iter() {
        warn!("municipal: {} does not belong to any region", m);
    }
    ctx.summary.uncovered_municipalities = uncovered;

    let mut res: BTreeMap<String, (WideTable, TotalSource)> = BTreeMap::new();
    for (m, recs) in groups.iter() {
        if let Some((table, source)) = unit_table(ctx, "municipal", m, recs) {
            let rel = ctx.layout.municipal_table(m);
            ctx.write_wide(&rel, &table)?;
            res.insert(m.clone(), (table, source));
        }
    }
    Ok(res)
}

/// The tables of the regions, summed from their municipalities.
pub fn regional_stage(
    ctx: &mut StageContext,
    municipal: &BTreeMap<String, (WideTable, TotalSource)>,
) -> CensusResult<()> {
    let settings = ctx.settings;
    for region in settings.geography.regions.regions() {
        let members: Vec<&(WideTable, TotalSource)> = region
            .municipalities
            .iter()
            .filter_map(|m| {
                let t = municipal.get(m);
                if t.is_none() {
                    debug!("regional: {}: no table for {}", region.name, m);
                }
                t
            })
            .collect();
        if members.is_empty() {
            warn!("regional: {}: no municipal table, skipping", region.name);
            ctx.skip(
                "regional",
                None,
                &region.name,
                "no municipal table".to_string(),
            );
            continue;
        }
        let policy = if members.iter().all(|(_, s)| *s == TotalSource::Reported) {
            TotalPolicy::Reported
        } else {
            TotalPolicy::Derived
        };
        let tables: Vec<&WideTable> = members.iter().map(|(t, _)| t).collect();
        let total_label = format!("Total {}", region.name);
        let table = match aggregate_across_municipalities(&total_label, &tables, policy) {
            Ok((table, source)) => {
                if source == TotalSource::Derived {
                    ctx.summary.derived_totals.push(region.name.clone());
                }
                table
            }
            Err(e) => {
                error!("regional: {}: {}", region.name, e);
                ctx.skip("regional", None, &region.name, e.to_string());
                continue;
            }
        };
        report_mismatches(ctx, "regional", &region.name, &table);
        info!(
            "regional: {}: {} municipalities, {} rows",
            region.name,
            tables.len(),
            table.rows().len()
        );
        let dir = ctx.layout.regional_dir(&region.name);
        write_unit_tables(ctx, &dir, &region.name, &table)?;
    }
    Ok(())
}

/// National over state, one table per metric.
pub fn national_state_stage(ctx: &mut StageContext, metrics: &BTreeSet<String>) -> CensusResult<()> {
    let stage = "proportional_national_state";
    let national_label = ctx.settings.national_label.clone();
    let state_label = ctx.settings.state_label.clone();
    let unit = format!("{}/{}", national_label, state_label);
    for code in metrics.iter() {
        let upper = Layout::metric_table(&ctx.layout.national_dir(), code, &national_label);
        let lower = Layout::metric_table(&ctx.layout.state_dir(), code, &state_label);
        if let Some(missing) = ctx.first_missing(&[upper.as_path(), lower.as_path()]) {
            let reason = format!("missing input {}", rel_string(missing));
            warn!("{}: {}: {}", stage, code, reason);
            ctx.skip(stage, Some(code.as_str()), &unit, reason);
            continue;
        }
        let ratio = divide_levels(
            &ctx.read_wide(&upper)?,
            &ctx.read_wide(&lower)?,
            ctx.settings.rules.ratio_direction,
        );
        let rel = ctx.layout.national_state_ratio(code);
        ctx.write_ratio(&rel, &ratio)?;
    }
    Ok(())
}

/// State over region, one table per region and metric.
pub fn state_region_stage(ctx: &mut StageContext, metrics: &BTreeSet<String>) -> CensusResult<()> {
    let stage = "proportional_state_regions";
    let settings = ctx.settings;
    for region in settings.geography.regions.regions() {
        for code in metrics.iter() {
            let upper = Layout::metric_table(&ctx.layout.state_dir(), code, &settings.state_label);
            let lower = Layout::metric_table(&ctx.layout.regional_dir(&region.name), code, &region.name);
            if let Some(missing) = ctx.first_missing(&[upper.as_path(), lower.as_path()]) {
                let reason = format!("missing input {}", rel_string(missing));
                warn!("{}: {}: {}: {}", stage, region.name, code, reason);
                ctx.skip(stage, Some(code.as_str()), &region.name, reason);
                continue;
            }
            let ratio = divide_levels(
                &ctx.read_wide(&upper)?,
                &ctx.read_wide(&lower)?,
                settings.rules.ratio_direction,
            );
            let rel = ctx.layout.state_region_ratio(&region.name, code);
            ctx.write_ratio(&rel, &ratio)?;
        }
    }
    Ok(())
}

/// Combines the two previous ratios into the weight of each region.
pub fn region_weight_stage(ctx: &mut StageContext, metrics: &BTreeSet<String>) -> CensusResult<()> {
    let stage = "proportional_region_weight";
    let settings = ctx.settings;
    for region in settings.geography.regions.regions() {
        for code in metrics.iter() {
            let first = ctx.layout.national_state_ratio(code);
            let second = ctx.layout.state_region_ratio(&region.name, code);
            if let Some(missing) = ctx.first_missing(&[first.as_path(), second.as_path()]) {
                let reason = format!("missing input {}", rel_string(missing));
                warn!("{}: {}: {}: {}", stage, region.name, code, reason);
                ctx.skip(stage, Some(code.as_str()), &region.name, reason);
                continue;
            }
            let weight = compose_ratios(
                &ctx.read_ratio(&first)?,
                &ctx.read_ratio(&second)?,
                settings.rules.compose_mode,
            );
            let rel = ctx.layout.region_weight(&region.name, code);
            ctx.write_ratio(&rel, &weight)?;
        }
    }
    Ok(())
}

/// Runs all the stages, in order.
pub fn run_stages(settings: &Settings, out_dir: &Path, records: &[CensusRecord]) -> CensusResult<RunSummary> {
    let mut ctx = StageContext::new(settings, out_dir);

    let metrics: BTreeSet<String> = records
        .iter()
        .filter(|r| settings.rules.metric_selected(&r.metric) && settings.geography.level(r).is_some())
        .map(|r| r.metric.clone())
        .collect();
    info!("run_stages: {} records, metrics: {:?}", records.len(), metrics);

    entity_stage(&mut ctx, records, GeoLevel::National)?;
    entity_stage(&mut ctx, records, GeoLevel::State)?;
    let municipal = municipal_stage(&mut ctx, records)?;
    regional_stage(&mut ctx, &municipal)?;
    national_state_stage(&mut ctx, &metrics)?;
    state_region_stage(&mut ctx, &metrics)?;
    region_weight_stage(&mut ctx, &metrics)?;

    Ok(ctx.summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> PipelineRules {
        PipelineRules {
            ratio_direction: RatioDirection::UpperOverLower,
            compose_mode: ComposeMode::Product,
            sector_prefix: "Sector ".to_string(),
            total_labels: vec!["Total estatal".to_string(), "Total municipal".to_string()],
            metrics: None,
            write_percentages: false,
        }
    }

    #[test]
    fn row_keys() {
        let r = rules();
        assert_eq!(row_key(&r, "Centro", "Total municipal"), RowKey::total("Total Centro"));
        assert_eq!(row_key(&r, "Centro", " total estatal "), RowKey::total("Total Centro"));
        assert_eq!(row_key(&r, "Centro", "Sector 11 Agricultura"), RowKey::sector("Sector 11 Agricultura"));
        assert_eq!(row_key(&r, "Centro", "Subsector 111"), RowKey::other("Subsector 111"));
    }

    fn settings(direction: RatioDirection, mode: ComposeMode) -> Settings {
        let regions = RegionMap::new(vec![Region {
            name: "Centro".to_string(),
            municipalities: vec!["041 Victoria".to_string()],
        }])
        .unwrap();
        Settings {
            geography: Geography {
                national_entity: "00 Total Nacional".to_string(),
                state_entity: "28 Tamaulipas".to_string(),
                regions,
                periods: PeriodSet::new(vec![2018]),
            },
            rules: PipelineRules {
                ratio_direction: direction,
                compose_mode: mode,
                ..rules()
            },
            national_label: "Nacional".to_string(),
            state_label: "Tamaulipas".to_string(),
            activity_header: "Actividad Economica".to_string(),
        }
    }

    fn total_ratio(label: &str, x: f64) -> RatioTable {
        Table::new(
            vec![ColumnKey::new("A111A", 2018)],
            vec![Row {
                key: RowKey::total(label),
                cells: vec![RatioCell::Ratio(x)],
            }],
        )
        .unwrap()
    }

    #[test]
    fn small_shares_keep_their_precision() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(RatioDirection::LowerOverUpper, ComposeMode::Quotient);
        let mut ctx = StageContext::new(&settings, dir.path());
        let first = ctx.layout.national_state_ratio("A111A");
        let second = ctx.layout.state_region_ratio("Centro", "A111A");
        ctx.write_ratio(&first, &total_ratio("Total Nacional", 4e-7)).unwrap();
        ctx.write_ratio(&second, &total_ratio("Total Tamaulipas", 2e-7)).unwrap();

        let metrics: BTreeSet<String> = ["A111A".to_string()].into_iter().collect();
        region_weight_stage(&mut ctx, &metrics).unwrap();
        assert!(ctx.summary.skipped.is_empty());

        let written = fs::read_to_string(dir.path().join(&first)).unwrap();
        assert!(written.lines().any(|l| l == "Total Nacional,0"), "{}", written);
        let weight = fs::read_to_string(dir.path().join(ctx.layout.region_weight("Centro", "A111A"))).unwrap();
        assert!(weight.lines().any(|l| l == "Total Nacional,2"), "{}", weight);
    }

    #[test]
    fn weights_from_files_of_a_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(RatioDirection::UpperOverLower, ComposeMode::Product);
        let layout = Layout::new(&settings);
        let first = layout.national_state_ratio("A111A");
        let second = layout.state_region_ratio("Centro", "A111A");
        {
            let mut previous = StageContext::new(&settings, dir.path());
            previous.write_ratio(&first, &total_ratio("Total Nacional", 10.0)).unwrap();
            previous.write_ratio(&second, &total_ratio("Total Tamaulipas", 2.5)).unwrap();
        }

        let mut ctx = StageContext::new(&settings, dir.path());
        let metrics: BTreeSet<String> = ["A111A".to_string()].into_iter().collect();
        region_weight_stage(&mut ctx, &metrics).unwrap();
        let weight = fs::read_to_string(dir.path().join(layout.region_weight("Centro", "A111A"))).unwrap();
        assert!(weight.lines().any(|l| l == "Total Nacional,25"), "{}", weight);
    }

    #[test]
    fn layout_paths() {
        let layout = Layout {
            national: "Nacional".to_string(),
            state: "Tamaulipas".to_string(),
        };
        assert_eq!(
            rel_string(&layout.municipal_table("041 Victoria")),
            "Tamaulipas_Municipal/041_Victoria.csv"
        );
        assert_eq!(
            rel_string(&Layout::percent_table(&layout.regional_dir("Zona Sur"), "A111A", "Zona Sur")),
            "Tamaulipas_Regional/Zona_Sur/A111A_Zona_Sur_percent.csv"
        );
        assert_eq!(
            rel_string(&layout.region_weight("Zona Sur", "A111A")),
            "proportional_region_weight/Zona_Sur/A111A_Zona_Sur_weight.csv"
        );
    }
}
