use crate::census::*;

use serde::{Deserialize, Serialize};

pub const DEFAULT_YEAR_COLUMN: &str = "Año Censal";
pub const DEFAULT_ENTITY_COLUMN: &str = "Entidad";
pub const DEFAULT_MUNICIPALITY_COLUMN: &str = "Municipio";
pub const DEFAULT_ACTIVITY_COLUMN: &str = "Actividad económica";
pub const DEFAULT_OUTPUT_ACTIVITY_COLUMN: &str = "Actividad Economica";

pub const DEFAULT_NATIONAL_ENTITY: &str = "00 Total Nacional";
pub const DEFAULT_NATIONAL_LABEL: &str = "Nacional";
pub const DEFAULT_STATE_ENTITY: &str = "28 Tamaulipas";
pub const DEFAULT_STATE_LABEL: &str = "Tamaulipas";

pub const DEFAULT_SECTOR_PREFIX: &str = "Sector ";
pub const DEFAULT_TOTAL_LABELS: [&str; 3] = ["Total nacional", "Total estatal", "Total municipal"];

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    /// Header of the first column of the written tables.
    #[serde(rename = "activityColumn")]
    pub activity_column: Option<String>,
    #[serde(rename = "writePercentages")]
    pub write_percentages: Option<bool>,
    #[serde(rename = "clearOutput")]
    pub clear_output: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct InputSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "yearColumn")]
    pub year_column: Option<String>,
    #[serde(rename = "entityColumn")]
    pub entity_column: Option<String>,
    #[serde(rename = "municipalityColumn")]
    pub municipality_column: Option<String>,
    #[serde(rename = "activityColumn")]
    pub activity_column: Option<String>,
}

impl InputSource {
    pub fn columns(&self) -> InputColumns {
        InputColumns {
            year: self
                .year_column
                .clone()
                .unwrap_or_else(|| DEFAULT_YEAR_COLUMN.to_string()),
            entity: self
                .entity_column
                .clone()
                .unwrap_or_else(|| DEFAULT_ENTITY_COLUMN.to_string()),
            municipality: self
                .municipality_column
                .clone()
                .unwrap_or_else(|| DEFAULT_MUNICIPALITY_COLUMN.to_string()),
            activity: self
                .activity_column
                .clone()
                .unwrap_or_else(|| DEFAULT_ACTIVITY_COLUMN.to_string()),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub municipalities: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeographyConfig {
    #[serde(rename = "nationalEntity")]
    pub national_entity: Option<String>,
    #[serde(rename = "nationalLabel")]
    pub national_label: Option<String>,
    #[serde(rename = "stateEntity")]
    pub state_entity: Option<String>,
    #[serde(rename = "stateLabel")]
    pub state_label: Option<String>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodsConfig {
    /// All the years found in the input when not provided.
    pub years: Option<Vec<i32>>,
    #[serde(rename = "minimumYear")]
    pub minimum_year: Option<i32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(rename = "ratioDirection")]
    pub ratio_direction: Option<String>,
    #[serde(rename = "composeMode")]
    pub compose_mode: Option<String>,
    #[serde(rename = "sectorPrefix")]
    pub sector_prefix: Option<String>,
    #[serde(rename = "totalLabels")]
    pub total_labels: Option<Vec<String>>,
    /// Restricts the run to these metric codes.
    pub metrics: Option<Vec<String>>,
}

impl RulesConfig {
    pub fn ratio_direction(&self) -> CensusResult<RatioDirection> {
        match self.ratio_direction.as_deref() {
            None | Some("upperOverLower") => Ok(RatioDirection::UpperOverLower),
            Some("lowerOverUpper") => Ok(RatioDirection::LowerOverUpper),
            Some(x) => whatever!("unknown ratio direction: {}", x),
        }
    }

    pub fn compose_mode(&self) -> CensusResult<ComposeMode> {
        match self.compose_mode.as_deref() {
            None | Some("product") => Ok(ComposeMode::Product),
            Some("quotient") => Ok(ComposeMode::Quotient),
            Some(x) => whatever!("unknown compose mode: {}", x),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CensusConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    #[serde(rename = "inputSource")]
    pub input_source: InputSource,
    #[serde(default)]
    pub geography: GeographyConfig,
    #[serde(default)]
    pub periods: PeriodsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

pub fn read_config(path: &str) -> CensusResult<CensusConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: CensusConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}
