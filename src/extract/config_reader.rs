use crate::extract::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "correctionLogSamples")]
    pub correction_log_samples: Option<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// The district the document covers, when known in advance.
    #[serde(rename = "districtCode")]
    pub district_code: Option<String>,
}

/// Overrides of the default extraction rules. Numbers may be given as JSON
/// numbers or as strings.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesSettings {
    #[serde(rename = "maxEditDistance")]
    pub max_edit_distance: Option<JSValue>,
    #[serde(rename = "maxConstituencyNameDistance")]
    pub max_constituency_name_distance: Option<JSValue>,
    #[serde(rename = "maxDistrictNameDistance")]
    pub max_district_name_distance: Option<JSValue>,
    #[serde(rename = "maxUnitVotes")]
    pub max_unit_votes: Option<JSValue>,
    #[serde(rename = "truncateDigits")]
    pub truncate_digits: Option<JSValue>,
    #[serde(rename = "suspiciousTotal")]
    pub suspicious_total: Option<JSValue>,
    #[serde(rename = "partyDenylist")]
    pub party_denylist: Option<Vec<String>>,
}

impl RulesSettings {
    pub fn extraction_rules(&self) -> ExtractResult<ExtractionRules> {
        let mut rules = ExtractionRules::DEFAULT_RULES;
        if let Some(x) = read_opt_int(&self.max_edit_distance, "rules.maxEditDistance")? {
            rules.max_edit_distance = x as usize;
        }
        if let Some(x) = read_opt_int(
            &self.max_constituency_name_distance,
            "rules.maxConstituencyNameDistance",
        )? {
            rules.max_constituency_name_distance = x as usize;
        }
        if let Some(x) = read_opt_int(
            &self.max_district_name_distance,
            "rules.maxDistrictNameDistance",
        )? {
            rules.max_district_name_distance = x as usize;
        }
        if let Some(x) = read_opt_int(&self.max_unit_votes, "rules.maxUnitVotes")? {
            rules.max_unit_votes = x;
        }
        if let Some(x) = read_opt_int(&self.truncate_digits, "rules.truncateDigits")? {
            if x == 0 {
                whatever!("rules.truncateDigits must be at least 1");
            }
            rules.truncate_digits = x as usize;
        }
        if let Some(x) = read_opt_int(&self.suspicious_total, "rules.suspiciousTotal")? {
            rules.suspicious_total = x;
        }
        if let Some(words) = &self.party_denylist {
            rules.party_denylist = words.clone();
        }
        Ok(rules)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    /// The directory of the reference tables.
    #[serde(rename = "referenceTables")]
    pub reference_tables: String,
    pub year: JSValue,
    pub race: String,
    pub sources: Vec<FileSource>,
    #[serde(default)]
    pub rules: RulesSettings,
}

impl RunConfig {
    pub fn year(&self) -> ExtractResult<ElectionYear> {
        let y = read_js_int(&self.year, "year")?;
        let y = u16::try_from(y).ok().context(ParsingJsonNumberSnafu { field: "year" })?;
        ElectionYear::new(y).context(InvalidSettingSnafu { setting: "year" })
    }

    pub fn race(&self) -> ExtractResult<RaceType> {
        self.race
            .parse::<RaceType>()
            .context(InvalidSettingSnafu { setting: "race" })
    }

    pub fn extraction_rules(&self) -> ExtractResult<ExtractionRules> {
        let mut rules = self.rules.extraction_rules()?;
        if let Some(x) = read_opt_int(
            &self.output_settings.correction_log_samples,
            "outputSettings.correctionLogSamples",
        )? {
            rules.sample_size = x as usize;
        }
        Ok(rules)
    }
}

pub fn read_run_config(path: &str) -> BExtractResult<RunConfig> {
    let config_str = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: RunConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    debug!("read_run_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> BExtractResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn read_js_int(x: &JSValue, field: &str) -> ExtractResult<u64> {
    match x {
        JSValue::Number(n) => n.as_u64().context(ParsingJsonNumberSnafu { field }),
        JSValue::String(s) => s
            .trim()
            .parse::<u64>()
            .ok()
            .context(ParsingJsonNumberSnafu { field }),
        _ => None.context(ParsingJsonNumberSnafu { field }),
    }
}

fn read_opt_int(x: &Option<JSValue>, field: &str) -> ExtractResult<Option<u64>> {
    x.as_ref().map(|v| read_js_int(v, field)).transpose()
}
