// ********* Input data structures ***********

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

/// One physical line of the source text, as extracted from the original document.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawLine {
    /// 1-based position of the line in the source document.
    pub lineno: usize,
    pub text: String,
}

impl RawLine {
    /// Splits a whole document into numbered lines.
    pub fn from_text(contents: &str) -> Vec<RawLine> {
        contents
            .lines()
            .enumerate()
            .map(|(idx, text)| RawLine {
                lineno: idx + 1,
                text: text.to_string(),
            })
            .collect()
    }
}

/// The race a source document reports on.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceType {
    Presidential,
    Parliamentary,
}

impl RaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaceType::Presidential => "presidential",
            RaceType::Parliamentary => "parliamentary",
        }
    }
}

impl FromStr for RaceType {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<RaceType, ExtractionError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "presidential" => Ok(RaceType::Presidential),
            "parliamentary" => Ok(RaceType::Parliamentary),
            _ => Err(ExtractionError::UnknownRace(s.to_string())),
        }
    }
}

impl Display for RaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    #[serde(rename = "candidateCode")]
    pub candidate_code: String,
    #[serde(rename = "partyCode")]
    pub party_code: String,
    pub votes: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ConstituencyResult {
    pub code: String,
    #[serde(rename = "isLegacy")]
    pub is_legacy: bool,
    pub candidates: Vec<CandidateResult>,
}

/// The terminal output: one document per district and per race.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DistrictResult {
    #[serde(rename = "districtCode")]
    pub district_code: String,
    #[serde(rename = "type")]
    pub race: RaceType,
    #[serde(rename = "nullVotes")]
    pub null_votes: u64,
    pub constituencies: Vec<ConstituencyResult>,
}

impl DistrictResult {
    /// A district for which no source data was found.
    pub fn empty(district_code: &str, race: RaceType) -> DistrictResult {
        DistrictResult {
            district_code: district_code.to_string(),
            race,
            null_votes: 0,
            constituencies: Vec::new(),
        }
    }

    pub fn total_votes(&self) -> u64 {
        self.constituencies
            .iter()
            .flat_map(|c| c.candidates.iter())
            .map(|c| c.votes)
            .sum()
    }
}

/// Errors that prevent a document from being processed at all.
///
/// Everything that goes wrong at the level of a single line or token is
/// recovered and reported as a diagnostic instead.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ExtractionError {
    /// The year is not one of the supported election years.
    UnsupportedYear(u16),
    /// No reference tables were loaded for this year.
    MissingTables(u16),
    /// The reference tables are inconsistent.
    InvalidTables(String),
    /// The source document has no content.
    EmptyDocument,
    /// The district the document was declared for is not in the reference tables.
    UnknownDistrict(String),
    UnknownRace(String),
}

impl Error for ExtractionError {}

impl Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionError::UnsupportedYear(y) => write!(f, "unsupported election year {}", y),
            ExtractionError::MissingTables(y) => {
                write!(f, "no reference tables loaded for year {}", y)
            }
            ExtractionError::InvalidTables(msg) => write!(f, "invalid reference tables: {}", msg),
            ExtractionError::EmptyDocument => write!(f, "the source document is empty"),
            ExtractionError::UnknownDistrict(code) => {
                write!(f, "district {} is not in the reference tables", code)
            }
            ExtractionError::UnknownRace(s) => write!(f, "unknown race type {:?}", s),
        }
    }
}

// ********* Configuration **********

/// Tunable thresholds of the pipeline.
///
/// None of these values comes from a stated rule in the source material: they
/// were tuned per document, hence exposed here.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ExtractionRules {
    /// Maximum edit distance accepted when matching a candidate code against
    /// the candidates of the same constituency.
    pub max_edit_distance: usize,
    /// Maximum edit distance between a printed constituency name and the
    /// name in the tables.
    pub max_constituency_name_distance: usize,
    /// The same for district names. Only names of 5 letters or more are
    /// matched approximately.
    pub max_district_name_distance: usize,
    /// Plausibility ceiling for the vote count of a single source line.
    pub max_unit_votes: u64,
    /// Number of leading digits kept when an implausible count is truncated.
    pub truncate_digits: usize,
    /// Aggregated totals above this value are reported for review.
    pub suspicious_total: u64,
    /// Extra words that mark a party token as a location or institution.
    pub party_denylist: Vec<String>,
    /// Number of sample entries per category in the correction log.
    pub sample_size: usize,
}

impl ExtractionRules {
    pub const DEFAULT_RULES: ExtractionRules = ExtractionRules {
        max_edit_distance: 2,
        max_constituency_name_distance: 2,
        max_district_name_distance: 1,
        max_unit_votes: 100_000,
        truncate_digits: 3,
        suspicious_total: 50_000,
        party_denylist: Vec::new(),
        sample_size: 10,
    };
}

impl Default for ExtractionRules {
    fn default() -> ExtractionRules {
        ExtractionRules::DEFAULT_RULES
    }
}
