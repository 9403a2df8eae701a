//! Diagnostics produced by every stage of the pipeline, and the correction log
//! assembled from them.
//!
//! Diagnostics are never stored globally: each stage receives a
//! `&mut Vec<Diagnostic>` and appends to it.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCategory {
    /// A line could not be classified, or a token could not be parsed.
    ParseError,
    UnknownCandidate,
    /// A party token that looks like an OCR artifact (digits, location words).
    UnknownParty,
    /// A party code was corrected or replaced.
    PartyCode,
    /// A candidate code was corrected.
    CandidateCode,
    /// A vote count above the plausibility ceiling was truncated.
    HighVotes,
    SuspiciousVotes,
    MergedDuplicate,
    DuplicateConstituency,
    IntegrityError,
    Coverage,
}

impl DiagnosticCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::ParseError => "PARSE_ERROR",
            DiagnosticCategory::UnknownCandidate => "UNKNOWN_CANDIDATE",
            DiagnosticCategory::UnknownParty => "UNKNOWN_PARTY",
            DiagnosticCategory::PartyCode => "PARTY_CODE",
            DiagnosticCategory::CandidateCode => "CANDIDATE_CODE",
            DiagnosticCategory::HighVotes => "HIGH_VOTES",
            DiagnosticCategory::SuspiciousVotes => "SUSPICIOUS_VOTES",
            DiagnosticCategory::MergedDuplicate => "MERGED_DUPLICATE",
            DiagnosticCategory::DuplicateConstituency => "DUPLICATE_CONSTITUENCY",
            DiagnosticCategory::IntegrityError => "INTEGRITY_ERROR",
            DiagnosticCategory::Coverage => "COVERAGE",
        }
    }

    /// Blocking categories make a district not production-ready.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            DiagnosticCategory::IntegrityError | DiagnosticCategory::DuplicateConstituency
        )
    }
}

impl Display for DiagnosticCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a diagnostic comes from. Every part is optional.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constituency: Option<String>,
    /// Path of the offending field, for checks on JSON documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Location {
    pub fn line(lineno: usize) -> Location {
        Location {
            lineno: Some(lineno),
            ..Location::default()
        }
    }

    pub fn district(district: &str) -> Location {
        Location {
            district: Some(district.to_string()),
            ..Location::default()
        }
    }

    pub fn constituency(district: &str, constituency: &str) -> Location {
        Location {
            district: Some(district.to_string()),
            constituency: Some(constituency.to_string()),
            ..Location::default()
        }
    }

    pub fn with_line(self, lineno: usize) -> Location {
        Location {
            lineno: Some(lineno),
            ..self
        }
    }

    pub fn with_field(self, field: &str) -> Location {
        Location {
            field: Some(field.to_string()),
            ..self
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(l) = self.lineno {
            parts.push(format!("line {}", l));
        }
        match (&self.district, &self.constituency) {
            (Some(d), Some(c)) => parts.push(format!("{}/{}", d, c)),
            (Some(d), None) => parts.push(d.clone()),
            (None, Some(c)) => parts.push(format!("?/{}", c)),
            (None, None) => {}
        }
        if let Some(field) = &self.field {
            parts.push(field.clone());
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub detail: String,
    pub location: Location,
}

impl Diagnostic {
    pub fn new(category: DiagnosticCategory, detail: impl Into<String>, location: Location) -> Diagnostic {
        Diagnostic {
            category,
            detail: detail.into(),
            location,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.category.is_blocking()
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loc = self.location.to_string();
        if loc.is_empty() {
            write!(f, "{}: {}", self.category, self.detail)
        } else {
            write!(f, "{}: {} ({})", self.category, self.detail, loc)
        }
    }
}

// ******** Correction log *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: DiagnosticCategory,
    pub count: usize,
    pub samples: Vec<String>,
}

/// The human-facing summary of a run: diagnostics grouped by category, in
/// order of first appearance, with the first few samples of each.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionLog {
    pub total: usize,
    pub categories: Vec<CategorySummary>,
}

impl CorrectionLog {
    pub fn from_diagnostics(diagnostics: &[Diagnostic], sample_size: usize) -> CorrectionLog {
        let mut categories: Vec<CategorySummary> = Vec::new();
        for d in diagnostics.iter() {
            let pos = match categories.iter().position(|c| c.category == d.category) {
                Some(pos) => pos,
                None => {
                    categories.push(CategorySummary {
                        category: d.category,
                        count: 0,
                        samples: Vec::new(),
                    });
                    categories.len() - 1
                }
            };
            let summary = &mut categories[pos];
            summary.count += 1;
            if summary.samples.len() < sample_size {
                summary.samples.push(d.to_string());
            }
        }
        CorrectionLog {
            total: diagnostics.len(),
            categories,
        }
    }

    pub fn count(&self, category: DiagnosticCategory) -> usize {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}
