/*!
Reconstruction, reconciliation and validation of per-district election results
from the text dumps of scanned result documents.

The text extraction of official result sheets loses most of the structure of
the original document: headers are split across lines or glued to the
previous line, candidate and party names come out misspelt, vote counts get
concatenated. This crate turns such a dump into one clean, validated results
document per district, together with the list of every correction it made.

The pipeline runs in five stages over one document:

1. [`context`]: a state machine that attaches the administrative context
   (district, constituency, ward, centre, station) to every vote line.
2. [`resolver`]: maps the printed candidate and party names to the canonical
   codes of the reference tables.
3. [`aggregate`]: sums the lines per constituency, truncating implausible
   counts.
4. [`dedup`]: merges repeated constituencies and repeated candidate entries.
5. [`validate`]: checks the final documents against the reference tables.

Nothing is stored globally: every stage appends its findings to a
`Vec<Diagnostic>` that is returned with the extraction.

```ignore
let tables: ReferenceTables = ...;
let lines = RawLine::from_text(&contents);
let year = ElectionYear::new(2019)?;
let extraction = extract_document(
    &lines,
    &tables,
    year,
    RaceType::Parliamentary,
    Some("CT"),
    &ExtractionRules::DEFAULT_RULES,
)?;
for outcome in extraction.districts.iter() {
    println!("{}", serde_json::to_string_pretty(&outcome.result)?);
}
```

See the [`manual`] module for the expected formats of the input text and of
the reference tables.
*/

mod config;
pub mod aggregate;
pub mod context;
pub mod dedup;
pub mod diagnostics;
pub mod manual;
pub mod reference;
pub mod resolver;
mod text;
pub mod validate;

use log::{debug, info};

pub use crate::config::*;
pub use crate::diagnostics::{CorrectionLog, Diagnostic, DiagnosticCategory, Location};
pub use crate::reference::{ElectionYear, ReferenceTables, YearTables};
pub use crate::validate::ValidationReport;

use crate::aggregate::DistrictAggregate;
use crate::context::{ReconstructorState, Record};

/// The final document of a district and its validation report.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DistrictOutcome {
    pub result: DistrictResult,
    pub report: ValidationReport,
}

/// Everything produced from one source document.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Extraction {
    pub year: ElectionYear,
    pub race: RaceType,
    /// In order of first appearance in the document.
    pub districts: Vec<DistrictOutcome>,
    /// What was found and corrected while reading the document, in the order
    /// it was raised. The checks of the final documents are in the reports.
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    pub fn correction_log(&self, sample_size: usize) -> CorrectionLog {
        CorrectionLog::from_diagnostics(&self.diagnostics, sample_size)
    }

    pub fn is_production_ready(&self) -> bool {
        self.districts.iter().all(|d| d.report.is_production_ready())
    }
}

/// The report of a district: what the pipeline found on the way to the
/// district document, then the checks on the document itself.
///
/// The checks are not added to the diagnostics of the extraction, which only
/// lists the corrections made to the source.
fn district_report(
    result: &DistrictResult,
    diagnostics: &[Diagnostic],
    tables: &YearTables,
    rules: &ExtractionRules,
) -> ValidationReport {
    let mut found: Vec<Diagnostic> = diagnostics
        .iter()
        .filter(|d| d.location.district.as_deref() == Some(result.district_code.as_str()))
        .cloned()
        .collect();
    found.extend(validate::check_district(result, tables, rules));
    ValidationReport::from_diagnostics(found)
}

/// Runs the whole pipeline on one document.
///
/// `district_hint` is the district the document is known to cover, if any.
/// That district is always part of the output, even when no data was found
/// for it.
///
/// Only problems that prevent reading the document at all are errors: no
/// tables for the year, an empty document or an unknown hint. Everything
/// else is reported in the diagnostics.
pub fn extract_document(
    lines: &[RawLine],
    tables: &ReferenceTables,
    year: ElectionYear,
    race: RaceType,
    district_hint: Option<&str>,
    rules: &ExtractionRules,
) -> Result<Extraction, ExtractionError> {
    let year_tables = tables.for_year(year)?;
    if lines.iter().all(|l| l.text.trim().is_empty()) {
        return Err(ExtractionError::EmptyDocument);
    }
    let initial = match district_hint {
        Some(code) => match year_tables.district(code) {
            Some(d) => ReconstructorState::for_district(d),
            None => return Err(ExtractionError::UnknownDistrict(code.to_string())),
        },
        None => ReconstructorState::initial(),
    };

    info!(
        "extract_document: {} lines, year {}, race {}, district {:?}",
        lines.len(),
        year,
        race,
        district_hint
    );

    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let records = context::reconstruct(year_tables, rules, lines, initial, &mut diagnostics);

    let mut vote_lines = Vec::new();
    let mut null_lines = Vec::new();
    for r in records {
        match r {
            Record::Vote(v) => vote_lines.push(v),
            Record::NullVotes(n) => null_lines.push(n),
        }
    }
    debug!(
        "extract_document: {} vote lines, {} null vote lines",
        vote_lines.len(),
        null_lines.len()
    );

    let resolved = resolver::resolve_all(year_tables, race, rules, &vote_lines, &mut diagnostics);
    let mut aggregates =
        aggregate::aggregate(&resolved, &null_lines, year_tables, rules, &mut diagnostics);

    if let Some(code) = district_hint {
        if !aggregates.iter().any(|a| a.district_code == code) {
            info!("extract_document: no data found for district {}", code);
            aggregates.insert(0, DistrictAggregate::empty(code));
        }
    }

    let results: Vec<DistrictResult> = aggregates
        .into_iter()
        .map(|agg| dedup::deduplicate(agg, race, &mut diagnostics))
        .collect();

    let mut districts: Vec<DistrictOutcome> = Vec::new();
    for result in results {
        let report = district_report(&result, &diagnostics, year_tables, rules);
        info!(
            "extract_document: district {}: {} constituencies, {} votes, {} null votes, {} errors, {} warnings",
            result.district_code,
            result.constituencies.len(),
            result.total_votes(),
            result.null_votes,
            report.errors.len(),
            report.warnings.len()
        );
        districts.push(DistrictOutcome { result, report });
    }

    Ok(Extraction {
        year,
        race,
        districts,
        diagnostics,
    })
}
