//! Checks on finalized district documents.
//!
//! Validation never fails and never changes the document: it only reports.
//! The same document and tables always produce the same report.

use crate::config::*;
use crate::diagnostics::*;
use crate::reference::YearTables;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors are blocking for publication, warnings are for the reviewer.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> ValidationReport {
        let (errors, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) =
            diagnostics.into_iter().partition(|d| d.is_blocking());
        ValidationReport { errors, warnings }
    }

    pub fn is_production_ready(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors first, then warnings.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }
}

fn integrity(detail: String, location: Location) -> Diagnostic {
    Diagnostic::new(DiagnosticCategory::IntegrityError, detail, location)
}

/// Runs every check on a district document and returns the findings in a
/// fixed order.
pub fn check_district(
    result: &DistrictResult,
    tables: &YearTables,
    rules: &ExtractionRules,
) -> Vec<Diagnostic> {
    let dc = result.district_code.as_str();
    let mut diags: Vec<Diagnostic> = Vec::new();

    let district = tables.district(dc);
    if district.is_none() {
        diags.push(integrity(
            format!("district {} does not exist in {}", dc, tables.year()),
            Location::district(dc),
        ));
    }

    if result.constituencies.is_empty() {
        diags.push(Diagnostic::new(
            DiagnosticCategory::Coverage,
            format!("district {}: no source data", dc),
            Location::district(dc),
        ));
    }

    let mut seen: Vec<&str> = Vec::new();
    let mut reported: Vec<&str> = Vec::new();
    for c in result.constituencies.iter() {
        let code = c.code.as_str();
        if seen.contains(&code) {
            if !reported.contains(&code) {
                diags.push(Diagnostic::new(
                    DiagnosticCategory::DuplicateConstituency,
                    format!("constituency {} appears more than once", code),
                    Location::constituency(dc, code),
                ));
                reported.push(code);
            }
            continue;
        }
        seen.push(code);
    }

    for c in result.constituencies.iter() {
        check_constituency(result, c, tables, rules, &mut diags);
    }

    if let Some(d) = district {
        if !result.constituencies.is_empty() {
            for expected in d.constituencies.iter().filter(|c| !c.is_legacy) {
                if !seen.contains(&expected.code.as_str()) {
                    diags.push(Diagnostic::new(
                        DiagnosticCategory::Coverage,
                        format!(
                            "constituency {} ({}) has no results",
                            expected.code, expected.name
                        ),
                        Location::constituency(dc, &expected.code),
                    ));
                }
            }
        }
    }

    debug!(
        "check_district: {}: {} findings",
        result.district_code,
        diags.len()
    );
    diags
}

fn check_constituency(
    result: &DistrictResult,
    c: &ConstituencyResult,
    tables: &YearTables,
    rules: &ExtractionRules,
    diags: &mut Vec<Diagnostic>,
) {
    let dc = result.district_code.as_str();
    let location = Location::constituency(dc, &c.code);

    if tables.district(dc).is_some() && tables.constituency(dc, &c.code).is_none() {
        diags.push(integrity(
            format!(
                "constituency {} does not exist in district {} for {}",
                c.code,
                dc,
                tables.year()
            ),
            location.clone(),
        ));
    }

    if c.candidates.is_empty() {
        diags.push(Diagnostic::new(
            DiagnosticCategory::Coverage,
            format!("constituency {} has no candidates", c.code),
            location.clone(),
        ));
    }

    let mut keys: Vec<(&str, &str)> = Vec::new();
    for cand in c.candidates.iter() {
        let key = (cand.candidate_code.as_str(), cand.party_code.as_str());
        if keys.contains(&key) {
            diags.push(integrity(
                format!(
                    "{}/{} appears more than once in constituency {}",
                    key.0, key.1, c.code
                ),
                location.clone(),
            ));
        } else {
            keys.push(key);
        }

        if !tables.is_valid_party(&cand.party_code) {
            diags.push(integrity(
                format!(
                    "party {} of {} is not valid for {}",
                    cand.party_code,
                    cand.candidate_code,
                    tables.year()
                ),
                location.clone(),
            ));
        }

        match tables.candidate(result.race, &cand.candidate_code) {
            None => diags.push(Diagnostic::new(
                DiagnosticCategory::UnknownCandidate,
                format!(
                    "candidate {} is not a {} candidate for {}",
                    cand.candidate_code,
                    result.race,
                    tables.year()
                ),
                location.clone(),
            )),
            Some(entry) => {
                if let Some(registered) = entry.party.as_deref() {
                    if registered != cand.party_code {
                        diags.push(Diagnostic::new(
                            DiagnosticCategory::PartyCode,
                            format!(
                                "{} reported under {}, registered with {}",
                                cand.candidate_code, cand.party_code, registered
                            ),
                            location.clone(),
                        ));
                    }
                }
            }
        }

        if cand.votes > rules.suspicious_total {
            diags.push(Diagnostic::new(
                DiagnosticCategory::SuspiciousVotes,
                format!(
                    "{}/{} has {} votes, above {}",
                    cand.candidate_code, cand.party_code, cand.votes, rules.suspicious_total
                ),
                location.clone(),
            ));
        }
    }
}

pub fn validate(
    result: &DistrictResult,
    tables: &YearTables,
    rules: &ExtractionRules,
) -> ValidationReport {
    ValidationReport::from_diagnostics(check_district(result, tables, rules))
}

// ******** Checks on raw JSON documents *********

struct ShapeChecker<'a> {
    location: Location,
    diags: &'a mut Vec<Diagnostic>,
}

impl<'a> ShapeChecker<'a> {
    fn fail(&mut self, path: &str, detail: &str) {
        self.diags.push(integrity(
            format!("{}: {}", path, detail),
            self.location.clone().with_field(path),
        ));
    }

    fn field<'v>(&mut self, obj: &'v Value, path: &str, name: &str) -> Option<&'v Value> {
        let v = obj.get(name);
        if v.is_none() {
            self.fail(&format!("{}{}", path, name), "missing field");
        }
        v
    }

    fn string(&mut self, obj: &Value, path: &str, name: &str) {
        if let Some(v) = self.field(obj, path, name) {
            if !v.is_string() {
                self.fail(&format!("{}{}", path, name), "expected a string");
            }
        }
    }

    fn count(&mut self, obj: &Value, path: &str, name: &str) {
        if let Some(v) = self.field(obj, path, name) {
            if v.as_u64().is_none() {
                self.fail(
                    &format!("{}{}", path, name),
                    "expected a non-negative integer",
                );
            }
        }
    }

    fn array<'v>(&mut self, obj: &'v Value, path: &str, name: &str) -> Option<&'v Vec<Value>> {
        let v = self.field(obj, path, name)?;
        let arr = v.as_array();
        if arr.is_none() {
            self.fail(&format!("{}{}", path, name), "expected an array");
        }
        arr
    }
}

fn check_shape(value: &Value, diags: &mut Vec<Diagnostic>) {
    let location = match value.get("districtCode").and_then(|v| v.as_str()) {
        Some(dc) => Location::district(dc),
        None => Location::default(),
    };
    let mut checker = ShapeChecker { location, diags };

    if !value.is_object() {
        checker.fail("$", "expected an object");
        return;
    }
    checker.string(value, "", "districtCode");
    if let Some(t) = checker.field(value, "", "type") {
        match t.as_str() {
            Some("presidential") | Some("parliamentary") => {}
            _ => checker.fail("type", "expected \"presidential\" or \"parliamentary\""),
        }
    }
    checker.count(value, "", "nullVotes");

    let constituencies = match checker.array(value, "", "constituencies") {
        Some(arr) => arr,
        None => return,
    };
    for (i, c) in constituencies.iter().enumerate() {
        let path = format!("constituencies[{}].", i);
        if !c.is_object() {
            checker.fail(&format!("constituencies[{}]", i), "expected an object");
            continue;
        }
        checker.string(c, &path, "code");
        if let Some(v) = checker.field(c, &path, "isLegacy") {
            if !v.is_boolean() {
                checker.fail(&format!("{}isLegacy", path), "expected a boolean");
            }
        }
        let candidates = match checker.array(c, &path, "candidates") {
            Some(arr) => arr,
            None => continue,
        };
        for (j, cand) in candidates.iter().enumerate() {
            let cpath = format!("{}candidates[{}].", path, j);
            if !cand.is_object() {
                checker.fail(&format!("{}candidates[{}]", path, j), "expected an object");
                continue;
            }
            checker.string(cand, &cpath, "candidateCode");
            checker.string(cand, &cpath, "partyCode");
            checker.count(cand, &cpath, "votes");
        }
    }
}

/// Validates a district document that has not been parsed yet.
///
/// The document is returned in typed form when its shape is correct. The
/// content checks of [`validate`] only run in that case.
pub fn validate_json(
    value: &Value,
    tables: &YearTables,
    rules: &ExtractionRules,
) -> (Option<DistrictResult>, ValidationReport) {
    let mut diags: Vec<Diagnostic> = Vec::new();
    check_shape(value, &mut diags);
    if !diags.is_empty() {
        debug!("validate_json: {} shape errors", diags.len());
        return (None, ValidationReport::from_diagnostics(diags));
    }
    match serde_json::from_value::<DistrictResult>(value.clone()) {
        Ok(result) => {
            let report = validate(&result, tables, rules);
            (Some(result), report)
        }
        Err(e) => {
            diags.push(integrity(format!("{}", e), Location::default()));
            (None, ValidationReport::from_diagnostics(diags))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::fixtures::tables_2019;
    use serde_json::json;

    fn cand(code: &str, party: &str, votes: u64) -> CandidateResult {
        CandidateResult {
            candidate_code: code.to_string(),
            party_code: party.to_string(),
            votes,
        }
    }

    fn cst(code: &str, candidates: Vec<CandidateResult>) -> ConstituencyResult {
        ConstituencyResult {
            code: code.to_string(),
            is_legacy: code == "005",
            candidates,
        }
    }

    fn chitipa() -> DistrictResult {
        DistrictResult {
            district_code: "CT".to_string(),
            race: RaceType::Parliamentary,
            null_votes: 12,
            constituencies: vec![
                cst("001", vec![cand("CHIMPO", "DPP", 300), cand("MWAKAS", "UTM", 107)]),
                cst("003", vec![cand("BANDAX", "DPP", 50), cand("KAUNDA", "IND", 20)]),
            ],
        }
    }

    fn categories(report: &ValidationReport) -> Vec<DiagnosticCategory> {
        report.diagnostics().map(|d| d.category).collect()
    }

    #[test]
    fn clean_district() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let report = validate(&chitipa(), &tables, &rules);
        assert!(report.is_production_ready());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn empty_district_is_only_a_warning() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let report = validate(
            &DistrictResult::empty("KA", RaceType::Parliamentary),
            &tables,
            &rules,
        );
        assert!(report.is_production_ready());
        assert_eq!(categories(&report), vec![DiagnosticCategory::Coverage]);
        assert!(report.warnings[0].detail.contains("no source data"));
    }

    #[test]
    fn integrity_errors() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let mut doc = chitipa();
        doc.constituencies[0].candidates.push(cand("NYIREN", "XYZ", 5));
        doc.constituencies[0].candidates.push(cand("CHIMPO", "DPP", 1));
        doc.constituencies.push(cst("150", vec![cand("PHIRIX", "UDF", 9)]));
        let report = validate(&doc, &tables, &rules);
        assert!(!report.is_production_ready());
        let details: Vec<&str> = report.errors.iter().map(|d| d.detail.as_str()).collect();
        assert_eq!(report.errors.len(), 3, "{:?}", details);
        assert!(details[0].contains("XYZ"));
        assert!(details[1].contains("CHIMPO/DPP"));
        assert!(details[2].contains("150"));
        // NYIREN is registered with MCP.
        assert!(report
            .warnings
            .iter()
            .any(|d| d.category == DiagnosticCategory::PartyCode));
    }

    #[test]
    fn duplicate_constituencies_block() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let mut doc = chitipa();
        doc.constituencies.push(cst("001", vec![cand("CHIMPO", "DPP", 1)]));
        let report = validate(&doc, &tables, &rules);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(
            report.errors[0].category,
            DiagnosticCategory::DuplicateConstituency
        );
    }

    #[test]
    fn warnings() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let doc = DistrictResult {
            district_code: "KA".to_string(),
            race: RaceType::Parliamentary,
            null_votes: 0,
            constituencies: vec![cst(
                "009",
                vec![cand("MKANDA", "MCP", 60_000), cand("MLALE", "IND", 3)],
            )],
        };
        let report = validate(&doc, &tables, &rules);
        assert!(report.is_production_ready());
        assert_eq!(
            categories(&report),
            vec![
                DiagnosticCategory::SuspiciousVotes,
                DiagnosticCategory::UnknownCandidate,
                DiagnosticCategory::Coverage
            ]
        );
        // 010 is missing from the district.
        assert_eq!(report.warnings[2].location.constituency.as_deref(), Some("010"));
    }

    #[test]
    fn legacy_constituencies_are_not_required() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let report = validate(&chitipa(), &tables, &rules);
        assert!(!report
            .diagnostics()
            .any(|d| d.location.constituency.as_deref() == Some("005")));
    }

    #[test]
    fn unknown_district() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let mut doc = chitipa();
        doc.district_code = "ZZ".to_string();
        let report = validate(&doc, &tables, &rules);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].location.district.as_deref(), Some("ZZ"));
    }

    #[test]
    fn validation_is_idempotent() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let mut doc = chitipa();
        doc.constituencies.push(cst("001", vec![]));
        doc.constituencies[1].candidates.push(cand("BANDAX", "DPP", 70_000));
        let a = validate(&doc, &tables, &rules);
        let b = validate(&doc, &tables, &rules);
        assert_eq!(a, b);
    }

    #[test]
    fn json_shape() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let v = json!({
            "districtCode": "CT",
            "type": "local",
            "nullVotes": -3,
            "constituencies": [
                {"code": "001", "isLegacy": false, "candidates": [
                    {"candidateCode": "CHIMPO", "partyCode": "DPP", "votes": 1.5}
                ]},
                {"code": "003", "candidates": []}
            ]
        });
        let (doc, report) = validate_json(&v, &tables, &rules);
        assert!(doc.is_none());
        let fields: Vec<&str> = report
            .errors
            .iter()
            .filter_map(|d| d.location.field.as_deref())
            .collect();
        assert_eq!(
            fields,
            vec![
                "type",
                "nullVotes",
                "constituencies[0].candidates[0].votes",
                "constituencies[1].isLegacy"
            ]
        );
    }

    #[test]
    fn json_roundtrip_is_validated() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let v = serde_json::to_value(&chitipa()).unwrap();
        let (doc, report) = validate_json(&v, &tables, &rules);
        assert_eq!(doc, Some(chitipa()));
        assert_eq!(report, validate(&chitipa(), &tables, &rules));
    }
}
