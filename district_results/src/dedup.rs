//! Merging of repeated constituencies and repeated (candidate, party) keys.
//!
//! After this stage a district has each constituency code once, and each
//! constituency has each (candidate, party) pair once.

use crate::aggregate::{check_unit_votes, AggregateEntry, ConstituencyAggregate, DistrictAggregate};
use crate::config::*;
use crate::diagnostics::*;
use crate::reference::YearTables;
use crate::resolver::CodeResolver;

use log::debug;

/// Turns the aggregates of a district into its final result.
pub fn deduplicate(
    district: DistrictAggregate,
    race: RaceType,
    diagnostics: &mut Vec<Diagnostic>,
) -> DistrictResult {
    let district_code = district.district_code;

    let mut merged: Vec<ConstituencyAggregate> = Vec::new();
    for c in district.constituencies {
        match merged.iter_mut().find(|m| m.code == c.code) {
            Some(m) => {
                diagnostics.push(Diagnostic::new(
                    DiagnosticCategory::DuplicateConstituency,
                    format!(
                        "constituency {} appears more than once, {} entries appended to the first one",
                        c.code,
                        c.entries.len()
                    ),
                    Location::constituency(&district_code, &c.code),
                ));
                m.entries.extend(c.entries);
            }
            None => merged.push(c),
        }
    }

    let constituencies: Vec<ConstituencyResult> = merged
        .into_iter()
        .map(|c| merge_entries(&district_code, c, diagnostics))
        .collect();

    DistrictResult {
        district_code,
        race,
        null_votes: district.null_votes,
        constituencies,
    }
}

fn merge_entries(
    district_code: &str,
    constituency: ConstituencyAggregate,
    diagnostics: &mut Vec<Diagnostic>,
) -> ConstituencyResult {
    let mut candidates: Vec<CandidateResult> = Vec::new();
    // The entries that went into each candidate result.
    let mut sources: Vec<Vec<AggregateEntry>> = Vec::new();
    for e in constituency.entries {
        let pos = candidates
            .iter()
            .position(|r| r.candidate_code == e.candidate_code && r.party_code == e.party_code);
        match pos {
            Some(pos) => {
                candidates[pos].votes = candidates[pos].votes.saturating_add(e.votes);
                sources[pos].push(e);
            }
            None => {
                candidates.push(CandidateResult {
                    candidate_code: e.candidate_code.clone(),
                    party_code: e.party_code.clone(),
                    votes: e.votes,
                });
                sources.push(vec![e]);
            }
        }
    }

    for (cand, srcs) in candidates.iter().zip(sources.iter()) {
        if srcs.len() < 2 {
            continue;
        }
        let parts: Vec<String> = srcs
            .iter()
            .map(|e| {
                if e.source_token.is_empty() {
                    e.votes.to_string()
                } else {
                    format!("{} {}", e.source_token, e.votes)
                }
            })
            .collect();
        debug!(
            "merge_entries: {}/{}: merging {:?}",
            district_code, constituency.code, parts
        );
        diagnostics.push(Diagnostic::new(
            DiagnosticCategory::MergedDuplicate,
            format!(
                "{}/{} in constituency {}: {} entries merged into {} votes ({})",
                cand.candidate_code,
                cand.party_code,
                constituency.code,
                srcs.len(),
                cand.votes,
                parts.join(", ")
            ),
            Location::constituency(district_code, &constituency.code),
        ));
    }

    ConstituencyResult {
        code: constituency.code,
        is_legacy: constituency.is_legacy,
        candidates,
    }
}

/// Applies the extraction rules to a district document that was already
/// written. Constituencies of other districts are dropped, unknown codes are
/// resolved again and implausible counts truncated, then the duplicates are
/// merged.
///
/// Fixing a fixed document changes nothing.
pub fn fix_district(
    result: &DistrictResult,
    tables: &YearTables,
    rules: &ExtractionRules,
    diagnostics: &mut Vec<Diagnostic>,
) -> DistrictResult {
    let dc = result.district_code.as_str();
    let known_district = tables.district(dc).is_some();
    let resolver = CodeResolver::new(tables, result.race, rules);

    let mut constituencies: Vec<ConstituencyAggregate> = Vec::new();
    for c in result.constituencies.iter() {
        let location = Location::constituency(dc, &c.code);
        if known_district && tables.constituency(dc, &c.code).is_none() {
            debug!("fix_district: dropping constituency {} from {}", c.code, dc);
            diagnostics.push(Diagnostic::new(
                DiagnosticCategory::IntegrityError,
                format!(
                    "constituency {} is not part of district {}, {} entries dropped",
                    c.code,
                    dc,
                    c.candidates.len()
                ),
                location,
            ));
            continue;
        }
        let mut entries: Vec<AggregateEntry> = Vec::new();
        for r in c.candidates.iter() {
            let (candidate_code, party_code) =
                resolver.fix_codes(&r.candidate_code, &r.party_code, &c.code, &location, diagnostics);
            let votes = check_unit_votes(r.votes, rules, &location, &candidate_code, diagnostics);
            entries.push(AggregateEntry {
                candidate_code,
                party_code,
                source_token: String::new(),
                votes,
            });
        }
        constituencies.push(ConstituencyAggregate {
            code: c.code.clone(),
            is_legacy: c.is_legacy,
            entries,
        });
    }

    let aggregate = DistrictAggregate {
        district_code: result.district_code.clone(),
        null_votes: result.null_votes,
        constituencies,
    };
    deduplicate(aggregate, result.race, diagnostics)
}
