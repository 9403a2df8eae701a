//! Aggregation of resolved vote lines (usually one per polling station) into
//! per-constituency totals.

use crate::config::*;
use crate::context::NullVoteLine;
use crate::diagnostics::*;
use crate::reference::YearTables;
use crate::resolver::ResolvedVoteLine;

use log::debug;

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AggregateEntry {
    pub candidate_code: String,
    pub party_code: String,
    pub source_token: String,
    pub votes: u64,
}

/// The entries of one contiguous run of lines of the same constituency.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ConstituencyAggregate {
    pub code: String,
    pub is_legacy: bool,
    pub entries: Vec<AggregateEntry>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DistrictAggregate {
    pub district_code: String,
    pub null_votes: u64,
    pub constituencies: Vec<ConstituencyAggregate>,
}

impl DistrictAggregate {
    pub fn empty(district_code: &str) -> DistrictAggregate {
        DistrictAggregate {
            district_code: district_code.to_string(),
            null_votes: 0,
            constituencies: Vec::new(),
        }
    }
}

/// Keeps the leading `digits` digits of a count.
pub fn truncate_votes(votes: u64, digits: usize) -> u64 {
    let s = votes.to_string();
    s.chars()
        .take(digits.max(1))
        .collect::<String>()
        .parse::<u64>()
        .unwrap_or(votes)
}

/// Checks the count of a single reporting unit against the plausibility
/// ceiling. Counts above it are most likely several numbers glued together
/// by the text extraction and are truncated.
pub fn check_unit_votes(
    votes: u64,
    rules: &ExtractionRules,
    location: &Location,
    what: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> u64 {
    if votes <= rules.max_unit_votes {
        return votes;
    }
    let fixed = truncate_votes(votes, rules.truncate_digits);
    debug!("check_unit_votes: {}: {} -> {}", location, votes, fixed);
    diagnostics.push(Diagnostic::new(
        DiagnosticCategory::HighVotes,
        format!(
            "{}: {} votes above {}, truncated to {}",
            what, votes, rules.max_unit_votes, fixed
        ),
        location.clone(),
    ));
    fixed
}

fn district_index(districts: &mut Vec<DistrictAggregate>, code: &str) -> usize {
    match districts.iter().position(|d| d.district_code == code) {
        Some(idx) => idx,
        None => {
            districts.push(DistrictAggregate::empty(code));
            districts.len() - 1
        }
    }
}

/// Sums the lines per district and constituency, and the null votes per district.
///
/// Lines with the same (candidate, party, source token) key are summed. A new
/// constituency aggregate starts whenever the constituency changes from one
/// line to the next, so a constituency that shows up again later gets a
/// second aggregate. Districts, constituencies and entries keep the order in
/// which they were first seen.
pub fn aggregate(
    lines: &[ResolvedVoteLine],
    nulls: &[NullVoteLine],
    tables: &YearTables,
    rules: &ExtractionRules,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<DistrictAggregate> {
    let mut districts: Vec<DistrictAggregate> = Vec::new();
    // (district index, constituency index) of the aggregate being filled
    let mut current: Option<(usize, usize)> = None;

    for l in lines.iter() {
        let location =
            Location::constituency(&l.district_code, &l.constituency_code).with_line(l.lineno);
        let votes = check_unit_votes(l.votes, rules, &location, &l.candidate_code, diagnostics);

        let didx = district_index(&mut districts, &l.district_code);
        let cidx = match current {
            Some((d, c))
                if d == didx && districts[d].constituencies[c].code == l.constituency_code =>
            {
                c
            }
            _ => {
                let is_legacy = tables
                    .constituency(&l.district_code, &l.constituency_code)
                    .map(|c| c.is_legacy)
                    .unwrap_or(false);
                let district = &mut districts[didx];
                if district
                    .constituencies
                    .iter()
                    .any(|c| c.code == l.constituency_code)
                {
                    debug!(
                        "aggregate: line {}: constituency {} starts again",
                        l.lineno, l.constituency_code
                    );
                }
                district.constituencies.push(ConstituencyAggregate {
                    code: l.constituency_code.clone(),
                    is_legacy,
                    entries: Vec::new(),
                });
                district.constituencies.len() - 1
            }
        };
        current = Some((didx, cidx));

        let cst = &mut districts[didx].constituencies[cidx];
        let existing = cst.entries.iter_mut().find(|e| {
            e.candidate_code == l.candidate_code
                && e.party_code == l.party_code
                && e.source_token == l.source_token
        });
        match existing {
            Some(e) => e.votes = e.votes.saturating_add(votes),
            None => cst.entries.push(AggregateEntry {
                candidate_code: l.candidate_code.clone(),
                party_code: l.party_code.clone(),
                source_token: l.source_token.clone(),
                votes,
            }),
        }
    }

    for n in nulls.iter() {
        let district_code = match &n.context.district_code {
            Some(code) => code,
            None => continue,
        };
        let count = check_unit_votes(
            n.count,
            rules,
            &n.context.location(n.lineno),
            "null votes",
            diagnostics,
        );
        let didx = district_index(&mut districts, district_code);
        districts[didx].null_votes = districts[didx].null_votes.saturating_add(count);
    }

    debug!(
        "aggregate: {} lines and {} null vote lines into {} districts",
        lines.len(),
        nulls.len(),
        districts.len()
    );
    districts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AdministrativeContext;
    use crate::reference::fixtures::tables_2019;

    fn rl(lineno: usize, dc: &str, cc: &str, cand: &str, party: &str, token: &str, votes: u64) -> ResolvedVoteLine {
        ResolvedVoteLine {
            lineno,
            district_code: dc.to_string(),
            constituency_code: cc.to_string(),
            candidate_code: cand.to_string(),
            party_code: party.to_string(),
            source_token: token.to_string(),
            votes,
            candidate_resolved: true,
            party_resolved: true,
        }
    }

    fn null_line(lineno: usize, dc: &str, count: u64) -> NullVoteLine {
        NullVoteLine {
            context: AdministrativeContext {
                district_code: Some(dc.to_string()),
                ..AdministrativeContext::default()
            },
            lineno,
            count,
        }
    }

    #[test]
    fn stations_roll_up() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let lines = vec![
            rl(1, "CT", "001", "CHIMPO", "DPP", "GRACE CHIMPONDO", 250),
            rl(2, "CT", "001", "MWAKAS", "UTM", "ELLEN MWAKASUNGULA", 100),
            rl(5, "CT", "001", "CHIMPO", "DPP", "GRACE CHIMPONDO", 50),
            rl(6, "CT", "001", "MWAKAS", "UTM", "ELLEN MWAKASUNGULA", 7),
        ];
        let mut diags: Vec<Diagnostic> = Vec::new();
        let res = aggregate(&lines, &[], &tables, &rules, &mut diags);
        assert!(diags.is_empty());
        assert_eq!(res.len(), 1);
        let c = &res[0].constituencies;
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].entries.len(), 2);
        assert_eq!(c[0].entries[0].votes, 300);
        assert_eq!(c[0].entries[1].votes, 107);
    }

    #[test]
    fn different_tokens_stay_apart() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let lines = vec![
            rl(1, "KA", "009", "MKANDA", "MCP", "PETER MKANDAWIRE", 1200),
            rl(2, "KA", "009", "MKANDA", "MCP", "P MKANDAWIRE", 300),
        ];
        let mut diags: Vec<Diagnostic> = Vec::new();
        let res = aggregate(&lines, &[], &tables, &rules, &mut diags);
        assert_eq!(res[0].constituencies[0].entries.len(), 2);
        let total: u64 = res[0].constituencies[0].entries.iter().map(|e| e.votes).sum();
        assert_eq!(total, 1500);
    }

    #[test]
    fn drifting_context_splits_constituencies() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let lines = vec![
            rl(1, "CT", "001", "CHIMPO", "DPP", "GRACE CHIMPONDO", 1),
            rl(2, "CT", "003", "BANDAX", "DPP", "JOHN BANDA", 2),
            rl(3, "CT", "001", "CHIMPO", "DPP", "GRACE CHIMPONDO", 3),
            rl(4, "CT", "005", "SILUNG", "AFORD", "TOM SILUNGWE", 4),
        ];
        let mut diags: Vec<Diagnostic> = Vec::new();
        let res = aggregate(&lines, &[], &tables, &rules, &mut diags);
        let codes: Vec<&str> = res[0].constituencies.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["001", "003", "001", "005"]);
        assert!(res[0].constituencies[3].is_legacy);
        assert!(!res[0].constituencies[0].is_legacy);
    }

    #[test]
    fn implausible_counts_are_truncated() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let lines = vec![
            rl(1, "CT", "001", "CHIMPO", "DPP", "GRACE CHIMPONDO", 250_123),
            rl(2, "CT", "001", "MWAKAS", "UTM", "ELLEN MWAKASUNGULA", 100_000),
        ];
        let nulls = vec![null_line(3, "CT", 4), null_line(9, "CT", 770_000)];
        let mut diags: Vec<Diagnostic> = Vec::new();
        let res = aggregate(&lines, &nulls, &tables, &rules, &mut diags);
        let entries = &res[0].constituencies[0].entries;
        assert_eq!(entries[0].votes, 250);
        assert_eq!(entries[1].votes, 100_000);
        assert_eq!(res[0].null_votes, 4 + 770);
        assert_eq!(diags.len(), 2);
        assert!(diags
            .iter()
            .all(|d| d.category == DiagnosticCategory::HighVotes));
        assert_eq!(diags[0].location.constituency.as_deref(), Some("001"));
    }

    #[test]
    fn null_votes_open_their_district() {
        let tables = tables_2019();
        let rules = ExtractionRules::DEFAULT_RULES;
        let nulls = vec![null_line(3, "KA", 4), null_line(5, "KA", 6)];
        let mut diags: Vec<Diagnostic> = Vec::new();
        let res = aggregate(&[], &nulls, &tables, &rules, &mut diags);
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].district_code, "KA");
        assert_eq!(res[0].null_votes, 10);
        assert!(res[0].constituencies.is_empty());
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_votes(250_123, 3), 250);
        assert_eq!(truncate_votes(42, 3), 42);
        assert_eq!(truncate_votes(1_234_567, 0), 1);
    }
}
