//! Reconstruction of the administrative context of every data line.
//!
//! Result documents print the administrative hierarchy (region, district,
//! constituency, ward, centre, station) above each block of vote lines, but
//! the text extraction breaks that header across lines, glues it to the
//! previous totals line or drops parts of it. The reconstructor is a state
//! machine fed one line at a time: [`transition`] is a pure function from the
//! current state and a line to the next state, the records found on the line
//! and the diagnostics raised.

use crate::config::*;
use crate::diagnostics::*;
use crate::reference::{party_key, ConstituencyEntry, DistrictEntry, YearTables};
use crate::text::{edit_distance, normalize_line, normalize_name};

use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};
use serde::Serialize;

lazy_static! {
    static ref NOISE_RX: Regex = Regex::new(concat!(
        r"(?i)^(?:region name\b|district name\b|constituency name\b|number candidate\b",
        r"|candidate names?\b|name party votes$|name \(party\) votes$",
        r"|(?:parliamentary|presidential|tripartite|general) elections?\b",
        r"|page \d+(?: of \d+)?$|(?:number of )?registered voters\b|voter turnout\b",
        r"|total no\.? of valid votes\b)"
    ))
    .unwrap();
    static ref NULL_VOTES_RX: Regex =
        Regex::new(r"(?i)^(?:total no\.? of )?null and void(?: votes)?\s*:?\s*(?P<count>\S+)$")
            .unwrap();
    static ref TOTALS_RX: Regex =
        Regex::new(r"(?i)^total no\.? of votes\s*:?\s*(?P<total>\d[\d,]*)(?P<rest>.*)$").unwrap();
    // Any suffix of: Region N <district> NN <constituency> NNN <ward> NNNN <centre> NNNNN Station N
    static ref CONTEXT_RX: Regex = Regex::new(concat!(
        r"^(?:Region\s*(?P<rnum>\d+)\s*(?P<district>[A-Za-z][A-Za-z ]*?)\s*(?P<dnum>\d{2})\s+)?",
        r"(?P<cname>[A-Za-z][A-Za-z'\- ]*?)\s*(?P<ccode>\d{3})",
        r"(?:\s+(?P<ward>[A-Za-z][A-Za-z'\- ]*?)\s*(?P<wcode>\d{4}))?",
        r"(?:\s+(?P<centre>[A-Za-z][A-Za-z'/\-\. ]*?)(?:\s*(?P<ccentre>\d{5}))?)?",
        r"(?:\s*Station\s*(?P<station>\d+))?$"
    ))
    .unwrap();
    static ref LEADING_CODE_RX: Regex =
        Regex::new(r"^(?P<ccode>\d{3})\s+(?P<cname>[A-Za-z][A-Za-z'\- ]*)$").unwrap();
    static ref CONSTITUENCY_RESULTS_RX: Regex = Regex::new(
        r"(?i)^(?P<cname>[A-Za-z][A-Za-z'\- ]*?)\s+constituency(?:\s+results?)?(?:\s+(?P<rest>.*))?$"
    )
    .unwrap();
    static ref DISTRICT_RX: Regex =
        Regex::new(r"^(?:Region\s*\d+\s*)?(?P<district>[A-Za-z][A-Za-z ]*?)\s*(?P<dnum>\d{2})$")
            .unwrap();
    static ref WARD_RX: Regex =
        Regex::new(r"^(?P<ward>[A-Za-z][A-Za-z'\- ]*?)\s*(?P<wcode>\d{4})$").unwrap();
    static ref CENTRE_RX: Regex =
        Regex::new(r"^(?P<centre>[A-Za-z][A-Za-z'/\-\. ]*?)\s*(?P<ccentre>\d{5})$").unwrap();
    static ref STATION_RX: Regex = Regex::new(concat!(
        r"(?i)^(?:(?P<centre>[A-Za-z][A-Za-z'/\-\. ]*?)\s*)?(?:(?P<ccentre>\d{5})\s*)?",
        r"station\s*(?P<station>\d+)$"
    ))
    .unwrap();
    static ref PAREN_DATA_RX: Regex = Regex::new(concat!(
        r"^(?:\d{1,3}\s+)?(?P<cand>[A-Za-z][A-Za-z'.\- ]*?)\s*\((?P<party>[^()]*)\)",
        r"\s*(?:(?i:votes)\s*:?\s*)?(?P<votes>-?[\d,.]+)$"
    ))
    .unwrap();
    static ref PLAIN_DATA_RX: Regex = Regex::new(concat!(
        r"^(?:\d{1,3}\s+)?(?P<cand>[A-Za-z][A-Za-z'.\-]*(?:\s+[A-Za-z][A-Za-z'.\-]*)*)",
        r"\s+(?P<party>\S+)\s+(?P<votes>-?[\d,.]+)$"
    ))
    .unwrap();
    static ref VOTES_RX: Regex = Regex::new(r"^(?:\d+|\d{1,3}(?:,\d{3})+)$").unwrap();
}

/// Trailing words that mark a place name, as in `Mzimba North 105`.
const PLACE_SUFFIXES: [&str; 9] = [
    "north", "south", "east", "west", "central", "centre", "city", "rural", "boma",
];

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum Phase {
    SeekingRegion,
    SeekingDistrict,
    SeekingConstituency,
    SeekingPollingStation,
    InData,
}

/// What is known of the administrative hierarchy at a given point of the document.
///
/// Setting a level resets every level below it.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct AdministrativeContext {
    pub region: Option<String>,
    pub district_code: Option<String>,
    pub district_name: Option<String>,
    pub constituency_code: Option<String>,
    pub constituency_name: Option<String>,
    pub ward: Option<String>,
    pub centre: Option<String>,
    pub polling_station: Option<String>,
}

impl AdministrativeContext {
    pub fn location(&self, lineno: usize) -> Location {
        Location {
            lineno: Some(lineno),
            district: self.district_code.clone(),
            constituency: self.constituency_code.clone(),
            field: None,
        }
    }

    fn set_region(&mut self, region: &str) {
        *self = AdministrativeContext {
            region: Some(region.to_string()),
            ..AdministrativeContext::default()
        };
    }

    fn set_district(&mut self, d: &DistrictEntry) {
        let region = d.region.clone().or_else(|| self.region.clone());
        *self = AdministrativeContext {
            region,
            district_code: Some(d.code.clone()),
            district_name: Some(d.name.clone()),
            ..AdministrativeContext::default()
        };
    }

    fn set_constituency(&mut self, d: &DistrictEntry, c: &ConstituencyEntry) {
        if self.district_code.as_deref() != Some(d.code.as_str()) {
            self.set_district(d);
        }
        self.constituency_code = Some(c.code.clone());
        self.constituency_name = Some(c.name.clone());
        self.clear_ward();
    }

    fn clear_constituency(&mut self) {
        self.constituency_code = None;
        self.constituency_name = None;
        self.clear_ward();
    }

    fn clear_ward(&mut self) {
        self.ward = None;
        self.centre = None;
        self.polling_station = None;
    }
}

/// A recognized data line: a candidate, its party and its vote count, as
/// printed in the source.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct RawVoteLine {
    pub context: AdministrativeContext,
    pub lineno: usize,
    pub candidate_token: String,
    pub party_token: String,
    pub votes: u64,
}

/// A "Null and Void Votes" line.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct NullVoteLine {
    pub context: AdministrativeContext,
    pub lineno: usize,
    pub count: u64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Record {
    Vote(RawVoteLine),
    NullVotes(NullVoteLine),
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct ReconstructorState {
    pub phase: Phase,
    pub context: AdministrativeContext,
}

impl ReconstructorState {
    pub fn initial() -> ReconstructorState {
        ReconstructorState {
            phase: Phase::SeekingRegion,
            context: AdministrativeContext::default(),
        }
    }

    /// The starting state of a document already known to cover a district.
    pub fn for_district(d: &DistrictEntry) -> ReconstructorState {
        let mut context = AdministrativeContext::default();
        context.set_district(d);
        ReconstructorState {
            phase: Phase::SeekingConstituency,
            context,
        }
    }
}

/// The outcome of feeding one line to the reconstructor.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Transition {
    pub state: ReconstructorState,
    pub records: Vec<Record>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The transition function of the reconstructor.
///
/// A line may carry more than one piece of information (a totals line with
/// the next header glued to it), hence the vectors.
pub fn transition(
    tables: &YearTables,
    rules: &ExtractionRules,
    state: &ReconstructorState,
    line: &RawLine,
) -> Transition {
    let mut t = Transition {
        state: state.clone(),
        records: Vec::new(),
        diagnostics: Vec::new(),
    };
    let text = normalize_line(&line.text);
    classify(tables, rules, &mut t, &text, line.lineno);
    t
}

/// Runs the reconstructor over a whole document.
pub fn reconstruct(
    tables: &YearTables,
    rules: &ExtractionRules,
    lines: &[RawLine],
    initial: ReconstructorState,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Record> {
    let mut state = initial;
    let mut records: Vec<Record> = Vec::new();
    for line in lines.iter() {
        let t = transition(tables, rules, &state, line);
        state = t.state;
        records.extend(t.records);
        diagnostics.extend(t.diagnostics);
    }
    debug!(
        "reconstruct: {} lines, {} records, final phase {:?}",
        lines.len(),
        records.len(),
        state.phase
    );
    records
}

/// Parses a vote count. Thousands separators are accepted, signs and
/// decimals are not.
pub fn parse_votes(token: &str) -> Result<u64, String> {
    let token = token.trim();
    if token.starts_with('-') {
        return Err(format!("negative vote count {}", token));
    }
    if !VOTES_RX.is_match(token) {
        return Err(format!("malformed vote count {}", token));
    }
    token
        .replace(',', "")
        .parse::<u64>()
        .map_err(|e| format!("malformed vote count {}: {}", token, e))
}

struct DataLine<'a> {
    candidate: &'a str,
    party: &'a str,
    votes: &'a str,
    parenthesized: bool,
}

impl<'a> DataLine<'a> {
    fn parse(text: &'a str) -> Option<DataLine<'a>> {
        if let Some(caps) = PAREN_DATA_RX.captures(text) {
            return Some(DataLine::from_captures(&caps, true));
        }
        PLAIN_DATA_RX
            .captures(text)
            .map(|caps| DataLine::from_captures(&caps, false))
    }

    fn from_captures(caps: &Captures<'a>, parenthesized: bool) -> DataLine<'a> {
        let get = |name: &str| caps.name(name).map(|m| m.as_str().trim()).unwrap_or("");
        DataLine {
            candidate: get("cand"),
            party: get("party"),
            votes: get("votes"),
            parenthesized,
        }
    }

    /// The party token is one the tables know: this cannot be a header line.
    fn is_certain(&self, tables: &YearTables) -> bool {
        let key = party_key(self.party);
        self.parenthesized
            || tables.canonical_party(&key).is_some()
            || tables.party_alias(&key).is_some()
    }

    /// Place codes are zero-padded, vote counts are not.
    fn looks_like_place_code(&self) -> bool {
        self.votes.len() > 1 && self.votes.starts_with('0')
    }
}

fn classify(
    tables: &YearTables,
    rules: &ExtractionRules,
    t: &mut Transition,
    text: &str,
    lineno: usize,
) {
    if text.is_empty() || NOISE_RX.is_match(text) {
        return;
    }

    if let Some(caps) = NULL_VOTES_RX.captures(text) {
        null_votes(t, &caps["count"], lineno);
        return;
    }

    if let Some(caps) = TOTALS_RX.captures(text) {
        if t.state.phase == Phase::InData {
            t.state.phase = Phase::SeekingPollingStation;
        }
        t.state.context.polling_station = None;
        let rest = caps.name("rest").map(|m| m.as_str().trim()).unwrap_or("");
        if !rest.is_empty() {
            debug!("classify: line {}: text glued after the totals: {:?}", lineno, rest);
            classify(tables, rules, t, rest, lineno);
        }
        return;
    }

    if let Some(region) = tables.region_named(text) {
        t.state.context.set_region(region);
        t.state.phase = Phase::SeekingDistrict;
        return;
    }

    let data = DataLine::parse(text);
    if let Some(d) = &data {
        if d.is_certain(tables) {
            vote_line(t, d, lineno);
            return;
        }
    }

    if context_line(tables, rules, t, text, lineno)
        || constituency_results_line(tables, rules, t, text, lineno)
        || district_line(tables, rules, t, text)
        || place_line(t, text, data.is_some())
    {
        return;
    }

    match data {
        Some(d) if !d.looks_like_place_code() => vote_line(t, &d, lineno),
        _ => {
            let msg = format!("unrecognized line {:?}", text);
            parse_error(t, lineno, msg);
        }
    }
}

fn parse_error(t: &mut Transition, lineno: usize, detail: String) {
    debug!("parse_error: line {}: {}", lineno, detail);
    t.diagnostics.push(Diagnostic::new(
        DiagnosticCategory::ParseError,
        detail,
        t.state.context.location(lineno),
    ));
}

fn vote_line(t: &mut Transition, data: &DataLine, lineno: usize) {
    if t.state.context.constituency_code.is_none() {
        let msg = format!(
            "vote line outside of any known constituency: {} {} {}",
            data.candidate, data.party, data.votes
        );
        parse_error(t, lineno, msg);
        return;
    }
    match parse_votes(data.votes) {
        Ok(votes) => {
            t.state.phase = Phase::InData;
            t.records.push(Record::Vote(RawVoteLine {
                context: t.state.context.clone(),
                lineno,
                candidate_token: data.candidate.to_string(),
                party_token: data.party.to_string(),
                votes,
            }));
        }
        Err(msg) => parse_error(t, lineno, format!("{} for {}", msg, data.candidate)),
    }
}

fn null_votes(t: &mut Transition, count: &str, lineno: usize) {
    if t.state.context.district_code.is_none() {
        parse_error(t, lineno, "null votes outside of any known district".to_string());
        return;
    }
    match parse_votes(count) {
        Ok(count) => t.records.push(Record::NullVotes(NullVoteLine {
            context: t.state.context.clone(),
            lineno,
            count,
        })),
        Err(msg) => parse_error(t, lineno, format!("{} for null votes", msg)),
    }
}

fn names_match(a: &str, b: &str, max_distance: usize) -> bool {
    edit_distance(&normalize_name(a), &normalize_name(b)) <= max_distance
}

/// Finds the constituency named on a line. Accepted, in order:
///  - code and name agree with the tables
///  - the code belongs to the current district and a constituency is expected
///  - the name matches a single constituency, preferably in the current district
fn find_constituency<'t>(
    tables: &'t YearTables,
    rules: &ExtractionRules,
    state: &ReconstructorState,
    district: Option<&str>,
    name: &str,
    code: Option<&str>,
) -> Option<(&'t DistrictEntry, &'t ConstituencyEntry)> {
    if let Some((d, c)) = code.and_then(|code| tables.find_constituency(code)) {
        if names_match(name, &c.name, rules.max_constituency_name_distance) {
            return Some((d, c));
        }
        if state.phase == Phase::SeekingConstituency && district == Some(d.code.as_str()) {
            debug!(
                "find_constituency: accepting {} for {:?} from the code alone",
                c.code, name
            );
            return Some((d, c));
        }
    }
    for max_distance in [0, rules.max_constituency_name_distance] {
        let all = tables.constituencies_named(name, max_distance);
        let local: Vec<(&DistrictEntry, &ConstituencyEntry)> = all
            .iter()
            .filter(|(d, _)| district == Some(d.code.as_str()))
            .cloned()
            .collect();
        let found = if local.is_empty() { all } else { local };
        if let [(d, c)] = found.as_slice() {
            return Some((*d, *c));
        }
    }
    None
}

/// Lines carrying a constituency, possibly with the district before it and
/// the ward, centre and station after it.
fn context_line(
    tables: &YearTables,
    rules: &ExtractionRules,
    t: &mut Transition,
    text: &str,
    lineno: usize,
) -> bool {
    let caps = match CONTEXT_RX
        .captures(text)
        .or_else(|| LEADING_CODE_RX.captures(text))
    {
        Some(caps) => caps,
        None => return false,
    };
    let get = |name: &str| caps.name(name).map(|m| m.as_str().trim());

    let line_district = match get("district") {
        Some(name) => match tables.district_by_name(name, rules.max_district_name_distance) {
            Some(d) => Some(d),
            None => {
                let msg = format!("unknown district {:?}", name);
                parse_error(t, lineno, msg);
                return true;
            }
        },
        None => None,
    };
    let district_code = line_district
        .map(|d| d.code.clone())
        .or_else(|| t.state.context.district_code.clone());

    let cname = get("cname").unwrap_or("");
    let found = find_constituency(
        tables,
        rules,
        &t.state,
        district_code.as_deref(),
        cname,
        get("ccode"),
    );
    let has_lower_levels = get("ward").is_some() || get("centre").is_some() || get("station").is_some();

    match found {
        Some((d, c)) => {
            if let Some(ld) = line_district {
                if ld.code != d.code {
                    debug!(
                        "context_line: line {}: constituency {} belongs to {}, not {}",
                        lineno, c.code, d.code, ld.code
                    );
                }
            }
            t.state.context.set_constituency(d, c);
        }
        None => {
            let last_word = normalize_name(cname)
                .rsplit(' ')
                .next()
                .unwrap_or("")
                .to_string();
            let is_place = line_district.is_some()
                || has_lower_levels
                || PLACE_SUFFIXES.contains(&last_word.as_str());
            if !is_place {
                return false;
            }
            if let Some(d) = line_district {
                t.state.context.set_district(d);
            }
            t.state.context.clear_constituency();
            let msg = format!(
                "unknown constituency {:?} {}",
                cname,
                get("ccode").unwrap_or("")
            );
            parse_error(t, lineno, msg);
        }
    }

    let ctx = &mut t.state.context;
    if let (Some(ward), Some(wcode)) = (get("ward"), get("wcode")) {
        ctx.ward = Some(format!("{} {}", ward, wcode));
    }
    if let Some(centre) = get("centre") {
        ctx.centre = Some(match get("ccentre") {
            Some(code) => format!("{} {}", centre, code),
            None => centre.to_string(),
        });
    }
    t.state.phase = match get("station") {
        Some(n) => {
            ctx.polling_station = Some(format!("Station {}", n));
            Phase::InData
        }
        None => Phase::SeekingPollingStation,
    };
    true
}

/// `<name> Constituency Results`, used by constituency-level result sheets.
fn constituency_results_line(
    tables: &YearTables,
    rules: &ExtractionRules,
    t: &mut Transition,
    text: &str,
    lineno: usize,
) -> bool {
    let caps = match CONSTITUENCY_RESULTS_RX.captures(text) {
        Some(caps) => caps,
        None => return false,
    };
    let cname = caps["cname"].trim();
    let district = t.state.context.district_code.clone();
    match find_constituency(tables, rules, &t.state, district.as_deref(), cname, None) {
        Some((d, c)) => {
            t.state.context.set_constituency(d, c);
            t.state.phase = Phase::SeekingPollingStation;
        }
        None => {
            t.state.context.clear_constituency();
            parse_error(t, lineno, format!("unknown constituency {:?}", cname));
        }
    }
    if let Some(rest) = caps.name("rest") {
        classify(tables, rules, t, rest.as_str().trim(), lineno);
    }
    true
}

fn district_line(tables: &YearTables, rules: &ExtractionRules, t: &mut Transition, text: &str) -> bool {
    let caps = match DISTRICT_RX.captures(text) {
        Some(caps) => caps,
        None => return false,
    };
    match tables.district_by_name(&caps["district"], rules.max_district_name_distance) {
        Some(d) => {
            if d.number.as_deref().map_or(false, |n| n != &caps["dnum"]) {
                debug!(
                    "district_line: {} is printed with number {}",
                    d.code, &caps["dnum"]
                );
            }
            t.state.context.set_district(d);
            t.state.phase = Phase::SeekingConstituency;
            true
        }
        None => false,
    }
}

/// Ward, centre and station lines. Inside a block of data, or when the line
/// also reads as a vote line, only zero-padded codes are taken as places.
fn place_line(t: &mut Transition, text: &str, reads_as_votes: bool) -> bool {
    let ctx = &mut t.state.context;
    if let Some(caps) = STATION_RX.captures(text) {
        if let Some(centre) = caps.name("centre") {
            ctx.centre = Some(match caps.name("ccentre") {
                Some(code) => format!("{} {}", centre.as_str().trim(), code.as_str()),
                None => centre.as_str().trim().to_string(),
            });
        }
        ctx.polling_station = Some(format!("Station {}", &caps["station"]));
        t.state.phase = Phase::InData;
        return true;
    }
    let strict = reads_as_votes || t.state.phase == Phase::InData;
    if let Some(caps) = CENTRE_RX.captures(text) {
        if strict && !caps["ccentre"].starts_with('0') {
            return false;
        }
        ctx.centre = Some(format!("{} {}", caps["centre"].trim(), &caps["ccentre"]));
        ctx.polling_station = None;
        t.state.phase = Phase::SeekingPollingStation;
        return true;
    }
    if let Some(caps) = WARD_RX.captures(text) {
        if strict && !caps["wcode"].starts_with('0') {
            return false;
        }
        ctx.ward = Some(format!("{} {}", caps["ward"].trim(), &caps["wcode"]));
        ctx.centre = None;
        ctx.polling_station = None;
        t.state.phase = Phase::SeekingPollingStation;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::fixtures::tables_2019;

    fn run(text: &str, initial: ReconstructorState) -> (Vec<Record>, Vec<Diagnostic>) {
        let tables = tables_2019();
        let lines = RawLine::from_text(text);
        let mut diags: Vec<Diagnostic> = Vec::new();
        let rules = ExtractionRules::DEFAULT_RULES;
        let records = reconstruct(&tables, &rules, &lines, initial, &mut diags);
        (records, diags)
    }

    fn votes(records: &[Record]) -> Vec<&RawVoteLine> {
        records
            .iter()
            .filter_map(|r| match r {
                Record::Vote(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    const POLLING_STATIONS: &str = "MALAWI ELECTORAL COMMISSION
Parliamentary Elections Results
Region Name District Name Constituency Name Ward Name Centre Name Station
Northern
Region 1Chitipa 01 Chitipa East 001 Iponjola 0001 Chanya School 01010 Station 1
Number Candidate Names Affiliation Votes
1 GRACE CHIMPONDO DPP 250
2 ELLEN MWAKASUNGULA UTM 1,020
3 AGNES NYIRENDA MCP 99
Total No. of Valid Votes 1369
Total No. of Null and Void Votes 7
Total No. of Votes 1376Chitipa Central 003 Yamba 0006 Chimwemwe School
Station 1
JOHN BANDA DDP 120
MOSES KAUNDA 88Mlale 30
Total No. of Votes 150";

    #[test]
    fn polling_station_blocks() {
        let (records, diags) = run(POLLING_STATIONS, ReconstructorState::initial());
        let vs = votes(&records);
        assert_eq!(vs.len(), 5);

        assert_eq!(vs[0].candidate_token, "GRACE CHIMPONDO");
        assert_eq!(vs[0].party_token, "DPP");
        assert_eq!(vs[0].votes, 250);
        assert_eq!(vs[0].lineno, 7);
        assert_eq!(vs[0].context.region.as_deref(), Some("Northern"));
        assert_eq!(vs[0].context.district_code.as_deref(), Some("CT"));
        assert_eq!(vs[0].context.constituency_code.as_deref(), Some("001"));
        assert_eq!(vs[0].context.ward.as_deref(), Some("Iponjola 0001"));
        assert_eq!(vs[0].context.centre.as_deref(), Some("Chanya School 01010"));
        assert_eq!(vs[0].context.polling_station.as_deref(), Some("Station 1"));
        assert_eq!(vs[1].votes, 1020);

        // The header glued to the totals line opens the next block.
        assert_eq!(vs[3].candidate_token, "JOHN BANDA");
        assert_eq!(vs[3].party_token, "DDP");
        assert_eq!(vs[3].context.constituency_code.as_deref(), Some("003"));
        assert_eq!(vs[3].context.ward.as_deref(), Some("Yamba 0006"));
        assert_eq!(vs[4].party_token, "88Mlale");
        assert_eq!(vs[4].votes, 30);

        let nulls: Vec<&NullVoteLine> = records
            .iter()
            .filter_map(|r| match r {
                Record::NullVotes(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(nulls.len(), 1);
        assert_eq!(nulls[0].count, 7);
        assert_eq!(nulls[0].context.district_code.as_deref(), Some("CT"));

        // Only the title line is not understood.
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].category, DiagnosticCategory::ParseError);
        assert_eq!(diags[0].location.lineno, Some(1));
    }

    #[test]
    fn constituency_result_sheets() {
        let text = "Chitipa 01
Chitipa East Constituency Results
ARTHUR PETER MUTHARIKA (DPP) Votes: 1,234
LAZARUS CHAKWERA (MCP) Votes: 2345
Null and Void Votes 12
Karonga Central Constituency Results
LAZARUS CHAKWERA (MCP) Votes: 900";
        let (records, diags) = run(text, ReconstructorState::initial());
        assert!(diags.is_empty(), "{:?}", diags);
        let vs = votes(&records);
        assert_eq!(vs.len(), 3);
        assert_eq!(vs[0].candidate_token, "ARTHUR PETER MUTHARIKA");
        assert_eq!(vs[0].votes, 1234);
        assert_eq!(vs[0].context.constituency_code.as_deref(), Some("001"));
        assert_eq!(vs[2].context.district_code.as_deref(), Some("KA"));
        assert_eq!(vs[2].context.constituency_code.as_deref(), Some("009"));
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn data_before_any_constituency_is_dropped() {
        let (records, diags) = run("GRACE CHIMPONDO DPP 250", ReconstructorState::initial());
        assert!(records.is_empty());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].category, DiagnosticCategory::ParseError);
    }

    #[test]
    fn unknown_constituency_clears_the_context() {
        let text = "Region 1Chitipa 01 Chitipa East 001 Iponjola 0001 Chanya School 01010 Station 1
GRACE CHIMPONDO DPP 250
Region 1Chitipa 01 Chitipa Nowhere 077 Iponjola 0001 Chanya School 01010 Station 2
GRACE CHIMPONDO DPP 40";
        let (records, diags) = run(text, ReconstructorState::initial());
        let vs = votes(&records);
        assert_eq!(vs.len(), 1);
        assert_eq!(vs[0].votes, 250);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].location.lineno, Some(3));
        assert_eq!(diags[1].location.lineno, Some(4));
        assert_eq!(diags[1].location.district.as_deref(), Some("CT"));
        assert_eq!(diags[1].location.constituency, None);
    }

    #[test]
    fn malformed_counts_are_rejected() {
        let text = "Chitipa East 001
GRACE CHIMPONDO DPP 12.5
GRACE CHIMPONDO DPP -40
GRACE CHIMPONDO DPP 1,00
GRACE CHIMPONDO DPP 12";
        let tables = tables_2019();
        let start = ReconstructorState::for_district(tables.district("CT").unwrap());
        let (records, diags) = run(text, start);
        assert_eq!(votes(&records).len(), 1);
        assert_eq!(diags.len(), 3);
        assert!(diags
            .iter()
            .all(|d| d.category == DiagnosticCategory::ParseError));
        assert!(diags[1].detail.contains("negative"));
    }

    #[test]
    fn code_alone_while_seeking_a_constituency() {
        let text = "Misspelt Name 003
MOSES KAUNDA IND 10
Garbage Name 009
MOSES KAUNDA IND 5";
        let tables = tables_2019();
        let start = ReconstructorState::for_district(tables.district("CT").unwrap());
        let (records, diags) = run(text, start);
        let vs = votes(&records);
        assert_eq!(vs.len(), 2);
        assert!(vs
            .iter()
            .all(|v| v.context.constituency_code.as_deref() == Some("003")));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].location.lineno, Some(3));
    }

    #[test]
    fn unknown_party_is_not_a_ward() {
        let text = "Chitipa East 001
GRACE CHIMPONDO Mlale 1200
ELLEN MWAKASUNGULA UTM 300
Chanya School 01010
Iponjola 0001
AGNES NYIRENDA Mlale 12345";
        let tables = tables_2019();
        let start = ReconstructorState::for_district(tables.district("CT").unwrap());
        let (records, diags) = run(text, start);
        assert!(diags.is_empty(), "{:?}", diags);
        let vs = votes(&records);
        assert_eq!(vs.len(), 3);
        assert_eq!(vs[0].candidate_token, "GRACE CHIMPONDO");
        assert_eq!(vs[0].party_token, "Mlale");
        assert_eq!(vs[0].votes, 1200);
        assert_eq!(vs[1].votes, 300);
        // Zero-padded codes still open a ward or a centre.
        assert_eq!(vs[2].context.ward.as_deref(), Some("Iponjola 0001"));
        assert_eq!(vs[2].votes, 12345);
    }

    #[test]
    fn name_distances_follow_the_rules() {
        let text = "Karongo 02
Chitipa Eats 001
GRACE CHIMPONDO DPP 12";
        let (records, _) = run(text, ReconstructorState::initial());
        let vs = votes(&records);
        assert_eq!(vs.len(), 1);
        assert_eq!(vs[0].context.constituency_code.as_deref(), Some("001"));

        let tables = tables_2019();
        let rules = ExtractionRules {
            max_constituency_name_distance: 0,
            max_district_name_distance: 0,
            ..ExtractionRules::DEFAULT_RULES
        };
        let t = transition(
            &tables,
            &rules,
            &ReconstructorState::initial(),
            &RawLine {
                lineno: 1,
                text: "Karongo 02".to_string(),
            },
        );
        assert_eq!(t.state.context.district_code, None);
        let t = transition(
            &tables,
            &ExtractionRules::DEFAULT_RULES,
            &ReconstructorState::initial(),
            &RawLine {
                lineno: 1,
                text: "Karongo 02".to_string(),
            },
        );
        assert_eq!(t.state.context.district_code.as_deref(), Some("KA"));
    }

    #[test]
    fn transition_is_pure() {
        let tables = tables_2019();
        let state = ReconstructorState::initial();
        let line = RawLine {
            lineno: 3,
            text: "Region 1Chitipa 01 Chitipa East 001 Iponjola 0001 Chanya School 01010 Station 1"
                .to_string(),
        };
        let rules = ExtractionRules::DEFAULT_RULES;
        let t1 = transition(&tables, &rules, &state, &line);
        let t2 = transition(&tables, &rules, &state, &line);
        assert_eq!(t1, t2);
        assert_eq!(state, ReconstructorState::initial());
        assert_eq!(t1.state.phase, Phase::InData);
        assert!(t1.records.is_empty());
    }

    #[test]
    fn region_resets_everything() {
        let tables = tables_2019();
        let state = ReconstructorState::for_district(tables.district("CT").unwrap());
        let t = transition(
            &tables,
            &ExtractionRules::DEFAULT_RULES,
            &state,
            &RawLine {
                lineno: 1,
                text: "  Central   Region ".to_string(),
            },
        );
        assert_eq!(t.state.phase, Phase::SeekingDistrict);
        assert_eq!(t.state.context.region.as_deref(), Some("Central"));
        assert_eq!(t.state.context.district_code, None);
    }

    #[test]
    fn vote_counts() {
        assert_eq!(parse_votes("1,234"), Ok(1234));
        assert_eq!(parse_votes("007"), Ok(7));
        assert!(parse_votes("-3").is_err());
        assert!(parse_votes("3.5").is_err());
        assert!(parse_votes("12,34").is_err());
    }
}
