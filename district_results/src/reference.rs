//! Typed reference tables, per election year: administration (districts and
//! their constituencies), candidates and parties.
//!
//! The tables are read-only once built. [`YearTables::new`] checks their
//! internal consistency so that the rest of the pipeline can rely on it.

use crate::config::*;
use crate::text::{edit_distance, normalize_name};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::TryFrom;
use std::fmt::Display;

/// The election years for which the pipeline is known to work.
pub const SUPPORTED_YEARS: [u16; 4] = [2014, 2019, 2020, 2025];

/// The party code of independent candidates. Always valid.
pub const INDEPENDENT: &str = "IND";

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ElectionYear(u16);

impl ElectionYear {
    pub fn new(year: u16) -> Result<ElectionYear, ExtractionError> {
        if SUPPORTED_YEARS.contains(&year) {
            Ok(ElectionYear(year))
        } else {
            Err(ExtractionError::UnsupportedYear(year))
        }
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for ElectionYear {
    type Error = ExtractionError;
    fn try_from(year: u16) -> Result<ElectionYear, ExtractionError> {
        ElectionYear::new(year)
    }
}

impl From<ElectionYear> for u16 {
    fn from(y: ElectionYear) -> u16 {
        y.0
    }
}

impl Display for ElectionYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ******** Table entries, as stored on disk *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ConstituencyEntry {
    pub code: String,
    pub name: String,
    #[serde(rename = "isLegacy", default)]
    pub is_legacy: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DistrictEntry {
    pub code: String,
    pub name: String,
    /// The 2-digit number printed next to the district name in the documents.
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub constituencies: Vec<ConstituencyEntry>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Administration {
    pub districts: Vec<DistrictEntry>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub code: String,
    pub fullname: String,
    pub race: RaceType,
    /// The party the candidate is registered with for the year.
    #[serde(default)]
    pub party: Option<String>,
    /// Constituency codes the candidate runs in. Ignored for presidential candidates.
    #[serde(default)]
    pub constituencies: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl CandidateEntry {
    /// Presidential candidates run everywhere.
    pub fn runs_in(&self, constituency_code: &str) -> bool {
        self.race == RaceType::Presidential
            || self.constituencies.iter().any(|c| c == constituency_code)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyEntry {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    Candidate,
    Party,
}

/// An extra alias, usually coming from a maintained alias sheet.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub kind: AliasKind,
    pub raw: String,
    pub canonical: String,
}

/// The lookup key of a party token: upper-cased letters only.
pub fn party_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// The lookup key of a candidate alias: the normalized name, upper-cased.
pub fn candidate_key(s: &str) -> String {
    normalize_name(s).to_uppercase()
}

// ******** Per-year tables *********

#[derive(Debug, Clone)]
pub struct YearTables {
    year: ElectionYear,
    districts: Vec<DistrictEntry>,
    candidates: Vec<CandidateEntry>,
    parties: Vec<PartyEntry>,
    // constituency code -> (district index, constituency index)
    constituency_index: HashMap<String, (usize, usize)>,
    candidate_aliases: HashMap<String, String>,
    party_aliases: HashMap<String, String>,
}

impl YearTables {
    /// Builds the tables of one year, checking that:
    ///  - district, constituency, party and candidate codes are unique
    ///  - every party mentioned by a candidate or an alias exists
    ///  - every constituency a candidate runs in exists
    ///  - every alias points to an existing code
    pub fn new(
        year: ElectionYear,
        administration: Administration,
        candidates: Vec<CandidateEntry>,
        parties: Vec<PartyEntry>,
        extra_aliases: Vec<AliasEntry>,
    ) -> Result<YearTables, ExtractionError> {
        let invalid = |msg: String| ExtractionError::InvalidTables(format!("{}: {}", year, msg));

        let mut district_codes: HashSet<&str> = HashSet::new();
        let mut constituency_index: HashMap<String, (usize, usize)> = HashMap::new();
        for (didx, d) in administration.districts.iter().enumerate() {
            if !district_codes.insert(d.code.as_str()) {
                return Err(invalid(format!("duplicate district code {}", d.code)));
            }
            for (cidx, c) in d.constituencies.iter().enumerate() {
                if constituency_index
                    .insert(c.code.clone(), (didx, cidx))
                    .is_some()
                {
                    return Err(invalid(format!("duplicate constituency code {}", c.code)));
                }
            }
        }

        let mut party_codes: HashSet<&str> = HashSet::new();
        for p in parties.iter() {
            if p.code == INDEPENDENT || !party_codes.insert(p.code.as_str()) {
                return Err(invalid(format!("reserved or duplicate party code {}", p.code)));
            }
        }
        let is_party = |code: &str| code == INDEPENDENT || party_codes.contains(code);

        let mut candidate_codes: HashSet<(RaceType, &str)> = HashSet::new();
        for c in candidates.iter() {
            if !candidate_codes.insert((c.race, c.code.as_str())) {
                return Err(invalid(format!("duplicate candidate code {}", c.code)));
            }
            if let Some(party) = &c.party {
                if !is_party(party) {
                    return Err(invalid(format!(
                        "candidate {} registered with unknown party {}",
                        c.code, party
                    )));
                }
            }
            if let Some(cst) = c
                .constituencies
                .iter()
                .find(|cst| !constituency_index.contains_key(cst.as_str()))
            {
                return Err(invalid(format!(
                    "candidate {} runs in unknown constituency {}",
                    c.code, cst
                )));
            }
        }

        let mut party_aliases: HashMap<String, String> = HashMap::new();
        party_aliases.insert("INDEPENDENT".to_string(), INDEPENDENT.to_string());
        party_aliases.insert("INDEP".to_string(), INDEPENDENT.to_string());
        let mut candidate_aliases: HashMap<String, String> = HashMap::new();

        let party_pairs = parties
            .iter()
            .flat_map(|p| p.aliases.iter().map(move |a| (a.clone(), p.code.clone())));
        let extra_party_pairs = extra_aliases
            .iter()
            .filter(|a| a.kind == AliasKind::Party)
            .map(|a| (a.raw.clone(), a.canonical.clone()));
        for (raw, canonical) in party_pairs.chain(extra_party_pairs) {
            if !is_party(&canonical) {
                return Err(invalid(format!("alias {} points to unknown party {}", raw, canonical)));
            }
            party_aliases.insert(party_key(&raw), canonical);
        }

        let candidate_pairs = candidates
            .iter()
            .flat_map(|c| c.aliases.iter().map(move |a| (a.clone(), c.code.clone())));
        let extra_candidate_pairs = extra_aliases
            .iter()
            .filter(|a| a.kind == AliasKind::Candidate)
            .map(|a| (a.raw.clone(), a.canonical.clone()));
        for (raw, canonical) in candidate_pairs.chain(extra_candidate_pairs) {
            if !candidates.iter().any(|c| c.code == canonical) {
                return Err(invalid(format!(
                    "alias {} points to unknown candidate {}",
                    raw, canonical
                )));
            }
            candidate_aliases.insert(candidate_key(&raw), canonical);
        }

        debug!(
            "YearTables::new: {}: {} districts, {} constituencies, {} candidates, {} parties, {} aliases",
            year,
            administration.districts.len(),
            constituency_index.len(),
            candidates.len(),
            parties.len(),
            party_aliases.len() + candidate_aliases.len()
        );

        Ok(YearTables {
            year,
            districts: administration.districts,
            candidates,
            parties,
            constituency_index,
            candidate_aliases,
            party_aliases,
        })
    }

    pub fn year(&self) -> ElectionYear {
        self.year
    }

    pub fn districts(&self) -> &[DistrictEntry] {
        &self.districts
    }

    pub fn district(&self, code: &str) -> Option<&DistrictEntry> {
        self.districts.iter().find(|d| d.code == code)
    }

    /// Finds a district from its printed name, tolerating up to `max_distance`
    /// OCR errors on longer names as long as the match is unique.
    pub fn district_by_name(&self, name: &str, max_distance: usize) -> Option<&DistrictEntry> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        if let Some(d) = self.districts.iter().find(|d| normalize_name(&d.name) == key) {
            return Some(d);
        }
        if key.len() < 5 || max_distance == 0 {
            return None;
        }
        let close: Vec<&DistrictEntry> = self
            .districts
            .iter()
            .filter(|d| edit_distance(&normalize_name(&d.name), &key) <= max_distance)
            .collect();
        match close.as_slice() {
            [d] => Some(*d),
            _ => None,
        }
    }

    /// The canonical name of a region, if the line names one.
    pub fn region_named(&self, name: &str) -> Option<&str> {
        let key = normalize_name(name);
        let key = key.strip_suffix(" region").unwrap_or(&key);
        self.districts
            .iter()
            .filter_map(|d| d.region.as_deref())
            .find(|r| normalize_name(r) == key)
    }

    pub fn constituency(&self, district_code: &str, code: &str) -> Option<&ConstituencyEntry> {
        self.find_constituency(code)
            .filter(|(d, _)| d.code == district_code)
            .map(|(_, c)| c)
    }

    /// Constituency codes are unique for a year: returns the constituency and
    /// the district it belongs to.
    pub fn find_constituency(&self, code: &str) -> Option<(&DistrictEntry, &ConstituencyEntry)> {
        let (didx, cidx) = self.constituency_index.get(code)?;
        let d = self.districts.get(*didx)?;
        let c = d.constituencies.get(*cidx)?;
        Some((d, c))
    }

    /// All the constituencies whose name is within `max_distance` of the given name.
    pub fn constituencies_named(
        &self,
        name: &str,
        max_distance: usize,
    ) -> Vec<(&DistrictEntry, &ConstituencyEntry)> {
        let key = normalize_name(name);
        if key.is_empty() {
            return Vec::new();
        }
        self.districts
            .iter()
            .flat_map(|d| d.constituencies.iter().map(move |c| (d, c)))
            .filter(|(_, c)| edit_distance(&normalize_name(&c.name), &key) <= max_distance)
            .collect()
    }

    pub fn parties(&self) -> &[PartyEntry] {
        &self.parties
    }

    /// A canonical party code of the year, or `IND`.
    pub fn is_valid_party(&self, code: &str) -> bool {
        code == INDEPENDENT || self.parties.iter().any(|p| p.code == code)
    }

    /// Looks up a party key (see [`party_key`]) among the canonical codes and
    /// the party names.
    pub fn canonical_party(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        if key == INDEPENDENT {
            return Some(INDEPENDENT);
        }
        self.parties
            .iter()
            .find(|p| party_key(&p.code) == key || party_key(&p.name) == key)
            .map(|p| p.code.as_str())
    }

    pub fn party_alias(&self, key: &str) -> Option<&str> {
        self.party_aliases.get(key).map(|s| s.as_str())
    }

    pub fn candidates(&self, race: RaceType) -> impl Iterator<Item = &CandidateEntry> {
        self.candidates.iter().filter(move |c| c.race == race)
    }

    pub fn candidate(&self, race: RaceType, code: &str) -> Option<&CandidateEntry> {
        self.candidates(race).find(|c| c.code == code)
    }

    pub fn candidate_alias(&self, raw: &str) -> Option<&str> {
        self.candidate_aliases
            .get(&candidate_key(raw))
            .map(|s| s.as_str())
    }

    /// The party a candidate is registered with, if any.
    pub fn registered_party(&self, race: RaceType, candidate_code: &str) -> Option<&str> {
        self.candidate(race, candidate_code)
            .and_then(|c| c.party.as_deref())
    }
}

/// All the loaded years.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    years: BTreeMap<ElectionYear, YearTables>,
}

impl ReferenceTables {
    pub fn new() -> ReferenceTables {
        ReferenceTables::default()
    }

    pub fn insert(&mut self, tables: YearTables) {
        self.years.insert(tables.year(), tables);
    }

    pub fn years(&self) -> Vec<ElectionYear> {
        self.years.keys().cloned().collect()
    }

    pub fn for_year(&self, year: ElectionYear) -> Result<&YearTables, ExtractionError> {
        self.years
            .get(&year)
            .ok_or(ExtractionError::MissingTables(year.value()))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn supported_years() {
        assert!(ElectionYear::new(2019).is_ok());
        assert_eq!(
            ElectionYear::new(2018),
            Err(ExtractionError::UnsupportedYear(2018))
        );
        let y: Result<ElectionYear, _> = serde_json::from_str("2024");
        assert!(y.is_err());
        let y: ElectionYear = serde_json::from_str("2025").unwrap();
        assert_eq!(y.value(), 2025);
    }

    #[test]
    fn missing_year_is_fatal() {
        let rt = reference_2019();
        let y = ElectionYear::new(2014).unwrap();
        assert_eq!(
            rt.for_year(y).err(),
            Some(ExtractionError::MissingTables(2014))
        );
    }

    #[test]
    fn lookups() {
        let t = tables_2019();
        assert_eq!(t.district_by_name("CHITIPA", 1).map(|d| d.code.as_str()), Some("CT"));
        assert_eq!(t.district_by_name("Karongo", 1).map(|d| d.code.as_str()), Some("KA"));
        assert!(t.district_by_name("Karongo", 0).is_none());
        assert!(t.district_by_name("Mzimba", 1).is_none());
        assert_eq!(t.region_named("Central Region"), Some("Central"));
        assert!(t.region_named("Chitipa").is_none());

        let (d, c) = t.find_constituency("009").unwrap();
        assert_eq!(d.code, "KA");
        assert_eq!(c.name, "Karonga Central");
        assert!(t.constituency("CT", "009").is_none());
        assert!(t.constituency("CT", "005").unwrap().is_legacy);
        assert_eq!(t.constituencies_named("Chitipa Centrl", 2).len(), 1);
    }

    #[test]
    fn party_lookups() {
        let t = tables_2019();
        assert_eq!(t.canonical_party("MCP"), Some("MCP"));
        assert_eq!(
            t.canonical_party(&party_key("Malawi Congress Party")),
            Some("MCP")
        );
        assert_eq!(t.party_alias("DDP"), Some("DPP"));
        assert_eq!(t.party_alias("INDEPENDENT"), Some("IND"));
        assert!(t.is_valid_party("IND"));
        assert!(!t.is_valid_party("XYZ"));
        assert_eq!(t.registered_party(RaceType::Parliamentary, "MKANDA"), Some("MCP"));
        assert_eq!(t.candidate_alias("chimwa"), Some("CHIMPO"));
    }

    #[test]
    fn inconsistent_tables_are_rejected() {
        let y = ElectionYear::new(2019).unwrap();
        let bad_alias = vec![AliasEntry {
            kind: AliasKind::Party,
            raw: "MPC".to_string(),
            canonical: "XYZ".to_string(),
        }];
        let res = YearTables::new(y, administration(), candidates(), parties(), bad_alias);
        assert!(matches!(res, Err(ExtractionError::InvalidTables(_))));

        let mut admin = administration();
        admin.districts[1].constituencies.push(ConstituencyEntry {
            code: "001".to_string(),
            name: "Copy".to_string(),
            is_legacy: false,
        });
        let res = YearTables::new(y, admin, candidates(), parties(), Vec::new());
        assert!(matches!(res, Err(ExtractionError::InvalidTables(_))));

        let mut cands = candidates();
        cands[0].party = Some("ZZZ".to_string());
        let res = YearTables::new(y, administration(), cands, parties(), Vec::new());
        assert!(matches!(res, Err(ExtractionError::InvalidTables(_))));
    }

    #[test]
    fn tables_read_from_json() {
        let js = serde_json::json!({
            "districts": [
                {"code": "CT", "name": "Chitipa", "constituencies": [
                    {"code": "001", "name": "Chitipa East"},
                    {"code": "005", "name": "Chitipa Wenya", "isLegacy": true}
                ]}
            ]
        });
        let admin: Administration = serde_json::from_value(js).unwrap();
        assert!(!admin.districts[0].constituencies[0].is_legacy);
        assert!(admin.districts[0].constituencies[1].is_legacy);
    }
}
