// Reading of the reference tables.
//
// Layout of a tables directory:
//   <dir>/<year>/administration.json
//   <dir>/<year>/candidates.json
//   <dir>/<year>/parties.json
//   <dir>/<year>/aliases.csv (optional, columns kind,raw,canonical)

use std::path::Path;

use serde::de::DeserializeOwned;

use district_results::reference::{
    AliasEntry, Administration, CandidateEntry, PartyEntry, YearTables,
};

use crate::extract::*;

fn read_json_file<T: DeserializeOwned>(path: &Path) -> BExtractResult<T> {
    let path_s = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: &path_s })?;
    let res: T = serde_json::from_str(&contents).context(ParsingJsonSnafu { path: path_s })?;
    Ok(res)
}

pub fn read_aliases_csv(path: &Path) -> BExtractResult<Vec<AliasEntry>> {
    let path_s = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path: &path_s })?;
    let mut res: Vec<AliasEntry> = Vec::new();
    for (idx, rec) in rdr.deserialize::<AliasEntry>().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let entry = rec.context(CsvLineParseSnafu {
            path: &path_s,
            lineno,
        })?;
        debug!("read_aliases_csv: lineno: {:?} entry: {:?}", lineno, entry);
        res.push(entry);
    }
    Ok(res)
}

pub fn read_year_tables(dir: &Path, year: ElectionYear) -> BExtractResult<YearTables> {
    let year_dir = dir.join(year.to_string());
    info!("Attempting to read reference tables in {:?}", year_dir);
    let administration: Administration = read_json_file(&year_dir.join("administration.json"))?;
    let candidates: Vec<CandidateEntry> = read_json_file(&year_dir.join("candidates.json"))?;
    let parties: Vec<PartyEntry> = read_json_file(&year_dir.join("parties.json"))?;
    let aliases_p = year_dir.join("aliases.csv");
    let aliases = if aliases_p.exists() {
        read_aliases_csv(&aliases_p)?
    } else {
        Vec::new()
    };
    info!(
        "read_year_tables: {}: {} districts, {} candidates, {} parties, {} extra aliases",
        year,
        administration.districts.len(),
        candidates.len(),
        parties.len(),
        aliases.len()
    );
    let tables = YearTables::new(year, administration, candidates, parties, aliases).context(
        TablesSnafu {
            path: year_dir.display().to_string(),
        },
    )?;
    Ok(tables)
}

pub fn read_reference_tables(dir: &Path, years: &[ElectionYear]) -> BExtractResult<ReferenceTables> {
    let mut tables = ReferenceTables::new();
    for year in years.iter() {
        tables.insert(read_year_tables(dir, *year)?);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_test_tables() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/tables");
        let year = ElectionYear::new(2019).unwrap();
        let tables = read_year_tables(&dir, year).unwrap();
        assert!(tables.district("CT").is_some());
        assert_eq!(tables.candidate_alias("Grace Chimwale"), Some("CHIMPO"));
        assert_eq!(tables.party_alias("PDM"), Some("PDP"));
    }

    #[test]
    fn missing_year() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/tables");
        let year = ElectionYear::new(2025).unwrap();
        assert!(read_year_tables(&dir, year).is_err());
    }
}
