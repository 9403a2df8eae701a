/*!

This is the long-form manual for `district_results` and `rxtract`.

## Source documents

A source document is the UTF-8 text extracted from the scanned result sheets
of one district (or of several districts), one physical line per line. Two
layouts are understood, and they may be mixed in the same document.

### Polling station sheets

Each block of results is preceded by the administrative context of the
polling station, and followed by its totals:

```text
Northern
Region 1Chitipa 01 Chitipa East 001 Iponjola 0001 Chanya School 01010 Station 1
1 GRACE CHIMPONDO DPP 250
2 ELLEN MWAKASUNGULA UTM 1,020
Total No. of Null and Void Votes 7
Total No. of Votes 1277Chitipa Central 003 Yamba 0006 Chimwemwe School
Station 1
JOHN BANDA DDP 120
```

The text extraction commonly:
- splits the context over several lines (ward, centre and station alone on a line)
- glues the context of the next block at the end of a totals line
- glues the region number to the district name (`Region 1Chitipa`)
- drops or misspells the constituency name, keeping its code

All of these are handled. Misspelt constituency and district names are
matched within `max_constituency_name_distance` (default 2) and
`max_district_name_distance` (default 1) edits. A context naming a
constituency that is not in the reference tables clears the current
constituency: the vote lines that follow are dropped with a `PARSE_ERROR`
diagnostic until a known constituency shows up.

### Constituency result sheets

Used mostly for the presidential race:

```text
Karonga 02
Karonga Central Constituency Results
ARTHUR PETER MUTHARIKA (DPP) Votes: 1,234
LAZARUS CHAKWERA (MCP) Votes: 2345
Null and Void Votes 12
```

### Vote lines

A vote line is a candidate name, a party and a count, with an optional rank
number in front: `3 AGNES NYIRENDA MCP 99` or `AGNES NYIRENDA (MCP) Votes: 99`.
Counts may use thousands separators. Negative or decimal counts are parse
errors. A count above `max_unit_votes` (default 100 000) is most likely
several numbers glued together: only its first `truncate_digits` digits
(default 3) are kept, with a `HIGH_VOTES` diagnostic.

## Reference tables

The reference tables live in one directory per election year (2014, 2019,
2020 or 2025):

- `administration.json`: the districts and their constituencies.
  ```json
  {"districts": [{"code": "CT", "name": "Chitipa", "number": "01", "region": "Northern",
     "constituencies": [{"code": "001", "name": "Chitipa East"},
                        {"code": "005", "name": "Chitipa Wenya", "isLegacy": true}]}]}
  ```
  Constituency codes are unique for a year. Legacy constituencies come from a
  previous boundary scheme: they are accepted and flagged, never remapped.
- `candidates.json`: the candidates of both races.
  ```json
  [{"code": "CHIMPO", "fullname": "Grace Chimpondo", "race": "parliamentary",
    "party": "DPP", "constituencies": ["001"], "aliases": ["CHIMWA"]}]
  ```
  Presidential candidates have no constituencies: they run everywhere.
- `parties.json`: the parties, with the misspellings seen in the documents.
  ```json
  [{"code": "DPP", "name": "Democratic Progressive Party", "aliases": ["DDP"]}]
  ```
  `IND` (independent) is always valid and may not be redefined.
- `aliases.csv` (optional): extra aliases, one per line, with the header
  `kind,raw,canonical` where `kind` is `candidate` or `party`.

## Codes

Candidate codes are derived from the printed name: the surname, upper-cased,
letters only, first 6 letters, padded with `X` (`John Banda` gives `BANDAX`).
A derived code that is not in the tables is corrected with, in order: the
aliases, then the nearest code among the candidates of the same constituency
(at most `max_edit_distance` edits, default 2). Ties are never guessed.

Party tokens are matched on their letters only (`5DPP` gives `DPP`), then on
the aliases. Tokens that cannot be matched are replaced by `IND`. When they
look like OCR artifacts (digits, names of places and institutions) an
`UNKNOWN_PARTY` diagnostic is raised, otherwise a `PARTY_CODE` one.

## Output

One document per district:

```json
{"districtCode": "CT", "type": "parliamentary", "nullVotes": 7,
 "constituencies": [{"code": "001", "isLegacy": false,
   "candidates": [{"candidateCode": "CHIMPO", "partyCode": "DPP", "votes": 290}]}]}
```

Each constituency appears once, and each (candidate, party) pair appears once
per constituency: repeated entries are summed with a `MERGED_DUPLICATE`
diagnostic.

`rxtract --fix` applies the same rules to a document written earlier:
constituencies of other districts are dropped, unknown candidate and party
codes are resolved again, counts above `max_unit_votes` are truncated and the
duplicates are merged.

## Validation

The report of a district holds everything found while extracting it, then
the checks of its final document. Errors (`INTEGRITY_ERROR`,
`DUPLICATE_CONSTITUENCY`) make a district not production-ready. The documents
are written anyway. The checks raise these warnings:

- `UNKNOWN_CANDIDATE`: the candidate code is not in the tables
- `PARTY_CODE`: the candidate is reported under another party than the
  registered one
- `SUSPICIOUS_VOTES`: an aggregated count above `suspicious_total` (default 50 000)
- `COVERAGE`: a district without data, a constituency without candidates, a
  constituency of the tables missing from the district

## Configuration

`rxtract` accepts a run configuration in JSON:

```json
{
  "outputSettings": {"outputDirectory": "output", "correctionLogSamples": 10},
  "referenceTables": "tables",
  "year": 2019,
  "race": "parliamentary",
  "sources": [{"filePath": "chitipa.txt", "districtCode": "CT"}],
  "rules": {"maxEditDistance": 2, "maxConstituencyNameDistance": 2,
            "maxDistrictNameDistance": 1, "maxUnitVotes": 100000, "truncateDigits": 3,
            "suspiciousTotal": 50000, "partyDenylist": ["MISSION"]}
}
```

Paths are relative to the configuration file. Numbers may also be given as
strings. All the sources are processed in parallel: a document that cannot be
processed (empty, unreadable) is reported and does not stop the others.

The output directory receives one `<district>_RESULTS.json` file per district
and a `correction_log.json` file with, for each document, its SHA-256, the
diagnostics grouped by category with the first samples of each, and the
validation status of its districts.

 */
