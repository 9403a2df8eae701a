use log::{debug, info, warn};

use district_results::dedup::fix_district;
use district_results::validate::validate_json;
use district_results::{
    extract_document, CorrectionLog, Diagnostic, DistrictOutcome, ElectionYear, Extraction,
    ExtractionError, ExtractionRules, RaceType, RawLine, ReferenceTables, ValidationReport,
};
use rayon::prelude::*;
use snafu::{prelude::*, ErrorCompat, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::extract::config_reader::*;
use crate::extract::io_common::*;
use crate::extract::io_tables::read_reference_tables;
use crate::extract::io_text::read_source;

mod config_reader;
mod io_common;
mod io_tables;
mod io_text;

#[derive(Debug, Snafu)]
pub enum ExtractError {
    #[snafu(display("Error opening source document {path}"))]
    OpeningSource {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening JSON file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Expected a non-negative integer for {field}"))]
    ParsingJsonNumber { field: String },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}: {source}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("{path}: {source}"))]
    Extraction {
        source: ExtractionError,
        path: String,
    },
    #[snafu(display("Error loading the reference tables in {path}: {source}"))]
    Tables {
        source: ExtractionError,
        path: String,
    },
    #[snafu(display("Invalid setting {setting}: {source}"))]
    InvalidSetting {
        source: ExtractionError,
        setting: String,
    },
    #[snafu(display("Cannot find the parent directory of {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Error writing {path}"))]
    Writing {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

type ExtractResult<T> = Result<T, ExtractError>;
type BExtractResult<T> = Result<T, Box<ExtractError>>;

fn unbox<T>(r: BExtractResult<T>) -> ExtractResult<T> {
    r.map_err(|e| *e)
}

/// Everything needed to run the extraction over a batch of documents, after
/// merging the configuration file and the command line.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub tables_dir: String,
    pub year: ElectionYear,
    pub race: RaceType,
    pub sources: Vec<FileSource>,
    pub rules: ExtractionRules,
    /// A directory, 'stdout' or nothing.
    pub output: Option<String>,
    pub reference: Option<String>,
}

/// The outcome of one source document. A failed document does not stop the
/// others.
#[derive(Debug)]
struct DocumentOutcome {
    source: String,
    fingerprint: Option<String>,
    extraction: ExtractResult<Extraction>,
}

fn read_plan(config_path: &str) -> ExtractResult<RunPlan> {
    let config = unbox(read_run_config(config_path))?;
    let config_p = Path::new(config_path);
    let root_p = config_p
        .parent()
        .context(MissingParentDirSnafu { path: config_path })?;
    let sources = config
        .sources
        .iter()
        .map(|s| FileSource {
            file_path: resolve_path(root_p, &s.file_path),
            district_code: s.district_code.clone(),
        })
        .collect();
    Ok(RunPlan {
        tables_dir: resolve_path(root_p, &config.reference_tables),
        year: config.year()?,
        race: config.race()?,
        sources,
        rules: config.extraction_rules()?,
        output: config
            .output_settings
            .output_directory
            .as_ref()
            .map(|d| if d == "stdout" { d.clone() } else { resolve_path(root_p, d) }),
        reference: None,
    })
}

fn make_plan(args: &Args) -> ExtractResult<RunPlan> {
    let mut plan = match &args.config {
        Some(config_path) => read_plan(config_path)?,
        None => {
            let tables_dir = match &args.tables {
                Some(t) => t.clone(),
                None => whatever!("Option --tables is required when --config is not provided"),
            };
            let year = match args.year {
                Some(y) => ElectionYear::new(y).context(InvalidSettingSnafu { setting: "year" })?,
                None => whatever!("Option --year is required when --config is not provided"),
            };
            RunPlan {
                tables_dir,
                year,
                race: RaceType::Parliamentary,
                sources: Vec::new(),
                rules: ExtractionRules::DEFAULT_RULES,
                output: None,
                reference: None,
            }
        }
    };

    if let Some(t) = &args.tables {
        plan.tables_dir = t.clone();
    }
    if let Some(y) = args.year {
        plan.year = ElectionYear::new(y).context(InvalidSettingSnafu { setting: "year" })?;
    }
    if let Some(r) = &args.race {
        plan.race = r
            .parse::<RaceType>()
            .context(InvalidSettingSnafu { setting: "race" })?;
    }
    if let Some(input) = &args.input {
        plan.sources = vec![FileSource {
            file_path: input.clone(),
            district_code: args.district.clone(),
        }];
    }
    if args.out.is_some() {
        plan.output = args.out.clone();
    }
    if args.reference.is_some() {
        plan.reference = args.reference.clone();
    }
    debug!("make_plan: {:?}", plan);
    Ok(plan)
}

fn process_source(source: &FileSource, tables: &ReferenceTables, plan: &RunPlan) -> DocumentOutcome {
    let name = simplify_file_name(&source.file_path);
    info!("Attempting to read source document {:?}", source.file_path);
    let doc = match read_source(&source.file_path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("process_source: {}: {}", name, e);
            return DocumentOutcome {
                source: name,
                fingerprint: None,
                extraction: Err(*e),
            };
        }
    };
    let extraction = run_document(&doc.lines, tables, plan, source.district_code.as_deref())
        .context(ExtractionSnafu { path: &name });
    match &extraction {
        Ok(ext) => info!(
            "process_source: {}: {} districts, {} diagnostics",
            name,
            ext.districts.len(),
            ext.diagnostics.len()
        ),
        Err(e) => warn!("process_source: {}", e),
    }
    DocumentOutcome {
        source: name,
        fingerprint: Some(doc.fingerprint),
        extraction,
    }
}

fn run_document(
    lines: &[RawLine],
    tables: &ReferenceTables,
    plan: &RunPlan,
    district: Option<&str>,
) -> Result<Extraction, ExtractionError> {
    extract_document(lines, tables, plan.year, plan.race, district, &plan.rules)
}

fn report_js(outcome: &DistrictOutcome) -> JSValue {
    let strings = |diags: &[Diagnostic]| -> Vec<String> { diags.iter().map(|d| d.to_string()).collect() };
    json!({
        "districtCode": outcome.result.district_code,
        "productionReady": outcome.report.is_production_ready(),
        "errors": strings(&outcome.report.errors),
        "warnings": strings(&outcome.report.warnings),
    })
}

fn build_summary_js(plan: &RunPlan, outcomes: &[DocumentOutcome]) -> JSValue {
    let mut results: Vec<JSValue> = Vec::new();
    let mut statuses: Vec<JSValue> = Vec::new();
    let mut failures: Vec<JSValue> = Vec::new();
    for o in outcomes.iter() {
        match &o.extraction {
            Ok(ext) => {
                for d in ext.districts.iter() {
                    results.push(json!(d.result));
                    statuses.push(json!({
                        "districtCode": d.result.district_code,
                        "productionReady": d.report.is_production_ready(),
                        "errors": d.report.errors.len(),
                        "warnings": d.report.warnings.len(),
                    }));
                }
            }
            Err(e) => failures.push(json!({"source": o.source, "error": e.to_string()})),
        }
    }
    json!({
        "year": plan.year.value(),
        "race": plan.race,
        "results": results,
        "validation": statuses,
        "failures": failures,
    })
}

fn build_correction_log_js(plan: &RunPlan, outcomes: &[DocumentOutcome]) -> JSValue {
    let documents: Vec<JSValue> = outcomes
        .iter()
        .map(|o| match &o.extraction {
            Ok(ext) => json!({
                "source": o.source,
                "sha256": o.fingerprint,
                "corrections": ext.correction_log(plan.rules.sample_size),
                "districts": ext.districts.iter().map(report_js).collect::<Vec<JSValue>>(),
            }),
            Err(e) => json!({
                "source": o.source,
                "sha256": o.fingerprint,
                "error": e.to_string(),
            }),
        })
        .collect();
    json!({
        "year": plan.year.value(),
        "race": plan.race,
        "documents": documents,
    })
}

fn write_outputs(dir: &str, plan: &RunPlan, outcomes: &[DocumentOutcome]) -> ExtractResult<()> {
    let dir_p = PathBuf::from(dir);
    fs::create_dir_all(&dir_p).context(WritingSnafu { path: dir })?;
    let mut written: Vec<String> = Vec::new();
    for o in outcomes.iter() {
        if let Ok(ext) = &o.extraction {
            for d in ext.districts.iter() {
                let code = &d.result.district_code;
                if written.contains(code) {
                    warn!(
                        "write_outputs: district {} is produced by several documents, {} wins",
                        code, o.source
                    );
                } else {
                    written.push(code.clone());
                }
                let p = dir_p.join(format!("{}_RESULTS.json", code));
                info!("Writing {:?}", p);
                unbox(write_json(&p, &json!(d.result)))?;
            }
        }
    }
    let log_p = dir_p.join("correction_log.json");
    info!("Writing {:?}", log_p);
    unbox(write_json(&log_p, &build_correction_log_js(plan, outcomes)))
}

/// Runs a whole batch. Returns true if every document could be processed.
pub fn run_plan(plan: &RunPlan) -> ExtractResult<bool> {
    if plan.sources.is_empty() {
        whatever!("No source documents to process");
    }
    let tables = unbox(read_reference_tables(Path::new(&plan.tables_dir), &[plan.year]))?;

    let outcomes: Vec<DocumentOutcome> = plan
        .sources
        .par_iter()
        .map(|s| process_source(s, &tables, plan))
        .collect();

    let num_failed = outcomes.iter().filter(|o| o.extraction.is_err()).count();
    info!(
        "run_plan: {} documents, {} failed",
        outcomes.len(),
        num_failed
    );

    if let Some(dir) = plan.output.as_deref().filter(|d| *d != "stdout") {
        write_outputs(dir, plan, &outcomes)?;
    }

    let summary_js = build_summary_js(plan, &outcomes);
    let pretty_js_summary = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {
        path: "<summary>",
    })?;
    match plan.output.as_deref() {
        Some("stdout") | None => println!("{}", pretty_js_summary),
        Some(_) => debug!("summary:{}", pretty_js_summary),
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &plan.reference {
        let summary_ref = unbox(read_summary(summary_p))?;
        let pretty_js_summary_ref = serde_json::to_string_pretty(&summary_ref)
            .context(ParsingJsonSnafu { path: summary_p })?;
        if pretty_js_summary_ref != pretty_js_summary {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_summary.as_ref(),
                "\n",
            );
            whatever!("Difference detected between extracted summary and reference summary")
        }
    }

    Ok(num_failed == 0)
}

pub fn run_extraction(config_path: &str, reference_path: Option<String>) -> ExtractResult<bool> {
    let mut plan = read_plan(config_path)?;
    plan.reference = reference_path;
    run_plan(&plan)
}

fn read_district_file(path: &str) -> ExtractResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

fn print_report(path: &str, report: &ValidationReport) -> ExtractResult<()> {
    let js = json!({
        "file": simplify_file_name(path),
        "productionReady": report.is_production_ready(),
        "errors": report.errors.iter().map(|d| d.to_string()).collect::<Vec<String>>(),
        "warnings": report.warnings.iter().map(|d| d.to_string()).collect::<Vec<String>>(),
    });
    let pretty = serde_json::to_string_pretty(&js).context(ParsingJsonSnafu { path })?;
    println!("{}", pretty);
    Ok(())
}

/// Validates an existing district document. Returns true if it is production-ready.
pub fn run_validate(path: &str, plan: &RunPlan) -> ExtractResult<bool> {
    let tables = unbox(read_reference_tables(Path::new(&plan.tables_dir), &[plan.year]))?;
    let year_tables = tables
        .for_year(plan.year)
        .context(TablesSnafu { path: &plan.tables_dir })?;
    let js = read_district_file(path)?;
    let (doc, report) = validate_json(&js, year_tables, &plan.rules);
    info!(
        "run_validate: {}: {} errors, {} warnings",
        path,
        report.errors.len(),
        report.warnings.len()
    );
    print_report(path, &report)?;
    Ok(doc.is_some() && report.is_production_ready())
}

/// Applies the extraction rules to an existing district document (codes,
/// counts, constituencies, duplicates), rewrites it if anything changed and
/// validates the result.
pub fn run_fix(path: &str, plan: &RunPlan) -> ExtractResult<bool> {
    let tables = unbox(read_reference_tables(Path::new(&plan.tables_dir), &[plan.year]))?;
    let year_tables = tables
        .for_year(plan.year)
        .context(TablesSnafu { path: &plan.tables_dir })?;
    let js = read_district_file(path)?;
    let doc = match validate_json(&js, year_tables, &plan.rules) {
        (Some(doc), _) => doc,
        (None, report) => {
            warn!("run_fix: {} is not a district document, not touching it", path);
            print_report(path, &report)?;
            return Ok(false);
        }
    };

    let mut diags: Vec<Diagnostic> = Vec::new();
    let fixed = fix_district(&doc, year_tables, &plan.rules, &mut diags);
    let corrections = CorrectionLog::from_diagnostics(&diags, plan.rules.sample_size);
    if fixed != doc {
        info!("run_fix: {}: {} corrections, rewriting", path, diags.len());
        unbox(write_json(Path::new(path), &json!(fixed)))?;
    } else {
        info!("run_fix: {}: nothing to fix", path);
    }
    let pretty = serde_json::to_string_pretty(&json!({
        "file": simplify_file_name(path),
        "changed": fixed != doc,
        "corrections": corrections,
    }))
    .context(ParsingJsonSnafu { path })?;
    println!("{}", pretty);

    let report = district_results::validate::validate(&fixed, year_tables, &plan.rules);
    print_report(path, &report)?;
    Ok(report.is_production_ready())
}

pub fn run_cli(args: &Args) -> ExtractResult<bool> {
    let plan = make_plan(args)?;
    if let Some(path) = &args.validate {
        return run_validate(path, &plan);
    }
    if let Some(path) = &args.fix {
        return run_fix(path, &plan);
    }
    run_plan(&plan)
}

fn run_extraction_test(test_name: &str, config_lpath: &str, summary_lpath: &str) -> bool {
    let test_dir =
        option_env!("RXTRACT_TEST_DIR").unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"));
    info!("Running test {}", test_name);
    let res = run_extraction(
        &format!("{}/{}/{}", test_dir, test_name, config_lpath),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
    );
    match res {
        Ok(all_succeeded) => all_succeeded,
        Err(e) => {
            warn!("Error occured {:?}", e);
            eprintln!("An error occured {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            } else {
                eprintln!("No trace found");
            }
            panic!("test {} failed: {}", test_name, e);
        }
    }
}

/// Runs the case `tests/data/<name>/` and returns true if every document of
/// the case succeeded.
pub fn test_wrapper(test_name: &str) -> bool {
    run_extraction_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}
