use clap::Parser;

/// This is a program that extracts per-district election results from the text
/// dumps of scanned result sheets.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A run configuration in JSON, listing the source documents and
    /// the reference tables. All the sources are processed in parallel.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A single source document, as extracted from a result sheet. Setting this
    /// option overrides the sources that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (directory) The directory of the reference tables, with one sub-directory per year.
    #[clap(short, long, value_parser)]
    pub tables: Option<String>,

    /// The election year. One of 2014, 2019, 2020, 2025.
    #[clap(short, long, value_parser)]
    pub year: Option<u16>,

    /// (default parliamentary) The race reported by the document: 'presidential' or 'parliamentary'.
    #[clap(long, value_parser)]
    pub race: Option<String>,

    /// (district code, optional) The district covered by the document, if known.
    #[clap(short, long, value_parser)]
    pub district: Option<String>,

    /// (directory, 'stdout' or empty) If specified, the district documents and the correction
    /// log are written to the given directory. Setting this option overrides the directory
    /// that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, rxtract will check that
    /// the extracted summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path) Validates an existing district document and prints its report.
    #[clap(long, value_parser)]
    pub validate: Option<String>,

    /// (file path) Applies the merge rules to an existing district document, rewrites it in
    /// place and prints the corrections.
    #[clap(long, value_parser)]
    pub fix: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
