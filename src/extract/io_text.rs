// Reading of the source documents.

use crate::extract::*;

/// A source document, split in lines.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SourceDocument {
    pub path: String,
    pub lines: Vec<RawLine>,
    /// SHA-256 of the contents, recorded in the correction log.
    pub fingerprint: String,
}

pub fn read_source(path: &str) -> BExtractResult<SourceDocument> {
    let contents = fs::read_to_string(path).context(OpeningSourceSnafu { path })?;
    let fingerprint = sha256::digest(contents.as_str());
    let lines = RawLine::from_text(&contents);
    debug!(
        "read_source: {}: {} lines, sha256 {}",
        path,
        lines.len(),
        fingerprint
    );
    Ok(SourceDocument {
        path: path.to_string(),
        lines,
        fingerprint,
    })
}
