use std::path::{Path, PathBuf};

use serde_json::Value as JSValue;

use crate::extract::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Paths in a configuration file are relative to the directory of that file.
pub fn resolve_path(root: &Path, path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        return path.to_string();
    }
    let full: PathBuf = [root, p].iter().collect();
    full.as_path().display().to_string()
}

pub fn write_json(path: &Path, js: &JSValue) -> BExtractResult<()> {
    let path_s = path.display().to_string();
    let pretty = serde_json::to_string_pretty(js).context(ParsingJsonSnafu { path: &path_s })?;
    fs::write(path, pretty + "\n").context(WritingSnafu { path: path_s })?;
    Ok(())
}
