use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::etl::*;

/// The file name of a path, used to name sources in the reports.
pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> EtlResult<T> {
    let p = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
    let res: T = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: p })?;
    Ok(res)
}

/// Creates the parent directory of an output file.
pub fn ensure_parent_dir(path: &Path) -> EtlResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(WritingFileSnafu {
                path: parent.display().to_string(),
            })?;
        }
    }
    Ok(())
}

pub fn write_text_file(path: &Path, contents: &str) -> EtlResult<()> {
    ensure_parent_dir(path)?;
    fs::write(path, contents).context(WritingFileSnafu {
        path: path.display().to_string(),
    })
}

/// A cell of a text-based source. Numbers are left as text and parsed
/// during normalization.
pub fn text_cell(s: &str) -> RawCell {
    if s.trim().is_empty() {
        RawCell::Empty
    } else {
        RawCell::Text(s.trim().to_string())
    }
}
