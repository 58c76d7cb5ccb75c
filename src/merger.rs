// src/merger.rs

//! Schema Merger (§4.5): concatenates an ordered list of schema files into
//! one text buffer and records a line→(file, line) map for error
//! attribution.
//!
//! **Separator policy (§9, resolved in SPEC_FULL.md §D.1):** the merger
//! inserts exactly one blank separator line between consecutive files (none
//! before the first file or after the last) and does **not** map that
//! separator line to any source location. A parser error landing exactly on
//! a separator is treated as a miss by `attribution::attribute` and falls
//! through to its nearest-neighbor search.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Maps a 1-indexed line number in the merged text back to its origin.
pub type SourceLineMap = HashMap<usize, (String, usize)>;

/// The result of merging: the concatenated text and its line map.
pub struct MergedSchema {
    pub text: String,
    pub source_map: SourceLineMap,
}

/// Reject trivially unusable input sets before merging.
pub fn validate(files: &[(String, String)]) -> Result<()> {
    if files.is_empty() {
        return Err(Error::SchemaMerge("no schema files provided".into()));
    }
    Ok(())
}

/// Concatenate `files` (in the given order) into one buffer, recording a
/// source-line map for every line that originates from a file (never for
/// the inter-file blank separators).
pub fn merge(files: &[(String, String)]) -> Result<MergedSchema> {
    validate(files)?;

    let mut text = String::new();
    let mut source_map = SourceLineMap::new();
    let mut merged_line = 1usize;

    for (index, (filename, content)) in files.iter().enumerate() {
        if index > 0 {
            text.push('\n');
            merged_line += 1; // unmapped separator line
        }

        for (i, line) in content.lines().enumerate() {
            text.push_str(line);
            text.push('\n');
            source_map.insert(merged_line, (filename.clone(), i + 1));
            merged_line += 1;
        }
    }

    Ok(MergedSchema { text, source_map })
}
