// src/attribution.rs

//! Error Attribution (§4.6): maps a parser error's line number back to the
//! original source file via the merger's `SourceLineMap`. Pure; no I/O.

use crate::merger::SourceLineMap;

const SEARCH_RADIUS: i64 = 5;

/// Extract the first line number a parser error string mentions, trying a
/// small set of common diagnostic patterns in order:
/// `line N`, `--> file:N:C`, and `N │` (a left-gutter line number).
fn extract_line_number(message: &str) -> Option<usize> {
    if let Some(n) = extract_after_keyword(message, "line") {
        return Some(n);
    }
    if let Some(n) = extract_arrow_location(message) {
        return Some(n);
    }
    if let Some(n) = extract_gutter_number(message) {
        return Some(n);
    }
    None
}

/// `... line 42 ...` (case-insensitive keyword, first run of digits after it).
fn extract_after_keyword(message: &str, keyword: &str) -> Option<usize> {
    let lower = message.to_lowercase();
    let idx = lower.find(keyword)?;
    let rest = &message[idx + keyword.len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// `--> file:N:C` (rustc-style location arrow).
fn extract_arrow_location(message: &str) -> Option<usize> {
    let idx = message.find("-->")?;
    let rest = &message[idx + 3..];
    let rest = rest.trim_start();
    let mut parts = rest.split(':');
    let _file = parts.next()?;
    let line: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    line.parse().ok()
}

/// `  42 │ some source line` (a left-gutter line number in a source snippet).
fn extract_gutter_number(message: &str) -> Option<usize> {
    for line in message.lines() {
        if let Some(idx) = line.find('│').or_else(|| line.find('|')) {
            let digits: String = line[..idx]
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let digits: String = digits.chars().rev().collect();
            if let Ok(n) = digits.parse() {
                return Some(n);
            }
        }
    }
    None
}

/// Given a parser error string and the merger's source-line map, produce a
/// human string `"Error in <file>:<line>"`. On an exact miss (commonly the
/// unmapped blank separator line, see `merger`'s documented policy), search
/// outward up to `SEARCH_RADIUS` lines and apply the offset to the reported
/// line. Returns an empty string if nothing in the message matches any
/// known pattern.
pub fn attribute(message: &str, source_map: &SourceLineMap) -> String {
    let Some(line) = extract_line_number(message) else {
        return String::new();
    };

    if let Some((file, src_line)) = source_map.get(&line) {
        return format!("Error in {file}:{src_line}");
    }

    for offset in 1..=SEARCH_RADIUS {
        for candidate in [line as i64 - offset, line as i64 + offset] {
            if candidate < 1 {
                continue;
            }
            if let Some((file, src_line)) = source_map.get(&(candidate as usize)) {
                return format!("Error in {file}:{src_line}");
            }
        }
    }

    String::new()
}
