// src/schema_source.rs

//! The schema parser/type-checker and SQL/DDL generator are explicitly out
//! of scope for this crate (§1): they are consumed as pure functions
//! `schemaText → (AST|ParseError)` and `AST → DDL`. This module defines the
//! seam — `SchemaParser`/`DdlGenerator` traits — the same way the teacher's
//! `packages::traits::PackageFormat` is the seam for independently
//! maintained RPM/DEB/Arch parsers, plus a minimal passthrough
//! implementation used by tests and as the crate's default when no richer
//! parser is wired in.

/// The parsed representation of a merged schema. Opaque from this crate's
/// point of view — the actual AST lives in the external parser/type-checker.
#[derive(Debug, Clone)]
pub struct ParsedSchema {
    pub source: String,
}

/// A parse failure from the external parser. `line` is 1-indexed into the
/// merged text when known.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub snippet: Option<String>,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

pub trait SchemaParser {
    fn parse(&self, merged_text: &str) -> Result<ParsedSchema, ParseFailure>;
}

pub trait DdlGenerator {
    fn generate(&self, schema: &ParsedSchema) -> String;
}

/// Accepts any non-empty merged text as-is. Rejects an empty buffer with a
/// `line 1` failure so the Orchestrator's error-attribution path has
/// something exercisable without a real type-checker wired in. Recognizes
/// one test sentinel, `!!PARSE_ERROR!!`, on its own line, to let
/// integration tests simulate a rejected schema deterministically.
pub struct PassthroughParser;

impl SchemaParser for PassthroughParser {
    fn parse(&self, merged_text: &str) -> Result<ParsedSchema, ParseFailure> {
        if merged_text.trim().is_empty() {
            return Err(ParseFailure {
                message: "empty schema".to_string(),
                line: Some(1),
                column: None,
                snippet: None,
                suggestion: Some("add at least one entity declaration".to_string()),
            });
        }

        for (i, line) in merged_text.lines().enumerate() {
            if line.trim() == "!!PARSE_ERROR!!" {
                return Err(ParseFailure {
                    message: "simulated parse failure".to_string(),
                    line: Some(i + 1),
                    column: Some(1),
                    snippet: Some(line.to_string()),
                    suggestion: None,
                });
            }
        }

        Ok(ParsedSchema {
            source: merged_text.to_string(),
        })
    }
}

/// Emits a no-op DDL batch wrapping the schema source as a comment. A real
/// generator produces `CREATE TABLE`/`ALTER TABLE` statements from the AST;
/// this crate's CORE only needs the batch to exist and be executable.
pub struct PassthroughDdlGenerator;

impl DdlGenerator for PassthroughDdlGenerator {
    fn generate(&self, schema: &ParsedSchema) -> String {
        let mut sql = String::from("-- chameleon generated migration\n");
        for line in schema.source.lines() {
            sql.push_str("-- ");
            sql.push_str(line);
            sql.push('\n');
        }
        sql.push_str("SELECT 1;\n");
        sql
    }
}
