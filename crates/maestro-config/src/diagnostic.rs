// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment errors and validation failures become [`ConfigError`]s, rendered
//! through miette. Misspelled keys and definition identifiers get a
//! "did you mean" hint ranked by Jaro-Winkler similarity.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::Diagnostic;
use thiserror::Error;

/// Below this Jaro-Winkler score no correction is offered.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {}", table_name(section))]
    #[diagnostic(
        code(maestro::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// Dotted path of the enclosing table, empty at the top level.
        section: String,
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
    },

    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(maestro::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(maestro::config::missing_key),
        help("add `{key} = <value>` to your maestro.toml")
    )]
    MissingKey { key: String },

    /// A plugin configuration names a definition nobody declared.
    #[error("configuration {id} references unknown plugin definition `{definition}`")]
    #[diagnostic(
        code(maestro::config::unknown_definition),
        help("{}", with_hint(suggestion.as_deref(), "declare it in a [[definitions]] entry"))
    )]
    UnknownDefinition {
        id: u64,
        definition: String,
        suggestion: Option<String>,
    },

    #[error("validation error: {message}")]
    #[diagnostic(code(maestro::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(maestro::config::other))]
    Other(String),
}

fn table_name(section: &str) -> String {
    if section.is_empty() {
        "the top-level table".to_string()
    } else {
        format!("[{section}]")
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    with_hint(suggestion, &format!("expected one of: {valid_keys}"))
}

fn with_hint(suggestion: Option<&str>, rest: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? {rest}"),
        None => rest.to_string(),
    }
}

impl ConfigError {
    fn from_figment(error: &figment::error::Error) -> Self {
        use figment::error::Kind;

        let path = error.path.join(".");
        match &error.kind {
            Kind::UnknownField(field, expected) => ConfigError::UnknownKey {
                section: path,
                key: field.clone(),
                suggestion: suggest_key(field, expected),
                valid_keys: expected.join(", "),
            },
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.to_string(),
            },
            Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                key: path,
                detail: format!("found {actual}, expected {expected}"),
                expected: expected.clone(),
            },
            _ => ConfigError::Other(error.to_string()),
        }
    }
}

/// Split a figment error into one diagnostic per underlying failure.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    err.into_iter().map(|e| ConfigError::from_figment(&e)).collect()
}

/// The closest entry of `candidates`, if any is similar enough to `unknown`.
pub fn suggest_key(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|&c| (strsim::jaro_winkler(unknown, c), c))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}

/// Print `errors` to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}
