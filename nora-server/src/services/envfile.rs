//! Idempotent `KEY=VALUE` editing of `.env` files.
//!
//! [`upsert`] replaces the first assignment of each key in place, drops
//! later duplicates of that key, keeps comments and unrelated lines, and
//! appends keys that were not present. Running it twice with the same input
//! leaves the file unchanged.
//!
//! Reading goes through `dotenv`, the same parser that loads the file at
//! startup, so whatever is written here is read back verbatim.

use std::collections::HashSet;
use std::io;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub updated: Vec<String>,
    pub added: Vec<String>,
    pub removed_duplicates: usize,
}

/// Key of an assignment line, ignoring an optional `export ` prefix.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, _) = trimmed.split_once('=')?;
    let key = key.trim();
    is_valid_key(key).then_some(key)
}

pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_bare(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@' | '+' | ',' | '%' | '~' | '=')
}

/// Quote and escape `value` for a double-quoted dotenv value when needed.
/// Newlines become `\n` so every assignment stays on one line.
fn render_value(value: &str) -> String {
    if value.chars().all(is_bare) {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn latest<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    // Last value wins when a key is passed twice.
    pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Apply `pairs` to the file text and return the new text.
pub fn upsert_str(existing: &str, pairs: &[(String, String)]) -> (String, UpsertReport) {
    let mut report = UpsertReport::default();
    let mut written: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for line in existing.lines() {
        let Some((key, value)) = line_key(line).and_then(|k| latest(pairs, k).map(|v| (k, v))) else {
            out.push(line.to_owned());
            continue;
        };
        if written.insert(key.to_owned()) {
            out.push(format!("{key}={}", render_value(value)));
            report.updated.push(key.to_owned());
        } else {
            report.removed_duplicates += 1;
        }
    }

    for (key, _) in pairs {
        if !written.insert(key.clone()) {
            continue;
        }
        let value = latest(pairs, key).unwrap_or_default();
        out.push(format!("{key}={}", render_value(value)));
        report.added.push(key.clone());
    }

    let mut text = out.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    (text, report)
}

/// Upsert `pairs` into the file at `path`, creating it when missing.
pub fn upsert(path: &Path, pairs: &[(String, String)]) -> io::Result<UpsertReport> {
    if let Some((bad, _)) = pairs.iter().find(|(k, _)| !is_valid_key(k)) {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("invalid key '{bad}'")));
    }
    if let Some((key, _)) = pairs.iter().find(|(_, v)| v.chars().any(|c| c == '\r' || c == '\0')) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("value of '{key}' contains a carriage return or NUL"),
        ));
    }
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let (text, report) = upsert_str(&existing, pairs);
    if text != existing {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("env.tmp");
        std::fs::write(&tmp, &text)?;
        std::fs::rename(&tmp, path)?;
    }
    Ok(report)
}

/// Assignments in file order; the first occurrence of a key wins, as it
/// does when the file is loaded into the environment.
pub fn parse(path: &Path) -> io::Result<Vec<(String, String)>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in dotenv::from_path_iter(path).map_err(into_io)? {
        let (key, value) = item.map_err(into_io)?;
        if seen.insert(key.clone()) {
            out.push((key, value));
        }
    }
    Ok(out)
}

fn into_io(e: dotenv::Error) -> io::Error {
    match e {
        dotenv::Error::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

/// Parse a command-line `KEY=VALUE` argument.
pub fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{arg}'"))?;
    let key = key.trim();
    if !is_valid_key(key) {
        return Err(format!("invalid key '{key}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
