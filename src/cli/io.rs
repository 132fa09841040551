//! JSON I/O handling for CLI
//!
//! - Output: one pretty-printed JSON document on stdout
//! - Files: UTF-8 JSON

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Parse a command-line JSON value
pub fn parse_value(text: &str) -> CliResult<Value> {
    serde_json::from_str(text)
        .map_err(|e| CliError::InvalidInput(format!("value is not valid JSON: {}", e)))
}

/// Render `value` as pretty JSON
pub fn render<T: Serialize>(value: &T) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Write `value` to stdout as pretty JSON
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let rendered = render(value)?;
    let mut stdout = io::stdout();
    writeln!(stdout, "{}", rendered)?;
    stdout.flush()?;
    Ok(())
}

/// Write `value` to `path` as pretty JSON
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> CliResult<()> {
    fs::write(path, render(value)?)
        .map_err(|e| CliError::Io(format!("failed to write {}: {}", path.display(), e)))
}

/// Read and deserialize a JSON file
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::InvalidInput(format!("{} is not valid: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("[1, 2]").unwrap(), json!([1, 2]));
        assert!(parse_value("not json").is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_json_file(&path, &json!({"a": 1})).unwrap();
        let back: Value = read_json_file(&path).unwrap();
        assert_eq!(back, json!({"a": 1}));
        assert!(read_json_file::<Value>(&dir.path().join("missing.json")).is_err());
    }
}
