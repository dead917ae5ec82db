//! Document formats and their decoders.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::value::{Map, Value};

/// Format tag carried by every [`crate::KeyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON document
    Json,
    /// YAML document
    Yaml,
    /// TOML document
    Toml,
    /// INI document
    Ini,
    /// Environment entries (`KEY=value` lines, or a single raw value)
    Env,
    /// Opaque bytes; decoded by nothing
    Raw,
}

impl Format {
    /// Infer the format from a file extension. Unknown extensions are raw.
    pub fn from_path(path: &Path) -> Format {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match ext.as_deref() {
            Some("json") => Format::Json,
            Some("yaml") | Some("yml") => Format::Yaml,
            Some("toml") => Format::Toml,
            Some("ini") | Some("cfg") | Some("conf") => Format::Ini,
            Some("env") => Format::Env,
            _ if name == ".env" => Format::Env,
            _ => Format::Raw,
        }
    }

    /// Extension-style name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
            Format::Ini => "ini",
            Format::Env => "env",
            Format::Raw => "raw",
        }
    }

    /// Decode a complete document into a tree.
    ///
    /// Returns `Ok(None)` for [`Format::Raw`], which no decoder handles.
    pub fn decode(&self, bytes: &[u8]) -> ConfigResult<Option<Value>> {
        let value = match self {
            Format::Json => serde_json::from_slice::<Value>(bytes).map_err(|e| self.invalid(e))?,
            Format::Yaml => {
                if is_blank(bytes) {
                    Value::empty_map()
                } else {
                    serde_yaml::from_slice::<Value>(bytes).map_err(|e| self.invalid(e))?
                }
            }
            Format::Toml => {
                let text = as_text(bytes)?;
                toml::from_str::<Value>(text).map_err(|e| self.invalid(e))?
            }
            Format::Ini => parse_ini(as_text(bytes)?)?,
            Format::Env => parse_dotenv(bytes)?,
            Format::Raw => return Ok(None),
        };
        Ok(Some(value))
    }

    fn invalid(&self, err: impl fmt::Display) -> ConfigError {
        ConfigError::ConfigInvalid(format!("{} document: {err}", self.as_str()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            "ini" => Ok(Format::Ini),
            "env" => Ok(Format::Env),
            "raw" | "" => Ok(Format::Raw),
            other => Err(ConfigError::ConfigInvalid(format!("unknown format '{other}'"))),
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn as_text(bytes: &[u8]) -> ConfigResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| ConfigError::ConfigInvalid(format!("document is not UTF-8: {e}")))
}

/// Map an environment-style key to path segments: `LOGGER_LEVEL` becomes
/// `["logger", "level"]`.
pub fn env_key_segments(key: &str) -> Vec<String> {
    key.split('_')
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Insert a raw string leaf at an environment-style key.
pub(crate) fn insert_env_entry(root: &mut Value, key: &str, raw: &str) {
    let segments = env_key_segments(key);
    if segments.is_empty() {
        return;
    }
    let refs: Vec<&str> = segments.iter().map(String::as_str).collect();
    root.merge(Value::nest(&refs, Value::String(raw.to_string())));
}

fn parse_dotenv(bytes: &[u8]) -> ConfigResult<Value> {
    let mut entries = dotenvy::from_read_iter(bytes)
        .collect::<Result<Vec<(String, String)>, _>>()
        .map_err(|e| Format::Env.invalid(e))?;
    // Sorted so that conflicting keys (`A=1`, `A_B=2`) merge deterministically.
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut root = Value::empty_map();
    for (key, raw) in &entries {
        insert_env_entry(&mut root, key, raw);
    }
    Ok(root)
}

fn parse_ini(text: &str) -> ConfigResult<Value> {
    let mut root = Value::empty_map();
    let mut section: Vec<String> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| {
                ConfigError::ConfigInvalid(format!("ini line {}: unterminated section", lineno + 1))
            })?;
            section = crate::value::split_path(name.trim())
                .map(str::to_string)
                .collect();
            let refs: Vec<&str> = section.iter().map(String::as_str).collect();
            root.merge(Value::nest(&refs, Value::empty_map()));
            continue;
        }
        let (key, raw) = line
            .split_once('=')
            .or_else(|| line.split_once(':'))
            .ok_or_else(|| {
                ConfigError::ConfigInvalid(format!("ini line {}: expected key = value", lineno + 1))
            })?;
        let mut path: Vec<&str> = section.iter().map(String::as_str).collect();
        path.push(key.trim());
        root.merge(Value::nest(&path, Value::String(unquote(raw.trim()).to_string())));
    }
    Ok(root)
}

fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Decode a document whose format is not known up front.
///
/// JSON, YAML and TOML are tried in that order; the first one that yields
/// a map wins.
pub fn decode_any_document(bytes: &[u8]) -> ConfigResult<(Format, Map)> {
    let mut failures = Vec::new();
    for format in [Format::Json, Format::Yaml, Format::Toml] {
        match format.decode(bytes) {
            Ok(Some(Value::Map(map))) => return Ok((format, map)),
            Ok(Some(other)) => failures.push(format!("{format}: root is a {}", other.kind())),
            Ok(None) => {}
            Err(err) => failures.push(err.to_string()),
        }
    }
    Err(ConfigError::ConfigInvalid(format!(
        "no format accepted the document ({})",
        failures.join("; ")
    )))
}
