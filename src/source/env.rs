//! Environment variable source.

use tracing::trace;

use super::{KeyValue, Layout, Source};
use crate::error::ConfigResult;
use crate::format::Format;

/// Reads process environment variables that start with one of its prefixes.
///
/// A variable `APP_LOGGER_LEVEL=warn` read with prefix `APP_` (or `APP`)
/// yields the record `LOGGER_LEVEL` → `warn`. Variables equal to a prefix,
/// and variables matching no prefix, are dropped. A prefix that does not end
/// in `_` only matches at a `_` boundary, so `APP` does not match `APPLE`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    name: String,
    prefixes: Vec<String>,
}

impl EnvSource {
    /// Create a source for the given prefixes.
    pub fn new<I, S>(name: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// Configured prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Strip the first matching prefix, returning the record key.
    pub fn strip<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.prefixes.iter().find_map(|prefix| {
            let rest = name.strip_prefix(prefix.as_str())?;
            let rest = if prefix.ends_with('_') {
                rest
            } else {
                rest.strip_prefix('_')?
            };
            (!rest.is_empty()).then_some(rest)
        })
    }

    /// Records for an explicit set of variables.
    pub fn records_from<I, K, V>(&self, vars: I) -> Vec<KeyValue>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Vec<u8>>,
    {
        let mut records: Vec<KeyValue> = vars
            .into_iter()
            .filter_map(|(name, value)| {
                let key = self.strip(name.as_ref())?;
                trace!(source = %self.name, key, "environment entry");
                Some(KeyValue::new(key, Format::Env, value))
            })
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }
}

impl Source for EnvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn layout(&self) -> Layout {
        Layout::Entries
    }

    fn load(&self) -> ConfigResult<Vec<KeyValue>> {
        if self.prefixes.is_empty() {
            return Ok(Vec::new());
        }
        let vars = std::env::vars_os().filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
        });
        Ok(self.records_from(vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_stripping() {
        let source = EnvSource::new("env", ["APP_"]);
        assert_eq!(source.strip("APP_LOGGER_LEVEL"), Some("LOGGER_LEVEL"));
        assert_eq!(source.strip("APP_"), None);
        assert_eq!(source.strip("FOO_BAR"), None);

        let bare = EnvSource::new("env", ["APP"]);
        assert_eq!(bare.strip("APP_PORT"), Some("PORT"));
        assert_eq!(bare.strip("APP"), None);
        assert_eq!(bare.strip("APPLE"), None);
    }

    #[test]
    fn test_records_are_sorted_and_filtered() {
        let source = EnvSource::new("env", ["SVC_", "ALT_"]);
        let records = source.records_from([
            ("SVC_PORT", "80"),
            ("OTHER", "x"),
            ("ALT_HOST", "h"),
            ("SVC_", "dropped"),
        ]);
        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["HOST", "PORT"]);
        assert!(records.iter().all(|r| r.format == Format::Env));
        assert_eq!(records[1].value, b"80".to_vec());
    }

    #[test]
    fn test_empty_prefixes_contribute_nothing() {
        std::env::set_var("BOOTSTRATA_ENV_EMPTY_PREFIX_TEST", "1");
        let source = EnvSource::new("env", Vec::<String>::new());
        assert!(source.load().unwrap().is_empty());
        std::env::remove_var("BOOTSTRATA_ENV_EMPTY_PREFIX_TEST");
    }

    #[test]
    fn test_load_reads_process_environment() {
        std::env::set_var("BSTRATA_ENVSRC_LOGGER_LEVEL", "warn");
        std::env::set_var("BSTRATA_ENVSRC", "self");
        let source = EnvSource::new("env", ["BSTRATA_ENVSRC_"]);
        let records = source.load().unwrap();
        assert_eq!(
            records,
            vec![KeyValue::new("LOGGER_LEVEL", Format::Env, "warn")]
        );
        std::env::remove_var("BSTRATA_ENVSRC_LOGGER_LEVEL");
        std::env::remove_var("BSTRATA_ENVSRC");
    }
}
