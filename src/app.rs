//! Application identity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sections::AppInfoConfig;

/// The immutable identity of the running application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Instance identifier
    pub id: String,
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
    /// Deployment environment
    #[serde(default)]
    pub env: String,
    /// When this instance was bootstrapped
    pub start_time: DateTime<Utc>,
    /// Free-form labels
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AppInfo {
    /// Create an identity stamped with the current time.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            env: String::new(),
            start_time: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the deployment environment.
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Add a metadata label.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Overlay the `app` section: every non-empty field of `config` wins.
    ///
    /// `metadata` is a single field: a non-empty map from `config`
    /// replaces the caller's map whole, labels are never merged per key.
    pub fn overlay(mut self, config: &AppInfoConfig) -> Self {
        fn take(slot: &mut String, value: &str) {
            if !value.is_empty() {
                *slot = value.to_string();
            }
        }
        take(&mut self.id, &config.id);
        take(&mut self.name, &config.name);
        take(&mut self.version, &config.version);
        take(&mut self.env, &config.env);
        if !config.metadata.is_empty() {
            self.metadata = config.metadata.clone();
        }
        self
    }

    /// Names of the required fields that are still empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [("id", &self.id), ("name", &self.name), ("version", &self.version)]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
            .collect()
    }
}

impl Default for AppInfo {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

/// The record a [`crate::Registrar`] announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Instance identifier
    pub id: String,
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// Labels, including `env` when set
    pub metadata: BTreeMap<String, String>,
    /// Reachable addresses, e.g. `http://10.0.0.1:8080`
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    /// Add an endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }
}

impl From<&AppInfo> for ServiceInstance {
    fn from(app: &AppInfo) -> Self {
        let mut metadata = app.metadata.clone();
        if !app.env.is_empty() {
            metadata.insert("env".to_string(), app.env.clone());
        }
        Self {
            id: app.id.clone(),
            name: app.name.clone(),
            version: app.version.clone(),
            metadata,
            endpoints: Vec::new(),
        }
    }
}
