//! Configuration-based container construction

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::ContainerBuilder;
use crate::descriptor::SharedValue;
use crate::error::{DiError, DiResult};
use crate::lifetime::Lifetime;
use crate::registry::ServiceRegistry;

/// Lifetime as written in configuration files
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifetimeConfig {
    Transient,
    Scoped,
    Singleton,
}

impl From<LifetimeConfig> for Lifetime {
    fn from(config: LifetimeConfig) -> Self {
        match config {
            LifetimeConfig::Transient => Lifetime::Transient,
            LifetimeConfig::Scoped => Lifetime::Scoped,
            LifetimeConfig::Singleton => Lifetime::Singleton,
        }
    }
}

/// One configured service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Implementation type name, as registered in the [`ServiceRegistry`]
    pub implementation_type: String,
    /// Service lifetime
    pub lifetime: LifetimeConfig,
    /// Interface type names to expose the service as
    #[serde(default)]
    pub expose: Vec<String>,
    /// Named parameter overrides (scalar values)
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub services: Vec<ServiceConfig>,
}

impl ContainerConfig {
    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> DiResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| DiError::ConfigError(format!("failed to parse TOML: {e}")))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> DiResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| DiError::ConfigError(format!("failed to parse JSON: {e}")))
    }

    /// Apply every configured service to a builder, through the global
    /// by-name registry
    pub fn apply_to_builder(&self, builder: &mut ContainerBuilder) -> DiResult<()> {
        let registry = ServiceRegistry::global();
        for service in &self.services {
            registry.apply(builder, service)?;
        }
        Ok(())
    }
}

/// Convert a scalar configuration value into an override value
pub(crate) fn json_value_to_shared(value: &serde_json::Value) -> DiResult<SharedValue> {
    match value {
        serde_json::Value::Bool(b) => Ok(Arc::new(*b)),
        serde_json::Value::String(s) => Ok(Arc::new(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Arc::new(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Arc::new(f))
            } else {
                Err(DiError::ConfigError(format!(
                    "unsupported numeric parameter: {n}"
                )))
            }
        }
        other => Err(DiError::ConfigError(format!(
            "unsupported parameter value: {other}"
        ))),
    }
}
