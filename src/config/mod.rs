use crate::error::{ConductorError, Result};
use crate::script::ScriptUniqueness;
use crate::service::EnginePolicy;
use dashmap::DashMap;
use std::env;
use std::ffi::OsString;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const ENGINE_FAILURES_REQUIRED: &str = "CONDUCTOR_ENGINE_FAILURES_REQUIRED";
pub const SCRIPT_UNIQUENESS: &str = "CONDUCTOR_SCRIPT_UNIQUENESS";
pub const MANAGEMENT_PORT: &str = "CONDUCTOR_MANAGEMENT_PORT";
pub const INSTANCE_ID: &str = "CONDUCTOR_INSTANCE_ID";
pub const BOOT_TIMEOUT_SECS: &str = "CONDUCTOR_BOOT_TIMEOUT_SECS";
pub const ACTIVATION_CAPACITY: &str = "CONDUCTOR_ACTIVATION_CAPACITY";
pub const LOG: &str = "CONDUCTOR_LOG";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Seeded from the process environment
    pub fn new() -> Self {
        Self::from_os_pairs(env::vars_os())
    }

    /// Entries that are not valid UTF-8 are skipped
    fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let service = Self::default();
        for (key, value) in pairs {
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => service.set(&key, &value),
                (Ok(key), Err(_)) => {
                    tracing::debug!("Ignoring non UTF-8 value of {}", key);
                }
                (Err(key), _) => {
                    tracing::debug!("Ignoring non UTF-8 variable {:?}", key);
                }
            }
        }
        service
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let service = Self::default();
        for (key, value) in pairs {
            service.set(key.as_ref(), value.as_ref());
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse `key`, falling back to `default` when unset
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e| {
                ConductorError::Configuration(format!("Invalid value '{}' for {}: {}", raw, key, e))
            }),
            None => Ok(default),
        }
    }

    pub fn parse_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse().map_err(|e| {
                    ConductorError::Configuration(format!(
                        "Invalid value '{}' for {}: {}",
                        raw, key, e
                    ))
                })
            })
            .transpose()
    }
}

/// Typed runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub engine_policy: EnginePolicy,
    pub script_uniqueness: ScriptUniqueness,
    pub management_port: u16,
    pub instance_id: String,
    pub boot_timeout: Option<Duration>,
    pub activation_capacity: usize,
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine_policy: EnginePolicy::default(),
            script_uniqueness: ScriptUniqueness::default(),
            management_port: 9000,
            instance_id: "default".to_string(),
            boot_timeout: None,
            activation_capacity: 100,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(&ConfigService::new())
    }

    pub fn load(config: &ConfigService) -> Result<Self> {
        let defaults = Self::default();

        let activation_capacity = config.parse_or(ACTIVATION_CAPACITY, defaults.activation_capacity)?;
        if activation_capacity == 0 {
            return Err(ConductorError::Configuration(format!(
                "{} must be greater than zero",
                ACTIVATION_CAPACITY
            )));
        }

        Ok(Self {
            engine_policy: EnginePolicy {
                required: config.parse_or(ENGINE_FAILURES_REQUIRED, false)?,
            },
            script_uniqueness: config.parse_or(SCRIPT_UNIQUENESS, defaults.script_uniqueness)?,
            management_port: config.parse_or(MANAGEMENT_PORT, defaults.management_port)?,
            instance_id: config.get(INSTANCE_ID).unwrap_or(defaults.instance_id),
            boot_timeout: config
                .parse_optional::<u64>(BOOT_TIMEOUT_SECS)?
                .map(Duration::from_secs),
            activation_capacity,
            log_filter: config.get(LOG).unwrap_or(defaults.log_filter),
        })
    }
}
