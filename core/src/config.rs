//! Configuration loading for contexts and forwarding targets.
//!
//! The file is TOML. Field names follow the k10ls format
//! (`global_kubeconfig`, `[[context]]`, `[[context.svc]]`, `[[context.pods]]`,
//! `[[context.label-selectors]]`); the longer `*_credentials_path` spellings
//! are accepted as aliases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::fs;

use crate::application::DEFAULT_RETRY_DELAY;
use crate::domain::{PortMapping, SessionSpec, Target, TargetKind};
use crate::error::ConfigError;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

// ============================================================================
// File Schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default, alias = "global_credentials_path")]
    global_kubeconfig: Option<String>,
    #[serde(default)]
    default_address: Option<String>,
    #[serde(default)]
    retry_delay_secs: Option<u64>,
    #[serde(default, rename = "context", alias = "contexts")]
    contexts: Vec<ContextFile>,
}

#[derive(Debug, Deserialize)]
struct ContextFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default, alias = "credentials_path")]
    kubeconfig: Option<String>,
    #[serde(default)]
    pods: Vec<NamedEntry>,
    #[serde(default, alias = "services")]
    svc: Vec<NamedEntry>,
    #[serde(default, rename = "label-selectors", alias = "label_selectors")]
    label_selectors: Vec<SelectorEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ports: Vec<PortEntry>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectorEntry {
    #[serde(default)]
    label: String,
    #[serde(default)]
    ports: Vec<PortEntry>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortEntry {
    source: PortValue,
    target: PortValue,
}

/// A port can be written as a number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Int(i64),
    String(String),
}

impl PortValue {
    fn to_port(&self) -> Option<u16> {
        let value = match self {
            PortValue::Int(v) => *v,
            PortValue::String(s) => s.trim().parse::<i64>().ok()?,
        };
        u16::try_from(value).ok().filter(|p| *p != 0)
    }

    fn describe(&self) -> String {
        match self {
            PortValue::Int(v) => v.to_string(),
            PortValue::String(s) => format!("{:?}", s),
        }
    }
}

// ============================================================================
// Validated Configuration
// ============================================================================

/// A cluster context and the targets declared under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    pub name: String,
    pub address: Option<String>,
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    /// Pods first, then services, then label selectors, each in file order.
    pub targets: Vec<Target>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub global_kubeconfig: Option<PathBuf>,
    pub default_address: Option<String>,
    pub retry_delay: Duration,
    pub contexts: Vec<ContextConfig>,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Self::validate(file)
    }

    fn validate(file: ConfigFile) -> Result<Self, ConfigError> {
        if file.contexts.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[context]] is required".to_string(),
            ));
        }

        let retry_delay = match file.retry_delay_secs {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "retry_delay_secs must be greater than zero".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_RETRY_DELAY,
        };

        let contexts = file
            .contexts
            .into_iter()
            .enumerate()
            .map(|(index, ctx)| validate_context(index, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            global_kubeconfig: non_empty(file.global_kubeconfig).map(expand_home),
            default_address: non_empty(file.default_address),
            retry_delay,
            contexts,
        })
    }

    /// Fills the global kubeconfig with `fallback` when the file leaves it unset.
    pub fn with_default_kubeconfig(mut self, fallback: Option<PathBuf>) -> Self {
        if self.global_kubeconfig.is_none() {
            self.global_kubeconfig = fallback;
        }
        self
    }

    /// Kubeconfig used for `context`: its own, else the global one.
    /// `None` means in-cluster configuration.
    pub fn credentials_for(&self, context: &ContextConfig) -> Option<PathBuf> {
        context
            .kubeconfig
            .clone()
            .or_else(|| self.global_kubeconfig.clone())
    }

    /// Session specs for one context, with precedence applied.
    pub fn session_specs(&self, context: &ContextConfig) -> Vec<SessionSpec> {
        context
            .targets
            .iter()
            .map(|target| {
                SessionSpec::new(
                    context.name.as_str(),
                    target.clone(),
                    context.namespace.as_deref(),
                    context.address.as_deref(),
                    self.default_address.as_deref(),
                )
            })
            .collect()
    }

    /// Session specs for every context.
    pub fn plan(&self) -> Vec<SessionSpec> {
        self.contexts
            .iter()
            .flat_map(|ctx| self.session_specs(ctx))
            .collect()
    }

    /// Total number of declared targets.
    pub fn target_count(&self) -> usize {
        self.contexts.iter().map(|c| c.targets.len()).sum()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: String) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn validate_context(index: usize, ctx: ContextFile) -> Result<ContextConfig, ConfigError> {
    if ctx.name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "context #{} is missing a name",
            index + 1
        )));
    }
    let name = ctx.name;

    let mut targets = Vec::new();
    for entry in ctx.pods {
        targets.push(named_target(&name, entry, TargetKind::Pod)?);
    }
    for entry in ctx.svc {
        targets.push(named_target(&name, entry, TargetKind::Service)?);
    }
    for entry in ctx.label_selectors {
        if entry.label.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "context {}: label selector entry is missing `label`",
                name
            )));
        }
        let kind = TargetKind::LabelSelector(entry.label);
        let ports = validate_ports(&name, &kind, &entry.ports)?;
        targets.push(Target {
            kind,
            namespace: non_empty(entry.namespace),
            address: non_empty(entry.address),
            ports,
        });
    }

    Ok(ContextConfig {
        name,
        address: non_empty(ctx.address),
        namespace: non_empty(ctx.namespace),
        kubeconfig: non_empty(ctx.kubeconfig).map(expand_home),
        targets,
    })
}

fn named_target(
    context: &str,
    entry: NamedEntry,
    kind: fn(String) -> TargetKind,
) -> Result<Target, ConfigError> {
    let kind = kind(entry.name);
    if kind.value().trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "context {}: {} entry is missing `name`",
            context,
            kind.prefix()
        )));
    }
    let ports = validate_ports(context, &kind, &entry.ports)?;
    Ok(Target {
        kind,
        namespace: non_empty(entry.namespace),
        address: non_empty(entry.address),
        ports,
    })
}

fn validate_ports(
    context: &str,
    kind: &TargetKind,
    entries: &[PortEntry],
) -> Result<Vec<PortMapping>, ConfigError> {
    if entries.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "context {}: {} has no ports",
            context, kind
        )));
    }

    entries
        .iter()
        .map(|entry| {
            let local = entry.source.to_port();
            let remote = entry.target.to_port();
            match (local, remote) {
                (Some(local), Some(remote)) => Ok(PortMapping::new(local, remote)),
                _ => Err(ConfigError::Invalid(format!(
                    "context {}: {} has an invalid port pair {} -> {}",
                    context,
                    kind,
                    entry.source.describe(),
                    entry.target.describe()
                ))),
            }
        })
        .collect()
}

/// `$HOME/.kube/config`, when a home directory is known.
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

// ============================================================================
// Store
// ============================================================================

/// Reads the configuration file from disk.
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a store reading `config.toml` from the working directory.
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Create a store for a custom path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate the configuration.
    ///
    /// A missing `global_kubeconfig` falls back to `$HOME/.kube/config`.
    pub async fn load(&self) -> Result<Config, ConfigError> {
        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|source| ConfigError::Read {
                path: self.config_path.clone(),
                source,
            })?;

        Ok(Config::parse(&content, &self.config_path)?
            .with_default_kubeconfig(default_kubeconfig_path()))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}
