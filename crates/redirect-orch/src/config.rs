//! Configuration file support for redirectctl.
//!
//! Two TOML documents drive the operator binary:
//!
//! - [`ControllerConfig`]: which backend to open and how to log
//! - [`RedirectionPlan`]: element groups, inspection ports and hooks to
//!   program once the controller is open

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::controller::{RedirectionController, RedirectionControllerConfig};
use crate::error::{RedirectionError, Result as RedirectionResult};
use crate::{audit_log, info_log, warn_log};
use redirect_driver::{FlowClassifierDriver, MockDriver, RedirectionDriver, SfcDriver};
use redirect_types::{
    ElementId, FailurePolicyType, HookId, HookParams, InspectionPortElement, TagEncapsulationType,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

const SOURCE: &str = "Config";

/// Default location of the controller configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/redirect/redirectctl.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Controller backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Port-chain composition; hook ids equal port ids.
    #[default]
    Sfc,
    FlowClassifier,
    /// Recording in-memory backend.
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Complete redirectctl configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Name of the controller session, used in logs and audit records
    #[serde(default = "default_controller_name")]
    pub controller_name: String,

    /// Controller endpoint handed to the driver
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Rebuild caches from the controller after connecting
    #[serde(default = "default_reconcile_on_open")]
    pub reconcile_on_open: bool,

    /// Leaf ports the in-process controller starts with
    #[serde(default)]
    pub seed_ports: Vec<String>,
}

fn default_controller_name() -> String {
    "redirection".to_string()
}

fn default_endpoint() -> String {
    "localhost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reconcile_on_open() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            controller_name: default_controller_name(),
            endpoint: default_endpoint(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            reconcile_on_open: default_reconcile_on_open(),
            seed_ports: Vec::new(),
        }
    }
}

impl FromStr for ControllerConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            what: "controller configuration".to_string(),
            message: e.to_string(),
        })
    }
}

impl ControllerConfig {
    /// Loads configuration from `path`. The file must exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => content.parse(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "redirectctl: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller_name.trim().is_empty() {
            return Err(ConfigError::Invalid("controller_name must not be empty".to_string()));
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".to_string()));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level must be one of {}, got {:?}",
                LOG_LEVELS.join("|"),
                self.log_level
            )));
        }

        self.seed_port_ids().map(|_| ())
    }

    fn seed_port_ids(&self) -> Result<Vec<ElementId>> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::with_capacity(self.seed_ports.len());
        for port in &self.seed_ports {
            let id = ElementId::new(port.as_str())
                .map_err(|e| ConfigError::Invalid(format!("seed port: {}", e)))?;
            if !seen.insert(id.clone()) {
                return Err(ConfigError::Invalid(format!("seed port {} listed twice", id)));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Creates the configured in-process driver, seeded with `seed_ports`.
    pub fn build_driver(&self) -> Result<Arc<dyn RedirectionDriver>> {
        let seeds = self.seed_port_ids()?;
        let driver: Arc<dyn RedirectionDriver> = match self.backend {
            BackendKind::Sfc => {
                let driver = SfcDriver::new(self.endpoint.as_str());
                seeds.into_iter().for_each(|id| driver.add_port(id));
                Arc::new(driver)
            }
            BackendKind::FlowClassifier => {
                let driver = FlowClassifierDriver::new(self.endpoint.as_str());
                seeds.into_iter().for_each(|id| driver.add_port(id));
                Arc::new(driver)
            }
            BackendKind::Mock => {
                let driver = MockDriver::new();
                seeds.into_iter().for_each(|id| driver.add_port(id));
                Arc::new(driver)
            }
        };
        Ok(driver)
    }

    pub fn controller_config(&self) -> RedirectionControllerConfig {
        RedirectionControllerConfig::new(self.controller_name.as_str())
            .with_reconcile_on_open(self.reconcile_on_open)
    }
}

/// A named composite element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    /// Element ids or names of earlier groups, in traffic order
    pub children: Vec<String>,
}

/// A named inspection port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub ingress: String,
    /// Defaults to `ingress` (symmetric port)
    #[serde(default)]
    pub egress: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Element ids or group names
    pub inspected: Vec<String>,
    /// Name of a port in the plan
    pub port: String,
    pub tag: u64,
    pub encapsulation: TagEncapsulationType,
    pub order: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicyType,
}

impl HookSpec {
    pub fn params(&self) -> HookParams {
        HookParams::new(self.tag, self.encapsulation, self.order, self.failure_policy)
    }
}

/// Element groups, inspection ports and hooks to program, in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectionPlan {
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

/// Identifiers the controller assigned while applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedPlan {
    pub groups: BTreeMap<String, ElementId>,
    pub ports: BTreeMap<String, ElementId>,
    pub hooks: Vec<HookId>,
}

impl FromStr for RedirectionPlan {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            what: "redirection plan".to_string(),
            message: e.to_string(),
        })
    }
}

fn element_id(raw: &str) -> Result<ElementId> {
    ElementId::new(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
}

impl RedirectionPlan {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Checks names and references without touching a controller.
    ///
    /// Group and port names must be unique, a group may only reference
    /// groups defined before it, and every hook must name a known port.
    pub fn validate(&self) -> Result<()> {
        let mut groups = BTreeSet::new();
        for group in &self.groups {
            if group.children.is_empty() {
                return Err(ConfigError::Invalid(format!("group {} has no children", group.name)));
            }
            for child in &group.children {
                if !groups.contains(child.as_str()) {
                    element_id(child)?;
                }
            }
            if !groups.insert(group.name.as_str()) {
                return Err(ConfigError::Invalid(format!("group {} defined twice", group.name)));
            }
        }

        let mut ports = BTreeSet::new();
        for port in &self.ports {
            element_id(&port.ingress)?;
            if let Some(egress) = &port.egress {
                element_id(egress)?;
            }
            if !ports.insert(port.name.as_str()) {
                return Err(ConfigError::Invalid(format!("port {} defined twice", port.name)));
            }
        }

        for hook in &self.hooks {
            if !ports.contains(hook.port.as_str()) {
                return Err(ConfigError::Invalid(format!("hook references unknown port {}", hook.port)));
            }
            if hook.inspected.is_empty() {
                return Err(ConfigError::Invalid(format!("hook on port {} inspects nothing", hook.port)));
            }
            for name in &hook.inspected {
                if !groups.contains(name.as_str()) {
                    element_id(name)?;
                }
            }
        }
        Ok(())
    }

    /// Programs the plan through `controller`.
    ///
    /// Ports and identical hooks already present are reused, so applying
    /// the same plan twice only creates the groups again. Stops at the first
    /// failure; what was programmed before it stays.
    pub fn apply(&self, controller: &RedirectionController) -> RedirectionResult<AppliedPlan> {
        let mut applied = AppliedPlan::default();
        let result = self.program(controller, &mut applied);
        audit_log!(apply_record(controller.name(), &applied, result.as_ref().err()));

        match result {
            Ok(()) => {
                info_log!(
                    SOURCE,
                    groups = applied.groups.len(),
                    ports = applied.ports.len(),
                    hooks = applied.hooks.len(),
                    "Redirection plan applied"
                );
                Ok(applied)
            }
            Err(e) => {
                warn_log!(SOURCE, error = %e, groups = applied.groups.len(), ports = applied.ports.len(), hooks = applied.hooks.len(), "Redirection plan partially applied");
                Err(e)
            }
        }
    }

    /// Programs the plan, recording each assigned id in `applied` as it goes.
    fn program(&self, controller: &RedirectionController, applied: &mut AppliedPlan) -> RedirectionResult<()> {
        self.validate()
            .map_err(|e| RedirectionError::invalid(e.to_string()))?;

        let resolve = |applied: &AppliedPlan, name: &str| -> RedirectionResult<ElementId> {
            match applied.groups.get(name) {
                Some(id) => Ok(id.clone()),
                None => element_id(name).map_err(|e| RedirectionError::invalid(e.to_string())),
            }
        };

        for group in &self.groups {
            let children = group
                .children
                .iter()
                .map(|c| resolve(&*applied, c))
                .collect::<RedirectionResult<Vec<_>>>()?;
            let element = controller.register_network_element(&children)?;
            applied.groups.insert(group.name.clone(), element.id);
        }

        let mut ports = BTreeMap::new();
        for spec in &self.ports {
            let ingress = resolve(&*applied, &spec.ingress)?;
            let egress = match &spec.egress {
                Some(egress) => resolve(&*applied, egress)?,
                None => ingress.clone(),
            };
            let port = InspectionPortElement::new(ingress, egress);
            let id = controller.register_inspection_port(&port)?;
            applied.ports.insert(spec.name.clone(), id.clone());
            ports.insert(spec.name.as_str(), port.with_element_id(id));
        }

        for spec in &self.hooks {
            let inspected = spec
                .inspected
                .iter()
                .map(|name| resolve(&*applied, name))
                .collect::<RedirectionResult<Vec<_>>>()?;
            let port = ports
                .get(spec.port.as_str())
                .ok_or_else(|| RedirectionError::port_not_found(format!("plan port {}", spec.port)))?;
            let hook = controller.install_inspection_hook(&inspected, port, spec.params())?;
            applied.hooks.push(hook);
        }
        Ok(())
    }
}

/// Audit record for one plan application; `applied` holds what was
/// programmed before any failure.
fn apply_record(controller: &str, applied: &AppliedPlan, error: Option<&RedirectionError>) -> AuditRecord {
    let record = AuditRecord::new(AuditCategory::ConfigurationChange, SOURCE, "apply_plan")
        .with_object_id(controller)
        .with_object_type("redirection_plan")
        .with_details(serde_json::json!({
            "groups": applied.groups,
            "ports": applied.ports,
            "hooks": applied.hooks,
        }));
    match error {
        Some(e) => record.with_error(e.to_string()),
        None => record.with_outcome(AuditOutcome::Success),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const PLAN: &str = r#"
[[groups]]
name = "web"
children = ["p1", "p2"]

[[ports]]
name = "fw"
ingress = "p3"

[[hooks]]
inspected = ["web"]
port = "fw"
tag = 42
encapsulation = "VXLAN"
order = 1
failure_policy = "FAIL_OPEN"
"#;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.backend, BackendKind::Sfc);
        assert_eq!(config.controller_name, "redirection");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.reconcile_on_open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let config: ControllerConfig = r#"
backend = "flow_classifier"
log_format = "pretty"
seed_ports = ["p1", "p2"]
"#
        .parse()
        .unwrap();
        assert_eq!(config.backend, BackendKind::FlowClassifier);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.seed_ports, vec!["p1", "p2"]);
        // Unspecified values use defaults
        assert_eq!(config.endpoint, "localhost");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = "backend = \"openflow\"".parse::<ControllerConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ControllerConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.seed_ports = vec!["p1".to_string(), "p1".to_string()];
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.controller_name = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"mock\"\ncontroller_name = \"lab\"").unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.backend, BackendKind::Mock);
        assert_eq!(config.controller_config().name, "lab");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(ControllerConfig::load(&path), Err(ConfigError::Io { .. })));
        let config = ControllerConfig::load_or_default(&path).unwrap();
        assert_eq!(config.controller_name, "redirection");
    }

    #[test]
    fn test_build_driver_seeds_ports() {
        let config = ControllerConfig {
            backend: BackendKind::Mock,
            seed_ports: vec!["p1".to_string()],
            ..Default::default()
        };
        let driver = config.build_driver().unwrap();
        driver.connect().unwrap();
        assert!(driver.lookup_element(&"p1".parse().unwrap()).unwrap().is_some());
    }

    #[test]
    fn test_plan_validation() {
        let plan: RedirectionPlan = PLAN.parse().unwrap();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.hooks[0].params().encapsulation, TagEncapsulationType::Vxlan);

        let mut bad = plan.clone();
        bad.hooks[0].port = "ids".to_string();
        assert!(bad.validate().is_err());

        let mut bad = plan;
        bad.groups.push(bad.groups[0].clone());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_plan_apply() {
        let config = ControllerConfig {
            backend: BackendKind::Sfc,
            seed_ports: vec!["p1".to_string(), "p2".to_string(), "p3".to_string()],
            ..Default::default()
        };
        let controller =
            RedirectionController::open(config.build_driver().unwrap(), config.controller_config()).unwrap();

        let plan: RedirectionPlan = PLAN.parse().unwrap();
        let applied = plan.apply(&controller).unwrap();

        let web = applied.groups["web"].clone();
        let fw = applied.ports["fw"].clone();
        assert_eq!(controller.get_network_elements(&web).unwrap(), Some(vec!["p1".parse().unwrap(), "p2".parse().unwrap()]));
        assert_eq!(applied.hooks, vec![HookId::from(fw)]);

        let chain = controller.inspection_chain(&web);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].tag, 42);

        let record = apply_record(controller.name(), &applied, None);
        assert_eq!(record.category, AuditCategory::ConfigurationChange);
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.details.unwrap()["groups"]["web"], web.as_str());
        controller.close().unwrap();
    }

    #[test]
    fn test_plan_apply_failure_is_audited() {
        let config = ControllerConfig {
            backend: BackendKind::Mock,
            seed_ports: vec!["p1".to_string(), "p2".to_string()],
            ..Default::default()
        };
        let controller =
            RedirectionController::open(config.build_driver().unwrap(), config.controller_config()).unwrap();
        let plan: RedirectionPlan = PLAN.replace(r#"ingress = "p3""#, r#"ingress = "ghost""#).parse().unwrap();

        let mut applied = AppliedPlan::default();
        let err = plan.program(&controller, &mut applied).unwrap_err();
        assert!(matches!(err, RedirectionError::PortNotFound(_)));
        assert_eq!(applied.groups.len(), 1);
        assert!(applied.ports.is_empty());

        let record = apply_record(controller.name(), &applied, Some(&err));
        assert_eq!(record.category, AuditCategory::ConfigurationChange);
        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert!(record.error.is_some());
        assert_eq!(record.details.unwrap()["groups"].as_object().map(|g| g.len()), Some(1));

        assert!(plan.apply(&controller).is_err());
    }
}
