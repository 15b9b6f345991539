//! The `ConfigStore`-shaped interface (§3 "TestModel", §6 "Persisted state")
//! and a TOML-backed default implementation for local development.
//!
//! The relational store itself is out of scope; this module only defines
//! the versioned value objects the rest of the runtime depends on and a
//! `ConfigStore` trait any real backing store implements.

use crate::engine::TestIteration;
use crate::errors::{CommitError, ConfigParseError, ConfigParseSource, ModelNotFound};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// How a DUT's connection should be classified before any other step runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionCheck {
    Disabled,
    DiagnosticVoltage { millivolts: u32 },
}

/// One sub-test's parameter row. Kept intentionally generic (a bag of named
/// values) since the parameter schema itself is owned by the out-of-scope
/// relational store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    pub sub_test: String,
    pub values: HashMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FirmwareSpec {
    pub image_path: PathBuf,
    pub version: String,
    pub force_overwrite: bool,
    pub program_with_thermal: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EepromConfig {
    pub registers: Vec<EepromRegister>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EepromRegister {
    pub target: String,
    pub index: u16,
    pub value: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitIdentityDirective {
    Write,
    ConfirmOnly,
    Skip,
}

/// A versioned bundle of everything one DUT model+option needs to run a
/// complete test iteration. Equality holds iff both the revision id and
/// content hash match (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestModel {
    pub mn: u32,
    pub option: Option<String>,
    pub config_revision: u64,
    pub connection_check: ConnectionCheck,
    pub parameter_sheet: Vec<ParameterRow>,
    pub firmware: Option<FirmwareSpec>,
    pub eeprom_initial: Option<EepromConfig>,
    pub eeprom_final: Option<EepromConfig>,
    pub unit_identity: Option<UnitIdentityDirective>,
    pub cooldown: std::time::Duration,
}

impl TestModel {
    /// A stable content hash over everything except `config_revision`
    /// itself, used for the model-equality invariant in §3.
    pub fn content_hash(&self) -> u64 {
        let canonical = serde_json::json!({
            "mn": self.mn,
            "option": self.option,
            "connection_check": &self.connection_check,
            "parameter_sheet": &self.parameter_sheet,
            "firmware": &self.firmware,
            "eeprom_initial": &self.eeprom_initial,
            "eeprom_final": &self.eeprom_final,
            "unit_identity": &self.unit_identity,
            "cooldown_ms": self.cooldown.as_millis() as u64,
        });
        xxh3_64(canonical.to_string().as_bytes())
    }
}

impl PartialEq for TestModel {
    fn eq(&self, other: &Self) -> bool {
        self.config_revision == other.config_revision && self.content_hash() == other.content_hash()
    }
}

/// Read access to versioned test models, keyed by `(mn, option)`.
/// Implementation-defined backing store; this crate only specifies the
/// contract and a TOML-file-backed reference implementation.
pub trait ConfigStore: Send + Sync {
    fn model(&self, mn: u32, option: Option<&str>) -> Result<TestModel, ModelNotFound>;

    /// Persists a finished (or `unfinished`-tagged partial) iteration to the
    /// `TestIteration` table (§6 "Persisted state"). Default: a no-op, for
    /// backing stores — test doubles, mainly — that don't need durable
    /// history.
    fn commit_iteration(&self, _iteration: &TestIteration) -> Result<(), CommitError> {
        Ok(())
    }
}

/// Loads a fixed set of `TestModel`s from a single TOML file, keyed by
/// `(mn, option)`. Suitable for local runs and tests; a production station
/// would back `ConfigStore` with the relational store instead.
///
/// `commit_iteration` appends one JSON line per iteration to
/// `<config path>.iterations.jsonl`, next to the config file itself — a
/// placeholder for the real `TestIteration` table a relational store would
/// provide.
#[derive(Debug)]
pub struct TomlConfigStore {
    models: HashMap<(u32, Option<String>), TestModel>,
    iteration_log: PathBuf,
}

#[derive(Deserialize)]
struct TomlModels {
    #[serde(default)]
    model: Vec<TestModel>,
}

impl TomlConfigStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigParseError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigParseError {
            path: path.display().to_string(),
            source: ConfigParseSource::Io(e),
        })?;
        Self::parse(path, &raw)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self, ConfigParseError> {
        let parsed: TomlModels = toml::from_str(raw).map_err(|e| ConfigParseError {
            path: path.display().to_string(),
            source: ConfigParseSource::Toml(e),
        })?;
        let models = parsed
            .model
            .into_iter()
            .map(|m| ((m.mn, m.option.clone()), m))
            .collect();
        let mut iteration_log = path.to_path_buf();
        let mut file_name = iteration_log.file_name().unwrap_or_default().to_os_string();
        file_name.push(".iterations.jsonl");
        iteration_log.set_file_name(file_name);
        Ok(Self {
            models,
            iteration_log,
        })
    }
}

impl ConfigStore for TomlConfigStore {
    fn model(&self, mn: u32, option: Option<&str>) -> Result<TestModel, ModelNotFound> {
        self.models
            .get(&(mn, option.map(str::to_string)))
            .cloned()
            .ok_or(ModelNotFound {
                mn,
                option: option.map(str::to_string),
            })
    }

    fn commit_iteration(&self, iteration: &TestIteration) -> Result<(), CommitError> {
        let line = serde_json::to_string(iteration)
            .map_err(|e| CommitError::new(format!("serializing iteration: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.iteration_log)
            .map_err(|e| CommitError::new(format!("opening {}: {e}", self.iteration_log.display())))?;
        writeln!(file, "{line}").map_err(|e| CommitError::new(format!("writing iteration: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rev: u64) -> TestModel {
        TestModel {
            mn: 100,
            option: None,
            config_revision: rev,
            connection_check: ConnectionCheck::Disabled,
            parameter_sheet: vec![],
            firmware: None,
            eeprom_initial: None,
            eeprom_final: None,
            unit_identity: None,
            cooldown: std::time::Duration::from_secs(1),
        }
    }

    #[test]
    fn equality_requires_matching_revision_and_content_hash() {
        let a = sample(1);
        let mut b = sample(1);
        assert_eq!(a, b);
        b.cooldown = std::time::Duration::from_secs(2);
        assert_ne!(a, b);
    }

    #[test]
    fn same_content_different_revision_is_not_equal() {
        let a = sample(1);
        let b = sample(2);
        assert_ne!(a, b);
    }

    #[test]
    fn toml_store_round_trips_a_model() {
        let toml = r#"
            [[model]]
            mn = 42
            option = "A"
            config_revision = 7
            connection_check = "Disabled"
            unit_identity = "Write"
            cooldown = { secs = 3, nanos = 0 }

            [[model.parameter_sheet]]
            sub_test = "vin"
            values = { volts = 12.0 }

            [model.firmware]
            image_path = "fw/42.bin"
            version = "1.2.3"
            force_overwrite = false
            program_with_thermal = true
        "#;

        let store = TomlConfigStore::parse(Path::new("test.toml"), toml).unwrap();
        let model = store.model(42, Some("A")).unwrap();

        assert_eq!(model.config_revision, 7);
        assert_eq!(model.connection_check, ConnectionCheck::Disabled);
        assert_eq!(model.unit_identity, Some(UnitIdentityDirective::Write));
        assert_eq!(model.parameter_sheet.len(), 1);
        assert_eq!(model.parameter_sheet[0].sub_test, "vin");
        assert_eq!(model.parameter_sheet[0].values.get("volts"), Some(&12.0));
        let firmware = model.firmware.as_ref().expect("firmware table present");
        assert_eq!(firmware.version, "1.2.3");
        assert!(firmware.program_with_thermal);
        assert!(model.eeprom_initial.is_none());
    }

    #[test]
    fn commit_iteration_appends_a_json_line() {
        let mut path = std::env::temp_dir();
        path.push(format!("station-config-{}.toml", std::process::id()));
        let store = TomlConfigStore::parse(&path, "").unwrap();
        let _ = std::fs::remove_file(&store.iteration_log);

        let dut = crate::engine::DutIdentity {
            sn: 1,
            mn: 42,
            option: None,
        };
        let iteration = TestIteration::new(dut, 7);
        store.commit_iteration(&iteration).unwrap();

        let contents = std::fs::read_to_string(&store.iteration_log).unwrap();
        assert!(contents.contains("\"config_revision\":7"));

        std::fs::remove_file(&store.iteration_log).unwrap();
    }

    #[test]
    fn missing_model_reports_mn_and_option() {
        let store = TomlConfigStore {
            models: HashMap::new(),
            iteration_log: PathBuf::from("test.toml.iterations.jsonl"),
        };
        let err = store.model(7, Some("B")).unwrap_err();
        assert_eq!(err.mn, 7);
        assert_eq!(err.option.as_deref(), Some("B"));
    }
}
