//! Hot-reloadable playbook store.
//!
//! Holds one playbook per contract type plus a designated default. Reloads
//! replace the whole set atomically; callers take an `Arc` snapshot and
//! finish their run against it even if a reload lands mid-flight.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::models::Playbook;

use super::parser::parse_playbook;
use super::PlaybookParseError;

/// Contract type id used when no type is given or the given type is unknown.
pub const DEFAULT_CONTRACT_TYPE: &str = "default";

/// One entry of the contract type registry (`contract_types.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Playbook file name, relative to the playbooks directory.
    pub playbook: String,
}

#[derive(Debug, Deserialize)]
struct Registry {
    contract_types: Vec<ContractType>,
}

/// Immutable set of loaded playbooks. Replaced wholesale on reload.
#[derive(Debug)]
pub struct PlaybookSet {
    by_type: HashMap<String, Arc<Playbook>>,
    default: Arc<Playbook>,
}

impl PlaybookSet {
    /// Playbook for a contract type, falling back to the default when the
    /// type is absent or unknown.
    pub fn for_contract_type(&self, contract_type: Option<&str>) -> Arc<Playbook> {
        contract_type
            .and_then(|t| self.by_type.get(t).cloned())
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn contract_types(&self) -> Vec<&str> {
        self.by_type.keys().map(String::as_str).collect()
    }
}

/// Store front: snapshot on read, swap on reload.
pub struct PlaybookStore {
    inner: RwLock<Arc<PlaybookSet>>,
}

impl PlaybookStore {
    /// Build a store holding a single default playbook parsed from source.
    pub fn from_source(source: &str) -> Result<Self, PlaybookParseError> {
        let rules = parse_playbook(source)?;
        let default = Arc::new(Playbook::new(DEFAULT_CONTRACT_TYPE, rules));
        let mut by_type = HashMap::new();
        by_type.insert(DEFAULT_CONTRACT_TYPE.to_string(), default.clone());
        Ok(Self {
            inner: RwLock::new(Arc::new(PlaybookSet { by_type, default })),
        })
    }

    /// Load playbooks from a directory.
    ///
    /// When `contract_types.json` is present it names the playbook file per
    /// contract type; otherwise every `*.txt` file becomes a playbook keyed
    /// by its stem. A `default` entry (or `default.txt`) is the fallback;
    /// absent that, the first type in registry order is.
    pub fn load_dir(dir: &Path) -> Result<Self, PlaybookParseError> {
        let set = load_set(dir)?;
        Ok(Self {
            inner: RwLock::new(Arc::new(set)),
        })
    }

    /// Current immutable snapshot. In-flight runs keep theirs across
    /// reloads.
    pub fn snapshot(&self) -> Arc<PlaybookSet> {
        self.inner.read().expect("playbook store lock poisoned").clone()
    }

    /// Re-read the directory and swap the set atomically. On error the
    /// previous set stays in place.
    pub fn reload(&self, dir: &Path) -> Result<(), PlaybookParseError> {
        let set = Arc::new(load_set(dir)?);
        *self.inner.write().expect("playbook store lock poisoned") = set;
        tracing::info!(dir = %dir.display(), "Playbook set reloaded");
        Ok(())
    }
}

fn load_set(dir: &Path) -> Result<PlaybookSet, PlaybookParseError> {
    let registry_path = dir.join("contract_types.json");
    let mut by_type = HashMap::new();
    let mut first: Option<Arc<Playbook>> = None;

    if registry_path.exists() {
        let raw = std::fs::read_to_string(&registry_path)?;
        let registry: Registry = serde_json::from_str(&raw)
            .map_err(|e| PlaybookParseError::Registry(e.to_string()))?;
        if registry.contract_types.is_empty() {
            return Err(PlaybookParseError::Registry(
                "contract_types.json lists no contract types".into(),
            ));
        }
        for ct in &registry.contract_types {
            let path = dir.join(&ct.playbook);
            let source = std::fs::read_to_string(&path)
                .map_err(|_| PlaybookParseError::NotFound(path.display().to_string()))?;
            let playbook = Arc::new(Playbook::new(&ct.id, parse_playbook(&source)?));
            first.get_or_insert_with(|| playbook.clone());
            by_type.insert(ct.id.clone(), playbook);
        }
    } else {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        entries.sort();
        if entries.is_empty() {
            return Err(PlaybookParseError::NotFound(format!(
                "no playbooks in {}",
                dir.display()
            )));
        }
        for path in entries {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("playbook")
                .to_string();
            let source = std::fs::read_to_string(&path)?;
            let playbook = Arc::new(Playbook::new(&stem, parse_playbook(&source)?));
            first.get_or_insert_with(|| playbook.clone());
            by_type.insert(stem, playbook);
        }
    }

    let default = by_type
        .get(DEFAULT_CONTRACT_TYPE)
        .cloned()
        .or(first)
        .expect("at least one playbook loaded");

    Ok(PlaybookSet { by_type, default })
}
