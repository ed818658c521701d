//! Caller-facing model names and their backend deployment identifiers.
//!
//! The table is built once at startup and shared read-only between requests.

use std::collections::BTreeMap;

use crate::config::ConfigError;

/// Model name used when a caller asks for something the table doesn't know.
pub const DEFAULT_MODEL: &str = "deepseek-r1";

/// Built-in mapping of model names to Ark endpoint ids.
const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("deepseek-r1", "ep-20250218144306-sshj5"),
    ("deepseek-v3", "ep-20250218170310-pvmdb"),
    ("deepseek-r1-distill-qwen-7b", "ep-20250218182157-7rdv4"),
    ("deepseek-r1-distill-qwen-32b", "ep-20250218182233-vxkqv"),
];

/// Mapping from caller-facing model names to deployment identifiers.
///
/// Always contains its default entry, which makes [`ModelTable::resolve`]
/// total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTable {
    entries: BTreeMap<String, String>,
    default_model: String,
}

impl ModelTable {
    /// Build a table, checking that the default entry exists and that no
    /// deployment identifier is blank.
    pub fn new(
        entries: BTreeMap<String, String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let default_model = default_model.into();

        if let Some((name, _)) = entries.iter().find(|(_, id)| id.trim().is_empty()) {
            return Err(ConfigError::EmptyDeployment(name.clone()));
        }
        if !entries.contains_key(&default_model) {
            return Err(ConfigError::MissingDefaultModel(default_model));
        }

        Ok(Self {
            entries,
            default_model,
        })
    }

    /// Re-target the fallback to another entry of the same table.
    pub fn with_default(self, default_model: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(self.entries, default_model)
    }

    /// The table shipped with the gateway.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN_MODELS
            .iter()
            .map(|(name, id)| ((*name).to_string(), (*id).to_string()))
            .collect();

        Self {
            entries,
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Resolve a model name, falling back to the default entry for unknown
    /// names (including the empty string).
    #[must_use]
    pub fn resolve(&self, model: &str) -> &str {
        self.lookup(model).unwrap_or_else(|| self.default_deployment())
    }

    /// Exact-match lookup without fallback.
    #[must_use]
    pub fn lookup(&self, model: &str) -> Option<&str> {
        self.entries.get(model).map(String::as_str)
    }

    /// Name of the default entry.
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Deployment identifier of the default entry.
    #[must_use]
    pub fn default_deployment(&self) -> &str {
        self.entries
            .get(&self.default_model)
            .map_or("", String::as_str)
    }

    /// Known caller-facing model names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::builtin()
    }
}
