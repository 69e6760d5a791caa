use crate::error::{Error, Result};
use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};

pub const DEFAULT_CONFIG_PATH: &str = ".config/price_check.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Opaque account id; every stored collection is namespaced by it.
    #[serde(default = "default_user")]
    pub user: String,
    /// Supplier used when a command does not name one.
    #[serde(default)]
    pub selected_supplier: Option<String>,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub reconcile: ReconcileSettings,
}

fn default_db_path() -> String {
    "pricestore/prices.db".to_string()
}

fn default_user() -> String {
    "local".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user: default_user(),
            selected_supplier: None,
            llm: LlmSection::default(),
            reconcile: ReconcileSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Ollama,
    Cliproxy,
    #[default]
    Remote,
    /// Regex line parser, no model involved.
    Heuristics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    pub ollama: LlmEndpoint,
    pub cliproxy: LlmEndpoint,
    pub remote: LlmEndpoint,
    /// PDF text sent to the model is cut after this many characters.
    pub max_chars: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            ollama: LlmEndpoint {
                base_url: "http://localhost:11434/v1".to_string(),
                model: "qwen2.5vl:7b".to_string(),
            },
            cliproxy: LlmEndpoint {
                base_url: "http://localhost:8317/v1".to_string(),
                model: "gemini-2.5-pro".to_string(),
            },
            remote: LlmEndpoint {
                base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
                model: "gemini-2.5-pro".to_string(),
            },
            max_chars: 12_000,
        }
    }
}

/// What an upload does to the supplier's existing price list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceListMode {
    /// Entry-by-entry upsert; prices missing from the new list survive.
    #[default]
    Merge,
    /// The new list replaces the supplier's whole price list.
    Replace,
}

/// What to do when several local names of one supplier would map to the
/// same canonical name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Warn,
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub price_list_mode: PriceListMode,
    pub mapping_conflicts: ConflictPolicy,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Persist the default supplier, keeping the rest of the file as written.
    pub fn update_selected_supplier(path: impl AsRef<Path>, supplier_id: &str) -> Result<()> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            String::new()
        };
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|e| Error::Config(e.to_string()))?;

        doc["selected_supplier"] = value(supplier_id);

        fs::write(path, doc.to_string())?;
        Ok(())
    }
}
