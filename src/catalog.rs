use std::{collections::HashMap, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

const BUILTIN_PROMPTS: &str = include_str!("../catalog/prompts.yaml");
const BUILTIN_STYLES: &str = include_str!("../catalog/styles.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub scenarios: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleEntry {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct PromptsYaml {
    terms: Vec<TermEntry>,
}

#[derive(Debug, Deserialize)]
struct StylesYaml {
    default: String,
    styles: Vec<StyleEntry>,
}

/// Term -> scenarios. Keys are stored lowercase; declaration order is kept
/// for listing.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    entries: Vec<TermEntry>,
    index: HashMap<String, usize>,
}

impl PromptCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_PROMPTS).context("built-in prompt catalog is invalid")
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        let doc: PromptsYaml = serde_yaml::from_str(txt).context("failed to parse prompt catalog YAML")?;
        Self::from_entries(doc.terms)
    }

    pub fn from_entries(entries: Vec<TermEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        let mut normalized = Vec::with_capacity(entries.len());
        for mut e in entries {
            e.term = e.term.trim().to_lowercase();
            if e.term.is_empty() {
                bail!("prompt catalog contains an empty term");
            }
            if index.insert(e.term.clone(), normalized.len()).is_some() {
                bail!("duplicate term in prompt catalog: {}", e.term);
            }
            normalized.push(e);
        }
        Ok(Self { entries: normalized, index })
    }

    /// Scenarios for `term`, matched case-insensitively.
    pub fn scenarios_for(&self, term: &str) -> Result<&[String], GenerateError> {
        self.index
            .get(&term.trim().to_lowercase())
            .map(|&i| self.entries[i].scenarios.as_slice())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GenerateError::NoScenarios { term: term.to_string() })
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.term.as_str())
    }

    pub fn entries(&self) -> &[TermEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone)]
pub struct StyleCatalog {
    default_style: String,
    entries: Vec<StyleEntry>,
    index: HashMap<String, usize>,
}

impl StyleCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_STYLES).context("built-in style catalog is invalid")
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        let doc: StylesYaml = serde_yaml::from_str(txt).context("failed to parse style catalog YAML")?;
        Self::from_entries(doc.default, doc.styles)
    }

    pub fn from_entries(default_style: String, entries: Vec<StyleEntry>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            if index.insert(e.name.clone(), i).is_some() {
                bail!("duplicate style in style catalog: {}", e.name);
            }
        }
        if !index.contains_key(&default_style) {
            bail!("default style is not in the style catalog: {default_style}");
        }
        Ok(Self { default_style, entries, index })
    }

    /// Unknown styles map to an empty description rather than an error.
    pub fn style_description_for(&self, style: &str) -> &str {
        self.index
            .get(style)
            .map(|&i| self.entries[i].description.as_str())
            .unwrap_or("")
    }

    pub fn default_style(&self) -> &str {
        &self.default_style
    }

    pub fn styles(&self) -> &[StyleEntry] {
        &self.entries
    }
}

/// Both catalogs, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub prompts: PromptCatalog,
    pub styles: StyleCatalog,
}

impl Catalog {
    #[cfg(test)]
    pub fn builtin() -> Result<Self> {
        Ok(Self { prompts: PromptCatalog::builtin()?, styles: StyleCatalog::builtin()? })
    }

    /// Loads from the given files, falling back to the built-in catalog for
    /// whichever path is `None`.
    pub async fn load(prompts_path: Option<&Path>, styles_path: Option<&Path>) -> Result<Self> {
        let prompts = match prompts_path {
            Some(p) => {
                let txt = tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("failed to read prompt catalog: {}", p.display()))?;
                PromptCatalog::from_yaml(&txt)?
            }
            None => PromptCatalog::builtin()?,
        };
        let styles = match styles_path {
            Some(p) => {
                let txt = tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("failed to read style catalog: {}", p.display()))?;
                StyleCatalog::from_yaml(&txt)?
            }
            None => StyleCatalog::builtin()?,
        };
        tracing::info!(
            terms = prompts.entries().len(),
            styles = styles.styles().len(),
            "catalog loaded"
        );
        Ok(Self { prompts, styles })
    }
}
