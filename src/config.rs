use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCfg {
    pub kind: String, // "imagen" | "mock"
    pub api_base: String,
    pub model: String,
    pub api_key_env: String,
}

impl Default for ProviderCfg {
    fn default() -> Self {
        Self {
            kind: "imagen".into(),
            api_base: "https://generativelanguage.googleapis.com".into(),
            model: "imagen-3.0-generate-002".into(),
            api_key_env: "JARGONVIZ_API_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogCfg {
    pub prompts_path: Option<PathBuf>,
    pub styles_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub provider: ProviderCfg,
    pub catalog: CatalogCfg,
    pub bind: String,
    /// Fixed RNG seed for scenario selection; OS entropy when unset.
    pub seed: Option<u64>,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            provider: ProviderCfg::default(),
            catalog: CatalogCfg::default(),
            bind: "127.0.0.1:8787".into(),
            seed: None,
        }
    }
}

impl AppCfg {
    /// Reads the YAML file if given, then applies `JARGONVIZ_*` env overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let txt = tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("Failed to read config file: {}", p.display()))?;
                Self::from_yaml(&txt)?
            }
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        serde_yaml::from_str(txt).context("Failed to parse config YAML")
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("JARGONVIZ_PROVIDER") { self.provider.kind = v; }
        if let Some(v) = get("JARGONVIZ_API_BASE") { self.provider.api_base = v; }
        if let Some(v) = get("JARGONVIZ_MODEL") { self.provider.model = v; }
        if let Some(v) = get("JARGONVIZ_BIND") { self.bind = v; }
        if let Some(v) = get("JARGONVIZ_SEED").and_then(|v| v.parse().ok()) { self.seed = Some(v); }
    }

    /// The secret itself. Missing keys are passed through as empty and left
    /// for the upstream to reject.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = AppCfg::from_yaml("provider:\n  kind: mock\nseed: 9\n").unwrap();
        assert_eq!(cfg.provider.kind, "mock");
        assert_eq!(cfg.provider.model, "imagen-3.0-generate-002");
        assert_eq!(cfg.bind, "127.0.0.1:8787");
        assert_eq!(cfg.seed, Some(9));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = AppCfg::default();
        cfg.apply_env(|k| match k {
            "JARGONVIZ_MODEL" => Some("imagen-4".into()),
            "JARGONVIZ_SEED" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(cfg.provider.model, "imagen-4");
        assert_eq!(cfg.seed, None);
    }
}
