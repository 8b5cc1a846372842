use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Eloquent's default page size for simple pagination.
pub const DEFAULT_PER_PAGE: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Postgres,
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            other => bail!("unknown RELATIONS_STORE '{other}' (expected memory or postgres)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub models_path: PathBuf,
    pub per_page: u64,
    pub write_openapi: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind = lookup("RELATIONS_BIND").unwrap_or_else(|| "127.0.0.1:8080".into());
        let store = match lookup("RELATIONS_STORE") {
            Some(value) => value.parse()?,
            None => StoreKind::Memory,
        };
        let database_url = lookup("DATABASE_URL");
        if store == StoreKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required when RELATIONS_STORE=postgres");
        }
        let models_path = lookup("RELATIONS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("relations.yaml"));
        let per_page = match lookup("RELATIONS_PER_PAGE") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| format!("RELATIONS_PER_PAGE must be a positive integer, got '{value}'"))?,
            None => DEFAULT_PER_PAGE,
        };

        let write_openapi = lookup("RELATIONS_WRITE_OPENAPI")
            .is_some_and(|value| matches!(value.as_str(), "1" | "true" | "yes"));

        Ok(Self {
            bind,
            store,
            database_url,
            models_path,
            per_page,
            write_openapi,
        })
    }
}

/// The YAML file describing models, their relation accessors and optional
/// seed data for the memory store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsFile {
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub seed: SeedConfig,
}

impl ModelsFile {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid models file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub table: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationConfig>,
}

fn default_key() -> String {
    "id".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationConfig {
    BelongsToMany {
        related: String,
        pivot: String,
        foreign_pivot_key: String,
        related_pivot_key: String,
    },
    HasMany {
        related: String,
        foreign_key: String,
    },
}

impl RelationConfig {
    pub fn related(&self) -> &str {
        match self {
            RelationConfig::BelongsToMany { related, .. } | RelationConfig::HasMany { related, .. } => {
                related
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    /// Table name to rows.
    #[serde(default)]
    pub rows: BTreeMap<String, Vec<Value>>,
    /// Pivot table name to column maps.
    #[serde(default)]
    pub pivots: BTreeMap<String, Vec<BTreeMap<String, i64>>>,
}
