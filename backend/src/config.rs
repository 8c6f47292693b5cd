use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

use thiserror::Error;
use wheel_core::{Catalog, Prize};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_FILE: &str = "data.json";
pub const DEFAULT_ADMIN_KEY: &str = "changeme";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),
    #[error("cannot read prizes file {path}: {source}")]
    PrizesFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid prizes file: {0}")]
    PrizesJson(#[from] serde_json::Error),
    #[error("prizes file has no prizes")]
    EmptyCatalog,
    #[error("prize id {0} appears more than once")]
    DuplicatePrizeId(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub data_file: PathBuf,
    pub admin_key: String,
    pub prizes_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };

        let data_file = lookup("DATA_FILE")
            .or_else(|| lookup("PERSIST_PATH"))
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_FILE.to_string());

        let admin_key = lookup("ADMIN_KEY")
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| DEFAULT_ADMIN_KEY.to_string());

        Ok(Self {
            port,
            data_file: PathBuf::from(data_file),
            admin_key,
            prizes_file: lookup("PRIZES_FILE")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// The built-in catalog, or the one in `PRIZES_FILE` when set.
    pub async fn load_catalog(&self) -> Result<Catalog, ConfigError> {
        let Some(path) = &self.prizes_file else {
            return Ok(Catalog::builtin());
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ConfigError::PrizesFile {
                path: path.clone(),
                source,
            })?;
        parse_catalog(&bytes)
    }
}

pub fn parse_catalog(bytes: &[u8]) -> Result<Catalog, ConfigError> {
    let prizes: Vec<Prize> = serde_json::from_slice(bytes)?;
    if prizes.is_empty() {
        return Err(ConfigError::EmptyCatalog);
    }
    let mut seen = HashSet::new();
    for prize in &prizes {
        if !seen.insert(prize.id) {
            return Err(ConfigError::DuplicatePrizeId(prize.id));
        }
    }
    Ok(Catalog::new(prizes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.data_file, PathBuf::from(DEFAULT_DATA_FILE));
        assert_eq!(cfg.admin_key, DEFAULT_ADMIN_KEY);
        assert_eq!(cfg.prizes_file, None);
    }

    #[test]
    fn reads_overrides_and_persist_path_alias() {
        let cfg = config(&[
            ("PORT", "8080"),
            ("PERSIST_PATH", "/tmp/wheel.json"),
            ("ADMIN_KEY", "s3cret"),
            ("PRIZES_FILE", "prizes.json"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.data_file, PathBuf::from("/tmp/wheel.json"));
        assert_eq!(cfg.admin_key, "s3cret");
        assert_eq!(cfg.prizes_file, Some(PathBuf::from("prizes.json")));

        let cfg = config(&[("DATA_FILE", "a.json"), ("PERSIST_PATH", "b.json")]).unwrap();
        assert_eq!(cfg.data_file, PathBuf::from("a.json"));
    }

    #[test]
    fn rejects_bad_port() {
        assert!(matches!(
            config(&[("PORT", "http")]),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn prizes_file_parsing() {
        let catalog = parse_catalog(
            br##"[{"id":1,"name":"Mug","desc":"","tier":1,"tierName":"Top","color":"#112233","visualWeight":1,"prob":2}]"##,
        )
        .unwrap();
        assert_eq!(catalog.prizes().len(), 1);
        assert_eq!(catalog.get(1).unwrap().count, 1);

        assert!(matches!(parse_catalog(b"[]"), Err(ConfigError::EmptyCatalog)));
        let dup = br##"[
            {"id":1,"name":"a","desc":"","tier":1,"tierName":"t","color":"#000000","visualWeight":1,"prob":1},
            {"id":1,"name":"b","desc":"","tier":1,"tierName":"t","color":"#000000","visualWeight":1,"prob":1}
        ]"##;
        assert!(matches!(
            parse_catalog(dup),
            Err(ConfigError::DuplicatePrizeId(1))
        ));
    }
}
