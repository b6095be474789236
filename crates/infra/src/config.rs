//! Runtime configuration, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `STOCKBOOK_MAX_CONFLICT_RETRIES` | `3` | Extra attempts after a concurrency conflict |
//! | `STOCKBOOK_NEGATIVE_STOCK` | `allow` | `allow` or `reject` outbound changes below zero |
//! | `STOCKBOOK_PAGE_SIZE` | `50` | Page size when a list query passes none |
//! | `DATABASE_URL` | unset | Postgres connection string; unset means in-memory |
//! | `STOCKBOOK_DB_MAX_CONNECTIONS` | `5` | Pool size for Postgres |

use thiserror::Error;

use stockbook_inventory::NegativeStockPolicy;

use crate::store::MAX_PAGE_SIZE;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub max_conflict_retries: u32,
    pub negative_stock: NegativeStockPolicy,
    pub default_page_size: u32,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            negative_stock: NegativeStockPolicy::Allow,
            default_page_size: 50,
            database_url: None,
            db_max_connections: 5,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup("STOCKBOOK_MAX_CONFLICT_RETRIES") {
            cfg.max_conflict_retries = parse_u32("STOCKBOOK_MAX_CONFLICT_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("STOCKBOOK_NEGATIVE_STOCK") {
            cfg.negative_stock = raw.parse().map_err(|e: stockbook_core::DomainError| {
                ConfigError::Invalid {
                    var: "STOCKBOOK_NEGATIVE_STOCK",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = lookup("STOCKBOOK_PAGE_SIZE") {
            let size = parse_u32("STOCKBOOK_PAGE_SIZE", &raw)?;
            if size == 0 || size > MAX_PAGE_SIZE {
                return Err(ConfigError::Invalid {
                    var: "STOCKBOOK_PAGE_SIZE",
                    value: raw,
                    reason: format!("must be between 1 and {MAX_PAGE_SIZE}"),
                });
            }
            cfg.default_page_size = size;
        }
        cfg.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if let Some(raw) = lookup("STOCKBOOK_DB_MAX_CONNECTIONS") {
            cfg.db_max_connections = parse_u32("STOCKBOOK_DB_MAX_CONNECTIONS", &raw)?.max(1);
        }

        Ok(cfg)
    }
}

fn parse_u32(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_environment_gives_defaults() {
        let cfg = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.negative_stock, NegativeStockPolicy::Allow);
    }

    #[test]
    fn values_are_parsed() {
        let cfg = LedgerConfig::from_lookup(lookup(&[
            ("STOCKBOOK_MAX_CONFLICT_RETRIES", "0"),
            ("STOCKBOOK_NEGATIVE_STOCK", "Reject"),
            ("STOCKBOOK_PAGE_SIZE", "200"),
            ("DATABASE_URL", "postgres://localhost/stock"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_conflict_retries, 0);
        assert_eq!(cfg.negative_stock, NegativeStockPolicy::Reject);
        assert_eq!(cfg.default_page_size, 200);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/stock"));
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = LedgerConfig::from_lookup(lookup(&[("STOCKBOOK_PAGE_SIZE", "5000")])).unwrap_err();
        assert!(err.to_string().starts_with("STOCKBOOK_PAGE_SIZE"));

        let err =
            LedgerConfig::from_lookup(lookup(&[("STOCKBOOK_NEGATIVE_STOCK", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "STOCKBOOK_NEGATIVE_STOCK", .. }));
    }
}
