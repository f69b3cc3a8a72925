//! Runtime configuration read from `MIXLEDGER_*` environment variables.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mixledger_core::DomainResult;
use mixledger_observability::LogFormat;
use mixledger_production::{
    BomPlanner, DiluentMatchers, RatioCalculator, DEFAULT_RATIO_THRESHOLD,
};

use crate::adjustment_engine::{InventoryAdjustmentEngine, DEFAULT_MAX_COMMIT_ATTEMPTS};
use crate::stock_store::StockStore;

pub const ENV_MAX_COMMIT_ATTEMPTS: &str = "MIXLEDGER_MAX_COMMIT_ATTEMPTS";
pub const ENV_RATIO_THRESHOLD: &str = "MIXLEDGER_RATIO_THRESHOLD";
pub const ENV_PG_CODES: &str = "MIXLEDGER_PG_CODES";
pub const ENV_PG_NAMES: &str = "MIXLEDGER_PG_NAMES";
pub const ENV_VG_CODES: &str = "MIXLEDGER_VG_CODES";
pub const ENV_VG_NAMES: &str = "MIXLEDGER_VG_NAMES";
pub const ENV_LOG_FORMAT: &str = "MIXLEDGER_LOG_FORMAT";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_commit_attempts: u32,
    /// Fragrance percentage at which propylene glycol drops out.
    pub ratio_threshold: Decimal,
    pub diluents: DiluentMatchers,
    pub log_format: LogFormat,
    /// Only needed for the Postgres store.
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            diluents: DiluentMatchers::default(),
            log_format: LogFormat::default(),
            database_url: None,
        }
    }
}

impl LedgerConfig {
    /// Read the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    ///
    /// Unparseable numbers are errors. An unknown log format falls back to
    /// JSON with a warning so logging still comes up.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = value(ENV_MAX_COMMIT_ATTEMPTS) {
            let attempts: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_COMMIT_ATTEMPTS}='{raw}' is not a whole number"))?;
            anyhow::ensure!(attempts >= 1, "{ENV_MAX_COMMIT_ATTEMPTS} must be at least 1");
            config.max_commit_attempts = attempts;
        }

        if let Some(raw) = value(ENV_RATIO_THRESHOLD) {
            let threshold: Decimal = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_RATIO_THRESHOLD}='{raw}' is not a number"))?;
            RatioCalculator::new(threshold)
                .with_context(|| format!("{ENV_RATIO_THRESHOLD}='{raw}' is out of range"))?;
            config.ratio_threshold = threshold;
        }

        override_list(&mut config.diluents.propylene_glycol.codes, value(ENV_PG_CODES));
        override_list(&mut config.diluents.propylene_glycol.names, value(ENV_PG_NAMES));
        override_list(&mut config.diluents.vegetable_glycerin.codes, value(ENV_VG_CODES));
        override_list(&mut config.diluents.vegetable_glycerin.names, value(ENV_VG_NAMES));

        if let Some(raw) = value(ENV_LOG_FORMAT) {
            config.log_format = raw.parse().unwrap_or_else(|err| {
                tracing::warn!(%err, "falling back to json logs");
                LogFormat::Json
            });
        }

        config.database_url = value(ENV_DATABASE_URL);
        Ok(config)
    }

    pub fn ratio_calculator(&self) -> DomainResult<RatioCalculator> {
        RatioCalculator::new(self.ratio_threshold)
    }

    pub fn planner(&self) -> DomainResult<BomPlanner> {
        Ok(BomPlanner::new(self.ratio_calculator()?, self.diluents.clone()))
    }

    pub fn engine<S: StockStore>(&self, store: S) -> InventoryAdjustmentEngine<S> {
        InventoryAdjustmentEngine::new(store).with_max_attempts(self.max_commit_attempts)
    }
}

fn override_list(target: &mut Vec<String>, raw: Option<String>) {
    if let Some(raw) = raw {
        *target = split_list(&raw);
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.max_commit_attempts, 3);
        assert_eq!(config.ratio_threshold, dec!(60));
        assert_eq!(config.diluents.vegetable_glycerin.names, vec!["甘油", "丙三醇"]);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (ENV_MAX_COMMIT_ATTEMPTS, "5"),
            (ENV_RATIO_THRESHOLD, "55.5"),
            (ENV_PG_CODES, "PG, PG-USP ,"),
            (ENV_LOG_FORMAT, "pretty"),
            (ENV_DATABASE_URL, "postgres://localhost/mixledger"),
        ]))
        .unwrap();

        assert_eq!(config.max_commit_attempts, 5);
        assert_eq!(config.ratio_threshold, dec!(55.5));
        assert_eq!(config.diluents.propylene_glycol.codes, vec!["PG", "PG-USP"]);
        assert_eq!(config.diluents.propylene_glycol.names, vec!["丙二醇"]);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.engine(crate::stock_store::InMemoryStockStore::new()).max_attempts(), 5);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(LedgerConfig::from_lookup(lookup(&[(ENV_MAX_COMMIT_ATTEMPTS, "0")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[(ENV_MAX_COMMIT_ATTEMPTS, "many")])).is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        assert!(LedgerConfig::from_lookup(lookup(&[(ENV_RATIO_THRESHOLD, "120")])).is_err());
    }

    #[test]
    fn unknown_log_format_falls_back_to_json() {
        let config = LedgerConfig::from_lookup(lookup(&[(ENV_LOG_FORMAT, "xml")])).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn planner_uses_configured_threshold() {
        let config = LedgerConfig {
            ratio_threshold: dec!(50),
            ..LedgerConfig::default()
        };
        let planner = config.planner().unwrap();
        assert_eq!(planner.ratio_calculator().threshold(), dec!(50));
    }
}
