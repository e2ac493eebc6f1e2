use std::num::NonZeroUsize;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::loader::resolve_table;
use crate::models::EntityKind;

/// Where extracted data lands and how it is staged.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub project: String,
    pub dataset: String,
    pub bucket: String,
    /// Manager (MCC) account id whose client links form the roster.
    pub mcc_id: String,
    pub account_table: String,
    pub campaign_table: String,
    pub ad_group_table: String,
    pub ad_group_ad_table: String,
    /// Maximum number of records per staged blob.
    pub chunk_size: NonZeroUsize,
}

impl PipelineConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

    /// Read configuration from environment variables.
    ///
    /// - `ADSYNC_PROJECT`, `ADSYNC_DATASET`, `ADSYNC_BUCKET`, `ADSYNC_MCC_ID` (required)
    /// - `ADSYNC_ACCOUNT_TABLE`, `ADSYNC_CAMPAIGN_TABLE`, `ADSYNC_AD_GROUP_TABLE`,
    ///   `ADSYNC_AD_GROUP_AD_TABLE` (optional, `[YYYYMMDD]` templates)
    /// - `ADSYNC_CHUNK_SIZE` (optional, defaults to 20000)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::ConfigError(format!("{key} not set")))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let chunk_size = match lookup("ADSYNC_CHUNK_SIZE") {
            None => NonZeroUsize::new(Self::DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN),
            Some(raw) => raw
                .parse::<NonZeroUsize>()
                .map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid ADSYNC_CHUNK_SIZE '{raw}': must be a positive integer"
                    ))
                })?,
        };

        Ok(Self {
            project: required("ADSYNC_PROJECT")?,
            dataset: required("ADSYNC_DATASET")?,
            bucket: required("ADSYNC_BUCKET")?,
            mcc_id: required("ADSYNC_MCC_ID")?.replace('-', ""),
            account_table: optional("ADSYNC_ACCOUNT_TABLE", "accounts_[YYYYMMDD]"),
            campaign_table: optional("ADSYNC_CAMPAIGN_TABLE", "campaigns_[YYYYMMDD]"),
            ad_group_table: optional("ADSYNC_AD_GROUP_TABLE", "ad_groups_[YYYYMMDD]"),
            ad_group_ad_table: optional("ADSYNC_AD_GROUP_AD_TABLE", "ad_group_ads_[YYYYMMDD]"),
            chunk_size,
        })
    }

    pub fn table_template(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Account => &self.account_table,
            EntityKind::Campaign => &self.campaign_table,
            EntityKind::AdGroup => &self.ad_group_table,
            EntityKind::AdGroupAd => &self.ad_group_ad_table,
        }
    }

    /// The day's table for a stage.
    pub fn table_for(&self, kind: EntityKind, date: NaiveDate) -> String {
        resolve_table(self.table_template(kind), date)
    }
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

    const REQUIRED: [(&str, &str); 4] = [
        ("ADSYNC_PROJECT", "acme-data"),
        ("ADSYNC_DATASET", "ads"),
        ("ADSYNC_BUCKET", "acme-ads-staging"),
        ("ADSYNC_MCC_ID", "123-456-7890"),
    ];

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.mcc_id, "1234567890");
        assert_eq!(config.chunk_size.get(), 20_000);

        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(config.table_for(EntityKind::Campaign, date), "campaigns_20261019");
        assert_eq!(config.table_for(EntityKind::Account, date), "accounts_20261019");
    }

    #[test]
    fn test_missing_required() {
        let err = PipelineConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(err.to_string().contains("ADSYNC_MCC_ID"));
    }

    #[test]
    fn test_chunk_size_validation() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ADSYNC_CHUNK_SIZE", "0"));
        assert!(PipelineConfig::from_lookup(lookup(&pairs)).is_err());

        pairs.pop();
        pairs.push(("ADSYNC_CHUNK_SIZE", "500"));
        let config = PipelineConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.chunk_size.get(), 500);
    }
}
