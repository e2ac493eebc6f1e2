use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::descriptors;
use crate::error::AppError;
use crate::models::{AdGroup, AdGroupAd, Account, Campaign, EntityKind};
use crate::schema::FieldDescriptor;

/// One extractable entity kind: how to query it, how often to checkpoint,
/// and how to project a search row into it.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Declarative search query selecting this entity's fields.
    const QUERY: &'static str;

    /// Flush to staging every time this many rows have been accumulated.
    /// `None` buffers the whole result set.
    const CHECKPOINT: Option<usize>;

    fn wire_schema() -> Vec<FieldDescriptor> {
        descriptors::for_kind(Self::KIND)
    }

    /// Extract the entity from a raw search row.
    fn project(row: &serde_json::Value) -> Result<Self, AppError> {
        let key = Self::KIND.row_key();
        let value = row.get(key).cloned().ok_or_else(|| {
            AppError::Generic(format!("search row has no '{key}' object"))
        })?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;
    const QUERY: &'static str = "SELECT customer_client_link.client_customer, \
        customer_client_link.resource_name, customer_client_link.manager_link_id, \
        customer_client_link.status FROM customer_client_link";
    const CHECKPOINT: Option<usize> = None;
}

impl Entity for Campaign {
    const KIND: EntityKind = EntityKind::Campaign;
    const QUERY: &'static str = "SELECT campaign.ad_serving_optimization_status, \
        campaign.campaign_budget, campaign.end_date, campaign.id, campaign.name, \
        campaign.resource_name, campaign.serving_status, campaign.start_date, \
        campaign.status FROM campaign";
    const CHECKPOINT: Option<usize> = Some(20_000);
}

impl Entity for AdGroup {
    const KIND: EntityKind = EntityKind::AdGroup;
    const QUERY: &'static str = "SELECT ad_group.resource_name, ad_group.id, ad_group.name, \
        ad_group.status, ad_group.type, ad_group.ad_rotation_mode, \
        ad_group.tracking_url_template, ad_group.url_custom_parameters, ad_group.campaign, \
        ad_group.cpc_bid_micros, ad_group.cpm_bid_micros, ad_group.cpv_bid_micros, \
        ad_group.percent_cpc_bid_micros FROM ad_group";
    const CHECKPOINT: Option<usize> = Some(20_000);
}

impl Entity for AdGroupAd {
    const KIND: EntityKind = EntityKind::AdGroupAd;
    const QUERY: &'static str = "SELECT ad_group_ad.ad.id, ad_group_ad.resource_name, \
        ad_group_ad.status, ad_group_ad.ad_group, ad_group_ad.policy_summary \
        FROM ad_group_ad";
    const CHECKPOINT: Option<usize> = Some(50_000);
}

/// Search query for an entity kind.
pub fn query_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Account => Account::QUERY,
        EntityKind::Campaign => Campaign::QUERY,
        EntityKind::AdGroup => AdGroup::QUERY,
        EntityKind::AdGroupAd => AdGroupAd::QUERY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_reads_nested_row() {
        let row = serde_json::json!({
            "adGroupAd": {
                "resourceName": "customers/1/adGroupAds/2~3",
                "status": "ENABLED",
                "adGroup": "customers/1/adGroups/2",
                "ad": {"resourceName": "customers/1/ads/3", "id": "3"},
                "policySummary": {
                    "approvalStatus": "APPROVED",
                    "reviewStatus": "REVIEWED",
                    "policyTopicEntries": [{"topic": "TRADEMARKS", "type": "LIMITED"}]
                }
            }
        });
        let ad = AdGroupAd::project(&row).unwrap();
        assert_eq!(ad.ad.as_ref().and_then(|a| a.id.as_deref()), Some("3"));
        let summary = ad.policy_summary.unwrap();
        assert_eq!(summary.approval_status.as_deref(), Some("APPROVED"));
        assert_eq!(summary.policy_topic_entries[0].entry_type.as_deref(), Some("LIMITED"));
    }

    #[test]
    fn test_project_rejects_foreign_row() {
        let row = serde_json::json!({"campaign": {"id": "1"}});
        assert!(AdGroup::project(&row).is_err());
        assert!(Campaign::project(&row).is_ok());
    }

    #[test]
    fn test_checkpoints() {
        assert_eq!(Account::CHECKPOINT, None);
        assert_eq!(Campaign::CHECKPOINT, Some(20_000));
        assert_eq!(AdGroup::CHECKPOINT, Some(20_000));
        assert_eq!(AdGroupAd::CHECKPOINT, Some(50_000));
    }

    #[test]
    fn test_queries_select_from_resource() {
        for kind in EntityKind::ALL {
            let query = query_for(kind);
            assert!(query.starts_with("SELECT "));
            let resource = match kind {
                EntityKind::Account => "customer_client_link",
                other => other.as_str(),
            };
            assert!(query.ends_with(&format!("FROM {resource}")), "{query}");
        }
    }
}
