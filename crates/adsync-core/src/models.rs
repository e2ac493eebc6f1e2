use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Format of the date partition used in blob paths, blob names and table names.
pub const PARTITION_FORMAT: &str = "%Y%m%d";

/// Render a date as its `YYYYMMDD` partition key.
pub fn partition_key(date: NaiveDate) -> String {
    date.format(PARTITION_FORMAT).to_string()
}

/// The four entity kinds extracted from the ads platform, one per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Account,
    Campaign,
    AdGroup,
    AdGroupAd,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::Campaign,
        EntityKind::AdGroup,
        EntityKind::AdGroupAd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Campaign => "campaign",
            EntityKind::AdGroup => "ad_group",
            EntityKind::AdGroupAd => "ad_group_ad",
        }
    }

    /// Prefix used in staged blob names.
    pub fn blob_prefix(&self) -> &'static str {
        match self {
            EntityKind::Account => "accounts",
            other => other.as_str(),
        }
    }

    /// Key under which the platform nests this entity in a search row.
    pub fn row_key(&self) -> &'static str {
        match self {
            EntityKind::Account => "customerClientLink",
            EntityKind::Campaign => "campaign",
            EntityKind::AdGroup => "adGroup",
            EntityKind::AdGroupAd => "adGroupAd",
        }
    }

    /// Human-readable stage label used in status lines.
    pub fn stage_label(&self) -> &'static str {
        match self {
            EntityKind::Account => "Customers",
            EntityKind::Campaign => "Campaigns",
            EntityKind::AdGroup => "AdGroups",
            EntityKind::AdGroupAd => "AdGroupAds",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "account" | "accounts" | "customer" | "customers" => Ok(EntityKind::Account),
            "campaign" | "campaigns" => Ok(EntityKind::Campaign),
            "ad_group" | "ad_groups" | "adgroup" | "adgroups" => Ok(EntityKind::AdGroup),
            "ad_group_ad" | "ad_group_ads" | "adgroupad" | "adgroupads" => {
                Ok(EntityKind::AdGroupAd)
            }
            _ => Err(format!("Unknown entity kind: {}", s)),
        }
    }
}

/// Lifecycle status of a manager → client link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountStatus {
    Active,
    Inactive,
    Pending,
    Refused,
    Canceled,
    #[default]
    Unspecified,
    Unknown,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Pending => "PENDING",
            AccountStatus::Refused => "REFUSED",
            AccountStatus::Canceled => "CANCELED",
            AccountStatus::Unspecified => "UNSPECIFIED",
            AccountStatus::Unknown => "UNKNOWN",
        }
    }
}

impl From<String> for AccountStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ACTIVE" => AccountStatus::Active,
            "INACTIVE" => AccountStatus::Inactive,
            "PENDING" => AccountStatus::Pending,
            "REFUSED" => AccountStatus::Refused,
            "CANCELED" => AccountStatus::Canceled,
            "UNSPECIFIED" => AccountStatus::Unspecified,
            _ => AccountStatus::Unknown,
        }
    }
}

impl From<AccountStatus> for String {
    fn from(value: AccountStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entities
//
// Rows come from the REST API with lowerCamelCase keys; records are written
// back with the platform's snake_case field names. 64-bit integers travel as
// JSON strings and are kept that way.
// ---------------------------------------------------------------------------

/// A client account linked under the manager account.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct Account {
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Resource name of the client, e.g. `customers/1234567890`.
    #[serde(default)]
    pub client_customer: String,
    #[serde(default)]
    pub manager_link_id: Option<String>,
    #[serde(default)]
    pub status: AccountStatus,
}

impl Account {
    pub fn new(client_customer: impl Into<String>, status: AccountStatus) -> Self {
        Self {
            client_customer: client_customer.into(),
            status,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct Campaign {
    pub resource_name: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub serving_status: Option<String>,
    pub ad_serving_optimization_status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub campaign_budget: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct CustomParameter {
    pub key: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct AdGroup {
    pub resource_name: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<String>,
    pub ad_rotation_mode: Option<String>,
    pub tracking_url_template: Option<String>,
    pub url_custom_parameters: Vec<CustomParameter>,
    pub campaign: Option<String>,
    pub cpc_bid_micros: Option<String>,
    pub cpm_bid_micros: Option<String>,
    pub cpv_bid_micros: Option<String>,
    pub percent_cpc_bid_micros: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct AdRef {
    pub resource_name: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct PolicyTopicEntry {
    pub topic: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct PolicySummary {
    pub policy_topic_entries: Vec<PolicyTopicEntry>,
    pub review_status: Option<String>,
    pub approval_status: Option<String>,
}

/// Writes a singular nested message as a zero- or one-element array.
///
/// Record columns are always REPEATED in the warehouse schema, and NDJSON
/// loads reject a bare object in a repeated column.
fn as_repeated<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    value.as_slice().serialize(serializer)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct AdGroupAd {
    pub resource_name: Option<String>,
    pub status: Option<String>,
    pub ad_group: Option<String>,
    #[serde(serialize_with = "as_repeated")]
    pub ad: Option<AdRef>,
    #[serde(serialize_with = "as_repeated")]
    pub policy_summary: Option<PolicySummary>,
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// A blob written once to object storage and read once by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBlob {
    pub bucket: String,
    pub date: NaiveDate,
    /// Unqualified blob name, without the date prefix.
    pub name: String,
}

impl StagedBlob {
    /// Object path inside the bucket: `<YYYYMMDD>/<name>`.
    pub fn path(&self) -> String {
        format!("{}/{}", partition_key(self.date), self.name)
    }

    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.path())
    }
}
