use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Account, AccountStatus, EntityKind};

static CUSTOMER_RESOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^customers/(\d+)$").expect("valid customer resource regex"));

const CUSTOMER_PREFIX: &str = "customers/";

/// Decides which roster accounts a stage fans out to.
pub trait EligibilityPolicy: Send + Sync {
    /// The account id to fetch for, or `None` if the account is skipped.
    fn eligible_id(&self, account: &Account) -> Option<String>;

    fn select(&self, accounts: &[Account]) -> Vec<String> {
        accounts
            .iter()
            .filter_map(|account| self.eligible_id(account))
            .collect()
    }
}

/// ACTIVE accounts whose resource name is exactly `customers/<digits>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveCustomerPolicy;

impl EligibilityPolicy for ActiveCustomerPolicy {
    fn eligible_id(&self, account: &Account) -> Option<String> {
        if account.status != AccountStatus::Active {
            return None;
        }
        CUSTOMER_RESOURCE
            .captures(&account.client_customer)
            .map(|caps| caps[1].to_string())
    }
}

/// Every account that is not INACTIVE.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotInactivePolicy;

impl EligibilityPolicy for NotInactivePolicy {
    fn eligible_id(&self, account: &Account) -> Option<String> {
        if account.status == AccountStatus::Inactive {
            return None;
        }
        let id = account
            .client_customer
            .strip_prefix(CUSTOMER_PREFIX)
            .unwrap_or(&account.client_customer);
        (!id.is_empty()).then(|| id.to_string())
    }
}

/// The policy a dependent stage uses. Accounts have no roster filter.
pub fn policy_for(kind: EntityKind) -> Option<&'static dyn EligibilityPolicy> {
    match kind {
        EntityKind::Account => None,
        EntityKind::Campaign => Some(&ActiveCustomerPolicy),
        EntityKind::AdGroup | EntityKind::AdGroupAd => Some(&NotInactivePolicy),
    }
}
