pub mod ads;
pub mod auth;
pub mod bigquery;
mod http;
pub mod storage;

pub use ads::GoogleAdsClient;
pub use auth::{AccessTokenProvider, GoogleAdsCredentials};
pub use bigquery::BigQueryWarehouse;
pub use storage::GcsObjectStore;
