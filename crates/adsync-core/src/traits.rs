use std::future::Future;

use futures::stream::BoxStream;

use crate::error::AppError;
use crate::schema::FieldSpec;

/// Lazily paginated stream of raw search rows.
pub type RowStream = BoxStream<'static, Result<serde_json::Value, AppError>>;

/// Runs declarative search queries against the ads platform.
pub trait AdsApi: Send + Sync + Clone {
    /// Submit `query` scoped to `customer_id`. Pages are fetched on demand as
    /// the returned stream is polled.
    fn search(&self, customer_id: &str, query: &str) -> RowStream;
}

/// Blob storage used as the staging layer between fetch and load.
pub trait ObjectStore: Send + Sync + Clone {
    /// Create the bucket if it does not exist yet.
    fn ensure_bucket(&self, bucket: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn write_blob(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Columnar analytics warehouse.
pub trait Warehouse: Send + Sync + Clone {
    /// Delete a table. Returns `false` if it did not exist.
    fn delete_table(
        &self,
        dataset: &str,
        table: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Append the NDJSON content at `uri` to `table`, creating it with
    /// `schema` if needed. Blocks until the load job completes and returns
    /// the table's row count afterwards.
    fn load_from_uri(
        &self,
        dataset: &str,
        table: &str,
        schema: &[FieldSpec],
        uri: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
