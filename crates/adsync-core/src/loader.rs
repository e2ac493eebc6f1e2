use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{StagedBlob, partition_key};
use crate::schema::FieldSpec;
use crate::traits::Warehouse;

/// Placeholder in table name templates replaced by the date partition.
pub const DATE_PLACEHOLDER: &str = "[YYYYMMDD]";

/// Resolve a table name template such as `campaigns_[YYYYMMDD]`.
pub fn resolve_table(template: &str, date: NaiveDate) -> String {
    template.replace(DATE_PLACEHOLDER, &partition_key(date))
}

/// Loads staged blobs into tables of one dataset.
#[derive(Debug, Clone)]
pub struct WarehouseLoader<W: Warehouse> {
    warehouse: W,
    dataset: String,
}

impl<W: Warehouse> WarehouseLoader<W> {
    pub fn new(warehouse: W, dataset: impl Into<String>) -> Self {
        Self {
            warehouse,
            dataset: dataset.into(),
        }
    }

    /// Delete `table` if it exists. Returns whether a table was removed.
    pub async fn ensure_table_absent(&self, table: &str) -> Result<bool, AppError> {
        let removed = self.warehouse.delete_table(&self.dataset, table).await?;
        if removed {
            tracing::info!(dataset = %self.dataset, table, "Deleted table");
        } else {
            tracing::debug!(dataset = %self.dataset, table, "Table already absent");
        }
        Ok(removed)
    }

    /// Append one blob to `table`, creating it with `schema` if missing.
    /// Returns the table's row count after the load.
    pub async fn load(
        &self,
        table: &str,
        schema: &[FieldSpec],
        blob: &StagedBlob,
    ) -> Result<u64, AppError> {
        let uri = blob.uri();
        let rows = self
            .warehouse
            .load_from_uri(&self.dataset, table, schema, &uri)
            .await?;
        tracing::info!(dataset = %self.dataset, table, %uri, table_rows = rows, "Loaded blob");
        Ok(rows)
    }
}
