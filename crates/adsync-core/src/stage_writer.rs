use std::num::NonZeroUsize;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::StagedBlob;
use crate::traits::ObjectStore;

/// Placeholder in a blob name template replaced by the chunk index.
pub const CHUNK_PLACEHOLDER: &str = "(chunk)";

/// Content type of every staged blob.
pub const CONTENT_TYPE: &str = "application/json";

/// Writes serialized records to object storage as size-bounded NDJSON blobs.
#[derive(Debug, Clone)]
pub struct StageWriter<S: ObjectStore> {
    store: S,
    bucket: String,
    chunk_size: NonZeroUsize,
}

impl<S: ObjectStore> StageWriter<S> {
    pub fn new(store: S, bucket: impl Into<String>, chunk_size: NonZeroUsize) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            chunk_size,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stage `records` under `<bucket>/<YYYYMMDD>/<name>`, where `name` is
    /// `template` with [`CHUNK_PLACEHOLDER`] resolved.
    ///
    /// Records are consumed one at a time. After each one, the buffer is
    /// flushed when the count still to process is a multiple of the chunk
    /// size, so chunk indexes count down and the last blob is chunk 1.
    /// Exactly `ceil(N / chunk_size)` blobs are written; only the first may
    /// be short.
    pub async fn write<I>(
        &self,
        records: I,
        date: NaiveDate,
        template: &str,
    ) -> Result<Vec<StagedBlob>, AppError>
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: ExactSizeIterator + Send,
    {
        let records = records.into_iter();
        let chunk = self.chunk_size.get();
        let mut remaining = records.len();
        let mut blobs = Vec::with_capacity(remaining.div_ceil(chunk));
        let mut buffer = String::new();

        for record in records {
            remaining = remaining.saturating_sub(1);
            buffer.push_str(&record);
            buffer.push('\n');

            if remaining % chunk == 0 {
                let index = remaining / chunk + 1;
                let blob = StagedBlob {
                    bucket: self.bucket.clone(),
                    date,
                    name: template.replace(CHUNK_PLACEHOLDER, &index.to_string()),
                };
                let content = std::mem::take(&mut buffer).into_bytes();
                let bytes = content.len();

                self.store
                    .write_blob(&self.bucket, &blob.path(), CONTENT_TYPE, content)
                    .await?;

                tracing::debug!(uri = %blob.uri(), bytes, "Staged blob");
                blobs.push(blob);
            }
        }

        Ok(blobs)
    }
}
