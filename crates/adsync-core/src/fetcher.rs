use chrono::NaiveDate;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::entity::Entity;
use crate::error::AppError;
use crate::models::{EntityKind, StagedBlob, partition_key};
use crate::serializer::serialize_batch;
use crate::stage_writer::{CHUNK_PLACEHOLDER, StageWriter};
use crate::traits::{AdsApi, ObjectStore};

/// Result of fetching one entity kind for one account.
///
/// Errors on the query side do not fail the call: they are recorded in
/// `error` alongside whatever was already staged.
#[derive(Debug)]
pub struct FetchOutcome {
    pub account_id: String,
    pub kind: EntityKind,
    pub blobs: Vec<StagedBlob>,
    pub rows: usize,
    pub error: Option<AppError>,
}

impl FetchOutcome {
    fn new(account_id: &str, kind: EntityKind) -> Self {
        Self {
            account_id: account_id.to_string(),
            kind,
            blobs: Vec::new(),
            rows: 0,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Blob name template for one checkpoint of one account's export.
pub fn blob_template(date: NaiveDate, account_id: &str, kind: EntityKind, index: usize) -> String {
    format!(
        "{}_{}_{}_{}_{}.json",
        partition_key(date),
        account_id,
        kind.blob_prefix(),
        index,
        CHUNK_PLACEHOLDER
    )
}

/// Pages through the ads API for one account and stages the rows.
#[derive(Debug, Clone)]
pub struct EntityFetcher<A: AdsApi, S: ObjectStore> {
    api: A,
    writer: StageWriter<S>,
}

impl<A: AdsApi, S: ObjectStore> EntityFetcher<A, S> {
    pub fn new(api: A, writer: StageWriter<S>) -> Self {
        Self { api, writer }
    }

    pub fn writer(&self) -> &StageWriter<S> {
        &self.writer
    }

    /// Fetch every `E` visible to `account_id`, flushing a batch to staging
    /// each time the running row count reaches a multiple of
    /// `E::CHECKPOINT`, and the remainder once the stream is exhausted.
    ///
    /// Only storage write failures are returned as `Err`.
    pub async fn fetch<E: Entity>(
        &self,
        account_id: &str,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, AppError> {
        let mut outcome = FetchOutcome::new(account_id, E::KIND);
        let mut rows = self.api.search(account_id, E::QUERY);
        let mut batch: Vec<E> = Vec::new();
        let mut checkpoint = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.error = Some(AppError::Cancelled);
                    break;
                }
                next = rows.next() => next,
            };

            let row = match next {
                None => break,
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    outcome.error = Some(e);
                    break;
                }
            };

            match E::project(&row) {
                Ok(entity) => batch.push(entity),
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            }
            outcome.rows += 1;

            if let Some(threshold) = E::CHECKPOINT
                && outcome.rows % threshold == 0
            {
                self.flush(&mut batch, checkpoint, date, &mut outcome).await?;
                checkpoint += 1;
            }
        }

        match &outcome.error {
            None => {
                if !batch.is_empty() {
                    self.flush(&mut batch, checkpoint, date, &mut outcome).await?;
                }
                tracing::info!(
                    account_id,
                    kind = %E::KIND,
                    rows = outcome.rows,
                    blobs = outcome.blobs.len(),
                    "Fetch finished"
                );
            }
            Some(e) => {
                tracing::warn!(
                    account_id,
                    kind = %E::KIND,
                    rows = outcome.rows,
                    blobs = outcome.blobs.len(),
                    error = %e,
                    "Fetch stopped early"
                );
            }
        }

        Ok(outcome)
    }

    async fn flush<E: Entity>(
        &self,
        batch: &mut Vec<E>,
        checkpoint: usize,
        date: NaiveDate,
        outcome: &mut FetchOutcome,
    ) -> Result<(), AppError> {
        let lines = serialize_batch(batch);
        batch.clear();

        let template = blob_template(date, &outcome.account_id, E::KIND, checkpoint);
        let blobs = self.writer.write(lines, date, &template).await?;
        outcome.blobs.extend(blobs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::models::{Account, Campaign};
    use crate::testutil::{MemoryObjectStore, MockAdsApi, campaign_row};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn fetcher(api: &MockAdsApi, store: &MemoryObjectStore) -> EntityFetcher<MockAdsApi, MemoryObjectStore> {
        let writer = StageWriter::new(store.clone(), "staging", NonZeroUsize::new(20_000).unwrap());
        EntityFetcher::new(api.clone(), writer)
    }

    #[tokio::test]
    async fn test_checkpoints_split_large_result() {
        let api = MockAdsApi::new();
        api.set_rows("42", EntityKind::Campaign, (0..45_000).map(campaign_row).collect());
        let store = MemoryObjectStore::new();

        let outcome = fetcher(&api, &store)
            .fetch::<Campaign>("42", date(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.rows, 45_000);
        let names: Vec<_> = outcome.blobs.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "20261019_42_campaign_0_1.json",
                "20261019_42_campaign_1_1.json",
                "20261019_42_campaign_2_1.json",
            ]
        );
        let sizes: Vec<_> = outcome
            .blobs
            .iter()
            .map(|b| store.line_count(&b.uri()))
            .collect();
        assert_eq!(sizes, vec![20_000, 20_000, 5_000]);
        assert_eq!(api.calls(), vec![("42".to_string(), Campaign::QUERY.to_string())]);
    }

    #[tokio::test]
    async fn test_unbounded_entity_flushes_once() {
        let api = MockAdsApi::new();
        api.set_rows(
            "999",
            EntityKind::Account,
            vec![
                crate::testutil::account_row("customers/1", "ACTIVE"),
                crate::testutil::account_row("customers/2", "INACTIVE"),
            ],
        );
        let store = MemoryObjectStore::new();

        let outcome = fetcher(&api, &store)
            .fetch::<Account>("999", date(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.blobs.len(), 1);
        assert_eq!(outcome.blobs[0].name, "20261019_999_accounts_0_1.json");
        assert_eq!(store.line_count(&outcome.blobs[0].uri()), 2);
    }

    #[tokio::test]
    async fn test_source_error_is_reported_not_raised() {
        let api = MockAdsApi::new();
        api.set_rows("7", EntityKind::Campaign, (0..25).map(campaign_row).collect());
        api.fail_after("7", EntityKind::Campaign, 10, AppError::RateLimitExceeded);
        let store = MemoryObjectStore::new();

        let outcome = fetcher(&api, &store)
            .fetch::<Campaign>("7", date(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome.error, Some(AppError::RateLimitExceeded)));
        assert_eq!(outcome.rows, 10);
        assert!(outcome.blobs.is_empty());
        assert!(store.uris().is_empty());
    }

    #[tokio::test]
    async fn test_empty_account_stages_nothing() {
        let api = MockAdsApi::new();
        let store = MemoryObjectStore::new();

        let outcome = fetcher(&api, &store)
            .fetch::<Campaign>("1", date(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.rows, 0);
        assert!(outcome.blobs.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_fetch_stops() {
        let api = MockAdsApi::new();
        api.set_rows("7", EntityKind::Campaign, (0..5).map(campaign_row).collect());
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fetcher(&api, &store)
            .fetch::<Campaign>("7", date(), &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome.error, Some(AppError::Cancelled)));
        assert_eq!(outcome.rows, 0);
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let api = MockAdsApi::new();
        api.set_rows("7", EntityKind::Campaign, (0..3).map(campaign_row).collect());
        let store = MemoryObjectStore::new();
        store.fail_next_write(AppError::StorageWriteError("bucket gone".into()));

        let result = fetcher(&api, &store)
            .fetch::<Campaign>("7", date(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AppError::StorageWriteError(_))));
    }
}
