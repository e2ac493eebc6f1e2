use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::task::{RefreshTask, TaskPayload, WorkerConfig};
use crate::task_queue::TaskQueue;

/// Executes the body of a claimed task.
pub trait TaskHandler: Send + Sync {
    /// Run `payload` to completion and return a status line. Implementations
    /// stop early once `cancel` fires.
    fn handle(
        &self,
        payload: &TaskPayload,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    TaskClaimed {
        task: &'a RefreshTask,
    },
    TaskStarted {
        task_id: Uuid,
        payload: &'a TaskPayload,
    },
    TaskCompleted {
        task_id: Uuid,
        summary: &'a str,
    },
    TaskFailed {
        task_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    /// The worker was stopped while the task ran; it is released, not failed.
    TaskInterrupted {
        task_id: Uuid,
    },
    ShuttingDown {
        worker_id: &'a str,
        tasks_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for tasks");
            }
            WorkerEvent::TaskClaimed { task } => {
                tracing::info!(task_id = %task.id, key = %task.dedup_key, attempt = task.retry_count + 1, "Task claimed");
            }
            WorkerEvent::TaskStarted { task_id, payload } => {
                tracing::info!(%task_id, %payload, "Processing task");
            }
            WorkerEvent::TaskCompleted { task_id, summary } => {
                tracing::info!(%task_id, %summary, "Task completed");
            }
            WorkerEvent::TaskFailed {
                task_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%task_id, %error, %will_retry, "Task failed");
            }
            WorkerEvent::TaskInterrupted { task_id } => {
                tracing::warn!(%task_id, "Task interrupted by shutdown");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                tasks_released,
            } => {
                tracing::info!(%worker_id, %tasks_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the task queue and runs refresh tasks.
pub struct WorkerService<Q, H>
where
    Q: TaskQueue,
    H: TaskHandler,
{
    queue: Q,
    handler: Arc<H>,
    config: WorkerConfig,
}

impl<Q, H> WorkerService<Q, H>
where
    Q: TaskQueue,
    H: TaskHandler,
{
    pub fn new(queue: Q, handler: Arc<H>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.claim_task(&self.config.worker_id).await {
                Ok(Some(task)) => {
                    reporter.report(WorkerEvent::TaskClaimed { task: &task });
                    self.process_task(&task, &cancel_token, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim task");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Graceful shutdown: release all claimed tasks
        let released = self
            .queue
            .release_worker_tasks(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            tasks_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn process_task<WR: WorkerReporter>(
        &self,
        task: &RefreshTask,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) {
        reporter.report(WorkerEvent::TaskStarted {
            task_id: task.id,
            payload: &task.payload,
        });

        let task_cancel = cancel_token.child_token();
        let timeout = self.config.task_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.handler.handle(&task.payload, task_cancel.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                task_cancel.cancel();
                Err(AppError::Timeout(timeout.as_secs()))
            }
        };

        match result {
            Ok(summary) => {
                reporter.report(WorkerEvent::TaskCompleted {
                    task_id: task.id,
                    summary: &summary,
                });
                if let Err(e) = self.queue.complete_task(task.id, &summary).await {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to mark task completed");
                }
            }
            Err(_) if cancel_token.is_cancelled() => {
                // Left running; released back to pending on shutdown.
                reporter.report(WorkerEvent::TaskInterrupted { task_id: task.id });
            }
            Err(e) => {
                let error_msg = e.to_string();
                let can_retry = task.can_retry() && e.is_retryable();
                reporter.report(WorkerEvent::TaskFailed {
                    task_id: task.id,
                    error: &error_msg,
                    will_retry: can_retry,
                });

                let next_retry = if can_retry {
                    Some(task.calculate_next_retry(&self.config.retry_config))
                } else {
                    None
                };

                if let Err(e) = self.queue.fail_task(task.id, &error_msg, next_retry).await {
                    tracing::error!(task_id = %task.id, error = %e, "Failed to mark task as failed");
                }
            }
        }
    }
}
