pub mod config;
pub mod descriptors;
pub mod eligibility;
pub mod entity;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod schema;
pub mod serializer;
pub mod stage_writer;
pub mod task;
pub mod task_queue;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod traits;
pub mod worker;

pub use config::PipelineConfig;
pub use entity::Entity;
pub use error::AppError;
pub use models::{Account, AccountStatus, EntityKind, StagedBlob};
pub use orchestrator::{Orchestrator, StageReport};
pub use schema::{FieldSpec, SchemaTranslator};
pub use task::{CreateTaskRequest, RefreshTask, TaskPayload, TaskStatus, WorkerConfig};
pub use task_queue::TaskQueue;
pub use traits::{AdsApi, ObjectStore, Warehouse};
pub use worker::{TaskHandler, TracingWorkerReporter, WorkerService};
