use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use super::ingest::IngestWorker;

/// Shared context passed to the ingestion worker by the job monitor.
#[derive(Clone)]
pub struct IngestContext {
    pub worker: Arc<IngestWorker>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`]; the job storage schedules a retry.
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}

/// Convert any error into an [`ApalisError::Abort`]; the job is killed without redelivery.
pub fn job_aborted<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Abort(Arc::new(boxed))
}
