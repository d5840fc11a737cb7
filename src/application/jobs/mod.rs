mod context;
mod ingest;
mod message;
mod queue;

pub use context::{IngestContext, job_aborted, job_failed};
pub use ingest::{IngestError, IngestWorker, process_news_message};
pub use message::{MessageError, NewsMessage};
pub use queue::publish_draft;
