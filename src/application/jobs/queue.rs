use crate::{
    application::repos::{QueueError, WorkQueue},
    domain::{news::NewsDraft, types::JobType},
};

/// Encode a draft and publish it for ingestion, returning the queue-assigned id.
pub async fn publish_draft<Q>(queue: &Q, draft: &NewsDraft) -> Result<String, QueueError>
where
    Q: WorkQueue + ?Sized,
{
    let payload = draft
        .encode()
        .map_err(|err| QueueError::Encode(err.to_string()))?;
    queue.publish(JobType::CreateNews, &payload).await
}
