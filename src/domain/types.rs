//! Queue topics and the outcomes a queued message can end in.

/// Where a queued message ends up, named as the job storage records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a consumer.
    Pending,
    /// Handled and acknowledged.
    Done,
    /// Handler failed; the storage schedules another attempt.
    Failed,
    /// Rejected for good; never redelivered.
    Killed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Done => "Done",
            JobState::Failed => "Failed",
            JobState::Killed => "Killed",
        }
    }

    pub fn is_redelivered(self) -> bool {
        matches!(self, JobState::Pending | JobState::Failed)
    }
}

/// Queue topics. Each is a separate job namespace in the queue storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    CreateNews,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::CreateNews => "NEWS_ADD",
        }
    }

    /// Consumer channel that identifies the worker reading this topic.
    pub fn channel(self) -> &'static str {
        match self {
            JobType::CreateNews => "database",
        }
    }
}
