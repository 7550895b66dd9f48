//! In-process stand-in for the message bus: a bounded `mpsc` channel
//! carrying one `{analysis_id}` message per enqueued job. Satisfies
//! at-least-once delivery and acknowledge-on-success at the scale this
//! crate targets; a real deployment swaps this for a networked broker
//! behind the same [`WorkQueue`] trait without touching the worker.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::utils::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct AnalysisJob {
    pub analysis_id: Uuid,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, job: AnalysisJob) -> Result<(), ApiError>;
}

/// Channel-backed queue. The sender half implements [`WorkQueue`]; the
/// receiver half is handed to the worker loop at startup.
pub struct MpscWorkQueue {
    sender: mpsc::Sender<AnalysisJob>,
}

impl MpscWorkQueue {
    /// Creates the channel pair. `capacity` bounds how many enqueued
    /// jobs may sit unprocessed before `enqueue` starts applying
    /// backpressure.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AnalysisJob>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WorkQueue for MpscWorkQueue {
    async fn enqueue(&self, job: AnalysisJob) -> Result<(), ApiError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| ApiError::internal_error("work queue receiver has been dropped"))
    }
}
