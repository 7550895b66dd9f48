//! Drains the work queue and runs the pipeline for each job, one job
//! at a time per worker loop. Multiple loops (`server.worker_count`)
//! may run concurrently, each picking jobs from the same receiver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::Receiver;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::image_store::ImageStore;
use crate::services::pipeline::ThreatModelPipeline;
use crate::services::queue::AnalysisJob;
use crate::services::repository::AnalysisRepository;
use crate::utils::ApiError;

pub struct Worker {
    repository: Arc<dyn AnalysisRepository>,
    image_store: Arc<dyn ImageStore>,
    pipeline: Arc<ThreatModelPipeline>,
    job_timeout: Duration,
}

impl Worker {
    pub fn new(
        repository: Arc<dyn AnalysisRepository>,
        image_store: Arc<dyn ImageStore>,
        pipeline: Arc<ThreatModelPipeline>,
        job_timeout: Duration,
    ) -> Self {
        Self { repository, image_store, pipeline, job_timeout }
    }

    /// Runs until the queue's sender half is dropped. Intended to be
    /// `tokio::spawn`ed once per configured worker.
    pub async fn run(self: Arc<Self>, receiver: Arc<AsyncMutex<Receiver<AnalysisJob>>>) {
        loop {
            let job = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };
            let Some(job) = job else {
                info!("work queue closed, worker loop exiting");
                return;
            };
            self.process_one(job.analysis_id).await;
        }
    }

    async fn process_one(&self, id: Uuid) {
        let analysis = match self.repository.get(id).await {
            Ok(a) => a,
            Err(ApiError::NotFound(_)) => {
                warn!(%id, "analysis deleted before the worker could pick it up");
                return;
            }
            Err(e) => {
                error!(%id, error = %e, "failed to read analysis before processing");
                return;
            }
        };

        if !self.repository.transition_to_running(id).await.unwrap_or(false) {
            warn!(%id, "analysis was deleted or already left OPEN; abandoning job");
            return;
        }

        let image_bytes = match self.image_store.load(id, &analysis.image_ref).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(id, &format!("failed to read stored image: {e}")).await;
                return;
            }
        };

        let pipeline = self.pipeline.clone();
        let stage_log = Arc::new(std::sync::Mutex::new(Vec::<(String, f64)>::new()));
        let run_future = {
            let stage_log = stage_log.clone();
            async move {
                pipeline
                    .run(&image_bytes, |stage, elapsed| {
                        stage_log.lock().unwrap().push((stage.to_string(), elapsed));
                    })
                    .await
            }
        };

        let outcome = tokio::time::timeout(self.job_timeout, run_future).await;

        let stages = std::mem::take(&mut *stage_log.lock().unwrap());
        for (stage, elapsed) in stages {
            let line = format!("{stage} stage complete in {elapsed:.3}s");
            if let Err(e) = self.repository.append_log(id, &line).await {
                warn!(%id, error = %e, "failed to append processing log");
            }
        }

        match outcome {
            Ok(Ok(result)) => match self.repository.transition_to_done(id, &result).await {
                Ok(true) => info!(%id, risk_score = result.risk_score, "analysis complete"),
                Ok(false) => warn!(%id, "analysis deleted mid-run; discarding completed result"),
                Err(e) => error!(%id, error = %e, "failed to persist completed analysis"),
            },
            Ok(Err(e)) => self.fail(id, &e.to_string()).await,
            Err(_) => self.fail(id, "Timeout").await,
        }
    }

    async fn fail(&self, id: Uuid, message: &str) {
        match self.repository.transition_to_failed(id, message).await {
            Ok(true) => error!(%id, reason = message, "analysis failed"),
            Ok(false) => warn!(%id, "analysis deleted mid-run; discarding failure"),
            Err(e) => error!(%id, error = %e, "failed to persist failed analysis"),
        }
    }
}
