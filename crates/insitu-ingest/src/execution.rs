//! Synchronous and background execution
//!
//! In background mode the caller still learns about rejections and transfer
//! failures, since those happen inline. Only the transform and metadata
//! tail is detached; its outcome is logged with the job id and the
//! metadata record is the sole durable trace.

use crate::orchestrator::{IngestRequest, IngestionOrchestrator};
use crate::response::IngestResponse;
use tokio_util::task::TaskTracker;
use tracing::{error, info, Instrument};

#[derive(Clone)]
pub struct ExecutionModeController {
    orchestrator: IngestionOrchestrator,
    background: TaskTracker,
}

impl ExecutionModeController {
    pub fn new(orchestrator: IngestionOrchestrator) -> Self {
        Self {
            orchestrator,
            background: TaskTracker::new(),
        }
    }

    pub fn orchestrator(&self) -> &IngestionOrchestrator {
        &self.orchestrator
    }

    /// Run a request in the mode it asks for
    pub async fn execute(&self, request: IngestRequest) -> IngestResponse {
        if request.wait_till_complete {
            return self.orchestrator.ingest(&request).await;
        }

        let prepared = match self.orchestrator.prepare(&request).await {
            Ok(prepared) => prepared,
            Err(e) => return IngestResponse::failed(&e),
        };

        let job_id = prepared.job_id.clone();
        let orchestrator = self.orchestrator.clone();
        let span = tracing::info_span!("background_ingest", job_id = %job_id, locator = %request.locator);

        // The handle is dropped; nothing joins on the task
        drop(self.background.spawn(
            async move {
                let response = orchestrator.complete(prepared).await;
                if response.is_success() {
                    info!(status = response.status.as_u16(), "Background ingestion finished");
                } else {
                    error!(
                        status = response.status.as_u16(),
                        details = ?response.body.details,
                        "Background ingestion failed"
                    );
                }
            }
            .instrument(span),
        ));

        info!(%job_id, "Ingestion continues in background");
        IngestResponse::accepted(&job_id)
    }

    /// Number of background tasks still running
    pub fn pending(&self) -> usize {
        self.background.len()
    }

    /// Wait for every background task started so far
    ///
    /// The CLI calls this before exiting. Results are not returned.
    pub async fn drain(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}
