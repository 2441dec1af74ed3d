//! Single-slot supervisor for asynchronous calibration operations.
//!
//! At most one calibration job (`generate`, `load`, `clear`) runs at a
//! time; a second request while one is running gets an immediate error
//! rather than queueing. Jobs run on a spawned task so snapshot requests
//! stay responsive, and only touch the state manager to swap calibration
//! in or out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use locus_types::CalibrationJobStatus;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::state::{now_ms, StateManager};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Calibration already running")]
    Busy,
}

#[derive(Clone)]
pub struct CalibrationSupervisor {
    manager: Arc<StateManager>,
    job: Arc<Mutex<CalibrationJobStatus>>,
}

impl CalibrationSupervisor {
    pub fn new(manager: Arc<StateManager>) -> Self {
        Self {
            manager,
            job: Arc::new(Mutex::new(CalibrationJobStatus::default())),
        }
    }

    pub async fn status(&self) -> CalibrationJobStatus {
        self.job.lock().await.clone()
    }

    /// Spin until the current job (if any) finishes. Used by one-shot CLI
    /// invocations; live consumers poll `status` instead.
    pub async fn wait_idle(&self) -> CalibrationJobStatus {
        loop {
            let status = self.status().await;
            if !status.running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub async fn generate(
        &self,
        lat: f64,
        lon: f64,
        output_path: Option<PathBuf>,
    ) -> Result<(), SupervisorError> {
        let manager = self.manager.clone();
        self.start("generate", async move {
            let outcome = manager
                .generate_calibration(lat, lon, output_path, true)
                .await?;
            Ok(serde_json::to_value(outcome)?)
        })
        .await
    }

    pub async fn load(&self, path: PathBuf) -> Result<(), SupervisorError> {
        let manager = self.manager.clone();
        self.start("load", async move {
            manager.load_calibration_file(&path).await?;
            Ok(json!({ "ok": true }))
        })
        .await
    }

    pub async fn clear(&self) -> Result<(), SupervisorError> {
        let manager = self.manager.clone();
        self.start("clear", async move {
            manager.clear_calibration().await;
            Ok(json!({ "ok": true }))
        })
        .await
    }

    /// Claim the single job slot and run the work on a background task.
    async fn start<F>(&self, kind: &'static str, work: F) -> Result<(), SupervisorError>
    where
        F: std::future::Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        {
            let mut job = self.job.lock().await;
            if job.running {
                return Err(SupervisorError::Busy);
            }
            *job = CalibrationJobStatus {
                running: true,
                kind: Some(kind.to_string()),
                started_at: Some(now_ms()),
                finished_at: None,
                error: None,
                result: None,
            };
        }

        let slot = self.job.clone();
        tokio::spawn(async move {
            let result = work.await;
            let mut job = slot.lock().await;
            job.running = false;
            job.finished_at = Some(now_ms());
            match result {
                Ok(value) => job.result = Some(value),
                Err(e) => {
                    warn!("calibration {kind} failed: {e:#}");
                    job.error = Some(e.to_string());
                }
            }
        });
        Ok(())
    }
}
