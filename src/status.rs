// 📡 Job Status Protocol - what a polling client sees, and the client loop itself
//
// The wire view carries the structured stage next to the legacy `status`
// string, so old UIs that substring-match keep working while new ones read
// `stage` / `stageIndex` / `estimatedTimeRemaining` directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ConvertError;
use crate::job::{ConversionJob, JobStage};

/// Shown instead of raw pipeline errors when running in production
pub const GENERIC_FAILURE_MESSAGE: &str =
    "We could not convert this statement. Please check the file and try again.";

// ============================================================================
// STAGE INDICATOR
// ============================================================================

/// UI progress step (1-4) with its countdown budget in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageIndicator {
    pub index: u8,
    pub budget_secs: u64,
}

impl StageIndicator {
    /// Uploading and terminal stages have no indicator
    pub fn for_stage(stage: JobStage) -> Option<StageIndicator> {
        let (index, budget_secs) = match stage {
            JobStage::ProcessingStatement => (1, 90),
            JobStage::ExtractingTransactions => (2, 60),
            JobStage::ConvertingToQbo => (3, 30),
            JobStage::Finalizing => (4, 10),
            JobStage::Uploading | JobStage::Completed | JobStage::Failed => return None,
        };
        Some(StageIndicator { index, budget_secs })
    }

    /// Accepts the free-text status strings older backends report
    pub fn from_legacy_message(message: &str) -> Option<StageIndicator> {
        JobStage::from_legacy_message(message).and_then(Self::for_stage)
    }

    /// `max(0, budget - elapsed)`
    pub fn remaining(&self, elapsed_secs: u64) -> u64 {
        self.budget_secs.saturating_sub(elapsed_secs)
    }
}

// ============================================================================
// STATUS VIEW (wire shape)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub file_key: String,
    pub job_id: Uuid,

    /// Legacy free-text status line
    pub status: String,
    pub stage: JobStage,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_index: Option<u8>,
    pub elapsed_time: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,

    /// True once the artifact is ready to download
    pub processed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// Same as `download_url`; name kept for older clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qbo_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub transaction_count: usize,
    pub review_count: usize,
}

impl JobStatusView {
    pub fn from_job(job: &ConversionJob, now: DateTime<Utc>, production: bool) -> Self {
        let elapsed = job.elapsed_secs(now);
        let indicator = StageIndicator::for_stage(job.stage);
        let download_url = job.output_key.as_deref().map(download_url);

        let error = job.error.as_ref().map(|raw| {
            if production {
                GENERIC_FAILURE_MESSAGE.to_string()
            } else {
                raw.clone()
            }
        });

        JobStatusView {
            file_key: job.source_key().to_string(),
            job_id: job.id,
            status: job.stage.message().to_string(),
            stage: job.stage,
            stage_index: indicator.map(|i| i.index),
            elapsed_time: elapsed,
            estimated_time_remaining: indicator.map(|i| i.remaining(elapsed)),
            processed: job.stage == JobStage::Completed,
            output_key: job.output_key.clone(),
            qbo_url: download_url.clone(),
            download_url,
            error,
            transaction_count: job.transaction_count,
            review_count: job.review_count,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.stage == JobStage::Failed
    }
}

/// `/api/download/<percent-encoded key>`
pub fn download_url(output_key: &str) -> String {
    format!("/api/download/{}", urlencoding::encode(output_key))
}

// ============================================================================
// CLIENT POLL LOOP
// ============================================================================

/// Anything that can answer "how is this job doing?" by file key
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, file_key: &str) -> Result<JobStatusView, ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(JobStatusView),
    Failed(String),

    /// The client gave up; the job itself keeps running
    TimedOut { polls: u32 },
}

pub struct StatusPoller<S> {
    source: S,
    policy: PollPolicy,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S) -> Self {
        StatusPoller {
            source,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(source: S, policy: PollPolicy) -> Self {
        StatusPoller { source, policy }
    }

    /// Poll until the job finishes or the poll budget runs out.
    /// `on_update` sees every status received, e.g. to drive a progress bar.
    pub async fn wait<F>(&self, file_key: &str, mut on_update: F) -> PollOutcome
    where
        F: FnMut(&JobStatusView),
    {
        tokio::time::sleep(self.policy.initial_delay).await;

        for poll in 1..=self.policy.max_polls {
            match self.source.fetch_status(file_key).await {
                Ok(view) => {
                    on_update(&view);
                    if view.processed {
                        info!(file_key, poll, "Job completed");
                        return PollOutcome::Completed(view);
                    }
                    if view.is_failed() {
                        let message = view.error.unwrap_or_else(|| view.status.clone());
                        warn!(file_key, poll, %message, "Job failed");
                        return PollOutcome::Failed(message);
                    }
                }
                Err(e) if e.is_retryable() => {
                    debug!(file_key, poll, error = %e, "Status not available yet");
                }
                Err(e) => return PollOutcome::Failed(e.to_string()),
            }

            if poll < self.policy.max_polls {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        warn!(file_key, polls = self.policy.max_polls, "Gave up polling; job continues server-side");
        PollOutcome::TimedOut {
            polls: self.policy.max_polls,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
