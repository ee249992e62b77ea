// 🎛️ Conversion Job Orchestrator - accept, store, convert in the background, report
//
// An upload is validated before anything is written. Accepted uploads get a
// job record immediately and the conversion runs as a detached task; clients
// follow it through the job store by file key.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Settings, StatementSettings};
use crate::emit::file_stem_of;
use crate::error::{ConvertError, Result};
use crate::extract::TableExtractor;
use crate::job::{ConversionJob, JobStage};
use crate::job_store::JobStore;
use crate::pipeline::Pipeline;
use crate::status::{JobStatusView, StatusSource};
use crate::storage::{output_key, sanitize_file_name, source_key, ObjectStore};
use crate::upload::{validate_upload, Upload, UploadLimits};

/// The part of [`Settings`] the orchestrator needs
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub statement: StatementSettings,
    pub limits: UploadLimits,
    pub production: bool,
}

impl From<&Settings> for OrchestratorSettings {
    fn from(settings: &Settings) -> Self {
        OrchestratorSettings {
            statement: settings.statement.clone(),
            limits: settings.limits.clone(),
            production: settings.production,
        }
    }
}

/// A finished artifact ready to stream to the client
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct Orchestrator {
    objects: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    extractor: Arc<dyn TableExtractor>,
    settings: Arc<OrchestratorSettings>,
}

impl Orchestrator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
        extractor: Arc<dyn TableExtractor>,
        settings: OrchestratorSettings,
    ) -> Self {
        Orchestrator {
            objects,
            jobs,
            extractor,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    // ========================================================================
    // ACCEPT
    // ========================================================================

    /// Validate, store the raw files and create the job record. Nothing is
    /// written when validation fails, and stored files are removed again if
    /// the job cannot be recorded.
    pub async fn accept(&self, upload: Upload) -> Result<ConversionJob> {
        validate_upload(&upload, &self.settings.limits)?;

        let id = Uuid::new_v4();
        let mut keys: Vec<String> = Vec::with_capacity(upload.files.len());
        for (index, file) in upload.files.iter().enumerate() {
            let name = sanitize_file_name(&file.file_name);
            let mut key = source_key(id, &name);
            let mut prefix = index + 1;
            while keys.contains(&key) {
                key = source_key(id, &format!("{}-{}", prefix, name));
                prefix += 1;
            }
            keys.push(key);
        }

        let planned = output_key(id, &upload.files[0].file_name, upload.format);
        let job = ConversionJob::new(
            id,
            keys,
            upload.processing_type,
            upload.format,
            planned,
            Utc::now(),
        );

        let mut written = Vec::with_capacity(job.source_keys.len());
        let mut stored = Ok(());
        for (key, file) in job.source_keys.iter().zip(upload.files) {
            let media_type = file.media_type();
            written.push(key.as_str());
            stored = self.objects.put(key, file.bytes, &media_type).await;
            if stored.is_err() {
                break;
            }
        }
        if stored.is_ok() {
            stored = self.jobs.insert(&job).await;
        }
        if let Err(e) = stored {
            self.discard(&written).await;
            return Err(e);
        }

        info!(
            job_id = %job.id,
            source_key = job.source_key(),
            files = job.source_keys.len(),
            format = %job.format,
            "Upload accepted"
        );
        Ok(job)
    }

    async fn discard(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.objects.delete(key).await {
                warn!(key = %key, error = %e, "Could not remove upload of rejected job");
            }
        }
    }

    /// Accept and start converting in the background
    pub async fn submit(&self, upload: Upload) -> Result<ConversionJob> {
        let job = self.accept(upload).await?;
        let this = self.clone();
        let id = job.id;
        tokio::spawn(async move { this.run(id).await });
        Ok(job)
    }

    // ========================================================================
    // RUN
    // ========================================================================

    /// Drive one job to Completed or Failed. Never returns an error: failures
    /// end up on the job record.
    pub async fn run(&self, job_id: Uuid) {
        let mut job = match self.jobs.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(%job_id, "Job disappeared before processing");
                return;
            }
            Err(e) => {
                error!(%job_id, error = %e, "Could not load job");
                return;
            }
        };

        let span = info_span!("job", job_id = %job.id, source_key = %job.source_key());
        async {
            if let Err(e) = self.process(&mut job).await {
                let message = format!("{:#}", e);
                error!(stage = %job.stage, error = %message, "Conversion failed");

                match job.fail(message, Utc::now()) {
                    Ok(()) => {
                        if let Err(e) = self.jobs.update(&job).await {
                            error!(error = %e, "Could not record job failure");
                        }
                    }
                    Err(e) => error!(error = %e, "Job already finished"),
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self, job: &mut ConversionJob) -> anyhow::Result<()> {
        let pipeline = Pipeline::from_settings(&self.settings.statement);

        self.advance(job, JobStage::ProcessingStatement).await?;
        let mut sources = Vec::with_capacity(job.source_keys.len());
        for key in &job.source_keys {
            let object = self
                .objects
                .get(key)
                .await?
                .ok_or_else(|| anyhow!("Uploaded file {} is missing from storage", key))?;
            sources.push(object);
        }

        self.advance(job, JobStage::ExtractingTransactions).await?;
        let mut tables = Vec::new();
        for object in &sources {
            let extracted = self
                .extractor
                .extract(object)
                .await
                .with_context(|| format!("Could not read tables from {}", object.key))?;
            tables.extend(extracted);
        }
        let ledger = pipeline.build_ledger(&tables);
        let continuity = pipeline.check_continuity(&ledger);

        job.transaction_count = ledger.transaction_count();
        job.review_count = ledger.review_count();
        job.continuity_summary = continuity.map(|report| report.summary());

        self.advance(job, JobStage::ConvertingToQbo).await?;
        let artifact = pipeline.emit(
            &ledger,
            job.format,
            &file_stem_of(&job.planned_output_key),
            Utc::now(),
        )?;

        self.advance(job, JobStage::Finalizing).await?;
        let content_type = artifact.content_type.clone();
        self.objects
            .put(&job.planned_output_key, artifact.into_bytes(), &content_type)
            .await?;

        // The local record turns terminal only once the store has it
        let mut finished = job.clone();
        finished.complete(Utc::now())?;
        self.jobs.update(&finished).await?;
        *job = finished;
        info!(
            output_key = %job.planned_output_key,
            transactions = job.transaction_count,
            review = job.review_count,
            "Conversion complete"
        );
        Ok(())
    }

    async fn advance(&self, job: &mut ConversionJob, stage: JobStage) -> Result<()> {
        job.advance(stage, Utc::now())?;
        self.jobs.update(job).await?;
        info!(stage = %stage, "{}", stage.message());
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn status(&self, file_key: &str) -> Result<JobStatusView> {
        let job = self
            .jobs
            .find_by_source_key(file_key)
            .await?
            .ok_or_else(|| ConvertError::NotFound(format!("No job for {}", file_key)))?;
        Ok(JobStatusView::from_job(&job, Utc::now(), self.settings.production))
    }

    /// NotReady while the owning job is still running, NotFound when the
    /// key is unknown, the job failed, or the artifact is gone
    pub async fn download(&self, output_key: &str) -> Result<Download> {
        let job = self
            .jobs
            .find_by_output_key(output_key)
            .await?
            .ok_or_else(|| ConvertError::NotFound(output_key.to_string()))?;

        match job.stage {
            JobStage::Completed => {}
            JobStage::Failed => {
                return Err(ConvertError::NotFound(format!(
                    "{} (conversion failed)",
                    output_key
                )))
            }
            stage => return Err(ConvertError::NotReady(format!("{} ({})", output_key, stage))),
        }

        let object = self
            .objects
            .get(output_key)
            .await?
            .ok_or_else(|| ConvertError::NotFound(output_key.to_string()))?;

        let file_name = output_key
            .rsplit('/')
            .next()
            .unwrap_or(output_key)
            .to_string();

        Ok(Download {
            file_name,
            content_type: object.content_type,
            bytes: object.bytes,
        })
    }
}

#[async_trait]
impl StatusSource for Orchestrator {
    async fn fetch_status(&self, file_key: &str) -> Result<JobStatusView> {
        self.status(file_key).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
