//! End-to-end embedding pipeline: source → acquire → embed → assemble → publish → reap.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use graphfeat_acquisition::{Fetcher, UploadedSource};
use graphfeat_dispatch::{Dispatcher, EmbeddingMethod};
use graphfeat_publisher::{DatasetRepository, OpenMlRepository};
use graphfeat_shared::{
    EmbeddingRequest, EmbeddingResponse, GraphFeatError, PipelineStage, PublishedDataset, Result,
    Settings, WorkingSet,
};

use crate::lease::AddressLeases;
use crate::reaper;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run enters a new stage.
    fn stage(&self, stage: PipelineStage);
    /// Called when the run completes.
    fn done(&self, response: &EmbeddingResponse);
    /// Called when the run aborts in `stage`.
    fn failed(&self, stage: PipelineStage, error: &GraphFeatError);
}

/// No-op progress reporter for server and test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: PipelineStage) {}
    fn done(&self, _response: &EmbeddingResponse) {}
    fn failed(&self, _stage: PipelineStage, _error: &GraphFeatError) {}
}

/// Tracks the current stage and forwards transitions to a reporter.
struct StageTracker<'a> {
    current: PipelineStage,
    progress: &'a dyn ProgressReporter,
}

impl<'a> StageTracker<'a> {
    fn start(progress: &'a dyn ProgressReporter) -> Self {
        progress.stage(PipelineStage::Validating);
        Self {
            current: PipelineStage::Validating,
            progress,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.current = stage;
        self.progress.stage(stage);
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// Raw file content submitted in place of a source address.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A trigger as received from a transport: an address or an upload, plus
/// the name, method, and hyperparameter string.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub upload: Option<UploadPayload>,
    pub dataset: String,
    pub name: String,
    pub method: String,
    pub hyperp: String,
}

/// Name used when none is given: the address text after its last `/`.
pub fn default_name(address: &str) -> String {
    address
        .rsplit_once('/')
        .map_or(address, |(_, last)| last)
        .to_string()
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs embedding requests against one immutable configuration.
pub struct Pipeline {
    settings: Arc<Settings>,
    fetcher: Fetcher,
    repository: Arc<dyn DatasetRepository>,
    leases: AddressLeases,
}

impl Pipeline {
    /// Create a pipeline publishing through `repository`.
    pub fn new(settings: Arc<Settings>, repository: Arc<dyn DatasetRepository>) -> Result<Self> {
        let fetcher = Fetcher::new(&settings.acquisition)?.with_local_root(&settings.uploads_dir);
        Ok(Self {
            settings,
            fetcher,
            repository,
            leases: AddressLeases::new(),
        })
    }

    /// Create a pipeline publishing to the OpenML repository in `settings`.
    pub fn with_openml(settings: Arc<Settings>) -> Result<Self> {
        let repository = Arc::new(OpenMlRepository::new(&settings.repository)?);
        Self::new(settings, repository)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Names of the embedding methods this pipeline can run.
    pub fn methods(&self) -> Vec<&'static str> {
        EmbeddingMethod::ALL.iter().map(EmbeddingMethod::as_str).collect()
    }

    /// Store a direct upload and return its source address.
    pub async fn upload(
        &self,
        filename: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<UploadedSource> {
        graphfeat_acquisition::store_upload(&self.settings.uploads_dir, filename, name, bytes).await
    }

    /// Handle a transport submission: store the upload if there is one, fill
    /// in a default name, then run the pipeline on the resulting address.
    pub async fn process(
        &self,
        submission: Submission,
        progress: &dyn ProgressReporter,
    ) -> Result<EmbeddingResponse> {
        let Submission {
            upload,
            mut dataset,
            name,
            method,
            hyperp,
        } = submission;

        if let Some(upload) = upload.filter(|u| !u.bytes.is_empty()) {
            let stored = self.upload(&upload.filename, &name, &upload.bytes).await?;
            dataset = stored.address;
        }

        let name = if name.trim().is_empty() {
            default_name(&dataset)
        } else {
            name
        };

        let request = EmbeddingRequest::new(dataset, name, method, hyperp);
        self.run(&request, progress).await
    }

    /// Run the full pipeline for one request.
    ///
    /// 1. Validate the request and resolve the method
    /// 2. Acquire the source into its content-addressed path
    /// 3. Run the embedding process
    /// 4. Assemble and write the feature table
    /// 5. Publish it
    /// 6. Remove the work directory
    ///
    /// Concurrent runs for the same address are serialized.
    #[instrument(
        skip_all,
        fields(
            run_id = %Uuid::now_v7(),
            dataset = %request.source_address,
            method = %request.method,
        )
    )]
    pub async fn run(
        &self,
        request: &EmbeddingRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<EmbeddingResponse> {
        let start = Instant::now();
        let mut tracker = StageTracker::start(progress);

        match self.execute(request, &mut tracker).await {
            Ok(response) => {
                tracker.enter(PipelineStage::Done);
                progress.done(&response);
                info!(
                    url = %response.url,
                    elapsed_ms = start.elapsed().as_millis(),
                    "pipeline complete"
                );
                Ok(response)
            }
            Err(e) => {
                let stage = tracker.current;
                error!(%stage, kind = e.kind(), error = %e, "pipeline aborted");
                progress.failed(stage, &e);
                tracker.enter(PipelineStage::Failed);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &EmbeddingRequest,
        tracker: &mut StageTracker<'_>,
    ) -> Result<EmbeddingResponse> {
        request.validate()?;
        let method = EmbeddingMethod::resolve(&request.method)?;
        method.check_hyperparameters(&request.hyperparameters)?;

        let working_set = WorkingSet::for_address(&self.settings.tmp_dir, &request.source_address);
        let _lease = self.leases.acquire(&working_set.local_source_path).await;

        tracker.enter(PipelineStage::Acquiring);
        let source = self
            .fetcher
            .acquire(&request.source_address, &working_set.local_source_path)
            .await?;

        match self.embed_and_publish(request, method, &source, &working_set, tracker).await {
            Ok(published) => {
                tracker.enter(PipelineStage::CleaningUp);
                reaper::reap(&working_set.work_dir).await;

                Ok(EmbeddingResponse {
                    dataset: request.source_address.clone(),
                    method: request.method.clone(),
                    hyperp: request.hyperp.clone(),
                    url: published.url,
                })
            }
            Err(e) => {
                reaper::reap(&working_set.work_dir).await;
                Err(e)
            }
        }
    }

    async fn embed_and_publish(
        &self,
        request: &EmbeddingRequest,
        method: EmbeddingMethod,
        source: &Path,
        working_set: &WorkingSet,
        tracker: &mut StageTracker<'_>,
    ) -> Result<PublishedDataset> {
        let source = std::path::absolute(source).map_err(|e| GraphFeatError::io(source, e))?;
        let work_dir = std::path::absolute(&working_set.work_dir)
            .map_err(|e| GraphFeatError::io(&working_set.work_dir, e))?;

        tracker.enter(PipelineStage::Embedding);
        let outcome = Dispatcher::new(&self.settings.algorithm)
            .run(method, &source, &work_dir, &request.hyperparameters)
            .await?;

        if !outcome.stderr.is_empty() {
            warn!(
                exit_code = ?outcome.exit_code,
                stderr = %outcome.stderr,
                "embedding process reported diagnostics"
            );
        }

        tracker.enter(PipelineStage::Assembling);
        let table = graphfeat_features::assemble_from_files(
            method.as_str(),
            &outcome.resources_path,
            &outcome.vectors_path,
        )?;
        let table_file = graphfeat_features::write_arff(&table, &work_dir)?;

        tracker.enter(PipelineStage::Publishing);
        graphfeat_publisher::publish(
            self.repository.as_ref(),
            &table_file,
            &request.display_name,
            &request.method,
            &request.hyperparameters,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
