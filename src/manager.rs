//! Variant manager facade
//!
//! The one object the panel talks to. It owns the host adapter and wires
//! the indexer, the override controller, the capture orchestrator and the
//! thumbnail store together. Dropping the manager shuts every capture job
//! down, so no preview node outlives it.

use std::time::Instant;

use log::{debug, info, warn};

use crate::capture::{CaptureEvent, CaptureOrchestrator, JobId, JobStatus};
use crate::config::ManagerConfig;
use crate::error::{HostError, Result, VariantError};
use crate::host::{HostAdapter, NodeHandle};
use crate::model::{VariantModel, VariantSelection, VariantTree};
use crate::overrides::{OverrideController, OverrideRecord};
use crate::scene_index::SceneIndex;
use crate::thumbnails::{Thumbnail, ThumbnailStore};

pub struct VariantManager<H: HostAdapter> {
    host: H,
    config: ManagerConfig,
    model: Option<VariantModel>,
    overrides: OverrideController,
    orchestrator: CaptureOrchestrator,
    thumbnails: ThumbnailStore,
}

impl<H: HostAdapter> VariantManager<H> {
    pub fn new(host: H, config: ManagerConfig) -> Self {
        Self {
            overrides: OverrideController::new(&config),
            orchestrator: CaptureOrchestrator::new(&config),
            host,
            config,
            model: None,
            thumbnails: ThumbnailStore::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Rebuild the model from the live graph below `root_path`
    ///
    /// The previous model is replaced only when the scan succeeds.
    pub fn scan(&mut self, root_path: &str) -> Result<&VariantModel> {
        let model = SceneIndex::scan(&self.host, root_path)?;
        Ok(self.model.insert(model))
    }

    /// Model of the last successful scan
    pub fn model(&self) -> Option<&VariantModel> {
        self.model.as_ref()
    }

    fn current_model(&self) -> Result<&VariantModel> {
        self.model.as_ref().ok_or_else(not_scanned)
    }

    /// Author a selection through a new interactive override node
    ///
    /// Refused while a preview job owns the node: an override appended
    /// after the preview node would win over it in every capture.
    pub fn switch_variant(&mut self, node: &str, set: &str, variant: &str) -> Result<OverrideRecord> {
        if let Some(job) = self.orchestrator.job_for_node(node) {
            return Err(VariantError::JobAlreadyRunning {
                node: node.to_string(),
                job,
            });
        }
        let model = self.model.as_ref().ok_or_else(not_scanned)?;
        self.overrides
            .set_selection(&mut self.host, model, node, set, variant)
    }

    /// Most recent interactive override authored on `node`
    pub fn last_override(&self, node: &str) -> Option<&OverrideRecord> {
        self.overrides.last_override(node)
    }

    pub fn override_history(&self) -> &[OverrideRecord] {
        self.overrides.history()
    }

    /// Capture every variant of `node`
    pub fn start_preview(&mut self, node: &str) -> Result<JobId> {
        let model = self.model.as_ref().ok_or_else(not_scanned)?;
        let queue_ahead = self.orchestrator.pending_jobs();
        let job = self.orchestrator.start(model, node)?;
        if queue_ahead > 0 {
            debug!("Preview of {} waits behind {} job(s)", node, queue_ahead);
        }
        Ok(job)
    }

    /// Capture an explicit subset of `node`'s variants
    pub fn start_preview_of(&mut self, node: &str, selections: &[VariantSelection]) -> Result<JobId> {
        let model = self.model.as_ref().ok_or_else(not_scanned)?;
        self.orchestrator.start_selections(model, node, selections)
    }

    pub fn cancel_preview(&mut self, job: JobId) -> Result<()> {
        self.orchestrator.cancel(job)
    }

    /// Drive capture jobs; call once per host frame
    pub fn poll(&mut self, now: Instant) -> Vec<CaptureEvent> {
        self.orchestrator
            .poll(&mut self.host, &self.overrides, &mut self.thumbnails, now)
    }

    pub fn get_thumbnail(&mut self, selection: &VariantSelection) -> Option<&Thumbnail> {
        self.thumbnails.get(selection)
    }

    pub fn thumbnails(&self) -> &ThumbnailStore {
        &self.thumbnails
    }

    pub fn job_status(&self, job: JobId) -> Result<JobStatus> {
        self.orchestrator.job_status(job)
    }

    pub fn is_capturing(&self) -> bool {
        !self.orchestrator.is_idle()
    }

    /// Clipboard text for one node
    pub fn describe_node(&self, path: &str) -> Result<String> {
        self.current_model()?.describe_node(path)
    }

    pub fn variant_tree(&self) -> Result<VariantTree> {
        Ok(self.current_model()?.tree())
    }

    /// Variant tree restricted to items matching `text`
    pub fn filter(&self, text: &str) -> Result<VariantTree> {
        Ok(self.current_model()?.tree().filter(text))
    }

    /// Preview nodes under the scanned root that no running job owns
    pub fn orphaned_previews(&self) -> Result<Vec<(NodeHandle, String)>> {
        let model = self.current_model()?;
        let live = self.orchestrator.live_preview_handles();
        self.overrides
            .find_orphaned_previews(&self.host, model.root(), &live)
    }

    /// Delete orphaned preview nodes; returns how many were removed
    pub fn purge_orphaned_previews(&mut self) -> Result<usize> {
        let orphans = self.orphaned_previews()?;
        let mut removed = 0;
        for (handle, path) in orphans {
            match self.host.delete_node(handle) {
                Ok(()) => {
                    info!("Removed orphaned preview node {}", path);
                    removed += 1;
                }
                Err(HostError::StaleHandle(_)) => {
                    debug!("Orphaned preview node {} is already gone", path);
                }
                Err(e) => return Err(VariantError::HostMutation(e)),
            }
        }
        Ok(removed)
    }

    /// Cancel all jobs, delete their preview nodes and drop the thumbnails
    pub fn shutdown(&mut self) -> Vec<CaptureEvent> {
        let events = self
            .orchestrator
            .shutdown(&mut self.host, &self.overrides, &mut self.thumbnails);
        if !self.thumbnails.is_empty() {
            debug!("Dropping {} thumbnails", self.thumbnails.len());
        }
        self.thumbnails.clear();
        events
    }
}

fn not_scanned() -> VariantError {
    VariantError::NotFound("scene has not been scanned".to_string())
}

impl<H: HostAdapter> Drop for VariantManager<H> {
    fn drop(&mut self) {
        let events = self.shutdown();
        if !events.is_empty() {
            warn!("Variant manager dropped with {} preview job(s) running", events.len());
        }
    }
}
