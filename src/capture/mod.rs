//! Capture orchestrator
//!
//! Drives the viewport through every variant of a node, one item at a time:
//! switch the job's preview override, wait for the renderer, grab the frame,
//! move on. When the queue is exhausted (or the job is cancelled) the
//! pre-job selections are re-applied and the preview node is deleted.
//!
//! Nothing here blocks. The host event loop calls [`CaptureOrchestrator::poll`]
//! every frame; each call runs transitions until the active job has to wait
//! for the renderer again. Only one job drives the viewport at a time
//! ([`MAX_ACTIVE_JOBS`]); later jobs queue in start order.

pub mod job;
pub mod state;

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use glam::UVec2;
use log::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::constants::capture::MAX_ACTIVE_JOBS;
use crate::error::{HostError, Result, VariantError};
use crate::host::{CameraHint, HostAdapter, NodeHandle};
use crate::model::{VariantModel, VariantSelection};
use crate::overrides::OverrideController;
use crate::thumbnails::{Thumbnail, ThumbnailStore};

pub use job::{CaptureFailure, CaptureJob, ItemOutcome, JobId, JobStatus};
pub use state::{allowed_transitions, validate_transition, CaptureState, IllegalTransition};

/// Upper bound on transitions needed to tear a cancelled job down
const MAX_TEARDOWN_STEPS: usize = 8;

/// Notifications produced while polling
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    ThumbnailReady {
        job: JobId,
        selection: VariantSelection,
    },
    ItemFailed {
        job: JobId,
        selection: VariantSelection,
        failure: CaptureFailure,
    },
    JobFinished {
        job: JobId,
        node: String,
        cancelled: bool,
    },
}

/// Capture tunables copied out of [`ManagerConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    pub frame_timeout: Duration,
    pub poll_interval: Duration,
    pub thumbnail_width: u32,
    pub default_aspect_ratio: f32,
}

impl CaptureSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            frame_timeout: config.frame_timeout(),
            poll_interval: config.poll_interval(),
            thumbnail_width: config.thumbnail_width,
            default_aspect_ratio: config.default_aspect_ratio,
        }
    }

    /// Thumbnail width by the height matching the viewport aspect ratio
    pub fn capture_resolution(&self, aspect_ratio: Option<f32>) -> UVec2 {
        let aspect = aspect_ratio
            .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
            .unwrap_or(self.default_aspect_ratio);
        let height = (self.thumbnail_width as f32 / aspect).round().max(1.0) as u32;
        UVec2::new(self.thumbnail_width, height)
    }
}

enum Step {
    Continue,
    Suspend,
    Finished,
}

/// Serializes capture jobs through the single viewport
#[derive(Debug)]
pub struct CaptureOrchestrator {
    settings: CaptureSettings,
    /// Front job is the active one
    jobs: VecDeque<CaptureJob>,
    finished: HashMap<JobId, JobStatus>,
    /// Events raised outside of `poll`, delivered with the next poll
    pending_events: Vec<CaptureEvent>,
}

impl CaptureOrchestrator {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            settings: CaptureSettings::from_config(config),
            jobs: VecDeque::new(),
            finished: HashMap::new(),
            pending_events: Vec::new(),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Queue a job over every variant of every set on `node`
    pub fn start(&mut self, model: &VariantModel, node: &str) -> Result<JobId> {
        let queue = model.preview_queue(node)?;
        self.enqueue(node, queue)
    }

    /// Queue a job over an explicit list of selections on `node`
    ///
    /// Repeated selections are captured once, in first-seen order.
    pub fn start_selections(
        &mut self,
        model: &VariantModel,
        node: &str,
        selections: &[VariantSelection],
    ) -> Result<JobId> {
        model.node(node)?;
        let mut seen = HashSet::new();
        let mut queue = Vec::with_capacity(selections.len());
        for selection in selections {
            if selection.node_path != node {
                return Err(VariantError::InvalidSelection {
                    node: node.to_string(),
                    set: selection.set_name.clone(),
                    variant: selection.variant_name.clone(),
                });
            }
            model.validate_selection(selection)?;
            if seen.insert(selection) {
                queue.push(selection.clone());
            }
        }
        self.enqueue(node, queue)
    }

    fn enqueue(&mut self, node: &str, queue: Vec<VariantSelection>) -> Result<JobId> {
        if let Some(existing) = self.job_for_node(node) {
            return Err(VariantError::JobAlreadyRunning {
                node: node.to_string(),
                job: existing,
            });
        }

        let job = CaptureJob::new(node, queue, self.settings.frame_timeout);
        let id = job.id();
        info!(
            "Queued preview job {} for {} ({} items, {} ahead)",
            id,
            node,
            job.queue.len(),
            self.jobs.len()
        );
        self.jobs.push_back(job);
        Ok(id)
    }

    /// Request cancellation
    ///
    /// A queued job is dropped right away. A running job is torn down on the
    /// next poll: thumbnails captured so far are kept and the preview node is
    /// deleted. Cancelling a finished job does nothing.
    pub fn cancel(&mut self, job_id: JobId) -> Result<()> {
        let Some(position) = self.jobs.iter().position(|job| job.id == job_id) else {
            if self.finished.contains_key(&job_id) {
                return Ok(());
            }
            return Err(VariantError::UnknownJob(job_id));
        };

        let job = &mut self.jobs[position];
        job.cancelled = true;
        if job.is_started() {
            info!("Cancelling preview job {} for {}", job_id, job.target);
            return Ok(());
        }

        if let Some(job) = self.jobs.remove(position) {
            info!("Dropped queued preview job {} for {}", job_id, job.target);
            self.pending_events.push(CaptureEvent::JobFinished {
                job: job_id,
                node: job.target.clone(),
                cancelled: true,
            });
            self.finished.insert(job_id, job.status(None));
        }
        Ok(())
    }

    /// Advance the active job as far as it can go without waiting
    pub fn poll<H: HostAdapter + ?Sized>(
        &mut self,
        host: &mut H,
        overrides: &OverrideController,
        store: &mut ThumbnailStore,
        now: Instant,
    ) -> Vec<CaptureEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        let settings = self.settings;

        while let Some(job) = self.jobs.front_mut() {
            match step(job, &settings, host, overrides, store, now, &mut events) {
                Step::Continue => {}
                Step::Suspend => break,
                Step::Finished => self.finish_front(),
            }
        }
        events
    }

    /// Cancel every job and delete their preview nodes before returning
    pub fn shutdown<H: HostAdapter + ?Sized>(
        &mut self,
        host: &mut H,
        overrides: &OverrideController,
        store: &mut ThumbnailStore,
    ) -> Vec<CaptureEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        self.finished.clear();
        if self.jobs.is_empty() {
            return events;
        }
        info!("Shutting down {} preview job(s)", self.jobs.len());

        let settings = self.settings;
        let now = Instant::now();
        for job in self.jobs.iter_mut() {
            job.cancelled = true;
        }

        while let Some(job) = self.jobs.front_mut() {
            if job.is_started() {
                let mut steps = 0;
                while !matches!(
                    step(job, &settings, host, overrides, store, now, &mut events),
                    Step::Finished
                ) {
                    steps += 1;
                    if steps >= MAX_TEARDOWN_STEPS {
                        error!("Job {} did not reach cleanup during shutdown", job.id);
                        break;
                    }
                }
            } else {
                events.push(CaptureEvent::JobFinished {
                    job: job.id,
                    node: job.target.clone(),
                    cancelled: true,
                });
            }
            self.finish_front();
        }
        // The session is over; nobody asks about these jobs again
        self.finished.clear();
        events
    }

    fn finish_front(&mut self) {
        if let Some(job) = self.jobs.pop_front() {
            let status = job.status(None);
            info!(
                "Preview job {} for {} finished: {} captured, {} failed{}",
                job.id,
                job.target,
                status.captured(),
                status.failed(),
                if job.cancelled { " (cancelled)" } else { "" }
            );
            self.finished.insert(job.id, status);
        }
    }

    /// Jobs allowed to drive the viewport that have started doing so
    fn running(&self) -> impl Iterator<Item = &CaptureJob> {
        self.jobs
            .iter()
            .take(MAX_ACTIVE_JOBS)
            .filter(|job| job.is_started())
    }

    /// Preview nodes owned by jobs that have not finished
    pub fn live_preview_handles(&self) -> HashSet<NodeHandle> {
        self.running()
            .filter_map(|job| job.preview.as_ref().map(|record| record.handle))
            .collect()
    }

    pub fn job_status(&self, job_id: JobId) -> Result<JobStatus> {
        if let Some(position) = self.jobs.iter().position(|job| job.id == job_id) {
            return Ok(self.jobs[position].status(Some(position)));
        }
        self.finished
            .get(&job_id)
            .cloned()
            .ok_or(VariantError::UnknownJob(job_id))
    }

    /// Queued or running job for a node
    pub fn job_for_node(&self, node: &str) -> Option<JobId> {
        self.jobs.iter().find(|job| job.target == node).map(|job| job.id)
    }

    /// The job currently driving the viewport
    pub fn active_job(&self) -> Option<JobId> {
        self.running().next().map(|job| job.id)
    }

    /// Queued plus running jobs
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Run one transition of `job`
fn step<H: HostAdapter + ?Sized>(
    job: &mut CaptureJob,
    settings: &CaptureSettings,
    host: &mut H,
    overrides: &OverrideController,
    store: &mut ThumbnailStore,
    now: Instant,
    events: &mut Vec<CaptureEvent>,
) -> Step {
    if job.cancelled && job.state.is_in_flight() {
        job.transition(CaptureState::Cancelled);
        return Step::Continue;
    }

    match job.state {
        CaptureState::Idle => {
            job.snapshot = authored_snapshot(host, &job.target);
            job.transition(CaptureState::Armed);
        }
        CaptureState::Armed => {
            let hint = CameraHint {
                target_path: job.target.clone(),
                resolution: settings.capture_resolution(host.viewport_aspect_ratio()),
            };
            info!(
                "Job {}: previewing {} variant(s) of {} at {}x{}",
                job.id,
                job.queue.len(),
                job.target,
                hint.resolution.x,
                hint.resolution.y
            );
            host.point_viewport_at(&hint);
            if job.queue.is_empty() {
                job.transition(CaptureState::Restoring);
            } else {
                job.transition(CaptureState::Switching);
            }
        }
        CaptureState::Switching => {
            let Some(selection) = job.current().cloned() else {
                job.transition(CaptureState::Advancing);
                return Step::Continue;
            };
            match switch_preview(job, host, overrides, std::slice::from_ref(&selection)) {
                Ok(()) => {
                    debug!("Job {}: switched to {}", job.id, selection);
                    job.wait_started = Some(now);
                    job.next_frame_check = Some(now);
                    job.transition(CaptureState::WaitingForFrame);
                }
                Err(e) => {
                    warn!("Job {}: could not switch to {}: {}", job.id, selection, e);
                    fail_item(job, selection, CaptureFailure::from_variant_error(e), events);
                    job.transition(CaptureState::Advancing);
                }
            }
        }
        CaptureState::WaitingForFrame => {
            let started = *job.wait_started.get_or_insert(now);
            let due = job.next_frame_check.map_or(true, |at| now >= at);
            if due {
                job.next_frame_check = Some(now + settings.poll_interval);
                if host.is_frame_ready() {
                    job.transition(CaptureState::Capturing);
                    return Step::Continue;
                }
            }

            if now.saturating_duration_since(started) < job.timeout {
                return Step::Suspend;
            }
            let failure = CaptureFailure::Timeout {
                timeout_ms: job.timeout.as_millis() as u64,
            };
            if let Some(selection) = job.current().cloned() {
                warn!("Job {}: {} {}", job.id, selection, failure);
                fail_item(job, selection, failure, events);
            }
            job.transition(CaptureState::Advancing);
        }
        CaptureState::Capturing => {
            let Some(selection) = job.current().cloned() else {
                job.transition(CaptureState::Advancing);
                return Step::Continue;
            };
            // Without its preview node the viewport no longer shows the selection
            if let Some(record) = job.preview.as_ref() {
                if host.node_info(record.handle).is_none() {
                    let failure = CaptureFailure::Host(HostError::StaleHandle(record.handle.0));
                    warn!("Job {}: preview node of {} vanished before capture", job.id, selection);
                    fail_item(job, selection, failure, events);
                    job.transition(CaptureState::Advancing);
                    return Step::Continue;
                }
            }
            match host.capture_frame() {
                Ok(frame) if frame.is_consistent() => {
                    store.put(Thumbnail::from_frame(selection.clone(), frame));
                    job.record(ItemOutcome::Captured);
                    events.push(CaptureEvent::ThumbnailReady {
                        job: job.id,
                        selection,
                    });
                }
                Ok(frame) => {
                    let failure = CaptureFailure::Host(HostError::Capture(format!(
                        "{} bytes do not match {}x{}",
                        frame.pixels.len(),
                        frame.resolution.x,
                        frame.resolution.y
                    )));
                    warn!("Job {}: {}: {}", job.id, selection, failure);
                    fail_item(job, selection, failure, events);
                }
                Err(e) => {
                    warn!("Job {}: capture of {} failed: {}", job.id, selection, e);
                    fail_item(job, selection, CaptureFailure::Host(e), events);
                }
            }
            job.transition(CaptureState::Advancing);
        }
        CaptureState::Advancing => {
            job.index += 1;
            job.wait_started = None;
            job.next_frame_check = None;
            if job.index < job.queue.len() {
                job.transition(CaptureState::Switching);
            } else {
                job.transition(CaptureState::Restoring);
            }
        }
        CaptureState::Restoring => {
            if let Some(record) = job.preview.as_mut() {
                if let Err(e) = overrides.update_preview(host, record, &job.snapshot) {
                    warn!("Job {}: could not restore {}: {}", job.id, job.target, e);
                }
            }
            job.transition(CaptureState::Cleanup);
        }
        CaptureState::Cancelled => {
            info!(
                "Job {}: cancelled at item {}/{}",
                job.id,
                job.index.min(job.queue.len()),
                job.queue.len()
            );
            job.transition(CaptureState::Cleanup);
        }
        CaptureState::Cleanup => {
            if let Some(record) = job.preview.take() {
                if let Err(e) = overrides.delete_preview(host, &record) {
                    error!(
                        "Job {}: preview node {} under {} was left behind: {}",
                        job.id, record.handle, record.target_path, e
                    );
                    job.leaked_preview = Some(record.handle);
                }
            }
            job.transition(CaptureState::Idle);
            events.push(CaptureEvent::JobFinished {
                job: job.id,
                node: job.target.clone(),
                cancelled: job.cancelled,
            });
            return Step::Finished;
        }
    }
    Step::Continue
}

/// Point the job's preview node at `selections`
///
/// The node is appended on first use, and again when the host no longer
/// knows it (deleted by hand while the job was running).
fn switch_preview<H: HostAdapter + ?Sized>(
    job: &mut CaptureJob,
    host: &mut H,
    overrides: &OverrideController,
    selections: &[VariantSelection],
) -> Result<()> {
    if let Some(record) = job.preview.as_mut() {
        match overrides.update_preview(host, record, selections) {
            Err(VariantError::HostMutation(HostError::StaleHandle(handle))) => {
                warn!("Job {}: preview node {} disappeared, appending a new one", job.id, handle);
                job.preview = None;
            }
            result => return result,
        }
    }
    job.preview = Some(overrides.append_preview(host, &job.target, selections)?);
    Ok(())
}

fn fail_item(
    job: &mut CaptureJob,
    selection: VariantSelection,
    failure: CaptureFailure,
    events: &mut Vec<CaptureEvent>,
) {
    job.record(ItemOutcome::Failed(failure.clone()));
    events.push(CaptureEvent::ItemFailed {
        job: job.id,
        selection,
        failure,
    });
}

/// Selections currently authored on `target`, as read from the host
fn authored_snapshot<H: HostAdapter + ?Sized>(host: &H, target: &str) -> Vec<VariantSelection> {
    let Some(handle) = host.resolve(target) else {
        debug!("{} is gone; nothing to restore", target);
        return Vec::new();
    };
    host.list_variant_sets(handle)
        .into_iter()
        .filter_map(|set| {
            set.selection
                .map(|variant| VariantSelection::new(target, set.name, variant))
        })
        .collect()
}
