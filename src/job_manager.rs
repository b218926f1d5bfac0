use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use article_lookup_lib::scheduler::ControlState;
use article_lookup_lib::{aggregator, exporter, input_loader};
use article_lookup_lib::{AppConfig, BatchScheduler, Lookup, ProgressHandle, RunControl, RunProgress};
use chrono::Local;
use log::{error, info, warn};
use serde::Serialize;

const MAX_LOG_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Paused,
    Stopped,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSignal {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub status: JobState,
    pub file_name: String,
    pub progress: RunProgress,
    pub failed_items: usize,
    /// Load, export or run failure that ended the job.
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub download_name: Option<String>,
}

impl JobStatus {
    fn log(&mut self, msg: impl Into<String>) {
        let line = format!("{} {}", Local::now().format("%H:%M:%S"), msg.into());
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            self.logs.remove(0);
        }
    }
}

struct JobEntry {
    status: JobStatus,
    control: RunControl,
    progress: ProgressHandle,
    output_path: PathBuf,
}

type Jobs = Arc<Mutex<HashMap<String, JobEntry>>>;

pub struct JobManager {
    jobs: Jobs,
    config: AppConfig,
    lookup: Arc<dyn Lookup>,
}

fn lock(jobs: &Jobs) -> MutexGuard<'_, HashMap<String, JobEntry>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn with_job<F: FnOnce(&mut JobEntry)>(jobs: &Jobs, job_id: &str, f: F) {
    if let Some(entry) = lock(jobs).get_mut(job_id) {
        f(entry);
    }
}

impl JobManager {
    pub fn new(config: AppConfig, lookup: Arc<dyn Lookup>) -> Self {
        JobManager {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            config,
            lookup,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn start_job(&self, job_id: String, file_name: String, input_path: PathBuf) -> String {
        let download_name = exporter::export_file_name(&file_name);
        let output_path = PathBuf::from(&self.config.output_dir).join(format!("{}-{}", job_id, download_name));

        let mut status = JobStatus {
            id: job_id.clone(),
            status: JobState::Queued,
            file_name,
            progress: RunProgress::default(),
            failed_items: 0,
            error: None,
            logs: Vec::new(),
            download_name: None,
        };
        status.log("Job queued.");

        let control = RunControl::default();
        lock(&self.jobs).insert(
            job_id.clone(),
            JobEntry {
                status,
                control: control.clone(),
                progress: ProgressHandle::default(),
                output_path: output_path.clone(),
            },
        );

        let jobs = self.jobs.clone();
        let config = self.config.clone();
        let lookup = self.lookup.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            run_job(id, jobs, config, lookup, control, input_path, output_path, download_name).await;
        });

        job_id
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        let guard = lock(&self.jobs);
        let entry = guard.get(job_id)?;
        let mut status = entry.status.clone();
        status.progress = entry.progress.snapshot();
        if status.status == JobState::Processing && entry.control.state() == ControlState::Pause {
            status.status = JobState::Paused;
        }
        Some(status)
    }

    /// Export file and download name, once the job has produced one.
    pub fn download(&self, job_id: &str) -> Option<(PathBuf, String)> {
        let guard = lock(&self.jobs);
        let entry = guard.get(job_id)?;
        match (&entry.status.status, &entry.status.download_name) {
            (JobState::Completed | JobState::Stopped, Some(name)) => Some((entry.output_path.clone(), name.clone())),
            _ => None,
        }
    }

    pub fn send_control(&self, job_id: &str, signal: JobSignal) -> bool {
        let mut guard = lock(&self.jobs);
        let Some(entry) = guard.get_mut(job_id) else {
            return false;
        };
        match signal {
            JobSignal::Pause => {
                entry.control.pause();
                entry.status.log("Pause requested; takes effect after the current batch.");
            }
            JobSignal::Resume => {
                entry.control.resume();
                entry.status.log("Job resumed.");
            }
            JobSignal::Stop => {
                entry.control.stop();
                entry.status.log("Stop requested; takes effect after the current batch.");
            }
        }
        true
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_job(
    job_id: String,
    jobs: Jobs,
    config: AppConfig,
    lookup: Arc<dyn Lookup>,
    control: RunControl,
    input_path: PathBuf,
    output_path: PathBuf,
    download_name: String,
) {
    let fail = |message: String| {
        error!("Job {} failed: {}", job_id, message);
        with_job(&jobs, &job_id, |entry| {
            entry.status.status = JobState::Failed;
            entry.status.log(format!("Failed: {}", message));
            entry.status.error = Some(message);
        });
    };

    let loaded = input_loader::load_records(&input_path);
    // The upload is only read once; the export is what gets downloaded.
    if let Err(e) = std::fs::remove_file(&input_path) {
        warn!("Could not remove upload {:?}: {}", input_path, e);
    }
    let mut table = match loaded {
        Ok(table) => table,
        Err(e) => {
            fail(format!("Could not parse the uploaded file: {}", e));
            return;
        }
    };

    let scheduler = BatchScheduler::with_control(config.scheduler, control);
    with_job(&jobs, &job_id, |entry| {
        entry.progress = scheduler.progress();
        entry.status.status = JobState::Processing;
        entry.status.log(format!("Loaded {} articles.", table.len()));
    });
    info!("Job {}: {} articles loaded from {:?}", job_id, table.len(), input_path);

    let results = match scheduler.run(table.work_items(), lookup).await {
        Ok(results) => results,
        Err(failure) => {
            fail(format!("The batch run crashed: {}", failure));
            return;
        }
    };
    table.records = aggregator::merge(&table.records, &results);

    if let Err(e) = exporter::export_file(&table, &output_path) {
        fail(e.to_string());
        return;
    }

    let failed_items = aggregator::failed_count(&results);
    let cancelled = scheduler.progress().snapshot().is_cancelled;
    if failed_items > 0 {
        warn!("Job {}: {} lookups failed, original codes kept", job_id, failed_items);
    }
    with_job(&jobs, &job_id, |entry| {
        entry.status.failed_items = failed_items;
        entry.status.download_name = Some(download_name);
        if cancelled {
            entry.status.status = JobState::Stopped;
            entry.status.log("Job stopped. Unprocessed articles keep their original codes.");
        } else {
            entry.status.status = JobState::Completed;
            entry.status.log("All articles processed.");
        }
    });
    info!("Job {} finished", job_id);
}
