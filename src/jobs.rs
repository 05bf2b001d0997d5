use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// `re-evaluate` runs the Scoring Loop and Meta Analyzer as a background
/// job so the HTTP request returns immediately instead of blocking for the
/// whole pipeline run. The `tokio::spawn`'d task owns the job's lifecycle;
/// this registry is just the status table it reports through.
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

struct JobRecord {
    status: JobStatus,
    started_at: chrono::DateTime<chrono::Utc>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobSnapshot {
    pub status: String,
    pub elapsed_seconds: i64,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.write().unwrap().insert(
            id,
            JobRecord { status: JobStatus::Running, started_at: chrono::Utc::now(), message: None, error: None },
        );
        id
    }

    pub fn complete(&self, id: Uuid, message: impl Into<String>) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = JobStatus::Completed;
            job.message = Some(message.into());
        }
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = JobStatus::Failed;
            job.error = Some(error.into());
        }
    }

    pub fn get(&self, id: Uuid) -> Option<JobSnapshot> {
        self.jobs.read().unwrap().get(&id).map(|job| JobSnapshot {
            status: job.status.as_str().to_string(),
            elapsed_seconds: chrono::Utc::now().signed_duration_since(job.started_at).num_seconds(),
            message: job.message.clone(),
            error: job.error.clone(),
        })
    }
}
