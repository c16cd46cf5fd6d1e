// src/config/model.rs

use std::path::PathBuf;

use regex::Regex;
use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [paths]
/// store_dir = "/data/procsched/tasks"
/// results_dir = "/data/procsched/results"
///
/// [limits]
/// max_running = 200
/// max_pending = 20
///
/// [scheduler]
/// submit_cmd = "sbatch"
/// job_id_regex = 'Submitted batch job (\d+)'
///
/// [build]
/// priority_projects = ["PROJ_A"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub limits: LimitsSection,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub update: UpdateSection,

    #[serde(default)]
    pub task: TaskSection,

    #[serde(default)]
    pub build: BuildSection,
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    /// Root of the disk task store (one JSON record per task).
    pub store_dir: PathBuf,
    /// Task outputs live under `<results_dir>/<task label>/<resource>`.
    pub results_dir: PathBuf,
    /// Where job scripts and job logs are written.
    pub jobs_dir: PathBuf,
    pub lock_dir: PathBuf,
    /// Directory of processor specification files (`*.toml`).
    pub processors_dir: PathBuf,
    /// JSON snapshot of the artefact repository.
    pub artefacts_file: PathBuf,
    /// External upload queue; its entries are the pending-upload count.
    pub upload_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("tasks"),
            results_dir: PathBuf::from("results"),
            jobs_dir: PathBuf::from("jobs"),
            lock_dir: PathBuf::from("locks"),
            processors_dir: PathBuf::from("processors"),
            artefacts_file: PathBuf::from("artefacts.json"),
            upload_dir: PathBuf::from("upload"),
        }
    }
}

/// `[limits]` section: launch backpressure ceilings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_running: usize,
    pub max_pending: usize,
    pub max_pending_uploads: usize,
    /// Pause between two submissions, in milliseconds.
    pub submit_delay_ms: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_running: 100,
            max_pending: 50,
            max_pending_uploads: 100,
            submit_delay_ms: 1000,
        }
    }
}

/// `[scheduler]` section: how to talk to the batch system.
///
/// Command templates use `${jobid}` and `${numberofdays}` placeholders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub submit_cmd: String,
    /// First capture group is the job id.
    pub job_id_regex: String,
    pub status_cmd: String,
    pub running_status: String,
    pub queued_status: String,
    pub count_running_cmd: String,
    pub count_pending_cmd: String,
    pub mem_used_cmd: String,
    pub walltime_cmd: String,
    pub node_cmd: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub command_timeout_secs: u64,
    /// Job script header; must contain `${job_cmds}`.
    pub header_template: String,
}

pub const DEFAULT_HEADER_TEMPLATE: &str = "#!/bin/bash
#SBATCH --job-name=${job_name}
#SBATCH --time=${job_walltime}
#SBATCH --mem=${job_memory}
#SBATCH --ntasks=1
#SBATCH --cpus-per-task=${job_ppn}
#SBATCH --output=${job_output_file}

${job_cmds}
";

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            submit_cmd: "sbatch".to_string(),
            job_id_regex: r"Submitted batch job (\d+)".to_string(),
            status_cmd: "squeue -h -j ${jobid} -o %t 2>/dev/null || true".to_string(),
            running_status: "R".to_string(),
            queued_status: "PD".to_string(),
            count_running_cmd: "squeue -h --me -t R | wc -l".to_string(),
            count_pending_cmd: "squeue -h --me -t PD | wc -l".to_string(),
            mem_used_cmd: "sacct -j ${jobid}.batch -n -o MaxRSS -S now-${numberofdays}days"
                .to_string(),
            walltime_cmd: "sacct -j ${jobid} -n -X -o Elapsed -S now-${numberofdays}days"
                .to_string(),
            node_cmd: "sacct -j ${jobid} -n -X -o NodeList -S now-${numberofdays}days"
                .to_string(),
            retries: 3,
            retry_delay_ms: 2000,
            command_timeout_secs: 60,
            header_template: DEFAULT_HEADER_TEMPLATE.to_string(),
        }
    }
}

/// `[update]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateSection {
    /// Jobs older than this many days are not traced for usage.
    pub trace_window_days: i64,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            trace_window_days: 30,
        }
    }
}

/// `[task]` section: output handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskSection {
    /// Resources never purged by RERUN / REPROC.
    pub exempt_resources: Vec<String>,
    /// Resource REPROC archives previous outputs into.
    pub archive_resource: String,
    /// File a job writes into its results directory on success.
    pub sentinel_name: String,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            exempt_resources: vec!["OLD".to_string(), "EDITS".to_string()],
            archive_resource: "OLD".to_string(),
            sentinel_name: "READY_TO_UPLOAD.txt".to_string(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Projects whose tasks the launch pass visits first, in list order.
    pub priority_projects: Vec<String>,
    pub lock_prefix: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            priority_projects: Vec::new(),
            lock_prefix: "procsched".to_string(),
        }
    }
}

/// Validated configuration.
///
/// Produced from [`RawConfig`] via `TryFrom`; every component receives it
/// explicitly at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsSection,
    pub limits: LimitsSection,
    pub scheduler: SchedulerSection,
    pub update: UpdateSection,
    pub task: TaskSection,
    pub build: BuildSection,
    job_id_pattern: Regex,
}

impl Config {
    pub(crate) fn new_unchecked(raw: RawConfig, job_id_pattern: Regex) -> Self {
        Self {
            paths: raw.paths,
            limits: raw.limits,
            scheduler: raw.scheduler,
            update: raw.update,
            task: raw.task,
            build: raw.build,
            job_id_pattern,
        }
    }

    /// Compiled `[scheduler].job_id_regex`.
    pub fn job_id_pattern(&self) -> &Regex {
        &self.job_id_pattern
    }

    pub fn is_exempt_resource(&self, resource: &str) -> bool {
        self.task.exempt_resources.iter().any(|r| r == resource)
    }

    /// Results directory of a task, keyed by its label.
    pub fn results_dir_for(&self, label: &str) -> PathBuf {
        self.paths.results_dir.join(label)
    }

    pub fn sentinel_path(&self, label: &str) -> PathBuf {
        self.results_dir_for(label).join(&self.task.sentinel_name)
    }
}
