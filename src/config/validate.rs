// src/config/validate.rs

use regex::Regex;

use crate::config::model::{Config, RawConfig};
use crate::errors::{Result, SchedError};

impl TryFrom<RawConfig> for Config {
    type Error = crate::errors::SchedError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let pattern = compile_job_id_regex(&raw)?;
        Ok(Config::new_unchecked(raw, pattern))
    }
}

fn validate_raw_config(cfg: &RawConfig) -> Result<()> {
    validate_limits(cfg)?;
    validate_scheduler(cfg)?;
    validate_task_section(cfg)?;
    Ok(())
}

fn validate_limits(cfg: &RawConfig) -> Result<()> {
    let limits = &cfg.limits;
    for (name, value) in [
        ("max_running", limits.max_running),
        ("max_pending", limits.max_pending),
        ("max_pending_uploads", limits.max_pending_uploads),
    ] {
        if value == 0 {
            return Err(SchedError::ConfigError(format!(
                "[limits].{name} must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawConfig) -> Result<()> {
    let sched = &cfg.scheduler;
    if sched.submit_cmd.trim().is_empty() {
        return Err(SchedError::ConfigError(
            "[scheduler].submit_cmd must not be empty".to_string(),
        ));
    }
    if !sched.header_template.contains("${job_cmds}") {
        return Err(SchedError::ConfigError(
            "[scheduler].header_template must contain ${job_cmds}".to_string(),
        ));
    }
    if sched.running_status.trim().is_empty() || sched.queued_status.trim().is_empty() {
        return Err(SchedError::ConfigError(
            "[scheduler].running_status and queued_status must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_section(cfg: &RawConfig) -> Result<()> {
    let task = &cfg.task;
    if task.sentinel_name.trim().is_empty() {
        return Err(SchedError::ConfigError(
            "[task].sentinel_name must not be empty".to_string(),
        ));
    }
    if !task.exempt_resources.contains(&task.archive_resource) {
        return Err(SchedError::ConfigError(format!(
            "[task].archive_resource '{}' must be listed in exempt_resources",
            task.archive_resource
        )));
    }
    Ok(())
}

fn compile_job_id_regex(cfg: &RawConfig) -> Result<Regex> {
    let pattern = Regex::new(&cfg.scheduler.job_id_regex).map_err(|e| {
        SchedError::ConfigError(format!("[scheduler].job_id_regex is invalid: {e}"))
    })?;
    if pattern.captures_len() < 2 {
        return Err(SchedError::ConfigError(
            "[scheduler].job_id_regex needs a capture group for the job id".to_string(),
        ));
    }
    Ok(pattern)
}
