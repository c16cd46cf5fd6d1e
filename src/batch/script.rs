// src/batch/script.rs

//! Job script construction: header template followed by the task's
//! materialised command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex::{Captures, Regex};

use crate::config::Config;
use crate::errors::{Result, SchedError};
use crate::matcher::ParameterSet;
use crate::processor::SpecDefinition;
use crate::repo::ArtefactPool;
use crate::task::Task;

/// A job script ready to be written and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobScript {
    pub task_label: String,
    /// Where the script is written.
    pub path: PathBuf,
    /// Job log file.
    pub output_path: PathBuf,
    pub text: String,
}

fn substitute_with(pattern: &str, template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let re = Regex::new(pattern)
        .map_err(|e| SchedError::Other(anyhow::anyhow!("placeholder pattern: {e}")))?;
    Ok(re
        .replace_all(template, |caps: &Captures<'_>| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned())
}

/// Replace `${name}` placeholders; unknown ones are left untouched.
pub fn substitute_dollar(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    substitute_with(r"\$\{(\w+)\}", template, vars)
}

/// Replace `{name}` placeholders; unknown ones are left untouched.
pub fn substitute_braces(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    substitute_with(r"\{(\w+)\}", template, vars)
}

/// Placeholder values for a task's command.
///
/// - `{<slot>}`: bound artefact ids, comma separated
/// - `{<varname>}`: paths of the named resource on the bound artefacts
/// - `{assessor}`, `{outdir}`, `{project}`, `{subject}`, `{session}`, `{proctype}`
pub fn command_variables(
    config: &Config,
    task: &Task,
    spec: &SpecDefinition,
    params: &ParameterSet,
    pool: &ArtefactPool,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for slot in spec.slots.iter() {
        let ids = params.get(&slot.name).map(|b| b.ids()).unwrap_or_default();
        vars.insert(slot.name.clone(), ids.join(","));
        for resource in slot.resources.iter() {
            let Some(varname) = resource.varname.as_ref() else {
                continue;
            };
            let paths: Vec<String> = ids
                .iter()
                .map(|id| match pool.get(id) {
                    Some(a) => a.resource_path(&resource.name),
                    None => format!("{id}/{}", resource.name),
                })
                .collect();
            vars.insert(varname.clone(), paths.join(","));
        }
    }
    let outdir = config.results_dir_for(&task.label);
    vars.insert("assessor".to_string(), task.label.clone());
    vars.insert("outdir".to_string(), outdir.display().to_string());
    vars.insert("project".to_string(), task.scope.project.clone());
    vars.insert("subject".to_string(), task.scope.subject.clone());
    vars.insert("session".to_string(), task.scope.session_label().to_string());
    vars.insert("proctype".to_string(), task.proctype.clone());
    vars
}

/// Assemble the job script for `task`.
///
/// The body writes the completion sentinel only when the command succeeds;
/// the update phase relies on it.
pub fn build_job_script(
    config: &Config,
    task: &Task,
    spec: &SpecDefinition,
    params: &ParameterSet,
    pool: &ArtefactPool,
) -> Result<JobScript> {
    let vars = command_variables(config, task, spec, params, pool);
    let command = substitute_braces(&spec.command, &vars)?;
    let outdir = config.results_dir_for(&task.label);
    let sentinel = config.sentinel_path(&task.label);

    let body = format!(
        "mkdir -p '{outdir}'\n{command}\nstatus=$?\nif [ $status -eq 0 ]; then touch '{sentinel}'; fi\nexit $status",
        outdir = outdir.display(),
        sentinel = sentinel.display(),
    );

    let path = config.paths.jobs_dir.join(format!("{}.slurm", task.label));
    let output_path = config.paths.jobs_dir.join(format!("{}.output", task.label));
    let req = &spec.requirements;

    let mut header_vars = BTreeMap::new();
    header_vars.insert("job_name".to_string(), task.label.clone());
    header_vars.insert("job_walltime".to_string(), req.walltime.clone());
    header_vars.insert("job_memory".to_string(), req.memory_mb.to_string());
    header_vars.insert("job_ppn".to_string(), req.ppn.to_string());
    header_vars.insert("job_output_file".to_string(), output_path.display().to_string());
    header_vars.insert("job_cmds".to_string(), body);

    let text = substitute_dollar(&config.scheduler.header_template, &header_vars)?;
    Ok(JobScript {
        task_label: task.label.clone(),
        path,
        output_path,
        text,
    })
}
