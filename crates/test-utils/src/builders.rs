#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use procsched::config::{Config, RawConfig};
use procsched::processor::{Processor, Requirements};
use procsched::processor::spec::{RawInputSlot, RawMatchFilter, RawProcessorSpec, RawResource};
use procsched::repo::{Artefact, UpstreamStatus};
use procsched::task::{ProcStatus, QcStatus};
use procsched::types::{ArtefactKind, ProcessorLevel};

/// Builder for `Config` with test-friendly defaults: no submission delay
/// and no batch retries.
pub struct ConfigBuilder {
    raw: RawConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut raw = RawConfig::default();
        raw.limits.submit_delay_ms = 0;
        raw.scheduler.retries = 0;
        raw.scheduler.retry_delay_ms = 0;
        Self { raw }
    }

    /// Put every configured directory under `root`.
    pub fn root(mut self, root: &Path) -> Self {
        let paths = &mut self.raw.paths;
        paths.store_dir = root.join("tasks");
        paths.results_dir = root.join("results");
        paths.jobs_dir = root.join("jobs");
        paths.lock_dir = root.join("locks");
        paths.processors_dir = root.join("processors");
        paths.artefacts_file = root.join("artefacts.json");
        paths.upload_dir = root.join("upload");
        self
    }

    pub fn max_running(mut self, n: usize) -> Self {
        self.raw.limits.max_running = n;
        self
    }

    pub fn max_pending(mut self, n: usize) -> Self {
        self.raw.limits.max_pending = n;
        self
    }

    pub fn max_pending_uploads(mut self, n: usize) -> Self {
        self.raw.limits.max_pending_uploads = n;
        self
    }

    pub fn submit_delay_ms(mut self, ms: u64) -> Self {
        self.raw.limits.submit_delay_ms = ms;
        self
    }

    pub fn priority_projects(mut self, projects: &[&str]) -> Self {
        self.raw.build.priority_projects = projects.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn trace_window_days(mut self, days: i64) -> Self {
        self.raw.update.trace_window_days = days;
        self
    }

    pub fn header_template(mut self, template: &str) -> Self {
        self.raw.scheduler.header_template = template.to_string();
        self
    }

    pub fn raw(self) -> RawConfig {
        self.raw
    }

    pub fn build(self) -> Config {
        Config::try_from(self.raw).expect("Failed to build valid config from builder")
    }

    pub fn build_arc(self) -> Arc<Config> {
        Arc::new(self.build())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one processor input slot.
pub struct SlotBuilder {
    slot: RawInputSlot,
}

impl SlotBuilder {
    fn new(name: &str, kind: ArtefactKind, types: &[&str]) -> Self {
        Self {
            slot: RawInputSlot {
                name: name.to_string(),
                kind,
                types: types.iter().map(|t| t.to_string()).collect(),
                resources: vec![],
                needs_qc: false,
                skip_unusable: false,
                select: None,
                iterate: None,
                map_to: None,
                optional: false,
            },
        }
    }

    pub fn scan(name: &str, types: &[&str]) -> Self {
        Self::new(name, ArtefactKind::Scan, types)
    }

    pub fn assessor(name: &str, types: &[&str]) -> Self {
        Self::new(name, ArtefactKind::Assessor, types)
    }

    pub fn select(mut self, statement: &str) -> Self {
        self.slot.select = Some(statement.to_string());
        self
    }

    pub fn needs_qc(mut self) -> Self {
        self.slot.needs_qc = true;
        self
    }

    pub fn skip_unusable(mut self) -> Self {
        self.slot.skip_unusable = true;
        self
    }

    pub fn iterate(mut self, mode: &str) -> Self {
        self.slot.iterate = Some(mode.to_string());
        self
    }

    pub fn map_to(mut self, source: &str) -> Self {
        self.slot.map_to = Some(source.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.slot.optional = true;
        self
    }

    pub fn resource(self, name: &str) -> Self {
        self.push_resource(name, None, true, None)
    }

    pub fn resource_filtered(self, name: &str, filter: &str) -> Self {
        self.push_resource(name, Some(filter), true, None)
    }

    pub fn resource_var(self, name: &str, varname: &str) -> Self {
        self.push_resource(name, None, true, Some(varname))
    }

    pub fn optional_resource(self, name: &str) -> Self {
        self.push_resource(name, None, false, None)
    }

    fn push_resource(mut self, name: &str, filter: Option<&str>, required: bool, varname: Option<&str>) -> Self {
        self.slot.resources.push(RawResource {
            name: name.to_string(),
            filter: filter.map(str::to_string),
            required,
            varname: varname.map(str::to_string),
        });
        self
    }

    pub fn build(self) -> RawInputSlot {
        self.slot
    }
}

/// Builder for a processor specification.
pub struct SpecBuilder {
    raw: RawProcessorSpec,
}

impl SpecBuilder {
    /// Session-level spec running `echo <name>`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            raw: RawProcessorSpec {
                name: name.to_string(),
                version: version.to_string(),
                level: ProcessorLevel::Session,
                command: format!("echo {name}"),
                requirements: Requirements::default(),
                containers: vec![],
                inputs: vec![],
                filters: vec![],
            },
        }
    }

    pub fn subject_level(mut self) -> Self {
        self.raw.level = ProcessorLevel::Subject;
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.raw.command = command.to_string();
        self
    }

    pub fn requirements(mut self, walltime: &str, memory_mb: u64, ppn: u32) -> Self {
        self.raw.requirements = Requirements {
            walltime: walltime.to_string(),
            memory_mb,
            ppn,
        };
        self
    }

    pub fn input(mut self, slot: SlotBuilder) -> Self {
        self.raw.inputs.push(slot.build());
        self
    }

    pub fn filter(mut self, terms: &[&str]) -> Self {
        self.raw.filters.push(RawMatchFilter {
            inputs: terms.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn raw(self) -> RawProcessorSpec {
        self.raw
    }

    pub fn try_build(self) -> procsched::errors::Result<Processor> {
        Processor::try_from(self.raw)
    }

    pub fn build(self) -> Processor {
        self.try_build().expect("Failed to build valid processor from builder")
    }
}

/// Builder for repository artefacts.
pub struct ArtefactBuilder {
    artefact: Artefact,
}

impl ArtefactBuilder {
    pub fn scan(id: &str, artefact_type: &str) -> Self {
        Self {
            artefact: Artefact::new(id, ArtefactKind::Scan, artefact_type),
        }
    }

    pub fn assessor(id: &str, proctype: &str) -> Self {
        Self {
            artefact: Artefact::new(id, ArtefactKind::Assessor, proctype),
        }
    }

    pub fn unusable(mut self) -> Self {
        self.artefact.usable = false;
        self
    }

    pub fn resource(mut self, name: &str, files: &[&str]) -> Self {
        self.artefact
            .resources
            .insert(name.to_string(), files.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.artefact.fields.insert(key.to_string(), value.to_string());
        self
    }

    pub fn session(mut self, session: &str) -> Self {
        self.artefact.session = Some(session.to_string());
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.artefact.location = Some(location.to_string());
        self
    }

    pub fn status(mut self, proc_status: ProcStatus, qc_status: QcStatus) -> Self {
        self.artefact.status = Some(UpstreamStatus {
            proc_status,
            qc_status,
        });
        self
    }

    pub fn build(self) -> Artefact {
        self.artefact
    }
}
