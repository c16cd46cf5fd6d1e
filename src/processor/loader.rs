// src/processor/loader.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::errors::{Result, SchedError};
use crate::fs::FileSystem;
use crate::processor::spec::{Processor, ProcessorSpec, RawProcessorSpec};

/// Result of loading a processor library directory.
///
/// A malformed file never prevents the others from loading; it is recorded
/// in `failures` instead.
#[derive(Debug, Default)]
pub struct ProcessorLibrary {
    pub processors: Vec<Processor>,
    pub failures: Vec<(PathBuf, SchedError)>,
}

/// Parse and validate one processor specification from TOML text.
pub fn parse_processor(text: &str, source: Option<&Path>) -> Result<Processor> {
    let raw: RawProcessorSpec = toml::from_str(text)?;
    let mut processor = Processor::try_from(raw)?;
    if let Some(path) = source {
        set_source(&mut processor, path);
    }
    Ok(processor)
}

fn set_source(processor: &mut Processor, path: &Path) {
    let def = match processor {
        Processor::Session(p) => p.definition_mut(),
        Processor::Subject(p) => p.definition_mut(),
    };
    def.source = Some(path.to_path_buf());
}

pub fn load_processor(fs: &Arc<dyn FileSystem>, path: &Path) -> Result<Processor> {
    let text = fs
        .read_to_string(path)
        .map_err(|e| SchedError::spec(path.display().to_string(), format!("{e:#}")))?;
    parse_processor(&text, Some(path)).map_err(|e| match e {
        SchedError::TomlError(te) => SchedError::spec(path.display().to_string(), te.to_string()),
        other => other,
    })
}

/// Load every `*.toml` file in `dir`, in file-name order.
pub fn load_library(fs: &Arc<dyn FileSystem>, dir: &Path) -> Result<ProcessorLibrary> {
    let mut entries = fs.read_dir(dir).map_err(|e| {
        SchedError::ConfigError(format!("cannot read processor dir {}: {e:#}", dir.display()))
    })?;
    entries.sort();

    let mut library = ProcessorLibrary::default();
    for path in entries {
        if !fs.is_file(&path) || path.extension().and_then(|e| e.to_str()) != Some("toml") {
            debug!(path = %path.display(), "skipping non-spec file");
            continue;
        }
        match load_processor(fs, &path) {
            Ok(processor) => {
                debug!(proctype = %processor.proctype(), path = %path.display(), "loaded processor");
                library.processors.push(processor);
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "skipping malformed processor spec");
                library.failures.push((path, e));
            }
        }
    }
    info!(
        loaded = library.processors.len(),
        failed = library.failures.len(),
        "processor library loaded"
    );
    Ok(library)
}
