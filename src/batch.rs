//! Directory batch driver for the block threshold filter.
//!
//! Every supported image in the input directory is filtered independently and
//! written under the same file name in the output directory. Files share no
//! state, so they are processed in parallel and a failure on one file is
//! recorded without stopping the others.

use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};
use crate::error::{AnnotatorError, Result};
use crate::filter::{self, FilterSettings};

/// Extensions picked up from the input directory (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Whether `path` names a file the batch driver should process.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    /// Output path on success
    pub result: std::result::Result<PathBuf, AnnotatorError>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Sorted by file name
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(FileOutcome::is_ok)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub file_name: String,
}

/// List the supported image files directly inside `input_dir`, sorted by name.
pub fn collect_images(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn process_directory(
    input_dir: &Path,
    output_dir: &Path,
    settings: &FilterSettings,
) -> Result<BatchReport> {
    process_directory_with_progress(input_dir, output_dir, settings, |_| {})
}

/// Filter every supported image in `input_dir` into `output_dir`.
///
/// Settings that can never be valid fail the whole call before any file is
/// touched. Everything after that is reported per file.
pub fn process_directory_with_progress<F>(
    input_dir: &Path,
    output_dir: &Path,
    settings: &FilterSettings,
    on_progress: F,
) -> Result<BatchReport>
where
    F: Fn(BatchProgress) + Sync,
{
    settings.check()?;

    let paths = collect_images(input_dir)?;
    fs::create_dir_all(output_dir).map_err(|e| AnnotatorError::write_io(output_dir, e))?;

    let total = paths.len();
    info!(
        input = %input_dir.display(),
        output = %output_dir.display(),
        files = total,
        "Starting batch filter"
    );

    let completed = AtomicUsize::new(0);
    let outcomes: Vec<FileOutcome> = paths
        .par_iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let result = filter::filter_file(path, output_dir, settings);
            if let Err(e) = &result {
                warn!(file = %file_name, error = %e, "Failed to process image");
            }

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            on_progress(BatchProgress {
                completed: done,
                total,
                file_name: file_name.clone(),
            });

            FileOutcome { file_name, result }
        })
        .collect();

    let report = BatchReport {
        input_dir: input_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        outcomes,
    };

    info!(
        succeeded = report.succeeded().count(),
        failed = report.failed().count(),
        "Batch filter finished"
    );

    Ok(report)
}
