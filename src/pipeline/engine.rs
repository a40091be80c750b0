//! Process-wide pdfium binding.
//!
//! pdfium is a C library with global state: initialising it twice, or
//! tearing it down while another thread renders, is undefined behaviour.
//! The library is therefore bound exactly once and the [`Pdfium`] handle is
//! shared by every blocking render thread for the life of the process.
//!
//! Lookup order:
//! 1. a path given to [`set_library_path`], then `PDFIUM_LIB_PATH`: a
//!    library file, or a directory containing one
//! 2. the current working directory
//! 3. the directory of the running executable
//! 4. the system library search path

use crate::error::DocPipeError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

static ENGINE: OnceLock<Result<Pdfium, String>> = OnceLock::new();
static LIBRARY_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Prefer `path` (a library file or its directory) over every other
/// location. Only effective before the first bind; returns whether it was
/// accepted.
pub fn set_library_path(path: impl Into<PathBuf>) -> bool {
    ENGINE.get().is_none() && LIBRARY_PATH.set(path.into()).is_ok()
}

/// The shared pdfium instance, binding it on first use.
///
/// A failed bind is remembered; later calls return the same error rather
/// than retrying the dynamic load.
pub fn pdfium() -> Result<&'static Pdfium, DocPipeError> {
    ENGINE
        .get_or_init(|| bind().map(Pdfium::new))
        .as_ref()
        .map_err(|e| DocPipeError::PdfiumBinding(e.clone()))
}

/// Whether a pdfium library can be bound in this process.
pub fn is_available() -> bool {
    pdfium().is_ok()
}

fn bind() -> Result<Box<dyn PdfiumLibraryBindings>, String> {
    let mut tried: Vec<String> = Vec::new();

    for candidate in candidate_paths() {
        match Pdfium::bind_to_library(&candidate) {
            Ok(bindings) => {
                info!("Bound pdfium from {}", candidate.display());
                return Ok(bindings);
            }
            Err(e) => {
                debug!("pdfium not loadable from {}: {}", candidate.display(), e);
                tried.push(format!("{}: {}", candidate.display(), e));
            }
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => {
            info!("Bound system pdfium library");
            Ok(bindings)
        }
        Err(e) => {
            tried.push(format!("system library: {e}"));
            Err(tried.join("; "))
        }
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();

    if let Some(p) = LIBRARY_PATH.get() {
        out.push(library_in(p));
    }
    if let Some(p) = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from) {
        out.push(library_in(&p));
    }
    out.push(Pdfium::pdfium_platform_library_name_at_path("./"));
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        out.push(Pdfium::pdfium_platform_library_name_at_path(&dir));
    }

    out
}

/// Accept either the library file itself or the directory holding it.
fn library_in(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}
