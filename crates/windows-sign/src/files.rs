//! Discovery of files to sign.
//!
//! In directory mode the app directory is walked recursively and every file
//! whose extension (case-insensitive) belongs to a [`FileKind`] is collected:
//!
//! - Portable executables (`.exe`, `.dll`, `.sys`, `.efi`, `.scr`, `.node`)
//! - Windows Installer packages (`.msi`)
//! - APPX/MSIX packages (`.appx`, `.appxbundle`, `.msix`, `.msixbundle`)
//! - Catalog and cabinet files (`.cat`, `.cab`)
//! - Silverlight applications (`.xap`)
//! - Scripts (`.vbs`, `.wsf`, `.ps1`)
//! - JavaScript (`.js`), only when JavaScript signing is enabled
//!
//! In files mode the caller's list is returned untouched.

use crate::config::{ResolvedConfig, SignTarget};
use crate::{Error, Result};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Signable file categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    PortableExecutable,
    Installer,
    AppPackage,
    CatalogOrCabinet,
    Silverlight,
    Script,
    JavaScript,
}

impl FileKind {
    /// Kinds that are always signed.
    pub const DEFAULT: [FileKind; 6] = [
        FileKind::PortableExecutable,
        FileKind::Installer,
        FileKind::AppPackage,
        FileKind::CatalogOrCabinet,
        FileKind::Silverlight,
        FileKind::Script,
    ];

    /// Lowercase extensions belonging to this kind, without the dot.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::PortableExecutable => &["exe", "dll", "sys", "efi", "scr", "node"],
            FileKind::Installer => &["msi"],
            FileKind::AppPackage => &["appx", "appxbundle", "msix", "msixbundle"],
            FileKind::CatalogOrCabinet => &["cat", "cab"],
            FileKind::Silverlight => &["xap"],
            FileKind::Script => &["vbs", "wsf", "ps1"],
            FileKind::JavaScript => &["js"],
        }
    }

    /// Classify a file name by its extension.
    ///
    /// A bare `.exe` counts as having the `exe` extension.
    pub fn from_file_name(name: &OsStr) -> Option<FileKind> {
        let name = name.to_string_lossy();
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();

        Self::DEFAULT
            .iter()
            .chain(std::iter::once(&FileKind::JavaScript))
            .copied()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }
}

/// Whether a file with this name should be signed.
pub fn should_sign(name: &OsStr, sign_javascript: bool) -> bool {
    match FileKind::from_file_name(name) {
        Some(FileKind::JavaScript) => sign_javascript,
        Some(_) => true,
        None => false,
    }
}

/// The files a resolved configuration will sign.
///
/// Explicit file lists are returned verbatim without touching the filesystem.
/// Directories are walked in native listing order, following symbolic links.
///
/// # Errors
///
/// Returns [`Error::Discovery`] if the directory does not exist, is not a
/// directory, or any entry below it cannot be read.
pub fn files_to_sign(config: &ResolvedConfig) -> Result<Vec<PathBuf>> {
    match &config.target {
        SignTarget::Files(files) => Ok(files.clone()),
        SignTarget::Directory(dir) => scan_directory(dir, config.sign_javascript),
    }
}

/// Recursively collect signable files below `dir` as absolute paths.
pub fn scan_directory(dir: &Path, sign_javascript: bool) -> Result<Vec<PathBuf>> {
    let root = std::path::absolute(dir).map_err(Error::Discovery)?;

    let metadata = fs::metadata(&root).map_err(|e| {
        Error::Discovery(std::io::Error::new(
            e.kind(),
            format!("{}: {}", root.display(), e),
        ))
    })?;
    if !metadata.is_dir() {
        return Err(Error::Discovery(std::io::Error::other(format!(
            "{} is not a directory",
            root.display()
        ))));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(&root).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| Error::Discovery(e.into()))?;

        if entry.file_type().is_dir() {
            continue;
        }

        if should_sign(entry.file_name(), sign_javascript) {
            files.push(entry.into_path());
        }
    }

    debug!(dir = %root.display(), count = files.len(), "Found files to sign");

    Ok(files)
}
