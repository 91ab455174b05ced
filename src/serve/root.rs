// src/serve/root.rs
// The served directory as a filesystem capability: open, stat and list below a fixed root

use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use super::listing::{DirEntries, LazyEntries, StatEntries};

/// Read-only view of the configured web root. Shared across all requests.
#[derive(Debug)]
pub struct ServeRoot {
    root: PathBuf,
    canonical_root: PathBuf,
}

/// An entry opened below the root, with the metadata taken from its handle.
#[derive(Debug)]
pub struct OpenedEntry {
    pub path: PathBuf,
    pub file: File,
    pub metadata: Metadata,
}

impl ServeRoot {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        let canonical_root = root.canonicalize()?;
        if !canonical_root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self {
            root,
            canonical_root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Open `name`, a cleaned slash-rooted URL path, below the root.
    ///
    /// Unless `follow_symlinks` is set the fully resolved target has to stay
    /// inside the canonical root, otherwise `PermissionDenied` is returned.
    pub fn open(&self, name: &str, follow_symlinks: bool) -> io::Result<OpenedEntry> {
        let path = self.join(name)?;

        if !follow_symlinks {
            let resolved = path.canonicalize()?;
            if !resolved.starts_with(&self.canonical_root) {
                log::warn!("refusing {}: resolves outside the web root", name);
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "path resolves outside the web root",
                ));
            }
        }

        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        Ok(OpenedEntry {
            path,
            file,
            metadata,
        })
    }

    /// List a directory previously returned by [`ServeRoot::open`].
    ///
    /// The full-stat variant is used when symlinks are followed so that a
    /// link to a directory is listed as a directory.
    pub fn read_dir(&self, dir: &Path, follow_symlinks: bool) -> io::Result<Box<dyn DirEntries>> {
        if follow_symlinks {
            Ok(Box::new(StatEntries::read(dir)?))
        } else {
            Ok(Box::new(LazyEntries::read(dir)?))
        }
    }

    fn join(&self, name: &str) -> io::Result<PathBuf> {
        let foreign_separator =
            std::path::MAIN_SEPARATOR != '/' && name.contains(std::path::MAIN_SEPARATOR);
        if name.contains('\0') || foreign_separator {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid character in path",
            ));
        }

        let relative = name.trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path is not clean",
            ));
        }

        if relative.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(relative))
        }
    }
}

/// `fs::metadata` that falls back to the link itself, for dangling symlinks.
pub(crate) fn stat_or_lstat(path: &Path) -> io::Result<Metadata> {
    fs::metadata(path).or_else(|_| fs::symlink_metadata(path))
}
