// ABOUTME: Plain key=value artifact files written next to the deployment.
// ABOUTME: An existing file is copied to <name>.backup.<timestamp> before it is replaced.

use chrono::Local;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered key/value lines with optional comment headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Comment(String),
    Entry(String, String),
    Blank,
}

impl Artifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(Line::Comment(text.into()));
        self
    }

    pub fn entry(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.lines.push(Line::Entry(key.into(), value.to_string()));
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.lines.push(Line::Blank);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            // Writing to a String cannot fail.
            let _ = match line {
                Line::Comment(text) => writeln!(out, "# {}", text),
                Line::Entry(key, value) => writeln!(out, "{}={}", key, value),
                Line::Blank => writeln!(out),
            };
        }
        out
    }

    /// Write to `path`, backing up whatever was there. Returns the backup path
    /// when one was made.
    pub fn write(&self, path: &Path, private: bool) -> Result<Option<PathBuf>, ArtifactError> {
        let backup = backup_existing(path)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let io_error = |source: std::io::Error| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = open_for_write(path, private).map_err(io_error)?;
        file.write_all(self.render().as_bytes()).map_err(io_error)?;
        Ok(backup)
    }
}

/// Copy an existing file aside. The original is never deleted here; the
/// following write replaces it.
pub fn backup_existing(path: &Path) -> Result<Option<PathBuf>, ArtifactError> {
    if !path.exists() {
        return Ok(None);
    }
    let target = backup_path(path);
    std::fs::copy(path, &target).map_err(|source| ArtifactError::Backup {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(from = %path.display(), to = %target.display(), "backed up artifact");
    Ok(Some(target))
}

/// `<name>.backup.<timestamp>`, with a counter when two backups land in the
/// same second.
fn backup_path(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    let base = format!("{}.backup.{}", path.display(), stamp);
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    candidate
}

/// Private files are owner-only from the moment they exist. A file that was
/// already there is narrowed before anything is written into it.
#[cfg(unix)]
fn open_for_write(path: &Path, private: bool) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        options.mode(0o600);
    }
    let file = options.open(path)?;
    if private {
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path, _private: bool) -> std::io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}
