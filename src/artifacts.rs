//! Run-directory inventory: lists a simulation output directory and tags
//! each file with the role it plays in reconciliation.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::ReconcileError;

/// Role of a file in a run directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ErrorLog,
    Meter,
    TabularCsv,
    ReportMarkup,
    EmbeddedDb,
    Other,
}

impl ArtifactKind {
    /// Classifies a file by its suffix (case-insensitive).
    ///
    /// Besides `.sql`, some tools write the embedded database as `.sqlite`
    /// or `.db`; all three classify as [`ArtifactKind::EmbeddedDb`].
    pub fn classify(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "err" => Self::ErrorLog,
            "mtr" => Self::Meter,
            "csv" => Self::TabularCsv,
            "htm" | "html" => Self::ReportMarkup,
            "sql" | "sqlite" | "db" => Self::EmbeddedDb,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ErrorLog => "error_log",
            Self::Meter => "meter",
            Self::TabularCsv => "tabular_csv",
            Self::ReportMarkup => "report_markup",
            Self::EmbeddedDb => "embedded_db",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// One classified file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub size_bytes: u64,
}

impl Artifact {
    /// File name as a lossy string, for diagnostics.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// All files of one run directory, sorted by file name.
///
/// Built once per run and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    dir: PathBuf,
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    /// Lists `dir` (non-recursively) and classifies every regular file.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotFound`] if the directory is missing or
    /// unreadable, and [`ReconcileError::NotADirectory`] if it is a file.
    /// An empty directory is a valid, empty inventory.
    pub fn scan(dir: &Path) -> Result<Self, ReconcileError> {
        let not_found = |source| ReconcileError::NotFound {
            path: dir.to_path_buf(),
            source,
        };

        let meta = fs::metadata(dir).map_err(not_found)?;
        if !meta.is_dir() {
            return Err(ReconcileError::NotADirectory(dir.to_path_buf()));
        }

        let mut artifacts = Vec::new();
        for entry in fs::read_dir(dir).map_err(not_found)? {
            let Ok(entry) = entry else { continue };
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let path = entry.path();
            artifacts.push(Artifact {
                kind: ArtifactKind::classify(&path),
                size_bytes: meta.len(),
                path,
            });
        }
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(dir = %dir.display(), files = artifacts.len(), "scanned run directory");
        Ok(Self {
            dir: dir.to_path_buf(),
            artifacts,
        })
    }

    /// Builds a set from already-classified artifacts.
    pub fn from_artifacts(dir: impl Into<PathBuf>, mut artifacts: Vec<Artifact>) -> Self {
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            dir: dir.into(),
            artifacts,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    /// All artifacts of `kind`, in file-name order.
    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    pub fn first_of_kind(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.of_kind(kind).next()
    }

    /// The simulator input model (`.idf`) left in the run directory, if any.
    pub fn find_input_model(&self) -> Option<&Artifact> {
        self.of_kind(ArtifactKind::Other).find(|a| {
            a.path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("idf"))
        })
    }

    /// `(file name, size)` pairs for the diagnostics bundle.
    pub fn file_sizes(&self) -> Vec<(String, u64)> {
        self.artifacts
            .iter()
            .map(|a| (a.file_name(), a.size_bytes))
            .collect()
    }
}
