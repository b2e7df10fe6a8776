//! XDG-compliant path resolution for twenty-q.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::store::durable::DB_FILE;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(tq::paths::no_home),
        help("Set the HOME environment variable or pass --data-dir and --config explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(tq::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global directories for twenty-q.
#[derive(Debug, Clone)]
pub struct TqPaths {
    /// `$XDG_CONFIG_HOME/twenty-q/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/twenty-q/`
    pub data_dir: PathBuf,
}

impl TqPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("twenty-q");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("twenty-q");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Create both directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Where the durable store keeps its database.
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }
}
