//! Error taxonomy for cell generation and sweep expansion

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PdkError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PdkError {
    /// Invalid sweep or simulation configuration. Raised before any artifact is written.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cell `{cell}` has no parameter named `{name}`")]
    UnknownParameter { cell: String, name: String },

    #[error("parameter `{name}` expects {expected}, got `{got}`")]
    ParameterType {
        name: String,
        expected: &'static str,
        got: String,
    },

    #[error("parameter `{name}` = {value} is below the minimum {min}")]
    ParameterRange { name: String, value: f64, min: f64 },

    /// The cell could not be built for the given parameters.
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("effective-index table: {0}")]
    Table(String),

    #[error("width {width} um is outside the fitted range [{min}, {max}] um")]
    OutOfDomain { width: f64, min: f64, max: f64 },

    #[error("gds: {0}")]
    Gds(String),

    #[error("template rendering failed: {0}")]
    Template(#[from] minijinja::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PdkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
