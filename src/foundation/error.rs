use std::path::PathBuf;

/// Run-level result alias.
pub type MapResult<T> = Result<T, MapError>;

/// Result alias for a single render call against the rendering primitive.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while rendering one figure.
///
/// These never escape a per-feature or aggregate render; they are folded into an outcome.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("unsupported geometry type '{0}'")]
    UnsupportedGeometry(String),

    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("geometry is empty")]
    EmptyGeometry,

    #[error("nothing to draw ({0} geometries skipped)")]
    NothingToDraw(usize),

    #[error("degenerate extent: {0}")]
    DegenerateExtent(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("png encode error: {0}")]
    Encode(String),

    #[error("write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedGeometry(msg.into())
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that end (or, for the manifest, conclude) a whole run.
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    #[error("source error: {0}")]
    Source(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("create output dir '{}': {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write manifest '{}': {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MapError {
    pub fn source_failure(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error stops a run before any image is written.
    pub fn is_fatal_before_render(&self) -> bool {
        matches!(
            self,
            Self::Source(_) | Self::Validation(_) | Self::OutputDir { .. }
        )
    }
}
