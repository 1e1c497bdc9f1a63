use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors reported by a [`GeometryProcessor`](super::GeometryProcessor).
///
/// These are the processor's "false" results: the task worker logs the message and
/// finishes the task, nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("point cloud is empty")]
    EmptyPointCloud,

    #[error("mesh is empty")]
    EmptyMesh,

    #[error("point cloud has no normals")]
    MissingNormals,

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0} is not supported by this processor")]
    Unsupported(String),

    #[error("reconstruction grid is empty")]
    EmptyGrid,

    #[error("reconstruction grid {0:?} exceeds {1} cells per axis")]
    GridTooLarge([u32; 3], u32),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(Utf8PathBuf),

    #[error("failed to parse {path} at line {line}: {message}")]
    Parse {
        path: Utf8PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type GeometryResult<T> = Result<T, GeometryError>;

impl GeometryError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        GeometryError::Io {
            path: path.into(),
            source,
        }
    }

    /// Precondition failures, as opposed to IO or unsupported features.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            GeometryError::EmptyPointCloud
                | GeometryError::EmptyMesh
                | GeometryError::MissingNormals
                | GeometryError::InvalidParameters(_)
                | GeometryError::EmptyGrid
                | GeometryError::GridTooLarge(..)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(GeometryError::EmptyPointCloud.to_string(), "point cloud is empty");
        assert_eq!(
            GeometryError::Unsupported("poisson reconstruction".to_string()).to_string(),
            "poisson reconstruction is not supported by this processor"
        );
        let err = GeometryError::Parse {
            path: Utf8PathBuf::from("scan.xyz"),
            line: 4,
            message: "expected 3 or 6 values".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse scan.xyz at line 4: expected 3 or 6 values"
        );
    }

    #[test]
    fn test_precondition_classification() {
        assert!(GeometryError::MissingNormals.is_precondition());
        assert!(GeometryError::GridTooLarge([1, 2, 3], 2).is_precondition());
        assert!(!GeometryError::Unsupported("x".into()).is_precondition());
        let io = GeometryError::io(
            "missing.xyz",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(!io.is_precondition());
    }
}
