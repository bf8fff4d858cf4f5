//! Typed errors for the partitioning core.
//!
//! Everything in here is fatal for a run. Records that a rule simply does not
//! apply to are reported as [`crate::rule::Evaluation::Skip`], never as an
//! error.

use thiserror::Error;

/// Errors that abort a partitioning run.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// A rule part references a filter without the `!` marker.
    #[error("filter reference '{0}' in rule '{1}' must be prefixed with '!'")]
    MissingFilterMarker(String, String),

    /// A rule part names a filter that was never registered.
    #[error("rule '{rule}' references unknown filter '{filter}'")]
    UnknownFilter { rule: String, filter: String },

    /// A filter mapping points at a plugin reference the registry does not know.
    #[error("filter '{name}' maps to unregistered plugin '{reference}'")]
    UnknownPlugin { name: String, reference: String },

    /// A rule part resolved to null, an array or an object.
    #[error("rule '{rule}' part '{field}' yielded a non-scalar value ({kind}) that can't be used in a filename")]
    NonScalarValue {
        rule: String,
        field: String,
        kind: &'static str,
    },

    /// A rule part resolved to a value with characters unsafe for filenames.
    #[error("rule '{rule}' part '{field}' yielded a value that can't be used in a filename: [{value}]")]
    UnsafeValue {
        rule: String,
        field: String,
        value: String,
    },

    /// The cache was asked to register a name it already holds.
    #[error("a resource with name [{0}] is already cached")]
    DuplicateResource(String),

    /// Disposal finished with entries still registered.
    #[error("not all resources were cleaned up: {0} remaining")]
    ResourcesLeaked(usize),

    /// A cache capacity of zero can never hold a resource.
    #[error("resource cache capacity must be at least 1")]
    ZeroCapacity,

    /// Another holder of the shared cache panicked mid-operation.
    #[error("resource cache lock was poisoned")]
    CachePoisoned,

    /// Directory creation, open, write or close failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PartitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_rule_and_field() {
        let err = PartitionError::UnsafeValue {
            rule: "by_region".to_string(),
            field: "region".to_string(),
            value: "us/east".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("by_region"));
        assert!(msg.contains("region"));
        assert!(msg.contains("us/east"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PartitionError = io.into();
        assert!(matches!(err, PartitionError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
