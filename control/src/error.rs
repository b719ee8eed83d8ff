use thiserror::Error;

/// Errors reported by an [`IngressStore`](crate::apis::ingress::store::IngressStore)
/// implementation.
///
/// Only "not found" and "conflict" are distinguished; every other failure is
/// carried opaquely.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    #[error("resource version conflict")]
    Conflict,

    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    #[error("malformed Ingress payload: {0}")]
    Malformed(String),

    #[error("failed to encode Ingress payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the Ingress status reconciler
#[derive(Error, Debug)]
pub enum IngressError {
    #[error("Ingress {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("Ingress {namespace}/{name} was modified concurrently")]
    Conflict { namespace: String, name: String },

    #[error("Ingress {namespace}/{name} is not owned by this controller")]
    NotOwned { namespace: String, name: String },

    #[error("unexpected error updating Ingress {namespace}/{name}: {source}")]
    Store {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },
}

impl IngressError {
    /// Attach the Ingress identity to a store error
    pub fn from_store(namespace: &str, name: &str, err: StoreError) -> Self {
        let (namespace, name) = (namespace.to_string(), name.to_string());
        match err {
            StoreError::NotFound => IngressError::NotFound { namespace, name },
            StoreError::Conflict => IngressError::Conflict { namespace, name },
            source => IngressError::Store {
                namespace,
                name,
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IngressError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, IngressError::Conflict { .. })
    }

    pub fn is_not_owned(&self) -> bool {
        matches!(self, IngressError::NotOwned { .. })
    }

    /// Whether a fresh attempt could succeed
    ///
    /// Payloads that do not decode or encode stay broken until someone edits
    /// the Ingress, which arrives as a new event anyway.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngressError::Conflict { .. } => true,
            IngressError::NotFound { .. } | IngressError::NotOwned { .. } => false,
            IngressError::Store { source, .. } => !matches!(
                source,
                StoreError::Malformed(_) | StoreError::Encode(_)
            ),
        }
    }

    /// Short label used for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            IngressError::NotFound { .. } => "not_found",
            IngressError::Conflict { .. } => "conflict",
            IngressError::NotOwned { .. } => "not_owned",
            IngressError::Store { .. } => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err = IngressError::from_store("default", "web", StoreError::NotFound);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Ingress default/web not found");
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err = IngressError::from_store("default", "web", StoreError::Conflict);
        assert!(err.is_conflict());
        assert_eq!(err.reason(), "conflict");
    }

    #[test]
    fn test_other_store_errors_keep_context() {
        let err = IngressError::from_store(
            "prod",
            "api",
            StoreError::Unavailable("connection refused".to_string()),
        );

        assert!(!err.is_not_found());
        assert!(!err.is_conflict());
        let message = err.to_string();
        assert!(message.contains("prod/api"), "got: {}", message);
        assert!(message.contains("connection refused"), "got: {}", message);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        let malformed = IngressError::from_store(
            "default",
            "web",
            StoreError::Malformed("default/web is not an Ingress".to_string()),
        );
        assert!(!malformed.is_retryable());
        assert_eq!(malformed.reason(), "store_error");

        let not_found = IngressError::from_store("default", "web", StoreError::NotFound);
        assert!(!not_found.is_retryable());

        let conflict = IngressError::from_store("default", "web", StoreError::Conflict);
        assert!(conflict.is_retryable());
    }

    #[test]
    fn test_not_owned_error() {
        let err = IngressError::NotOwned {
            namespace: "default".to_string(),
            name: "web".to_string(),
        };
        assert!(err.is_not_owned());
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), "not_owned");
        assert_eq!(
            err.to_string(),
            "Ingress default/web is not owned by this controller"
        );
    }
}
