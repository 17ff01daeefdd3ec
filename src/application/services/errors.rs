//! Adventure errors - the failure taxonomy of export and import
//!
//! Only [`AdventureError::SystemMismatch`] stops an import outright. The other
//! variants are raised and logged at the narrowest scope (one asset, one
//! document, one revisit item) and the operation carries on.

use std::time::Duration;

use crate::domain::value_objects::DocumentKind;

#[derive(Debug, thiserror::Error)]
pub enum AdventureError {
    /// The bundle was exported for a different game system
    #[error("Invalid system for adventure {adventure}: expects {expected}, destination runs {actual}")]
    SystemMismatch {
        adventure: String,
        expected: String,
        actual: String,
    },

    /// An asset could not be read on export or is missing from the bundle on import
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    /// A reference token's target is not known to the destination
    #[error("Unresolved reference: {0}")]
    ReferenceUnresolved(String),

    /// The store rejected one document
    #[error("Failed to create {kind} '{name}': {reason}")]
    DocumentCreate {
        kind: DocumentKind,
        name: String,
        reason: String,
    },

    /// The reference-resolution pass ran out of time
    #[error("Reference resolution timed out after {0:?}")]
    RevisitTimeout(Duration),

    /// The bundle is missing its manifest or holds invalid JSON
    #[error("Malformed bundle: {0}")]
    MalformedBundle(String),

    /// The archive container could not be read or written
    #[error("Archive error: {0}")]
    Archive(String),

    /// A store call failed outside any per-item scope
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl AdventureError {
    /// Whether this error aborts the whole operation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SystemMismatch { .. } | Self::MalformedBundle(_) | Self::Archive(_) | Self::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pipeline_errors_are_fatal() {
        let mismatch = AdventureError::SystemMismatch {
            adventure: "Lost Mine".to_string(),
            expected: "dnd5e".to_string(),
            actual: "pf2e".to_string(),
        };
        assert!(mismatch.is_fatal());
        assert!(mismatch.to_string().contains("expects dnd5e"));
        assert!(!AdventureError::AssetUnavailable("a.png".to_string()).is_fatal());
        assert!(!AdventureError::ReferenceUnresolved("@Actor[x]".to_string()).is_fatal());
        assert!(!AdventureError::RevisitTimeout(Duration::from_secs(1)).is_fatal());
    }
}
