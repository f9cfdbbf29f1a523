use super::errors::{KeySetError, LimitKind, MetricsErrorKind};

/// Resource limits applied to fetched key set documents.
///
/// Limits are enforced before a fetched key set is published to the cache, so an oversized
/// document never replaces the last-known-good keys.
///
/// Use `None` for unlimited (no limit enforced), or `Some(usize)` for a specific limit.
///
/// # Examples
///
/// ```rust
/// use bearer_auth::key::KeySetLimits;
///
/// let limits = KeySetLimits {
///     max_keys: Some(16),
///     max_document_bytes: Some(64 * 1024),
/// };
///
/// let unlimited = KeySetLimits::unlimited();
/// assert_eq!(unlimited.max_keys, None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySetLimits {
    /// Maximum number of entries in the document's `keys` array.
    pub max_keys: Option<usize>,
    /// Maximum size of the document in bytes.
    pub max_document_bytes: Option<usize>,
}

impl Default for KeySetLimits {
    fn default() -> Self {
        Self {
            // Conservative defaults; published key sets rarely hold more than a handful.
            max_keys: Some(256),
            max_document_bytes: Some(1024 * 1024), // 1MB
        }
    }
}

impl KeySetLimits {
    /// Creates a `KeySetLimits` with all limits disabled.
    pub const fn unlimited() -> Self {
        Self {
            max_keys: None,
            max_document_bytes: None,
        }
    }
}

pub(super) fn check_document_size(actual: usize, limits: KeySetLimits) -> Result<(), KeySetError> {
    check(LimitKind::MaxDocumentBytes, limits.max_document_bytes, actual)
}

pub(super) fn check_key_count(actual: usize, limits: KeySetLimits) -> Result<(), KeySetError> {
    check(LimitKind::MaxKeys, limits.max_keys, actual)
}

fn check(kind: LimitKind, limit: Option<usize>, actual: usize) -> Result<(), KeySetError> {
    match limit {
        Some(limit) if actual > limit => Err(KeySetError::LimitExceeded {
            kind,
            limit,
            actual,
        }),
        _ => Ok(()),
    }
}

/// Maps a `LimitKind` to the corresponding `MetricsErrorKind`.
pub(super) const fn metric_kind_for_limit(kind: LimitKind) -> MetricsErrorKind {
    match kind {
        LimitKind::MaxKeys => MetricsErrorKind::LimitMaxKeys,
        LimitKind::MaxDocumentBytes => MetricsErrorKind::LimitMaxDocumentBytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_equal_to_actual_passes() {
        let limits = KeySetLimits {
            max_keys: Some(3),
            max_document_bytes: Some(10),
        };
        assert!(check_key_count(3, limits).is_ok());
        assert!(check_document_size(10, limits).is_ok());
        assert!(check_document_size(11, limits).is_err());
    }

    #[test]
    fn test_unlimited_never_fails() {
        let limits = KeySetLimits::unlimited();
        assert!(check_key_count(usize::MAX, limits).is_ok());
        assert!(check_document_size(usize::MAX, limits).is_ok());
    }

    #[test]
    fn test_metric_kind_mapping() {
        assert_eq!(
            metric_kind_for_limit(LimitKind::MaxKeys),
            MetricsErrorKind::LimitMaxKeys
        );
        assert_eq!(
            metric_kind_for_limit(LimitKind::MaxDocumentBytes),
            MetricsErrorKind::LimitMaxDocumentBytes
        );
    }
}
