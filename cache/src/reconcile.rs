//! Choosing between the structured store and the fallback blob.
//!
//! When both hold a generation, the newer one is canonical and the other is
//! discarded, never merged. Ties go to the structured store.

use catalog_cache_core::StoreKind;

/// Returns which store holds the canonical generation, or `None` when
/// neither holds one.
///
/// # Examples
///
/// ```
/// use catalog_cache::reconcile;
/// use catalog_cache_core::StoreKind;
///
/// assert_eq!(reconcile(Some(10), Some(20)), Some(StoreKind::Blob));
/// assert_eq!(reconcile(Some(20), Some(20)), Some(StoreKind::Structured));
/// assert_eq!(reconcile(None, None), None);
/// ```
pub fn reconcile(structured_ms: Option<i64>, fallback_ms: Option<i64>) -> Option<StoreKind> {
    match (structured_ms, fallback_ms) {
        (None, None) => None,
        (Some(_), None) => Some(StoreKind::Structured),
        (None, Some(_)) => Some(StoreKind::Blob),
        (Some(s), Some(f)) if f > s => Some(StoreKind::Blob),
        (Some(_), Some(_)) => Some(StoreKind::Structured),
    }
}
