//! Combining cached and fresh records, and trimming records to a request.

use refdata_core::ReferenceData;
use std::collections::BTreeSet;

/// Merge a fresh upstream record into what was cached for the same
/// identifier.
///
/// Values returned for a field replace any cached values under that name.
/// Requested fields the upstream did not return are marked not-available.
/// Errors from both sides are kept, without duplicates.
pub fn combine(
    requested: &BTreeSet<String>,
    cached: Option<&ReferenceData>,
    fresh: &ReferenceData,
) -> ReferenceData {
    let mut combined = cached
        .cloned()
        .unwrap_or_else(|| ReferenceData::new(fresh.identifier()));

    let returned = fresh.field_values().field_names();
    for field in &returned {
        combined.remove_field(field);
    }
    for (field, value) in fresh.field_values() {
        combined.add_field_value(field, value.clone());
    }

    for field in requested.difference(&returned) {
        combined.mark_not_available(field.clone());
    }
    for field in fresh.not_available() {
        combined.mark_not_available(field.clone());
    }

    for error in fresh.errors() {
        combined.add_error(error.clone());
    }

    combined
}

/// Copy of `record` holding only the requested fields.
///
/// Identifier-level errors and errors for requested fields survive.
/// Not-available marks are internal to the cache and never returned.
pub fn strip(record: &ReferenceData, requested: &BTreeSet<String>) -> ReferenceData {
    let mut stripped =
        ReferenceData::with_values(record.identifier(), record.field_values().retain_fields(requested));
    for error in record.errors() {
        let wanted = match &error.field {
            None => true,
            Some(field) => requested.contains(field),
        };
        if wanted {
            stripped.add_error(error.clone());
        }
    }
    stripped
}

/// Whether a refreshed record carries anything the stored one does not.
///
/// Field values compare without regard to the order of distinct names.
/// Errors compare as sets.
///
/// # Panics
///
/// Panics if the two records belong to different identifiers. That can only
/// happen when a store returns a record under the wrong key.
pub fn differs(previous: &ReferenceData, refreshed: &ReferenceData) -> bool {
    assert_eq!(
        previous.identifier(),
        refreshed.identifier(),
        "refresh compared records for different identifiers"
    );

    if !previous.field_values().equivalent(refreshed.field_values()) {
        return true;
    }
    if previous.not_available() != refreshed.not_available() {
        return true;
    }

    let before: BTreeSet<_> = previous.errors().iter().collect();
    let after: BTreeSet<_> = refreshed.errors().iter().collect();
    before != after
}
