//! Per-identifier reference data and upstream error records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::field::{FieldSlot, FieldValue, FieldValues};

/// Upstream error category used for fields that do not exist.
pub const INVALID_FIELD_CATEGORY: &str = "BAD_FLD";

/// Upstream error category used for entitlement failures.
pub const ENTITLEMENT_CATEGORY: &str = "NOT_AUTHORIZED";

/// An error reported by the upstream provider for one identifier.
///
/// `field` is `None` when the error applies to the identifier as a whole
/// (unknown security, entitlement failure) rather than one field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceDataError {
    pub field: Option<String>,
    pub code: i32,
    pub category: String,
    pub subcategory: Option<String>,
    pub message: String,
}

impl ReferenceDataError {
    /// Create an error attached to a single field.
    pub fn for_field(
        field: impl Into<String>,
        code: i32,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            code,
            category: category.into(),
            subcategory: None,
            message: message.into(),
        }
    }

    /// Create an error attached to the identifier as a whole.
    pub fn for_identifier(code: i32, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: None,
            code,
            category: category.into(),
            subcategory: None,
            message: message.into(),
        }
    }

    /// Set the subcategory.
    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    /// Whether this error is scoped to a field.
    pub fn is_field_error(&self) -> bool {
        self.field.is_some()
    }

    /// Whether the upstream declared the field permanently invalid.
    pub fn is_invalid_field(&self) -> bool {
        self.is_field_error() && self.category == INVALID_FIELD_CATEGORY
    }

    /// Whether this is an entitlement (permission) failure.
    pub fn is_entitlement_error(&self) -> bool {
        self.category == ENTITLEMENT_CATEGORY
    }
}

/// Everything known about one identifier.
///
/// A field is never both resolved and not-available: adding a value clears
/// the not-available mark, and marking a resolved field is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    identifier: String,
    field_values: FieldValues,
    not_available: BTreeSet<String>,
    errors: Vec<ReferenceDataError>,
}

impl ReferenceData {
    /// Create an empty record.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Create a record with the given values.
    pub fn with_values(identifier: impl Into<String>, field_values: FieldValues) -> Self {
        Self {
            identifier: identifier.into(),
            field_values,
            ..Default::default()
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn field_values(&self) -> &FieldValues {
        &self.field_values
    }

    /// Fields known to be permanently unavailable.
    pub fn not_available(&self) -> &BTreeSet<String> {
        &self.not_available
    }

    pub fn errors(&self) -> &[ReferenceDataError] {
        &self.errors
    }

    /// Append a value for `field`, clearing any not-available mark.
    pub fn add_field_value(&mut self, field: impl Into<String>, value: FieldValue) {
        let field = field.into();
        self.not_available.remove(&field);
        self.field_values.add(field, value);
    }

    /// Replace the value map wholesale. Not-available marks for fields now
    /// holding values are cleared.
    pub fn set_field_values(&mut self, field_values: FieldValues) {
        for name in field_values.field_names() {
            self.not_available.remove(&name);
        }
        self.field_values = field_values;
    }

    /// Drop all values for `field`.
    pub fn remove_field(&mut self, field: &str) -> usize {
        self.field_values.remove_field(field)
    }

    /// Record that the upstream has no value for `field`.
    ///
    /// Returns `false` (and changes nothing) if the field already holds a value.
    pub fn mark_not_available(&mut self, field: impl Into<String>) -> bool {
        let field = field.into();
        if self.field_values.contains(&field) {
            return false;
        }
        self.not_available.insert(field)
    }

    /// Append an error unless an identical one is already present.
    pub fn add_error(&mut self, error: ReferenceDataError) -> bool {
        if self.errors.contains(&error) {
            return false;
        }
        self.errors.push(error);
        true
    }

    /// The cache state of `field`.
    pub fn slot(&self, field: &str) -> FieldSlot<'_> {
        let values: Vec<&FieldValue> = self.field_values.get_all(field).collect();
        if !values.is_empty() {
            FieldSlot::Resolved(values)
        } else if self.not_available.contains(field) {
            FieldSlot::KnownUnavailable
        } else {
            FieldSlot::Unknown
        }
    }

    /// Resolved fields plus fields known to be unavailable.
    pub fn known_fields(&self) -> BTreeSet<String> {
        let mut known = self.field_values.field_names();
        known.extend(self.not_available.iter().cloned());
        known
    }

    /// Fields carrying an invalid-field error from the upstream.
    pub fn invalid_fields(&self) -> BTreeSet<String> {
        self.errors
            .iter()
            .filter(|e| e.is_invalid_field())
            .filter_map(|e| e.field.clone())
            .collect()
    }

    /// Whether nothing at all is known for this identifier.
    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty() && self.not_available.is_empty() && self.errors.is_empty()
    }
}
