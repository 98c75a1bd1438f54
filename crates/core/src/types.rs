//! Core types for recipe numbering
//!
//! This module defines the foundational types:
//! - RecordId: Durable, store-assigned identifier for a recipe record
//! - RecipeNumber: The small positive integer users see
//! - RecipeRecord: The persisted entity that owns a number
//! - PayloadPatch: A partial update to the opaque payload
//! - Versioned: A record paired with the commit version that wrote it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::{NumberingError, Result};
use crate::limits::{FIRST_ALLOCATABLE, RECORD_FIELDS, RESERVED_MAX};

/// Opaque recipe content (title, ingredients, steps, ...)
///
/// Never inspected by the allocator or compactor.
pub type Payload = Value;

/// Unique identifier for a recipe record
///
/// A RecordId wraps a UUID v4. It is assigned when the record is first
/// written, is immutable, and is never reused, even after the record is
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new random RecordId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a RecordId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a RecordId from its string form
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this RecordId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user-facing recipe number
///
/// Numbers `1..=RESERVED_MAX` belong to the static featured list and never
/// exist in the store. Everything the engine allocates is at least
/// `FIRST_ALLOCATABLE`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecipeNumber(u64);

impl RecipeNumber {
    /// The first number the allocator may hand out
    pub const FIRST: RecipeNumber = RecipeNumber(FIRST_ALLOCATABLE);

    /// The highest reserved number; the allocation floor
    pub const RESERVED_FLOOR: RecipeNumber = RecipeNumber(RESERVED_MAX);

    /// Wrap a raw number
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The raw integer
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this number lies in the reserved featured range
    pub const fn is_reserved(self) -> bool {
        self.0 <= RESERVED_MAX
    }

    /// The number immediately above this one
    ///
    /// Saturates at `u64::MAX`; use `checked_next` where the top matters.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The number immediately above this one, or `None` at `u64::MAX`
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }

    /// The number immediately below this one
    ///
    /// Saturates at zero.
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for RecipeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RecipeNumber {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

/// A persisted recipe record
///
/// `recipe_number` is assigned by the allocator at creation and only ever
/// changes through compaction. `payload` is opaque to this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeRecord {
    /// Store-assigned identifier
    pub id: RecordId,
    /// Position in the dense numbering
    pub recipe_number: RecipeNumber,
    /// Verified author, supplied by the authentication layer
    pub author_id: String,
    /// Opaque recipe content
    pub payload: Payload,
    /// Creation time; informational only, never an ordering key
    pub created_at: DateTime<Utc>,
}

impl RecipeRecord {
    /// Build a fresh record with a new id
    pub fn new(recipe_number: RecipeNumber, author_id: String, payload: Payload) -> Self {
        Self {
            id: RecordId::new(),
            recipe_number,
            author_id,
            payload,
            created_at: Utc::now(),
        }
    }

    /// Copy of this record moved to a different number
    pub fn renumbered(&self, recipe_number: RecipeNumber) -> Self {
        Self {
            recipe_number,
            ..self.clone()
        }
    }
}

/// A record together with the commit version that last wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The value
    pub value: T,
    /// Commit version (store-wide, monotonically increasing)
    pub version: u64,
}

impl<T> Versioned<T> {
    /// Pair a value with its version
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }

    /// Drop the version
    pub fn into_value(self) -> T {
        self.value
    }
}

/// A versioned recipe record as returned by storage reads
pub type VersionedRecord = Versioned<RecipeRecord>;

/// A partial update to a record's payload
///
/// Top-level keys are shallow-merged into the payload object; a `null`
/// value removes the key. Record-level fields (`recipeNumber`, `id`,
/// `authorId`, `createdAt`) cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadPatch(Map<String, Value>);

impl PayloadPatch {
    /// Empty patch
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a patch from a JSON value
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(NumberingError::validation(format!(
                "patch must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Add one field to the patch
    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject patches that touch record-level fields
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for field in RECORD_FIELDS {
            if self.0.contains_key(*field) {
                return Err(NumberingError::validation(format!(
                    "field '{}' cannot be changed through an update",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Merge this patch into a payload object
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the stored payload is not an object.
    pub fn apply_to(&self, payload: &mut Payload) -> Result<()> {
        let target = payload.as_object_mut().ok_or_else(|| {
            NumberingError::validation("stored payload is not a JSON object".to_string())
        })?;
        for (key, value) in &self.0 {
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_record_id_string_roundtrip() {
        let id = RecordId::new();
        assert_eq!(RecordId::from_string(&id.to_string()), Some(id));
        assert_eq!(RecordId::from_string("not-a-uuid"), None);
    }

    #[test]
    fn test_reserved_range() {
        for n in 0..=5 {
            assert!(RecipeNumber::new(n).is_reserved());
        }
        assert!(!RecipeNumber::new(6).is_reserved());
        assert_eq!(RecipeNumber::FIRST, RecipeNumber::new(6));
        assert_eq!(RecipeNumber::RESERVED_FLOOR.next(), RecipeNumber::FIRST);
        let top = RecipeNumber::new(u64::MAX);
        assert_eq!(top.next(), top);
        assert_eq!(top.checked_next(), None);
        assert_eq!(RecipeNumber::new(6).checked_next(), Some(RecipeNumber::new(7)));
    }

    #[test]
    fn test_prev_saturates() {
        assert_eq!(RecipeNumber::new(0).prev(), RecipeNumber::new(0));
        assert_eq!(RecipeNumber::new(9).prev(), RecipeNumber::new(8));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = RecipeRecord::new(RecipeNumber::new(7), "alice".into(), json!({"title": "Soup"}));
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["recipeNumber"], json!(7));
        assert_eq!(v["authorId"], json!("alice"));
        assert!(v.get("createdAt").is_some());
    }

    #[test]
    fn test_renumbered_keeps_identity() {
        let record = RecipeRecord::new(RecipeNumber::new(9), "bob".into(), json!({}));
        let moved = record.renumbered(RecipeNumber::new(8));
        assert_eq!(moved.id, record.id);
        assert_eq!(moved.created_at, record.created_at);
        assert_eq!(moved.recipe_number, RecipeNumber::new(8));
    }

    #[test]
    fn test_patch_rejects_record_fields() {
        for field in ["recipeNumber", "id", "authorId", "createdAt"] {
            let patch = PayloadPatch::new().set(field, json!(1));
            assert!(matches!(patch.validate(), Err(NumberingError::Validation { .. })));
        }
        assert!(PayloadPatch::new().set("title", json!("x")).validate().is_ok());
    }

    #[test]
    fn test_patch_merge_and_remove() {
        let mut payload = json!({"title": "Soup", "steps": ["boil"]});
        PayloadPatch::new()
            .set("title", json!("Stew"))
            .set("steps", Value::Null)
            .set("servings", json!(4))
            .apply_to(&mut payload)
            .unwrap();
        assert_eq!(payload, json!({"title": "Stew", "servings": 4}));
    }

    #[test]
    fn test_patch_from_non_object() {
        assert!(PayloadPatch::from_value(json!([1, 2])).is_err());
        assert!(PayloadPatch::from_value(json!({"a": 1})).is_ok());
    }
}
