//! Field values and the desired/remote state snapshots built from them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{ResourceDescriptor, ResourceKind};

/// Placeholder shown instead of sensitive values.
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive)";

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value.
    Bool(bool),
    /// Free-form or enumerated string.
    String(String),
    /// Unordered set of strings, kept sorted.
    Set(BTreeSet<String>),
}

/// Mapping from field name to value.
pub type FieldMap = BTreeMap<String, FieldValue>;

impl FieldValue {
    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the set value, if this is a set.
    #[must_use]
    pub const fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in validation messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Set(_) => "set of strings",
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Set(items) => {
                let joined = items
                    .iter()
                    .map(|s| format!("{s:?}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{joined}]")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<BTreeSet<String>> for FieldValue {
    fn from(value: BTreeSet<String>) -> Self {
        Self::Set(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::Set(value.into_iter().collect())
    }
}

/// Caller-declared configuration for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredState {
    fields: FieldMap,
}

impl DesiredState {
    /// Creates an empty desired state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Gets a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Gets a string field.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// Gets a boolean field.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    /// Gets a set field.
    #[must_use]
    pub fn get_set(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.get(name).and_then(FieldValue::as_set)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Borrows all fields.
    #[must_use]
    pub const fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Consumes the snapshot, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> FieldMap {
        self.fields
    }
}

impl From<FieldMap> for DesiredState {
    fn from(fields: FieldMap) -> Self {
        Self { fields }
    }
}

/// Authoritative attributes of one object, as last read from the cluster.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteState {
    /// Kind of the object.
    pub kind: ResourceKind,
    /// Identity the object was read under.
    pub identity: String,
    /// All known fields, computed ones included.
    pub fields: FieldMap,
}

impl RemoteState {
    /// Creates a remote state snapshot.
    #[must_use]
    pub fn new(kind: ResourceKind, identity: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            kind,
            identity: identity.into(),
            fields,
        }
    }

    /// Gets a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Gets a string field.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// The descriptor for this object's kind.
    #[must_use]
    pub fn descriptor(&self) -> &'static ResourceDescriptor {
        self.kind.descriptor()
    }

    /// Converts the snapshot into a desired state carrying every field.
    #[must_use]
    pub fn to_desired(&self) -> DesiredState {
        DesiredState::from(self.fields.clone())
    }

    /// Returns the fields with sensitive values replaced by a placeholder.
    #[must_use]
    pub fn masked(&self) -> FieldMap {
        let descriptor = self.descriptor();
        self.fields
            .iter()
            .map(|(name, value)| {
                let shown = if descriptor.is_sensitive(name) {
                    FieldValue::String(SENSITIVE_PLACEHOLDER.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), shown)
            })
            .collect()
    }
}

impl std::fmt::Debug for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteState")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("fields", &self.masked())
            .finish()
    }
}

impl std::fmt::Display for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} '{}':", self.kind, self.identity)?;
        for (name, value) in self.masked() {
            writeln!(f, "  {name} = {value}")?;
        }
        Ok(())
    }
}
