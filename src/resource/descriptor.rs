//! Static per-kind field declarations and the local validation built on them.
//!
//! A descriptor is data, not behaviour: the reconciler reads it to decide
//! which fields to validate, transmit, and expect back.

use std::collections::BTreeSet;

use crate::error::ReconcileError;

use super::state::{DesiredState, FieldMap, FieldValue};
use super::ResourceKind;

/// Where a kind's identity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// The caller supplies it (a name).
    CallerSupplied,
    /// The server generates it on create.
    ServerGenerated,
}

/// How a field participates in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// The addressing field.
    Identity,
    /// Set once; a change forces replacement.
    Immutable,
    /// Changeable through update.
    Mutable,
    /// Only ever populated from remote responses.
    Computed,
}

/// Value constraint of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Free-form string.
    String,
    /// String restricted to a fixed set.
    Enum(&'static [&'static str]),
    /// Boolean.
    Bool,
    /// Set of strings.
    StringSet,
}

/// How updates are transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every identity, immutable and mutable field is re-sent.
    FullUpsert,
    /// Only identity and mutable fields are sent.
    PartialPatch,
}

/// Declaration of one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name.
    pub name: &'static str,
    /// Lifecycle role.
    pub role: FieldRole,
    /// Value constraint.
    pub ty: FieldType,
    /// Whether the caller must supply it.
    pub required: bool,
    /// Whether the value must never be logged or echoed.
    pub sensitive: bool,
    /// Human description.
    pub description: &'static str,
}

/// An instance the server refuses to delete; deleting resets it instead.
#[derive(Debug, Clone, Copy)]
pub struct ProtectedInstance {
    /// Identity of the protected instance.
    pub identity: &'static str,
    /// Baseline values; unlisted mutable fields reset to their type default.
    pub baseline: &'static [(&'static str, &'static str)],
}

/// Static declaration of a resource kind.
#[derive(Debug)]
pub struct ResourceDescriptor {
    /// Kind being described.
    pub kind: ResourceKind,
    /// Name of the identity field.
    pub identity_field: &'static str,
    /// Where the identity comes from.
    pub identity_source: IdentitySource,
    /// How updates are transmitted.
    pub write_mode: WriteMode,
    /// All declared fields.
    pub fields: &'static [FieldSpec],
    /// Instance that is reset instead of deleted, if any.
    pub protected: Option<ProtectedInstance>,
}

impl FieldType {
    /// Default value for an optional field of this type.
    #[must_use]
    pub fn default_value(self) -> FieldValue {
        match self {
            Self::String | Self::Enum(_) => FieldValue::String(String::new()),
            Self::Bool => FieldValue::Bool(false),
            Self::StringSet => FieldValue::Set(BTreeSet::new()),
        }
    }

    const fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::String | Self::Enum(_), FieldValue::String(_))
                | (Self::Bool, FieldValue::Bool(_))
                | (Self::StringSet, FieldValue::Set(_))
        )
    }

    const fn name(self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Bool => "bool",
            Self::StringSet => "set of strings",
        }
    }
}

impl FieldSpec {
    /// Returns true if the caller may supply this field.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !matches!(self.role, FieldRole::Computed)
    }
}

impl ResourceDescriptor {
    /// Looks up a field declaration.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the named field is sensitive.
    #[must_use]
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.sensitive)
    }

    /// Names of fields whose change forces replacement.
    pub fn immutable_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| matches!(f.role, FieldRole::Immutable))
    }

    /// Returns true if the identity is the protected instance.
    #[must_use]
    pub fn is_protected(&self, identity: &str) -> bool {
        self.protected.is_some_and(|p| p.identity == identity)
    }

    /// Extracts the identity from a desired state, if the caller supplies it.
    #[must_use]
    pub fn identity_of<'s>(&self, desired: &'s DesiredState) -> Option<&'s str> {
        desired
            .get_str(self.identity_field)
            .filter(|s| !s.is_empty())
    }

    /// Validates a desired state, stopping at the first problem.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error naming the offending field.
    pub fn validate(&self, desired: &DesiredState) -> Result<(), ReconcileError> {
        match self.validation_errors(desired).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Collects every validation problem of a desired state.
    ///
    /// Computed fields are ignored so that imported snapshots can be fed
    /// back into update unchanged.
    #[must_use]
    pub fn validation_errors(&self, desired: &DesiredState) -> Vec<ReconcileError> {
        let mut errors = Vec::new();

        for (name, value) in desired.fields() {
            let Some(spec) = self.field(name) else {
                errors.push(ReconcileError::validation(
                    self.kind,
                    name,
                    "unknown field",
                ));
                continue;
            };
            if !spec.is_writable() {
                continue;
            }
            if !spec.ty.accepts(value) {
                errors.push(ReconcileError::validation(
                    self.kind,
                    name,
                    format!("expected {}, got {}", spec.ty.name(), value.type_name()),
                ));
                continue;
            }
            if let (FieldType::Enum(allowed), FieldValue::String(s)) = (spec.ty, value) {
                let missing_optional = s.is_empty() && !spec.required;
                if !missing_optional && !allowed.contains(&s.as_str()) {
                    errors.push(ReconcileError::validation(
                        self.kind,
                        name,
                        format!("'{s}' is not allowed; must be one of: {}", allowed.join(", ")),
                    ));
                }
            }
        }

        for spec in self.fields.iter().filter(|f| f.required && f.is_writable()) {
            let present = match desired.get(spec.name) {
                Some(FieldValue::String(s)) => !s.is_empty(),
                Some(_) => true,
                None => false,
            };
            if !present {
                errors.push(ReconcileError::validation(
                    self.kind,
                    spec.name,
                    "required field is missing",
                ));
            }
        }

        errors
    }

    /// Fills absent optional fields with their defaults and drops computed ones.
    #[must_use]
    pub fn normalize(&self, desired: &DesiredState) -> DesiredState {
        let mut normalized = DesiredState::new();
        for spec in self.fields.iter().filter(|f| f.is_writable()) {
            let value = desired
                .get(spec.name)
                .cloned()
                .unwrap_or_else(|| spec.ty.default_value());
            normalized.insert(spec.name, value);
        }
        normalized
    }

    /// Builds the record to transmit for a create.
    #[must_use]
    pub fn create_record(&self, desired: &DesiredState) -> FieldMap {
        self.normalize(desired).into_fields()
    }

    /// Builds the record to transmit for an update of `identity`.
    #[must_use]
    pub fn update_record(&self, identity: &str, desired: &DesiredState) -> FieldMap {
        let mut record = self.normalize(desired).into_fields();
        if self.write_mode == WriteMode::PartialPatch {
            for spec in self.immutable_fields() {
                record.remove(spec.name);
            }
        }
        record.insert(self.identity_field.to_string(), identity.into());
        record
    }

    /// Builds the baseline state a protected instance is reset to.
    #[must_use]
    pub fn baseline_state(&self, identity: &str) -> Option<DesiredState> {
        let protected = self.protected.filter(|p| p.identity == identity)?;
        let mut state = DesiredState::new().with(self.identity_field, identity);
        for spec in self
            .fields
            .iter()
            .filter(|f| matches!(f.role, FieldRole::Mutable))
        {
            let value = protected
                .baseline
                .iter()
                .find(|(name, _)| *name == spec.name)
                .map_or_else(|| spec.ty.default_value(), |(_, v)| FieldValue::from(*v));
            state.insert(spec.name, value);
        }
        Some(state)
    }
}
