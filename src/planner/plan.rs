//! Apply plan types and construction.
//!
//! A plan maps every manifest entry and every recorded resource onto one
//! lifecycle call of the reconciler. Entries without a record are created,
//! recorded entries are updated in place unless an immutable field changed,
//! and records no longer in the manifest are deleted.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

use crate::config::ManifestEntry;
use crate::resource::{DesiredState, FieldMap, RemoteState, ResourceKind};
use crate::state::{state_key, ReconcileState, ResourceRecord};

/// What a refresh observed for each recorded resource, keyed by state key.
/// `None` means the object no longer exists on the cluster.
pub type Observed = BTreeMap<String, Option<RemoteState>>;

/// A complete apply or destroy plan.
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Manifest handle.
    pub handle: String,
    /// Current identity on the cluster, if known.
    pub identity: Option<String>,
    /// Desired state for creates, updates and replaces.
    pub desired: Option<DesiredState>,
    /// Reason for this action.
    pub reason: String,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create a new object.
    Create,
    /// Update an existing object in place.
    Update,
    /// Delete the existing object and create a new one.
    Replace,
    /// Delete an object (or reset the protected one).
    Delete,
    /// Nothing to do.
    Noop,
}

impl ApplyPlan {
    /// Builds the plan that converges the cluster onto `entries`.
    ///
    /// When `observed` is given, recorded attributes are replaced by what
    /// the refresh saw, and records whose object vanished are re-created.
    #[must_use]
    pub fn build(
        entries: &[ManifestEntry],
        state: &ReconcileState,
        observed: Option<&Observed>,
    ) -> Self {
        let mut actions = Vec::with_capacity(entries.len());
        let mut declared = HashSet::new();

        for entry in entries {
            declared.insert(state_key(entry.kind, &entry.handle));
            actions.push(Self::plan_entry(entry, state, observed));
        }

        let mut stale: Vec<&ResourceRecord> = state
            .resources
            .iter()
            .filter(|(key, _)| !declared.contains(*key))
            .map(|(_, record)| record)
            .collect();
        stale.sort_by_key(|r| std::cmp::Reverse(apply_rank(r.kind)));

        for record in stale {
            let vanished = observed
                .and_then(|o| o.get(&state_key(record.kind, &record.handle)))
                .is_some_and(Option::is_none);
            if vanished {
                actions.push(PlannedAction {
                    action_type: ActionType::Noop,
                    kind: record.kind,
                    handle: record.handle.clone(),
                    identity: Some(record.identity.clone()),
                    desired: None,
                    reason: String::from("Removed from manifest and already gone from the cluster"),
                });
                continue;
            }
            actions.push(PlannedAction::delete(record, "Removed from manifest"));
        }

        Self {
            created_at: Utc::now(),
            actions,
        }
    }

    /// Builds the plan that deletes every recorded resource, tokens first.
    #[must_use]
    pub fn destroy(state: &ReconcileState) -> Self {
        let mut records: Vec<&ResourceRecord> = state.resources.values().collect();
        records.sort_by_key(|r| std::cmp::Reverse(apply_rank(r.kind)));

        Self {
            created_at: Utc::now(),
            actions: records
                .into_iter()
                .map(|r| PlannedAction::delete(r, "Destroy requested"))
                .collect(),
        }
    }

    fn plan_entry(
        entry: &ManifestEntry,
        state: &ReconcileState,
        observed: Option<&Observed>,
    ) -> PlannedAction {
        let key = state_key(entry.kind, &entry.handle);
        let mut action = PlannedAction {
            action_type: ActionType::Create,
            kind: entry.kind,
            handle: entry.handle.clone(),
            identity: None,
            desired: Some(entry.desired.clone()),
            reason: String::from("Declared in manifest"),
        };

        let Some(record) = state.resources.get(&key) else {
            return action;
        };

        let current = match observed.and_then(|o| o.get(&key)) {
            Some(Some(remote)) => &remote.fields,
            Some(None) => {
                action.reason = String::from("Recorded but missing from the cluster");
                return action;
            }
            None => &record.attributes,
        };

        action.identity = Some(record.identity.clone());
        let descriptor = entry.kind.descriptor();
        let normalized = descriptor.normalize(&entry.desired);

        if let Some(field) = descriptor
            .immutable_fields()
            .find(|f| normalized.get(f.name) != current.get(f.name))
        {
            action.action_type = ActionType::Replace;
            action.reason = format!("'{}' cannot be changed in place", field.name);
        } else if matches_current(normalized.fields(), current) {
            action.action_type = ActionType::Noop;
            action.reason = String::from("Up to date");
        } else {
            action.action_type = ActionType::Update;
            action.reason = String::from("Configuration changed");
        }

        action
    }

    /// Returns true if the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.action_type == ActionType::Noop)
    }

    /// Returns the number of actions of a type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Actions that change something.
    pub fn changes(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions
            .iter()
            .filter(|a| a.action_type != ActionType::Noop)
    }
}

/// Writable fields all equal their current values.
fn matches_current(normalized: &FieldMap, current: &FieldMap) -> bool {
    normalized
        .iter()
        .all(|(name, value)| current.get(name) == Some(value))
}

/// Position of a kind in the apply order.
fn apply_rank(kind: ResourceKind) -> usize {
    ResourceKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()
}

impl PlannedAction {
    fn delete(record: &ResourceRecord, reason: &str) -> Self {
        Self {
            action_type: ActionType::Delete,
            kind: record.kind,
            handle: record.handle.clone(),
            identity: Some(record.identity.clone()),
            desired: None,
            reason: reason.to_string(),
        }
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        let target = format!("{} '{}'", self.kind, self.handle);
        match self.action_type {
            ActionType::Create => format!("Create {target}"),
            ActionType::Update => format!("Update {target}"),
            ActionType::Replace => format!("Replace {target}"),
            ActionType::Delete => format!("Delete {target}"),
            ActionType::Noop => format!("No change for {target}"),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Noop => "noop",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}.{}", self.action_type, self.kind, self.handle)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ApplyPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.count(ActionType::Create),
            self.count(ActionType::Update),
            self.count(ActionType::Replace),
            self.count(ActionType::Delete)
        )?;
        for (i, action) in self.changes().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        Ok(())
    }
}
