//! Shared test doubles: an in-memory cluster and a sleeper that only records.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use nomad_reconcile::error::RemoteError;
use nomad_reconcile::nomad::{Deployment, RemoteResourceClient};
use nomad_reconcile::reconciler::Sleeper;
use nomad_reconcile::resource::{FieldMap, ResourceKind};

pub const ADDRESS: &str = "http://nomad.test:4646";

pub const CONFLICT_MESSAGE: &str =
    "namespace \"batch\" has non-terminal jobs in regions: [global]";

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub kind: ResourceKind,
    pub identity: String,
}

/// In-memory cluster that records every call.
#[derive(Default)]
pub struct StubClient {
    objects: Mutex<BTreeMap<(ResourceKind, String), FieldMap>>,
    calls: Mutex<Vec<Call>>,
    conflicts: Mutex<BTreeMap<String, u32>>,
    rejections: Mutex<BTreeMap<String, (u16, String)>>,
    next_accessor: Mutex<u32>,
    updates: Mutex<Vec<FieldMap>>,
    regions: Vec<String>,
    deployments: Vec<Deployment>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` deletes or updates of `identity` fail with the
    /// non-terminal jobs message.
    pub fn conflict(self, identity: &str, times: u32) -> Self {
        self.conflicts
            .lock()
            .expect("lock")
            .insert(identity.to_string(), times);
        self
    }

    /// Every mutation of `identity` fails with `status`.
    pub fn reject(self, identity: &str, status: u16, message: &str) -> Self {
        self.rejections
            .lock()
            .expect("lock")
            .insert(identity.to_string(), (status, message.to_string()));
        self
    }

    /// Stores an object directly, as if it pre-existed on the cluster.
    pub fn seed(self, kind: ResourceKind, identity: &str, fields: FieldMap) -> Self {
        self.objects
            .lock()
            .expect("lock")
            .insert((kind, identity.to_string()), fields);
        self
    }

    pub fn with_regions(mut self, regions: &[&str]) -> Self {
        self.regions = regions.iter().map(|r| (*r).to_string()).collect();
        self
    }

    pub fn with_deployments(mut self, deployments: Vec<Deployment>) -> Self {
        self.deployments = deployments;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    /// Records received by `update`, in call order.
    pub fn updates(&self) -> Vec<FieldMap> {
        self.updates.lock().expect("lock").clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn object(&self, kind: ResourceKind, identity: &str) -> Option<FieldMap> {
        self.objects
            .lock()
            .expect("lock")
            .get(&(kind, identity.to_string()))
            .cloned()
    }

    pub fn len(&self, kind: ResourceKind) -> usize {
        self.objects
            .lock()
            .expect("lock")
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn record(&self, op: &'static str, kind: ResourceKind, identity: &str) {
        self.calls.lock().expect("lock").push(Call {
            op,
            kind,
            identity: identity.to_string(),
        });
    }

    /// Pending conflicts fire before a standing rejection.
    fn check_mutation(&self, identity: &str, conflicts_apply: bool) -> Result<(), RemoteError> {
        if conflicts_apply {
            let mut conflicts = self.conflicts.lock().expect("lock");
            if let Some(remaining) = conflicts.get_mut(identity)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(RemoteError::api_error(500, CONFLICT_MESSAGE));
            }
        }
        if let Some((status, message)) = self.rejections.lock().expect("lock").get(identity) {
            return Err(RemoteError::api_error(*status, message.clone()));
        }
        Ok(())
    }

    fn identity_field(kind: ResourceKind) -> &'static str {
        kind.descriptor().identity_field
    }
}

#[async_trait]
impl RemoteResourceClient for StubClient {
    fn address(&self) -> &str {
        ADDRESS
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<FieldMap>, RemoteError> {
        self.record("list", kind, "");
        Ok(self
            .objects
            .lock()
            .expect("lock")
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, fields)| fields.clone())
            .collect())
    }

    async fn info(&self, kind: ResourceKind, identity: &str) -> Result<FieldMap, RemoteError> {
        self.record("info", kind, identity);
        self.object(kind, identity)
            .ok_or_else(|| RemoteError::not_found(kind.as_str(), identity))
    }

    async fn create(&self, kind: ResourceKind, record: &FieldMap) -> Result<FieldMap, RemoteError> {
        let mut stored = record.clone();
        let identity = if kind == ResourceKind::AclToken {
            let mut next = self.next_accessor.lock().expect("lock");
            *next += 1;
            let n = *next;
            let accessor = format!("accessor-{n}");
            stored.insert("accessor_id".into(), accessor.as_str().into());
            stored.insert("secret_id".into(), format!("secret-{n}").into());
            stored.insert("create_time".into(), "2024-01-02 03:04:05 +0000 UTC".into());
            accessor
        } else {
            record
                .get(Self::identity_field(kind))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        self.record("create", kind, &identity);
        self.check_mutation(&identity, false)?;
        self.objects
            .lock()
            .expect("lock")
            .insert((kind, identity), stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        identity: &str,
        record: &FieldMap,
    ) -> Result<FieldMap, RemoteError> {
        self.record("update", kind, identity);
        self.updates.lock().expect("lock").push(record.clone());
        self.check_mutation(identity, true)?;

        let mut objects = self.objects.lock().expect("lock");
        let key = (kind, identity.to_string());
        let mut stored = match kind {
            ResourceKind::AclToken => objects
                .get(&key)
                .cloned()
                .ok_or_else(|| RemoteError::not_found(kind.as_str(), identity))?,
            _ => FieldMap::new(),
        };
        if kind == ResourceKind::AclToken
            && let Some(global) = record.get("global")
            && stored.get("global") != Some(global)
        {
            return Err(RemoteError::api_error(400, "Cannot toggle global mode"));
        }
        stored.extend(record.clone());
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: ResourceKind, identity: &str) -> Result<(), RemoteError> {
        self.record("delete", kind, identity);
        self.check_mutation(identity, true)?;
        self.objects
            .lock()
            .expect("lock")
            .remove(&(kind, identity.to_string()))
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(kind.as_str(), identity))
    }

    async fn list_regions(&self) -> Result<Vec<String>, RemoteError> {
        Ok(self.regions.clone())
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, RemoteError> {
        Ok(self.deployments.clone())
    }
}

/// Sleeper that records the requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().expect("lock").clone()
    }

    pub fn total(&self) -> Duration {
        self.waits().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().expect("lock").push(duration);
    }
}

pub fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).into()))
        .collect()
}
