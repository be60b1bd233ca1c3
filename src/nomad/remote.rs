//! The capability interface the reconciler needs from a cluster client.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::resource::{FieldMap, ResourceKind};

use super::types::Deployment;

/// Kind-addressed CRUD over a cluster, plus the bulk listings.
///
/// Implementations must report a missing object as [`RemoteError::NotFound`];
/// every other refusal keeps the server's message so that a conflict matcher
/// can classify it.
#[async_trait]
pub trait RemoteResourceClient: Send + Sync {
    /// Address of the cluster this client talks to.
    fn address(&self) -> &str;

    /// Lists every object of a kind. List entries may omit large fields.
    async fn list(&self, kind: ResourceKind) -> Result<Vec<FieldMap>, RemoteError>;

    /// Reads one object.
    async fn info(&self, kind: ResourceKind, identity: &str) -> Result<FieldMap, RemoteError>;

    /// Creates (or upserts) an object, returning what the server echoed.
    async fn create(&self, kind: ResourceKind, record: &FieldMap)
    -> Result<FieldMap, RemoteError>;

    /// Updates an existing object.
    async fn update(
        &self,
        kind: ResourceKind,
        identity: &str,
        record: &FieldMap,
    ) -> Result<FieldMap, RemoteError>;

    /// Deletes an object.
    async fn delete(&self, kind: ResourceKind, identity: &str) -> Result<(), RemoteError>;

    /// Lists the cluster's regions.
    async fn list_regions(&self) -> Result<Vec<String>, RemoteError>;

    /// Lists job deployments.
    async fn list_deployments(&self) -> Result<Vec<Deployment>, RemoteError>;
}
