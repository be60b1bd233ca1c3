//! Read-only projections of cluster-wide lists.
//!
//! Each listing flattens remote records into string maps and carries a
//! synthetic id derived from the cluster address, so repeated reads of the
//! same cluster produce the same id.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::RemoteError;
use crate::nomad::RemoteResourceClient;
use crate::resource::{FieldValue, ResourceKind};

/// One flattened record.
pub type Record = BTreeMap<String, String>;

/// Which list a [`Listing`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    /// Cluster regions.
    Regions,
    /// Namespaces.
    Namespaces,
    /// Job deployments.
    Deployments,
}

impl ListingKind {
    /// Every listing kind.
    pub const ALL: [Self; 3] = [Self::Regions, Self::Namespaces, Self::Deployments];

    /// Path segment used in the listing id.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regions => "regions",
            Self::Namespaces => "namespaces",
            Self::Deployments => "deployments",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ListingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown listing '{s}'; expected regions, namespaces or deployments"))
    }
}

/// A read-only, flattened list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// `<cluster address>/<kind>`.
    pub id: String,
    /// What was listed.
    pub kind: ListingKind,
    /// Records in server order.
    pub records: Vec<Record>,
}

/// Produces listings from a cluster client.
pub struct ListingProjector<'a, C: RemoteResourceClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: RemoteResourceClient + ?Sized> ListingProjector<'a, C> {
    /// Creates a projector.
    #[must_use]
    pub const fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Runs the listing of the given kind.
    ///
    /// # Errors
    ///
    /// Returns the client error if the cluster call fails.
    pub async fn project(&self, kind: ListingKind) -> Result<Listing, RemoteError> {
        match kind {
            ListingKind::Regions => self.regions().await,
            ListingKind::Namespaces => self.namespaces().await,
            ListingKind::Deployments => self.deployments().await,
        }
    }

    /// Lists regions as `{ "Name": … }` records.
    ///
    /// # Errors
    ///
    /// Returns the client error if the cluster call fails.
    pub async fn regions(&self) -> Result<Listing, RemoteError> {
        let regions = self.client.list_regions().await?;
        let records = regions.into_iter().map(named).collect();
        Ok(self.listing(ListingKind::Regions, records))
    }

    /// Lists namespaces as `{ "Name": … }` records.
    ///
    /// # Errors
    ///
    /// Returns the client error if the cluster call fails.
    pub async fn namespaces(&self) -> Result<Listing, RemoteError> {
        let namespaces = self.client.list(ResourceKind::Namespace).await?;
        let records = namespaces
            .iter()
            .filter_map(|fields| fields.get("name").and_then(FieldValue::as_str))
            .map(named)
            .collect();
        Ok(self.listing(ListingKind::Namespaces, records))
    }

    /// Lists deployments with their job and status.
    ///
    /// # Errors
    ///
    /// Returns the client error if the cluster call fails.
    pub async fn deployments(&self) -> Result<Listing, RemoteError> {
        let deployments = self.client.list_deployments().await?;
        let records = deployments
            .into_iter()
            .map(|d| {
                Record::from([
                    (String::from("ID"), d.id),
                    (String::from("JobID"), d.job_id),
                    (String::from("JobVersion"), d.job_version.to_string()),
                    (String::from("Status"), d.status),
                    (String::from("StatusDescription"), d.status_description),
                ])
            })
            .collect();
        Ok(self.listing(ListingKind::Deployments, records))
    }

    fn listing(&self, kind: ListingKind, records: Vec<Record>) -> Listing {
        let id = format!("{}/{kind}", self.client.address());
        debug!("Listed {} {kind} as '{id}'", records.len());
        Listing { id, kind, records }
    }
}

fn named(name: impl Into<String>) -> Record {
    Record::from([(String::from("Name"), name.into())])
}
