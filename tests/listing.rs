//! Read-only listings.

mod common;

use common::{fields, StubClient, ADDRESS};
use nomad_reconcile::listing::{ListingKind, ListingProjector};
use nomad_reconcile::nomad::Deployment;
use nomad_reconcile::resource::ResourceKind;

#[tokio::test]
async fn test_listing_ids_are_address_and_kind() {
    let client = StubClient::new().with_regions(&["global", "eu-west"]);
    let projector = ListingProjector::new(&client);

    for kind in ListingKind::ALL {
        let listing = projector.project(kind).await.expect("listing");
        assert_eq!(listing.id, format!("{ADDRESS}/{kind}"));
        assert_eq!(listing.kind, kind);
    }

    let regions = projector.regions().await.expect("regions");
    let names: Vec<&str> = regions
        .records
        .iter()
        .filter_map(|r| r.get("Name").map(String::as_str))
        .collect();
    assert_eq!(names, vec!["global", "eu-west"]);
}

#[tokio::test]
async fn test_namespaces_are_flattened_to_names() {
    let client = StubClient::new()
        .seed(
            ResourceKind::Namespace,
            "batch",
            fields(&[("name", "batch"), ("description", "Batch jobs")]),
        )
        .seed(ResourceKind::Namespace, "default", fields(&[("name", "default")]));

    let listing = ListingProjector::new(&client)
        .namespaces()
        .await
        .expect("namespaces");

    assert_eq!(listing.id, "http://nomad.test:4646/namespaces");
    assert_eq!(listing.records.len(), 2);
    assert!(listing.records.iter().all(|r| r.len() == 1));
}

#[tokio::test]
async fn test_deployments_render_job_version_in_decimal() {
    let client = StubClient::new().with_deployments(vec![Deployment {
        id: String::from("70638f62-5c19-193e-30d6-f9d6e689ab8e"),
        job_id: String::from("example"),
        job_version: 12,
        status: String::from("successful"),
        status_description: String::from("Deployment completed successfully"),
    }]);

    let listing = ListingProjector::new(&client)
        .deployments()
        .await
        .expect("deployments");

    let record = &listing.records[0];
    assert_eq!(record.get("JobVersion").map(String::as_str), Some("12"));
    assert_eq!(record.get("JobID").map(String::as_str), Some("example"));
    assert_eq!(record.get("Status").map(String::as_str), Some("successful"));
    assert_eq!(
        record.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["ID", "JobID", "JobVersion", "Status", "StatusDescription"]
    );
}
