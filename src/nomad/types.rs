//! Nomad API types and data structures.
//!
//! This module defines the JSON bodies exchanged with the Nomad HTTP API.
//! Nomad uses `PascalCase` keys with a few upper-case `ID` suffixes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ACL policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AclPolicy {
    /// Unique policy name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// HCL or JSON rules. Absent from list stubs.
    #[serde(default)]
    pub rules: String,
    /// Raft index at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_index: Option<u64>,
    /// Raft index at last modification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_index: Option<u64>,
}

/// An ACL token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AclToken {
    /// Public identifier, generated by Nomad.
    #[serde(rename = "AccessorID", default, skip_serializing_if = "String::is_empty")]
    pub accessor_id: String,
    /// Secret value, generated by Nomad.
    #[serde(rename = "SecretID", default, skip_serializing_if = "String::is_empty")]
    pub secret_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// `client` or `management`.
    #[serde(rename = "Type", default)]
    pub token_type: String,
    /// Attached policies.
    #[serde(default)]
    pub policies: Option<Vec<String>>,
    /// Replicated to all regions. Absent from update bodies, where the
    /// mode cannot change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<bool>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    /// Raft index at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_index: Option<u64>,
    /// Raft index at last modification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_index: Option<u64>,
}

/// A namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Namespace {
    /// Unique namespace name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Attached quota specification.
    #[serde(default)]
    pub quota: String,
    /// Raft index at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_index: Option<u64>,
    /// Raft index at last modification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_index: Option<u64>,
}

/// A Sentinel policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SentinelPolicy {
    /// Unique policy name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Scope the policy applies to.
    #[serde(default)]
    pub scope: String,
    /// Enforcement level.
    #[serde(default)]
    pub enforcement_level: String,
    /// Sentinel source. Absent from list stubs.
    #[serde(default)]
    pub policy: String,
    /// Raft index at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_index: Option<u64>,
    /// Raft index at last modification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_index: Option<u64>,
}

/// A job deployment, as listed by `/v1/deployments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    /// Deployment identifier.
    #[serde(rename = "ID")]
    pub id: String,
    /// Job being deployed.
    #[serde(rename = "JobID")]
    pub job_id: String,
    /// Job version being deployed.
    #[serde(default)]
    pub job_version: u64,
    /// Deployment status.
    #[serde(default)]
    pub status: String,
    /// Human-readable status detail.
    #[serde(default)]
    pub status_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_wire_names() {
        let json = r#"{
            "AccessorID": "b780e702-98ce-521f-2e5f-c6b87de05b24",
            "SecretID": "3f4a0fcd-7c42-773c-25db-2d31ba0c05fe",
            "Name": "Bootstrap Token",
            "Type": "management",
            "Policies": null,
            "Global": true,
            "CreateTime": "2017-08-23T22:47:14.695408057Z",
            "CreateIndex": 7,
            "ModifyIndex": 7
        }"#;
        let token: AclToken = serde_json::from_str(json).expect("token should parse");
        assert_eq!(token.accessor_id, "b780e702-98ce-521f-2e5f-c6b87de05b24");
        assert_eq!(token.token_type, "management");
        assert_eq!(token.global, Some(true));
        assert!(token.policies.is_none());
        assert!(token.create_time.is_some());
    }

    #[test]
    fn test_new_token_omits_generated_ids() {
        let token = AclToken {
            name: String::from("ci"),
            token_type: String::from("client"),
            policies: Some(vec![String::from("readonly")]),
            ..AclToken::default()
        };
        let value = serde_json::to_value(&token).expect("token should serialize");
        assert!(value.get("AccessorID").is_none());
        assert!(value.get("SecretID").is_none());
        assert_eq!(value["Type"], "client");
    }

    #[test]
    fn test_deployment_wire_names() {
        let json = r#"{"ID":"d-1","JobID":"web","JobVersion":3,"Status":"running","StatusDescription":"Deployment is running"}"#;
        let deployment: Deployment = serde_json::from_str(json).expect("deployment should parse");
        assert_eq!(deployment.job_id, "web");
        assert_eq!(deployment.job_version, 3);
    }
}
