//! Nomad API client implementation.
//!
//! This module provides the HTTP client for the Nomad REST API and its
//! implementation of [`RemoteResourceClient`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ConfigError, NomadReconcileError, RemoteError, Result};
use crate::resource::{FieldMap, ResourceKind};

use super::remote::RemoteResourceClient;
use super::types::{AclPolicy, AclToken, Deployment, Namespace, SentinelPolicy};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying the ACL secret.
const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Nomad HTTP API client.
#[derive(Debug, Clone)]
pub struct NomadClient {
    /// HTTP client.
    client: Client,
    /// Agent address as configured, without a trailing slash.
    address: String,
    /// Parsed base URL.
    base: Url,
    /// ACL token secret, if ACLs are enabled.
    token: Option<String>,
    /// Region to target, if not the agent's own.
    region: Option<String>,
}

type RemoteResult<T> = std::result::Result<T, RemoteError>;

impl NomadClient {
    /// Creates a new Nomad API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid URL or the HTTP
    /// client cannot be created.
    pub fn new(address: &str, token: Option<&str>) -> Result<Self> {
        Self::with_timeout(address, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid URL or the HTTP
    /// client cannot be created.
    pub fn with_timeout(address: &str, token: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let address = address.trim_end_matches('/').to_string();
        let base = Url::parse(&address).map_err(|e| {
            NomadReconcileError::Config(ConfigError::validation(
                format!("Invalid Nomad address '{address}': {e}"),
                "cluster.address",
            ))
        })?;
        if base.cannot_be_a_base() {
            return Err(NomadReconcileError::Config(ConfigError::validation(
                format!("Nomad address '{address}' cannot be used as a base URL"),
                "cluster.address",
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            address,
            base,
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
            region: None,
        })
    }

    /// Targets a specific region.
    #[must_use]
    pub fn with_region(mut self, region: Option<&str>) -> Self {
        self.region = region.filter(|r| !r.is_empty()).map(str::to_string);
        self
    }

    /// Builds `<base>/v1/<segments...>`, escaping each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("v1").extend(segments);
        }
        url
    }

    /// Sends a request and maps error statuses.
    async fn send(&self, request: RequestBuilder, what: &str, identity: &str) -> RemoteResult<Response> {
        let request = match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        };
        let request = match &self.region {
            Some(region) => request.query(&[("region", region.as_str())]),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        trace!("Nomad responded {status} for {what} '{identity}'");

        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::not_found(what, identity));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = body.trim().to_string();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RemoteError::AuthenticationFailed {
                    message: if message.is_empty() {
                        String::from("Permission denied")
                    } else {
                        message
                    },
                });
            }
            return Err(RemoteError::api_error(status.as_u16(), message));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        what: &str,
        identity: &str,
    ) -> RemoteResult<T> {
        let request = self.client.request(Method::GET, self.endpoint(segments));
        let response = self.send(request, what, identity).await?;
        response.json().await.map_err(|e| RemoteError::InvalidResponse {
            message: format!("Failed to parse {what} response: {e}"),
        })
    }

    async fn post<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
        what: &str,
        identity: &str,
    ) -> RemoteResult<Response> {
        let request = self
            .client
            .request(Method::POST, self.endpoint(segments))
            .json(body);
        self.send(request, what, identity).await
    }

    async fn delete_path(&self, segments: &[&str], what: &str, identity: &str) -> RemoteResult<()> {
        let request = self.client.request(Method::DELETE, self.endpoint(segments));
        self.send(request, what, identity).await?;
        Ok(())
    }

    /// Lists ACL policy stubs.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_acl_policies(&self) -> RemoteResult<Vec<AclPolicy>> {
        self.get_json(&["acl", "policies"], "ACL policies", "").await
    }

    /// Reads an ACL policy.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the policy does not exist, or an API error.
    pub async fn get_acl_policy(&self, name: &str) -> RemoteResult<AclPolicy> {
        self.get_json(&["acl", "policy", name], "ACL policy", name).await
    }

    /// Creates or replaces an ACL policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn upsert_acl_policy(&self, policy: &AclPolicy) -> RemoteResult<()> {
        self.post(&["acl", "policy", &policy.name], policy, "ACL policy", &policy.name)
            .await?;
        Ok(())
    }

    /// Deletes an ACL policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn delete_acl_policy(&self, name: &str) -> RemoteResult<()> {
        self.delete_path(&["acl", "policy", name], "ACL policy", name).await
    }

    /// Lists ACL token stubs.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_acl_tokens(&self) -> RemoteResult<Vec<AclToken>> {
        self.get_json(&["acl", "tokens"], "ACL tokens", "").await
    }

    /// Reads an ACL token by accessor id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the token does not exist, or an API error.
    pub async fn get_acl_token(&self, accessor: &str) -> RemoteResult<AclToken> {
        self.get_json(&["acl", "token", accessor], "ACL token", accessor).await
    }

    /// Creates an ACL token. The response carries the generated ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn create_acl_token(&self, token: &AclToken) -> RemoteResult<AclToken> {
        let response = self.post(&["acl", "token"], token, "ACL token", &token.name).await?;
        response.json().await.map_err(|e| RemoteError::InvalidResponse {
            message: format!("Failed to parse created ACL token: {e}"),
        })
    }

    /// Updates an ACL token.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn update_acl_token(&self, token: &AclToken) -> RemoteResult<AclToken> {
        let accessor = token.accessor_id.as_str();
        let response = self
            .post(&["acl", "token", accessor], token, "ACL token", accessor)
            .await?;
        response.json().await.map_err(|e| RemoteError::InvalidResponse {
            message: format!("Failed to parse updated ACL token: {e}"),
        })
    }

    /// Deletes an ACL token.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn delete_acl_token(&self, accessor: &str) -> RemoteResult<()> {
        self.delete_path(&["acl", "token", accessor], "ACL token", accessor).await
    }

    /// Lists namespaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_namespaces(&self) -> RemoteResult<Vec<Namespace>> {
        self.get_json(&["namespaces"], "namespaces", "").await
    }

    /// Reads a namespace.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the namespace does not exist, or an API error.
    pub async fn get_namespace(&self, name: &str) -> RemoteResult<Namespace> {
        self.get_json(&["namespace", name], "namespace", name).await
    }

    /// Registers (creates or replaces) a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn register_namespace(&self, namespace: &Namespace) -> RemoteResult<()> {
        self.post(&["namespace"], namespace, "namespace", &namespace.name)
            .await?;
        Ok(())
    }

    /// Deletes a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails, including while the namespace
    /// still has non-terminal jobs.
    pub async fn delete_namespace(&self, name: &str) -> RemoteResult<()> {
        self.delete_path(&["namespace", name], "namespace", name).await
    }

    /// Lists Sentinel policy stubs.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_sentinel_policies(&self) -> RemoteResult<Vec<SentinelPolicy>> {
        self.get_json(&["sentinel", "policies"], "Sentinel policies", "").await
    }

    /// Reads a Sentinel policy.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the policy does not exist, or an API error.
    pub async fn get_sentinel_policy(&self, name: &str) -> RemoteResult<SentinelPolicy> {
        self.get_json(&["sentinel", "policy", name], "Sentinel policy", name).await
    }

    /// Creates or replaces a Sentinel policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn upsert_sentinel_policy(&self, policy: &SentinelPolicy) -> RemoteResult<()> {
        self.post(
            &["sentinel", "policy", &policy.name],
            policy,
            "Sentinel policy",
            &policy.name,
        )
        .await?;
        Ok(())
    }

    /// Deletes a Sentinel policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn delete_sentinel_policy(&self, name: &str) -> RemoteResult<()> {
        self.delete_path(&["sentinel", "policy", name], "Sentinel policy", name).await
    }
}

#[async_trait]
impl RemoteResourceClient for NomadClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn list(&self, kind: ResourceKind) -> RemoteResult<Vec<FieldMap>> {
        debug!("Listing {kind} objects from Nomad");
        let records = match kind {
            ResourceKind::AclPolicy => self
                .list_acl_policies()
                .await?
                .iter()
                .map(FieldMap::from)
                .collect(),
            ResourceKind::AclToken => self
                .list_acl_tokens()
                .await?
                .iter()
                .map(FieldMap::from)
                .collect(),
            ResourceKind::Namespace => self
                .list_namespaces()
                .await?
                .iter()
                .map(FieldMap::from)
                .collect(),
            ResourceKind::SentinelPolicy => self
                .list_sentinel_policies()
                .await?
                .iter()
                .map(FieldMap::from)
                .collect(),
        };
        Ok(records)
    }

    async fn info(&self, kind: ResourceKind, identity: &str) -> RemoteResult<FieldMap> {
        let record = match kind {
            ResourceKind::AclPolicy => FieldMap::from(&self.get_acl_policy(identity).await?),
            ResourceKind::AclToken => FieldMap::from(&self.get_acl_token(identity).await?),
            ResourceKind::Namespace => FieldMap::from(&self.get_namespace(identity).await?),
            ResourceKind::SentinelPolicy => {
                FieldMap::from(&self.get_sentinel_policy(identity).await?)
            }
        };
        Ok(record)
    }

    async fn create(&self, kind: ResourceKind, record: &FieldMap) -> RemoteResult<FieldMap> {
        match kind {
            ResourceKind::AclPolicy => {
                let policy = AclPolicy::from(record);
                self.upsert_acl_policy(&policy).await?;
                Ok(FieldMap::from(&policy))
            }
            ResourceKind::AclToken => {
                let token = AclToken::from(record);
                let created = self.create_acl_token(&token).await?;
                Ok(FieldMap::from(&created))
            }
            ResourceKind::Namespace => {
                let namespace = Namespace::from(record);
                self.register_namespace(&namespace).await?;
                Ok(FieldMap::from(&namespace))
            }
            ResourceKind::SentinelPolicy => {
                let policy = SentinelPolicy::from(record);
                self.upsert_sentinel_policy(&policy).await?;
                Ok(FieldMap::from(&policy))
            }
        }
    }

    async fn update(
        &self,
        kind: ResourceKind,
        identity: &str,
        record: &FieldMap,
    ) -> RemoteResult<FieldMap> {
        match kind {
            ResourceKind::AclToken => {
                let mut token = AclToken::from(record);
                token.accessor_id = identity.to_string();
                // Global mode is fixed at creation.
                token.global = None;
                let updated = self.update_acl_token(&token).await?;
                Ok(FieldMap::from(&updated))
            }
            // The remaining kinds have no separate update call.
            _ => self.create(kind, record).await,
        }
    }

    async fn delete(&self, kind: ResourceKind, identity: &str) -> RemoteResult<()> {
        match kind {
            ResourceKind::AclPolicy => self.delete_acl_policy(identity).await,
            ResourceKind::AclToken => self.delete_acl_token(identity).await,
            ResourceKind::Namespace => self.delete_namespace(identity).await,
            ResourceKind::SentinelPolicy => self.delete_sentinel_policy(identity).await,
        }
    }

    async fn list_regions(&self) -> RemoteResult<Vec<String>> {
        self.get_json(&["regions"], "regions", "").await
    }

    async fn list_deployments(&self) -> RemoteResult<Vec<Deployment>> {
        self.get_json(&["deployments"], "deployments", "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DesiredState, FieldValue, ACL_TOKEN};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_rejects_invalid_address() {
        assert!(NomadClient::new("not a url", None).is_err());
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = NomadClient::new("http://127.0.0.1:4646/", None).expect("client");
        assert_eq!(client.address(), "http://127.0.0.1:4646");
        assert_eq!(
            client.endpoint(&["namespace", "a b"]).as_str(),
            "http://127.0.0.1:4646/v1/namespace/a%20b"
        );
    }

    #[tokio::test]
    async fn test_info_sends_token_and_region() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/namespace/batch"))
            .and(header("X-Nomad-Token", "secret"))
            .and(query_param("region", "eu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Name": "batch",
                "Description": "Batch jobs",
                "Quota": "",
                "CreateIndex": 10,
                "ModifyIndex": 12
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NomadClient::new(&server.uri(), Some("secret"))
            .expect("client")
            .with_region(Some("eu"));
        let record = client
            .info(ResourceKind::Namespace, "batch")
            .await
            .expect("namespace should be read");

        assert_eq!(
            record.get("description").and_then(|v| v.as_str()),
            Some("Batch jobs")
        );
    }

    #[tokio::test]
    async fn test_not_found_is_distinguishable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/acl/policy/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("ACL policy not found"))
            .mount(&server)
            .await;

        let client = NomadClient::new(&server.uri(), None).expect("client");
        let err = client
            .info(ResourceKind::AclPolicy, "missing")
            .await
            .expect_err("policy is missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_conflict_keeps_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/namespace/batch"))
            .respond_with(ResponseTemplate::new(500).set_body_string(
                "namespace \"batch\" has non-terminal jobs in regions: [global]",
            ))
            .mount(&server)
            .await;

        let client = NomadClient::new(&server.uri(), None).expect("client");
        let err = client
            .delete(ResourceKind::Namespace, "batch")
            .await
            .expect_err("delete should be refused");
        match err {
            RemoteError::ApiRequestFailed { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("has non-terminal jobs"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/regions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
            .mount(&server)
            .await;

        let client = NomadClient::new(&server.uri(), Some("bad")).expect("client");
        let err = client.list_regions().await.expect_err("token is rejected");
        assert!(matches!(err, RemoteError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_token_create_and_update_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/acl/token"))
            .and(body_partial_json(serde_json::json!({
                "Name": "ci",
                "Type": "client",
                "Policies": ["readonly"],
                "Global": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "AccessorID": "a-1",
                "SecretID": "s-1",
                "Name": "ci",
                "Type": "client",
                "Policies": ["readonly"],
                "Global": true,
                "CreateTime": "2024-01-02T03:04:05Z"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/acl/token/a-1"))
            .and(body_partial_json(serde_json::json!({
                "AccessorID": "a-1",
                "Type": "management"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "AccessorID": "a-1",
                "SecretID": "s-1",
                "Name": "ci",
                "Type": "management",
                "Global": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NomadClient::new(&server.uri(), None).expect("client");
        let mut record = FieldMap::new();
        record.insert("name".into(), "ci".into());
        record.insert("type".into(), "client".into());
        record.insert("policies".into(), vec![String::from("readonly")].into());
        record.insert("global".into(), true.into());

        let created = client
            .create(ResourceKind::AclToken, &record)
            .await
            .expect("token should be created");
        assert_eq!(created.get("accessor_id").and_then(|v| v.as_str()), Some("a-1"));
        assert_eq!(
            created.get("create_time").and_then(|v| v.as_str()),
            Some("2024-01-02 03:04:05 +0000 UTC")
        );

        record.insert("type".into(), "management".into());
        let updated = client
            .update(ResourceKind::AclToken, "a-1", &record)
            .await
            .expect("token should be updated");
        assert_eq!(updated.get("type").and_then(|v| v.as_str()), Some("management"));
    }

    #[tokio::test]
    async fn test_global_token_update_omits_global() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/acl/token/a-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "AccessorID": "a-1",
                "SecretID": "s-1",
                "Name": "replicator-eu",
                "Type": "client",
                "Policies": ["readonly"],
                "Global": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = NomadClient::new(&server.uri(), None).expect("client");
        let desired = DesiredState::new()
            .with("name", "replicator-eu")
            .with("type", "client")
            .with("policies", vec![String::from("readonly")])
            .with("global", true);
        let record = ACL_TOKEN.update_record("a-1", &desired);

        let updated = client
            .update(ResourceKind::AclToken, "a-1", &record)
            .await
            .expect("token should be updated");
        assert_eq!(updated.get("global"), Some(&FieldValue::Bool(true)));

        let requests = server.received_requests().await.expect("recording enabled");
        let body: serde_json::Value =
            serde_json::from_slice(&requests[0].body).expect("json body");
        assert_eq!(body["AccessorID"], "a-1");
        assert_eq!(body["Name"], "replicator-eu");
        assert!(body.get("Global").is_none(), "body: {body}");
    }
}
