//! REST client for the SDDC Manager API.
//!
//! Implements [`RemoteClient`] on top of `reqwest`. The wire records here are
//! private; everything crossing into the reconciler uses its own model types.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wld_reconcile::client::{CheckStatus, ValidationCheck, ValidationReport};
use wld_reconcile::model::{
    DeleteResponse, RemoteCluster, RemoteDomain, RemoteHost, RemoteTask, RemoteVcenter, TaskRef,
    TaskResource, TaskStatus,
};
use wld_reconcile::spec::{
    ClusterCreationSpec, ClusterUpdateSpec, DomainCreationSpec, DomainUpdateSpec,
};
use wld_reconcile::{RemoteClient, RemoteError, RemoteResult};

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct TaskAccepted {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTaskError {
    message: Option<String>,
    error_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTaskResource {
    resource_id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTask {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    status: TaskStatus,
    #[serde(default)]
    errors: Vec<WireTaskError>,
    #[serde(default)]
    resources: Vec<WireTaskResource>,
}

impl From<WireTask> for RemoteTask {
    fn from(task: WireTask) -> Self {
        RemoteTask {
            id: task.id,
            name: task.name,
            kind: task.kind,
            status: task.status,
            errors: task
                .errors
                .into_iter()
                .filter_map(|e| e.message.or(e.error_code))
                .collect(),
            resources: task
                .resources
                .into_iter()
                .map(|r| TaskResource {
                    kind: r.kind,
                    id: r.resource_id,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct Reference {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDomain {
    id: String,
    name: String,
    status: Option<String>,
    #[serde(rename = "type")]
    domain_type: Option<String>,
    sso_id: Option<String>,
    sso_name: Option<String>,
    #[serde(default)]
    is_management_sso_domain: bool,
    #[serde(default)]
    vcenters: Vec<RemoteVcenter>,
    #[serde(default)]
    clusters: Vec<Reference>,
}

impl From<WireDomain> for RemoteDomain {
    fn from(domain: WireDomain) -> Self {
        RemoteDomain {
            id: domain.id,
            name: domain.name,
            status: domain.status,
            domain_type: domain.domain_type,
            sso_id: domain.sso_id,
            sso_name: domain.sso_name,
            is_management_sso_domain: domain.is_management_sso_domain,
            vcenters: domain.vcenters,
            cluster_ids: domain.clusters.into_iter().map(|c| c.id).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHost {
    id: String,
    fqdn: Option<String>,
    ip_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCluster {
    id: String,
    name: String,
    domain: Option<Reference>,
    primary_datastore_name: Option<String>,
    primary_datastore_type: Option<String>,
    #[serde(default)]
    is_default: bool,
    #[serde(default)]
    is_stretched: bool,
    #[serde(default)]
    hosts: Vec<WireHost>,
}

impl From<WireCluster> for RemoteCluster {
    fn from(cluster: WireCluster) -> Self {
        RemoteCluster {
            id: cluster.id,
            name: cluster.name,
            domain_id: cluster.domain.map(|d| d.id),
            primary_datastore_name: cluster.primary_datastore_name,
            primary_datastore_type: cluster.primary_datastore_type,
            is_default: cluster.is_default,
            is_stretched: cluster.is_stretched,
            hosts: cluster
                .hosts
                .into_iter()
                .map(|h| RemoteHost {
                    id: h.id,
                    fqdn: h.fqdn,
                    ip_address: h.ip_address,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    elements: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCheck {
    description: Option<String>,
    result_status: CheckStatus,
    error_response: Option<ErrorBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValidation {
    result_status: CheckStatus,
    #[serde(default)]
    validation_checks: Vec<WireCheck>,
}

impl From<WireValidation> for ValidationReport {
    fn from(validation: WireValidation) -> Self {
        ValidationReport {
            result_status: validation.result_status,
            checks: validation
                .validation_checks
                .into_iter()
                .map(|c| ValidationCheck {
                    description: c.description.unwrap_or_default(),
                    result_status: c.result_status,
                    error_message: c.error_response.and_then(|e| e.message),
                })
                .collect(),
        }
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Transport(err.to_string())
    }
}

/// Authenticated SDDC Manager API client.
pub struct SddcManagerClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl SddcManagerClient {
    /// Build the HTTP client and obtain an access token.
    pub async fn connect(
        host: &str,
        username: &str,
        password: &str,
        allow_unverified_tls: bool,
        call_timeout: Duration,
    ) -> RemoteResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(allow_unverified_tls)
            .timeout(call_timeout)
            .build()
            .map_err(transport)?;
        let base_url = format!("https://{}", host.trim_end_matches('/'));

        let response = http
            .post(format!("{}/v1/tokens", base_url))
            .json(&TokenRequest { username, password })
            .send()
            .await
            .map_err(transport)?;
        let token: TokenResponse = decode(check(response).await?).await?;
        info!("Authenticated to {} as {}", host, username);

        Ok(Self {
            http,
            base_url,
            access_token: token.access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        debug!("{} {}", method, path);
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.access_token)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = request.send().await.map_err(transport)?;
        decode(check(response).await?).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> RemoteResult<T> {
        self.send(self.request(reqwest::Method::POST, path).json(body))
            .await
    }

    async fn patch_task<B: Serialize + Sync>(&self, path: &str, body: &B) -> RemoteResult<TaskRef> {
        let accepted: TaskAccepted = self
            .send(self.request(reqwest::Method::PATCH, path).json(body))
            .await?;
        Ok(TaskRef::new(accepted.id))
    }

    /// GET a single resource; 404 means absent.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<Option<T>> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(check(response).await?).await.map(Some)
    }

    async fn delete(&self, path: &str) -> RemoteResult<DeleteResponse> {
        let response = self
            .request(reqwest::Method::DELETE, path)
            .send()
            .await
            .map_err(transport)?;
        let response = check(response).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        if body.is_empty() {
            return Ok(DeleteResponse::NoTask);
        }
        let task: TaskAccepted =
            serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(match status {
            StatusCode::ACCEPTED => DeleteResponse::Accepted(TaskRef::new(task.id)),
            _ => DeleteResponse::Completed(TaskRef::new(task.id)),
        })
    }
}

/// Map a non-2xx response to `RemoteError::Status`.
async fn check(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
    let (code, message) = match parsed {
        Some(err) => (err.error_code, err.message.unwrap_or(body)),
        None => (None, body),
    };
    Err(RemoteError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteClient for SddcManagerClient {
    async fn validate_domain(&self, spec: &DomainCreationSpec) -> RemoteResult<ValidationReport> {
        let validation: WireValidation = self.post("/v1/domains/validations", spec).await?;
        Ok(validation.into())
    }

    async fn create_domain(&self, spec: &DomainCreationSpec) -> RemoteResult<TaskRef> {
        let accepted: TaskAccepted = self.post("/v1/domains", spec).await?;
        Ok(TaskRef::new(accepted.id))
    }

    async fn update_domain(&self, id: &str, spec: &DomainUpdateSpec) -> RemoteResult<TaskRef> {
        self.patch_task(&format!("/v1/domains/{}", id), spec).await
    }

    async fn delete_domain(&self, id: &str) -> RemoteResult<DeleteResponse> {
        self.delete(&format!("/v1/domains/{}", id)).await
    }

    async fn get_domain(&self, id: &str) -> RemoteResult<Option<RemoteDomain>> {
        let domain: Option<WireDomain> = self.get_optional(&format!("/v1/domains/{}", id)).await?;
        Ok(domain.map(Into::into))
    }

    async fn validate_cluster_creation(
        &self,
        spec: &ClusterCreationSpec,
    ) -> RemoteResult<ValidationReport> {
        let validation: WireValidation = self.post("/v1/clusters/validations", spec).await?;
        Ok(validation.into())
    }

    async fn validate_cluster_update(
        &self,
        id: &str,
        spec: &ClusterUpdateSpec,
    ) -> RemoteResult<ValidationReport> {
        let validation: WireValidation = self
            .post(&format!("/v1/clusters/{}/validations", id), spec)
            .await?;
        Ok(validation.into())
    }

    async fn create_cluster(&self, spec: &ClusterCreationSpec) -> RemoteResult<TaskRef> {
        let accepted: TaskAccepted = self.post("/v1/clusters", spec).await?;
        Ok(TaskRef::new(accepted.id))
    }

    async fn update_cluster(&self, id: &str, spec: &ClusterUpdateSpec) -> RemoteResult<TaskRef> {
        self.patch_task(&format!("/v1/clusters/{}", id), spec).await
    }

    async fn delete_cluster(&self, id: &str) -> RemoteResult<DeleteResponse> {
        self.delete(&format!("/v1/clusters/{}", id)).await
    }

    async fn get_cluster(&self, id: &str) -> RemoteResult<Option<RemoteCluster>> {
        let cluster: Option<WireCluster> =
            self.get_optional(&format!("/v1/clusters/{}", id)).await?;
        Ok(cluster.map(Into::into))
    }

    async fn list_clusters(&self) -> RemoteResult<Vec<RemoteCluster>> {
        let page: Page<WireCluster> = self
            .send(self.request(reqwest::Method::GET, "/v1/clusters"))
            .await?;
        Ok(page.elements.into_iter().map(Into::into).collect())
    }

    async fn get_task(&self, id: &str) -> RemoteResult<RemoteTask> {
        let task: WireTask = self
            .send(self.request(reqwest::Method::GET, &format!("/v1/tasks/{}", id)))
            .await?;
        Ok(task.into())
    }
}
