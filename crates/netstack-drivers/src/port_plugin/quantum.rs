//! Quantum port plugin client

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use netstack_core::{BackendError, PortPlacement, PortPlugin, PortPluginConfig, RequestContext};
use netstack_types::ProjectId;

const SERVICE: &str = "quantum";
const API_PREFIX: &str = "/v1.0";

#[derive(Debug, Deserialize)]
struct NetworkResponse {
    network: Resource,
}

#[derive(Debug, Deserialize)]
struct PortResponse {
    port: Resource,
}

#[derive(Debug, Deserialize)]
struct PortsResponse {
    #[serde(default)]
    ports: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateNetworkRequest<'a> {
    network: NetworkBody<'a>,
}

#[derive(Debug, Serialize)]
struct NetworkBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CreatePortRequest {
    port: PortBody,
}

#[derive(Debug, Serialize)]
struct PortBody {
    state: &'static str,
}

#[derive(Debug, Serialize)]
struct AttachRequest<'a> {
    attachment: AttachmentBody<'a>,
}

#[derive(Debug, Serialize)]
struct AttachmentBody<'a> {
    id: &'a str,
    #[serde(flatten)]
    placement: &'a PortPlacement,
}

/// Port plugin client for the Quantum v1.0 REST API.
///
/// All logical networks live under the configured tenant; the owning
/// project is recorded on the network itself.
pub struct QuantumClient {
    client: Client,
    base_url: String,
    tenant: String,
    token: Option<String>,
}

impl QuantumClient {
    pub fn new(config: &PortPluginConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Quantum URL is required"))?
            .trim_end_matches('/')
            .to_string();

        if config.default_tenant.is_empty() {
            anyhow::bail!("Quantum tenant is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            tenant: config.default_tenant.clone(),
            token: config.token.clone(),
        })
    }

    fn networks_path(&self) -> String {
        format!(
            "{}/tenants/{}/networks",
            API_PREFIX,
            urlencoding::encode(&self.tenant)
        )
    }

    fn ports_path(&self, network_id: &str) -> String {
        format!(
            "{}/{}/ports",
            self.networks_path(),
            urlencoding::encode(network_id)
        )
    }

    fn port_path(&self, network_id: &str, port_id: &str) -> String {
        format!(
            "{}/{}",
            self.ports_path(network_id),
            urlencoding::encode(port_id)
        )
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("[{}] {} {}", ctx.request_id, method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("Content-Type", "application/json")
            .header("X-Request-Id", ctx.request_id.to_string());

        if let Some(token) = &self.token {
            request = request.header("X-Auth-Token", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(SERVICE, path));
        }
        Err(BackendError::rejected(
            SERVICE,
            format!("{} {} - {}", path, status, text),
        ))
    }

    async fn api_request<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, BackendError> {
        let response = self.send(ctx, method, path, body).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PortPlugin for QuantumClient {
    async fn create_network(
        &self,
        ctx: &RequestContext,
        label: &str,
        project_id: Option<ProjectId>,
    ) -> Result<String, BackendError> {
        let body = CreateNetworkRequest {
            network: NetworkBody {
                name: label,
                owner: project_id.as_deref(),
            },
        };

        let response: NetworkResponse = self
            .api_request(ctx, Method::POST, &self.networks_path(), Some(&body))
            .await?;

        log::info!("Quantum created network {} for '{}'", response.network.id, label);
        Ok(response.network.id)
    }

    async fn create_port(
        &self,
        ctx: &RequestContext,
        network_id: &str,
    ) -> Result<String, BackendError> {
        let body = CreatePortRequest {
            port: PortBody { state: "ACTIVE" },
        };

        let response: PortResponse = self
            .api_request(ctx, Method::POST, &self.ports_path(network_id), Some(&body))
            .await?;
        Ok(response.port.id)
    }

    async fn plug_interface(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
        attachment_id: &str,
        placement: &PortPlacement,
    ) -> Result<(), BackendError> {
        let body = AttachRequest {
            attachment: AttachmentBody {
                id: attachment_id,
                placement,
            },
        };

        let path = format!("{}/attachment", self.port_path(network_id, port_id));
        self.send(ctx, Method::PUT, &path, Some(&body)).await?;
        Ok(())
    }

    async fn unplug_interface(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
    ) -> Result<(), BackendError> {
        let path = format!("{}/attachment", self.port_path(network_id, port_id));
        self.send(ctx, Method::DELETE, &path, None::<&()>).await?;
        Ok(())
    }

    async fn get_port_by_attachment(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        attachment_id: &str,
    ) -> Result<Option<String>, BackendError> {
        let path = format!(
            "{}?attachment={}",
            self.ports_path(network_id),
            urlencoding::encode(attachment_id)
        );

        match self
            .api_request::<PortsResponse>(ctx, Method::GET, &path, None::<&()>)
            .await
        {
            Ok(response) => Ok(response.ports.into_iter().next().map(|p| p.id)),
            Err(BackendError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_port(
        &self,
        ctx: &RequestContext,
        network_id: &str,
        port_id: &str,
    ) -> Result<(), BackendError> {
        self.send(
            ctx,
            Method::DELETE,
            &self.port_path(network_id, port_id),
            None::<&()>,
        )
        .await?;
        Ok(())
    }
}
