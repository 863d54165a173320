//! Melange address pool client

use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use ipnet::IpNet;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use netstack_core::{AddressPool, AddressPoolConfig, AddressScope, BackendError, RequestContext};
use netstack_types::{Address, AddressBlock, MacAddr, NetworkId, ProjectId};

const SERVICE: &str = "melange";
const API_PREFIX: &str = "/v0.1/ipam";

#[derive(Debug, Deserialize)]
struct BlockResponse {
    ip_block: MelangeBlock,
}

#[derive(Debug, Deserialize)]
struct BlocksResponse {
    #[serde(default)]
    ip_blocks: Vec<MelangeBlock>,
}

#[derive(Debug, Deserialize)]
struct AddressesResponse {
    #[serde(default)]
    ip_addresses: Vec<MelangeAddress>,
}

#[derive(Debug, Clone, Deserialize)]
struct MelangeBlock {
    cidr: IpNet,
    #[serde(default)]
    network_id: Option<String>,
    #[serde(default)]
    netmask: Option<String>,
    #[serde(default)]
    gateway: Option<IpAddr>,
    #[serde(default)]
    broadcast: Option<IpAddr>,
}

impl MelangeBlock {
    /// Melange reports v6 netmasks as prefix lengths; only dotted masks are kept
    fn into_block(self) -> AddressBlock {
        let mut block = AddressBlock::new(self.cidr);
        block.netmask = self.netmask.and_then(|mask| mask.parse().ok());
        block.gateway = self.gateway;
        block.broadcast = self.broadcast;
        block
    }
}

impl BlocksResponse {
    fn find(self, network_id: NetworkId, cidr: IpNet) -> Option<MelangeBlock> {
        let network_id = network_id.to_string();
        self.ip_blocks
            .into_iter()
            .find(|b| b.cidr == cidr && b.network_id.as_deref() == Some(network_id.as_str()))
    }
}

#[derive(Debug, Deserialize)]
struct MelangeAddress {
    address: IpAddr,
    #[serde(default)]
    ip_block: Option<MelangeBlock>,
}

impl MelangeAddress {
    fn into_address(self) -> Address {
        let address = Address::new(self.address);
        match self.ip_block {
            Some(block) => address.with_block(block.into_block()),
            None => address,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateBlockRequest<'a> {
    ip_block: BlockBody<'a>,
}

#[derive(Debug, Serialize)]
struct BlockBody<'a> {
    network_id: String,
    cidr: String,
    #[serde(rename = "type")]
    block_type: &'a str,
}

#[derive(Debug, Serialize)]
struct AllocateRequest {
    network: AllocateBody,
}

#[derive(Debug, Serialize)]
struct AllocateBody {
    mac_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<ProjectId>,
}

/// Address pool client for the Melange IPAM REST API
pub struct MelangeClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl MelangeClient {
    pub fn new(config: &AddressPoolConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Melange URL is required"))?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    fn tenant_prefix(project_id: Option<&str>) -> String {
        match project_id {
            Some(project) => format!("{}/tenants/{}", API_PREFIX, urlencoding::encode(project)),
            None => API_PREFIX.to_string(),
        }
    }

    fn blocks_path(project_id: Option<&str>) -> String {
        format!("{}/ip_blocks", Self::tenant_prefix(project_id))
    }

    fn allocations_path(scope: &AddressScope) -> String {
        format!(
            "{}/networks/{}/interfaces/{}/ip_allocations",
            Self::tenant_prefix(scope.project_id.as_deref()),
            scope.network_id,
            scope.vif_id
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
impl AddressPool for MelangeClient {
    async fn create_block(
        &self,
        ctx: &RequestContext,
        network_id: NetworkId,
        cidr: IpNet,
        project_id: Option<ProjectId>,
    ) -> Result<AddressBlock, BackendError> {
        let path = Self::blocks_path(project_id.as_deref());
        let registered: BlocksResponse = match self
            .api_request(ctx, Method::GET, &path, None::<&()>)
            .await
        {
            Ok(response) => response,
            Err(BackendError::NotFound { .. }) => BlocksResponse {
                ip_blocks: Vec::new(),
            },
            Err(e) => return Err(e),
        };
        if let Some(existing) = registered.find(network_id, cidr) {
            log::debug!("[{}] Melange already holds block {}", ctx.request_id, cidr);
            return Ok(existing.into_block());
        }

        let body = CreateBlockRequest {
            ip_block: BlockBody {
                network_id: network_id.to_string(),
                cidr: cidr.to_string(),
                block_type: if project_id.is_some() { "private" } else { "public" },
            },
        };

        let response: BlockResponse = self
            .api_request(ctx, Method::POST, &path, Some(&body))
            .await?;

        log::info!("Melange registered block {} for network {}", cidr, network_id);
        Ok(response.ip_block.into_block())
    }

    async fn allocate_ip(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
        mac_address: MacAddr,
    ) -> Result<Vec<Address>, BackendError> {
        let body = AllocateRequest {
            network: AllocateBody {
                mac_address: mac_address.to_string(),
                tenant_id: scope.project_id.clone(),
            },
        };

        let response: AddressesResponse = self
            .api_request(ctx, Method::POST, &Self::allocations_path(scope), Some(&body))
            .await?;

        Ok(response
            .ip_addresses
            .into_iter()
            .map(MelangeAddress::into_address)
            .collect())
    }

    async fn deallocate_ips(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
    ) -> Result<(), BackendError> {
        match self
            .send(ctx, Method::DELETE, &Self::allocations_path(scope), None::<&()>)
            .await
        {
            Ok(_) => Ok(()),
            Err(BackendError::NotFound { .. }) => {
                log::debug!("Melange holds no allocations for {}", scope);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_allocated_ips(
        &self,
        ctx: &RequestContext,
        scope: &AddressScope,
    ) -> Result<Vec<Address>, BackendError> {
        let response: AddressesResponse = match self
            .api_request(ctx, Method::GET, &Self::allocations_path(scope), None::<&()>)
            .await
        {
            Ok(response) => response,
            Err(BackendError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(response
            .ip_addresses
            .into_iter()
            .map(MelangeAddress::into_address)
            .collect())
    }
}
