use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flows::{Registration, ResourceRegistrar};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::domain::{RequestId, ResourceRef, User};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeycloakConfig {
    pub base_url: Url,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct ResourceSet<'a> {
    name: String,
    #[serde(rename = "type")]
    kind: &'a str,
    owner: String,
    #[serde(rename = "ownerManagedAccess")]
    owner_managed_access: bool,
    resource_scopes: [&'a str; 2],
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    #[serde(rename = "_id")]
    id: String,
}

/// Registers one UMA resource per request with Keycloak's protection API.
pub struct KeycloakRegistrar {
    http: Client,
    config: KeycloakConfig,
}

impl KeycloakRegistrar {
    pub fn new(config: KeycloakConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn realm_url(&self, path: &str) -> Result<Url> {
        self.config
            .base_url
            .join(&format!("realms/{}/{path}", self.config.realm))
            .with_context(|| format!("invalid keycloak path '{path}'"))
    }

    async fn access_token(&self) -> Result<String> {
        let token: TokenResponse = self
            .http
            .post(self.realm_url("protocol/openid-connect/token")?)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .context("keycloak token request failed")?
            .json()
            .await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ResourceRegistrar for KeycloakRegistrar {
    async fn register(&self, request_id: RequestId, owner: &User) -> Result<Registration> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.realm_url("authz/protection/resource_set")?)
            .bearer_auth(token)
            .json(&ResourceSet {
                name: format!("request-{request_id}"),
                kind: "urn:requests:resources:request",
                owner: owner.id.to_string(),
                owner_managed_access: true,
                resource_scopes: ["view", "edit"],
            })
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            info!(%request_id, "keycloak: resource already registered");
            return Ok(Registration::AlreadyExists);
        }

        let created: CreatedResource = response
            .error_for_status()
            .map_err(|e| anyhow!("keycloak resource registration failed: {e}"))?
            .json()
            .await?;
        debug!(%request_id, resource = %created.id, "keycloak: resource registered");
        Ok(Registration::Created(ResourceRef(created.id)))
    }
}

/// In-process registrar for deployments without an authorization server.
#[derive(Default)]
pub struct LocalRegistrar {
    registered: Mutex<HashSet<RequestId>>,
}

#[async_trait]
impl ResourceRegistrar for LocalRegistrar {
    async fn register(&self, request_id: RequestId, _owner: &User) -> Result<Registration> {
        if !self.registered.lock().await.insert(request_id) {
            return Ok(Registration::AlreadyExists);
        }
        Ok(Registration::Created(ResourceRef(format!(
            "local:request-{request_id}"
        ))))
    }
}

#[cfg(test)]
#[path = "tests/keycloak_tests.rs"]
mod tests;
