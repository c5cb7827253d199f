//! Container registry access: manifest documents and the token handshake needed to read them.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, WWW_AUTHENTICATE};
use http::StatusCode;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::services::ManifestService;

pub mod manifests;
pub use manifests::{ManifestRef, ManifestSpec};

/// Where pull tokens are issued, as announced by a `WWW-Authenticate: Bearer` challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub service: Option<String>,
}

impl Challenge {
    /// Parse a `Bearer realm="..",service=".."` challenge. Other schemes and challenges without
    /// a realm yield `None`.
    pub fn parse(header: &str) -> Option<Self> {
        static PARAM: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#)
                .expect("challenge pattern is valid")
        });

        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let mut realm = None;
        let mut service = None;
        for cap in PARAM.captures_iter(params) {
            match &cap[1] {
                "realm" => realm = Some(cap[2].to_string()),
                "service" => service = Some(cap[2].to_string()),
                _ => {}
            }
        }
        Some(Self {
            realm: realm?,
            service,
        })
    }
}

/// Reads manifests from an OCI distribution API (ghcr.io by default).
///
/// A repository's first manifest request is sent without credentials. The registry's 401
/// challenge names the token realm, where a pull token is requested with the account's
/// credentials and then reused for the rest of the run. Registries that send no challenge get
/// `<registry_url>/token`.
#[derive(Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    service: String,
    username: String,
    password: String,
    tokens: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

impl RegistryClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.registry_url.clone(),
            service: config.registry_service().to_string(),
            username: config.owner.clone(),
            password: config.token.clone(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn default_challenge(&self) -> Challenge {
        Challenge {
            realm: format!("{}/token", self.base_url),
            service: Some(self.service.clone()),
        }
    }

    async fn cached_token(&self, repository: &str) -> Option<String> {
        self.tokens.lock().await.get(repository).cloned()
    }

    async fn request_token(&self, repository: &str, challenge: &Challenge) -> Result<String> {
        tracing::debug!(
            "requesting pull token for {repository} from {}",
            challenge.realm
        );
        let scope = format!("repository:{repository}:pull");
        let mut query = vec![("scope", scope.as_str())];
        if let Some(service) = &challenge.service {
            query.push(("service", service.as_str()));
        }
        let response = self
            .client
            .get(&challenge.realm)
            .query(&query)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(
                "token request for {repository} failed with {}",
                response.status()
            );
            return Err(Error::RegistryAuthError(repository.to_string()));
        }

        let body: TokenResponse = response.json().await?;
        let token = body
            .token
            .or(body.access_token)
            .ok_or_else(|| Error::RegistryAuthError(repository.to_string()))?;
        self.tokens
            .lock()
            .await
            .insert(repository.to_string(), token.clone());
        Ok(token)
    }
}

#[async_trait]
impl ManifestService for RegistryClient {
    async fn fetch_manifest(&self, repository: &str, reference: &ManifestRef) -> Result<Bytes> {
        let url = format!("{}/v2/{repository}/manifests/{reference}", self.base_url);
        let mut token = self.cached_token(repository).await;
        let mut authenticated = false;
        loop {
            tracing::debug!("fetching manifest {url}");
            let mut request = self
                .client
                .get(&url)
                .header(ACCEPT, manifests::accepted_media_types());
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            let response = request.send().await?;

            let status = response.status();
            // no token yet, or the cached one expired; authenticate once
            if status == StatusCode::UNAUTHORIZED && !authenticated {
                authenticated = true;
                let challenge = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(Challenge::parse)
                    .unwrap_or_else(|| self.default_challenge());
                token = Some(self.request_token(repository, &challenge).await?);
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::UnexpectedStatus { status, url, body });
            }
            return Ok(response.bytes().await?);
        }
    }
}
