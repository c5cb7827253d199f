//! GitHub Packages REST API: listing packages and versions, deleting versions.
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use http::StatusCode;
use reqwest::Client;

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::services::{DeletionService, ListingService, Page, PageRequest};

pub mod pagination;
pub use pagination::{next_link, paginate};

const MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Authenticated client for the GitHub REST API.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
}

impl GithubClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| Error::InvalidConfig("invalid token".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ListingService for GithubClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UnexpectedStatus { status, url, body });
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        let records: Vec<serde_json::Value> = response.json().await?;

        Ok(Page { records, next })
    }
}

#[async_trait]
impl DeletionService for GithubClient {
    async fn delete(&self, url: &str) -> Result<StatusCode> {
        let response = self.client.delete(url).send().await?;
        Ok(response.status())
    }
}
