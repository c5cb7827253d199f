//! # Remote Collaborators
//!
//! The pruning algorithm only ever talks to the outside world through the traits defined here:
//!
//! * [`ListingService`] returns pages of package and version records,
//! * [`ManifestService`] fetches image manifests from the container registry,
//! * [`DeletionService`] removes a package version.
//!
//! [`crate::github::GithubClient`] and [`crate::registry::RegistryClient`] implement them over
//! HTTP. Keeping the seams here lets the mark and sweep phases run against in-memory fakes.
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;

use crate::errors::Result;
use crate::registry::ManifestRef;

/// One request for a page of resource records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl PageRequest {
    pub fn first(url: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            query,
        }
    }

    /// Follow-up pages are addressed by the URL the service handed back verbatim; it already
    /// carries every query parameter needed.
    pub fn next(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }
}

/// A page of raw resource records and the reference to the page after it, if any.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub records: Vec<serde_json::Value>,
    pub next: Option<String>,
}

/// Paginated enumeration of remote resources.
#[async_trait]
pub trait ListingService: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page>;
}

/// Retrieval of raw manifest documents.
#[async_trait]
pub trait ManifestService: Send + Sync {
    /// Fetch the manifest stored under `reference` in the registry repository `repository`
    /// (`<owner>/<package>`).
    async fn fetch_manifest(&self, repository: &str, reference: &ManifestRef) -> Result<Bytes>;
}

/// Removal of a package version by its deletion URL.
#[async_trait]
pub trait DeletionService: Send + Sync {
    /// Issue the delete request and report the status the service answered with. Transport
    /// failures are returned as errors.
    async fn delete(&self, url: &str) -> Result<StatusCode>;
}

#[async_trait]
impl<T: ListingService + ?Sized> ListingService for &T {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        (**self).fetch_page(request).await
    }
}

#[async_trait]
impl<T: ManifestService + ?Sized> ManifestService for &T {
    async fn fetch_manifest(&self, repository: &str, reference: &ManifestRef) -> Result<Bytes> {
        (**self).fetch_manifest(repository, reference).await
    }
}

#[async_trait]
impl<T: DeletionService + ?Sized> DeletionService for &T {
    async fn delete(&self, url: &str) -> Result<StatusCode> {
        (**self).delete(url).await
    }
}
