//! Packages and their versions, as enumerated from the package metadata store.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::Deserialize;

use crate::config::Config;
use crate::errors::Result;
use crate::github::paginate;
use crate::services::{ListingService, PageRequest};

#[derive(Clone, Debug, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub url: String,
    pub repository: Option<RepositoryRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VersionRecord {
    pub id: u64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub metadata: Option<VersionMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VersionMetadata {
    pub container: Option<ContainerMetadata>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContainerMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A container image repository owned by an account.
#[derive(Clone, Debug)]
pub struct Package {
    pub name: String,
    pub owner: String,
    pub repository: Option<String>,
    url: String,
}

impl Package {
    pub fn new(owner: &str, record: PackageRecord) -> Self {
        Self {
            name: record.name,
            owner: owner.to_string(),
            repository: record.repository.map(|r| r.name),
            url: record.url,
        }
    }

    /// `<owner>/<name>`, the repository name of this package in the container registry.
    pub fn coordinate(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn versions_url(&self) -> String {
        format!("{}/versions", self.url.trim_end_matches('/'))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored image version of a [`Package`].
///
/// Equality and hashing consider only [`Version::id`]: two records with the same id describe
/// the same stored version even when other fields differ between fetches.
#[derive(Clone, Debug)]
pub struct Version {
    pub id: VersionId,
    /// Content name; for container versions this is the manifest digest.
    pub name: String,
    pub tags: Vec<String>,
    pub package: Arc<Package>,
    url: String,
}

impl Version {
    pub fn new(package: Arc<Package>, record: VersionRecord) -> Self {
        let tags = record
            .metadata
            .and_then(|m| m.container)
            .map(|c| c.tags)
            .unwrap_or_default();
        Self {
            id: VersionId(record.id),
            name: record.name,
            tags,
            package,
            url: record.url,
        }
    }

    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn deletion_url(&self) -> &str {
        &self.url
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Enumerates the container packages of one owner, narrowed by the configured filters.
pub struct PackageCatalog<'a, L: ListingService + ?Sized> {
    listing: &'a L,
    config: &'a Config,
}

impl<'a, L: ListingService + ?Sized> PackageCatalog<'a, L> {
    pub fn new(listing: &'a L, config: &'a Config) -> Self {
        Self { listing, config }
    }

    fn page_query(&self) -> Vec<(String, String)> {
        vec![
            ("per_page".to_string(), self.config.per_page.to_string()),
            ("page".to_string(), "1".to_string()),
        ]
    }

    /// Lazily list every container package of the owner that passes the repository and package
    /// name filters. Listing errors end the stream with an error.
    pub fn list_packages(&self) -> BoxStream<'a, Result<Arc<Package>>> {
        let url = format!(
            "{}/{}/{}/packages",
            self.config.api_url,
            self.config.owner_type.path_segment(),
            self.config.owner
        );
        let mut query = vec![("package_type".to_string(), "container".to_string())];
        query.extend(self.page_query());

        let config = self.config;
        let owner = config.owner.clone();
        paginate::<L, PackageRecord>(self.listing, PageRequest::first(url, query))
            .try_filter(move |record| future::ready(retains(config, record)))
            .map_ok(move |record| Arc::new(Package::new(&owner, record)))
            .boxed()
    }

    /// Lazily list every version of `package`.
    pub fn list_versions(&self, package: Arc<Package>) -> BoxStream<'a, Result<Version>> {
        let request = PageRequest::first(package.versions_url(), self.page_query());
        paginate::<L, VersionRecord>(self.listing, request)
            .map_ok(move |record| Version::new(package.clone(), record))
            .boxed()
    }
}

fn retains(config: &Config, record: &PackageRecord) -> bool {
    if !config.repo_name.is_empty() {
        let linked = record
            .repository
            .as_ref()
            .map(|r| r.name.to_lowercase())
            .unwrap_or_default();
        if linked != config.repo_name.to_lowercase() {
            return false;
        }
    }
    config.package_name.is_empty() || record.name == config.package_name
}
