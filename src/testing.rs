//! In-memory stand-in for the package API and the container registry.
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;

use crate::catalog::VersionId;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::registry::ManifestRef;
use crate::services::{DeletionService, ListingService, ManifestService, Page, PageRequest};

const API_URL: &str = "https://api.fake";
const REGISTRY_URL: &str = "https://registry.fake";

struct FakePackage {
    name: String,
    repository: Option<String>,
    versions: Vec<serde_json::Value>,
}

#[derive(Default)]
struct State {
    packages: Vec<FakePackage>,
    manifests: HashMap<(String, String), Bytes>,
    delete_status: HashMap<u64, StatusCode>,
    broken_deletes: HashSet<u64>,
    deleted: Vec<VersionId>,
    delete_calls: usize,
    manifest_fetches: usize,
    page_requests: usize,
    fail_listing: bool,
    next_id: u64,
}

pub(crate) struct FakeRegistry {
    owner: String,
    state: Mutex<State>,
}

/// A syntactically valid digest derived from a short label, eg `digest("d1")`.
pub(crate) fn digest(label: &str) -> String {
    let hex: String = label.bytes().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{hex:0>64}")
}

impl FakeRegistry {
    pub(crate) fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    pub(crate) fn config(&self) -> Config {
        let mut config = Config::new("token", &self.owner);
        config.api_url = API_URL.to_string();
        config.registry_url = REGISTRY_URL.to_string();
        config
    }

    fn package_url(&self, name: &str) -> String {
        format!("{API_URL}/orgs/{}/packages/container/{name}", self.owner)
    }

    fn versions_url(&self, name: &str) -> String {
        format!("{}/versions", self.package_url(name))
    }

    pub(crate) fn add_package(&self, name: &str, repository: Option<&str>) {
        self.state.lock().unwrap().packages.push(FakePackage {
            name: name.to_string(),
            repository: repository.map(String::from),
            versions: Vec::new(),
        });
    }

    pub(crate) fn add_version(&self, package: &str, name: &str, tags: &[&str]) -> VersionId {
        let url_base = self.package_url(package);
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let pkg = state
            .packages
            .iter_mut()
            .find(|p| p.name == package)
            .expect("package added before its versions");
        pkg.versions.push(serde_json::json!({
            "id": id,
            "name": name,
            "url": format!("{url_base}/versions/{id}"),
            "metadata": { "package_type": "container", "container": { "tags": tags } },
        }));
        VersionId(id)
    }

    pub(crate) fn add_manifest(&self, package: &str, reference: &str, body: impl Into<Bytes>) {
        let repository = format!("{}/{package}", self.owner);
        self.state
            .lock()
            .unwrap()
            .manifests
            .insert((repository, reference.to_string()), body.into());
    }

    /// Register a multi-platform manifest list stored under `reference`.
    pub(crate) fn add_index(&self, package: &str, reference: &str, children: &[&str]) {
        let manifests: Vec<serde_json::Value> = children
            .iter()
            .map(|d| {
                serde_json::json!({
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "digest": d,
                    "size": 100,
                    "platform": { "architecture": "amd64", "os": "linux" },
                })
            })
            .collect();
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": manifests,
        });
        self.add_manifest(package, reference, body.to_string());
    }

    /// Register a single-platform image manifest stored under `reference`.
    pub(crate) fn add_image(&self, package: &str, reference: &str) {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": digest("config"),
                "size": 10,
            },
            "layers": [],
        });
        self.add_manifest(package, reference, body.to_string());
    }

    pub(crate) fn fail_delete(&self, id: VersionId, status: StatusCode) {
        let mut state = self.state.lock().unwrap();
        state.delete_status.insert(id.0, status);
    }

    pub(crate) fn break_delete(&self, id: VersionId) {
        self.state.lock().unwrap().broken_deletes.insert(id.0);
    }

    pub(crate) fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub(crate) fn deleted(&self) -> Vec<VersionId> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }

    pub(crate) fn manifest_fetches(&self) -> usize {
        self.state.lock().unwrap().manifest_fetches
    }

    pub(crate) fn page_requests(&self) -> usize {
        self.state.lock().unwrap().page_requests
    }
}

fn split_url(request: &PageRequest) -> (String, HashMap<String, String>) {
    let (base, query) = request
        .url
        .split_once('?')
        .unwrap_or((request.url.as_str(), ""));
    let mut params: HashMap<String, String> = query
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    params.extend(request.query.iter().cloned());
    (base.to_string(), params)
}

fn not_found(url: &str) -> Error {
    Error::UnexpectedStatus {
        status: StatusCode::NOT_FOUND,
        url: url.to_string(),
        body: String::new(),
    }
}

#[async_trait]
impl ListingService for FakeRegistry {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let mut state = self.state.lock().unwrap();
        state.page_requests += 1;
        if state.fail_listing {
            return Err(Error::UnexpectedStatus {
                status: StatusCode::FORBIDDEN,
                url: request.url.clone(),
                body: "Resource not accessible by integration".to_string(),
            });
        }

        let (base, params) = split_url(request);
        let page: usize = params
            .get("page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        let per_page: usize = params
            .get("per_page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(30);

        let packages_url = format!("{API_URL}/orgs/{}/packages", self.owner);
        let all: Vec<serde_json::Value> = if base == packages_url {
            state
                .packages
                .iter()
                .map(|p| {
                    let mut record = serde_json::json!({
                        "name": p.name,
                        "package_type": "container",
                        "url": self.package_url(&p.name),
                    });
                    if let Some(repo) = &p.repository {
                        record["repository"] = serde_json::json!({ "name": repo });
                    }
                    record
                })
                .collect()
        } else if let Some(pkg) = state
            .packages
            .iter()
            .find(|p| base == self.versions_url(&p.name))
        {
            pkg.versions.clone()
        } else {
            return Err(not_found(&request.url));
        };

        let start = (page - 1) * per_page;
        let records = all.iter().skip(start).take(per_page).cloned().collect();
        let next = (start + per_page < all.len())
            .then(|| format!("{base}?per_page={per_page}&page={}", page + 1));

        Ok(Page { records, next })
    }
}

#[async_trait]
impl ManifestService for FakeRegistry {
    async fn fetch_manifest(&self, repository: &str, reference: &ManifestRef) -> Result<Bytes> {
        let url = format!("{REGISTRY_URL}/v2/{repository}/manifests/{reference}");
        let mut state = self.state.lock().unwrap();
        state.manifest_fetches += 1;
        state
            .manifests
            .get(&(repository.to_string(), reference.to_string()))
            .cloned()
            .ok_or_else(|| not_found(&url))
    }
}

#[async_trait]
impl DeletionService for FakeRegistry {
    async fn delete(&self, url: &str) -> Result<StatusCode> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        let id: u64 = url
            .rsplit('/')
            .next()
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| not_found(url))?;

        if state.broken_deletes.contains(&id) {
            return Err(Error::IOError(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        if let Some(status) = state.delete_status.get(&id) {
            return Ok(*status);
        }

        for pkg in state.packages.iter_mut() {
            pkg.versions.retain(|v| v["id"] != id);
        }
        state.deleted.push(VersionId(id));
        Ok(StatusCode::NO_CONTENT)
    }
}
