use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_REGISTRY_URL: &str = "https://ghcr.io";

/// GitHub caps `per_page` at 100 and defaults to 30.
pub const MAX_PER_PAGE: u32 = 100;

/// The kind of account owning the packages, selecting between the `/orgs/...` and `/users/...`
/// package listing endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    #[default]
    Org,
    User,
}

impl OwnerType {
    pub fn path_segment(&self) -> &'static str {
        match self {
            OwnerType::Org => "orgs",
            OwnerType::User => "users",
        }
    }
}

/// Everything a pruning run needs to know, handed explicitly to each component.
#[derive(Clone, Debug)]
pub struct Config {
    pub token: String,
    pub owner: String,
    pub owner_type: OwnerType,
    /// Only consider packages linked to this repository. Empty means no filter.
    pub repo_name: String,
    /// Only consider the package with exactly this name. Empty means no filter.
    pub package_name: String,
    /// Keep untagged versions that are themselves multi-platform manifest lists.
    pub except_untagged_multiplatform: bool,
    pub dry_run: bool,
    pub api_url: String,
    pub registry_url: String,
    pub per_page: u32,
    pub request_timeout_secs: u64,
    pub delete_concurrency: usize,
}

impl Config {
    pub fn new(token: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            owner: owner.into(),
            owner_type: OwnerType::default(),
            repo_name: String::new(),
            package_name: String::new(),
            except_untagged_multiplatform: false,
            dry_run: false,
            api_url: DEFAULT_API_URL.to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            per_page: MAX_PER_PAGE,
            request_timeout_secs: 30,
            delete_concurrency: 1,
        }
    }

    /// Canonicalize user-supplied names.
    ///
    /// Owner, repository and package names are case-insensitive on GitHub so they are lowered
    /// here. The repository may be given in `owner/repo` form (as GitHub Actions exposes it), in
    /// which case the owner part must agree with [`Config::owner`].
    pub fn normalize(mut self) -> Result<Self> {
        self.owner = self.owner.to_lowercase();
        self.repo_name = self.repo_name.to_lowercase();
        self.package_name = self.package_name.to_lowercase();

        if let Some((owner, repo_name)) = self.repo_name.split_once('/') {
            if owner != self.owner {
                return Err(Error::InvalidConfig(format!(
                    "mismatch in repository: {} and owner: {}",
                    self.repo_name, self.owner
                )));
            }
            if repo_name.contains('/') {
                return Err(Error::InvalidConfig(format!(
                    "repository name has too many components: {}",
                    self.repo_name
                )));
            }
            self.repo_name = repo_name.to_string();
        }

        self.package_name = self.package_name.trim_matches('/').to_string();

        if self.owner.is_empty() {
            return Err(Error::InvalidConfig("owner must not be empty".to_string()));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(Error::InvalidConfig(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}, got {}",
                self.per_page
            )));
        }
        if self.delete_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "delete_concurrency must be at least 1".to_string(),
            ));
        }
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        self.registry_url = self.registry_url.trim_end_matches('/').to_string();

        Ok(self)
    }

    /// Overlay tunables from a config file. Only fields present in the file are changed.
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(api_url) = file.api_url {
            self.api_url = api_url;
        }
        if let Some(registry_url) = file.registry_url {
            self.registry_url = registry_url;
        }
        if let Some(per_page) = file.per_page {
            self.per_page = per_page;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(n) = file.delete_concurrency {
            self.delete_concurrency = n;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Host name used as the `service` of registry token requests.
    pub fn registry_service(&self) -> &str {
        let url = self.registry_url.as_str();
        let url = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        url.trim_end_matches('/')
    }
}

/// Optional tunables read from a YAML file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub registry_url: Option<String>,
    pub per_page: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub delete_concurrency: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut f = File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Ok(serde_yaml::from_str(&s)?)
    }
}

/// Parse the textual boolean forms accepted on the command line.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "y" | "1" | "on" => Ok(true),
        "no" | "false" | "n" | "0" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig(format!(
            "boolean value expected, got {value:?}"
        ))),
    }
}
