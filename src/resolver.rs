use std::collections::{HashMap, HashSet};

use crate::catalog::{Version, VersionId};
use crate::errors::Result;
use crate::registry::{ManifestRef, ManifestSpec};
use crate::services::ManifestService;

/// What a version's manifest says about other versions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Digests of the child manifests this version's manifest list depends on.
    pub dependencies: HashSet<String>,
    /// Whether the version's manifest is itself a multi-platform manifest list. Only known for
    /// versions whose manifest was actually fetched.
    pub is_manifest_list: bool,
}

/// Resolves the child-manifest dependencies of versions, fetching each manifest at most once per
/// run.
///
/// Untagged versions are leaves: they are only fetched when `inspect_untagged` is set, which is
/// needed to recognize untagged manifest lists.
pub struct ManifestResolver<'a, M: ManifestService + ?Sized> {
    manifests: &'a M,
    inspect_untagged: bool,
    memo: HashMap<VersionId, Resolution>,
}

impl<'a, M: ManifestService + ?Sized> ManifestResolver<'a, M> {
    pub fn new(manifests: &'a M, inspect_untagged: bool) -> Self {
        Self {
            manifests,
            inspect_untagged,
            memo: HashMap::new(),
        }
    }

    /// Resolve `version`, reusing the memoized result if it was already resolved.
    ///
    /// Fetch and parse failures are returned as errors.
    pub async fn resolve(&mut self, version: &Version) -> Result<&Resolution> {
        if !self.memo.contains_key(&version.id) {
            let resolution = self.fetch(version).await?;
            self.memo.insert(version.id, resolution);
        }
        Ok(&self.memo[&version.id])
    }

    /// The set of child digests `version` depends on. Empty for untagged versions and for
    /// single-platform manifests.
    pub async fn resolve_dependencies(&mut self, version: &Version) -> Result<HashSet<String>> {
        if !version.is_tagged() {
            return Ok(HashSet::new());
        }
        Ok(self.resolve(version).await?.dependencies.clone())
    }

    async fn fetch(&self, version: &Version) -> Result<Resolution> {
        if !version.is_tagged() && !self.inspect_untagged {
            return Ok(Resolution::default());
        }

        let reference: ManifestRef = version.name.parse()?;
        let repository = version.package.coordinate();
        tracing::debug!("resolving {repository}@{reference}");
        let body = self.manifests.fetch_manifest(&repository, &reference).await?;
        let spec = ManifestSpec::parse(&reference, &body)?;

        let dependencies = spec
            .child_digests()
            .into_iter()
            .filter(|d| *d != version.name)
            .map(String::from)
            .collect();

        Ok(Resolution {
            dependencies,
            is_manifest_list: spec.is_index(),
        })
    }

    pub fn resolved(&self) -> usize {
        self.memo.len()
    }
}
