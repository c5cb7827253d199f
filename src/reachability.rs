//! Mark phase.
use std::collections::HashSet;

use futures::TryStreamExt;

use crate::catalog::{PackageCatalog, Version, VersionId};
use crate::errors::Result;
use crate::resolver::ManifestResolver;
use crate::services::{ListingService, ManifestService};

/// Digests referenced as children by tagged manifest lists anywhere in scope.
///
/// Only meaningful once built over every package in scope: a manifest list in one package may
/// reference a digest that is an untagged version of another.
#[derive(Clone, Debug, Default)]
pub struct ReachabilityIndex {
    digests: HashSet<String>,
    exempt: HashSet<VersionId>,
}

impl ReachabilityIndex {
    pub fn contains(&self, digest: &str) -> bool {
        self.digests.contains(digest)
    }

    /// Whether `version` must be kept: its name is a referenced digest, or it was exempted as an
    /// untagged manifest list.
    pub fn retains(&self, version: &Version) -> bool {
        self.contains(&version.name) || self.exempt.contains(&version.id)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn digests(&self) -> impl Iterator<Item = &str> {
        self.digests.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ReachabilityIndex {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            digests: iter.into_iter().map(Into::into).collect(),
            exempt: HashSet::new(),
        }
    }
}

/// Both results of the single traversal over every version in scope.
#[derive(Debug, Default)]
pub struct MarkOutput {
    pub index: ReachabilityIndex,
    /// Untagged versions in discovery order, each at most once.
    pub untagged: Vec<Version>,
    pub packages: usize,
    pub versions: usize,
}

/// Walk every version of every package in `catalog`, resolving dependencies and collecting
/// untagged versions.
///
/// With `except_untagged_multiplatform`, untagged versions that are manifest lists are exempted
/// and their children are marked reachable too, so the exempted lists stay intact.
///
/// Any listing or manifest error aborts the walk.
pub async fn build<L, M>(
    catalog: &PackageCatalog<'_, L>,
    resolver: &mut ManifestResolver<'_, M>,
    except_untagged_multiplatform: bool,
) -> Result<MarkOutput>
where
    L: ListingService + ?Sized,
    M: ManifestService + ?Sized,
{
    let mut out = MarkOutput::default();
    let mut seen_untagged: HashSet<VersionId> = HashSet::new();

    let mut packages = catalog.list_packages();
    while let Some(package) = packages.try_next().await? {
        out.packages += 1;
        tracing::info!("marking package {}", package.coordinate());

        let mut versions = catalog.list_versions(package);
        while let Some(version) = versions.try_next().await? {
            out.versions += 1;
            let resolution = resolver.resolve(&version).await?;

            if version.is_tagged() {
                out.index
                    .digests
                    .extend(resolution.dependencies.iter().cloned());
            } else {
                if except_untagged_multiplatform && resolution.is_manifest_list {
                    tracing::info!(
                        "exempting untagged manifest list {}@{}",
                        version.package.coordinate(),
                        version.name
                    );
                    out.index.exempt.insert(version.id);
                    out.index
                        .digests
                        .extend(resolution.dependencies.iter().cloned());
                }
                if seen_untagged.insert(version.id) {
                    out.untagged.push(version);
                }
            }
        }
    }

    tracing::info!(
        "marked {} reachable digests across {} versions in {} packages",
        out.index.len(),
        out.versions,
        out.packages
    );
    Ok(out)
}
