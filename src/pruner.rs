use std::fmt;

use crate::catalog::PackageCatalog;
use crate::collector::select_candidates;
use crate::config::Config;
use crate::deleter::{Deleter, DeletionReport, Outcome};
use crate::errors::Result;
use crate::github::GithubClient;
use crate::reachability;
use crate::registry::RegistryClient;
use crate::resolver::ManifestResolver;
use crate::services::{DeletionService, ListingService, ManifestService};

/// The stages of a run. They execute strictly in this order, once each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Enumerate,
    Mark,
    Sweep,
    Delete,
    Report,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Enumerate => "enumerate",
            Phase::Mark => "mark",
            Phase::Sweep => "sweep",
            Phase::Delete => "delete",
            Phase::Report => "report",
        };
        f.write_str(s)
    }
}

/// Garbage-collects untagged container image versions of one owner.
///
/// Every package in scope is marked before the first deletion is attempted. Errors during
/// enumeration or marking abort the run; errors deleting individual versions are counted in the
/// returned [`DeletionReport`].
pub struct Pruner<L, M, D> {
    config: Config,
    listing: L,
    manifests: M,
    deletion: D,
}

impl Pruner<GithubClient, RegistryClient, GithubClient> {
    /// A pruner talking to the GitHub API and container registry named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let github = GithubClient::new(&config)?;
        let registry = RegistryClient::new(&config)?;
        Ok(Self::new(config, github.clone(), registry, github))
    }
}

impl<L, M, D> Pruner<L, M, D>
where
    L: ListingService,
    M: ManifestService,
    D: DeletionService,
{
    pub fn new(config: Config, listing: L, manifests: M, deletion: D) -> Self {
        Self {
            config,
            listing,
            manifests,
            deletion,
        }
    }

    /// Run all phases, printing one line per attempted deletion to stdout.
    pub async fn run(&self) -> Result<DeletionReport> {
        self.run_with(|line| println!("{line}")).await
    }

    /// Run all phases, handing each per-deletion status line to `out`.
    pub async fn run_with<F>(&self, mut out: F) -> Result<DeletionReport>
    where
        F: FnMut(&str),
    {
        let config = &self.config;
        let except_multiplatform = config.except_untagged_multiplatform;

        enter(Phase::Enumerate);
        let catalog = PackageCatalog::new(&self.listing, config);
        let mut resolver = ManifestResolver::new(&self.manifests, except_multiplatform);

        // enumeration is lazy; it is driven by the mark walk
        enter(Phase::Mark);
        let marked = reachability::build(&catalog, &mut resolver, except_multiplatform).await?;

        enter(Phase::Sweep);
        let candidates = select_candidates(&marked.untagged, &marked.index);
        tracing::info!(
            "{} of {} untagged versions are unreferenced",
            candidates.len(),
            marked.untagged.len()
        );

        enter(Phase::Delete);
        if config.dry_run {
            tracing::info!("dry run: no versions will be deleted");
        }
        let total = candidates.len();
        let deleter = Deleter::new(&self.deletion, config.dry_run);
        let report = deleter
            .delete_all(&candidates, config.delete_concurrency, |deletion, report| {
                out(&format!(
                    "[{}/{total}] Deleting {}: {}",
                    report.attempted(),
                    deletion.version.name,
                    deletion.detail
                ));
                if deletion.outcome == Outcome::Failure {
                    tracing::debug!("{} failures so far", report.failed);
                }
            })
            .await;

        enter(Phase::Report);
        tracing::info!("{} deletions, {} errors", report.succeeded, report.failed);
        Ok(report)
    }
}

fn enter(phase: Phase) {
    tracing::info!("entering {phase} phase");
}
