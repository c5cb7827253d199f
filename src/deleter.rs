use std::process::ExitCode;

use futures::stream::{self, StreamExt};
use http::StatusCode;

use crate::catalog::Version;
use crate::services::DeletionService;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// The result of attempting to delete one version.
#[derive(Clone, Debug)]
pub struct Deletion {
    pub version: Version,
    pub outcome: Outcome,
    /// Human readable status: `OK`, `Dry Run`, or why the delete failed.
    pub detail: String,
}

/// Aggregate counts of a delete phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl DeletionReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.succeeded += 1,
            Outcome::Failure => self.failed += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// True when no attempted deletion failed, including when none were attempted.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// The closing lines of a run.
    pub fn summary(&self) -> [String; 2] {
        [
            format!("{} Deletions", self.succeeded),
            format!("{} Errors", self.failed),
        ]
    }

    /// Process status for a finished run: failure if any deletion failed.
    pub fn exit_code(&self) -> ExitCode {
        if self.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Deletes versions one request each, never retrying. In dry-run mode no request is issued and
/// every deletion reports success.
pub struct Deleter<'a, D: DeletionService + ?Sized> {
    service: &'a D,
    dry_run: bool,
}

impl<'a, D: DeletionService + ?Sized> Deleter<'a, D> {
    pub fn new(service: &'a D, dry_run: bool) -> Self {
        Self { service, dry_run }
    }

    /// Attempt to delete `version`. Only an explicit `204 No Content` counts as success; any
    /// other status or a transport error is a failure. Errors never escape.
    pub async fn delete(&self, version: &Version) -> Deletion {
        let (outcome, detail) = if self.dry_run {
            (Outcome::Success, "Dry Run".to_string())
        } else {
            match self.service.delete(version.deletion_url()).await {
                Ok(StatusCode::NO_CONTENT) => (Outcome::Success, "OK".to_string()),
                Ok(status) => {
                    let reason = status
                        .canonical_reason()
                        .map(String::from)
                        .unwrap_or_else(|| status.to_string());
                    tracing::warn!(
                        "deleting {}@{} answered {status}",
                        version.package.coordinate(),
                        version.name
                    );
                    (Outcome::Failure, reason)
                }
                Err(e) => {
                    tracing::warn!(
                        "deleting {}@{} failed: {e}",
                        version.package.coordinate(),
                        version.name
                    );
                    (Outcome::Failure, e.to_string())
                }
            }
        };

        Deletion {
            version: version.clone(),
            outcome,
            detail,
        }
    }

    /// Delete every candidate, at most `concurrency` at a time, calling `on_done` for each
    /// finished deletion in candidate order. A failed deletion does not stop the others.
    pub async fn delete_all<F>(
        &self,
        candidates: &[Version],
        concurrency: usize,
        mut on_done: F,
    ) -> DeletionReport
    where
        F: FnMut(&Deletion, &DeletionReport),
    {
        let mut report = DeletionReport::default();
        let mut deletions = stream::iter(candidates)
            .map(|v| self.delete(v))
            .buffered(concurrency.max(1));

        while let Some(deletion) = deletions.next().await {
            report.record(deletion.outcome);
            on_done(&deletion, &report);
        }
        report
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use futures::TryStreamExt;
    use rstest::*;

    use super::*;
    use crate::catalog::PackageCatalog;
    use crate::testing::{digest, FakeRegistry};

    async fn versions(fake: &FakeRegistry) -> Vec<Version> {
        let config = fake.config();
        let catalog = PackageCatalog::new(fake, &config);
        let packages: Vec<Arc<_>> = catalog.list_packages().try_collect().await.unwrap();
        catalog
            .list_versions(packages[0].clone())
            .try_collect()
            .await
            .unwrap()
    }

    fn three_untagged() -> FakeRegistry {
        let fake = FakeRegistry::new("acme");
        fake.add_package("app", None);
        for d in ["a", "b", "c"] {
            fake.add_version("app", &digest(d), &[]);
        }
        fake
    }

    #[tokio::test]
    async fn dry_run_never_calls_the_service() {
        let fake = three_untagged();
        let vs = versions(&fake).await;
        let deleter = Deleter::new(&fake, true);

        let report = deleter.delete_all(&vs, 2, |_, _| {}).await;
        assert_eq!((report.succeeded, report.failed), (3, 0));
        assert_eq!(fake.delete_calls(), 0);
        assert!(fake.deleted().is_empty());
    }

    #[rstest]
    #[case::sequential(1)]
    #[case::concurrent(3)]
    #[tokio::test]
    async fn failures_do_not_stop_siblings(#[case] concurrency: usize) {
        let fake = three_untagged();
        let vs = versions(&fake).await;
        fake.fail_delete(vs[0].id, StatusCode::INTERNAL_SERVER_ERROR);
        let deleter = Deleter::new(&fake, false);

        let mut seen = Vec::new();
        let report = deleter
            .delete_all(&vs, concurrency, |d, _| {
                seen.push((d.version.id, d.outcome, d.detail.clone()));
            })
            .await;

        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert!(!report.is_clean());
        assert_eq!(fake.delete_calls(), 3);
        assert_eq!(fake.deleted(), vec![vs[1].id, vs[2].id]);
        assert_eq!(
            seen,
            vec![
                (vs[0].id, Outcome::Failure, "Internal Server Error".to_string()),
                (vs[1].id, Outcome::Success, "OK".to_string()),
                (vs[2].id, Outcome::Success, "OK".to_string()),
            ]
        );
    }

    #[rstest]
    #[case::accepted_is_not_confirmation(StatusCode::ACCEPTED)]
    #[case::ok_is_not_confirmation(StatusCode::OK)]
    #[case::forbidden(StatusCode::FORBIDDEN)]
    #[case::not_found(StatusCode::NOT_FOUND)]
    #[tokio::test]
    async fn only_no_content_is_success(#[case] status: StatusCode) {
        let fake = three_untagged();
        let vs = versions(&fake).await;
        fake.fail_delete(vs[1].id, status);

        let deletion = Deleter::new(&fake, false).delete(&vs[1]).await;
        assert_eq!(deletion.outcome, Outcome::Failure);
    }

    #[tokio::test]
    async fn transport_errors_are_failures() {
        let fake = three_untagged();
        let vs = versions(&fake).await;
        fake.break_delete(vs[2].id);

        let deleter = Deleter::new(&fake, false);
        let report = deleter.delete_all(&vs, 1, |_, _| {}).await;
        assert_eq!((report.succeeded, report.failed), (2, 1));
    }

    #[test]
    fn empty_report_is_clean() {
        let report = DeletionReport::default();
        assert!(report.is_clean());
        assert_eq!(report.attempted(), 0);
    }

    #[rstest]
    #[case::nothing_attempted(0, 0, "0 Deletions", "0 Errors", ExitCode::SUCCESS)]
    #[case::all_deleted(3, 0, "3 Deletions", "0 Errors", ExitCode::SUCCESS)]
    #[case::one_of_three_failed(2, 1, "2 Deletions", "1 Errors", ExitCode::FAILURE)]
    #[case::all_failed(0, 2, "0 Deletions", "2 Errors", ExitCode::FAILURE)]
    fn summary_and_exit_code(
        #[case] succeeded: usize,
        #[case] failed: usize,
        #[case] deletions: &str,
        #[case] errors: &str,
        #[case] code: ExitCode,
    ) {
        let report = DeletionReport { succeeded, failed };
        assert_eq!(report.summary(), [deletions, errors]);
        assert_eq!(report.exit_code(), code);
    }
}
