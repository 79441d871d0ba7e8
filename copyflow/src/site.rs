//! Sequential driver that rewrites every page of a site.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::errors::Result;
use crate::repository::{ContentRepository, Page, PageId, SiteHandle};
use crate::rewriter::{PageRewriter, RewriteState};

/// What happened to one page during a site run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    /// Repository id.
    pub id: PageId,
    /// Page title.
    pub title: String,
    /// Terminal rewrite state.
    pub state: RewriteState,
    /// Texts rewritten.
    pub texts_rewritten: u32,
    /// Texts selected.
    pub texts_total: u32,
    /// Whether new content was written back.
    pub persisted: bool,
}

/// Totals for one site run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRewriteSummary {
    /// Identifies this run in logs.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Pages discovered.
    pub pages_total: usize,
    /// Pages whose new content was persisted.
    pub pages_rewritten: usize,
    /// Pages with nothing to write: no copy found, dry run, or no change.
    pub pages_skipped: usize,
    /// Pages that failed to rewrite or to persist.
    pub pages_failed: usize,
    /// Errors, prefixed with the page title.
    pub errors: Vec<String>,
    /// Per-page outcomes, in processing order.
    pub pages: Vec<PageReport>,
    /// True when the run stopped early on cancellation.
    pub cancelled: bool,
}

impl SiteRewriteSummary {
    fn new(pages_total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            pages_total,
            pages_rewritten: 0,
            pages_skipped: 0,
            pages_failed: 0,
            errors: Vec::new(),
            pages: Vec::new(),
            cancelled: false,
        }
    }

    /// Pages not reached because the run was cancelled.
    #[must_use]
    pub fn pages_remaining(&self) -> usize {
        self.pages_total.saturating_sub(self.pages.len())
    }
}

/// Rewrites a whole site, one page at a time.
#[derive(Clone)]
pub struct SiteRewriter {
    repository: Arc<dyn ContentRepository>,
    rewriter: PageRewriter,
    token: Option<Arc<CancellationToken>>,
}

impl std::fmt::Debug for SiteRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteRewriter")
            .field("rewriter", &self.rewriter)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl SiteRewriter {
    /// Creates a driver over `repository`.
    #[must_use]
    pub fn new(repository: Arc<dyn ContentRepository>, rewriter: PageRewriter) -> Self {
        Self {
            repository,
            rewriter,
            token: None,
        }
    }

    /// Stops the run before the next page once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    fn check_cancelled(&self) -> Result<()> {
        self.token.as_ref().map_or(Ok(()), |t| t.check())
    }

    /// Discovers, rewrites and persists every page of `site`.
    ///
    /// Only a failure to list pages is an error. Everything else is recorded
    /// in the summary against the page it happened on.
    pub async fn run(&self, site: &SiteHandle) -> Result<SiteRewriteSummary> {
        let pages = self.repository.discover_pages(site).await?;
        let homepage = match self.repository.get_homepage_id(site).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not read the front page, keeping discovery order");
                None
            }
        };
        let pages = homepage_first(pages, homepage);

        let mut summary = SiteRewriteSummary::new(pages.len());
        info!(run_id = %summary.run_id, pages = pages.len(), "Starting site rewrite");

        for page in &pages {
            if let Err(e) = self.check_cancelled() {
                summary.cancelled = true;
                warn!(
                    run_id = %summary.run_id,
                    remaining = summary.pages_remaining(),
                    error = %e,
                    "Site rewrite cancelled"
                );
                summary.errors.push(e.to_string());
                break;
            }
            self.process_page(site, page, &mut summary).await;
        }

        info!(
            run_id = %summary.run_id,
            rewritten = summary.pages_rewritten,
            skipped = summary.pages_skipped,
            failed = summary.pages_failed,
            "Site rewrite finished"
        );
        Ok(summary)
    }

    async fn process_page(&self, site: &SiteHandle, page: &Page, summary: &mut SiteRewriteSummary) {
        let result = self.rewriter.rewrite_page(page).await;
        let mut report = PageReport {
            id: page.id,
            title: page.title.clone(),
            state: result.state,
            texts_rewritten: result.texts_rewritten,
            texts_total: result.texts_total,
            persisted: false,
        };
        summary
            .errors
            .extend(result.errors.iter().map(|e| format!("{}: {e}", page.title)));

        if result.state == RewriteState::Failed {
            summary.pages_failed += 1;
            summary.pages.push(report);
            return;
        }
        let Some(content) = result.changed_content() else {
            summary.pages_skipped += 1;
            summary.pages.push(report);
            return;
        };
        if self.is_cancelled() {
            info!(page_id = page.id, "Cancelled before saving, page left unchanged");
            summary.cancelled = true;
            summary.pages_skipped += 1;
            summary.pages.push(report);
            return;
        }

        match self.repository.update_page_content(site, page.id, content).await {
            Ok(()) => {
                report.persisted = true;
                summary.pages_rewritten += 1;
            }
            Err(e) => {
                warn!(page_id = page.id, page_title = %page.title, error = %e, "Failed to save page");
                summary.errors.push(format!("{}: {e}", page.title));
                summary.pages_failed += 1;
            }
        }
        summary.pages.push(report);
    }
}

/// Moves the page with id `homepage` to the front, keeping the others in order.
fn homepage_first(mut pages: Vec<Page>, homepage: Option<PageId>) -> Vec<Page> {
    if let Some(position) = homepage.and_then(|id| pages.iter().position(|p| p.id == id)) {
        let home = pages.remove(position);
        pages.insert(0, home);
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewriteConfig;
    use crate::errors::CopyflowError;
    use crate::repository::MockContentRepository;
    use crate::testing::MockTextService;

    fn pages() -> Vec<Page> {
        vec![
            Page::new(3, "About", "<p>We fix leaking pipes</p>"),
            Page::new(7, "Home", "<h1>Plumbers you can trust</h1>"),
            Page::new(9, "Legal", "<p>123</p>"),
        ]
    }

    fn driver(repo: MockContentRepository, config: RewriteConfig) -> (SiteRewriter, Arc<MockTextService>) {
        let service = Arc::new(MockTextService::mapping(str::to_uppercase));
        let rewriter = PageRewriter::new(service.clone(), config);
        (SiteRewriter::new(Arc::new(repo), rewriter), service)
    }

    #[tokio::test]
    async fn test_homepage_first_and_only_changed_pages_saved() {
        let mut repo = MockContentRepository::new();
        repo.expect_discover_pages().returning(|_| Ok(pages()));
        repo.expect_get_homepage_id().returning(|_| Ok(Some(7)));
        repo.expect_update_page_content()
            .withf(|_, id, content| *id == 7 && content == "<h1>PLUMBERS YOU CAN TRUST</h1>")
            .times(1)
            .returning(|_, _, _| Ok(()));
        repo.expect_update_page_content()
            .withf(|_, id, content| *id == 3 && content == "<p>WE FIX LEAKING PIPES</p>")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (driver, service) = driver(repo, RewriteConfig::default());
        let summary = driver.run(&SiteHandle::new("/srv/site")).await.unwrap();

        assert_eq!(summary.pages_total, 3);
        assert_eq!(summary.pages_rewritten, 2);
        assert_eq!(summary.pages_skipped, 1);
        assert_eq!(summary.pages_failed, 0);
        assert!(!summary.cancelled);
        let order: Vec<PageId> = summary.pages.iter().map(|p| p.id).collect();
        assert_eq!(order, vec![7, 3, 9]);
        assert_eq!(summary.pages[2].state, RewriteState::Skipped);
        assert!(!summary.pages[2].persisted);
        assert!(service.user_prompts()[0].contains("Plumbers you can trust"));
    }

    #[tokio::test]
    async fn test_save_failure_is_recorded_against_page() {
        let mut repo = MockContentRepository::new();
        repo.expect_discover_pages().returning(|_| Ok(pages()));
        repo.expect_get_homepage_id().returning(|_| Ok(None));
        repo.expect_update_page_content()
            .withf(|_, id, _| *id == 3)
            .returning(|_, _, _| Err(CopyflowError::repository("disk full")));
        repo.expect_update_page_content()
            .withf(|_, id, _| *id == 7)
            .returning(|_, _, _| Ok(()));

        let (driver, _) = driver(repo, RewriteConfig::default());
        let summary = driver.run(&SiteHandle::new("/srv/site")).await.unwrap();

        assert_eq!(summary.pages_failed, 1);
        assert_eq!(summary.pages_rewritten, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].starts_with("About: "));
        assert!(summary.errors[0].contains("disk full"));
        assert!(!summary.pages[0].persisted);
        assert!(summary.pages[1].persisted);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_an_error() {
        let mut repo = MockContentRepository::new();
        repo.expect_discover_pages()
            .returning(|_| Err(CopyflowError::repository("wp not found")));

        let (driver, service) = driver(repo, RewriteConfig::default());
        let err = driver.run(&SiteHandle::new("/srv/site")).await.unwrap_err();
        assert!(matches!(err, CopyflowError::Repository(_)));
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_homepage_lookup_failure_keeps_order() {
        let mut repo = MockContentRepository::new();
        repo.expect_discover_pages().returning(|_| Ok(pages()));
        repo.expect_get_homepage_id()
            .returning(|_| Err(CopyflowError::repository("option missing")));
        repo.expect_update_page_content().returning(|_, _, _| Ok(()));

        let (driver, _) = driver(repo, RewriteConfig::default());
        let summary = driver.run(&SiteHandle::new("/srv/site")).await.unwrap();
        let order: Vec<PageId> = summary.pages.iter().map(|p| p.id).collect();
        assert_eq!(order, vec![3, 7, 9]);
    }

    #[tokio::test]
    async fn test_dry_run_never_saves() {
        let mut repo = MockContentRepository::new();
        repo.expect_discover_pages().returning(|_| Ok(pages()));
        repo.expect_get_homepage_id().returning(|_| Ok(Some(7)));
        repo.expect_update_page_content().never();

        let (driver, service) = driver(repo, RewriteConfig::default().with_dry_run(true));
        let summary = driver.run(&SiteHandle::new("/srv/site")).await.unwrap();

        assert_eq!(summary.pages_skipped, 3);
        assert_eq!(summary.pages[0].state, RewriteState::DryRun);
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_next_page() {
        let mut repo = MockContentRepository::new();
        repo.expect_discover_pages().returning(|_| Ok(pages()));
        repo.expect_get_homepage_id().returning(|_| Ok(None));
        repo.expect_update_page_content().never();

        let token = Arc::new(CancellationToken::new());
        token.cancel("shutdown");
        let (driver, service) = driver(repo, RewriteConfig::default());
        let summary = driver
            .with_cancellation(token)
            .run(&SiteHandle::new("/srv/site"))
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert!(summary.pages.is_empty());
        assert_eq!(summary.pages_remaining(), 3);
        assert_eq!(summary.errors, vec!["Rewrite cancelled: shutdown".to_string()]);
        assert_eq!(service.call_count(), 0);
    }

    #[test]
    fn test_homepage_first() {
        let ids = |pages: Vec<Page>| pages.iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(ids(homepage_first(pages(), Some(9))), vec![9, 3, 7]);
        assert_eq!(ids(homepage_first(pages(), Some(42))), vec![3, 7, 9]);
        assert_eq!(ids(homepage_first(pages(), None)), vec![3, 7, 9]);
    }
}
