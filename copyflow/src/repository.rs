//! Content repository seam.
//!
//! The rewriter only reads and writes page content. Where pages come from is
//! behind [`ContentRepository`]; [`WpCliRepository`] drives a WordPress
//! install through the `wp` command-line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::errors::{CopyflowError, Result};

/// Page identifier in the repository.
pub type PageId = u64;

/// One page of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Repository id.
    pub id: PageId,
    /// Human-readable title.
    pub title: String,
    /// Stored markup.
    pub content: String,
}

impl Page {
    /// Creates a page.
    #[must_use]
    pub fn new(id: PageId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Identifies the site a repository call acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteHandle {
    /// Install directory.
    pub path: PathBuf,
    /// Site URL, for multisite installs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SiteHandle {
    /// Creates a handle for the install at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
        }
    }

    /// Targets one site of a multisite install.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Where pages are read from and written back to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Lists every page of the site with its content.
    async fn discover_pages(&self, site: &SiteHandle) -> Result<Vec<Page>>;

    /// The id of the static front page, if the site has one.
    async fn get_homepage_id(&self, site: &SiteHandle) -> Result<Option<PageId>>;

    /// Replaces the stored content of one page.
    async fn update_page_content(&self, site: &SiteHandle, id: PageId, content: &str) -> Result<()>;
}

/// Default time allowed for one `wp` invocation.
const DEFAULT_WP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct WpPostRow {
    #[serde(rename = "ID")]
    id: PageId,
    #[serde(default)]
    post_title: String,
    #[serde(default)]
    post_content: String,
}

/// Repository backed by the `wp` CLI.
///
/// Page content is always written through the child's stdin, never as a
/// command-line argument.
#[derive(Debug, Clone)]
pub struct WpCliRepository {
    wp_binary: PathBuf,
    timeout: Duration,
    allow_root: bool,
}

impl Default for WpCliRepository {
    fn default() -> Self {
        Self::new("wp")
    }
}

impl WpCliRepository {
    /// Uses the given `wp` executable.
    #[must_use]
    pub fn new(wp_binary: impl Into<PathBuf>) -> Self {
        Self {
            wp_binary: wp_binary.into(),
            timeout: DEFAULT_WP_TIMEOUT,
            allow_root: false,
        }
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Passes `--allow-root` to every command.
    #[must_use]
    pub const fn with_allow_root(mut self, allow_root: bool) -> Self {
        self.allow_root = allow_root;
        self
    }

    /// The executable in use.
    #[must_use]
    pub fn wp_binary(&self) -> &Path {
        &self.wp_binary
    }

    fn site_args(&self, site: &SiteHandle) -> Vec<String> {
        let mut args = vec![format!("--path={}", site.path.display())];
        if let Some(url) = &site.url {
            args.push(format!("--url={url}"));
        }
        if self.allow_root {
            args.push("--allow-root".to_string());
        }
        args
    }

    /// Runs `wp` with `args`, optionally feeding `stdin`, and returns stdout.
    async fn run(&self, site: &SiteHandle, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let mut command = Command::new(&self.wp_binary);
        command
            .args(args)
            .args(self.site_args(site))
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(wp = %self.wp_binary.display(), ?args, "Executing wp command");

        let execution = async {
            let mut child = command.spawn()?;
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            Ok::<_, std::io::Error>(child.wait_with_output().await?)
        };

        let output = match tokio::time::timeout(self.timeout, execution).await {
            Ok(result) => result.map_err(|e| {
                CopyflowError::repository(format!("failed to run {}: {e}", self.wp_binary.display()))
            })?,
            Err(_) => {
                return Err(CopyflowError::repository(format!(
                    "wp {} timed out after {}s",
                    args.first().copied().unwrap_or_default(),
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                exit_code = ?output.status.code(),
                stderr = %stderr,
                "wp command failed"
            );
            return Err(CopyflowError::repository(format!(
                "wp {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| CopyflowError::repository(format!("wp output is not UTF-8: {e}")))
    }
}

fn parse_page_list(stdout: &str) -> Result<Vec<Page>> {
    let rows: Vec<WpPostRow> = serde_json::from_str(stdout.trim())
        .map_err(|e| CopyflowError::repository(format!("failed to parse wp post list output: {e}")))?;
    Ok(rows
        .into_iter()
        .map(|row| Page::new(row.id, row.post_title, row.post_content))
        .collect())
}

fn parse_front_page(stdout: &str) -> Option<PageId> {
    stdout.trim().parse::<PageId>().ok().filter(|id| *id != 0)
}

#[async_trait]
impl ContentRepository for WpCliRepository {
    #[instrument(level = "debug", skip(self))]
    async fn discover_pages(&self, site: &SiteHandle) -> Result<Vec<Page>> {
        let stdout = self
            .run(
                site,
                &[
                    "post",
                    "list",
                    "--post_type=page",
                    "--post_status=publish",
                    "--format=json",
                    "--fields=ID,post_title,post_content",
                ],
                None,
            )
            .await?;
        parse_page_list(&stdout)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_homepage_id(&self, site: &SiteHandle) -> Result<Option<PageId>> {
        let stdout = self.run(site, &["option", "get", "page_on_front"], None).await?;
        Ok(parse_front_page(&stdout))
    }

    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    async fn update_page_content(&self, site: &SiteHandle, id: PageId, content: &str) -> Result<()> {
        let id = id.to_string();
        self.run(site, &["post", "update", &id, "-"], Some(content)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_list() {
        let stdout = r#"[{"ID":2,"post_title":"Home","post_content":"<p>Hi there</p>"},{"ID":9,"post_title":"About","post_content":""}]"#;
        let pages = parse_page_list(stdout).unwrap();
        assert_eq!(
            pages,
            vec![
                Page::new(2, "Home", "<p>Hi there</p>"),
                Page::new(9, "About", ""),
            ]
        );
    }

    #[test]
    fn test_parse_page_list_invalid() {
        let err = parse_page_list("Error: not a WordPress install").unwrap_err();
        assert!(matches!(err, CopyflowError::Repository(_)));
    }

    #[test]
    fn test_parse_front_page() {
        assert_eq!(parse_front_page("12\n"), Some(12));
        assert_eq!(parse_front_page("0"), None);
        assert_eq!(parse_front_page(""), None);
    }

    #[test]
    fn test_site_args() {
        let repo = WpCliRepository::default().with_allow_root(true);
        let site = SiteHandle::new("/var/www/site").with_url("https://example.com");
        assert_eq!(
            repo.site_args(&site),
            vec![
                "--path=/var/www/site".to_string(),
                "--url=https://example.com".to_string(),
                "--allow-root".to_string(),
            ]
        );
        assert_eq!(repo.wp_binary(), Path::new("wp"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_repository_error() {
        let repo = WpCliRepository::new("/nonexistent/wp-cli-binary");
        let err = repo.discover_pages(&SiteHandle::new("/tmp")).await.unwrap_err();
        assert!(matches!(err, CopyflowError::Repository(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_update_pipes_content_through_stdin() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("captured.txt");
        let script = dir.path().join("wp");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" > {0}.args\ncat > {0}\n", captured.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let repo = WpCliRepository::new(&script);
        let content = "<p>It's \"quoted\" $(rm -rf /) `text`</p>";
        repo.update_page_content(&SiteHandle::new(dir.path()), 5, content)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&captured).unwrap(), content);
        let args = std::fs::read_to_string(dir.path().join("captured.txt.args")).unwrap();
        assert!(args.starts_with("post update 5 - --path="));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("wp");
        std::fs::write(&script, "#!/bin/sh\necho 'Error: boom' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let repo = WpCliRepository::new(&script);
        let err = repo.get_homepage_id(&SiteHandle::new(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("Error: boom"));
    }
}
