pub mod types;

pub use types::RepoInfo;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Host of the current Azure DevOps URL format.
const MODERN_HOST: &str = "dev.azure.com";
/// Suffix of the legacy `{org}.visualstudio.com` host.
const LEGACY_HOST: &str = "visualstudio.com";
/// Path segment separating project and repository.
const GIT_MARKER: &str = "_git";

const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const REMOTE_URL_ARGS: [&str; 3] = ["config", "--get", "remote.origin.url"];

/// Parse a git remote URL into its Azure DevOps organization, project and
/// repository.
///
/// Supported formats:
///   https://dev.azure.com/{org}/{project}/_git/{repo}
///   https://{org}.visualstudio.com/{project}/_git/{repo}
///
/// Returns None for anything else, including strings that are not URLs.
pub fn parse_azure_devops_url(url: &str) -> Option<RepoInfo> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let segments: Vec<_> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    if host.contains(MODERN_HOST) {
        if segments.len() < 4 || segments[2] != GIT_MARKER {
            return None;
        }
        return Some(RepoInfo::new(segments[0], segments[1], segments[3]));
    }

    if host.contains(LEGACY_HOST) {
        let (_, rest) = host.split_once('.')?;
        if !rest.starts_with(LEGACY_HOST) {
            return None;
        }
        // The parsed host is lowercased; take the organization from the input.
        let organization = raw_host(url)?.split('.').next().filter(|org| !org.is_empty())?;
        // Collections such as DefaultCollection may precede the project.
        let marker = segments
            .iter()
            .skip(1)
            .position(|segment| *segment == GIT_MARKER)?
            + 1;
        let repository = segments.get(marker + 1)?;
        return Some(RepoInfo::new(
            organization,
            segments[marker - 1],
            *repository,
        ));
    }

    None
}

/// Host of `url` exactly as written, without userinfo or port.
fn raw_host(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    Some(host.split_once(':').map_or(host, |(host, _)| host))
}

/// Source of the remote URL configured for the working directory.
#[async_trait]
pub trait RemoteDetector: Send + Sync {
    /// The configured remote URL, or None when it cannot be determined.
    async fn remote_url(&self) -> Option<String>;
}

/// Reads `remote.origin.url` through the git command line.
#[derive(Debug, Clone)]
pub struct GitRemote {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    timeout: Duration,
}

impl GitRemote {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
            args: REMOTE_URL_ARGS.iter().map(|arg| arg.to_string()).collect(),
            workdir: None,
            timeout: GIT_TIMEOUT,
        }
    }

    /// Run against a specific directory instead of the process working directory.
    pub fn in_dir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    #[cfg(test)]
    fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    #[cfg(test)]
    fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|arg| arg.to_string()).collect();
        self
    }

    #[cfg(test)]
    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GitRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteDetector for GitRemote {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn remote_url(&self) -> Option<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(error = %e, "failed to run git");
                return None;
            }
            Err(_) => {
                debug!(timeout_secs = self.timeout.as_secs(), "git timed out");
                return None;
            }
        };

        if !output.status.success() {
            debug!(status = %output.status, "git exited unsuccessfully");
            return None;
        }

        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if url.is_empty() {
            None
        } else {
            debug!(url = %url, "found remote URL");
            Some(url)
        }
    }
}

/// Detect the Azure DevOps repository of the working directory.
pub async fn detect_current_repo(detector: &dyn RemoteDetector) -> Option<RepoInfo> {
    let url = detector.remote_url().await?;
    let repo = parse_azure_devops_url(&url);
    if repo.is_none() {
        debug!(url = %url, "remote is not an Azure DevOps URL");
    }
    repo
}
