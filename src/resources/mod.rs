pub mod types;

pub use types::{ResourceContent, ResourceDefinition, ResourceRequest, ResourceTemplate};

use serde_json::json;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::ado::{AdoClient, AdoError};
use crate::config::Config;
use crate::git::{detect_current_repo, RemoteDetector};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Ado(#[from] AdoError),

    #[error(
        "No organization found. Set ADO_ORGANIZATION environment variable \
         or run from an Azure DevOps git repository"
    )]
    MissingOrganization,

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResourceError {
    /// Short machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceError::Ado(AdoError::AuthFailed) => "auth_failed",
            ResourceError::Ado(AdoError::NotFound { .. }) => "not_found",
            ResourceError::Ado(AdoError::Upstream { .. }) => "upstream",
            ResourceError::Ado(AdoError::Connectivity(_)) => "connectivity",
            ResourceError::Ado(AdoError::MalformedResponse(_)) => "malformed_response",
            ResourceError::Ado(AdoError::ClientBuild(_)) | ResourceError::MissingOrganization => {
                "configuration"
            }
            ResourceError::UnknownResource(_) => "unknown_resource",
            ResourceError::Json(_) => "internal",
        }
    }
}

/// Everything a resource read needs: configuration, the remote detector and
/// the shared Azure DevOps client.
///
/// Built once in main and shared by every request. The client is created on
/// first use and bound to one organization for the rest of the process:
/// the detected organization, else ADO_ORGANIZATION.
pub struct AppContext {
    config: Config,
    detector: Box<dyn RemoteDetector>,
    api_host: Option<String>,
    client: OnceCell<AdoClient>,
}

impl AppContext {
    pub fn new(config: Config, detector: Box<dyn RemoteDetector>) -> Self {
        Self {
            config,
            detector,
            api_host: None,
            client: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_api_host(mut self, api_host: &str) -> Self {
        self.api_host = Some(api_host.to_string());
        self
    }

    async fn client(&self) -> Result<&AdoClient, ResourceError> {
        self.client.get_or_try_init(|| self.build_client()).await
    }

    async fn build_client(&self) -> Result<AdoClient, ResourceError> {
        let organization = match detect_current_repo(self.detector.as_ref()).await {
            Some(repo) => repo.organization,
            None => self
                .config
                .organization
                .clone()
                .ok_or(ResourceError::MissingOrganization)?,
        };

        info!(organization = %organization, "initializing Azure DevOps client");
        let client = match &self.api_host {
            Some(host) => AdoClient::with_api_host(host, &organization, &self.config.pat)?,
            None => AdoClient::new(&organization, &self.config.pat)?,
        };
        Ok(client)
    }

    /// Serve ado://pull-requests/{organization}/{project}/{repository}.
    #[instrument(skip(self))]
    pub async fn list_pull_requests(
        &self,
        organization: &str,
        project: &str,
        repository: &str,
        status: &str,
    ) -> Result<String, ResourceError> {
        let client = self.client().await?;
        if !client.organization().eq_ignore_ascii_case(organization) {
            warn!(
                requested = organization,
                bound = client.organization(),
                "client is bound to another organization; querying the bound one"
            );
        }

        let list = client.list_pull_requests(project, repository, status).await?;
        debug!(count = list.count(), "serializing pull requests");
        Ok(serde_json::to_string_pretty(&list)?)
    }

    /// Serve ado://pull-requests/current.
    ///
    /// When the working directory is not an Azure DevOps checkout this
    /// returns an `{"error", "suggestion"}` document instead of failing.
    #[instrument(skip(self))]
    pub async fn list_current_pull_requests(&self, status: &str) -> Result<String, ResourceError> {
        let Some(repo) = detect_current_repo(self.detector.as_ref()).await else {
            info!("no Azure DevOps repository detected");
            let payload = json!({
                "error": "Not in an Azure DevOps git repository",
                "suggestion": "Use explicit organization/project/repository parameters \
                               or run from an Azure DevOps git repository",
            });
            return Ok(serde_json::to_string_pretty(&payload)?);
        };

        info!(repo = %repo, "detected repository");
        self.list_pull_requests(&repo.organization, &repo.project, &repo.repository, status)
            .await
    }

    /// Resolve a resource URI and serve it.
    #[instrument(skip(self))]
    pub async fn read_resource(&self, uri: &str) -> Result<ResourceContent, ResourceError> {
        let text = match ResourceRequest::parse(uri)? {
            ResourceRequest::Explicit { repo, status } => {
                self.list_pull_requests(&repo.organization, &repo.project, &repo.repository, &status)
                    .await?
            }
            ResourceRequest::Current { status } => self.list_current_pull_requests(&status).await?,
        };
        Ok(ResourceContent::json(uri, text))
    }

    /// Concrete resources: the current repository, plus the configured
    /// default repository when one is fully configured.
    pub fn resource_definitions(&self) -> Vec<ResourceDefinition> {
        let mut resources = vec![ResourceDefinition::current()];
        if let Some(repo) = self.config.default_repo() {
            resources.push(ResourceDefinition::for_repo(&repo));
        }
        resources
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate::explicit()]
    }

    /// Release the shared client, if one was ever built.
    pub fn close(mut self) {
        if let Some(client) = self.client.take() {
            client.close();
        }
    }
}
