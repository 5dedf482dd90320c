use serde::Serialize;

use super::ResourceError;
use crate::git::RepoInfo;

/// Status filter used when a URI carries no `status` query.
pub const DEFAULT_STATUS: &str = "active";

pub const CURRENT_URI: &str = "ado://pull-requests/current";
pub const EXPLICIT_URI_TEMPLATE: &str = "ado://pull-requests/{organization}/{project}/{repository}";

const SCHEME: &str = "ado";
const HOST: &str = "pull-requests";
const MIME_TYPE: &str = "application/json";

/// A concrete resource advertised by `resources/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// A parameterized resource advertised by `resources/templates/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// Body of a `resources/read` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

impl ResourceContent {
    pub fn json(uri: &str, text: String) -> Self {
        Self {
            uri: uri.to_string(),
            mime_type: MIME_TYPE.to_string(),
            text,
        }
    }
}

impl ResourceDefinition {
    pub fn current() -> Self {
        Self {
            uri: CURRENT_URI.to_string(),
            name: "Current repository pull requests".to_string(),
            description: "Pull requests of the Azure DevOps repository detected from the \
                          git remote of the working directory. Optional ?status=active|completed|abandoned|all"
                .to_string(),
            mime_type: MIME_TYPE.to_string(),
        }
    }

    pub fn for_repo(repo: &RepoInfo) -> Self {
        Self {
            uri: format!(
                "ado://{HOST}/{}/{}/{}",
                repo.organization, repo.project, repo.repository
            ),
            name: format!("Pull requests of {repo}"),
            description: "Pull requests of the configured default repository".to_string(),
            mime_type: MIME_TYPE.to_string(),
        }
    }
}

impl ResourceTemplate {
    pub fn explicit() -> Self {
        Self {
            uri_template: EXPLICIT_URI_TEMPLATE.to_string(),
            name: "Repository pull requests".to_string(),
            description: "Pull requests of an Azure DevOps repository. \
                          Optional ?status=active|completed|abandoned|all (default active)"
                .to_string(),
            mime_type: MIME_TYPE.to_string(),
        }
    }
}

/// A resource URI resolved to the handler that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRequest {
    /// ado://pull-requests/{organization}/{project}/{repository}
    Explicit { repo: RepoInfo, status: String },
    /// ado://pull-requests/current
    Current { status: String },
}

impl ResourceRequest {
    pub fn parse(uri: &str) -> Result<Self, ResourceError> {
        let unknown = || ResourceError::UnknownResource(uri.to_string());

        let parsed = reqwest::Url::parse(uri).map_err(|_| unknown())?;
        if parsed.scheme() != SCHEME || parsed.host_str() != Some(HOST) {
            return Err(unknown());
        }

        let status = parsed
            .query_pairs()
            .find(|(key, _)| key == "status")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            ["current"] => Ok(ResourceRequest::Current { status }),
            [organization, project, repository] => Ok(ResourceRequest::Explicit {
                repo: RepoInfo::new(*organization, *project, *repository),
                status,
            }),
            _ => Err(unknown()),
        }
    }
}
