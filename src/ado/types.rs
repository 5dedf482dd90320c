use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity that created a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestAuthor {
    /// Display name, "Unknown" when the API omits it
    pub display_name: String,
    /// Unique name (typically an email address)
    pub unique_name: String,
    /// Identity id
    pub id: String,
}

/// A pull request as served in the resource payload.
/// Built only from the Azure DevOps response, see `From<WirePullRequest>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequest {
    pub pull_request_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// active, completed or abandoned (not validated)
    pub status: String,
    pub created_date: DateTime<Utc>,
    pub created_by: PullRequestAuthor,
    /// Source branch ref (e.g. "refs/heads/feature")
    pub source_ref_name: String,
    /// Target branch ref (e.g. "refs/heads/main")
    pub target_ref_name: String,
    pub url: String,
    pub repository_id: String,
}

/// Pull requests in upstream order together with their count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequestList {
    pull_requests: Vec<PullRequest>,
    count: usize,
}

impl PullRequestList {
    pub fn from_pull_requests(pull_requests: Vec<PullRequest>) -> Self {
        let count = pull_requests.len();
        Self {
            pull_requests,
            count,
        }
    }

    #[cfg(test)]
    pub fn pull_requests(&self) -> &[PullRequest] {
        &self.pull_requests
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

// Wire format of GET .../pullrequests. Fields without a serde default are
// required: a response missing one of them fails to decode.

#[derive(Debug, Deserialize)]
pub(crate) struct WirePullRequestList {
    #[serde(default)]
    pub value: Vec<WirePullRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePullRequest {
    pub pull_request_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<WireIdentityRef>,
    pub source_ref_name: String,
    pub target_ref_name: String,
    #[serde(default)]
    pub url: String,
    pub repository: WireRepositoryRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireIdentityRef {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub unique_name: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRepositoryRef {
    pub id: String,
}

impl From<WirePullRequest> for PullRequest {
    fn from(wire: WirePullRequest) -> Self {
        let created_by = wire.created_by.unwrap_or_default();
        PullRequest {
            pull_request_id: wire.pull_request_id,
            title: wire.title,
            description: wire.description,
            status: wire.status,
            created_date: wire.creation_date,
            created_by: PullRequestAuthor {
                display_name: created_by
                    .display_name
                    .unwrap_or_else(|| "Unknown".to_string()),
                unique_name: created_by.unique_name,
                id: created_by.id,
            },
            source_ref_name: wire.source_ref_name,
            target_ref_name: wire.target_ref_name,
            url: wire.url,
            repository_id: wire.repository.id,
        }
    }
}

impl From<WirePullRequestList> for PullRequestList {
    fn from(wire: WirePullRequestList) -> Self {
        PullRequestList::from_pull_requests(wire.value.into_iter().map(PullRequest::from).collect())
    }
}
