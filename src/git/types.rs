/// Organization, project and repository of an Azure DevOps git remote.
/// Extracted by parse_azure_devops_url() in git/mod.rs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub organization: String,
    pub project: String,
    pub repository: String,
}

impl RepoInfo {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            repository: repository.into(),
        }
    }
}

impl std::fmt::Display for RepoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.repository)
    }
}
