use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Config file read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = ".ado-pr-mcp.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to load .env: {0}")]
    DotEnv(#[from] dotenvy::Error),

    #[error("AZURE_DEVOPS_PAT is not set; a personal access token with Code (Read) scope is required")]
    MissingToken,

    #[error("Unknown transport '{0}', expected 'stdio' or 'http'")]
    InvalidTransport(String),
}

/// How the server talks to its MCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    /// Newline-delimited JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// JSON-RPC over HTTP on a local port, as plain POST or as SSE
    #[value(alias = "sse")]
    Http,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "sse" => Ok(Transport::Http),
            _ => Err(ConfigError::InvalidTransport(s.to_string())),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http => write!(f, "http"),
        }
    }
}

/// Raw contents of .ado-pr-mcp.toml. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub azure_devops: AzureDevOpsSection,

    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AzureDevOpsSection {
    /// Personal access token. Overridden by AZURE_DEVOPS_PAT.
    pub pat: Option<String>,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    /// "stdio" or "http"
    pub transport: Option<String>,
    /// trace, debug, info, warn(ing), error or critical
    pub log_level: Option<String>,
}

/// Resolved process configuration. Read once at startup, never mutated.
#[derive(Clone)]
pub struct Config {
    pub pat: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub repository: Option<String>,
    pub transport: Transport,
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("pat", &"<redacted>")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("repository", &self.repository)
            .field("transport", &self.transport)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration for this process.
    ///
    /// 1. Read `path`, or .ado-pr-mcp.toml if it exists
    /// 2. Load .env into the environment (existing variables win)
    /// 3. Override with AZURE_DEVOPS_PAT, ADO_ORGANIZATION, ADO_PROJECT,
    ///    ADO_REPOSITORY, MCP_TRANSPORT and MCP_LOG_LEVEL
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let file = match path {
            Some(path) => Self::load_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_file(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        check_dotenv(dotenvy::dotenv())?;

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn load_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let file = toml::from_str(&contents)?;
        Ok(file)
    }

    /// Merge a config file with variables from `env`. Environment values win;
    /// empty values count as unset.
    pub fn resolve(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let pat = var("AZURE_DEVOPS_PAT")
            .or(file.azure_devops.pat)
            .filter(|pat| !pat.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let transport = match var("MCP_TRANSPORT").or(file.server.transport) {
            Some(value) => value.parse()?,
            None => Transport::default(),
        };

        Ok(Config {
            pat,
            organization: var("ADO_ORGANIZATION").or(file.azure_devops.organization),
            project: var("ADO_PROJECT").or(file.azure_devops.project),
            repository: var("ADO_REPOSITORY").or(file.azure_devops.repository),
            transport,
            log_level: var("MCP_LOG_LEVEL")
                .or(file.server.log_level)
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// `tracing` filter directive for the configured log level.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        }
    }

    /// The configured default repository, when all three parts are set.
    pub fn default_repo(&self) -> Option<crate::git::RepoInfo> {
        match (&self.organization, &self.project, &self.repository) {
            (Some(org), Some(project), Some(repo)) => {
                Some(crate::git::RepoInfo::new(org.as_str(), project.as_str(), repo.as_str()))
            }
            _ => None,
        }
    }
}

/// A missing .env is the normal case; a malformed one is an error.
fn check_dotenv<T>(result: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
