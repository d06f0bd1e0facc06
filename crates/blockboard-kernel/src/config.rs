//! Blockboard configuration.
//!
//! Defaults cover the common case; a TOML file can override them and CLI
//! flags override the file. Secrets (git and chat tokens) are never read
//! from the file.
//!
//! ```toml
//! [git]
//! server_url = "https://github.example.com"
//! base_ref = "main"
//! user_name = "Build Machine"
//! user_email = "builds@example.com"
//! work_dir = ".blocks"
//! document_path = "blocks.json"
//!
//! [update]
//! max_retries = 8
//!
//! [chat]
//! api_base_url = "https://slack.com/api"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors from loading configuration or resolving inputs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid repository '{0}': expected `<owner>/<repo>`, a URL, or a path")]
    InvalidRepository(String),
    #[error("missing required input `{0}`")]
    MissingInput(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockboardConfig {
    pub git: GitConfig,
    pub update: UpdateConfig,
    pub chat: ChatConfig,
}

/// Where documents live and who commits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Base URL `owner/repo` shorthands resolve against.
    pub server_url: String,
    /// Branch new documents are started from.
    pub base_ref: String,
    pub user_name: String,
    pub user_email: String,
    /// Scratch directory for the working copy. Removed on exit.
    pub work_dir: PathBuf,
    /// Document path inside the working copy.
    pub document_path: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            server_url: "https://github.com".to_string(),
            base_ref: "main".to_string(),
            user_name: "blockboard".to_string(),
            user_email: "blockboard@users.noreply.github.com".to_string(),
            work_dir: PathBuf::from(".blocks"),
            document_path: "blocks.json".to_string(),
        }
    }
}

/// Update loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Attempt budget for the conflict-retry loop.
    pub max_retries: u32,
    pub commit_message: String,
    pub create_message: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            commit_message: "Update block document".to_string(),
            create_message: "Initial block configuration".to_string(),
        }
    }
}

/// Chat platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://slack.com/api".to_string(),
        }
    }
}

/// A resolved remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub url: String,
    /// True for `owner/repo` shorthands, which need token auth.
    pub hosted: bool,
}

impl BlockboardConfig {
    /// `$XDG_CONFIG_HOME/blockboard/config.toml` (or platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("blockboard").join("config.toml"))
    }

    /// Load from an explicit path, else the default path if it exists,
    /// else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve a `repository` input to a remote URL.
    ///
    /// `owner/repo` resolves against `git.server_url`; anything that already
    /// looks like a URL or a filesystem path is used as-is.
    pub fn resolve_repository(&self, repository: &str) -> Result<RemoteLocation, ConfigError> {
        let repository = repository.trim();
        let is_direct = repository.contains("://")
            || repository.starts_with("git@")
            || repository.starts_with('/')
            || repository.starts_with('.');
        if is_direct {
            return Ok(RemoteLocation {
                url: repository.to_string(),
                hosted: false,
            });
        }

        let parts: Vec<&str> = repository.split('/').collect();
        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(RemoteLocation {
                url: format!(
                    "{}/{}/{}.git",
                    self.git.server_url.trim_end_matches('/'),
                    owner,
                    repo
                ),
                hosted: true,
            }),
            _ => Err(ConfigError::InvalidRepository(repository.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BlockboardConfig::default();
        assert_eq!(config.git.base_ref, "main");
        assert_eq!(config.git.work_dir, PathBuf::from(".blocks"));
        assert_eq!(config.git.document_path, "blocks.json");
        assert_eq!(config.update.max_retries, 5);
        assert_eq!(config.update.create_message, "Initial block configuration");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: BlockboardConfig = toml::from_str(
            r#"
            [git]
            user_name = "Build Machine"

            [update]
            max_retries = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.git.user_name, "Build Machine");
        assert_eq!(config.git.base_ref, "main");
        assert_eq!(config.update.max_retries, 9);
        assert_eq!(config.chat.api_base_url, "https://slack.com/api");
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chat]\napi_base_url = \"http://localhost:9\"\n").unwrap();
        let config = BlockboardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.chat.api_base_url, "http://localhost:9");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = BlockboardConfig::load(Some(Path::new("/nonexistent/blockboard.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[update]\nmax_retries = \"many\"\n").unwrap();
        let err = BlockboardConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_resolve_owner_repo() {
        let mut config = BlockboardConfig::default();
        config.git.server_url = "https://git.example.com/".to_string();
        let remote = config.resolve_repository("acme/status").unwrap();
        assert_eq!(remote.url, "https://git.example.com/acme/status.git");
        assert!(remote.hosted);
    }

    #[test]
    fn test_resolve_direct_locations() {
        let config = BlockboardConfig::default();
        for direct in ["/srv/git/status.git", "./status", "file:///srv/status", "git@host:a/b"] {
            let remote = config.resolve_repository(direct).unwrap();
            assert_eq!(remote.url, direct);
            assert!(!remote.hosted);
        }
    }

    #[test]
    fn test_resolve_rejects_malformed() {
        let config = BlockboardConfig::default();
        for bad in ["status", "a/b/c", "owner/", " "] {
            assert!(
                matches!(config.resolve_repository(bad), Err(ConfigError::InvalidRepository(_))),
                "accepted {:?}",
                bad
            );
        }
    }
}
