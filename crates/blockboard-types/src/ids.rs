//! Typed identifiers for branches, commits, and chat messages.
//!
//! A branch is the only address a document has: create allocates one,
//! update targets one, remove deletes one. Generated names are random
//! UUIDv4 strings so uncoordinated creators never collide.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── BranchName ──────────────────────────────────────────────────────────────

/// Error from validating a branch name.
#[derive(Debug, thiserror::Error)]
#[error("invalid branch name '{name}': {reason}")]
pub struct BranchNameError {
    pub name: String,
    pub reason: &'static str,
}

/// Short name of a branch (no `refs/heads/` prefix).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Validate a user-supplied branch name.
    ///
    /// This is a subset of git's ref-format rules, enough to reject input
    /// that would be misread as a refspec.
    pub fn parse(name: impl Into<String>) -> Result<Self, BranchNameError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("empty")
        } else if name.starts_with('-') || name.starts_with('/') || name.ends_with('/') {
            Some("leading '-' or leading/trailing '/'")
        } else if name.ends_with(".lock") || name.ends_with('.') {
            Some("ends with '.lock' or '.'")
        } else if name.contains("..") || name.contains("//") || name.contains("@{") {
            Some("contains '..', '//' or '@{'")
        } else if name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
        {
            Some("contains whitespace or one of ~^:?*[\\")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BranchNameError { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// A fresh, globally unique branch name (UUIDv4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `refs/heads/<name>`
    pub fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// `refs/remotes/<remote>/<name>`
    pub fn remote_tracking_ref(&self, remote: &str) -> String {
        format!("refs/remotes/{}/{}", remote, self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = BranchNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<BranchName> for String {
    fn from(b: BranchName) -> String {
        b.0
    }
}

impl std::str::FromStr for BranchName {
    type Err = BranchNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchName({})", self.0)
    }
}

// ── CommitId ────────────────────────────────────────────────────────────────

/// Full hex id of a commit.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Encode raw object-id bytes as lowercase hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hex = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            hex.push_str(&format!("{:02x}", b));
        }
        Self(hex)
    }

    /// Parse a full hex id (40 chars for SHA-1, 64 for SHA-256).
    pub fn parse(s: &str) -> Option<Self> {
        let valid_len = s.len() == 40 || s.len() == 64;
        if valid_len && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 7 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short())
    }
}

// ── MessageRef ──────────────────────────────────────────────────────────────

/// Address of one chat message: the channel plus the message timestamp.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: String,
    pub ts: String,
}

impl MessageRef {
    pub fn new(channel: impl Into<String>, ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ts: ts.into(),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.channel, self.ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_branch_names_are_unique_and_valid() {
        let a = BranchName::generate();
        let b = BranchName::generate();
        assert_ne!(a, b);
        assert!(BranchName::parse(a.as_str()).is_ok());
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_branch_name_rejects_refspec_syntax() {
        for bad in ["", "-x", "a..b", "a b", "src:dst", "x.lock", "a/", "a~1"] {
            assert!(BranchName::parse(bad).is_err(), "accepted {:?}", bad);
        }
        assert!(BranchName::parse("release/1.2").is_ok());
    }

    #[test]
    fn test_branch_refs() {
        let b = BranchName::parse("queue").unwrap();
        assert_eq!(b.local_ref(), "refs/heads/queue");
        assert_eq!(b.remote_tracking_ref("origin"), "refs/remotes/origin/queue");
    }

    #[test]
    fn test_branch_name_serde() {
        let b: BranchName = serde_json::from_str("\"queue\"").unwrap();
        assert_eq!(b.as_str(), "queue");
        assert!(serde_json::from_str::<BranchName>("\"a b\"").is_err());
    }

    #[test]
    fn test_commit_id_from_bytes() {
        let id = CommitId::from_bytes(&[0xab; 20]);
        assert_eq!(id.as_str().len(), 40);
        assert!(id.as_str().starts_with("abab"));
        assert_eq!(id.short(), "abababa");
    }

    #[test]
    fn test_commit_id_parse() {
        let hex = "0123456789ABCDEF0123456789abcdef01234567";
        let id = CommitId::parse(hex).unwrap();
        assert_eq!(id.as_str(), hex.to_ascii_lowercase());
        assert!(CommitId::parse("abc").is_none());
        assert!(CommitId::parse(&"g".repeat(40)).is_none());
    }

    #[test]
    fn test_message_ref_display() {
        let m = MessageRef::new("C123", "1700000000.000100");
        assert_eq!(m.to_string(), "C123@1700000000.000100");
    }
}
