//! Command-line arguments.
//!
//! Every flag falls back to the `INPUT_<NAME>` variable GitHub Actions sets
//! for an action input of the same name, so the binary can run directly as
//! an action step.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use blockboard_types::{BlockSelector, FieldIndex, SelectorError};

/// Block documents on git branches, mirrored into Slack messages.
#[derive(Parser, Debug)]
#[command(name = "blockboard")]
#[command(about = "Block documents on git branches, mirrored into Slack messages")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/blockboard/config.toml if present)
    #[arg(long, global = true, env = "BLOCKBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a document branch seeded with blocks; prints the branch name
    Create(CreateArgs),
    /// Update blocks on a document branch and mirror them into a message
    Update(UpdateArgs),
    /// Delete a document branch
    Remove(RemoveArgs),
    /// Update blocks directly in a message, without git
    Notify(NotifyArgs),
}

/// Where the document branches live.
#[derive(Args, Debug)]
pub struct RepoArgs {
    /// `owner/repo`, a remote URL, or a local path
    #[arg(long, env = "INPUT_REPOSITORY")]
    pub repository: String,

    /// Token for HTTPS remotes (required for `owner/repo`)
    #[arg(long, env = "INPUT_GIT-TOKEN", hide_env_values = true)]
    pub git_token: Option<String>,
}

/// Which blocks to rewrite.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct BlockTarget {
    /// Exact block id
    #[arg(long, env = "INPUT_BLOCK-ID")]
    pub block_id: Option<String>,

    /// Regex matched against block ids
    #[arg(long, env = "INPUT_BLOCK-PATTERN")]
    pub block_pattern: Option<String>,
}

impl BlockTarget {
    pub fn selector(&self) -> Result<BlockSelector, SelectorError> {
        match (&self.block_id, &self.block_pattern) {
            (Some(id), _) => BlockSelector::exact(id),
            (None, Some(pattern)) => BlockSelector::pattern(pattern),
            (None, None) => Err(SelectorError::Empty),
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Initial document: a JSON array of blocks
    #[arg(long, env = "INPUT_BLOCKS")]
    pub blocks: String,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Document branch to update
    #[arg(long, env = "INPUT_BRANCH")]
    pub branch: String,

    /// Channel holding the mirrored message
    #[arg(long, env = "INPUT_CHANNEL-ID")]
    pub channel_id: String,

    /// Timestamp of the mirrored message
    #[arg(long, env = "INPUT_TS")]
    pub ts: String,

    #[command(flatten)]
    pub target: BlockTarget,

    /// Field pair to rewrite, or -1 / `all` for every pair
    #[arg(long, env = "INPUT_BLOCK-INDEX", default_value = "-1", allow_hyphen_values = true)]
    pub block_index: FieldIndex,

    /// New value text
    #[arg(long, env = "INPUT_STATUS")]
    pub status: String,

    /// Only rewrite values whose current text matches this regex
    #[arg(long, env = "INPUT_GUARD")]
    pub guard: Option<String>,

    /// Attempt budget for conflict retries (default from config)
    #[arg(long, env = "INPUT_MAX-RETRIES")]
    pub max_retries: Option<u32>,

    /// Slack bot token
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub slack_token: String,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Document branch to delete
    #[arg(long, env = "INPUT_BRANCH")]
    pub branch: String,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Channel holding the message
    #[arg(long, env = "INPUT_CHANNEL")]
    pub channel: String,

    /// Timestamp of the message
    #[arg(long, env = "INPUT_TS")]
    pub ts: String,

    #[command(flatten)]
    pub target: BlockTarget,

    /// Field pair to rewrite, or -1 / `all` for every pair
    #[arg(long, env = "INPUT_INDEX", default_value = "-1", allow_hyphen_values = true)]
    pub index: FieldIndex,

    /// New value text
    #[arg(long, env = "INPUT_NEW-STATUS")]
    pub status: String,

    /// Only rewrite values whose current text matches this regex
    #[arg(long, env = "INPUT_GUARD")]
    pub guard: Option<String>,

    /// Slack bot token
    #[arg(long, env = "SLACK_BOT_TOKEN", hide_env_values = true)]
    pub slack_token: String,
}
