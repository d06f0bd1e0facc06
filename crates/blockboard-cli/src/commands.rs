//! Subcommand implementations.
//!
//! Each git-backed command claims the configured working copy first and
//! removes it before returning; on error the [`WorkingCopy`] guard does it.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use blockboard_kernel::lifecycle;
use blockboard_kernel::{
    BlockboardConfig, ChatClient, ConfigError, GitAuth, GitStore, MessageProjection, Mutation,
    Orchestrator, RetryPolicy, SlackClient, StoreSettings, UpdateOutcome, WorkingCopy,
};
use blockboard_types::{BranchName, Document, FieldIndex, MessageRef};

use crate::cli::{BlockTarget, Cli, Command, CreateArgs, NotifyArgs, RemoveArgs, RepoArgs, UpdateArgs};
use crate::outputs;

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = BlockboardConfig::load(cli.config.as_deref()).context("loading configuration")?;
    match cli.command {
        Command::Create(args) => create(&config, args).await,
        Command::Update(args) => update(&config, args, cancel).await,
        Command::Remove(args) => remove(&config, args).await,
        Command::Notify(args) => notify(&config, args).await,
    }
}

async fn create(config: &BlockboardConfig, args: CreateArgs) -> Result<()> {
    let seed = Document::from_json(&args.blocks).context("parsing --blocks")?;
    let settings = store_settings(config, &args.repo)?;

    let wc = claim_working_copy(config)?;
    let store = GitStore::checkout(settings, wc.path(), &config.git.base_ref)
        .await
        .with_context(|| format!("cloning {} at {}", args.repo.repository, config.git.base_ref))?;
    let branch = lifecycle::create(&store, &seed, &config.update.create_message).await?;
    drop(store);
    wc.remove().context("removing working copy")?;

    outputs::set_output("branch-name", branch.as_str()).context("writing step output")?;
    println!("{}", branch);
    Ok(())
}

async fn update(config: &BlockboardConfig, args: UpdateArgs, cancel: CancellationToken) -> Result<()> {
    let mutation = build_mutation(&args.target, args.block_index, &args.status, args.guard.as_deref())?;
    let branch = BranchName::parse(&args.branch)?;
    let settings = store_settings(config, &args.repo)?;
    let max_retries = args.max_retries.unwrap_or(config.update.max_retries);

    let wc = claim_working_copy(config)?;
    let store = GitStore::checkout(settings, wc.path(), branch.as_str())
        .await
        .with_context(|| format!("cloning {} at {}", args.repo.repository, branch))?;

    let chat = SlackClient::with_base_url(args.slack_token, &config.chat.api_base_url);
    let projection = MessageProjection::new(Arc::new(chat), MessageRef::new(args.channel_id, args.ts));
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        projection,
        RetryPolicy::from_max_retries(max_retries),
    )
    .with_commit_message(&config.update.commit_message)
    .with_cancellation(cancel);

    let report = orchestrator.run(&branch, &mutation).await?;
    match &report.outcome {
        UpdateOutcome::Published { commit } => {
            info!(attempts = report.attempts, commit = %commit, "update published")
        }
        UpdateOutcome::Unchanged { base } => {
            info!(attempts = report.attempts, base = %base, "nothing to update")
        }
    }

    drop(orchestrator);
    wc.remove().context("removing working copy")?;
    Ok(())
}

async fn remove(config: &BlockboardConfig, args: RemoveArgs) -> Result<()> {
    let branch = BranchName::parse(&args.branch)?;
    let settings = store_settings(config, &args.repo)?;

    let wc = claim_working_copy(config)?;
    let store = GitStore::detached(settings, wc.path()).await?;
    lifecycle::remove(&store, &branch).await?;
    drop(store);
    wc.remove().context("removing working copy")?;
    Ok(())
}

/// Chat-only update: read the message, mutate its blocks, write them back.
async fn notify(config: &BlockboardConfig, args: NotifyArgs) -> Result<()> {
    let mutation = build_mutation(&args.target, args.index, &args.status, args.guard.as_deref())?;
    let client = SlackClient::with_base_url(args.slack_token, &config.chat.api_base_url);
    let message = MessageRef::new(args.channel, args.ts);

    let current = client
        .read_message(&message)
        .await
        .with_context(|| format!("reading message {}", message))?;
    let mutated = mutation.apply(&current)?;
    if !mutated.changed {
        info!(message = %message, "message already up to date");
        return Ok(());
    }

    MessageProjection::new(Arc::new(client), message)
        .project(&mutated.document)
        .await?;
    Ok(())
}

fn build_mutation(
    target: &BlockTarget,
    index: FieldIndex,
    status: &str,
    guard: Option<&str>,
) -> Result<Mutation> {
    let mutation = Mutation::new(target.selector()?, index, status);
    Ok(match guard {
        Some(pattern) => mutation.with_guard_pattern(pattern)?,
        None => mutation,
    })
}

fn store_settings(config: &BlockboardConfig, repo: &RepoArgs) -> Result<StoreSettings> {
    let remote = config.resolve_repository(&repo.repository)?;
    let auth = match (&repo.git_token, remote.hosted) {
        (Some(token), _) => GitAuth::token(token),
        (None, true) => return Err(ConfigError::MissingInput("git-token").into()),
        (None, false) => GitAuth::anonymous(),
    };
    Ok(StoreSettings {
        url: remote.url,
        auth,
        user_name: config.git.user_name.clone(),
        user_email: config.git.user_email.clone(),
        document_path: config.git.document_path.clone(),
    })
}

fn claim_working_copy(config: &BlockboardConfig) -> Result<WorkingCopy> {
    WorkingCopy::prepare(&config.git.work_dir)
        .with_context(|| format!("preparing working copy {}", config.git.work_dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(repository: &str, token: Option<&str>) -> RepoArgs {
        RepoArgs {
            repository: repository.to_string(),
            git_token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_hosted_repository_requires_token() {
        let config = BlockboardConfig::default();
        let err = store_settings(&config, &repo("acme/status", None)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingInput("git-token"))
        ));

        let settings = store_settings(&config, &repo("acme/status", Some("ghs_x"))).unwrap();
        assert_eq!(settings.url, "https://github.com/acme/status.git");
        assert_eq!(settings.document_path, "blocks.json");
    }

    #[test]
    fn test_local_repository_is_anonymous() {
        let config = BlockboardConfig::default();
        let settings = store_settings(&config, &repo("/srv/git/status.git", None)).unwrap();
        assert_eq!(settings.url, "/srv/git/status.git");
        assert!(format!("{:?}", settings.auth).contains("None"));
    }

    #[test]
    fn test_build_mutation_with_guard() {
        let target = BlockTarget {
            block_id: Some("q".to_string()),
            block_pattern: None,
        };
        let mutation = build_mutation(&target, FieldIndex::Pair(0), "done", Some("^pending$")).unwrap();
        let doc = Document::from_json(r#"[{"block_id":"q","fields":[{"text":"Job"},{"text":"pending"}]}]"#)
            .unwrap();
        let out = mutation.apply(&doc).unwrap();
        assert_eq!(out.document.find("q").unwrap().value(0), Some("done"));

        assert!(build_mutation(&target, FieldIndex::All, "x", Some("(")).is_err());
    }

    #[test]
    fn test_build_mutation_rejects_bad_pattern() {
        let target = BlockTarget {
            block_id: None,
            block_pattern: Some("[".to_string()),
        };
        assert!(build_mutation(&target, FieldIndex::All, "x", None).is_err());
    }
}
