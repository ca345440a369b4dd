//! Webhook event handlers
//!
//! `pull_request` events produce a structured diff and report it back to
//! the pull request; `issue_comment` events carrying the apply command run
//! a permission-gated apply under the cluster lock.

use crate::cluster::apply::{sort_apply_results, ApplyResult};
use crate::cluster::client::{ClusterClient, ClusterError, KubeClusterClient};
use crate::cluster::config::{discover_clusters, ConfigError, DiscoveredCluster};
use crate::cluster::diff::DiffResult;
use crate::github::{CheckoutError, GithubClient, GithubError, StatusState};
use crate::lock::Locker;
use crate::metrics::SharedMetrics;
use crate::store::Store;
use crate::webhook::context::EventContext;
use crate::webhook::event::{parse_event, Event, IssueCommentEvent, PullRequestEvent, APPLY_COMMAND};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Commit status context for diffs
const DIFF_STATUS_CONTEXT: &str = "kubeapply/diff";

/// Commit status context for applies
const APPLY_STATUS_CONTEXT: &str = "kubeapply/apply";

/// Cap on raw diff text embedded in one comment
const MAX_COMMENT_DIFF_CHARS: usize = 32_000;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("could not parse event body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("repository name {0} is not owner/repo")]
    BadRepository(String),

    #[error(transparent)]
    Github(#[from] GithubError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Server-level options the handlers consult
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub webhook_secret: String,
    pub github_token: String,
    /// Restrict processing to one environment label
    pub env: Option<String>,
    /// URL surfaced on commit statuses
    pub logs_url: Option<String>,
    pub automerge: bool,
    pub green_ci_required: bool,
    pub review_required: bool,
    /// Checkout subtree holding cluster configs
    pub cluster_dir: String,
    /// Enable the apply-consistency protocol
    pub strict_check: bool,
}

/// Shared state handed to every request
pub struct AppState {
    pub config: ServerConfig,
    pub locker: Option<Arc<dyn Locker>>,
    pub store: Option<Arc<dyn Store>>,
    pub metrics: SharedMetrics,
}

/// Dispatch a verified webhook body by event kind
///
/// The returned string becomes the plain-text 200 response body.
pub async fn dispatch(state: &AppState, kind: &str, body: &[u8]) -> Result<String, WebhookError> {
    match parse_event(kind, body)? {
        None => {
            state.metrics.record_event(kind, "ignored");
            Ok("Non-matching event".to_string())
        }
        Some(Event::PullRequest(event)) => {
            let outcome = handle_pull_request(state, &event).await;
            state
                .metrics
                .record_event("pull_request", outcome_label(&outcome));
            outcome
        }
        Some(Event::IssueComment(event)) => {
            let outcome = handle_issue_comment(state, &event).await;
            state
                .metrics
                .record_event("issue_comment", outcome_label(&outcome));
            outcome
        }
    }
}

fn outcome_label<T>(outcome: &Result<T, WebhookError>) -> &'static str {
    if outcome.is_ok() {
        "ok"
    } else {
        "error"
    }
}

/// One cluster's contribution to the PR comment
struct ClusterSection {
    heading: String,
    body: String,
    ok: bool,
}

/// Diff the head revision and report back to the pull request
async fn handle_pull_request(
    state: &AppState,
    event: &PullRequestEvent,
) -> Result<String, WebhookError> {
    if !event.wants_diff() {
        return Ok(format!("Ignoring pull_request action {}", event.action));
    }

    let github = Arc::new(GithubClient::new(&state.config.github_token)?);
    let ctx = EventContext::new(github, &event.repository, event.pull_request.number)?;
    let head_sha = event.pull_request.head.sha.clone();

    info!(
        repo = %event.repository.full_name,
        number = ctx.number,
        sha = %head_sha,
        "Handling pull request diff"
    );

    let result = run_pull_request_diff(state, &ctx, &head_sha).await;
    ctx.close().await;
    result
}

async fn run_pull_request_diff(
    state: &AppState,
    ctx: &EventContext,
    head_sha: &str,
) -> Result<String, WebhookError> {
    let root = ctx.checkout(head_sha).await?;

    let clusters = discover_clusters(
        &root.join(&state.config.cluster_dir),
        state.config.env.as_deref(),
    )?;
    if clusters.is_empty() {
        return Ok("No matching clusters".to_string());
    }

    set_status(state, ctx, head_sha, DIFF_STATUS_CONTEXT, StatusState::Pending, "Computing diff").await;

    let mut sections = Vec::new();
    for discovered in &clusters {
        let section = diff_one_cluster(state, discovered, head_sha).await;
        sections.push(section);
    }

    let all_ok = sections.iter().all(|s| s.ok);
    let comment = render_comment(
        &format!("kubeapply diff for `{head_sha}`"),
        &sections,
    );
    ctx.github
        .create_comment(&ctx.owner, &ctx.repo, ctx.number, &comment)
        .await?;

    let (status, description) = if all_ok {
        (StatusState::Success, "Diff posted")
    } else {
        (StatusState::Error, "Diff failed for at least one cluster")
    };
    set_status(state, ctx, head_sha, DIFF_STATUS_CONTEXT, status, description).await;

    Ok("Processed pull request diff".to_string())
}

async fn diff_one_cluster(
    state: &AppState,
    discovered: &DiscoveredCluster,
    head_sha: &str,
) -> ClusterSection {
    let key = discovered.config.key();
    let manifest_root = discovered.manifest_root();

    let client = match KubeClusterClient::new(
        discovered.config.clone(),
        head_sha,
        state.locker.clone(),
        state.store.clone(),
        state.config.strict_check,
    ) {
        Ok(client) => client,
        Err(err) => {
            return ClusterSection {
                heading: key,
                body: format!("Could not construct cluster client: {err}"),
                ok: false,
            }
        }
    };

    let started = Instant::now();
    let outcome = client
        .diff_structured(&[manifest_root], discovered.config.server_side, true)
        .await;
    state
        .metrics
        .record_operation("diff", outcome.is_ok(), started.elapsed().as_secs_f64());

    if let Err(err) = client.close().await {
        warn!(cluster = %key, error = %err, "Failed to close cluster client");
    }

    match outcome {
        Ok(results) => ClusterSection {
            heading: key,
            body: render_diff_results(&results),
            ok: true,
        },
        Err(err) => ClusterSection {
            heading: key,
            body: format!("Diff failed: {err}"),
            ok: false,
        },
    }
}

/// Apply on maintainer command, then report back to the pull request
async fn handle_issue_comment(
    state: &AppState,
    event: &IssueCommentEvent,
) -> Result<String, WebhookError> {
    if !event.is_apply_command() {
        return Ok("Non-matching comment".to_string());
    }

    let github = Arc::new(GithubClient::new(&state.config.github_token)?);
    let ctx = EventContext::new(github, &event.repository, event.issue.number)?;

    info!(
        repo = %event.repository.full_name,
        number = ctx.number,
        commenter = %event.comment.user.login,
        "Handling apply command"
    );

    let result = run_apply(state, &ctx, &event.comment.user.login).await;
    ctx.close().await;
    result
}

async fn run_apply(
    state: &AppState,
    ctx: &EventContext,
    commenter: &str,
) -> Result<String, WebhookError> {
    // Only collaborators with write access may apply
    let permission = ctx
        .github
        .permission_level(&ctx.owner, &ctx.repo, commenter)
        .await?;
    if permission != "admin" && permission != "write" {
        ctx.github
            .create_comment(
                &ctx.owner,
                &ctx.repo,
                ctx.number,
                &format!("@{commenter} does not have write access; `{APPLY_COMMAND}` ignored."),
            )
            .await?;
        return Ok("Commenter not authorized".to_string());
    }

    let pull = ctx.github.get_pull(&ctx.owner, &ctx.repo, ctx.number).await?;
    let head_sha = pull.head.sha.clone();

    if state.config.green_ci_required {
        let ci_state = ctx
            .github
            .combined_status(&ctx.owner, &ctx.repo, &head_sha)
            .await?;
        if ci_state != "success" {
            ctx.github
                .create_comment(
                    &ctx.owner,
                    &ctx.repo,
                    ctx.number,
                    &format!("CI status is `{ci_state}`; apply requires green CI."),
                )
                .await?;
            return Ok("CI not green".to_string());
        }
    }

    if state.config.review_required {
        let approved = ctx
            .github
            .is_approved(&ctx.owner, &ctx.repo, ctx.number)
            .await?;
        if !approved {
            ctx.github
                .create_comment(
                    &ctx.owner,
                    &ctx.repo,
                    ctx.number,
                    "Apply requires an approved review.",
                )
                .await?;
            return Ok("Review missing".to_string());
        }
    }

    // Apply what would land on the base branch, while keeping the head
    // revision as the consistency token the diff was recorded under
    let merge_base = ctx
        .github
        .merge_base(&ctx.owner, &ctx.repo, &pull.base.ref_name, &head_sha)
        .await?;
    let root = ctx.checkout(&merge_base).await?;

    let clusters = discover_clusters(
        &root.join(&state.config.cluster_dir),
        state.config.env.as_deref(),
    )?;
    if clusters.is_empty() {
        return Ok("No matching clusters".to_string());
    }

    set_status(state, ctx, &head_sha, APPLY_STATUS_CONTEXT, StatusState::Pending, "Applying").await;

    let mut sections = Vec::new();
    for discovered in &clusters {
        sections.push(apply_one_cluster(state, discovered, &head_sha).await);
    }

    let all_ok = sections.iter().all(|s| s.ok);
    let comment = render_comment(&format!("kubeapply apply for `{head_sha}`"), &sections);
    ctx.github
        .create_comment(&ctx.owner, &ctx.repo, ctx.number, &comment)
        .await?;

    let (status, description) = if all_ok {
        (StatusState::Success, "Apply succeeded")
    } else {
        (StatusState::Error, "Apply failed for at least one cluster")
    };
    set_status(state, ctx, &head_sha, APPLY_STATUS_CONTEXT, status, description).await;

    if all_ok && state.config.automerge {
        match ctx.github.merge_pull(&ctx.owner, &ctx.repo, ctx.number).await {
            Ok(()) => info!(number = ctx.number, "Automerged pull request"),
            Err(err) => warn!(number = ctx.number, error = %err, "Automerge failed"),
        }
    }

    Ok("Processed apply".to_string())
}

async fn apply_one_cluster(
    state: &AppState,
    discovered: &DiscoveredCluster,
    head_sha: &str,
) -> ClusterSection {
    let key = discovered.config.key();
    let manifest_root = discovered.manifest_root();

    let client = match KubeClusterClient::new(
        discovered.config.clone(),
        head_sha,
        state.locker.clone(),
        state.store.clone(),
        state.config.strict_check,
    ) {
        Ok(client) => client,
        Err(err) => {
            return ClusterSection {
                heading: key,
                body: format!("Could not construct cluster client: {err}"),
                ok: false,
            }
        }
    };

    let started = Instant::now();
    let outcome = client
        .apply_structured(&[manifest_root], discovered.config.server_side)
        .await;
    state
        .metrics
        .record_operation("apply", outcome.is_ok(), started.elapsed().as_secs_f64());

    if let Err(err) = client.close().await {
        warn!(cluster = %key, error = %err, "Failed to close cluster client");
    }

    match outcome {
        Ok(results) => ClusterSection {
            heading: key,
            body: render_apply_results(&results),
            ok: true,
        },
        Err(err) => ClusterSection {
            heading: key,
            body: apply_error_text(&err),
            ok: false,
        },
    }
}

/// Error text surfaced on the pull request for a failed apply
fn apply_error_text(err: &ClusterError) -> String {
    match err {
        ClusterError::LockTimeout { .. } | ClusterError::ConsistencyMismatch { .. } | ClusterError::NoDiffEvent { .. } => {
            format!("Apply rejected: {err}")
        }
        other => format!("Apply failed: {other}"),
    }
}

async fn set_status(
    state: &AppState,
    ctx: &EventContext,
    sha: &str,
    context: &str,
    status: StatusState,
    description: &str,
) {
    let result = ctx
        .github
        .set_status(
            &ctx.owner,
            &ctx.repo,
            sha,
            status,
            context,
            description,
            state.config.logs_url.as_deref(),
        )
        .await;
    if let Err(err) = result {
        warn!(sha = %sha, context = %context, error = %err, "Failed to set commit status");
    }
}

fn render_comment(title: &str, sections: &[ClusterSection]) -> String {
    let mut out = format!("### {title}\n");
    for section in sections {
        out.push_str(&format!("\n#### `{}`\n\n{}\n", section.heading, section.body));
    }
    out
}

fn render_diff_results(results: &[DiffResult]) -> String {
    if results.is_empty() {
        return "No changes.".to_string();
    }

    let mut out = String::from("| Resource | Added | Removed |\n|---|---|---|\n");
    for result in results {
        let resource = match &result.object {
            Some(obj) => obj.id().to_string(),
            None => result.name.clone(),
        };
        out.push_str(&format!(
            "| `{resource}` | {} | {} |\n",
            result.num_added, result.num_removed
        ));
    }

    out.push_str("\n<details>\n<summary>Full diff</summary>\n\n```diff\n");
    let mut remaining = MAX_COMMENT_DIFF_CHARS;
    let mut truncated = false;
    for result in results {
        if remaining == 0 {
            truncated = true;
            break;
        }
        let text: String = result.raw_diff.chars().take(remaining).collect();
        let taken = text.chars().count();
        if taken < result.raw_diff.chars().count() {
            truncated = true;
        }
        remaining -= taken;
        out.push_str(&text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }
    if truncated {
        out.push_str("… (diff truncated)\n");
    }
    out.push_str("```\n\n</details>\n");

    out
}

fn render_apply_results(results: &[ApplyResult]) -> String {
    if results.is_empty() {
        return "Nothing applied.".to_string();
    }

    let mut sorted = results.to_vec();
    sort_apply_results(&mut sorted);

    let created = sorted.iter().filter(|r| r.is_created()).count();
    let updated = sorted.iter().filter(|r| r.is_updated()).count();
    let unchanged = sorted.len() - created - updated;

    let mut out = format!(
        "{created} created, {updated} updated, {unchanged} unchanged\n\n| Resource | Old version | New version | Status |\n|---|---|---|---|\n"
    );
    for result in &sorted {
        let status = if result.is_created() {
            "created"
        } else if result.is_updated() {
            "updated"
        } else {
            "unchanged"
        };
        out.push_str(&format!(
            "| `{}` | {} | {} | {status} |\n",
            result.id,
            display_version(&result.old_version),
            display_version(&result.new_version),
        ));
    }
    out
}

fn display_version(version: &str) -> &str {
    if version.is_empty() {
        "-"
    } else {
        version
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "handlers_test.rs"]
mod tests;
