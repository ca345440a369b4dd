use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use kubeapply::cluster::kubectl::run_diff_helper;
use kubeapply::lock::{LeaseLockManager, Locker};
use kubeapply::metrics::create_metrics;
use kubeapply::store::{ConfigMapStore, Store};
use kubeapply::webhook::{run_webhook_server, AppState, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Webhook-driven GitOps controller for Kubernetes manifests
#[derive(Parser)]
#[command(name = "kubeapply", version, about)]
struct Options {
    #[command(subcommand)]
    command: Option<Command>,

    /// TCP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Shared HMAC secret for webhook signatures
    #[arg(long, env = "KUBEAPPLY_WEBHOOK_SECRET", default_value = "")]
    webhook_secret: String,

    /// Bearer token for provider API calls
    #[arg(long, env = "KUBEAPPLY_GITHUB_TOKEN", default_value = "")]
    github_token: String,

    /// Restrict processing to a single environment label
    #[arg(long)]
    env: Option<String>,

    /// URL surfaced on status checks
    #[arg(long)]
    logs_url: Option<String>,

    /// Merge the pull request on successful apply
    #[arg(long)]
    automerge: bool,

    /// Require CI success before apply
    #[arg(long)]
    green_ci_required: bool,

    /// Require an approved review before apply
    #[arg(long)]
    review_required: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Namespace holding lock leases and the consistency store
    #[arg(long, default_value = "kubeapply")]
    lock_namespace: String,

    /// Checkout subtree holding cluster configs
    #[arg(long, default_value = "clusters")]
    cluster_dir: String,

    /// Disable the cluster-scoped lock guard
    #[arg(long)]
    no_locks: bool,

    /// Reject applies whose revision was not the last one diffed
    #[arg(long)]
    strict_check: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Structured diff hook invoked by kubectl via KUBECTL_EXTERNAL_DIFF
    #[command(hide = true)]
    DiffHelper {
        /// Suppress noisy metadata from the diff
        #[arg(long, action = ArgAction::Set, default_value_t = false)]
        short_diff: bool,

        /// File to write JSON results to
        #[arg(long)]
        output: PathBuf,

        /// Server-side manifest tree (from kubectl)
        old_dir: PathBuf,

        /// Local manifest tree (from kubectl)
        new_dir: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

/// Resolve on SIGTERM or SIGINT
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
        match sigterm {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse();

    if let Some(Command::DiffHelper {
        short_diff,
        output,
        old_dir,
        new_dir,
    }) = options.command
    {
        // Runs inside kubectl; results go to the file, not stdout
        return run_diff_helper(&old_dir, &new_dir, short_diff, &output);
    }

    init_tracing(options.debug);
    info!("Starting kubeapply webhook server");

    if options.webhook_secret.is_empty() {
        warn!("No webhook secret configured; signatures verify against an empty secret");
    }

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client for coordination")?;

    let locker: Option<Arc<dyn Locker>> = if options.no_locks {
        warn!("Cluster locks disabled");
        None
    } else {
        Some(Arc::new(LeaseLockManager::new(
            client.clone(),
            &options.lock_namespace,
        )))
    };

    let store: Option<Arc<dyn Store>> = Some(Arc::new(ConfigMapStore::new(
        client,
        &options.lock_namespace,
        kubeapply::store::DEFAULT_CONFIG_MAP,
    )));

    let metrics = create_metrics().context("Failed to create metrics registry")?;

    let state = Arc::new(AppState {
        config: ServerConfig {
            webhook_secret: options.webhook_secret,
            github_token: options.github_token,
            env: options.env,
            logs_url: options.logs_url,
            automerge: options.automerge,
            green_ci_required: options.green_ci_required,
            review_required: options.review_required,
            cluster_dir: options.cluster_dir,
            strict_check: options.strict_check,
        },
        locker,
        store,
        metrics,
    });

    run_webhook_server(&options.bind, state, shutdown_signal())
        .await
        .context("Webhook server failed")
}
