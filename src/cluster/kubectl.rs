//! kubectl invocation via shell commands
//!
//! Uses tokio::process::Command for async kubectl operations. The structured
//! diff rides kubectl's external-diff hook: kubectl materializes the server
//! and local manifest trees into two temp directories and invokes this
//! binary's `diff-helper` subcommand on them, which writes JSON results to a
//! file we read back.

use crate::cluster::diff::DiffResult;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KubectlError {
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {output}")]
    Failed {
        command: String,
        status: String,
        output: String,
    },

    #[error("could not locate the running executable for the diff helper: {0}")]
    CurrentExe(std::io::Error),

    #[error("failed to read structured diff results: {0}")]
    HelperOutput(std::io::Error),

    #[error("failed to decode kubectl JSON output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("namespace {namespace} has no uid in the kubectl response")]
    MissingUid { namespace: String },
}

/// Async wrapper over the kubectl binary for one cluster
#[derive(Debug, Clone)]
pub struct Kubectl {
    /// Explicit kubeconfig, exported as KUBECONFIG when set
    kube_config_path: Option<PathBuf>,
}

impl Kubectl {
    pub fn new(kube_config_path: Option<PathBuf>) -> Self {
        Self { kube_config_path }
    }

    /// Run `kubectl apply` over the given manifests
    ///
    /// `dry_run` maps to `--dry-run=server`; `json` captures the server's
    /// view of each object as a JSON stream for the structured engine.
    pub async fn apply(
        &self,
        paths: &[PathBuf],
        dry_run: bool,
        server_side: bool,
        json: bool,
    ) -> Result<Vec<u8>, KubectlError> {
        let mut args: Vec<String> = vec!["apply".to_string(), "-R".to_string()];
        for path in paths {
            args.push("-f".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        if dry_run {
            args.push("--dry-run=server".to_string());
        }
        if server_side {
            args.push("--server-side".to_string());
        }
        if json {
            args.push("-o".to_string());
            args.push("json".to_string());
        }

        self.run(&args, &[], &[0]).await
    }

    /// Run `kubectl diff` and return the raw output
    ///
    /// kubectl exits 1 when differences were found; only exit codes above 1
    /// are failures.
    pub async fn diff_raw(
        &self,
        paths: &[PathBuf],
        server_side: bool,
    ) -> Result<Vec<u8>, KubectlError> {
        let args = diff_args(paths, server_side);
        self.run(&args, &[], &[0, 1]).await
    }

    /// Run `kubectl diff` through the structured engine
    ///
    /// Points KUBECTL_EXTERNAL_DIFF back at this binary so the engine runs
    /// over the materialized server/local trees, then reads the results
    /// file the helper wrote.
    pub async fn diff_structured(
        &self,
        paths: &[PathBuf],
        server_side: bool,
        short_diff: bool,
    ) -> Result<Vec<DiffResult>, KubectlError> {
        let exe = std::env::current_exe().map_err(KubectlError::CurrentExe)?;
        let output_file = tempfile::NamedTempFile::new().map_err(KubectlError::HelperOutput)?;

        let helper = format!(
            "{} diff-helper --short-diff={} --output={}",
            exe.to_string_lossy(),
            short_diff,
            output_file.path().to_string_lossy(),
        );

        let args = diff_args(paths, server_side);
        self.run(&args, &[("KUBECTL_EXTERNAL_DIFF", helper.as_str())], &[0, 1])
            .await?;

        let raw = tokio::fs::read(output_file.path())
            .await
            .map_err(KubectlError::HelperOutput)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_slice(&raw)?)
    }

    /// Human-readable cluster summary
    pub async fn summary(&self) -> Result<String, KubectlError> {
        let output = self
            .run(&["cluster-info".to_string()], &[], &[0])
            .await?;
        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }

    /// UID of a namespace
    pub async fn namespace_uid(&self, namespace: &str) -> Result<String, KubectlError> {
        let args = vec![
            "get".to_string(),
            "namespace".to_string(),
            namespace.to_string(),
            "-o".to_string(),
            "json".to_string(),
        ];
        let output = self.run(&args, &[], &[0]).await?;

        let value: serde_json::Value = serde_json::from_slice(&output)?;
        value
            .pointer("/metadata/uid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| KubectlError::MissingUid {
                namespace: namespace.to_string(),
            })
    }

    async fn run(
        &self,
        args: &[String],
        envs: &[(&str, &str)],
        ok_codes: &[i32],
    ) -> Result<Vec<u8>, KubectlError> {
        let command = format!("kubectl {}", args.join(" "));
        debug!(command = %command, "Running kubectl");

        let mut cmd = Command::new("kubectl");
        cmd.args(args);
        if let Some(path) = &self.kube_config_path {
            cmd.env("KUBECONFIG", path);
        }
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|source| KubectlError::Spawn {
            command: command.clone(),
            source,
        })?;

        let code = output.status.code().unwrap_or(-1);
        if !ok_codes.contains(&code) {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(KubectlError::Failed {
                command,
                status: output.status.to_string(),
                output: combined,
            });
        }

        Ok(output.stdout)
    }
}

fn diff_args(paths: &[PathBuf], server_side: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["diff".to_string(), "-R".to_string()];
    for path in paths {
        args.push("-f".to_string());
        args.push(path.to_string_lossy().to_string());
    }
    if server_side {
        args.push("--server-side".to_string());
    }
    args
}

/// Entry point for the `diff-helper` subcommand
///
/// kubectl invokes it as `diff-helper <old_dir> <new_dir>`; results go to
/// the file the parent process chose.
pub fn run_diff_helper(
    old_root: &Path,
    new_root: &Path,
    short_diff: bool,
    output: &Path,
) -> anyhow::Result<()> {
    let results = crate::cluster::diff::diff_kube(old_root, new_root, short_diff)?;
    let encoded = serde_json::to_vec(&results)?;
    std::fs::write(output, encoded)?;
    Ok(())
}
