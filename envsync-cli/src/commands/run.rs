//! `envsync apply` / `envsync plan`: one reconciliation run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use envsync_core::loader::resolve_root_at;
use envsync_engine::RunMode;
use envsync_platform::{HttpPlatform, PlatformConfig, RetryPolicy};

use super::report;

/// Connection, discovery and output options shared by every command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Platform base URL.
    #[arg(long, env = "DOMINO_URL", global = true)]
    pub url: Option<String>,

    /// API key, sent as `X-Domino-Api-Key`.
    #[arg(long, env = "DOMINO_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Service-account token, used when no API key is given.
    #[arg(long, env = "DOMINO_AUTH_TOKEN", hide_env_values = true, global = true)]
    pub auth_token: Option<String>,

    /// Local API proxy. Requests go here without credentials.
    #[arg(long, env = "DOMINO_API_PROXY", global = true)]
    pub api_proxy: Option<String>,

    /// Directory holding (or named) `environment_templates`.
    #[arg(long, env = "TARGET_DIRECTORY", global = true)]
    pub target_directory: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "ENVSYNC_REQUEST_TIMEOUT_SECS", default_value_t = 60, global = true)]
    pub request_timeout_secs: u64,

    /// Attempts per remote call, including the first.
    #[arg(long, env = "ENVSYNC_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    pub max_attempts: u32,

    /// Emit machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self, mode: RunMode) -> Result<ExitCode> {
        let config = self.platform_config()?;
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let root = resolve_root_at(self.target_directory.as_deref(), &cwd)
            .context("could not locate environment templates")?;
        tracing::debug!("templates root: {}", root.display());
        tracing::debug!("platform: {}", config.base_url);

        let retry = config.retry;
        let platform = HttpPlatform::new(config);
        let summary = envsync_engine::run(&platform, &root, mode, retry)
            .with_context(|| format!("{mode} aborted"))?;

        if self.json {
            report::print_json(&summary)?;
        } else {
            report::print_table(&summary);
        }

        Ok(if summary.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        })
    }

    /// A proxy takes precedence over a direct connection.
    fn platform_config(&self) -> Result<PlatformConfig> {
        let config = match self.api_proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(proxy) => PlatformConfig::via_proxy(proxy)?,
            None => PlatformConfig::direct(
                self.url.as_deref().unwrap_or_default(),
                self.api_key.clone(),
                self.auth_token.clone(),
            )?,
        };
        Ok(config
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_retry(RetryPolicy::default().with_max_attempts(self.max_attempts)))
    }
}
