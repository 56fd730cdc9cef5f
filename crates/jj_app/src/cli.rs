use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jj_core::parse_assignment;
use jj_engine::ClientSettings;

#[derive(Parser, Debug)]
#[command(name = "jj", version, about = "Trigger Jenkins jobs and follow them to the end")]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Mirror log output on the terminal (it always goes to ./jj.log)
    #[arg(long, global = true)]
    pub log_to_terminal: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Build server base URL
    #[arg(long, env = "JJ_URL", global = true)]
    pub url: Option<String>,

    /// User for HTTP basic auth
    #[arg(long, env = "JJ_USER", global = true)]
    pub user: Option<String>,

    /// API token for HTTP basic auth
    #[arg(long, env = "JJ_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,
}

impl ServerArgs {
    pub fn client_settings(&self) -> Result<ClientSettings> {
        let url = self
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .context("no build server configured, pass --url or set JJ_URL")?;
        Ok(ClientSettings {
            user: self.user.clone(),
            token: self.token.clone(),
            ..ClientSettings::new(url)
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Trigger a job and follow it and its downstream jobs
    Run(RunArgs),
    /// Show recent builds of a job, or the details of one build
    Builds(BuildsArgs),
    /// Pod status, logs and shells through kubectl
    K8s(K8sArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job name or part of it
    pub pattern: String,

    /// Job parameter (can be repeated: -a key=val)
    #[arg(short = 'a', long = "arg", value_parser = parse_assignment)]
    pub params: Vec<(String, String)>,

    /// Forward console output in batches of three lines
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip the cluster check after a successful deployment
    #[arg(long)]
    pub no_post_check: bool,

    /// Extra console or job-name text that disables the cluster check
    #[arg(long = "skip-post-check-pattern", value_name = "TEXT")]
    pub skip_patterns: Vec<String>,

    /// Cluster namespace for the post-deployment check
    #[arg(long, default_value = "default")]
    pub namespace: String,

    /// Give up on a build after its status could not be read for this long
    #[arg(long, value_name = "MS", default_value_t = 10_000)]
    pub poll_failure_budget_ms: u64,
}

impl RunArgs {
    pub fn poll_failure_budget(&self) -> Duration {
        Duration::from_millis(self.poll_failure_budget_ms)
    }
}

#[derive(Args, Debug)]
pub struct BuildsArgs {
    /// Job name or part of it
    pub pattern: String,

    /// Show one build instead of the recent list
    pub number: Option<u64>,

    /// Include the full console text of the build
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct K8sArgs {
    #[command(subcommand)]
    pub view: Option<K8sView>,

    #[command(flatten)]
    pub pods: PodsArgs,
}

impl K8sArgs {
    /// `jj k8s APP` and `jj k8s pods APP` are the same view.
    pub fn into_pods(self) -> PodsArgs {
        match self.view {
            Some(K8sView::Pods(args)) => args,
            None => self.pods,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum K8sView {
    /// Pod status, logs and shells (the default view)
    Pods(PodsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PodsArgs {
    /// Pod name prefix; tried as the `app` label when no pod name matches
    pub app: Option<String>,

    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Print pod status every few seconds until interrupted
    #[arg(short, long)]
    pub watch: bool,

    /// Show the last lines of the pod log and follow it
    #[arg(short = 'l', long = "log")]
    pub logs: bool,

    /// With --log, print the last lines and stop
    #[arg(long)]
    pub no_follow: bool,

    /// Add `kubectl describe` output for every pod shown
    #[arg(short, long)]
    pub detailed: bool,

    /// Plain `kubectl get pods` table without the wide columns
    #[arg(short, long)]
    pub simple: bool,

    /// Open a shell in the pod
    #[arg(short, long)]
    pub exec: bool,
}
