use std::process::Output;
use std::time::Duration;

use jj_logging::jj_debug;
use tokio::process::Command;

use crate::cancel::InterruptSource;

/// Lines of history shown before a log stream starts.
pub const LOG_TAIL_LINES: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{label}: failed to start: {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{label}: timed out after {}s", .timeout.as_secs())]
    Timeout { label: String, timeout: Duration },
    #[error("{label}: exited with {code:?}: {stderr}")]
    ExitStatus {
        label: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Pods a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodQuery<'a> {
    All,
    Selector(&'a str),
    Named(&'a str),
}

impl<'a> PodQuery<'a> {
    fn get_args<'b>(self, namespace: &'b str) -> Vec<&'b str>
    where
        'a: 'b,
    {
        let mut args = match self {
            PodQuery::All => vec!["get", "pods"],
            PodQuery::Selector(selector) => vec!["get", "pods", "-l", selector],
            PodQuery::Named(pod) => vec!["get", "pod", pod],
        };
        args.extend(["-n", namespace]);
        args
    }
}

/// Read-only queries against the cluster a job deploys to.
#[async_trait::async_trait]
pub trait ClusterProbe: Send + Sync {
    async fn rollout_status(&self, deployment: &str, namespace: &str)
        -> Result<String, ProbeError>;

    async fn pod_names(&self, namespace: &str) -> Result<Vec<String>, ProbeError>;

    async fn pods_with_selector(
        &self,
        selector: &str,
        namespace: &str,
    ) -> Result<Vec<String>, ProbeError>;

    /// One `kubectl get pod` status row, header omitted.
    async fn pod_line(&self, pod: &str, namespace: &str) -> Result<String, ProbeError>;

    /// The `kubectl get` table as printed, headers included.
    async fn pod_table(
        &self,
        query: PodQuery<'_>,
        namespace: &str,
        wide: bool,
    ) -> Result<String, ProbeError>;

    /// Status rows, header omitted.
    async fn pod_rows(
        &self,
        query: PodQuery<'_>,
        namespace: &str,
    ) -> Result<Vec<String>, ProbeError>;

    async fn describe_pod(&self, pod: &str, namespace: &str) -> Result<String, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct KubectlProbe {
    program: String,
    timeout: Duration,
    rollout_timeout: Duration,
}

impl Default for KubectlProbe {
    fn default() -> Self {
        Self {
            program: "kubectl".to_string(),
            timeout: Duration::from_secs(10),
            rollout_timeout: Duration::from_secs(60),
        }
    }
}

impl KubectlProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            ..Self::default()
        }
    }

    async fn kubectl(
        &self,
        args: &[&str],
        timeout: Duration,
        label: &str,
    ) -> Result<String, ProbeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        let output = run_with_timeout(cmd, timeout, label).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `kubectl logs` with the last lines of history, streaming on when
    /// `follow` is set.
    pub fn logs_command(&self, pod: &str, namespace: &str, follow: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["logs", pod, "-n", namespace])
            .arg(format!("--tail={LOG_TAIL_LINES}"));
        if follow {
            cmd.arg("-f");
        }
        cmd
    }

    /// Interactive shell inside the pod's default container.
    pub fn exec_command(&self, pod: &str, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["exec", "-it", "-n", namespace, pod, "--", "/bin/sh"]);
        cmd
    }
}

#[async_trait::async_trait]
impl ClusterProbe for KubectlProbe {
    async fn rollout_status(
        &self,
        deployment: &str,
        namespace: &str,
    ) -> Result<String, ProbeError> {
        let target = format!("deployment/{deployment}");
        let wait = format!("--timeout={}s", self.rollout_timeout.as_secs());
        self.kubectl(
            &["rollout", "status", &target, "-n", namespace, &wait],
            self.rollout_timeout + self.timeout,
            "kubectl rollout status",
        )
        .await
        .map(|out| out.trim().to_string())
    }

    async fn pod_names(&self, namespace: &str) -> Result<Vec<String>, ProbeError> {
        let out = self
            .kubectl(
                &[
                    "get",
                    "pods",
                    "-n",
                    namespace,
                    "--no-headers",
                    "-o",
                    NAME_COLUMN,
                ],
                self.timeout,
                "kubectl get pods",
            )
            .await?;
        Ok(non_empty_lines(&out))
    }

    async fn pods_with_selector(
        &self,
        selector: &str,
        namespace: &str,
    ) -> Result<Vec<String>, ProbeError> {
        let out = self
            .kubectl(
                &[
                    "get",
                    "pods",
                    "-n",
                    namespace,
                    "-l",
                    selector,
                    "--no-headers",
                    "-o",
                    NAME_COLUMN,
                ],
                self.timeout,
                "kubectl get pods -l",
            )
            .await?;
        Ok(non_empty_lines(&out))
    }

    async fn pod_line(&self, pod: &str, namespace: &str) -> Result<String, ProbeError> {
        let out = self
            .kubectl(
                &["get", "pod", pod, "-n", namespace, "--no-headers"],
                self.timeout,
                "kubectl get pod",
            )
            .await?;
        Ok(out.lines().next().unwrap_or_default().to_string())
    }

    async fn pod_table(
        &self,
        query: PodQuery<'_>,
        namespace: &str,
        wide: bool,
    ) -> Result<String, ProbeError> {
        let mut args = query.get_args(namespace);
        if wide {
            args.extend(["-o", "wide"]);
        }
        self.kubectl(&args, self.timeout, "kubectl get").await
    }

    async fn pod_rows(
        &self,
        query: PodQuery<'_>,
        namespace: &str,
    ) -> Result<Vec<String>, ProbeError> {
        let mut args = query.get_args(namespace);
        args.push("--no-headers");
        let out = self.kubectl(&args, self.timeout, "kubectl get").await?;
        Ok(non_empty_lines(&out))
    }

    async fn describe_pod(&self, pod: &str, namespace: &str) -> Result<String, ProbeError> {
        self.kubectl(
            &["describe", "pod", pod, "-n", namespace],
            self.timeout,
            "kubectl describe pod",
        )
        .await
    }
}

const NAME_COLUMN: &str = "custom-columns=NAME:.metadata.name";

fn non_empty_lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs a command to completion, killing it when `timeout` elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, ProbeError> {
    cmd.kill_on_drop(true);
    jj_debug!("{label}: {:?}", cmd.as_std());
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ProbeError::Spawn {
                label: label.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(ProbeError::Timeout {
                label: label.to_string(),
                timeout,
            })
        }
    };
    if !output.status.success() {
        return Err(ProbeError::ExitStatus {
            label: label.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// How a command attached to the terminal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attached {
    Exited(Option<i32>),
    /// The user interrupted and the command was killed.
    Interrupted,
}

/// Runs a command on the inherited terminal until it exits or the user
/// interrupts it.
pub async fn run_attached<S: InterruptSource>(
    mut cmd: Command,
    interrupts: &mut S,
    label: &str,
) -> Result<Attached, ProbeError> {
    cmd.kill_on_drop(true);
    jj_debug!("{label}: {:?}", cmd.as_std());
    let spawn_error = |source| ProbeError::Spawn {
        label: label.to_string(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_error)?;
    tokio::select! {
        status = child.wait() => Ok(Attached::Exited(status.map_err(spawn_error)?.code())),
        () = async move {
            if !interrupts.next_interrupt().await {
                std::future::pending::<()>().await;
            }
        } => {
            if let Err(err) = child.kill().await {
                jj_debug!("{label}: kill failed: {err}");
            }
            Ok(Attached::Interrupted)
        }
    }
}
