//! `jj k8s`: pod status, logs and shells for an application.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use console::Term;
use jj_core::{
    alternative_selectors, choose_pods, parse_pod_line, picked_pods, pod_age_of, pod_name_of,
    PodChoice, PodReadiness, PodTarget,
};
use jj_engine::{
    run_attached, Attached, ClusterProbe, CtrlC, InterruptSource, KubectlProbe, PodQuery,
    LOG_TAIL_LINES,
};
use jj_logging::{jj_debug, jj_info, jj_warn};

use crate::cli::PodsArgs;
use crate::terminal::{describe_pod, Notice, Tone};

const WATCH_EVERY: Duration = Duration::from_secs(5);
const RULE_WIDTH: usize = 50;

pub async fn k8s(args: PodsArgs) -> Result<()> {
    let kubectl = KubectlProbe::default();
    let mut out = std::io::stdout();
    let Some(target) = resolve_target(&kubectl, &args, read_answer(), &mut out).await? else {
        return Ok(());
    };
    jj_info!("k8s target {target:?} in namespace {}", args.namespace);
    let namespace = args.namespace.as_str();
    let mut interrupts = CtrlC::default();

    if args.logs {
        let Some(pod) = log_pod(&kubectl, &target, namespace, &mut out).await? else {
            return Ok(());
        };
        let follow = !args.no_follow;
        return stream_logs(&kubectl, &pod, namespace, follow, &mut interrupts, &mut out).await;
    }
    if args.watch {
        return watch(&kubectl, &target, namespace, WATCH_EVERY, &mut interrupts, &mut out).await;
    }

    show(&kubectl, &target, &args, &mut out).await?;
    if args.exec {
        let picked = shell_pod(&target, args.app.as_deref(), read_answer(), &mut out).await?;
        if let Some(pod) = picked {
            enter(&kubectl, &pod, namespace, &mut interrupts, &mut out).await?;
        }
    }
    Ok(())
}

async fn read_answer() -> Result<String> {
    let line = tokio::task::spawn_blocking(|| Term::stdout().read_line())
        .await
        .context("prompt task failed")?;
    line.context("failed to read choice")
}

/// Turns the app pattern into pods, asking the user to pick when several
/// pod names match. `None` when the user picked nothing.
async fn resolve_target(
    cluster: &dyn ClusterProbe,
    args: &PodsArgs,
    answer: impl Future<Output = Result<String>>,
    out: &mut impl Write,
) -> Result<Option<PodTarget>> {
    let names = match args.app {
        Some(_) => cluster.pod_names(&args.namespace).await.unwrap_or_else(|err| {
            jj_warn!("listing pods in {} failed: {err}", args.namespace);
            Vec::new()
        }),
        None => Vec::new(),
    };
    let candidates = match choose_pods(names.iter().map(String::as_str), args.app.as_deref()) {
        PodChoice::Target(target) => return Ok(Some(target)),
        PodChoice::Ambiguous(candidates) => candidates,
    };

    let pattern = args.app.as_deref().unwrap_or_default();
    writeln!(out, "\nfound {} pods matching '{pattern}':", candidates.len())?;
    for (index, pod) in candidates.iter().enumerate() {
        writeln!(out, "{}. {pod}", index + 1)?;
    }
    write!(out, "\npick pods (1,3 or 1 3; enter cancels): ")?;
    out.flush()?;

    let picked = picked_pods(&candidates, &answer.await?);
    if picked.is_empty() {
        writeln!(out, "no pod picked")?;
        return Ok(None);
    }
    writeln!(out, "picked: {}\n", picked.join(", "))?;
    Ok(Some(PodTarget::Named(picked)))
}

fn listing(target: &PodTarget) -> PodQuery<'_> {
    match target {
        PodTarget::Selector(selector) => PodQuery::Selector(selector),
        PodTarget::Everything | PodTarget::Named(_) => PodQuery::All,
    }
}

async fn show(
    cluster: &dyn ClusterProbe,
    target: &PodTarget,
    args: &PodsArgs,
    out: &mut impl Write,
) -> Result<()> {
    let namespace = args.namespace.as_str();
    writeln!(out, "pods in namespace {namespace}:")?;
    if let PodTarget::Named(pods) = target {
        for pod in pods {
            match cluster.pod_table(PodQuery::Named(pod), namespace, true).await {
                Ok(table) => write!(out, "{table}")?,
                Err(err) => writeln!(out, "{pod}: status lookup failed: {err}")?,
            }
        }
        if args.detailed {
            describe_all(cluster, pods, namespace, out).await?;
        }
        return Ok(());
    }

    if args.detailed {
        if let Some(selector) = target.selector() {
            writeln!(out, "selector: {selector}")?;
        }
    }
    let found = match cluster.pod_table(listing(target), namespace, !args.simple).await {
        Ok(table) if table.trim().is_empty() => false,
        Ok(table) => {
            writeln!(out, "{table}")?;
            true
        }
        Err(err) => {
            writeln!(out, "listing pods failed: {err}")?;
            false
        }
    };
    if !found {
        match target.selector() {
            Some(selector) => try_alternatives(cluster, selector, namespace, out).await?,
            None => writeln!(out, "no matching pods")?,
        }
        return Ok(());
    }

    if args.detailed && !args.simple {
        let rows = cluster
            .pod_rows(listing(target), namespace)
            .await
            .context("failed to list pods")?;
        let pods: Vec<String> = rows
            .iter()
            .filter_map(|row| pod_name_of(row))
            .map(str::to_string)
            .collect();
        describe_all(cluster, &pods, namespace, out).await?;
    }
    Ok(())
}

/// Retries an `app=` selector under the other common label keys.
async fn try_alternatives(
    cluster: &dyn ClusterProbe,
    selector: &str,
    namespace: &str,
    out: &mut impl Write,
) -> Result<()> {
    let Some(app) = selector.strip_prefix("app=") else {
        writeln!(out, "no matching pods")?;
        return Ok(());
    };
    writeln!(out, "trying other label selectors...")?;
    for alternative in alternative_selectors(app) {
        if alternative == selector {
            continue;
        }
        match cluster
            .pod_table(PodQuery::Selector(&alternative), namespace, true)
            .await
        {
            Ok(table) if !table.trim().is_empty() => {
                writeln!(out, "pods matching {alternative}:")?;
                writeln!(out, "{table}")?;
                return Ok(());
            }
            Ok(_) => {}
            Err(err) => jj_debug!("selector {alternative} failed: {err}"),
        }
    }
    writeln!(out, "no matching pods")?;
    Ok(())
}

async fn describe_all(
    cluster: &dyn ClusterProbe,
    pods: &[String],
    namespace: &str,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "\npod details:")?;
    for pod in pods {
        writeln!(out, "\npod: {pod}")?;
        match cluster.describe_pod(pod, namespace).await {
            Ok(text) => writeln!(out, "{text}")?,
            Err(err) => writeln!(out, "  describe failed: {err}")?,
        }
    }
    Ok(())
}

fn pod_notice(pod: &str, row: &str) -> Notice {
    let mut notice = describe_pod(pod, &parse_pod_line(row));
    if let Some(age) = pod_age_of(row) {
        notice.text.push_str(&format!(", age {age}"));
    }
    notice
}

async fn watch_round(
    cluster: &dyn ClusterProbe,
    target: &PodTarget,
    namespace: &str,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "{} - checking pod status...", Local::now().format("%H:%M:%S"))?;
    match target {
        PodTarget::Named(pods) => {
            for pod in pods {
                let notice = match cluster.pod_line(pod, namespace).await {
                    Ok(line) => pod_notice(pod, &line),
                    Err(err) => {
                        Notice::new(Tone::Bad, format!("{pod}: status lookup failed: {err}"))
                    }
                };
                writeln!(out, "{}", notice.styled())?;
            }
        }
        _ => match cluster.pod_rows(listing(target), namespace).await {
            Ok(rows) if rows.is_empty() => writeln!(out, "no matching pods")?,
            Ok(rows) => {
                for row in &rows {
                    let pod = pod_name_of(row).unwrap_or("?");
                    writeln!(out, "{}", pod_notice(pod, row).styled())?;
                }
            }
            Err(err) => {
                let notice = Notice::new(Tone::Bad, format!("watch failed: {err}"));
                writeln!(out, "{}", notice.styled())?;
            }
        },
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    out.flush()?;
    Ok(())
}

/// Prints a status round every `every` until the user interrupts.
async fn watch<S: InterruptSource>(
    cluster: &dyn ClusterProbe,
    target: &PodTarget,
    namespace: &str,
    every: Duration,
    interrupts: &mut S,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "watching pods in namespace {namespace} (ctrl-c to stop)")?;
    match target {
        PodTarget::Named(pods) => writeln!(out, "pods: {}", pods.join(", "))?,
        PodTarget::Selector(selector) => writeln!(out, "selector: {selector}")?,
        PodTarget::Everything => {}
    }
    writeln!(out)?;

    let mut ticker = tokio::time::interval(every);
    let mut listening = true;
    loop {
        tokio::select! {
            _ = ticker.tick() => watch_round(cluster, target, namespace, out).await?,
            interrupted = interrupts.next_interrupt(), if listening => {
                if interrupted {
                    writeln!(out, "\nstopped watching")?;
                    return Ok(());
                }
                listening = false;
            }
        }
    }
}

/// The pod whose logs are shown: the first of the target.
async fn log_pod(
    cluster: &dyn ClusterProbe,
    target: &PodTarget,
    namespace: &str,
    out: &mut impl Write,
) -> Result<Option<String>> {
    let pods = match target {
        PodTarget::Named(pods) => pods.clone(),
        PodTarget::Selector(selector) => cluster.pods_with_selector(selector, namespace).await?,
        PodTarget::Everything => cluster.pod_names(namespace).await?,
    };
    let Some(first) = pods.first() else {
        writeln!(out, "no matching pods")?;
        return Ok(None);
    };
    if pods.len() > 1 {
        writeln!(out, "{} pods selected, showing logs of {first}", pods.len())?;
    }
    Ok(Some(first.clone()))
}

async fn stream_logs<S: InterruptSource>(
    kubectl: &KubectlProbe,
    pod: &str,
    namespace: &str,
    follow: bool,
    interrupts: &mut S,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "logs of {pod} (namespace {namespace})")?;
    if follow {
        writeln!(out, "last {LOG_TAIL_LINES} lines, following (ctrl-c to stop)")?;
    } else {
        writeln!(out, "last {LOG_TAIL_LINES} lines")?;
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    out.flush()?;

    let command = kubectl.logs_command(pod, namespace, follow);
    match run_attached(command, interrupts, "kubectl logs").await? {
        Attached::Exited(Some(0)) => {}
        Attached::Exited(code) => bail!("kubectl logs for {pod} exited with {code:?}"),
        Attached::Interrupted => writeln!(out, "\nlog stream stopped")?,
    }
    Ok(())
}

/// The pod to open a shell in; several picked pods are narrowed to one.
async fn shell_pod(
    target: &PodTarget,
    app: Option<&str>,
    answer: impl Future<Output = Result<String>>,
    out: &mut impl Write,
) -> Result<Option<String>> {
    let pods = match target {
        PodTarget::Named(pods) if pods.len() == 1 => return Ok(pods.first().cloned()),
        PodTarget::Named(pods) => pods,
        _ => match app {
            Some(app) => return Ok(Some(app.to_string())),
            None => bail!("name the pod to open a shell in"),
        },
    };
    writeln!(out, "several pods picked, choose the one to enter:")?;
    for (index, pod) in pods.iter().enumerate() {
        writeln!(out, "{}. {pod}", index + 1)?;
    }
    write!(out, "pod number: ")?;
    out.flush()?;
    let picked = picked_pods(pods, &answer.await?).into_iter().next();
    if picked.is_none() {
        writeln!(out, "no pod picked")?;
    }
    Ok(picked)
}

/// A shell only makes sense in a running pod.
fn ensure_running(pod: &str, line: &str) -> Result<()> {
    match parse_pod_line(line) {
        PodReadiness::Ready { .. } | PodReadiness::NotReady { .. } => Ok(()),
        PodReadiness::Missing => bail!("pod {pod} does not exist"),
        PodReadiness::Unhealthy { status, .. } => bail!("pod {pod} is not running ({status})"),
        PodReadiness::Unparsed(line) => bail!("pod {pod} has an unexpected status line {line:?}"),
    }
}

async fn enter<S: InterruptSource>(
    kubectl: &KubectlProbe,
    pod: &str,
    namespace: &str,
    interrupts: &mut S,
    out: &mut impl Write,
) -> Result<()> {
    let line = kubectl
        .pod_line(pod, namespace)
        .await
        .with_context(|| format!("pod {pod} is not reachable"))?;
    ensure_running(pod, &line)?;
    writeln!(out, "entering pod {pod}...")?;
    out.flush()?;

    let command = kubectl.exec_command(pod, namespace);
    match run_attached(command, interrupts, "kubectl exec").await? {
        Attached::Exited(Some(0)) | Attached::Interrupted => {}
        Attached::Exited(code) => {
            jj_warn!("kubectl exec in {pod} exited with {code:?}");
            writeln!(out, "kubectl exec exited with {code:?}")?;
        }
    }
    Ok(())
}
