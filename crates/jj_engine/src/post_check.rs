use std::sync::Arc;
use std::time::Duration;

use jj_core::{alternative_selectors, deployment_name_for_job, parse_pod_line};
use jj_logging::{jj_info, jj_warn};

use crate::probe::ClusterProbe;
use crate::{EventSink, PostCheckEvent, WatchEvent};

/// Work to run after a job succeeds.
#[async_trait::async_trait]
pub trait PostCheck: Send + Sync {
    async fn run(&self, job: &str);
}

#[derive(Debug, Clone)]
pub struct PostCheckSettings {
    pub namespace: String,
    pub overall_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PostCheckSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            overall_timeout: Duration::from_secs(100),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// More than this many failed pod lookups means the pods were replaced.
const REPLACED_AFTER_FAILURES: usize = 1;

/// Watches the pods of a freshly deployed service until they settle or get
/// replaced by the rollout.
pub struct PostDeployCheck {
    probe: Arc<dyn ClusterProbe>,
    sink: Arc<dyn EventSink>,
    settings: PostCheckSettings,
}

impl PostDeployCheck {
    pub fn new(
        probe: Arc<dyn ClusterProbe>,
        sink: Arc<dyn EventSink>,
        settings: PostCheckSettings,
    ) -> Self {
        Self { probe, sink, settings }
    }

    fn emit(&self, event: PostCheckEvent) {
        self.sink.emit(WatchEvent::PostCheck(event));
    }

    async fn check(&self, deployment: &str) {
        let ns = self.settings.namespace.as_str();
        let rollout = self
            .probe
            .rollout_status(deployment, ns)
            .await
            .map_err(|err| err.to_string());
        self.emit(PostCheckEvent::Rollout {
            deployment: deployment.to_string(),
            outcome: rollout,
        });

        let pods = match self.probe.pod_names(ns).await {
            Ok(names) => names
                .into_iter()
                .filter(|name| name.to_lowercase().starts_with(deployment))
                .collect::<Vec<_>>(),
            Err(err) => {
                jj_warn!("listing pods failed: {err}");
                Vec::new()
            }
        };
        if pods.is_empty() {
            self.emit(PostCheckEvent::NoPods {
                deployment: deployment.to_string(),
            });
            self.try_selectors(deployment).await;
            return;
        }

        self.emit(PostCheckEvent::PodsFound { pods: pods.clone() });
        self.watch_pods(&pods).await;
    }

    async fn try_selectors(&self, deployment: &str) {
        for selector in alternative_selectors(deployment) {
            match self
                .probe
                .pods_with_selector(&selector, &self.settings.namespace)
                .await
            {
                Ok(pods) if !pods.is_empty() => {
                    self.emit(PostCheckEvent::SelectorMatched { selector, pods });
                    return;
                }
                Ok(_) => {}
                Err(err) => jj_warn!("selector {selector} failed: {err}"),
            }
        }
        self.emit(PostCheckEvent::NoSelectorMatched {
            deployment: deployment.to_string(),
        });
    }

    async fn watch_pods(&self, pods: &[String]) {
        let mut failures = 0;
        loop {
            self.emit(PostCheckEvent::RoundStarted);
            let mut last_failed = None;
            for pod in pods {
                match self.probe.pod_line(pod, &self.settings.namespace).await {
                    Ok(line) => self.emit(PostCheckEvent::PodStatus {
                        pod: pod.clone(),
                        readiness: parse_pod_line(&line),
                    }),
                    Err(err) => {
                        failures += 1;
                        last_failed = Some(pod.clone());
                        self.emit(PostCheckEvent::LookupFailed {
                            pod: pod.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
            if failures > REPLACED_AFTER_FAILURES {
                if let Some(pod) = last_failed {
                    self.emit(PostCheckEvent::RolledOver { pod });
                    return;
                }
            }
            self.emit(PostCheckEvent::RoundDone);
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait::async_trait]
impl PostCheck for PostDeployCheck {
    async fn run(&self, job: &str) {
        let deployment = deployment_name_for_job(job);
        if deployment.is_empty() {
            self.emit(PostCheckEvent::NoDeploymentName {
                job: job.to_string(),
            });
            return;
        }
        jj_info!("post-deploy check for {job} on deployment {deployment}");
        self.emit(PostCheckEvent::Started {
            job: job.to_string(),
            deployment: deployment.clone(),
        });
        let limit = self.settings.overall_timeout;
        if tokio::time::timeout(limit, self.check(&deployment)).await.is_err() {
            self.emit(PostCheckEvent::TimedOut {
                secs: limit.as_secs(),
            });
        }
    }
}
