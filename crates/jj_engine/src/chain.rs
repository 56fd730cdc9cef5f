use jj_core::{recent_build_numbers, ChainLink};
use jj_logging::jj_debug;

use crate::{BuildWatcher, Discovery, WatchError, WatchEvent};

/// Locates the downstream build started by a finished parent and watches it.
pub struct DownstreamWalker<'a> {
    watcher: &'a BuildWatcher,
}

impl<'a> DownstreamWalker<'a> {
    pub fn new(watcher: &'a BuildWatcher) -> Self {
        Self { watcher }
    }

    /// Retries discovery until the child shows up in its recent history or
    /// in the queue, then watches it like any other build.
    pub async fn follow(&self, link: &ChainLink) -> Result<(), WatchError> {
        let child = link.child_job.as_str();
        self.watcher.session.begin(child);
        let mut announced = false;
        loop {
            if let Some(number) = self.find_in_history(link).await? {
                self.found(child, Discovery::History { build_number: number });
                self.watcher.session.set_build(number);
                return self.watcher.watch_build(child, number).await;
            }
            if let Some(queue_id) = self.find_in_queue(link).await {
                self.found(child, Discovery::Queue { queue_id });
                self.watcher.session.set_queue(queue_id);
                let number = self.watcher.wait_for_executor(child, queue_id).await?;
                return self.watcher.watch_build(child, number).await;
            }
            if !announced {
                announced = true;
                self.watcher.sink.emit(WatchEvent::DownstreamPending {
                    parent: link.parent_job.clone(),
                    child: child.to_string(),
                });
            }
            tokio::time::sleep(self.watcher.settings.downstream_retry).await;
        }
    }

    fn found(&self, child: &str, discovery: Discovery) {
        self.watcher.sink.emit(WatchEvent::DownstreamFound {
            child: child.to_string(),
            discovery,
        });
    }

    async fn find_in_history(&self, link: &ChainLink) -> Result<Option<u64>, WatchError> {
        let info = match self.watcher.api.job_info(&link.child_job).await {
            Ok(info) => info,
            Err(err) if err.is_not_found() => {
                return Err(WatchError::JobNotFound(link.child_job.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        let depth = self.watcher.settings.downstream_history_depth;
        for number in recent_build_numbers(info.last_build_number(), depth).into_iter().rev() {
            let build = match self.watcher.api.build_info(&link.child_job, number).await {
                Ok(build) => build,
                Err(err) => {
                    jj_debug!("skipping {} #{number}: {err}", link.child_job);
                    continue;
                }
            };
            if build
                .causes()
                .any(|c| link.is_caused_by(c.upstream_project.as_deref(), c.upstream_build))
            {
                return Ok(Some(number));
            }
        }
        Ok(None)
    }

    async fn find_in_queue(&self, link: &ChainLink) -> Option<u64> {
        let items = match self.watcher.api.queue().await {
            Ok(items) => items,
            Err(err) => {
                jj_debug!("queue listing failed: {err}");
                return None;
            }
        };
        items
            .iter()
            .filter(|item| item.task_name() == Some(link.child_job.as_str()))
            .find(|item| {
                item.causes()
                    .any(|c| link.is_caused_by(c.upstream_project.as_deref(), c.upstream_build))
            })
            .map(|item| item.id)
    }
}
