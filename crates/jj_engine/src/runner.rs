use std::sync::Arc;

use jj_core::{resolve_parameters, ChainLink};
use jj_logging::jj_info;

use crate::chain::DownstreamWalker;
use crate::{ApiError, BuildWatcher, JenkinsApi, JobInfo, WatchError, WatchEvent};

/// Triggers a job and follows it and its downstream chain to the end.
pub struct JobRunner {
    watcher: BuildWatcher,
}

impl JobRunner {
    pub fn new(watcher: BuildWatcher) -> Self {
        Self { watcher }
    }

    fn api(&self) -> &Arc<dyn JenkinsApi> {
        &self.watcher.api
    }

    pub async fn job_info(&self, job: &str) -> Result<JobInfo, WatchError> {
        self.api().job_info(job).await.map_err(|err| not_found_as_job(err, job))
    }

    /// Runs `job` with `supplied` parameter overrides. Resolves after the
    /// last downstream project finished.
    pub async fn run(&self, job: &str, supplied: &[(String, String)]) -> Result<(), WatchError> {
        let info = self.job_info(job).await?;
        let params = resolve_parameters(
            info.parameter_definitions()
                .map(|def| (def.name.as_str(), def.default_value())),
            supplied,
        );

        let session = &self.watcher.session;
        session.begin(job);
        let watched = self.run_root(job, &params).await;
        session.clear();
        let number = watched?;

        for project in &info.downstream_projects {
            let link = ChainLink::new(job, number, project.name.as_str());
            let followed = DownstreamWalker::new(&self.watcher).follow(&link).await;
            session.clear();
            followed?;
        }

        jj_info!("{job} chain finished");
        self.watcher.sink.emit(WatchEvent::ChainDone {
            job: job.to_string(),
        });
        Ok(())
    }

    async fn run_root(&self, job: &str, params: &[(String, String)]) -> Result<u64, WatchError> {
        let queue_id = self.api().trigger_build(job, params).await?;
        self.watcher.session.set_queue(queue_id);
        self.watcher.sink.emit(WatchEvent::Triggered {
            job: job.to_string(),
            queue_id,
        });
        let number = self.watcher.wait_for_executor(job, queue_id).await?;
        self.watcher.watch_build(job, number).await?;
        Ok(number)
    }
}

fn not_found_as_job(err: ApiError, job: &str) -> WatchError {
    if err.is_not_found() {
        WatchError::JobNotFound(job.to_string())
    } else {
        WatchError::Api(err)
    }
}
