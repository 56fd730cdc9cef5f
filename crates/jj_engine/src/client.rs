use std::time::Duration;

use jj_logging::jj_debug;
use reqwest::header::LOCATION;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;

use crate::types::{BuildListing, JobListing};
use crate::{
    ApiError, BuildInfo, BuildSummary, ConsoleChunk, Cursor, FailureKind, JobInfo, QueueItem,
    QueueListing,
};

const TEXT_SIZE_HEADER: &str = "X-Text-Size";
const MORE_DATA_HEADER: &str = "X-More-Data";
const RECENT_BUILDS_TREE: &str = "builds[number,result,timestamp,duration,building]{0,20}";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub user: Option<String>,
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            user: None,
            token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Remote operations the watcher needs from the build server.
#[async_trait::async_trait]
pub trait JenkinsApi: Send + Sync {
    async fn job_info(&self, job: &str) -> Result<JobInfo, ApiError>;

    /// `None` when the job never succeeded.
    async fn last_successful_build(&self, job: &str) -> Result<Option<BuildInfo>, ApiError>;

    /// Enqueues a build and returns its queue id.
    async fn trigger_build(&self, job: &str, params: &[(String, String)]) -> Result<u64, ApiError>;

    async fn queue_item(&self, queue_id: u64) -> Result<QueueItem, ApiError>;

    async fn queue(&self) -> Result<Vec<QueueItem>, ApiError>;

    async fn build_info(&self, job: &str, number: u64) -> Result<BuildInfo, ApiError>;

    async fn console(&self, job: &str, number: u64, cursor: &Cursor)
        -> Result<ConsoleChunk, ApiError>;

    async fn console_text(&self, job: &str, number: u64) -> Result<String, ApiError>;

    async fn cancel_queue(&self, queue_id: u64) -> Result<(), ApiError>;

    async fn stop_build(&self, job: &str, number: u64) -> Result<(), ApiError>;

    async fn list_jobs(&self) -> Result<Vec<String>, ApiError>;

    async fn recent_builds(&self, job: &str) -> Result<Vec<BuildSummary>, ApiError>;

    /// Browser link to a build's console page.
    fn console_url(&self, job: &str, number: u64) -> String;
}

/// Maps a folder-qualified job name (`team/app`) onto its URL path.
pub fn job_path(job: &str) -> String {
    job.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("job/{segment}"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Queue id from the `Location` header of a trigger response.
pub fn queue_id_from_location(location: &str) -> Option<u64> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|id| id.parse().ok())
}

#[derive(Debug, Clone)]
pub struct ReqwestJenkins {
    settings: ClientSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestJenkins {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let mut base = settings.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    fn job_url(&self, job: &str, tail: &str) -> Result<Url, ApiError> {
        self.url(&format!("{}/{tail}", job_path(job)))
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response, ApiError> {
        jj_debug!("{} {}", method, url);
        let accept_redirect = method == Method::POST;
        let mut request = self.client.request(method, url);
        if let Some(user) = &self.settings.user {
            request = request.basic_auth(user, self.settings.token.as_ref());
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() || (accept_redirect && status.is_redirection()) {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::new(
                FailureKind::NotFound,
                response.url().path().to_string(),
            ));
        }
        Err(ApiError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.send(Method::GET, url).await?;
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))
    }
}

#[async_trait::async_trait]
impl JenkinsApi for ReqwestJenkins {
    async fn job_info(&self, job: &str) -> Result<JobInfo, ApiError> {
        self.get_json(self.job_url(job, "api/json")?).await
    }

    async fn last_successful_build(&self, job: &str) -> Result<Option<BuildInfo>, ApiError> {
        match self
            .get_json(self.job_url(job, "lastSuccessfulBuild/api/json")?)
            .await
        {
            Ok(build) => Ok(Some(build)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn trigger_build(&self, job: &str, params: &[(String, String)]) -> Result<u64, ApiError> {
        let url = if params.is_empty() {
            self.job_url(job, "build")?
        } else {
            let mut url = self.job_url(job, "buildWithParameters")?;
            url.query_pairs_mut().extend_pairs(params);
            url
        };
        let response = self.send(Method::POST, url).await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        queue_id_from_location(location).ok_or_else(|| {
            ApiError::new(
                FailureKind::MissingQueueLocation,
                format!("location header was '{location}'"),
            )
        })
    }

    async fn queue_item(&self, queue_id: u64) -> Result<QueueItem, ApiError> {
        self.get_json(self.url(&format!("queue/item/{queue_id}/api/json"))?)
            .await
    }

    async fn queue(&self) -> Result<Vec<QueueItem>, ApiError> {
        let listing: QueueListing = self.get_json(self.url("queue/api/json")?).await?;
        Ok(listing.items)
    }

    async fn build_info(&self, job: &str, number: u64) -> Result<BuildInfo, ApiError> {
        self.get_json(self.job_url(job, &format!("{number}/api/json"))?)
            .await
    }

    async fn console(
        &self,
        job: &str,
        number: u64,
        cursor: &Cursor,
    ) -> Result<ConsoleChunk, ApiError> {
        let mut url = self.job_url(job, &format!("{number}/logText/progressiveHtml"))?;
        url.query_pairs_mut().append_pair("start", cursor.as_str());
        let response = self.send(Method::GET, url).await?;
        let headers = response.headers();
        let next_cursor = headers
            .get(TEXT_SIZE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Cursor::new)
            .unwrap_or_else(|| cursor.clone());
        let more_data = headers
            .get(MORE_DATA_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
        let text = response.text().await.map_err(map_reqwest_error)?;
        Ok(ConsoleChunk {
            text,
            next_cursor,
            more_data,
        })
    }

    async fn console_text(&self, job: &str, number: u64) -> Result<String, ApiError> {
        let response = self
            .send(Method::GET, self.job_url(job, &format!("{number}/consoleText"))?)
            .await?;
        response.text().await.map_err(map_reqwest_error)
    }

    async fn cancel_queue(&self, queue_id: u64) -> Result<(), ApiError> {
        let mut url = self.url("queue/cancelItem")?;
        url.query_pairs_mut()
            .append_pair("id", &queue_id.to_string());
        self.send(Method::POST, url).await.map(|_| ())
    }

    async fn stop_build(&self, job: &str, number: u64) -> Result<(), ApiError> {
        self.send(Method::POST, self.job_url(job, &format!("{number}/stop"))?)
            .await
            .map(|_| ())
    }

    async fn list_jobs(&self) -> Result<Vec<String>, ApiError> {
        let mut url = self.url("api/json")?;
        url.query_pairs_mut().append_pair("tree", "jobs[name]");
        let listing: JobListing = self.get_json(url).await?;
        Ok(listing.jobs.into_iter().map(|job| job.name).collect())
    }

    async fn recent_builds(&self, job: &str) -> Result<Vec<BuildSummary>, ApiError> {
        let mut url = self.job_url(job, "api/json")?;
        url.query_pairs_mut().append_pair("tree", RECENT_BUILDS_TREE);
        let listing: BuildListing = self.get_json(url).await?;
        Ok(listing.builds)
    }

    fn console_url(&self, job: &str, number: u64) -> String {
        format!("{}{}/{number}/console", self.base, job_path(job))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ApiError::new(FailureKind::Decode, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
