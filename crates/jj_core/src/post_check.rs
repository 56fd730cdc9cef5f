/// Console/job-name needles that mark a frontend or asset build, which has no
/// workload to check in the cluster.
pub const DEFAULT_SKIP_NEEDLES: &[&str] = &[
    "front-boohee",
    "yarn",
    "front/asset/",
    "front/chunkScript",
    "Webpack",
];

const JOB_PREFIXES: &[&str] = &[
    "deploy-",
    "deployment-",
    "k8s-",
    "kubernetes-",
    "build-",
    "ci-",
    "cd-",
    "pipeline-",
    "job-",
    "rc-",
];

const JOB_SUFFIXES: &[&str] = &[
    "-deploy",
    "-deployment",
    "-k8s",
    "-kubernetes",
    "-build",
    "-ci",
    "-cd",
    "-pipeline",
    "-prod",
    "-production",
    "-staging",
    "-dev",
    "-development",
    "-test",
    "-testing",
    "-uat",
];

/// Decides whether the post-success cluster check should be skipped.
pub trait PostCheckFilter: Send + Sync {
    fn skip_for_job(&self, job: &str) -> bool;
    fn skip_for_line(&self, line: &str) -> bool;
}

/// Plain substring matching against a list of needles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringFilter {
    needles: Vec<String>,
}

impl SubstringFilter {
    pub fn new<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            needles: needles
                .into_iter()
                .map(Into::into)
                .filter(|n: &String| !n.is_empty())
                .collect(),
        }
    }

    pub fn with_extra<I, S>(mut self, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needles
            .extend(needles.into_iter().map(Into::into).filter(|n: &String| !n.is_empty()));
        self
    }

    fn matches(&self, text: &str) -> bool {
        self.needles.iter().any(|needle| text.contains(needle.as_str()))
    }
}

impl Default for SubstringFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_NEEDLES.iter().copied())
    }
}

impl PostCheckFilter for SubstringFilter {
    fn skip_for_job(&self, job: &str) -> bool {
        self.matches(job)
    }

    fn skip_for_line(&self, line: &str) -> bool {
        self.matches(line.trim())
    }
}

/// Infer the cluster deployment name from a build job name.
pub fn deployment_name_for_job(job: &str) -> String {
    let lowered = job.to_lowercase();
    let mut name = lowered.as_str();
    if let Some(stripped) = JOB_PREFIXES.iter().find_map(|p| name.strip_prefix(*p)) {
        name = stripped;
    }
    if let Some(stripped) = JOB_SUFFIXES.iter().find_map(|s| name.strip_suffix(*s)) {
        name = stripped;
    }

    let sanitized = sanitize_resource_name(name);
    if sanitized.is_empty() {
        sanitize_resource_name(&lowered)
    } else {
        sanitized
    }
}

fn sanitize_resource_name(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Label selectors tried, in order, when no pod name matches a deployment.
pub fn alternative_selectors(deployment: &str) -> Vec<String> {
    ["app", "app.kubernetes.io/name", "name", "service", "component"]
        .iter()
        .map(|key| format!("{key}={deployment}"))
        .collect()
}

/// Readiness of one pod, from a `kubectl get pod --no-headers` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodReadiness {
    Ready { ready: String },
    NotReady { status: String, ready: String },
    Unhealthy { status: String, ready: String },
    Missing,
    Unparsed(String),
}

/// Parse `NAME READY STATUS RESTARTS AGE`.
pub fn parse_pod_line(line: &str) -> PodReadiness {
    let line = line.trim();
    if line.is_empty() {
        return PodReadiness::Missing;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return PodReadiness::Unparsed(line.to_string());
    }
    let ready = fields[1].to_string();
    let status = fields[2].to_string();
    if status != "Running" {
        return PodReadiness::Unhealthy { status, ready };
    }
    match ready.split_once('/') {
        Some((up, want)) if up == want => PodReadiness::Ready { ready },
        Some(_) => PodReadiness::NotReady { status, ready },
        None => PodReadiness::Unhealthy { status, ready },
    }
}
