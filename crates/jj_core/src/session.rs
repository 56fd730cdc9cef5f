/// The job currently being watched, as seen by the cancellation path.
///
/// Zero means "not known yet" for both identifiers, matching the build
/// server's numbering which starts at one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionSession {
    pub job: String,
    pub queue_id: u64,
    pub build_number: u64,
}

impl ExecutionSession {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        !self.job.is_empty()
    }

    pub fn is_queued_only(&self) -> bool {
        self.queue_id != 0 && self.build_number == 0
    }
}
