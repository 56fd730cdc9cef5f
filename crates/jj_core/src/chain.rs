/// A parent build and one of its declared downstream projects.
///
/// Used once to locate the child's own build or queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub parent_job: String,
    pub parent_build: u64,
    pub child_job: String,
}

impl ChainLink {
    pub fn new(
        parent_job: impl Into<String>,
        parent_build: u64,
        child_job: impl Into<String>,
    ) -> Self {
        Self {
            parent_job: parent_job.into(),
            parent_build,
            child_job: child_job.into(),
        }
    }

    /// True when an upstream cause names this link's parent build.
    pub fn is_caused_by(
        &self,
        upstream_project: Option<&str>,
        upstream_build: Option<u64>,
    ) -> bool {
        upstream_project == Some(self.parent_job.as_str())
            && upstream_build == Some(self.parent_build)
    }
}

/// Up to `depth` build numbers ending at `last`, oldest first.
pub fn recent_build_numbers(last: u64, depth: u64) -> Vec<u64> {
    if last == 0 || depth == 0 {
        return Vec::new();
    }
    let first = last.saturating_sub(depth - 1).max(1);
    (first..=last).collect()
}

#[cfg(test)]
mod tests {
    use super::{recent_build_numbers, ChainLink};

    #[test]
    fn cause_must_match_project_and_build() {
        let link = ChainLink::new("build-app", 12, "deploy-app");
        assert!(link.is_caused_by(Some("build-app"), Some(12)));
        assert!(!link.is_caused_by(Some("build-app"), Some(11)));
        assert!(!link.is_caused_by(Some("other"), Some(12)));
        assert!(!link.is_caused_by(None, Some(12)));
    }

    #[test]
    fn history_window_is_clamped_at_first_build() {
        assert_eq!(recent_build_numbers(20, 6), vec![15, 16, 17, 18, 19, 20]);
        assert_eq!(recent_build_numbers(3, 6), vec![1, 2, 3]);
        assert!(recent_build_numbers(0, 6).is_empty());
    }
}
