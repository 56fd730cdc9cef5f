use std::collections::BTreeSet;

/// Outcome of matching a user pattern against the server's job names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobChoice {
    /// Exact name or the only candidate.
    Resolved(String),
    /// Several candidates, sorted; the user has to pick.
    Ambiguous(Vec<String>),
    NoMatch,
}

/// Case-insensitive substring match, deduplicated and sorted.
pub fn matching_jobs<'a>(names: impl IntoIterator<Item = &'a str>, pattern: &str) -> Vec<String> {
    let needle = pattern.to_lowercase();
    names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&needle))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn choose_job<'a>(names: impl IntoIterator<Item = &'a str>, pattern: &str) -> JobChoice {
    let mut candidates = matching_jobs(names, pattern);
    if candidates.iter().any(|name| name == pattern) {
        return JobChoice::Resolved(pattern.to_string());
    }
    match candidates.len() {
        0 => JobChoice::NoMatch,
        1 => JobChoice::Resolved(candidates.remove(0)),
        _ => JobChoice::Ambiguous(candidates),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid argument '{0}', expected key=val")]
pub struct AssignmentError(pub String);

/// Splits a `key=val` command-line argument at its first `=`.
pub fn parse_assignment(raw: &str) -> Result<(String, String), AssignmentError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(AssignmentError(raw.to_string())),
    }
}

/// Values to submit for a job's declared parameters: supplied value when
/// present, declared default otherwise. Undeclared keys are dropped.
pub fn resolve_parameters<'a>(
    declared: impl IntoIterator<Item = (&'a str, String)>,
    supplied: &[(String, String)],
) -> Vec<(String, String)> {
    declared
        .into_iter()
        .map(|(name, default)| {
            let value = supplied
                .iter()
                .rev()
                .find(|(key, _)| key == name)
                .map_or(default, |(_, value)| value.clone());
            (name.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_requires_key_and_separator() {
        assert_eq!(
            parse_assignment("branch=main"),
            Ok(("branch".to_string(), "main".to_string()))
        );
        assert_eq!(
            parse_assignment("url=a=b"),
            Ok(("url".to_string(), "a=b".to_string()))
        );
        assert!(parse_assignment("branch").is_err());
        assert!(parse_assignment("=main").is_err());
    }
}
