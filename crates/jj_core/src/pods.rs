/// Which pods a `jj k8s` invocation works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodTarget {
    /// Every pod in the namespace.
    Everything,
    Named(Vec<String>),
    /// No pod name matched; the pattern is tried as an `app` label.
    Selector(String),
}

impl PodTarget {
    pub fn selector(&self) -> Option<&str> {
        match self {
            PodTarget::Selector(selector) => Some(selector),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodChoice {
    Target(PodTarget),
    /// Several pods match; the user picks one or more.
    Ambiguous(Vec<String>),
}

/// Pods whose name starts with `pattern`, ignoring case, in listing order.
pub fn matching_pods<'a>(names: impl IntoIterator<Item = &'a str>, pattern: &str) -> Vec<String> {
    let needle = pattern.to_lowercase();
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.to_lowercase().starts_with(&needle))
        .map(str::to_string)
        .collect()
}

pub fn choose_pods<'a>(
    names: impl IntoIterator<Item = &'a str>,
    pattern: Option<&str>,
) -> PodChoice {
    let Some(pattern) = pattern.filter(|p| !p.trim().is_empty()) else {
        return PodChoice::Target(PodTarget::Everything);
    };
    let matches = matching_pods(names, pattern);
    match matches.len() {
        0 => PodChoice::Target(PodTarget::Selector(format!("app={pattern}"))),
        1 => PodChoice::Target(PodTarget::Named(matches)),
        _ => PodChoice::Ambiguous(matches),
    }
}

/// One-based picks from a numbered list, separated by commas or blanks.
/// Numbers out of range and junk are dropped.
pub fn picked_pods(candidates: &[String], answer: &str) -> Vec<String> {
    let answer = answer.trim();
    let parts: Vec<&str> = if answer.contains(',') {
        answer.split(',').collect()
    } else {
        answer.split_whitespace().collect()
    };
    parts
        .into_iter()
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .filter_map(|index| candidates.get(index.checked_sub(1)?))
        .cloned()
        .collect()
}

/// First column of a `--no-headers` pod row.
pub fn pod_name_of(row: &str) -> Option<&str> {
    row.split_whitespace().next()
}

/// Age column of a `--no-headers` pod row, if the row has one.
pub fn pod_age_of(row: &str) -> Option<&str> {
    row.split_whitespace().nth(4)
}
