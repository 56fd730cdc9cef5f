use std::io::Write;

use anyhow::{bail, Context, Result};
use jj_core::{choose_job, JobChoice};
use jj_engine::{InputMux, JenkinsApi};
use jj_logging::jj_info;

/// Resolves a user pattern to one job name, asking the user to pick when
/// several jobs match.
pub async fn resolve_job(api: &dyn JenkinsApi, input: &InputMux, pattern: &str) -> Result<String> {
    let names = api.list_jobs().await.context("failed to list jobs")?;
    let candidates = match choose_job(names.iter().map(String::as_str), pattern) {
        JobChoice::Resolved(job) => return Ok(job),
        JobChoice::NoMatch => bail!("no job matches '{pattern}'"),
        JobChoice::Ambiguous(candidates) => candidates,
    };

    println!("\nfound {} matching jobs:", candidates.len());
    for (index, name) in candidates.iter().enumerate() {
        println!("{}. {name}", index + 1);
    }
    print!("choose a job [1-{}]: ", candidates.len());
    std::io::stdout().flush().context("failed to write prompt")?;

    let answer = input.read_line().await.context("failed to read choice")?;
    let job = pick(&candidates, &answer).with_context(|| format!("invalid choice '{answer}'"))?;
    jj_info!("picked {job} for pattern {pattern}");
    Ok(job)
}

/// One-based choice from a numbered list.
fn pick(candidates: &[String], answer: &str) -> Option<String> {
    let index: usize = answer.trim().parse().ok()?;
    candidates.get(index.checked_sub(1)?).cloned()
}

#[cfg(test)]
mod tests {
    use super::pick;

    #[test]
    fn picks_are_one_based_and_bounded() {
        let jobs = vec!["api-deploy".to_string(), "web-deploy".to_string()];
        assert_eq!(pick(&jobs, " 2\n"), Some("web-deploy".to_string()));
        assert_eq!(pick(&jobs, "0"), None);
        assert_eq!(pick(&jobs, "3"), None);
        assert_eq!(pick(&jobs, "web"), None);
    }
}
