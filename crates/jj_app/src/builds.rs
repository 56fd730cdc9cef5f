//! `jj builds`: read-only view of a job's recent builds.

use std::fmt::Display;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use jj_engine::{
    BuildInfo, BuildSummary, ClientSettings, InputMux, JenkinsApi, JobInfo, ReqwestJenkins,
};

use crate::cli::BuildsArgs;
use crate::select::resolve_job;

const RULE: &str = "----------------------------------------";

pub async fn builds(settings: ClientSettings, args: BuildsArgs) -> Result<()> {
    let api = ReqwestJenkins::new(settings)?;
    let job = resolve_job(&api, &InputMux::stdin(), &args.pattern).await?;
    let info = api
        .job_info(&job)
        .await
        .with_context(|| format!("failed to read job {job}"))?;

    match args.number {
        None => {
            let builds = api
                .recent_builds(&job)
                .await
                .with_context(|| format!("failed to list builds of {job}"))?;
            print!("{}", job_summary(&job, &info));
            println!("recent builds:");
            println!("number\tstatus\t\tduration\tstarted\t\t\tconsole");
            println!("{}", "-".repeat(80));
            for build in &builds {
                let console_url = api.console_url(&job, build.number);
                println!("{}", build_row(build, &console_url, &Local));
            }
        }
        Some(number) => {
            let build = api
                .build_info(&job, number)
                .await
                .with_context(|| format!("failed to read {job} #{number}"))?;
            print!("{}", build_detail(&build, &api.console_url(&job, number)));
            if args.verbose {
                let text = api
                    .console_text(&job, number)
                    .await
                    .with_context(|| format!("failed to read console of {job} #{number}"))?;
                println!("\nconsole output:\n{RULE}\n{text}");
            }
        }
    }
    Ok(())
}

fn job_summary(job: &str, info: &JobInfo) -> String {
    let completed = info.last_completed_build.as_ref().map_or(0, |b| b.number);
    format!(
        "\njob: {job}\nlatest build: #{}\nlast completed build: #{completed}\nin queue: {}\n\n",
        info.next_build_number.saturating_sub(1),
        info.in_queue
    )
}

fn status_label(build: &BuildSummary) -> &str {
    if build.building {
        return "building";
    }
    match build.result.as_deref() {
        Some(result) if !result.is_empty() => result,
        _ => "unknown",
    }
}

/// `XmYs` from milliseconds.
fn format_duration(millis: u64) -> String {
    format!("{}m{}s", millis / 60_000, (millis % 60_000) / 1_000)
}

fn format_start<Tz>(timestamp_ms: i64, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|at| at.with_timezone(zone).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn build_row<Tz>(build: &BuildSummary, console_url: &str, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "#{}\t{}\t\t{}\t{}\t{console_url}",
        build.number,
        status_label(build),
        format_duration(build.duration),
        format_start(build.timestamp, zone),
    )
}

fn build_detail(build: &BuildInfo, console_url: &str) -> String {
    let mut out = format!(
        "\nbuild #{}:\n{RULE}\nstatus: {}\nbuilding: {}\nduration: {}s\nconsole: {console_url}\n",
        build.number,
        build.result.as_deref().unwrap_or(""),
        build.building,
        build.duration / 1_000,
    );
    let params: Vec<_> = build.parameters().collect();
    if !params.is_empty() {
        out.push_str("parameters:\n");
        for param in params {
            let name = param.name.as_deref().unwrap_or("?");
            out.push_str(&format!("  {name} = {}\n", param.value_string()));
        }
    }
    out
}
