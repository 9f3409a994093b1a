//! `sync`: configured job phases, each job a child process of this binary.

use std::ffi::OsString;
use std::path::Path;
use std::process::ExitStatus;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::utils::{Timer, fmt_duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub phase: &'static str,
    pub args: Vec<String>,
}

/// Steps in run order: core, squads, then detail when asked for.
pub fn plan(cfg: &SyncConfig, include_detail: bool) -> Vec<Step> {
    let mut phases = vec![("core", &cfg.core), ("squads", &cfg.squads)];
    if include_detail {
        phases.push(("detail", &cfg.detail));
    }
    phases
        .into_iter()
        .flat_map(|(phase, jobs)| {
            jobs.iter()
                .filter(|args| !args.is_empty())
                .map(move |args| Step {
                    phase,
                    args: args.clone(),
                })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub passed: usize,
    pub failed: usize,
}

/// Run one child to completion; spawn failures count as a failed step.
pub async fn run_step(program: &Path, global: &[OsString], step: &Step) -> Option<ExitStatus> {
    let label = step.args.join(" ");
    println!("▶ [{}] {}", step.phase, label);
    let timer = Timer::start(label.clone());

    let status = Command::new(program)
        .args(global)
        .args(&step.args)
        .status()
        .await;
    let took = fmt_duration(timer.elapsed());

    match status {
        Ok(s) if s.success() => {
            println!("✔ [{}] {} ({})", step.phase, label, took);
            Some(s)
        }
        Ok(s) => {
            let code = s.code().map_or("signal".to_string(), |c| c.to_string());
            println!("✘ [{}] {} ({}, exit {})", step.phase, label, took, code);
            Some(s)
        }
        Err(e) => {
            warn!("could not start {}: {}", label, e);
            println!("✘ [{}] {} (not started)", step.phase, label);
            None
        }
    }
}

/// Run every step sequentially. A failing child never stops the run.
pub async fn sync(
    cfg: &SyncConfig,
    include_detail: bool,
    global: &[OsString],
) -> Result<SyncReport> {
    let exe = std::env::current_exe().context("Failed to locate the running binary")?;
    let steps = plan(cfg, include_detail);
    info!("sync: {} steps", steps.len());

    let mut report = SyncReport::default();
    for step in &steps {
        match run_step(&exe, global, step).await {
            Some(s) if s.success() => report.passed += 1,
            _ => report.failed += 1,
        }
    }
    println!("sync finished: {} passed, {} failed", report.passed, report.failed);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SyncConfig {
        SyncConfig {
            core: vec![vec!["espn-results".into()], vec![]],
            squads: vec![vec!["kbo-players".into()]],
            detail: vec![vec!["espn-season-stats".into(), "--year".into(), "2024".into()]],
            include_detail: false,
        }
    }

    #[test]
    fn test_plan_order_and_detail_flag() {
        let without = plan(&cfg(), false);
        assert_eq!(
            without.iter().map(|s| s.phase).collect::<Vec<_>>(),
            vec!["core", "squads"]
        );
        let with = plan(&cfg(), true);
        assert_eq!(with.len(), 3);
        assert_eq!(with[2].args, vec!["espn-season-stats", "--year", "2024"]);
    }

    #[tokio::test]
    async fn test_failed_child_is_reported() {
        let step = Step {
            phase: "core",
            args: vec!["-c".into(), "exit 3".into()],
        };
        let status = run_step(Path::new("/bin/sh"), &[], &step).await.unwrap();
        assert_eq!(status.code(), Some(3));

        let ok = Step {
            phase: "core",
            args: vec!["-c".into(), "true".into()],
        };
        assert!(run_step(Path::new("/bin/sh"), &[], &ok).await.unwrap().success());
    }

    #[test]
    fn test_missing_program_is_not_a_panic() {
        let step = Step {
            phase: "squads",
            args: vec![],
        };
        let status = tokio_test::block_on(run_step(
            Path::new("/nonexistent/sportslab-sync"),
            &[],
            &step,
        ));
        assert!(status.is_none());
    }
}
