//! `run` and `check`: drive the scenario file against the target

use crate::cli::{BenchArgs, RunArgs};
use crate::report::RunReport;
use anyhow::{bail, Context, Result};
use loadcheck_config::LoadcheckConfig;
use loadcheck_core::RunContext;
use loadcheck_http::HttpSettings;
use loadcheck_metrics::create_counters;
use loadcheck_pool::UserPool;
use loadcheck_runner::{cancel_on_interrupt, Orchestrator, RunSettings};
use loadcheck_scenario::ScenarioSet;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fold the command line over the loaded configuration
pub fn apply_overrides(
    config: &mut LoadcheckConfig,
    bench: &BenchArgs,
    run: Option<&RunArgs>,
) -> Result<()> {
    if let Some(target) = &bench.target {
        config.target.url = target.clone();
    }
    if let Some(users) = &bench.users {
        config.users.file = Some(users.clone());
    }
    if let Some(run) = run {
        if let Some(workers) = run.workers {
            config.run.workers = workers;
        }
        if let Some(duration) = run.duration {
            config.run.duration = Duration::from_secs(duration);
        }
        if let Some(seed) = run.seed {
            config.run.seed = Some(seed);
        }
        if run.skip_checks {
            config.run.skip_checks = true;
        }
    }
    config
        .validate_all()
        .context("Invalid configuration after command line overrides")?;
    Ok(())
}

struct Bench {
    orchestrator: Orchestrator,
    scenarios: ScenarioSet,
    report: RunReport,
}

fn prepare(config: &LoadcheckConfig, bench: &BenchArgs) -> Result<Bench> {
    let scenarios = ScenarioSet::from_file(&bench.scenarios)
        .with_context(|| format!("Failed to load scenarios from {:?}", bench.scenarios))?;

    let seeds = config.users.load_seeds().context("Failed to load seed users")?;
    if seeds.is_empty() {
        bail!("No users configured: add users.seeds to the config or pass --users");
    }

    let http = HttpSettings::try_from(config).context("Invalid target settings")?;
    let settings = RunSettings::from(&config.run);
    let pool = UserPool::seeded(seeds, http.session().clone(), settings.seed)
        .context("Failed to build the user pool")?;
    info!("{} users in the pool", pool.len());

    let report = RunReport::new(http.base_url().as_str(), &settings);
    let orchestrator = Orchestrator::new(settings, pool, create_counters(), http);
    Ok(Bench {
        orchestrator,
        scenarios,
        report,
    })
}

/// Run the pre-test checks; `false` once the report carries a failure
async fn run_checks(bench: &mut Bench, ctx: &RunContext) -> bool {
    let checks = bench.scenarios.checks();
    if checks.is_empty() {
        warn!("Scenario file defines no pre-test checks");
        return true;
    }
    match bench.orchestrator.run_checks(ctx, &checks).await {
        Ok(report) => {
            bench.report.checks = Some(report);
            true
        }
        Err(err) => {
            error!("Pre-test failed: {}", err);
            bench.report.fail(err.to_string());
            false
        }
    }
}

fn finish(mut bench: Bench, ctx: &RunContext, args: &BenchArgs) -> Result<ExitCode> {
    // Only an interrupt cancels the outer context
    if ctx.is_cancelled() {
        bench.report.set_interrupted();
    }
    ctx.cancel();

    println!("{}", bench.report.render(args.output)?);
    Ok(if bench.report.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `loadcheck run`
pub async fn run(config: &LoadcheckConfig, args: &RunArgs) -> Result<ExitCode> {
    let mut bench = prepare(config, &args.bench)?;
    if bench.scenarios.scenario_names().is_empty() {
        bail!("Scenario file {:?} defines no load scenarios", args.bench.scenarios);
    }

    let ctx = RunContext::new();
    let _interrupt = cancel_on_interrupt(ctx.clone());

    if config.run.skip_checks {
        info!("Skipping pre-test checks");
    } else if !run_checks(&mut bench, &ctx).await {
        return finish(bench, &ctx, &args.bench);
    }

    match bench.orchestrator.run_load(&ctx, &bench.scenarios.table()).await {
        Ok(summary) => bench.report.set_load(summary),
        Err(err) => {
            error!("Load phase failed: {}", err);
            bench.report.fail(err.to_string());
        }
    }
    finish(bench, &ctx, &args.bench)
}

/// `loadcheck check`
pub async fn check(config: &LoadcheckConfig, args: &BenchArgs) -> Result<ExitCode> {
    let mut bench = prepare(config, args)?;
    if bench.scenarios.check_names().is_empty() {
        bail!("Scenario file {:?} defines no checks", args.scenarios);
    }

    let ctx = RunContext::new();
    let _interrupt = cancel_on_interrupt(ctx.clone());
    run_checks(&mut bench, &ctx).await;
    finish(bench, &ctx, args)
}
