//! Thin CLI demonstrating the orchestrator: fetches one report and
//! prints the hit-counter result for a given ability as JSON.

use clap::Parser;
use raidlog_report_engine::analyzers::hits::HitCounterConfig;
use raidlog_report_engine::models::{FightFilter, ReportCode};
use raidlog_report_engine::orchestrator::{AnalyzerKind, ReportRequest};
use raidlog_report_engine::{Orchestrator, Outcome, Settings};

#[derive(Parser, Debug)]
#[command(author, version, about = "Query the Warcraft Logs report engine")]
struct Args {
    /// Report code or full report URL.
    #[arg(long)]
    report: String,

    /// Ability id to count hits for.
    #[arg(long)]
    ability_id: i64,

    /// Only count the first hit per pull per target.
    #[arg(long, default_value_t = false)]
    first_hit_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber_init();
    raidlog_report_engine::metrics::describe_metrics();

    let args = Args::parse();
    let settings = Settings::load()?;
    let orchestrator = Orchestrator::new(&settings)?;

    let report_code = ReportCode::parse(&args.report)
        .ok_or_else(|| anyhow::anyhow!("could not parse report code from '{}'", args.report))?;

    let request = ReportRequest {
        report_codes: vec![report_code],
        fight_filter: FightFilter::AllBosses,
        ability_ids: vec![args.ability_id],
        analyzer: AnalyzerKind::Hits(HitCounterConfig {
            ability_id: args.ability_id,
            first_hit_only: args.first_hit_only,
            ignore_after_deaths: None,
            ignore_final_seconds: None,
        }),
    };

    match orchestrator.analyze(request).await? {
        Outcome::Ready(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Outcome::Queued(job_id) => {
            println!("queued as job {job_id}, poll with job_status");
        }
    }

    Ok(())
}

#[cfg(feature = "observability")]
fn tracing_subscriber_init() {
    tracing_subscriber::fmt::init();
    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        tracing::warn!(error = %e, "failed to install prometheus metrics exporter");
    }
}

#[cfg(not(feature = "observability"))]
fn tracing_subscriber_init() {
    env_logger::init();
}
