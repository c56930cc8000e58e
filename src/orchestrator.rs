//! Consumer-facing orchestrator. Wires the token manager, GraphQL
//! client, snapshot cache, and job queue into the two operations an
//! embedding application actually calls: `analyze` and `job_status`.
//!
//! A request whose snapshot is already cached (or fetches fast enough)
//! returns its `AnalyzerResult` inline. Anything slower is admitted to
//! the job queue and the caller gets back a job id to poll instead of
//! blocking the calling task indefinitely.

use crate::analyzers::{
    add_damage, combined, deaths, ghost_misses, hits, phase1_mechanics, phase_damage, AnalyzerResult,
};
use crate::cache::{Probe, SnapshotCache};
use crate::error::{EngineError, Result};
use crate::graphql_client::GraphQlClient;
use crate::job_queue::{JobQueue, JobStatus};
use crate::merger;
use crate::models::{DataType, Fingerprint, FightFilter, ReportCode, ReportSnapshot};
use crate::report_fetcher::{self, FetchRequest};
use crate::settings::Settings;
use crate::token_manager::TokenManager;
use futures::future::try_join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// The analyzer to run and its configuration, bundled so one request
/// fully determines both what data to fetch and how to interpret it.
#[derive(Debug, Clone)]
pub enum AnalyzerKind {
    Hits(hits::HitCounterConfig),
    Ghosts(ghost_misses::GhostMissConfig),
    Combined(combined::CombinedConfig),
    PhaseDamage(phase_damage::PhaseDamageConfig),
    AddDamage(add_damage::AddDamageConfig),
    Deaths(deaths::DeathsConfig),
    Phase1Mechanics(phase1_mechanics::Phase1MechanicsConfig),
}

impl AnalyzerKind {
    fn data_types(&self) -> Vec<DataType> {
        match self {
            AnalyzerKind::Hits(_) => vec![DataType::DamageDone, DataType::Deaths],
            AnalyzerKind::Ghosts(_) => vec![DataType::Debuffs],
            AnalyzerKind::Combined(_) => vec![DataType::DamageDone, DataType::Deaths, DataType::Debuffs],
            AnalyzerKind::PhaseDamage(_) => vec![DataType::DamageDone, DataType::Healing],
            AnalyzerKind::AddDamage(_) => vec![DataType::DamageDone],
            AnalyzerKind::Deaths(_) => vec![DataType::Deaths, DataType::Debuffs],
            AnalyzerKind::Phase1Mechanics(_) => vec![DataType::Debuffs, DataType::DamageDone],
        }
    }

    fn id(&self) -> &'static str {
        match self {
            AnalyzerKind::Hits(_) => "hits",
            AnalyzerKind::Ghosts(_) => "ghosts",
            AnalyzerKind::Combined(_) => "combined",
            AnalyzerKind::PhaseDamage(_) => "phase_damage",
            AnalyzerKind::AddDamage(_) => "add_damage",
            AnalyzerKind::Deaths(_) => "deaths",
            AnalyzerKind::Phase1Mechanics(_) => "phase1_mechanics",
        }
    }

    fn run(&self, snapshot: &ReportSnapshot) -> Result<AnalyzerResult> {
        let started = std::time::Instant::now();
        let result = match self {
            AnalyzerKind::Hits(cfg) => hits::analyze(snapshot, cfg),
            AnalyzerKind::Ghosts(cfg) => ghost_misses::analyze(snapshot, cfg),
            AnalyzerKind::Combined(cfg) => combined::analyze(snapshot, cfg),
            AnalyzerKind::PhaseDamage(cfg) => phase_damage::analyze(snapshot, cfg),
            AnalyzerKind::AddDamage(cfg) => add_damage::analyze(snapshot, cfg),
            AnalyzerKind::Deaths(cfg) => deaths::analyze(snapshot, cfg),
            AnalyzerKind::Phase1Mechanics(cfg) => phase1_mechanics::analyze(snapshot, cfg),
        };
        crate::metrics::record_analyzer_duration(self.id(), started.elapsed().as_millis() as f64);
        result
    }
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub report_codes: Vec<ReportCode>,
    pub fight_filter: FightFilter,
    pub ability_ids: Vec<i64>,
    pub analyzer: AnalyzerKind,
}

/// What `Orchestrator::analyze` hands back: either the finished result,
/// or a job id the caller should poll via `job_status`.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ready(AnalyzerResult),
    Queued(Uuid),
}

pub struct Orchestrator {
    graphql: Arc<GraphQlClient>,
    cache: Arc<SnapshotCache>,
    jobs: Arc<JobQueue<AnalyzerResult>>,
    fast_return_threshold: Duration,
    max_inflight_per_job: usize,
}

impl Orchestrator {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.upstream.http_timeout_seconds))
            .build()
            .map_err(|e| EngineError::Other(anyhow::anyhow!(e)))?;

        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            settings.credentials.clone(),
            &settings.upstream,
        ));
        let graphql = Arc::new(GraphQlClient::new(
            http,
            &settings.upstream.base_url,
            tokens,
            settings.upstream.points_per_second,
        ));
        let cache = Arc::new(SnapshotCache::new(
            settings.cache.capacity,
            Duration::from_secs(settings.cache.ttl_seconds),
        ));
        let jobs = Arc::new(JobQueue::new(
            settings.performance.max_concurrent_reports,
            Duration::from_secs(settings.queue.completed_job_ttl_seconds),
            Duration::from_secs(settings.performance.job_timeout_seconds),
        ));

        Ok(Self {
            graphql,
            cache,
            jobs,
            fast_return_threshold: Duration::from_millis(settings.queue.fast_return_threshold_ms),
            max_inflight_per_job: settings.performance.max_inflight_per_job,
        })
    }

    /// Runs `request`, returning the result inline when the snapshot is
    /// already cached or the fetch completes within the configured
    /// fast-return threshold, otherwise admitting it as a background
    /// job and returning its id.
    #[instrument(skip(self, request))]
    pub async fn analyze(&self, request: ReportRequest) -> Result<Outcome> {
        if request.report_codes.is_empty() {
            return Err(EngineError::BadRequest("report_codes must not be empty".into()));
        }

        let data_types = request.analyzer.data_types();
        let fingerprint = Fingerprint::compute(
            &request.report_codes,
            &request.fight_filter,
            &data_types,
            &request.ability_ids,
        );

        if let Some(snapshot) = self.cache.peek(&fingerprint).await {
            return Ok(Outcome::Ready(request.analyzer.run(&snapshot)?));
        }

        let graphql = self.graphql.clone();
        let cache = self.cache.clone();
        let report_codes = request.report_codes.clone();
        let fight_filter = request.fight_filter.clone();
        let ability_ids = request.ability_ids.clone();
        let analyzer = request.analyzer.clone();
        let started = Instant::now();
        let max_inflight_per_job = self.max_inflight_per_job;

        let job_id = self.jobs.submit(move |_cancel| async move {
            let claim = match cache.get_or_claim(&fingerprint).await {
                Probe::Hit(snapshot) => return analyzer.run(&snapshot),
                Probe::Miss(guard) => guard,
            };

            let snapshot = match fetch_merged_snapshot(
                &graphql,
                &report_codes,
                &fight_filter,
                &ability_ids,
                &data_types,
                max_inflight_per_job,
            )
            .await
            {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    claim.fail(&cache);
                    return Err(e);
                }
            };

            let snapshot = Arc::new(snapshot);
            claim.publish(&cache, snapshot.clone()).await;
            analyzer.run(&snapshot)
        });

        // Give the job a short window to finish before committing to the
        // async job-polling path; most cache-cold single-report fetches
        // land comfortably within the configured threshold.
        loop {
            if started.elapsed() >= self.fast_return_threshold {
                info!(job_id = %job_id, "fetch exceeded fast-return threshold, returning job handle");
                return Ok(Outcome::Queued(job_id));
            }
            match self.jobs.status(job_id).map(|s| s.state) {
                Some(crate::job_queue::JobState::Completed) => {
                    return Ok(Outcome::Ready(self.jobs.result(job_id).transpose()?.ok_or_else(
                        || EngineError::Other(anyhow::anyhow!("completed job missing result")),
                    )?));
                }
                Some(crate::job_queue::JobState::Failed) | Some(crate::job_queue::JobState::Canceled) => {
                    return self
                        .jobs
                        .result(job_id)
                        .transpose()?
                        .map(Outcome::Ready)
                        .map_or_else(|| Err(EngineError::Canceled), Ok);
                }
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    }

    pub fn job_status(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs.status(id)
    }

    pub fn job_result(&self, id: Uuid) -> Option<Result<AnalyzerResult>> {
        self.jobs.result(id)
    }

    pub fn cancel_job(&self, id: Uuid) {
        self.jobs.cancel(id);
    }

    pub fn sweep_expired_jobs(&self) {
        self.jobs.sweep_expired();
    }
}

async fn fetch_merged_snapshot(
    graphql: &GraphQlClient,
    report_codes: &[ReportCode],
    fight_filter: &FightFilter,
    ability_ids: &[i64],
    data_types: &[DataType],
    max_inflight_per_job: usize,
) -> Result<ReportSnapshot> {
    let fetches = report_codes.iter().map(|code| {
        let request = FetchRequest {
            report_code: code.clone(),
            fight_filter: fight_filter.clone(),
            data_types: data_types.to_vec(),
            ability_ids: ability_ids.to_vec(),
            max_inflight: max_inflight_per_job,
        };
        async move { report_fetcher::fetch_report(graphql, &request).await }
    });

    let mut snapshots = try_join_all(fetches).await?;
    if snapshots.len() == 1 {
        Ok(snapshots.remove(0))
    } else {
        Ok(merger::merge_snapshots(snapshots))
    }
}
