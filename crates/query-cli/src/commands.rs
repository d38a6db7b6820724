use crate::config::{Config, OutputFormat};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{Cell, Color, Table as ComfyTable};
use query_cache::{
    CacheMetrics, CacheMetricsSnapshot, CachePolicy, Canonicalizer, MemoryResultStore,
    SegmentEvent, SegmentRegistry, SegmentSignatureService, TimeoutResultStore,
};
use query_core::{simplify, AggregationQuery, Interval, QueryContext};
use query_executor::{BackendResponse, CachedQueryExecutor, QueryBackend};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub fn load_query(path: &Path) -> Result<AggregationQuery> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file {:?}", path))?;
    let query: AggregationQuery = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid query in {:?}", path))?;
    query.validate()?;
    Ok(query)
}

pub fn show_key(query_file: &Path, config: &Config) -> Result<()> {
    let query = load_query(query_file)?;
    let canonicalizer = Canonicalizer::default();
    let key = canonicalizer.canonicalize(&query)?;

    match config.output_format {
        OutputFormat::Json => {
            let out = json!({
                "key": key.as_str(),
                "checksum": key.checksum(),
                "length": key.len(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            let mut table = ComfyTable::new();
            table.set_header(vec![
                Cell::new("Property").fg(Color::Cyan),
                Cell::new("Value").fg(Color::Yellow),
            ]);
            table.add_row(vec!["Canonical key".to_string(), key.to_string()]);
            table.add_row(vec!["Checksum".to_string(), key.checksum()]);
            table.add_row(vec!["Length".to_string(), key.len().to_string()]);
            table.add_row(vec![
                "Omitted fields".to_string(),
                canonicalizer.omitted_fields().collect::<Vec<_>>().join(", "),
            ]);
            println!("{}", table);
        }
    }

    Ok(())
}

pub fn init_config(path: &Path, config: &Config) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file {:?}", path);
    }
    config.save(path)?;
    println!(
        "{} Configuration written to {:?}",
        "✓".bright_green(),
        path
    );
    Ok(())
}

/// A replayable sequence of queries and segment changes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Segment events applied before the first step
    #[serde(default)]
    pub segments: Vec<SegmentEvent>,
    /// Data at or after this instant is reported as volatile
    #[serde(default)]
    pub volatile_from: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    Query {
        #[serde(default)]
        label: Option<String>,
        query: AggregationQuery,
    },
    Segments {
        events: Vec<SegmentEvent>,
    },
}

/// Backend answering from the segment registry
///
/// The payload lists the segments a query would scan, so an answer changes
/// exactly when the segment set does.
pub struct ScenarioBackend {
    registry: Arc<SegmentRegistry>,
    volatile_from: Option<DateTime<Utc>>,
    calls: AtomicUsize,
}

impl ScenarioBackend {
    pub fn new(registry: Arc<SegmentRegistry>, volatile_from: Option<DateTime<Utc>>) -> Self {
        Self {
            registry,
            volatile_from,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn missing_intervals(&self, query: &AggregationQuery) -> Vec<Interval> {
        simplify(
            query
                .data_source
                .table_names()
                .into_iter()
                .flat_map(|table| self.registry.missing(table, &query.intervals)),
        )
    }

    fn volatile_intervals(&self, query: &AggregationQuery) -> Vec<Interval> {
        let Some(from) = self.volatile_from else {
            return Vec::new();
        };
        simplify(
            query
                .intervals
                .iter()
                .filter(|interval| interval.end() > from)
                .filter_map(|interval| {
                    Interval::new(interval.start().max(from), interval.end()).ok()
                }),
        )
    }
}

#[async_trait]
impl QueryBackend for ScenarioBackend {
    async fn execute(&self, query: &AggregationQuery) -> query_core::Result<BackendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut segments = Vec::new();
        for table in query.data_source.table_names() {
            if let Some(found) = self.registry.segments_intersecting(table, &query.intervals) {
                segments.extend(found.iter().map(|segment| segment.identifier()));
            }
        }
        segments.sort();

        let rows = segments.len();
        let payload = json!([{ "segments": segments, "rows": rows }]);
        Ok(BackendResponse::new(payload)
            .with_missing_intervals(self.missing_intervals(query))
            .with_volatile_intervals(self.volatile_intervals(query)))
    }

    fn name(&self) -> &str {
        "scenario"
    }
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub label: String,
    /// `None` for segment steps
    pub source: Option<String>,
    pub detail: String,
    pub elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub steps: Vec<StepReport>,
    pub metrics: CacheMetricsSnapshot,
    pub hit_rate: f64,
    pub backend_calls: usize,
}

pub async fn run_scenario(scenario: Scenario, config: &Config) -> Result<ReplayReport> {
    let registry = Arc::new(SegmentRegistry::new());
    for event in scenario.segments {
        registry.apply(event);
    }

    let backend = Arc::new(ScenarioBackend::new(
        Arc::clone(&registry),
        scenario.volatile_from,
    ));
    let store = TimeoutResultStore::new(
        MemoryResultStore::new(config.cache.store.clone()),
        config.cache.store.operation_timeout(),
    );
    let policy = CachePolicy::new(
        config.cache.clone(),
        Arc::new(store),
        Arc::new(SegmentSignatureService::new(Arc::clone(&registry))),
        Arc::new(CacheMetrics::new()),
    );
    let executor = CachedQueryExecutor::new(backend.clone(), Arc::new(policy));

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.into_iter().enumerate() {
        let step_no = index + 1;
        match step {
            Step::Query { label, mut query } => {
                if query.query_id().is_none() {
                    query
                        .context
                        .insert(QueryContext::QUERY_ID, Uuid::new_v4().to_string());
                }

                let start = Instant::now();
                let response = executor
                    .execute(query)
                    .await
                    .with_context(|| format!("Step {} failed", step_no))?;
                let elapsed = start.elapsed();
                executor.flush_cache_writes().await;

                steps.push(StepReport {
                    step: step_no,
                    label: label.unwrap_or_else(|| format!("query {}", step_no)),
                    source: Some(response.source.to_string()),
                    detail: format!(
                        "missing={} volatile={}",
                        response.missing_intervals.len(),
                        response.volatile_intervals.len()
                    ),
                    elapsed_ms: elapsed.as_secs_f64() * 1000.0,
                });
            }
            Step::Segments { events } => {
                let applied = events.len();
                for event in events {
                    debug!(event = ?event, "Applying segment event");
                    registry.apply(event);
                }
                steps.push(StepReport {
                    step: step_no,
                    label: "segments".to_string(),
                    source: None,
                    detail: format!(
                        "{} event(s) applied, {} segment(s) loaded",
                        applied,
                        registry.segment_count()
                    ),
                    elapsed_ms: 0.0,
                });
            }
        }
    }

    let metrics = executor.cache_metrics();
    Ok(ReplayReport {
        steps,
        metrics: metrics.snapshot(),
        hit_rate: metrics.hit_rate(),
        backend_calls: backend.calls(),
    })
}

pub async fn replay(scenario_file: &Path, config: &Config) -> Result<()> {
    println!(
        "{} Replaying scenario {:?}",
        "→".bright_blue(),
        scenario_file
    );

    let contents = std::fs::read_to_string(scenario_file)
        .with_context(|| format!("Failed to read scenario {:?}", scenario_file))?;
    let scenario: Scenario = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid scenario in {:?}", scenario_file))?;

    info!(
        steps = scenario.steps.len(),
        segments = scenario.segments.len(),
        "Scenario loaded"
    );

    let report = run_scenario(scenario, config).await?;
    match config.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report, config.show_timing),
    }

    Ok(())
}

fn print_report(report: &ReplayReport, show_timing: bool) {
    let mut table = ComfyTable::new();
    let mut header = vec![
        Cell::new("Step").fg(Color::Cyan),
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Source").fg(Color::Yellow),
        Cell::new("Detail").fg(Color::Green),
    ];
    if show_timing {
        header.push(Cell::new("Time (ms)").fg(Color::Magenta));
    }
    table.set_header(header);

    for step in &report.steps {
        let source = match step.source.as_deref() {
            Some("cache") => Cell::new("cache").fg(Color::Green),
            Some(source) => Cell::new(source).fg(Color::Yellow),
            None => Cell::new("-"),
        };
        let mut row = vec![
            Cell::new(step.step),
            Cell::new(&step.label),
            source,
            Cell::new(&step.detail),
        ];
        if show_timing {
            row.push(Cell::new(format!("{:.2}", step.elapsed_ms)));
        }
        table.add_row(row);
    }
    println!("{}", table);

    let mut metrics = ComfyTable::new();
    metrics.set_header(vec![
        Cell::new("Metric").fg(Color::Cyan),
        Cell::new("Value").fg(Color::Yellow),
    ]);
    for (name, value) in report.metrics.counters() {
        metrics.add_row(vec![name.to_string(), value.to_string()]);
    }
    metrics.add_row(vec![
        "hit_rate".to_string(),
        format!("{:.1}%", report.hit_rate * 100.0),
    ]);
    metrics.add_row(vec![
        "backend_calls".to_string(),
        report.backend_calls.to_string(),
    ]);
    println!("{}", metrics);
}
