//! JS-bridge benchmarks: translated python against equivalent native js.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use super::{geometric_mean, metric_of, round1, scalar_text, series, with_jit};
use crate::context::DashboardContext;
use crate::datum::Datum;
use crate::graph::{GraphOptions, DATA, LEGEND};
use crate::logging::{self, Domain, Level};
use crate::option::ConfigOption;
use crate::surface::Page;

pub const SUMMARY: &str = "data/summary/summary.json";
pub const GEOMETRIC_MEAN: &str = "data/summary/bridge/geometric_mean.json";
pub const STATUS_TARGET: &str = "#compare-breakdown-mean";
pub const BENCHMARK_SELECTS: [&str; 2] = ["#config-itrend-benchmark", "#config-detail-benchmark"];

const NORMALIZED_LABEL: &str = "runtime (normalized to equivalent native js)";

pub const CHECKBOXES: &[&str] = &[
    "#config-trend-show-js",
    "#config-breakdown-show-js",
    "#config-itrend-show-js",
    "#config-detail-show-js",
    "#config-trend-show-d8",
    "#config-breakdown-show-d8",
    "#config-itrend-show-d8",
    "#config-detail-show-d8",
    "#config-trend-jit",
    "#config-breakdown-jit",
    "#config-itrend-jit",
    "#config-detail-jit",
];

pub const SELECTS: &[(&str, &[&str])] = &[
    ("#config-trend-metric", &["mean", "min", "max"]),
    ("#config-breakdown-metric", &["mean", "min", "max"]),
    ("#config-itrend-metric", &["mean", "min", "max"]),
    ("#config-itrend-benchmark", &[]),
    ("#config-detail-benchmark", &[]),
];

pub fn benchmark_key(name: &str) -> String {
    format!("data/summary/bridge/benchmarks/{}.json", name)
}

/// Full run file named by a summary's timestamp, platform and machine.
pub fn run_key(summary: &Datum) -> Option<String> {
    let part = |name: &str| summary.get(name).and_then(scalar_text);
    Some(format!(
        "data/bench/{}-{}-{}.json",
        part("timestamp")?,
        part("platform")?,
        part("machine")?
    ))
}

/// Status line for the breakdown's geometric mean.
pub fn breakdown_status(geo_mean: f64) -> String {
    if geo_mean > 1.05 {
        format!("around {} times slower than native js", round1(geo_mean))
    } else if geo_mean < 0.95 {
        format!("around {} times faster than native js", round1(1.0 / geo_mean))
    } else {
        "around the same as native js".to_string()
    }
}

/// Engine checkboxes and the JIT toggle.
#[derive(Clone, Debug)]
pub struct EngineSelection {
    pub js: ConfigOption,
    pub d8: ConfigOption,
    pub jit: ConfigOption,
}

impl EngineSelection {
    pub fn engines(&self) -> Vec<String> {
        let mut engines = Vec::new();
        if self.js.is_on() {
            engines.push("js+pypy".to_string());
        }
        if self.d8.is_on() {
            engines.push("d8+pypy".to_string());
        }
        with_jit(engines, self.jit.is_on())
    }
}

/// Per-benchmark bars for the selected engines, plus the status line.
/// Benchmarks missing any selected engine are left out.
pub fn breakdown(summary: &Datum, engines: &[String], metric: &str) -> (Vec<Datum>, Option<f64>) {
    let benchmarks = summary
        .path(&["bridge", "benchmarks"])
        .and_then(Datum::as_record);
    let mut bars = Vec::new();
    let mut values = Vec::new();
    for (name, result) in benchmarks.into_iter().flatten() {
        let metrics: Option<Vec<f64>> = engines
            .iter()
            .map(|engine| metric_of(result, engine, metric))
            .collect();
        let Some(value) = metrics.as_deref().and_then(geometric_mean) else {
            continue;
        };
        bars.push(Datum::record([
            ("label", Datum::from(name.as_str())),
            ("value", Datum::Number(value)),
            ("baseline", Datum::Number(1.0)),
        ]));
        values.push(value);
    }
    (bars, geometric_mean(&values))
}

/// Per-iteration timings of one benchmark's first run for each engine.
/// Engines without runs get a single `-1` marker point.
pub fn run_detail(runs: &Datum, engines: &[String]) -> Datum {
    Datum::List(
        engines
            .iter()
            .map(|engine| {
                let timings = runs
                    .path(&["py", engine.as_str()])
                    .and_then(|r| r.at(0))
                    .and_then(Datum::as_list);
                let points = match timings {
                    Some(timings) => timings
                        .iter()
                        .enumerate()
                        .map(|(i, t)| sequence_point(i + 1, t.clone()))
                        .collect(),
                    None => vec![sequence_point(1, Datum::Number(-1.0))],
                };
                Datum::List(points)
            })
            .collect(),
    )
}

fn sequence_point(sequence: usize, value: Datum) -> Datum {
    Datum::record([
        ("sequence", Datum::Number(sequence as f64)),
        ("value", value),
    ])
}

pub struct BridgePage {
    pub selection: EngineSelection,
    pub metric: ConfigOption,
    pub benchmark: ConfigOption,
    pub benchmarks: Vec<String>,
}

impl BridgePage {
    pub async fn mount(ctx: &DashboardContext) -> Result<Self> {
        let js = ctx.option("js", Some("on"))?;
        let d8 = ctx.option("d8", Some("on"))?;
        let jit = ctx.option("jit", Some("on"))?;
        let metric = ctx.option("metric", Some("mean"))?;
        let benchmark = ctx.option("benchmark", None)?;
        for section in ["trend", "breakdown", "itrend", "detail"] {
            ctx.bind(&js, &format!("#config-{}-show-js", section))?;
            ctx.bind(&d8, &format!("#config-{}-show-d8", section))?;
            ctx.bind(&jit, &format!("#config-{}-jit", section))?;
        }
        for section in ["trend", "breakdown", "itrend"] {
            ctx.bind(&metric, &format!("#config-{}-metric", section))?;
        }

        let selection = EngineSelection { js, d8, jit };
        register_breakdown(ctx, &selection, &metric);
        register_trend(ctx, &selection, &metric);
        register_run_detail(ctx, &selection, &benchmark);
        register_trend_detail(ctx, &selection, &metric, &benchmark);

        let benchmarks = populate_benchmarks(ctx, &benchmark).await?;
        Ok(Self {
            selection,
            metric,
            benchmark,
            benchmarks,
        })
    }

    pub fn engines(&self) -> Vec<String> {
        self.selection.engines()
    }
}

/// Fills the benchmark selects from the summary, picks the first benchmark
/// when none is configured, then binds the selects.
async fn populate_benchmarks(
    ctx: &DashboardContext,
    benchmark: &ConfigOption,
) -> Result<Vec<String>> {
    let summary = match ctx.cache().fetch(SUMMARY).await {
        Ok(summary) => summary,
        Err(err) => {
            logging::log(
                Level::Warn,
                Domain::Config,
                "benchmark_list_unavailable",
                logging::obj(&[("reason", logging::v_str(&err.to_string()))]),
            );
            return Ok(Vec::new());
        }
    };
    let names: Vec<String> = summary
        .path(&["bridge", "benchmarks"])
        .and_then(Datum::as_record)
        .map(|b| b.keys().cloned().collect())
        .unwrap_or_default();

    if benchmark.get().is_none() {
        if let Some(first) = names.first() {
            if let Err(err) = benchmark.set(first) {
                logging::log(
                    Level::Warn,
                    Domain::Config,
                    "benchmark_default_rejected",
                    logging::obj(&[
                        ("option", logging::v_str(benchmark.name())),
                        ("reason", logging::v_str(&err.to_string())),
                    ]),
                );
            }
        }
    }
    for selector in BENCHMARK_SELECTS {
        if let Some(widget) = ctx.page().widget(selector) {
            widget.set_choices(&names);
        }
        ctx.bind(benchmark, selector)?;
    }
    Ok(names)
}

fn register_breakdown(ctx: &DashboardContext, selection: &EngineSelection, metric: &ConfigOption) {
    let cache = ctx.cache().clone();
    let page: Arc<dyn Page> = ctx.page().clone();
    let selection = selection.clone();
    let metric = metric.clone();
    ctx.graph(
        GraphOptions::new("#graph-bridge-breakdown")
            .literal("chart_type", "bar")
            .literal("bar_orientation", "vertical")
            .literal("x_accessor", "label")
            .literal("y_accessor", "value")
            .literal("y_label", NORMALIZED_LABEL)
            .literal("baseline_accessor", "baseline")
            .resolver(DATA, move |_| {
                let cache = cache.clone();
                let page = page.clone();
                let engines = selection.engines();
                let metric = metric.get().unwrap_or_default();
                async move {
                    let summary = cache.fetch(SUMMARY).await?;
                    if engines.is_empty() {
                        page.set_text(STATUS_TARGET, "undefined");
                        return Ok::<_, anyhow::Error>(None);
                    }
                    let (bars, geo_mean) = breakdown(&summary, &engines, &metric);
                    let status = geo_mean
                        .map(breakdown_status)
                        .unwrap_or_else(|| "undefined".to_string());
                    page.set_text(STATUS_TARGET, &status);
                    Ok(Some(Datum::List(bars)))
                }
            }),
    );
}

fn register_trend(ctx: &DashboardContext, selection: &EngineSelection, metric: &ConfigOption) {
    let cache = ctx.cache().clone();
    let legend = selection.clone();
    let metric = metric.clone();
    ctx.graph(
        GraphOptions::new("#graph-trend")
            .computed(LEGEND, move || legend.engines())
            .literal("legend_target", "#legend-trend")
            .literal("x_accessor", "timestamp")
            .literal("y_accessor", "value")
            .literal("y_label", NORMALIZED_LABEL)
            .resolver(DATA, move |scope| {
                let cache = cache.clone();
                let metric = metric.get().unwrap_or_default();
                async move {
                    let means = cache.fetch(GEOMETRIC_MEAN).await?;
                    let engines = scope.names(LEGEND).await?;
                    let lines: Vec<Datum> = engines
                        .iter()
                        .map(|engine| series(&means, engine, &metric))
                        .collect();
                    Ok::<_, anyhow::Error>(Some(Datum::List(lines)))
                }
            }),
    );
}

fn register_run_detail(
    ctx: &DashboardContext,
    selection: &EngineSelection,
    benchmark: &ConfigOption,
) {
    let cache = ctx.cache().clone();
    let legend = selection.clone();
    let benchmark = benchmark.clone();
    ctx.graph(
        GraphOptions::new("#graph-detail-run")
            .computed(LEGEND, move || legend.engines())
            .literal("legend_target", "#legend-detail-run")
            .literal("x_accessor", "sequence")
            .literal("y_accessor", "value")
            .literal("x_label", "iteration # in run")
            .literal("y_label", "runtime (seconds)")
            .resolver(DATA, move |scope| {
                let cache = cache.clone();
                let benchmark = benchmark.get();
                async move {
                    let engines = scope.names(LEGEND).await?;
                    let summary = cache.fetch(SUMMARY).await?;
                    let Some(benchmark) = benchmark else {
                        return Ok::<_, anyhow::Error>(None);
                    };
                    let key = run_key(&summary)
                        .ok_or_else(|| anyhow!("summary does not name its latest run"))?;
                    let bench = cache.fetch(&key).await?;
                    let runs = bench
                        .path(&["benchmarks", "bridge", benchmark.as_str()])
                        .ok_or_else(|| anyhow!("{} has no runs for {}", key, benchmark))?;
                    Ok(Some(run_detail(runs, &engines)))
                }
            }),
    );
}

fn register_trend_detail(
    ctx: &DashboardContext,
    selection: &EngineSelection,
    metric: &ConfigOption,
    benchmark: &ConfigOption,
) {
    let cache = ctx.cache().clone();
    let legend = selection.clone();
    let metric = metric.clone();
    let benchmark = benchmark.clone();
    ctx.graph(
        GraphOptions::new("#graph-detail-trend")
            .computed(LEGEND, move || legend.engines())
            .literal("legend_target", "#legend-detail-trend")
            .literal("x_accessor", "timestamp")
            .literal("y_accessor", "value")
            .literal("y_label", NORMALIZED_LABEL)
            .resolver(DATA, move |scope| {
                let cache = cache.clone();
                let metric = metric.get().unwrap_or_default();
                let benchmark = benchmark.get();
                async move {
                    let Some(benchmark) = benchmark else {
                        return Ok::<_, anyhow::Error>(None);
                    };
                    let doc = cache.fetch(&benchmark_key(&benchmark)).await?;
                    let engines = scope.names(LEGEND).await?;
                    let lines: Vec<Datum> = engines
                        .iter()
                        .map(|engine| series(&doc, engine, &metric))
                        .collect();
                    Ok(Some(Datum::List(lines)))
                }
            }),
    );
}
