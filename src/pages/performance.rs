//! Python benchmarks run through the js engines, normalized to a native
//! interpreter.

use anyhow::Result;
use std::sync::Arc;

use super::{geometric_mean, metric_of, point, round1, with_jit};
use crate::context::DashboardContext;
use crate::datum::Datum;
use crate::graph::{GraphOptions, DATA, LEGEND};
use crate::option::ConfigOption;
use crate::surface::Page;

pub const SUMMARY: &str = "data/summary.json";
pub const STATUS_TARGET: &str = "#compare-py-trend";

pub const CHECKBOXES: &[&str] = &["#config-breakdown-jit"];

pub const SELECTS: &[(&str, &[&str])] = &[
    ("#config-breakdown-compare", &["all", "js+pypy", "d8+pypy"]),
    ("#config-breakdown-norm", &["cpython", "pypy"]),
];

#[derive(Clone, Debug)]
pub struct Comparison {
    pub compare: ConfigOption,
    pub norm: ConfigOption,
    pub jit: ConfigOption,
}

impl Comparison {
    /// The native engine results are divided by.
    pub fn norm_engine(&self) -> String {
        let norm = self.norm.get().unwrap_or_default();
        if norm == "pypy" && !self.jit.is_on() {
            return "pypy-nojit".to_string();
        }
        norm
    }

    /// Legend of the trend graph: the norm, then both js engines.
    pub fn trend_legend(&self) -> Vec<String> {
        let mut legend = vec![self.norm_engine()];
        legend.extend(with_jit(
            vec!["js+pypy".to_string(), "d8+pypy".to_string()],
            self.jit.is_on(),
        ));
        legend
    }

    pub fn js_engines(&self) -> Vec<String> {
        let engines = match self.compare.get().as_deref() {
            Some("all") | None => vec!["js+pypy".to_string(), "d8+pypy".to_string()],
            Some(engine) => vec![engine.to_string()],
        };
        with_jit(engines, self.jit.is_on())
    }
}

pub fn status(geo_mean: f64, norm: &str) -> String {
    if geo_mean >= 1.0 {
        format!("{} times slower than {}", round1(geo_mean), norm)
    } else {
        format!("{} times faster than {}", round1(1.0 / geo_mean), norm)
    }
}

/// Mean of the js engines over the norm engine for every benchmark whose
/// latest result has all of them.
pub fn breakdown(summary: &Datum, js_engines: &[String], norm: &str) -> (Vec<Datum>, Option<f64>) {
    let benchmarks = summary.path(&["py", "benchmarks"]).and_then(Datum::as_record);
    let mut bars = Vec::new();
    let mut values = Vec::new();
    for (name, results) in benchmarks.into_iter().flatten() {
        let Some(latest) = results.at(0) else { continue };
        let Some(base) = metric_of(latest, norm, "mean") else { continue };
        let means: Option<Vec<f64>> = js_engines
            .iter()
            .map(|engine| metric_of(latest, engine, "mean"))
            .collect();
        let Some(means) = means.filter(|m| !m.is_empty()) else { continue };
        let value = (means.iter().sum::<f64>() / means.len() as f64) / base;
        bars.push(Datum::record([
            ("label", Datum::from(name.as_str())),
            ("value", Datum::Number(value)),
            ("baseline", Datum::Number(1.0)),
        ]));
        values.push(value);
    }
    (bars, geometric_mean(&values))
}

/// One line per legend entry from `py.geometric_mean`, each point divided by
/// the norm engine's value at the same run. Runs without the norm or the
/// engine are skipped.
pub fn mean_trend(summary: &Datum, legend: &[String], norm: &str) -> Datum {
    let runs = summary
        .path(&["py", "geometric_mean"])
        .and_then(Datum::as_list)
        .unwrap_or(&[]);
    Datum::List(
        legend
            .iter()
            .map(|engine| {
                let points = runs
                    .iter()
                    .rev()
                    .filter_map(|run| {
                        let base = metric_of(run, norm, "value")?;
                        let value = metric_of(run, engine, "value")?;
                        Some(point(run.get("timestamp").unwrap_or(&Datum::Null), value / base))
                    })
                    .collect();
                Datum::List(points)
            })
            .collect(),
    )
}

pub struct PerformancePage {
    pub comparison: Comparison,
}

impl PerformancePage {
    pub fn mount(ctx: &DashboardContext) -> Result<Self> {
        let compare = ctx.option("compare", Some("all"))?;
        ctx.bind(&compare, "#config-breakdown-compare")?;
        let norm = ctx.option("norm", Some("cpython"))?;
        ctx.bind(&norm, "#config-breakdown-norm")?;
        let jit = ctx.option("jit", Some("on"))?;
        ctx.bind(&jit, "#config-breakdown-jit")?;

        let comparison = Comparison { compare, norm, jit };
        register_breakdown(ctx, &comparison);
        register_mean_trend(ctx, &comparison);
        Ok(Self { comparison })
    }
}

fn register_breakdown(ctx: &DashboardContext, comparison: &Comparison) {
    let cache = ctx.cache().clone();
    let page: Arc<dyn Page> = ctx.page().clone();
    let for_description = comparison.clone();
    let for_label = comparison.clone();
    let for_data = comparison.clone();
    ctx.graph(
        GraphOptions::new("#graph-py-breakdown")
            .literal("title", "Individual benchmarks")
            .computed("description", move || {
                format!(
                    "Mean time for each python benchmark, normalized to {}",
                    for_description.norm_engine()
                )
            })
            .literal("chart_type", "bar")
            .literal("bar_orientation", "vertical")
            .literal("x_accessor", "label")
            .literal("y_accessor", "value")
            .computed("y_label", move || {
                format!("runtime (normalized to {})", for_label.norm_engine())
            })
            .literal("baseline_accessor", "baseline")
            .resolver(DATA, move |_| {
                let cache = cache.clone();
                let page = page.clone();
                let norm = for_data.norm_engine();
                let js_engines = for_data.js_engines();
                async move {
                    let summary = cache.fetch(SUMMARY).await?;
                    let (bars, geo_mean) = breakdown(&summary, &js_engines, &norm);
                    let text = geo_mean
                        .map(|g| status(g, &norm))
                        .unwrap_or_else(|| "undefined".to_string());
                    page.set_text(STATUS_TARGET, &text);
                    Ok::<_, anyhow::Error>(Some(Datum::List(bars)))
                }
            }),
    );
}

fn register_mean_trend(ctx: &DashboardContext, comparison: &Comparison) {
    let cache = ctx.cache().clone();
    let for_description = comparison.clone();
    let for_legend = comparison.clone();
    let for_label = comparison.clone();
    let for_data = comparison.clone();
    ctx.graph(
        GraphOptions::new("#graph-py-trend")
            .literal("title", "Mean performance over time")
            .computed("description", move || {
                format!(
                    "Mean time across all benchmarks, over time, normalized to {}",
                    for_description.norm_engine()
                )
            })
            .computed(LEGEND, move || for_legend.trend_legend())
            .literal("legend_target", "#legend-py-trend")
            .literal("x_accessor", "timestamp")
            .literal("y_accessor", "value")
            .computed("y_label", move || {
                format!("runtime (normalized to {})", for_label.norm_engine())
            })
            .resolver(DATA, move |scope| {
                let cache = cache.clone();
                let norm = for_data.norm_engine();
                async move {
                    let summary = cache.fetch(SUMMARY).await?;
                    let legend = scope.names(LEGEND).await?;
                    Ok::<_, anyhow::Error>(Some(mean_trend(&summary, &legend, &norm)))
                }
            }),
    );
}
