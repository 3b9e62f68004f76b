//! Dashboard pages built on the reactive core.
//!
//! Each page declares its options, binds them to the page's controls and
//! registers its graphs. The numbers they chart follow the published
//! dashboard: geometric means over benchmarks, engine ratios, and time
//! series read newest-last.

use anyhow::Result;
use std::sync::Arc;

use crate::config::PageKind;
use crate::context::DashboardContext;
use crate::datum::Datum;
use crate::headless::HeadlessPage;

pub mod bridge;
pub mod performance;
pub mod startup;

pub use bridge::BridgePage;
pub use performance::PerformancePage;
pub use startup::StartupPage;

pub const NOJIT_SUFFIX: &str = "-nojit";

/// A mounted page, kept alive for as long as its options are in use.
pub enum MountedPage {
    Bridge(BridgePage),
    Performance(PerformancePage),
    Startup(StartupPage),
}

impl MountedPage {
    pub fn kind(&self) -> PageKind {
        match self {
            MountedPage::Bridge(_) => PageKind::Bridge,
            MountedPage::Performance(_) => PageKind::Performance,
            MountedPage::Startup(_) => PageKind::Startup,
        }
    }
}

pub async fn mount(ctx: &DashboardContext, kind: PageKind) -> Result<MountedPage> {
    Ok(match kind {
        PageKind::Bridge => MountedPage::Bridge(BridgePage::mount(ctx).await?),
        PageKind::Performance => MountedPage::Performance(PerformancePage::mount(ctx)?),
        PageKind::Startup => MountedPage::Startup(StartupPage::mount(ctx)?),
    })
}

/// A headless page carrying every control `kind` binds to.
pub fn headless_page(kind: PageKind) -> Arc<HeadlessPage> {
    let page = HeadlessPage::new();
    let (checkboxes, selects) = match kind {
        PageKind::Bridge => (bridge::CHECKBOXES, bridge::SELECTS),
        PageKind::Performance => (performance::CHECKBOXES, performance::SELECTS),
        PageKind::Startup => (startup::CHECKBOXES, startup::SELECTS),
    };
    for selector in checkboxes {
        page.add_checkbox(selector);
    }
    for (selector, choices) in selects {
        page.add_select(selector, choices);
    }
    page
}

/// Appends the no-JIT suffix to every engine unless the JIT is on.
pub fn with_jit(engines: Vec<String>, jit_on: bool) -> Vec<String> {
    if jit_on {
        engines
    } else {
        engines
            .into_iter()
            .map(|e| format!("{}{}", e, NOJIT_SUFFIX))
            .collect()
    }
}

/// `None` for an empty input.
pub fn geometric_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let product: f64 = values.iter().product();
    Some(product.powf(1.0 / values.len() as f64))
}

/// Rounds to one decimal place.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// `engines[engine][metric]` of one result record.
pub fn metric_of(result: &Datum, engine: &str, metric: &str) -> Option<f64> {
    result
        .path(&["engines", engine, metric])
        .and_then(Datum::as_f64)
}

/// Chart point `{timestamp, value}`.
pub fn point(timestamp: &Datum, value: f64) -> Datum {
    Datum::record([
        ("timestamp", timestamp.clone()),
        ("value", Datum::Number(value)),
    ])
}

/// Series of `engine`'s `metric` from a time series document, newest first
/// in storage and oldest first in the result. Entries without the engine
/// are skipped.
pub fn series(doc: &Datum, engine: &str, metric: &str) -> Datum {
    let values = doc.get("values").and_then(Datum::as_list).unwrap_or(&[]);
    Datum::List(
        values
            .iter()
            .rev()
            .filter_map(|entry| {
                let value = metric_of(entry, engine, metric)?;
                Some(point(entry.get("timestamp").unwrap_or(&Datum::Null), value))
            })
            .collect(),
    )
}

/// Text form of a scalar used in a file name.
pub fn scalar_text(value: &Datum) -> Option<String> {
    match value {
        Datum::Text(s) => Some(s.clone()),
        Datum::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        Datum::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
