//! Whole pages driven through the headless surface with in-memory data.

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use perfdash::config::{DashboardConfig, PageKind};
use perfdash::context::DashboardContext;
use perfdash::datum::Datum;
use perfdash::fetch::Transport;
use perfdash::graph::{DATA, LEGEND};
use perfdash::headless::{CaptureRenderer, HeadlessPage};
use perfdash::pages::{self, MountedPage};
use perfdash::widget::{Widget, WidgetState};
use perfdash::worker::{LoadWorker, WorkerMessage, LOAD_TEST_TARGET};

#[derive(Default)]
struct MemoryTransport {
    docs: HashMap<String, String>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MemoryTransport {
    fn with(mut self, key: &str, doc: serde_json::Value) -> Self {
        self.docs.insert(key.to_string(), doc.to_string());
        self
    }

    fn hits(&self, key: &str) -> usize {
        self.hits.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn retrieve(&self, key: &str) -> anyhow::Result<String> {
        *self.hits.lock().unwrap().entry(key.to_string()).or_insert(0) += 1;
        tokio::task::yield_now().await;
        self.docs
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {}", key))
    }
}

struct Harness {
    ctx: DashboardContext,
    page: Arc<HeadlessPage>,
    renderer: Arc<CaptureRenderer>,
    transport: Arc<MemoryTransport>,
}

fn harness(kind: PageKind, fragment: &str, transport: MemoryTransport) -> Harness {
    let page = pages::headless_page(kind);
    let renderer = CaptureRenderer::new(false);
    let transport = Arc::new(transport);
    let config = DashboardConfig {
        page: kind,
        fragment: fragment.to_string(),
        ..DashboardConfig::default()
    };
    let ctx = DashboardContext::new(config, transport.clone(), page.clone(), renderer.clone());
    Harness {
        ctx,
        page,
        renderer,
        transport,
    }
}

fn engines(js: f64, d8: f64) -> serde_json::Value {
    json!({
        "js+pypy": {"mean": js},
        "d8+pypy": {"mean": d8},
        "js+pypy-nojit": {"mean": js * 3.0},
        "d8+pypy-nojit": {"mean": d8 * 3.0}
    })
}

fn bridge_data() -> MemoryTransport {
    MemoryTransport::default()
        .with(
            "data/summary/summary.json",
            json!({
                "timestamp": "20160110120000",
                "platform": "linux2",
                "machine": "m1",
                "bridge": {"benchmarks": {
                    "regexp": {"engines": engines(2.0, 8.0)},
                    "sumlog": {"engines": engines(1.0, 1.0)}
                }}
            }),
        )
        .with(
            "data/summary/bridge/geometric_mean.json",
            json!({"values": [
                {"timestamp": "20160110120000", "engines": engines(2.0, 2.0)},
                {"timestamp": "20160109120000", "engines": engines(3.0, 3.0)}
            ]}),
        )
        .with(
            "data/summary/bridge/benchmarks/regexp.json",
            json!({"values": [
                {"timestamp": "20160110120000", "engines": engines(2.0, 8.0)}
            ]}),
        )
        .with(
            "data/summary/bridge/benchmarks/sumlog.json",
            json!({"values": [
                {"timestamp": "20160110120000", "engines": engines(1.0, 1.0)}
            ]}),
        )
        .with(
            "data/bench/20160110120000-linux2-m1.json",
            json!({"benchmarks": {"bridge": {
                "regexp": {"py": {"js+pypy": [[0.5, 0.4, 0.3]]}},
                "sumlog": {"py": {}}
            }}}),
        )
}

fn bridge(mounted: MountedPage) -> pages::BridgePage {
    match mounted {
        MountedPage::Bridge(page) => page,
        _ => panic!("expected the bridge page"),
    }
}

fn legend_of(renderer: &CaptureRenderer, target: &str) -> Vec<String> {
    renderer
        .last_for(target)
        .and_then(|opts| opts.get(LEGEND).map(Datum::text_items))
        .unwrap_or_default()
}

#[tokio::test]
async fn bridge_page_renders_every_graph() {
    let h = harness(PageKind::Bridge, "", bridge_data());
    let page = bridge(pages::mount(&h.ctx, PageKind::Bridge).await.unwrap());
    assert_eq!(page.benchmarks, vec!["regexp", "sumlog"]);
    assert_eq!(page.benchmark.get().as_deref(), Some("regexp"));

    let report = h.ctx.redraw_all().await;
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(
        report.rendered,
        vec![
            "#graph-bridge-breakdown",
            "#graph-trend",
            "#graph-detail-run",
            "#graph-detail-trend"
        ]
    );
    assert_eq!(
        h.page.text("#compare-breakdown-mean").as_deref(),
        Some("around 2 times slower than native js")
    );

    let trend = h.renderer.last_for("#graph-trend").unwrap();
    let first_point = trend.get(DATA).and_then(|d| d.at(0)).and_then(|line| line.at(0)).unwrap();
    assert!(first_point.get("timestamp").and_then(Datum::as_time).is_some());
    assert_eq!(first_point.get("value").and_then(Datum::as_f64), Some(3.0));
    assert!(trend.contains("colors"));
    assert_eq!(trend.get("interpolate").and_then(Datum::as_str), Some("linear"));

    let run = h.renderer.last_for("#graph-detail-run").unwrap();
    let lines = run.get(DATA).and_then(Datum::as_list).unwrap();
    assert_eq!(lines[0].as_list().unwrap().len(), 3);
    assert_eq!(
        lines[1].at(0).and_then(|p| p.get("value")).and_then(Datum::as_f64),
        Some(-1.0)
    );
}

#[tokio::test]
async fn summary_is_fetched_once_across_graphs() {
    let h = harness(PageKind::Bridge, "", bridge_data());
    let _page = pages::mount(&h.ctx, PageKind::Bridge).await.unwrap();
    h.ctx.redraw_all().await;
    h.ctx.redraw_all().await;

    assert_eq!(h.transport.hits("data/summary/summary.json"), 1);
    assert_eq!(h.transport.hits("data/summary/bridge/geometric_mean.json"), 1);
    assert!(h.ctx.cache().is_cached("data/bench/20160110120000-linux2-m1.json"));
}

#[tokio::test]
async fn turning_off_the_jit_updates_widgets_fragment_and_graphs() {
    let h = harness(PageKind::Bridge, "", bridge_data());
    let page = bridge(pages::mount(&h.ctx, PageKind::Bridge).await.unwrap());
    h.ctx.redraw_all().await;
    assert_eq!(legend_of(&h.renderer, "#graph-trend"), vec!["js+pypy", "d8+pypy"]);

    let trigger = h.page.headless_widget("#config-trend-jit").unwrap();
    trigger.user_input(WidgetState::Checked(false));

    assert_eq!(page.selection.jit.get().as_deref(), Some("off"));
    assert_eq!(h.ctx.fragment().fragment(), "#benchmark=regexp&jit=off");
    for section in ["trend", "breakdown", "itrend", "detail"] {
        let widget = h.page.headless_widget(&format!("#config-{}-jit", section)).unwrap();
        assert_eq!(widget.read(), WidgetState::Checked(false), "{}", section);
    }

    let report = h.ctx.redraw_all().await;
    assert!(report.is_clean());
    for target in ["#graph-trend", "#graph-detail-run", "#graph-detail-trend"] {
        assert_eq!(
            legend_of(&h.renderer, target),
            vec!["js+pypy-nojit", "d8+pypy-nojit"],
            "{}",
            target
        );
    }
    assert_eq!(
        h.page.text("#compare-breakdown-mean").as_deref(),
        Some("around 6 times slower than native js")
    );
}

#[tokio::test]
async fn setting_an_option_redraws_every_graph() {
    let h = harness(PageKind::Bridge, "#benchmark=regexp", bridge_data());
    let page = bridge(pages::mount(&h.ctx, PageKind::Bridge).await.unwrap());
    assert!(h.renderer.frames().is_empty());

    let ticket = page.selection.jit.set("off").unwrap().expect("inside a runtime");
    let generation = ticket.generation();
    let report = ticket.finished().await;

    assert_eq!(report.generation, generation);
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.rendered.len(), 4);
    for target in [
        "#graph-bridge-breakdown",
        "#graph-trend",
        "#graph-detail-run",
        "#graph-detail-trend",
    ] {
        assert_eq!(h.renderer.count_for(target), 1, "{}", target);
    }
    assert_eq!(
        legend_of(&h.renderer, "#graph-trend"),
        vec!["js+pypy-nojit", "d8+pypy-nojit"]
    );
}

#[tokio::test]
async fn resize_redraws_at_the_new_width() {
    let h = harness(PageKind::Bridge, "#benchmark=regexp", bridge_data());
    let _page = pages::mount(&h.ctx, PageKind::Bridge).await.unwrap();
    h.ctx.redraw_all().await;
    let before = h.renderer.last_for("#graph-trend").unwrap();
    assert_eq!(before.width(), Some(640.0));

    h.page.set_width("#graph-trend", 1024);
    let report = h.ctx.on_resize().expect("inside a runtime").finished().await;

    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(h.renderer.count_for("#graph-trend"), 2);
    let after = h.renderer.last_for("#graph-trend").unwrap();
    assert_eq!(after.width(), Some(1024.0));
}

#[tokio::test]
async fn no_selected_engines_reports_undefined() {
    let h = harness(PageKind::Bridge, "#js=off&d8=off", bridge_data());
    let page = bridge(pages::mount(&h.ctx, PageKind::Bridge).await.unwrap());
    assert!(page.engines().is_empty());

    let report = h.ctx.redraw_all().await;
    assert_eq!(report.no_data, vec!["#graph-bridge-breakdown"]);
    assert_eq!(h.renderer.count_for("#graph-bridge-breakdown"), 0);
    assert!(h.page.clears().contains(&"#graph-bridge-breakdown".to_string()));
    assert_eq!(h.page.text("#compare-breakdown-mean").as_deref(), Some("undefined"));

    let checkbox = h.page.headless_widget("#config-itrend-show-js").unwrap();
    assert_eq!(checkbox.read(), WidgetState::Checked(false));
}

#[tokio::test]
async fn benchmark_selects_share_one_option() {
    let h = harness(PageKind::Bridge, "#metric=mean", bridge_data());
    let page = bridge(pages::mount(&h.ctx, PageKind::Bridge).await.unwrap());

    let itrend = h.page.headless_widget("#config-itrend-benchmark").unwrap();
    let detail = h.page.headless_widget("#config-detail-benchmark").unwrap();
    assert_eq!(itrend.choices(), vec!["regexp", "sumlog"]);
    assert_eq!(detail.read(), WidgetState::Value("regexp".to_string()));

    detail.user_input(WidgetState::Value("sumlog".to_string()));
    assert_eq!(page.benchmark.get().as_deref(), Some("sumlog"));
    assert_eq!(itrend.read(), WidgetState::Value("sumlog".to_string()));
    assert_eq!(h.ctx.fragment().fragment(), "#metric=mean&benchmark=sumlog");

    let report = h.ctx.redraw_all().await;
    assert!(report.is_clean());
    assert_eq!(h.transport.hits("data/summary/bridge/benchmarks/sumlog.json"), 1);
}

#[tokio::test]
async fn missing_resource_fails_one_graph_only() {
    let mut data = bridge_data();
    data.docs.remove("data/summary/bridge/geometric_mean.json");
    let h = harness(PageKind::Bridge, "", data);
    let _page = pages::mount(&h.ctx, PageKind::Bridge).await.unwrap();

    let report = h.ctx.redraw_all().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "#graph-trend");
    assert!(report.failed[0].1.contains("geometric_mean.json"));
    assert_eq!(report.rendered.len(), 3);

    // failures are not cached
    h.ctx.redraw_all().await;
    assert_eq!(h.transport.hits("data/summary/bridge/geometric_mean.json"), 2);
}

#[tokio::test]
async fn rejected_fragment_values_leave_the_page_alone() {
    let h = harness(PageKind::Bridge, "#benchmark=sumlog", bridge_data());
    let page = bridge(pages::mount(&h.ctx, PageKind::Bridge).await.unwrap());
    let select = h.page.headless_widget("#config-detail-benchmark").unwrap();

    select.user_input(WidgetState::Value("not valid!".to_string()));
    assert_eq!(page.benchmark.get().as_deref(), Some("sumlog"));
    assert_eq!(select.read(), WidgetState::Value("sumlog".to_string()));
    assert_eq!(h.ctx.fragment().fragment(), "#benchmark=sumlog");
}

fn performance_data() -> MemoryTransport {
    MemoryTransport::default().with(
        "data/summary.json",
        json!({"py": {
            "benchmarks": {
                "pystone": [{"engines": {
                    "cpython": {"mean": 1.0},
                    "pypy-nojit": {"mean": 2.0},
                    "js+pypy-nojit": {"mean": 8.0},
                    "d8+pypy-nojit": {"mean": 8.0},
                    "js+pypy": {"mean": 3.0},
                    "d8+pypy": {"mean": 5.0}
                }}]
            },
            "geometric_mean": [
                {"timestamp": "20160110120000", "engines": {
                    "cpython": {"value": 2.0},
                    "pypy": {"value": 1.0},
                    "js+pypy": {"value": 6.0},
                    "d8+pypy": {"value": 8.0}
                }},
                {"timestamp": "20160109120000", "engines": {
                    "cpython": {"value": 1.0},
                    "pypy": {"value": 1.0},
                    "js+pypy": {"value": 5.0},
                    "d8+pypy": {"value": 7.0}
                }}
            ]
        }}),
    )
}

fn line_values(renderer: &CaptureRenderer, target: &str, line: usize) -> Vec<f64> {
    renderer
        .last_for(target)
        .and_then(|opts| opts.get(DATA).and_then(|d| d.at(line)).cloned())
        .and_then(|l| l.as_list().map(|points| points.to_vec()))
        .unwrap_or_default()
        .iter()
        .filter_map(|p| p.get("value").and_then(Datum::as_f64))
        .collect()
}

#[tokio::test]
async fn performance_page_normalizes_to_selected_interpreter() {
    let h = harness(PageKind::Performance, "#norm=pypy&jit=off", performance_data());
    let mounted = pages::mount(&h.ctx, PageKind::Performance).await.unwrap();
    let MountedPage::Performance(page) = mounted else {
        panic!("expected the performance page");
    };
    assert_eq!(page.comparison.norm_engine(), "pypy-nojit");

    let report = h.ctx.redraw_all().await;
    assert!(report.is_clean());
    let opts = h.renderer.last_for("#graph-py-breakdown").unwrap();
    assert_eq!(
        opts.get("y_label").and_then(Datum::as_str),
        Some("runtime (normalized to pypy-nojit)")
    );
    assert_eq!(
        h.page.text("#compare-py-trend").as_deref(),
        Some("4 times slower than pypy-nojit")
    );

    let jit = h.page.headless_widget("#config-breakdown-jit").unwrap();
    jit.user_input(WidgetState::Checked(true));
    h.ctx.redraw_all().await;
    assert_eq!(
        h.page.text("#compare-py-trend").as_deref(),
        Some("undefined")
    );
}

#[tokio::test]
async fn mean_trend_follows_the_norm_select() {
    let h = harness(PageKind::Performance, "", performance_data());
    let _page = pages::mount(&h.ctx, PageKind::Performance).await.unwrap();

    let report = h.ctx.redraw_all().await;
    assert_eq!(report.rendered, vec!["#graph-py-breakdown", "#graph-py-trend"]);
    assert_eq!(
        legend_of(&h.renderer, "#graph-py-trend"),
        vec!["cpython", "js+pypy", "d8+pypy"]
    );
    assert_eq!(line_values(&h.renderer, "#graph-py-trend", 0), vec![1.0, 1.0]);
    assert_eq!(line_values(&h.renderer, "#graph-py-trend", 1), vec![5.0, 3.0]);

    let norm = h.page.headless_widget("#config-breakdown-norm").unwrap();
    norm.user_input(WidgetState::Value("pypy".to_string()));
    assert_eq!(h.ctx.fragment().fragment(), "#norm=pypy");
    h.ctx.redraw_all().await;

    assert_eq!(
        legend_of(&h.renderer, "#graph-py-trend"),
        vec!["pypy", "js+pypy", "d8+pypy"]
    );
    assert_eq!(line_values(&h.renderer, "#graph-py-trend", 1), vec![5.0, 6.0]);
    let trend = h.renderer.last_for("#graph-py-trend").unwrap();
    assert_eq!(
        trend.get("y_label").and_then(Datum::as_str),
        Some("runtime (normalized to pypy)")
    );
    assert_eq!(
        trend.get("title").and_then(Datum::as_str),
        Some("Mean performance over time")
    );
}

fn startup_data() -> MemoryTransport {
    let series = |raw: f64| {
        json!({"values": [
            {"timestamp": "20160110120000", "engines": {
                "pypy": {"mean": raw}, "pypy-nojit": {"mean": raw * 2.0},
                "js+pypy": {"mean": raw}, "d8+pypy": {"mean": raw + 1.0},
                "js+pypy-nojit": {"mean": raw * 2.0}, "d8+pypy-nojit": {"mean": raw * 3.0}
            }}
        ]})
    };
    MemoryTransport::default()
        .with("data/summary/misc/benchmarks/file_size_raw.json", series(100.0))
        .with("data/summary/misc/benchmarks/file_size_gz.json", series(30.0))
        .with("data/summary/misc/benchmarks/load_time.json", series(4.0))
}

struct QuickWorker;

#[async_trait]
impl LoadWorker for QuickWorker {
    async fn start(&self, tx: tokio::sync::mpsc::Sender<WorkerMessage>) -> anyhow::Result<()> {
        tx.send(WorkerMessage::Start(1000.0)).await?;
        tx.send(WorkerMessage::End(4000.0)).await?;
        Ok(())
    }
}

#[tokio::test]
async fn startup_page_charts_and_times_the_load() {
    let h = harness(PageKind::Startup, "#jit=off", startup_data());
    let mounted = pages::mount(&h.ctx, PageKind::Startup).await.unwrap();
    let MountedPage::Startup(mut page) = mounted else {
        panic!("expected the startup page");
    };
    assert!(!page.has_load_test());

    let report = h.ctx.redraw_all().await;
    assert_eq!(report.rendered, vec!["#graph-file-size", "#graph-load-time"]);
    let sizes = h.renderer.last_for("#graph-file-size").unwrap();
    let raw = sizes.get(DATA).and_then(|d| d.at(0)).and_then(|l| l.at(0)).unwrap();
    assert_eq!(raw.get("value").and_then(Datum::as_f64), Some(200.0));
    assert_eq!(legend_of(&h.renderer, "#graph-load-time"), vec!["js+pypy", "d8+pypy"]);

    page.attach_worker(&h.ctx, Arc::new(QuickWorker));
    let status = tokio::time::timeout(Duration::from_secs(5), page.run_load_test())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.to_string(), "Loaded in 3 seconds");
    assert_eq!(h.page.text(LOAD_TEST_TARGET).as_deref(), Some("Loaded in 3 seconds"));
    assert!(page.run_load_test().await.is_none());
}

#[tokio::test]
async fn unknown_widget_is_a_mount_error() {
    let page = HeadlessPage::new();
    let ctx = DashboardContext::new(
        DashboardConfig::default(),
        Arc::new(MemoryTransport::default()),
        page,
        CaptureRenderer::new(false),
    );
    let err = pages::mount(&ctx, PageKind::Performance).await.err().unwrap();
    assert!(err.to_string().contains("#config-breakdown-compare"));
}
