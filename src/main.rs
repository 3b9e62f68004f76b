use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use url::Url;

use perfdash::config::DashboardConfig;
use perfdash::context::DashboardContext;
use perfdash::fetch::{FileTransport, HttpTransport, Transport};
use perfdash::headless::CaptureRenderer;
use perfdash::logging::{self, obj, v_str, Domain, Level, ProfileScope};
use perfdash::pages::{self, MountedPage};

fn transport(cfg: &DashboardConfig) -> Result<Arc<dyn Transport>> {
    let base = cfg.data_base.trim();
    if base.starts_with("http://") || base.starts_with("https://") {
        let url = Url::parse(base).with_context(|| format!("invalid DATA_BASE {}", base))?;
        Ok(Arc::new(HttpTransport::new(url, cfg.fetch_timeout(), cfg.retry())))
    } else {
        Ok(Arc::new(FileTransport::new(base)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = DashboardConfig::from_env();
    let _profile = ProfileScope::new("dashboard_run");
    logging::log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("page", v_str(cfg.page.as_str())),
            ("data_base", v_str(&cfg.data_base)),
            ("fragment", v_str(&cfg.fragment)),
        ]),
    );

    let page = pages::headless_page(cfg.page);
    let renderer = CaptureRenderer::new(cfg.echo_render);
    let ctx = DashboardContext::new(cfg.clone(), transport(&cfg)?, page.clone(), renderer.clone());

    let mounted = pages::mount(&ctx, cfg.page)
        .await
        .with_context(|| format!("failed to mount {} page", cfg.page.as_str()))?;

    let report = ctx.redraw_all().await;
    for (target, reason) in &report.failed {
        eprintln!("graph {} failed: {}", target, reason);
    }

    let mut load_status = None;
    if let MountedPage::Startup(startup) = &mounted {
        if startup.has_load_test() {
            load_status = startup.run_load_test().await.map(|s| s.to_string());
        }
    }

    let status_targets: Vec<_> = [
        pages::bridge::STATUS_TARGET,
        pages::performance::STATUS_TARGET,
        perfdash::worker::LOAD_TEST_TARGET,
    ]
    .iter()
    .filter_map(|t| page.text(t).map(|text| json!({ "target": t, "text": text })))
    .collect();

    let summary = json!({
        "page": mounted.kind().as_str(),
        "fragment": ctx.fragment().fragment(),
        "rendered": report.rendered,
        "no_data": report.no_data,
        "failed": report.failed.len(),
        "renders": renderer.frames().len(),
        "status": status_targets,
        "load_test": load_status,
    });
    println!("{}", summary);
    Ok(())
}
