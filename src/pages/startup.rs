//! Interpreter download size and load time, plus the live load test.

use anyhow::Result;
use futures_util::future::try_join;
use std::sync::Arc;

use super::{series, NOJIT_SUFFIX};
use crate::context::DashboardContext;
use crate::datum::Datum;
use crate::graph::{GraphOptions, DATA, LEGEND};
use crate::option::ConfigOption;
use crate::worker::{LoadStatus, LoadTimer, LoadWorker, ProcessWorker};

pub const FILE_SIZE_RAW: &str = "data/summary/misc/benchmarks/file_size_raw.json";
pub const FILE_SIZE_GZ: &str = "data/summary/misc/benchmarks/file_size_gz.json";
pub const LOAD_TIME: &str = "data/summary/misc/benchmarks/load_time.json";

pub const CHECKBOXES: &[&str] = &["#config-filesize-jit", "#config-loadtime-jit"];
pub const SELECTS: &[(&str, &[&str])] = &[];

/// `pypy` or `pypy-nojit`.
pub fn pypy_engine(jit: &ConfigOption) -> String {
    if jit.is_on() {
        "pypy".to_string()
    } else {
        format!("pypy{}", NOJIT_SUFFIX)
    }
}

pub struct StartupPage {
    pub jit: ConfigOption,
    load_timer: Option<LoadTimer>,
}

impl StartupPage {
    /// Mounts the page; the load test uses the configured worker command,
    /// if any.
    pub fn mount(ctx: &DashboardContext) -> Result<Self> {
        let jit = ctx.option("jit", Some("on"))?;
        for selector in CHECKBOXES {
            ctx.bind(&jit, selector)?;
        }
        register_file_size(ctx, &jit);
        register_load_time(ctx, &jit);

        let mut page = Self {
            jit,
            load_timer: None,
        };
        if let Some(worker) = ctx
            .config()
            .startup_worker_cmd
            .as_deref()
            .and_then(ProcessWorker::from_command_line)
        {
            page.attach_worker(ctx, Arc::new(worker));
        }
        Ok(page)
    }

    pub fn attach_worker(&mut self, ctx: &DashboardContext, worker: Arc<dyn LoadWorker>) {
        self.load_timer = Some(LoadTimer::new(
            ctx.page().clone(),
            worker,
            ctx.config().worker_timeout(),
        ));
    }

    pub fn has_load_test(&self) -> bool {
        self.load_timer.is_some()
    }

    /// `None` without a worker or once the test has already run.
    pub async fn run_load_test(&self) -> Option<LoadStatus> {
        self.load_timer.as_ref()?.trigger().await
    }
}

fn register_file_size(ctx: &DashboardContext, jit: &ConfigOption) {
    let cache = ctx.cache().clone();
    let jit = jit.clone();
    ctx.graph(
        GraphOptions::new("#graph-file-size")
            .literal("x_accessor", "timestamp")
            .literal("y_accessor", "value")
            .literal("y_label", "download size (bytes)")
            .literal(LEGEND, Datum::list(vec!["raw", "gz"]))
            .literal("legend_target", "#legend-file-size")
            .resolver(DATA, move |_| {
                let cache = cache.clone();
                let engine = pypy_engine(&jit);
                async move {
                    let (raw, gz) =
                        try_join(cache.fetch(FILE_SIZE_RAW), cache.fetch(FILE_SIZE_GZ)).await?;
                    Ok::<_, anyhow::Error>(Some(Datum::List(vec![
                        series(&raw, &engine, "mean"),
                        series(&gz, &engine, "mean"),
                    ])))
                }
            }),
    );
}

fn register_load_time(ctx: &DashboardContext, jit: &ConfigOption) {
    let cache = ctx.cache().clone();
    let jit = jit.clone();
    ctx.graph(
        GraphOptions::new("#graph-load-time")
            .literal(LEGEND, Datum::list(vec!["js+pypy", "d8+pypy"]))
            .literal("legend_target", "#legend-load-time")
            .literal("x_accessor", "timestamp")
            .literal("y_accessor", "value")
            .literal("y_label", "load time (seconds)")
            .resolver(DATA, move |_| {
                let cache = cache.clone();
                let engine = pypy_engine(&jit);
                async move {
                    let times = cache.fetch(LOAD_TIME).await?;
                    Ok::<_, anyhow::Error>(Some(Datum::List(vec![
                        series(&times, &format!("js+{}", engine), "mean"),
                        series(&times, &format!("d8+{}", engine), "mean"),
                    ])))
                }
            }),
    );
}
