//! Page-wide graph list and the redraw driver.
//!
//! A redraw pass draws graphs one after another in registration order. Passes
//! requested through [`RedrawScheduler`] are serialized; every request bumps a
//! generation counter and a pass stops before its next graph once a newer
//! request exists, leaving the newer pass to finish the job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::graph::{DrawOutcome, Graph};
use crate::logging::{self, Domain, Level};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedrawReport {
    pub generation: u64,
    pub rendered: Vec<String>,
    pub no_data: Vec<String>,
    /// (target, error message)
    pub failed: Vec<(String, String)>,
    /// True when a newer request cut this pass short (or it never started).
    pub superseded: bool,
}

impl RedrawReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.superseded
    }
}

#[derive(Clone, Default)]
pub struct GraphRegistry {
    graphs: Arc<Mutex<Vec<Graph>>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, graph: Graph) {
        if let Ok(mut graphs) = self.graphs.lock() {
            graphs.push(graph);
        }
    }

    pub fn len(&self) -> usize {
        self.graphs.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn targets(&self) -> Vec<String> {
        self.snapshot().iter().map(|g| g.target().to_string()).collect()
    }

    fn snapshot(&self) -> Vec<Graph> {
        self.graphs.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Draws every graph in order, each draw completing before the next
    /// starts. A failing graph is logged and the pass moves on.
    pub async fn redraw_all(&self) -> RedrawReport {
        self.redraw_while(0, || true).await
    }

    async fn redraw_while(&self, generation: u64, current: impl Fn() -> bool) -> RedrawReport {
        let mut report = RedrawReport {
            generation,
            ..RedrawReport::default()
        };
        for graph in self.snapshot() {
            if !current() {
                report.superseded = true;
                break;
            }
            let target = graph.target().to_string();
            match graph.draw().await {
                Ok(DrawOutcome::Rendered) => report.rendered.push(target),
                Ok(DrawOutcome::NoData) => report.no_data.push(target),
                Err(err) => {
                    logging::log_draw_failed(&target, &err.to_string());
                    report.failed.push((target, err.to_string()));
                }
            }
        }
        logging::log_redraw_summary(
            generation,
            report.rendered.len(),
            report.no_data.len(),
            report.failed.len(),
            report.superseded,
        );
        report
    }
}

/// Completion handle for a requested redraw pass.
pub struct RedrawTicket {
    generation: u64,
    handle: JoinHandle<RedrawReport>,
}

impl RedrawTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn finished(self) -> RedrawReport {
        match self.handle.await {
            Ok(report) => report,
            Err(err) => RedrawReport {
                generation: self.generation,
                failed: vec![("redraw".to_string(), err.to_string())],
                ..RedrawReport::default()
            },
        }
    }
}

#[derive(Clone)]
pub struct RedrawScheduler {
    registry: GraphRegistry,
    generation: Arc<AtomicU64>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl RedrawScheduler {
    pub fn new(registry: GraphRegistry) -> Self {
        Self {
            registry,
            generation: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn latest(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Spawns a redraw pass on the current tokio runtime. Returns `None`
    /// when called outside a runtime.
    pub fn request(&self) -> Option<RedrawTicket> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                logging::log(
                    Level::Warn,
                    Domain::Registry,
                    "redraw_without_runtime",
                    logging::obj(&[("generation", serde_json::json!(generation))]),
                );
                return None;
            }
        };
        let this = self.clone();
        let handle = runtime.spawn(async move { this.run(generation).await });
        Some(RedrawTicket { generation, handle })
    }

    async fn run(&self, generation: u64) -> RedrawReport {
        let _turn = self.gate.lock().await;
        let counter = self.generation.clone();
        let current = move || counter.load(Ordering::SeqCst) == generation;
        if !current() {
            return RedrawReport {
                generation,
                superseded: true,
                ..RedrawReport::default()
            };
        }
        self.registry.redraw_while(generation, current).await
    }
}
