//! Graphs whose options mix literal values and async resolvers.
//!
//! `draw` resolves every option concurrently, waits for all of them, fills
//! layout defaults, clears the mount and issues exactly one render call.
//! Resolvers reach sibling options through [`ResolveScope::option`], which
//! resolves each option at most once per draw.

use anyhow::Result;
use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::config::{Palette, DEFAULT_HEIGHT, DEFAULT_INTERPOLATION, MIN_REGION_HEIGHT};
use crate::datum::Datum;
use crate::error::GraphError;
use crate::logging::{self, ProfileScope};
use crate::surface::{Page, RenderOptions, Renderer};

pub const DATA: &str = "data";
pub const LEGEND: &str = "legend";

pub type Resolver =
    Arc<dyn Fn(ResolveScope) -> BoxFuture<'static, Result<Option<Datum>>> + Send + Sync>;

#[derive(Clone)]
pub enum OptionValue {
    Literal(Datum),
    Resolver(Resolver),
}

impl std::fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Literal(d) => f.debug_tuple("Literal").field(d).finish(),
            OptionValue::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Ordered option mapping for one graph.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    target: String,
    entries: Vec<(String, OptionValue)>,
}

impl GraphOptions {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            entries: vec![(
                "target".to_string(),
                OptionValue::Literal(Datum::Text(target.clone())),
            )],
            target,
        }
    }

    pub fn literal(self, name: &str, value: impl Into<Datum>) -> Self {
        self.with(name, OptionValue::Literal(value.into()))
    }

    /// Synchronous resolver, re-evaluated on every draw.
    pub fn computed<F, T>(self, name: &str, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Into<Datum>,
    {
        self.resolver(name, move |_scope| {
            let value = f().into();
            async move { Ok::<_, anyhow::Error>(Some(value)) }
        })
    }

    pub fn resolver<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(ResolveScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Datum>>> + Send + 'static,
    {
        let resolver: Resolver = Arc::new(move |scope| f(scope).boxed());
        self.with(name, OptionValue::Resolver(resolver))
    }

    fn with(mut self, name: &str, value: OptionValue) -> Self {
        if name == "target" {
            return self;
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        self
    }
}

/// Host services a graph draws against.
#[derive(Clone)]
pub struct GraphEnv {
    pub page: Arc<dyn Page>,
    pub renderer: Arc<dyn Renderer>,
    pub palette: Arc<Palette>,
    pub default_width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Rendered,
    /// The data option resolved to nothing; the mount was cleared and the
    /// renderer was not called.
    NoData,
}

#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

struct GraphInner {
    target: String,
    entries: Vec<(String, OptionValue)>,
    env: GraphEnv,
}

impl Graph {
    pub fn new(options: GraphOptions, env: GraphEnv) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                target: options.target,
                entries: options.entries,
                env,
            }),
        }
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.iter().map(|(n, _)| n.as_str())
    }

    fn entry(&self, name: &str) -> Option<&OptionValue> {
        self.inner
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Resolves every option. Options whose resolver returns `None` are
    /// left out of the result.
    pub async fn resolve(&self) -> Result<BTreeMap<String, Datum>, GraphError> {
        let memo = Arc::new(DrawMemo::for_graph(self));
        let names: Vec<String> = self.option_names().map(str::to_string).collect();
        let values = try_join_all(
            names
                .iter()
                .map(|name| resolve_option(self.clone(), memo.clone(), name.clone())),
        )
        .await?;

        Ok(names
            .into_iter()
            .zip(values)
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect())
    }

    pub async fn draw(&self) -> Result<DrawOutcome, GraphError> {
        let target = self.target().to_string();
        let _profile =
            ProfileScope::with_context("graph_draw", &[("target", logging::v_str(&target))]);
        let env = &self.inner.env;

        let resolved = self.resolve().await?;
        let no_data = self.entry(DATA).is_some()
            && resolved.get(DATA).map(Datum::is_null).unwrap_or(true);
        if no_data {
            env.page.clear(&target);
            logging::log_draw(&target, "no_data");
            return Ok(DrawOutcome::NoData);
        }

        let options = self.apply_defaults(resolved);
        env.page.clear(&target);
        env.renderer
            .render(&options)
            .await
            .map_err(|e| GraphError::Render {
                target: target.clone(),
                reason: format!("{:#}", e),
            })?;
        logging::log_draw(&target, "rendered");
        Ok(DrawOutcome::Rendered)
    }

    fn apply_defaults(&self, mut opts: BTreeMap<String, Datum>) -> RenderOptions {
        let env = &self.inner.env;
        let target = self.target();

        if is_unset(opts.get("width")) {
            let width = env.page.width(target).unwrap_or(env.default_width);
            opts.insert("width".to_string(), Datum::from(width));
        }
        if is_unset(opts.get("height")) {
            let height = env
                .page
                .sibling_height(target)
                .filter(|h| *h > MIN_REGION_HEIGHT)
                .unwrap_or(DEFAULT_HEIGHT);
            opts.insert("height".to_string(), Datum::from(height));
        }
        if is_unset(opts.get("interpolate")) {
            opts.insert("interpolate".to_string(), Datum::from(DEFAULT_INTERPOLATION));
        }
        if !opts.contains_key("colors") {
            let colors = opts.get(LEGEND).and_then(|legend| {
                let names = legend.text_items();
                let complete = legend.as_list().map(|l| l.len()) == Some(names.len());
                if complete {
                    env.palette.colors_for(&names)
                } else {
                    None
                }
            });
            if let Some(colors) = colors {
                opts.insert("colors".to_string(), Datum::list(colors));
            }
        }
        RenderOptions::new(opts)
    }
}

fn is_unset(value: Option<&Datum>) -> bool {
    match value {
        None | Some(Datum::Null) => true,
        Some(Datum::Number(n)) => *n == 0.0,
        Some(Datum::Text(s)) => s.is_empty(),
        Some(_) => false,
    }
}

// =============================================================================
// Per-draw resolution state
// =============================================================================

struct DrawMemo {
    cells: HashMap<String, OnceCell<Option<Datum>>>,
    /// Sibling requests made so far, as (requester, requested).
    edges: Mutex<Vec<(String, String)>>,
}

impl DrawMemo {
    fn for_graph(graph: &Graph) -> Self {
        Self {
            cells: graph
                .option_names()
                .map(|n| (n.to_string(), OnceCell::new()))
                .collect(),
            edges: Mutex::new(Vec::new()),
        }
    }

    /// Records `from -> to` unless it closes a cycle.
    fn link(&self, from: &str, to: &str) -> bool {
        let mut edges = match self.edges.lock() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        if from == to || reaches(&edges, to, from) {
            return false;
        }
        edges.push((from.to_string(), to.to_string()));
        true
    }
}

fn reaches(edges: &[(String, String)], start: &str, goal: &str) -> bool {
    let mut stack = vec![start];
    let mut seen: Vec<&str> = Vec::new();
    while let Some(node) = stack.pop() {
        if node == goal {
            return true;
        }
        if seen.contains(&node) {
            continue;
        }
        seen.push(node);
        stack.extend(
            edges
                .iter()
                .filter(|(from, _)| from == node)
                .map(|(_, to)| to.as_str()),
        );
    }
    false
}

/// Handed to every resolver invocation.
#[derive(Clone)]
pub struct ResolveScope {
    graph: Graph,
    memo: Arc<DrawMemo>,
    current: String,
}

impl ResolveScope {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn target(&self) -> &str {
        self.graph.target()
    }

    /// Name of the option being resolved.
    pub fn name(&self) -> &str {
        &self.current
    }

    /// A sibling option's value for this draw, resolved at most once.
    pub fn option(&self, name: &str) -> BoxFuture<'static, Result<Option<Datum>, GraphError>> {
        if !self.memo.link(&self.current, name) {
            let err = GraphError::Cycle {
                target: self.target().to_string(),
                option: name.to_string(),
            };
            return futures_util::future::ready(Err(err)).boxed();
        }
        resolve_option(self.graph.clone(), self.memo.clone(), name.to_string())
    }

    /// Sibling value as a list of names; the usual shape of a legend.
    pub async fn names(&self, option: &str) -> Result<Vec<String>> {
        Ok(self
            .option(option)
            .await?
            .map(|d| d.text_items())
            .unwrap_or_default())
    }
}

fn resolve_option(
    graph: Graph,
    memo: Arc<DrawMemo>,
    name: String,
) -> BoxFuture<'static, Result<Option<Datum>, GraphError>> {
    async move {
        let target = graph.target().to_string();
        let entry = graph
            .entry(&name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownOption {
                target: target.clone(),
                option: name.clone(),
            })?;
        let resolver = match entry {
            OptionValue::Literal(value) => return Ok(Some(value)),
            OptionValue::Resolver(resolver) => resolver,
        };
        let cell = memo.cells.get(&name).ok_or_else(|| GraphError::UnknownOption {
            target: target.clone(),
            option: name.clone(),
        })?;
        let scope = ResolveScope {
            graph: graph.clone(),
            memo: memo.clone(),
            current: name.clone(),
        };
        let value = cell
            .get_or_try_init(|| async {
                resolver(scope).await.map_err(|e| GraphError::Resolver {
                    target: target.clone(),
                    option: name.clone(),
                    reason: format!("{:#}", e),
                })
            })
            .await?;
        Ok(value.clone())
    }
    .boxed()
}
