//! Per-page context: cache, fragment, options, graphs and the page surface.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::config::{DashboardConfig, Palette};
use crate::error::ConfigError;
use crate::fetch::{FetchCache, Transport};
use crate::fragment::UrlFragmentStore;
use crate::graph::{Graph, GraphEnv, GraphOptions};
use crate::option::ConfigOption;
use crate::registry::{GraphRegistry, RedrawReport, RedrawScheduler, RedrawTicket};
use crate::surface::{Page, Renderer};

#[derive(Clone)]
pub struct DashboardContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: DashboardConfig,
    cache: FetchCache,
    fragment: Arc<UrlFragmentStore>,
    registry: GraphRegistry,
    redraw: RedrawScheduler,
    options: Mutex<BTreeMap<String, ConfigOption>>,
    env: GraphEnv,
}

impl DashboardContext {
    pub fn new(
        config: DashboardConfig,
        transport: Arc<dyn Transport>,
        page: Arc<dyn Page>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let registry = GraphRegistry::new();
        let env = GraphEnv {
            page,
            renderer,
            palette: Arc::new(config.palette.clone()),
            default_width: config.default_width,
        };
        Self {
            inner: Arc::new(ContextInner {
                cache: FetchCache::new(transport),
                fragment: Arc::new(UrlFragmentStore::new(&config.fragment)),
                redraw: RedrawScheduler::new(registry.clone()),
                registry,
                options: Mutex::new(BTreeMap::new()),
                env,
                config,
            }),
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &FetchCache {
        &self.inner.cache
    }

    pub fn fragment(&self) -> &UrlFragmentStore {
        &self.inner.fragment
    }

    pub fn registry(&self) -> &GraphRegistry {
        &self.inner.registry
    }

    pub fn page(&self) -> &Arc<dyn Page> {
        &self.inner.env.page
    }

    pub fn palette(&self) -> &Palette {
        &self.inner.env.palette
    }

    /// Declares a named option seeded from the fragment or `default`.
    pub fn option(&self, name: &str, default: Option<&str>) -> Result<ConfigOption, ConfigError> {
        let mut options = match self.inner.options.lock() {
            Ok(o) => o,
            Err(poisoned) => poisoned.into_inner(),
        };
        if options.contains_key(name) {
            return Err(ConfigError::DuplicateOption(name.to_string()));
        }
        let option = ConfigOption::new(
            name,
            default,
            self.inner.fragment.clone(),
            self.inner.redraw.clone(),
        );
        options.insert(name.to_string(), option.clone());
        Ok(option)
    }

    pub fn lookup_option(&self, name: &str) -> Option<ConfigOption> {
        self.inner
            .options
            .lock()
            .ok()
            .and_then(|o| o.get(name).cloned())
    }

    /// Binds the page widget matching `selector` to `option`.
    pub fn bind(&self, option: &ConfigOption, selector: &str) -> Result<(), ConfigError> {
        let widget = self
            .inner
            .env
            .page
            .widget(selector)
            .ok_or_else(|| ConfigError::UnknownWidget(selector.to_string()))?;
        option.add_widget(widget);
        Ok(())
    }

    /// Builds a graph against this page and registers it.
    pub fn graph(&self, options: GraphOptions) -> Graph {
        let graph = Graph::new(options, self.inner.env.clone());
        self.inner.registry.register(graph.clone());
        graph
    }

    pub fn request_redraw(&self) -> Option<RedrawTicket> {
        self.inner.redraw.request()
    }

    /// Window resize: every graph picks up its new mount width.
    pub fn on_resize(&self) -> Option<RedrawTicket> {
        self.request_redraw()
    }

    /// Requests a pass and waits for it. Outside a scheduled runtime context
    /// the registry is drawn directly.
    pub async fn redraw_all(&self) -> RedrawReport {
        match self.request_redraw() {
            Some(ticket) => ticket.finished().await,
            None => self.inner.registry.redraw_all().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FileTransport;
    use crate::headless::{CaptureRenderer, HeadlessPage};

    fn context(fragment: &str) -> (DashboardContext, Arc<HeadlessPage>) {
        let page = HeadlessPage::new();
        let config = DashboardConfig {
            fragment: fragment.to_string(),
            ..DashboardConfig::default()
        };
        let ctx = DashboardContext::new(
            config,
            Arc::new(FileTransport::new("/nonexistent")),
            page.clone(),
            CaptureRenderer::new(false),
        );
        (ctx, page)
    }

    #[test]
    fn option_names_are_unique() {
        let (ctx, _) = context("");
        ctx.option("jit", Some("on")).unwrap();
        assert_eq!(
            ctx.option("jit", Some("off")).unwrap_err(),
            ConfigError::DuplicateOption("jit".to_string())
        );
        assert!(ctx.lookup_option("jit").is_some());
    }

    #[test]
    fn bind_requires_known_selector() {
        let (ctx, page) = context("#jit=off");
        page.add_checkbox("#config-jit");
        let jit = ctx.option("jit", Some("on")).unwrap();
        ctx.bind(&jit, "#config-jit").unwrap();
        assert_eq!(jit.widget_count(), 1);
        assert_eq!(
            ctx.bind(&jit, "#nope"),
            Err(ConfigError::UnknownWidget("#nope".to_string()))
        );
    }

    #[tokio::test]
    async fn graphs_register_in_order() {
        let (ctx, _) = context("");
        ctx.graph(GraphOptions::new("#a"));
        ctx.graph(GraphOptions::new("#b"));
        assert_eq!(ctx.registry().targets(), vec!["#a", "#b"]);
        let report = ctx.redraw_all().await;
        assert_eq!(report.rendered, vec!["#a", "#b"]);
    }
}
