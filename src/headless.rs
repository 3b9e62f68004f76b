//! In-process page surface: widgets, status text and a capturing renderer.
//! Drives the command-line dashboard and the integration tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::surface::{Page, RenderOptions, Renderer};
use crate::widget::{ChangeHandler, Widget, WidgetKind, WidgetState};

pub struct HeadlessWidget {
    selector: String,
    kind: WidgetKind,
    state: Mutex<WidgetState>,
    choices: Mutex<Vec<String>>,
    handlers: Mutex<Vec<ChangeHandler>>,
}

impl HeadlessWidget {
    pub fn checkbox(selector: &str) -> Arc<Self> {
        Arc::new(Self::build(selector, WidgetKind::Checkbox, WidgetState::Checked(false), &[]))
    }

    pub fn select(selector: &str, choices: &[&str]) -> Arc<Self> {
        Arc::new(Self::build(
            selector,
            WidgetKind::Select,
            WidgetState::Value(String::new()),
            choices,
        ))
    }

    fn build(selector: &str, kind: WidgetKind, state: WidgetState, choices: &[&str]) -> Self {
        Self {
            selector: selector.to_string(),
            kind,
            state: Mutex::new(state),
            choices: Mutex::new(choices.iter().map(|c| c.to_string()).collect()),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Simulates the visitor changing the control.
    pub fn user_input(&self, state: WidgetState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
        let handlers = self.handlers.lock().map(|h| h.clone()).unwrap_or_default();
        for handler in handlers {
            handler();
        }
    }

    pub fn choices(&self) -> Vec<String> {
        self.choices.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Widget for HeadlessWidget {
    fn selector(&self) -> &str {
        &self.selector
    }

    fn kind(&self) -> WidgetKind {
        self.kind
    }

    fn read(&self) -> WidgetState {
        match self.state.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write(&self, state: WidgetState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn on_change(&self, handler: ChangeHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }

    fn set_choices(&self, choices: &[String]) {
        if let Ok(mut current) = self.choices.lock() {
            *current = choices.to_vec();
        }
    }
}

#[derive(Default)]
pub struct HeadlessPage {
    widgets: Mutex<HashMap<String, Arc<HeadlessWidget>>>,
    texts: Mutex<HashMap<String, String>>,
    widths: Mutex<HashMap<String, u32>>,
    sibling_heights: Mutex<HashMap<String, u32>>,
    clears: Mutex<Vec<String>>,
}

impl HeadlessPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_widget(&self, widget: Arc<HeadlessWidget>) -> Arc<HeadlessWidget> {
        if let Ok(mut widgets) = self.widgets.lock() {
            widgets.insert(widget.selector().to_string(), widget.clone());
        }
        widget
    }

    pub fn add_checkbox(&self, selector: &str) -> Arc<HeadlessWidget> {
        self.add_widget(HeadlessWidget::checkbox(selector))
    }

    pub fn add_select(&self, selector: &str, choices: &[&str]) -> Arc<HeadlessWidget> {
        self.add_widget(HeadlessWidget::select(selector, choices))
    }

    pub fn headless_widget(&self, selector: &str) -> Option<Arc<HeadlessWidget>> {
        self.widgets.lock().ok().and_then(|w| w.get(selector).cloned())
    }

    pub fn set_width(&self, target: &str, width: u32) {
        if let Ok(mut widths) = self.widths.lock() {
            widths.insert(target.to_string(), width);
        }
    }

    pub fn set_sibling_height(&self, target: &str, height: u32) {
        if let Ok(mut heights) = self.sibling_heights.lock() {
            heights.insert(target.to_string(), height);
        }
    }

    pub fn text(&self, target: &str) -> Option<String> {
        self.texts.lock().ok().and_then(|t| t.get(target).cloned())
    }

    pub fn clears(&self) -> Vec<String> {
        self.clears.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Page for HeadlessPage {
    fn width(&self, target: &str) -> Option<u32> {
        self.widths.lock().ok().and_then(|w| w.get(target).copied())
    }

    fn sibling_height(&self, target: &str) -> Option<u32> {
        self.sibling_heights
            .lock()
            .ok()
            .and_then(|h| h.get(target).copied())
    }

    fn clear(&self, target: &str) {
        if let Ok(mut clears) = self.clears.lock() {
            clears.push(target.to_string());
        }
    }

    fn set_text(&self, target: &str, text: &str) {
        if let Ok(mut texts) = self.texts.lock() {
            texts.insert(target.to_string(), text.to_string());
        }
    }

    fn widget(&self, selector: &str) -> Option<Arc<dyn Widget>> {
        self.headless_widget(selector).map(|w| w as Arc<dyn Widget>)
    }
}

/// Keeps every render call; optionally echoes each as a JSON line on stdout.
#[derive(Default)]
pub struct CaptureRenderer {
    frames: Mutex<Vec<RenderOptions>>,
    echo: bool,
}

impl CaptureRenderer {
    pub fn new(echo: bool) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            echo,
        })
    }

    pub fn frames(&self) -> Vec<RenderOptions> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Most recent render call for `target`.
    pub fn last_for(&self, target: &str) -> Option<RenderOptions> {
        self.frames()
            .into_iter()
            .rev()
            .find(|f| f.target() == target)
    }

    pub fn count_for(&self, target: &str) -> usize {
        self.frames().iter().filter(|f| f.target() == target).count()
    }
}

#[async_trait]
impl Renderer for CaptureRenderer {
    async fn render(&self, options: &RenderOptions) -> Result<()> {
        if self.echo {
            println!("{}", options.to_json());
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(options.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn programmatic_writes_do_not_notify() {
        let widget = HeadlessWidget::checkbox("#c");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        widget.on_change(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        widget.write(WidgetState::Checked(true));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        widget.user_input(WidgetState::Checked(false));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn page_finds_widgets_by_selector() {
        let page = HeadlessPage::new();
        page.add_select("#norm", &["cpython", "pypy"]);
        assert!(page.widget("#norm").is_some());
        assert!(page.widget("#missing").is_none());
        assert_eq!(page.headless_widget("#norm").unwrap().choices(), vec!["cpython", "pypy"]);
    }

    #[tokio::test]
    async fn capture_renderer_keeps_frames() {
        let renderer = CaptureRenderer::new(false);
        let mut entries = std::collections::BTreeMap::new();
        entries.insert("target".to_string(), crate::datum::Datum::from("#g"));
        renderer.render(&RenderOptions::new(entries)).await.unwrap();
        assert_eq!(renderer.count_for("#g"), 1);
        assert!(renderer.last_for("#g").is_some());
        assert!(renderer.last_for("#other").is_none());
    }
}
