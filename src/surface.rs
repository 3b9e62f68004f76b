//! Seams to the host page: layout queries, status text, widget lookup, and
//! the external chart renderer.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::datum::Datum;
use crate::widget::Widget;

pub trait Page: Send + Sync {
    /// Current pixel width of the mount element.
    fn width(&self, target: &str) -> Option<u32>;

    /// Height of the tallest non-graph region sharing the mount's row.
    fn sibling_height(&self, _target: &str) -> Option<u32> {
        None
    }

    fn clear(&self, target: &str);

    fn set_text(&self, target: &str, text: &str);

    fn widget(&self, selector: &str) -> Option<Arc<dyn Widget>>;
}

/// Fully resolved options handed to the renderer in one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderOptions {
    entries: BTreeMap<String, Datum>,
}

impl RenderOptions {
    pub fn new(entries: BTreeMap<String, Datum>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn target(&self) -> &str {
        self.get("target").and_then(Datum::as_str).unwrap_or("")
    }

    pub fn width(&self) -> Option<f64> {
        self.get("width").and_then(Datum::as_f64)
    }

    pub fn height(&self) -> Option<f64> {
        self.get("height").and_then(Datum::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (k, v) in &self.entries {
            out.insert(k.clone(), v.to_json());
        }
        Value::Object(out)
    }
}

/// The external chart library: one draw call per resolved graph.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, options: &RenderOptions) -> Result<()>;
}
