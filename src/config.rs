use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::retry::RetryConfig;

pub const DEFAULT_HEIGHT: u32 = 250;
/// Sibling regions shorter than this do not stretch a graph.
pub const MIN_REGION_HEIGHT: u32 = 280;
pub const DEFAULT_INTERPOLATION: &str = "linear";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Bridge,
    Performance,
    Startup,
}

impl PageKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bridge" => Some(PageKind::Bridge),
            "performance" => Some(PageKind::Performance),
            "startup" => Some(PageKind::Startup),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Bridge => "bridge",
            PageKind::Performance => "performance",
            PageKind::Startup => "startup",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub page: PageKind,
    pub data_base: String,
    pub fragment: String,
    pub default_width: u32,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    pub fetch_base_delay_ms: u64,
    pub worker_timeout_secs: u64,
    pub startup_worker_cmd: Option<String>,
    pub palette: Palette,
    pub echo_render: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            page: PageKind::Bridge,
            data_base: "http://localhost:8000/".to_string(),
            fragment: String::new(),
            default_width: 640,
            fetch_timeout_secs: 10,
            fetch_retries: 2,
            fetch_base_delay_ms: 100,
            worker_timeout_secs: 60,
            startup_worker_cmd: None,
            palette: Palette::default(),
            echo_render: true,
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from `var`, falling back to defaults for missing or
    /// unparsable values.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            page: var("DASHBOARD_PAGE")
                .and_then(|v| PageKind::parse(&v))
                .unwrap_or(d.page),
            data_base: var("DATA_BASE").unwrap_or(d.data_base),
            fragment: var("DASHBOARD_FRAGMENT").unwrap_or(d.fragment),
            default_width: parse_var(&var, "GRAPH_WIDTH").unwrap_or(d.default_width),
            fetch_timeout_secs: parse_var(&var, "FETCH_TIMEOUT_SECS")
                .unwrap_or(d.fetch_timeout_secs),
            fetch_retries: parse_var(&var, "FETCH_RETRIES").unwrap_or(d.fetch_retries),
            fetch_base_delay_ms: parse_var(&var, "FETCH_BASE_DELAY_MS")
                .unwrap_or(d.fetch_base_delay_ms),
            worker_timeout_secs: parse_var(&var, "WORKER_TIMEOUT_SECS")
                .unwrap_or(d.worker_timeout_secs),
            startup_worker_cmd: var("STARTUP_WORKER_CMD").filter(|v| !v.trim().is_empty()),
            palette: match var("PALETTE") {
                Some(v) => d.palette.with_overrides(&v),
                None => d.palette,
            },
            echo_render: match var("ECHO_RENDER") {
                Some(v) => !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"),
                None => d.echo_render,
            },
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.fetch_retries,
            base_delay_ms: self.fetch_base_delay_ms,
            ..RetryConfig::default()
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

/// Engine name to chart color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: BTreeMap<String, String>,
}

impl Default for Palette {
    fn default() -> Self {
        let colors = [
            ("cpython", "#3366cc"),
            ("pypy", "#dc3912"),
            ("pypy-nojit", "#e67300"),
            ("js+pypy", "#ff9900"),
            ("js+pypy-nojit", "#b77322"),
            ("d8+pypy", "#109618"),
            ("d8+pypy-nojit", "#329262"),
            ("raw", "#990099"),
            ("gz", "#0099c6"),
        ];
        Self {
            colors: colors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Palette {
    pub fn empty() -> Self {
        Self {
            colors: BTreeMap::new(),
        }
    }

    /// Applies `name=color,name=color` overrides; malformed pairs are skipped.
    pub fn with_overrides(mut self, overrides: &str) -> Self {
        for pair in overrides.split(',') {
            if let Some((name, color)) = pair.split_once('=') {
                let (name, color) = (name.trim(), color.trim());
                if !name.is_empty() && !color.is_empty() {
                    self.colors.insert(name.to_string(), color.to_string());
                }
            }
        }
        self
    }

    pub fn color_for(&self, name: &str) -> Option<&str> {
        self.colors.get(name).map(String::as_str)
    }

    /// Positional colors for a legend, only when every entry is known.
    pub fn colors_for(&self, legend: &[String]) -> Option<Vec<String>> {
        if legend.is_empty() {
            return None;
        }
        legend
            .iter()
            .map(|name| self.color_for(name).map(str::to_string))
            .collect()
    }
}
