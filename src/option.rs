//! Named configuration values mirrored into the fragment and every bound
//! widget.

use std::sync::{Arc, Mutex, Weak};

use crate::error::ConfigError;
use crate::fragment::UrlFragmentStore;
use crate::logging::{self, Domain, Level};
use crate::registry::{RedrawScheduler, RedrawTicket};
use crate::widget::{state_for, value_of, ChangeHandler, Widget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Value taken from the fragment or the default; no widgets yet.
    Seeded,
    Bound,
    /// At least one `set` has happened.
    Updated,
}

#[derive(Clone)]
pub struct ConfigOption {
    inner: Arc<OptionInner>,
}

struct OptionInner {
    name: String,
    default: Option<String>,
    fragment: Arc<UrlFragmentStore>,
    redraw: RedrawScheduler,
    state: Mutex<OptionState>,
}

struct OptionState {
    value: Option<String>,
    widgets: Vec<Arc<dyn Widget>>,
    phase: Phase,
}

impl ConfigOption {
    /// Seeds from the fragment, falling back to `default`.
    pub(crate) fn new(
        name: &str,
        default: Option<&str>,
        fragment: Arc<UrlFragmentStore>,
        redraw: RedrawScheduler,
    ) -> Self {
        let value = fragment
            .read(name)
            .or_else(|| default.map(str::to_string));
        logging::log(
            Level::Debug,
            Domain::Config,
            "option_seeded",
            logging::obj(&[
                ("option", logging::v_str(name)),
                ("value", value.as_deref().map(logging::v_str).unwrap_or_default()),
            ]),
        );
        Self {
            inner: Arc::new(OptionInner {
                name: name.to_string(),
                default: default.map(str::to_string),
                fragment,
                redraw,
                state: Mutex::new(OptionState {
                    value,
                    widgets: Vec::new(),
                    phase: Phase::Seeded,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn default_value(&self) -> Option<&str> {
        self.inner.default.as_deref()
    }

    pub fn get(&self) -> Option<String> {
        self.with_state(|s| s.value.clone())
    }

    /// Checkbox-backed options store `"on"` / `"off"`.
    pub fn is_on(&self) -> bool {
        self.get().as_deref() == Some("on")
    }

    pub fn phase(&self) -> Phase {
        self.with_state(|s| s.phase)
    }

    pub fn widget_count(&self) -> usize {
        self.with_state(|s| s.widgets.len())
    }

    /// Binds a widget: shows the current value in it and routes its change
    /// events back into [`ConfigOption::set`].
    pub fn add_widget(&self, widget: Arc<dyn Widget>) {
        let value = {
            let mut state = self.lock();
            state.widgets.push(widget.clone());
            if state.phase == Phase::Seeded {
                state.phase = Phase::Bound;
            }
            state.value.clone()
        };
        if let Some(value) = value {
            widget.write(state_for(widget.kind(), &value));
        }

        let option: Weak<OptionInner> = Arc::downgrade(&self.inner);
        let source: Weak<dyn Widget> = Arc::downgrade(&widget);
        let handler: ChangeHandler = Arc::new(move || {
            let (Some(inner), Some(widget)) = (option.upgrade(), source.upgrade()) else {
                return;
            };
            let option = ConfigOption { inner };
            let value = value_of(&widget.read());
            if let Err(err) = option.set(&value) {
                logging::log(
                    Level::Warn,
                    Domain::Config,
                    "widget_value_rejected",
                    logging::obj(&[
                        ("option", logging::v_str(option.name())),
                        ("reason", logging::v_str(&err.to_string())),
                    ]),
                );
                // put the widget back in line with the option
                if let Some(current) = option.get() {
                    widget.write(state_for(widget.kind(), &current));
                }
            }
        });
        widget.on_change(handler);
    }

    /// Persists `value` to the fragment, pushes it into every bound widget
    /// and requests a redraw of every registered graph.
    ///
    /// A value the fragment rejects leaves the option untouched.
    pub fn set(&self, value: &str) -> Result<Option<RedrawTicket>, ConfigError> {
        let widgets = {
            let mut state = self.lock();
            self.inner.fragment.write(&self.inner.name, value)?;
            state.value = Some(value.to_string());
            state.phase = Phase::Updated;
            state.widgets.clone()
        };
        for widget in &widgets {
            widget.write(state_for(widget.kind(), value));
        }
        logging::log_option_set(&self.inner.name, value, widgets.len());
        Ok(self.inner.redraw.request())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OptionState> {
        match self.inner.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&OptionState) -> T) -> T {
        f(&self.lock())
    }
}

impl std::fmt::Debug for ConfigOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOption")
            .field("name", &self.inner.name)
            .field("value", &self.get())
            .field("phase", &self.phase())
            .finish()
    }
}
