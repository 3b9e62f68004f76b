//! UI control seam.
//!
//! A widget is owned by the page; options only read and write its displayed
//! state and listen for user changes.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Checkbox,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    Checked(bool),
    Value(String),
}

pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

pub trait Widget: Send + Sync {
    fn selector(&self) -> &str;

    fn kind(&self) -> WidgetKind;

    fn read(&self) -> WidgetState;

    /// Programmatic update. Must not notify change handlers.
    fn write(&self, state: WidgetState);

    /// Called after every user-driven change.
    fn on_change(&self, handler: ChangeHandler);

    /// Replaces the entries of a select-like control.
    fn set_choices(&self, _choices: &[String]) {}
}

/// Displayed state for an option value. Checkboxes are checked only for `"on"`.
pub fn state_for(kind: WidgetKind, value: &str) -> WidgetState {
    match kind {
        WidgetKind::Checkbox => WidgetState::Checked(value == "on"),
        WidgetKind::Select => WidgetState::Value(value.to_string()),
    }
}

/// Option value for a displayed state.
pub fn value_of(state: &WidgetState) -> String {
    match state {
        WidgetState::Checked(true) => "on".to_string(),
        WidgetState::Checked(false) => "off".to_string(),
        WidgetState::Value(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkbox_mapping() {
        assert_eq!(state_for(WidgetKind::Checkbox, "on"), WidgetState::Checked(true));
        assert_eq!(state_for(WidgetKind::Checkbox, "off"), WidgetState::Checked(false));
        assert_eq!(value_of(&WidgetState::Checked(true)), "on");
        assert_eq!(value_of(&WidgetState::Checked(false)), "off");
    }

    #[test]
    fn select_passes_literal() {
        let state = state_for(WidgetKind::Select, "cpython");
        assert_eq!(value_of(&state), "cpython");
    }
}
