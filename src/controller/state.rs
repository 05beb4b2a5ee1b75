use serde::Serialize;

use crate::diff::{self, Detection};
use crate::notification::Permission;

/// Identifier history and alert bookkeeping. Owned by the controller.
#[derive(Debug, Default)]
pub struct WatcherState {
    current: Vec<String>,
    previous: Vec<String>,
    pending_alert: Option<String>,
    alert_count: u64,
}

impl WatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one snapshot's identifiers. `None` means the document was absent or malformed.
    ///
    /// Malformed input empties the current list without touching the diff baseline and
    /// never alerts. Valid input is diffed against the baseline, which it then replaces.
    pub fn apply(&mut self, identifiers: Option<Vec<String>>) -> Option<Detection> {
        let detection = match identifiers {
            None => {
                self.current.clear();
                None
            }
            Some(current) => {
                let detection = diff::detect(&self.previous, &current);
                if let Some(found) = &detection {
                    self.pending_alert = Some(found.latest.clone());
                    self.alert_count += 1;
                }
                self.previous.clone_from(&current);
                self.current = current;
                detection
            }
        };

        // The flagged identifier must still be listed.
        if let Some(pending) = &self.pending_alert
            && !self.current.contains(pending)
        {
            self.pending_alert = None;
        }
        detection
    }

    /// Clear the flagged identifier, returning it.
    pub fn clear_pending(&mut self) -> Option<String> {
        self.pending_alert.take()
    }

    pub fn current(&self) -> &[String] {
        &self.current
    }

    pub fn pending_alert(&self) -> Option<&str> {
        self.pending_alert.as_deref()
    }

    pub fn alert_count(&self) -> u64 {
        self.alert_count
    }
}

/// Read-only view of the controller, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetState {
    pub identifiers: Vec<String>,
    pub pending_alert: Option<String>,
    pub alert_count: u64,
    pub sound_enabled: bool,
    pub background_mode: bool,
    pub permission: Permission,
    pub ringing: bool,
    pub detail_open: bool,
    /// True until the first snapshot or error arrives.
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            identifiers: Vec::new(),
            pending_alert: None,
            alert_count: 0,
            sound_enabled: true,
            background_mode: false,
            permission: Permission::NotDetermined,
            ringing: false,
            detail_open: false,
            loading: true,
            error: None,
        }
    }
}

impl WidgetState {
    pub fn total(&self) -> usize {
        self.identifiers.len()
    }

    /// Identifiers containing `marker`.
    pub fn valid_format_count(&self, marker: &str) -> usize {
        self.identifiers.iter().filter(|id| id.contains(marker)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_first_snapshot_sets_baseline_without_alert() {
        let mut state = WatcherState::new();
        assert_eq!(state.apply(ids(&["a", "b"])), None);
        assert_eq!(state.current(), ["a", "b"]);
        assert_eq!(state.alert_count(), 0);

        // The baseline is now set, so growth alerts.
        assert!(state.apply(ids(&["a", "b", "c"])).is_some());
    }

    #[test]
    fn test_growth_flags_last_new_and_counts_once() {
        let mut state = WatcherState::new();
        state.apply(ids(&["a"]));
        let detection = state.apply(ids(&["a", "b", "c"])).unwrap();
        assert_eq!(detection.latest, "c");
        assert_eq!(state.pending_alert(), Some("c"));
        assert_eq!(state.alert_count(), 1);
    }

    #[test]
    fn test_same_length_change_does_not_alert() {
        let mut state = WatcherState::new();
        state.apply(ids(&["a", "b"]));
        assert_eq!(state.apply(ids(&["a", "c"])), None);
        assert_eq!(state.pending_alert(), None);
        assert_eq!(state.alert_count(), 0);
        assert_eq!(state.current(), ["a", "c"]);
    }

    #[test]
    fn test_malformed_snapshot_keeps_baseline() {
        let mut state = WatcherState::new();
        state.apply(ids(&["a"]));
        assert_eq!(state.apply(None), None);
        assert!(state.current().is_empty());

        // Still diffed against ["a"], not against the empty list.
        let detection = state.apply(ids(&["a", "b"])).unwrap();
        assert_eq!(detection.latest, "b");
    }

    #[test]
    fn test_pending_cleared_when_identifier_disappears() {
        let mut state = WatcherState::new();
        state.apply(ids(&["a"]));
        state.apply(ids(&["a", "b"]));
        assert_eq!(state.pending_alert(), Some("b"));
        state.apply(ids(&["a"]));
        assert_eq!(state.pending_alert(), None);
        assert_eq!(state.alert_count(), 1, "count never decreases");
    }

    #[test]
    fn test_widget_counts() {
        let state = WidgetState {
            identifiers: vec!["user_1".into(), "guest".into(), "user_2".into()],
            ..WidgetState::default()
        };
        assert_eq!(state.total(), 3);
        assert_eq!(state.valid_format_count("user_"), 2);
    }
}
