//! Per-item playback state keyed by feed item id.
//!
//! The store only records what the user asked for; what a device should be
//! doing right now is derived from it with [`PlaybackStore::target`].

use std::collections::HashMap;

use crate::feed::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    pub active: bool,
    pub user_paused: bool,
    pub user_muted: Option<bool>,
    pub progress_percent: f64,
}

impl PlaybackState {
    /// Mute flag as the viewer should hear it. Inactive items are always muted.
    pub fn effective_muted(&self) -> bool {
        if self.active {
            self.user_muted.unwrap_or(false)
        } else {
            true
        }
    }
}

/// What a video device should be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTarget {
    pub playing: bool,
    pub muted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Overrides {
    paused: bool,
    muted: Option<bool>,
    progress: f64,
}

#[derive(Debug, Clone)]
pub struct PlaybackStore {
    active: ItemId,
    items: HashMap<ItemId, Overrides>,
}

impl PlaybackStore {
    pub fn new(initial: ItemId) -> Self {
        Self {
            active: initial,
            items: HashMap::new(),
        }
    }

    pub fn active(&self) -> ItemId {
        self.active
    }

    pub fn is_active(&self, id: ItemId) -> bool {
        self.active == id
    }

    /// Returns true when the active item changed.
    pub fn activate(&mut self, id: ItemId) -> bool {
        if self.active == id {
            return false;
        }
        self.active = id;
        true
    }

    pub fn record_paused(&mut self, id: ItemId, paused: bool) -> bool {
        let entry = self.items.entry(id).or_default();
        let changed = entry.paused != paused;
        entry.paused = paused;
        changed
    }

    pub fn record_muted(&mut self, id: ItemId, muted: bool) -> bool {
        let entry = self.items.entry(id).or_default();
        let changed = entry.muted != Some(muted);
        entry.muted = Some(muted);
        changed
    }

    pub fn record_progress(&mut self, id: ItemId, percent: f64) {
        self.items.entry(id).or_default().progress = clamp_percent(percent);
    }

    pub fn user_paused(&self, id: ItemId) -> bool {
        self.items.get(&id).map(|o| o.paused).unwrap_or(false)
    }

    pub fn user_muted(&self, id: ItemId) -> Option<bool> {
        self.items.get(&id).and_then(|o| o.muted)
    }

    pub fn progress(&self, id: ItemId) -> f64 {
        self.items.get(&id).map(|o| o.progress).unwrap_or(0.0)
    }

    pub fn state(&self, id: ItemId) -> PlaybackState {
        let overrides = self.items.get(&id).copied().unwrap_or_default();
        PlaybackState {
            active: self.active == id,
            user_paused: overrides.paused,
            user_muted: overrides.muted,
            progress_percent: overrides.progress,
        }
    }

    pub fn target(&self, id: ItemId) -> DeviceTarget {
        let state = self.state(id);
        DeviceTarget {
            playing: state.active && !state.user_paused,
            muted: state.effective_muted(),
        }
    }
}

pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

/// `current_time / duration * 100`, or `None` when the duration is unknown.
pub fn progress_percent(current_time: f64, duration: Option<f64>) -> Option<f64> {
    let duration = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    Some(clamp_percent(current_time / duration * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_play_active_unmuted() {
        let store = PlaybackStore::new(1);
        assert_eq!(
            store.target(1),
            DeviceTarget {
                playing: true,
                muted: false
            }
        );
        assert_eq!(
            store.target(2),
            DeviceTarget {
                playing: false,
                muted: true
            }
        );
    }

    #[test]
    fn overrides_survive_activation_changes() {
        let mut store = PlaybackStore::new(1);
        assert!(store.record_paused(1, true));
        assert!(store.record_muted(1, true));
        assert!(store.activate(2));
        assert_eq!(store.target(1), DeviceTarget { playing: false, muted: true });
        assert!(store.activate(1));
        assert_eq!(store.target(1), DeviceTarget { playing: false, muted: true });
        assert!(store.record_muted(1, false));
        assert_eq!(store.target(1), DeviceTarget { playing: false, muted: false });
    }

    #[test]
    fn repeated_transitions_report_no_change() {
        let mut store = PlaybackStore::new(3);
        assert!(!store.activate(3));
        assert!(store.record_paused(3, true));
        assert!(!store.record_paused(3, true));
        assert!(store.record_muted(3, false));
        assert!(!store.record_muted(3, false));
    }

    #[test]
    fn inactive_items_are_heard_muted() {
        let mut store = PlaybackStore::new(1);
        store.record_muted(2, false);
        assert!(store.state(2).effective_muted());
        assert_eq!(store.state(2).user_muted, Some(false));
    }

    #[test]
    fn progress_is_clamped() {
        let mut store = PlaybackStore::new(1);
        store.record_progress(1, 140.0);
        assert_eq!(store.progress(1), 100.0);
        store.record_progress(1, f64::NAN);
        assert_eq!(store.progress(1), 0.0);
        assert_eq!(progress_percent(5.0, Some(20.0)), Some(25.0));
        assert_eq!(progress_percent(5.0, Some(0.0)), None);
        assert_eq!(progress_percent(5.0, None), None);
    }
}
