//! Active-item tracking and playback synchronisation.
//!
//! The tracker owns the feed, the [`PlaybackStore`], the mounted devices and
//! the single progress subscription for the active item. Every operation runs
//! to completion on the caller's thread, so an activation change and the
//! synchronisation it causes are never observed half-applied.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use crossbeam_channel::Receiver;

use crate::device::{DeviceFactory, MediaDevice, Position};
use crate::feed::{FeedItem, ItemId};
use crate::geometry::{self, ItemOffset};
use crate::playback::{self, PlaybackState, PlaybackStore};

struct ProgressSubscription {
    id: ItemId,
    rx: Receiver<Position>,
}

pub struct Tracker {
    items: Vec<FeedItem>,
    store: PlaybackStore,
    devices: HashMap<ItemId, Box<dyn MediaDevice>>,
    subscription: Option<ProgressSubscription>,
    preload: usize,
}

impl Tracker {
    pub fn new(items: Vec<FeedItem>) -> Result<Self> {
        let Some(first) = items.first() else {
            bail!("tracker: feed has no items");
        };
        let store = PlaybackStore::new(first.id);
        Ok(Self {
            items,
            store,
            devices: HashMap::new(),
            subscription: None,
            preload: 1,
        })
    }

    pub fn with_preload(mut self, preload: usize) -> Self {
        self.preload = preload;
        self
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn active(&self) -> ItemId {
        self.store.active()
    }

    pub fn active_index(&self) -> usize {
        self.index_of(self.store.active()).unwrap_or(0)
    }

    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn state(&self, id: ItemId) -> PlaybackState {
        self.store.state(id)
    }

    pub fn device(&self, id: ItemId) -> Option<&dyn MediaDevice> {
        self.devices.get(&id).map(|device| device.as_ref())
    }

    pub fn is_mounted(&self, id: ItemId) -> bool {
        self.devices.contains_key(&id)
    }

    /// Picks the item centred in the viewport. Keeps the current item when
    /// nothing contains the midpoint. Returns true when activation moved.
    pub fn on_scroll(
        &mut self,
        scroll_offset: f64,
        viewport_height: f64,
        offsets: &[ItemOffset],
    ) -> bool {
        let Some(candidate) = geometry::centered_item(scroll_offset, viewport_height, offsets)
        else {
            return false;
        };
        if self.index_of(candidate).is_none() || !self.store.activate(candidate) {
            return false;
        }
        tracing::debug!(active = candidate, "active item changed");
        self.synchronize_playback();
        true
    }

    /// Activates `id` directly, as if it had been scrolled to the centre.
    pub fn activate(&mut self, id: ItemId) -> bool {
        if self.index_of(id).is_none() || !self.store.activate(id) {
            return false;
        }
        self.synchronize_playback();
        true
    }

    /// Drives every mounted video towards its derived target. Only issues a
    /// command when the live state differs.
    pub fn synchronize_playback(&mut self) {
        for item in &self.items {
            let Some(device) = self.devices.get_mut(&item.id) else {
                continue;
            };
            if !device.is_video() {
                continue;
            }
            let target = self.store.target(item.id);
            if target.playing && device.paused() {
                if let Err(err) = device.play() {
                    tracing::warn!(item = item.id, error = %err, "play failed");
                }
            } else if !target.playing && !device.paused() {
                if let Err(err) = device.pause() {
                    tracing::warn!(item = item.id, error = %err, "pause failed");
                }
            }
            if device.muted() != target.muted {
                if let Err(err) = device.set_muted(target.muted) {
                    tracing::warn!(item = item.id, error = %err, "mute failed");
                }
            }
        }
        self.refresh_subscription();
    }

    /// Flips play/pause on the active item and records it as the user's choice.
    pub fn toggle_video(&mut self, id: ItemId) -> bool {
        if !self.store.is_active(id) {
            return false;
        }
        let Some(device) = self.devices.get_mut(&id) else {
            return false;
        };
        if !device.is_video() {
            return false;
        }
        let result = if device.paused() {
            device.play()
        } else {
            device.pause()
        };
        if let Err(err) = result {
            tracing::warn!(item = id, error = %err, "toggle playback failed");
            return false;
        }
        let paused = device.paused();
        if self.store.record_paused(id, paused) {
            self.synchronize_playback();
        }
        true
    }

    pub fn toggle_mute(&mut self, id: ItemId) -> bool {
        let muted = !self.store.user_muted(id).unwrap_or(false);
        let Some(device) = self.devices.get_mut(&id) else {
            return false;
        };
        if !device.is_video() {
            return false;
        }
        if let Err(err) = device.set_muted(muted) {
            tracing::warn!(item = id, error = %err, "toggle mute failed");
            return false;
        }
        self.store.record_muted(id, muted);
        self.synchronize_playback();
        true
    }

    /// Seeks to `percent` of the duration and records the progress right away.
    pub fn on_seek(&mut self, id: ItemId, percent: f64) -> bool {
        let Some(device) = self.devices.get_mut(&id) else {
            return false;
        };
        let Some(duration) = device.duration().filter(|d| *d > 0.0) else {
            return false;
        };
        let percent = playback::clamp_percent(percent);
        if let Err(err) = device.set_current_time(percent / 100.0 * duration) {
            tracing::warn!(item = id, error = %err, "seek failed");
            return false;
        }
        self.store.record_progress(id, percent);
        true
    }

    /// Seeks the active item relative to its stored progress.
    pub fn seek_by(&mut self, id: ItemId, delta_percent: f64) -> bool {
        let current = self.store.progress(id);
        self.on_seek(id, current + delta_percent)
    }

    /// Applies pending position updates for the active item.
    pub fn pump_progress(&mut self) -> bool {
        let Some(subscription) = &self.subscription else {
            return false;
        };
        let id = subscription.id;
        let Some(latest) = subscription.rx.try_iter().last() else {
            return false;
        };
        match playback::progress_percent(latest.current_time, latest.duration) {
            Some(percent) => {
                self.store.record_progress(id, percent);
                true
            }
            None => false,
        }
    }

    pub fn tick(&mut self, elapsed: Duration) -> bool {
        for device in self.devices.values_mut() {
            device.tick(elapsed);
        }
        self.pump_progress()
    }

    pub fn mount(&mut self, id: ItemId, device: Box<dyn MediaDevice>) {
        if self.index_of(id).is_none() {
            return;
        }
        if self.subscription.as_ref().is_some_and(|sub| sub.id == id) {
            self.subscription = None;
        }
        self.devices.insert(id, device);
        self.synchronize_playback();
    }

    pub fn unmount(&mut self, id: ItemId) {
        if self.subscription.as_ref().is_some_and(|sub| sub.id == id) {
            self.subscription = None;
        }
        if let Some(mut device) = self.devices.remove(&id) {
            device.unsubscribe_progress();
        }
    }

    /// Keeps devices mounted only for items within `preload` positions of the
    /// active one. Returns the ids that failed to mount.
    pub fn retain_window(&mut self, factory: &dyn DeviceFactory) -> Vec<ItemId> {
        let active = self.active_index();
        let start = active.saturating_sub(self.preload);
        let end = active
            .saturating_add(self.preload)
            .min(self.items.len().saturating_sub(1));

        let outside: Vec<ItemId> = self
            .items
            .iter()
            .enumerate()
            .filter(|(index, _)| *index < start || *index > end)
            .map(|(_, item)| item.id)
            .filter(|id| self.devices.contains_key(id))
            .collect();
        for id in outside {
            tracing::debug!(item = id, "unmounting device");
            self.unmount(id);
        }

        let mut failed = Vec::new();
        let missing: Vec<FeedItem> = self.items[start..=end]
            .iter()
            .filter(|item| !self.devices.contains_key(&item.id))
            .cloned()
            .collect();
        for item in missing {
            match factory.create(&item) {
                Ok(device) => {
                    tracing::debug!(item = item.id, "mounted device");
                    self.devices.insert(item.id, device);
                }
                Err(err) => {
                    tracing::warn!(item = item.id, error = %format!("{err:#}"), "device unavailable");
                    failed.push(item.id);
                }
            }
        }
        self.synchronize_playback();
        failed
    }

    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Some(device) = self.devices.get_mut(&subscription.id) {
                device.unsubscribe_progress();
            }
        }
        self.devices.clear();
    }

    fn refresh_subscription(&mut self) {
        let active = self.store.active();
        if let Some(current) = &self.subscription {
            if current.id == active {
                return;
            }
            let stale = current.id;
            self.subscription = None;
            if let Some(device) = self.devices.get_mut(&stale) {
                device.unsubscribe_progress();
            }
        }
        if let Some(device) = self.devices.get_mut(&active) {
            if device.is_video() {
                let rx = device.subscribe_progress();
                self.subscription = Some(ProgressSubscription { id: active, rx });
            }
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
