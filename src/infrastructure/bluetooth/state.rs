//! Device state store
//!
//! Single owner of the cached [`DeviceState`]. Observers read snapshots or
//! follow a `watch` channel; only the driver mutates.

use crate::domain::effects::EffectCatalog;
use crate::domain::models::DeviceState;
use crate::infrastructure::bluetooth::notification::{self, SideEffect};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Fired whenever the device reports an authoritative state change
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

pub struct DeviceStateStore {
    state: watch::Sender<DeviceState>,
    catalog: EffectCatalog,
    update_callback: Mutex<Option<UpdateCallback>>,
}

impl DeviceStateStore {
    pub fn new(catalog: EffectCatalog) -> Self {
        let (state, _) = watch::channel(DeviceState::new(&catalog));
        Self {
            state,
            catalog,
            update_callback: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> &EffectCatalog {
        &self.catalog
    }

    pub fn snapshot(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    /// Mutate in place; every observer is woken
    pub fn modify(&self, f: impl FnOnce(&mut DeviceState)) {
        self.state.send_modify(f);
    }

    /// Decode a status frame into the cached state in one step, so it cannot
    /// interleave with an optimistic update. Observers are only woken when
    /// something changed.
    pub fn apply_notification(&self, frame: &[u8]) -> Vec<SideEffect> {
        let catalog = self.catalog;
        let mut effects = Vec::new();
        self.state.send_if_modified(|state| {
            let (next, side_effects) = notification::interpret(state, frame, &catalog);
            effects = side_effects;
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        });
        effects
    }

    /// Previous state is no longer trustworthy: everything reads as off
    pub fn reset_off(&self) {
        debug!("Resetting cached state to off");
        self.modify(DeviceState::mark_all_off);
    }

    pub fn set_update_callback(&self, callback: UpdateCallback) {
        debug!("Setting update callback");
        *self
            .update_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn update_callback(&self) -> Option<UpdateCallback> {
        self.update_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invoke the update callback on the current thread, if one is set
    pub fn fire_update(&self) {
        if let Some(callback) = self.update_callback() {
            callback();
        }
    }
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new(EffectCatalog::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_reset_off_keeps_color_data() {
        let store = DeviceStateStore::default();
        store.modify(|s| {
            s.white_on = true;
            s.color_on = true;
            s.color_brightness = 12;
        });
        store.reset_off();

        let state = store.snapshot();
        assert!(!state.is_on());
        assert_eq!(state.color_brightness, 12);
    }

    #[test]
    fn test_observers_see_mutations() {
        let store = DeviceStateStore::default();
        let mut rx = store.subscribe();
        store.modify(|s| s.white_on = true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().white_on);
    }

    #[test]
    fn test_apply_notification_only_wakes_on_change() {
        let store = DeviceStateStore::default();
        let mut rx = store.subscribe();
        let off = [0xFE, 0xEF, 0x0A, 0, 0xAB, 0xAA, 0, 0, 255];

        let effects = store.apply_notification(&off);
        assert_eq!(effects, vec![SideEffect::NotifyUpdate]);
        assert!(!rx.has_changed().unwrap());

        store.modify(|s| s.color_on = true);
        rx.borrow_and_update();
        store.apply_notification(&off);
        assert!(rx.has_changed().unwrap());
        assert!(!store.snapshot().color_on);
    }

    #[test]
    fn test_fire_update_without_callback_is_noop() {
        let store = DeviceStateStore::default();
        store.fire_update();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        store.set_update_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        store.fire_update();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
