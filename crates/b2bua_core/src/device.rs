//! Virtual device registry (§4.A): named routing points that patch media
//! between legs without copying through the signaling stack.
//!
//! A device is either a *bridge* (one playback writer, one capture reader,
//! synchronous hand-off, no queue) or a *mix slot* (attached to the
//! mixer). The registry is a hash table keyed by name; concurrent opens of
//! the same name are resolved by checking-then-inserting under the table's
//! write lock, which gives us compare-and-swap semantics without a lower-
//! level CAS primitive.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;
use crate::mixer::{Mixer, SlotHandle, TapFn};

enum DeviceKind {
    Bridge(BridgeState),
    MixSlot(MixSlotState),
}

struct BridgeState {
    playback_bound: bool,
    capture_bound: bool,
    tap: Option<TapFn>,
}

struct MixSlotState {
    mixer: Mixer,
    slot: SlotHandle,
}

struct DeviceInner {
    name: String,
    kind: Mutex<DeviceKind>,
    refs: Mutex<u32>,
}

/// A reference to one named device. Cloning shares the same underlying
/// device; the registry itself hands out clones from `open_*`/`find`.
#[derive(Clone)]
pub struct DeviceHandle(Arc<DeviceInner>);

impl DeviceHandle {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Installs a tap: for a bridge device this wires the reader side; for
    /// a mix-slot device this installs the mixer's per-period tap.
    pub fn set_capture(&self, tap: TapFn) {
        let mut kind = self.0.kind.lock();
        match &mut *kind {
            DeviceKind::Bridge(b) => {
                b.capture_bound = true;
                b.tap = Some(tap);
            }
            DeviceKind::MixSlot(m) => m.mixer.set_slot_tap(&m.slot, tap),
        }
    }

    /// For a mix slot, toggles the slot's enable bit. A no-op on a bridge
    /// device, which is always live while both ends are bound.
    pub fn enable(&self, on: bool) {
        let kind = self.0.kind.lock();
        if let DeviceKind::MixSlot(m) = &*kind {
            m.mixer.set_slot_enabled(&m.slot, on);
        }
    }

    /// Producer side, called on the ptime clock. A bridge delivers the
    /// frame straight to the reader's tap, synchronously, on the caller's
    /// thread — there is no queue, so a late producer simply drops the
    /// frame for that period. A mix slot deposits it into the mixer's
    /// shallow one-frame ring.
    pub fn write(&self, frame: &Frame) {
        let kind = self.0.kind.lock();
        match &*kind {
            DeviceKind::Bridge(b) => {
                if let Some(tap) = &b.tap {
                    tap(frame);
                }
            }
            DeviceKind::MixSlot(m) => m.mixer.slot_put(&m.slot, frame.clone()),
        }
    }

    fn mark_playback_bound(&self) {
        if let DeviceKind::Bridge(b) = &mut *self.0.kind.lock() {
            b.playback_bound = true;
        }
    }
}

/// The hash table of live devices. Insertion/removal is expected to happen
/// only on the main/event thread; lookups and `write` calls come from pump
/// threads and are safe under the per-device lock.
pub struct DeviceRegistry {
    table: RwLock<HashMap<String, DeviceHandle>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Creates or finds a bridge device by name. Marks one more playback
    /// or capture end bound depending on `as_playback`, failing with
    /// `NameInUse` if the name already resolves to a mix slot.
    pub fn open_bridge(&self, name: &str, as_playback: bool) -> CoreResult<DeviceHandle> {
        let mut table = self.table.write();
        if let Some(existing) = table.get(name) {
            match &*existing.0.kind.lock() {
                DeviceKind::Bridge(_) => {
                    *existing.0.refs.lock() += 1;
                    let handle = existing.clone();
                    drop(table);
                    if as_playback {
                        handle.mark_playback_bound();
                    }
                    return Ok(handle);
                }
                DeviceKind::MixSlot(_) => {
                    return Err(CoreError::NameInUse(name.to_string()));
                }
            }
        }
        let handle = DeviceHandle(Arc::new(DeviceInner {
            name: name.to_string(),
            kind: Mutex::new(DeviceKind::Bridge(BridgeState {
                playback_bound: as_playback,
                capture_bound: false,
                tap: None,
            })),
            refs: Mutex::new(1),
        }));
        table.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Creates a mix-slot device bound to `mixer`, attaching a fresh slot.
    /// Fails with `NameInUse` if a device of that name already exists.
    pub fn open_mix_slot(&self, name: &str, mixer: &Mixer) -> CoreResult<DeviceHandle> {
        let mut table = self.table.write();
        if table.contains_key(name) {
            return Err(CoreError::NameInUse(name.to_string()));
        }
        let slot = mixer.add_slot();
        let handle = DeviceHandle(Arc::new(DeviceInner {
            name: name.to_string(),
            kind: Mutex::new(DeviceKind::MixSlot(MixSlotState {
                mixer: mixer.clone(),
                slot,
            })),
            refs: Mutex::new(1),
        }));
        table.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn find(&self, name: &str) -> Option<DeviceHandle> {
        self.table.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Releases one reference. When the last holder releases, the mixer
    /// (if this was a mix slot) drops its slot and the entry is erased.
    pub fn close(&self, handle: &DeviceHandle) {
        let zero = {
            let mut refs = handle.0.refs.lock();
            *refs = refs.saturating_sub(1);
            *refs == 0
        };
        if zero {
            if let DeviceKind::MixSlot(m) = &*handle.0.kind.lock() {
                m.mixer.remove_slot(&m.slot);
            }
            self.table.write().remove(&handle.0.name);
        }
    }
}
