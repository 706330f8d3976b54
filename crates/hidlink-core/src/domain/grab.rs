//! Grab accounting.
//!
//! The peer claims exclusive ownership of individual report streams by
//! *grabbing* a `(device, report_id)` pair.  The client must only send
//! reports for pairs that are currently grabbed; everything else is
//! silently dropped.
//!
//! Each declared device owns exactly one [`GrabSet`] (256 bits, one per
//! possible report ID).  The [`GrabAccountant`] is the arena of all of them,
//! indexed by device slot and owned by the client context.

use std::collections::TryReserveError;

/// Maximum number of devices a client can declare (the enable mask is 32 bits).
pub const MAX_DEVICES: usize = 32;

const WORDS: usize = 256 / 64;

/// Fixed-width 256-bit set of grabbed report IDs for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GrabSet {
    bits: [u64; WORDS],
}

impl GrabSet {
    /// Creates an empty set: nothing grabbed.
    pub const fn new() -> Self {
        Self { bits: [0; WORDS] }
    }

    #[inline]
    fn locate(report_id: u8) -> (usize, u64) {
        (report_id as usize / 64, 1u64 << (report_id % 64))
    }

    /// Marks `report_id` as grabbed by the peer.
    pub fn grab(&mut self, report_id: u8) {
        let (word, mask) = Self::locate(report_id);
        self.bits[word] |= mask;
    }

    /// Marks `report_id` as released by the peer.
    pub fn release(&mut self, report_id: u8) {
        let (word, mask) = Self::locate(report_id);
        self.bits[word] &= !mask;
    }

    pub fn is_grabbed(&self, report_id: u8) -> bool {
        let (word, mask) = Self::locate(report_id);
        self.bits[word] & mask != 0
    }

    /// Releases every report ID at once.
    pub fn reset_all(&mut self) {
        self.bits = [0; WORDS];
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Iterates over the grabbed report IDs in ascending order.
    pub fn grabbed(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |id| self.is_grabbed(*id))
    }
}

/// One [`GrabSet`] per declared device slot.
///
/// Device IDs arrive from the wire as `u32`; IDs outside the declared range
/// are ignored instead of indexing past the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabAccountant {
    sets: Box<[GrabSet]>,
}

impl GrabAccountant {
    /// Allocates `device_count` empty sets.
    ///
    /// # Errors
    ///
    /// Returns the allocator's [`TryReserveError`] if the arena cannot be
    /// allocated.
    pub fn try_new(device_count: usize) -> Result<Self, TryReserveError> {
        let mut sets = Vec::new();
        sets.try_reserve_exact(device_count)?;
        sets.resize(device_count, GrabSet::new());
        Ok(Self {
            sets: sets.into_boxed_slice(),
        })
    }

    /// Number of device slots tracked.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn slot_mut(&mut self, device_id: u32) -> Option<&mut GrabSet> {
        self.sets.get_mut(device_id as usize)
    }

    /// Returns the set owned by `device_id`, if that slot exists.
    pub fn device(&self, device_id: u32) -> Option<&GrabSet> {
        self.sets.get(device_id as usize)
    }

    /// Records a grab.  Returns `false` if `device_id` is not a declared slot.
    pub fn grab(&mut self, device_id: u32, report_id: u8) -> bool {
        match self.slot_mut(device_id) {
            Some(set) => {
                set.grab(report_id);
                true
            }
            None => false,
        }
    }

    /// Records a release.  Returns `false` if `device_id` is not a declared slot.
    pub fn release(&mut self, device_id: u32, report_id: u8) -> bool {
        match self.slot_mut(device_id) {
            Some(set) => {
                set.release(report_id);
                true
            }
            None => false,
        }
    }

    /// `false` for undeclared devices.
    pub fn is_grabbed(&self, device_id: u32, report_id: u8) -> bool {
        self.device(device_id)
            .map(|set| set.is_grabbed(report_id))
            .unwrap_or(false)
    }

    /// Clears one device's set (the peer closed the device).
    pub fn reset_device(&mut self, device_id: u32) -> bool {
        match self.slot_mut(device_id) {
            Some(set) => {
                set.reset_all();
                true
            }
            None => false,
        }
    }

    /// Clears every device's set (the connection was lost).
    pub fn reset_all(&mut self) {
        self.sets.iter_mut().for_each(GrabSet::reset_all);
    }
}
