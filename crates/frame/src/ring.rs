use crate::FrameError;

/// Fixed ring of per-frame slots selected by a monotonically increasing frame counter.
///
/// `T` is whatever one frame needs its own copy of: GPU buffers, bind groups,
/// staging memory. The ring does no synchronization of its own.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    /// Number of calls to `advance` so far.
    frame: u64,
    current: usize,
}

impl<T> FrameRing<T> {
    /// Build a ring from already-allocated slots.
    pub fn new(slots: Vec<T>) -> Result<Self, FrameError> {
        if slots.is_empty() {
            return Err(FrameError::EmptyRing);
        }
        Ok(Self {
            slots,
            frame: 0,
            current: 0,
        })
    }

    /// Allocate `len` slots with `make`, stopping at the first failure.
    pub fn try_from_fn<E>(
        len: usize,
        mut make: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E>
    where
        E: From<FrameError>,
    {
        if len == 0 {
            return Err(FrameError::EmptyRing.into());
        }
        let slots = (0..len).map(&mut make).collect::<Result<Vec<_>, E>>()?;
        Ok(Self::new(slots)?)
    }

    /// Number of slots (frames in flight).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Frames advanced so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Move to the next slot and return its index: `0, 1, .., N-1, 0, ..`.
    ///
    /// Call once per frame, after a permit for the frame has been acquired and
    /// before anything is written to the slot.
    pub fn advance(&mut self) -> usize {
        let index = (self.frame % self.slots.len() as u64) as usize;
        self.frame += 1;
        self.current = index;
        tracing::trace!(frame = self.frame, slot = index, "frame ring advanced");
        index
    }

    /// Index last returned by [`advance`](Self::advance) (0 before the first call).
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// Mutable access to the current slot. No staleness check is made.
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}
