//! Lock scratch buffers for tasks that share an output tile
//!
//! When a column's reduction is split into several segments, every segment
//! produces a partial tile for the same destination. Those partials meet in
//! a [`LockSlot`], which applies them in the static rank order recorded in
//! the schedule, so the summation order never depends on thread timing.

use super::Device;
use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::hint::spin_loop;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Spin iterations before a waiting task starts yielding its thread
const SPIN_LIMIT: u32 = 6;

/// Exponential spin, then thread yield, for `try_lock` loops
#[derive(Debug, Default)]
struct Backoff {
    spins: u32,
}

impl Backoff {
    fn is_yielding(&self) -> bool {
        self.spins >= SPIN_LIMIT
    }

    fn snooze(&mut self) {
        if self.is_yielding() {
            std::thread::yield_now();
        } else {
            for _ in 0..(1u32 << self.spins) {
                spin_loop();
            }
            self.spins += 1;
        }
    }
}

/// Take a device's lock buffer for one launch
///
/// Launches on one device are serialized on the buffer. A waiting caller
/// spins, then yields; inside a rayon pool it runs pending pool work
/// instead of parking the worker.
pub(crate) fn lock_buffer(buffer: &Mutex<LockBuffer>) -> MutexGuard<'_, LockBuffer> {
    let mut backoff = Backoff::default();
    loop {
        if let Some(guard) = buffer.try_lock() {
            return guard;
        }
        #[cfg(feature = "rayon")]
        if backoff.is_yielding() && matches!(rayon::yield_now(), Some(rayon::Yield::Executed)) {
            continue;
        }
        backoff.snooze();
    }
}

/// State of one lock slot
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LockState {
    /// No partial applied yet; only rank 0 may leave this state
    #[default]
    Uninitialized,
    /// Rank 0 has written its partial
    Initialized,
    /// At least one later rank has been added
    Accumulating,
    /// All `max_tasks` partials applied
    Done,
}

/// Accumulator gate for one destination tile
#[derive(Debug, Default)]
pub struct LockSlot {
    state: LockState,
    next_rank: u32,
    values: Vec<f64>,
    parked: BTreeMap<u32, Vec<f64>>,
}

impl LockSlot {
    /// Current state
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Submit the partial tile of the task with static `rank`
    ///
    /// Partials ahead of their turn are parked until every lower rank has
    /// been applied. Returns the finished tile to the caller whose arrival
    /// completes the slot, and resets the slot for reuse.
    pub fn arrive(&mut self, rank: u32, max_tasks: u32, partial: Vec<f64>) -> Result<Option<Vec<f64>>> {
        if rank >= max_tasks {
            return Err(Error::internal(format!(
                "lock rank {rank} out of range for {max_tasks} tasks"
            )));
        }
        if rank < self.next_rank || self.parked.contains_key(&rank) {
            return Err(Error::internal(format!("lock rank {rank} arrived twice")));
        }
        self.parked.insert(rank, partial);

        while let Some(partial) = self.parked.remove(&self.next_rank) {
            self.apply(partial)?;
            self.next_rank += 1;
        }

        if self.next_rank == max_tasks {
            self.state = LockState::Done;
            let tile = std::mem::take(&mut self.values);
            self.reset();
            return Ok(Some(tile));
        }
        Ok(None)
    }

    fn apply(&mut self, partial: Vec<f64>) -> Result<()> {
        match self.state {
            LockState::Uninitialized => {
                self.values = partial;
                self.state = LockState::Initialized;
            }
            LockState::Initialized | LockState::Accumulating => {
                if partial.len() != self.values.len() {
                    return Err(Error::internal(format!(
                        "partial tile of {} values does not match {}",
                        partial.len(),
                        self.values.len()
                    )));
                }
                for (acc, v) in self.values.iter_mut().zip(partial) {
                    *acc += v;
                }
                self.state = LockState::Accumulating;
            }
            LockState::Done => {
                return Err(Error::internal("partial applied to a finished lock"));
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = LockState::Uninitialized;
        self.next_rank = 0;
        self.values = Vec::new();
        self.parked.clear();
    }
}

/// Lock slots of one device
#[derive(Debug, Default)]
pub struct LockBuffer {
    slots: Vec<Mutex<LockSlot>>,
}

impl LockBuffer {
    /// Number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the buffer has no slots
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Grow to at least `size` slots; never shrinks
    pub fn ensure(&mut self, size: usize) {
        if size > self.slots.len() {
            debug!(from = self.slots.len(), to = size, "growing lock buffer");
            self.slots.resize_with(size, Default::default);
        }
    }

    /// Return the first `size` slots to `Uninitialized`
    pub fn reset(&mut self, size: usize) {
        for slot in self.slots.iter_mut().take(size) {
            slot.get_mut().reset();
        }
    }

    /// Submit a partial tile to slot `index`
    ///
    /// The slot gate is taken with `try_lock`, spinning and then yielding
    /// while another task holds it.
    pub fn submit(
        &self,
        index: usize,
        rank: u32,
        max_tasks: u32,
        partial: Vec<f64>,
    ) -> Result<Option<Vec<f64>>> {
        let slot = self.slots.get(index).ok_or_else(|| {
            Error::internal(format!(
                "lock slot {index} beyond buffer of {} slots",
                self.slots.len()
            ))
        })?;

        let mut backoff = Backoff::default();
        loop {
            if let Some(mut guard) = slot.try_lock() {
                return guard.arrive(rank, max_tasks, partial);
            }
            backoff.snooze();
        }
    }

    /// State of slot `index`
    pub fn state(&self, index: usize) -> Option<LockState> {
        self.slots.get(index).map(|s| s.lock().state())
    }
}

/// Device-keyed lock buffers shared by every scheduler using the pool
#[derive(Debug, Default)]
pub struct LockPool {
    buffers: Mutex<HashMap<Device, Arc<Mutex<LockBuffer>>>>,
}

impl LockPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide pool
    pub fn global() -> Arc<LockPool> {
        static GLOBAL: OnceLock<Arc<LockPool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(LockPool::new())).clone()
    }

    /// Buffer of `device`, created empty on first use
    pub fn buffer(&self, device: &Device) -> Arc<Mutex<LockBuffer>> {
        self.buffers.lock().entry(*device).or_default().clone()
    }
}
