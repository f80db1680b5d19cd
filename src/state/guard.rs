use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flag {
    Clear,
    InProgress,
    Done,
}

#[derive(Debug)]
struct Slot {
    flag: Flag,
    deferred: Option<u64>,
}

/// Idempotency guard for client teardown.
///
/// The first [`try_begin`](Self::try_begin) wins; every later call fails until
/// a successful connect [`clear`](Self::clear)s the guard again. A lost
/// connection that finds the guard held leaves a request with
/// [`begin_or_defer`](Self::begin_or_defer), handed to whoever clears it next.
#[derive(Debug)]
pub struct ShutdownGuard {
    slot: Mutex<Slot>,
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownGuard {
    /// A clear guard.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                flag: Flag::Clear,
                deferred: None,
            }),
        }
    }

    fn flag(&self) -> Flag {
        self.slot.lock().flag
    }

    /// Claim the teardown. Returns false if another caller already did.
    pub fn try_begin(&self) -> bool {
        // check, lock, check
        if self.flag() != Flag::Clear {
            return false;
        }
        let mut slot = self.slot.lock();
        if slot.flag != Flag::Clear {
            return false;
        }
        slot.flag = Flag::InProgress;
        true
    }

    /// Claim the teardown of connection `generation`, or leave it to the
    /// next [`clear`](Self::clear) when the guard is held.
    pub fn begin_or_defer(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.flag == Flag::Clear {
            slot.flag = Flag::InProgress;
            return true;
        }
        slot.deferred = Some(generation);
        false
    }

    /// Mark the claimed teardown as finished.
    pub fn finish(&self) {
        let mut slot = self.slot.lock();
        if slot.flag == Flag::InProgress {
            slot.flag = Flag::Done;
        }
    }

    /// Allow the next teardown. Called by a successful connect.
    ///
    /// Returns the connection whose teardown was deferred meanwhile, if any.
    pub fn clear(&self) -> Option<u64> {
        let mut slot = self.slot.lock();
        slot.flag = Flag::Clear;
        slot.deferred.take()
    }

    /// Clear a finished teardown, leaving one in progress untouched.
    pub fn clear_if_done(&self) {
        let mut slot = self.slot.lock();
        if slot.flag == Flag::Done {
            slot.flag = Flag::Clear;
            slot.deferred = None;
        }
    }

    /// Whether a teardown is running right now.
    pub fn is_in_progress(&self) -> bool {
        self.flag() == Flag::InProgress
    }

    /// Whether a teardown has run since the last successful connect.
    pub fn is_set(&self) -> bool {
        self.flag() != Flag::Clear
    }
}
