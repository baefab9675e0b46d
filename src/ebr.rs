//! Epoch-based reclamation (spec.md §4.2).
//!
//! A global epoch counter advances only when every registered participant
//! has been observed quiescent (pinned at the current epoch, or unpinned) at
//! least once. Garbage retired during epoch `e` is only freed once the
//! global epoch has advanced to at least `e + 2` — by then no reader could
//! still hold a reference taken while `e` was current.

use crate::thread_local::{ThreadId, ThreadLocal};
use crossbeam_utils::Backoff;
use once_cell::sync::Lazy;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How many retirements accumulate locally before a thread opportunistically
/// tries to advance the global epoch.
const GC_INTERVAL: usize = 1000;

pub(crate) static EBR: Lazy<Ebr> = Lazy::new(Ebr::new);

type Garbage = Box<dyn FnOnce() + Send>;

struct Participant {
    /// Epoch this thread last observed while pinned, or `UNPINNED`.
    local_epoch: AtomicUsize,
    /// Nesting depth of `pin()` calls on this thread (spec.md §4.2: "nested
    /// entries are idempotent"). Only the innermost `pin`/outermost `Guard`
    /// drop touches `local_epoch`.
    pin_depth: Cell<usize>,
    /// `advance()` frees a foreign thread's collectible bucket directly, so
    /// this is a real lock rather than a `RefCell`.
    bags: Mutex<[Vec<Garbage>; 3]>,
    since_last_advance: Cell<usize>,
}

const UNPINNED: usize = usize::MAX;

impl Participant {
    fn new() -> Self {
        Self {
            local_epoch: AtomicUsize::new(UNPINNED),
            pin_depth: Cell::new(0),
            bags: Mutex::new([Vec::new(), Vec::new(), Vec::new()]),
            since_last_advance: Cell::new(0),
        }
    }
}

// SAFETY: a `Participant` is only ever reached through `ThreadLocal`, which
// hands out `&Participant` across threads to perform the quiescence scan and
// foreign-bucket reclamation in `advance`. `bags` is a `Mutex` so that cross-
// thread access is genuinely synchronized; `pin_depth`/`since_last_advance`
// are bare `Cell`s because only the owning thread ever touches them.
unsafe impl Sync for Participant {}

pub struct Ebr {
    global_epoch: AtomicUsize,
    participants: ThreadLocal<Participant>,
}

/// An RAII pin: while held, the current thread promises not to access
/// reclaimed memory retired before it observed the current epoch.
pub struct Guard<'e> {
    ebr: &'e Ebr,
    participant: &'e Participant,
}

impl Ebr {
    fn new() -> Self {
        Self {
            global_epoch: AtomicUsize::new(0),
            participants: ThreadLocal::new(),
        }
    }

    /// Enter a protected section. Must be held for the duration of any
    /// access to a value reachable only through an [`crate::atomic::Atomic`].
    /// Re-entrant: pinning while already pinned just bumps a depth counter,
    /// the observed epoch doesn't move until the outermost guard drops.
    pub fn pin(&self) -> Guard<'_> {
        let (_, participant) = self.participants.get_or_insert_with(Participant::new);
        let depth = participant.pin_depth.get();
        if depth == 0 {
            let epoch = self.global_epoch.load(Ordering::SeqCst);
            participant.local_epoch.store(epoch, Ordering::SeqCst);
        }
        participant.pin_depth.set(depth + 1);
        Guard {
            ebr: self,
            participant,
        }
    }

    /// Defer `f` until no pinned reader could still observe the value it
    /// frees. Counts towards this thread's opportunistic advance interval.
    pub fn retire<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (_, participant) = self.participants.get_or_insert_with(Participant::new);
        let epoch = self.global_epoch.load(Ordering::SeqCst);
        participant.bags.lock().unwrap()[epoch % 3].push(Box::new(f));

        let count = participant.since_last_advance.get() + 1;
        participant.since_last_advance.set(count);
        if count >= GC_INTERVAL {
            participant.since_last_advance.set(0);
            self.try_advance();
        }
    }

    fn unpin(&self, participant: &Participant) {
        let depth = participant.pin_depth.get();
        debug_assert!(depth > 0, "unpin without a matching pin");
        if depth == 1 {
            participant.local_epoch.store(UNPINNED, Ordering::SeqCst);
        }
        participant.pin_depth.set(depth - 1);
    }

    /// Attempt to advance the global epoch by one. Fails (no-op) if any
    /// pinned participant has not yet observed the current epoch.
    pub fn try_advance(&self) -> bool {
        let current = self.global_epoch.load(Ordering::SeqCst);
        let mut quiescent = true;
        self.participants.for_each(|_, p| {
            let local = p.local_epoch.load(Ordering::SeqCst);
            if local != UNPINNED && local != current {
                quiescent = false;
            }
        });
        if !quiescent {
            return false;
        }
        if self
            .global_epoch
            .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        // Garbage retired at epoch `g` is safe once the global epoch reaches
        // `g + 2`; after this advance the global epoch is `current + 1`, so
        // the bag that just became collectible is `current + 1 - 2`.
        let freed_epoch = (current + 2) % 3;
        self.participants.for_each(|_, p| {
            let garbage = std::mem::take(&mut p.bags.lock().unwrap()[freed_epoch]);
            for dtor in garbage {
                dtor();
            }
        });
        true
    }

    /// Spin until the epoch advances, backing off between attempts. Used by
    /// tests that need a deterministic collection point.
    #[cfg(test)]
    fn force_advance(&self) {
        let backoff = Backoff::new();
        while !self.try_advance() {
            backoff.snooze();
        }
    }

    #[cfg(test)]
    fn epoch(&self) -> usize {
        self.global_epoch.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn is_quiescent(&self, thread: ThreadId) -> bool {
        self.participants
            .get_for_thread(thread)
            .map(|p| p.local_epoch.load(Ordering::SeqCst) == UNPINNED)
            .unwrap_or(true)
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.ebr.unpin(self.participant);
    }
}

/// Pin the global EBR domain.
pub fn pin() -> Guard<'static> {
    EBR.pin()
}

/// Retire a heap allocation through the global EBR domain.
pub fn retire<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    EBR.retire(f)
}
