//! Michael–Scott FIFO over ordinary single-word CAS (spec.md §4.5).

use crate::{atomic::Atomic, ebr};
use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering;

struct Node<T> {
    elem: UnsafeCell<MaybeUninit<T>>,
    next: Atomic<*mut Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self {
            elem: UnsafeCell::new(MaybeUninit::uninit()),
            next: Atomic::new(ptr::null_mut()),
        }))
    }

    fn new(elem: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            elem: UnsafeCell::new(MaybeUninit::new(elem)),
            next: Atomic::new(ptr::null_mut()),
        }))
    }
}

/// A lock-free FIFO. `front` always points at a sentinel node whose `elem`
/// has either never been written or was already consumed by a prior `pop`.
pub struct MsQueue<T> {
    front: Atomic<*mut Node<T>>,
    back: Atomic<*mut Node<T>>,
}

impl<T> MsQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::sentinel();
        Self {
            front: Atomic::new(sentinel),
            back: Atomic::new(sentinel),
        }
    }

    pub fn push(&self, elem: T) {
        let n = Node::new(elem);
        let backoff = Backoff::new();
        loop {
            let t = self.back.load();
            let next = unsafe { (*t).next.load() };
            if !next.is_null() {
                // back lags behind; help it catch up before retrying
                let _ = self.back.compare_exchange(t, next);
                backoff.spin();
                continue;
            }
            if unsafe { (*t).next.compare_exchange(ptr::null_mut(), n) }.is_ok() {
                // best-effort: if this fails, some other thread already helped
                let _ = self.back.compare_exchange(t, n);
                return;
            }
            backoff.spin();
        }
    }

    pub fn pop(&self) -> Option<T> {
        let _guard = ebr::pin();
        let backoff = Backoff::new();
        loop {
            let f = self.front.load();
            let new_f = unsafe { (*f).next.load() };
            if new_f.is_null() {
                return None;
            }
            // read before advancing front: once the CAS below lands, f may
            // be retired and new_f becomes the sentinel for the next reader
            let elem = unsafe { ptr::read((*new_f).elem.get()) };
            if self.front.compare_exchange(f, new_f).is_ok() {
                ebr::retire(move || unsafe {
                    drop(Box::from_raw(f));
                });
                return Some(unsafe { elem.assume_init() });
            }
            // lost the race: another thread already moved the logical value
            std::mem::forget(elem);
            backoff.spin();
        }
    }

    /// `true` if no element is currently enqueued. Matches spec.md §4.5:
    /// equivalent to `front.next == null`.
    pub fn is_empty(&self) -> bool {
        let _guard = ebr::pin();
        let f = self.front.load();
        unsafe { (*f).next.load().is_null() }
    }

    /// Quiescent-only structural check (spec.md §9: "not thread-safe if run
    /// concurrently with ops; use only in quiescent post-conditions").
    pub fn debug_is_valid(&self) -> bool {
        let front = self.front.load();
        let back = self.back.load();
        let mut curr = front;
        loop {
            if curr == back {
                return unsafe { (*back).next.load().is_null() };
            }
            let next = unsafe { (*curr).next.load() };
            if next.is_null() {
                return false;
            }
            curr = next;
        }
    }
}

impl<T> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        let mut curr = self.front.load();
        let mut first = true;
        while !curr.is_null() {
            unsafe {
                let next = (*curr).next.load();
                if !first {
                    ptr::drop_in_place((*curr).elem.get() as *mut T);
                }
                drop(Box::from_raw(curr));
                curr = next;
            }
            first = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_pop_fifo_order() {
        let q = MsQueue::new();
        assert_eq!(q.pop(), None);
        for i in 0..100_000u64 {
            q.push(i);
        }
        for i in 0..100_000u64 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn eight_threads_push_one_sums_to_total() {
        let q = Arc::new(MsQueue::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let q = q.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100_000 {
                    q.push(1u64);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut total = 0u64;
        while let Some(v) = q.pop() {
            total += v;
        }
        assert_eq!(total, 800_000);
        assert!(q.debug_is_valid());
    }
}
