//! FIFO whose enqueue folds the tail pointer and the old tail's `next` link
//! into a single MwCAS (spec.md §4.6) — the comparison point for the
//! single-word-CAS queue in `msqueue`.

use crate::{atomic::Atomic, descriptor, ebr};
use crossbeam_utils::Backoff;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

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

pub struct MwQueue<T> {
    front: Atomic<*mut Node<T>>,
    back: Atomic<*mut Node<T>>,
}

impl<T> MwQueue<T> {
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
            // `Atomic::load` is the protected read of spec.md §4.4: it
            // helps any in-flight descriptor on `back` to completion first.
            let t = self.back.load();
            let t_next = unsafe { &(*t).next };
            let addrs: [&Atomic<*mut Node<T>>; 2] = [&self.back, t_next];
            let expected = [t, ptr::null_mut()];
            let new = [n, n];
            let succeeded = unsafe { descriptor::mwcas(&addrs, &expected, &new) };
            if succeeded {
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
            let elem = unsafe { ptr::read((*new_f).elem.get()) };
            // front only ever mutates on the pop side: a plain single-word
            // CAS suffices, no MwCAS needed here.
            if self.front.compare_exchange(f, new_f).is_ok() {
                ebr::retire(move || unsafe {
                    drop(Box::from_raw(f));
                });
                return Some(unsafe { elem.assume_init() });
            }
            std::mem::forget(elem);
            backoff.spin();
        }
    }

    pub fn is_empty(&self) -> bool {
        let _guard = ebr::pin();
        let f = self.front.load();
        unsafe { (*f).next.load().is_null() }
    }

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

impl<T> Default for MwQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Send> Send for MwQueue<T> {}
unsafe impl<T: Send> Sync for MwQueue<T> {}

impl<T> Drop for MwQueue<T> {
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

    #[test]
    fn push_pop_preserves_sequence() {
        let q = MwQueue::new();
        for i in 0..100_000u64 {
            q.push(i);
        }
        for i in 0..100_000u64 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
        assert!(q.debug_is_valid());
    }

    #[test]
    fn concurrent_push_single_consumer_pop() {
        use std::sync::Arc;
        let q = Arc::new(MwQueue::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let q = q.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..1_000u64 {
                    q.push(t * 1_000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut count = 0;
        while q.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 4_000);
    }
}
