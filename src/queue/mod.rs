//! Lock-free FIFO queues (spec.md §4.5, §4.6): a Michael–Scott queue built
//! on plain single-word CAS, and a variant whose enqueue folds the tail
//! pointer and old-tail's `next` link into one MwCAS.

pub mod msqueue;
pub mod mwqueue;

pub use msqueue::MsQueue;
pub use mwqueue::MwQueue;
