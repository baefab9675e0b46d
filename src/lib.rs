#![cfg(target_pointer_width = "64")]

pub mod atomic;
pub mod descriptor;
pub mod driver;
pub mod ebr;
pub mod queue;
pub(crate) mod rdcss;
mod sequence_number;
mod thread_local;

pub use atomic::Atomic;
pub use descriptor::{cas2, mwcas};
pub use queue::{MsQueue, MwQueue};
