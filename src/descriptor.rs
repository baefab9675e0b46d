//! The MwCAS descriptor pool and 3-phase install/decide/finalize engine
//! (spec.md §4.3).
//!
//! Each thread owns one reusable descriptor slot (bounded to
//! [`MAX_ENTRIES`] words per call). A descriptor's status word carries both
//! its `Undecided` / `Succeeded` / `Failed` state and a sequence number, so a
//! helper that races ahead of the owning thread can detect a stale
//! descriptor and bail out instead of corrupting a newer operation.

pub use crate::atomic::Atomic;
use crate::{
    atomic::{AtomicAddress, AtomicBits, Bits, Word},
    rdcss::RDCSS_DESCRIPTOR,
    sequence_number::SeqNumber,
    thread_local::ThreadLocal,
};
use arrayvec::ArrayVec;
use crossbeam_utils::Backoff;
use once_cell::sync::Lazy;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

pub(crate) static MWCAS: Lazy<Mwcas> = Lazy::new(Mwcas::new);

const MAX_ENTRIES: usize = 8;

/// Atomically compare-and-swap two words (spec.md §4.3, arity-2 case).
#[allow(clippy::missing_safety_doc)]
pub unsafe fn cas2<T0, T1>(
    addr0: &Atomic<T0>,
    addr1: &Atomic<T1>,
    exp0: T0,
    exp1: T1,
    new0: T0,
    new1: T1,
) -> bool
where
    T0: Word,
    T1: Word,
{
    let entry0 = Entry {
        addr: addr0.as_atomic_bits(),
        exp: exp0.into(),
        new: new0.into(),
    };
    let entry1 = Entry {
        addr: addr1.as_atomic_bits(),
        exp: exp1.into(),
        new: new1.into(),
    };
    assert!(
        !std::ptr::eq(entry0.addr, entry1.addr),
        "cas2 requires distinct addresses"
    );
    let mut entries = [entry0, entry1];
    let descriptor_ptr = MWCAS.make_descriptor(&mut entries);
    MWCAS.help(descriptor_ptr, false)
}

/// Atomically compare-and-swap up to [`MAX_ENTRIES`] words (spec.md §4.3,
/// general arity-K case). Entries need not be pre-sorted by address — the
/// engine sorts them internally to establish a total lock order across
/// concurrent calls.
#[allow(clippy::missing_safety_doc)]
pub unsafe fn mwcas<T>(addresses: &[&Atomic<T>], expected: &[T], new: &[T]) -> bool
where
    T: Word,
{
    assert_eq!(addresses.len(), expected.len());
    assert_eq!(expected.len(), new.len());
    assert!(
        addresses.len() <= MAX_ENTRIES,
        "mwcas supports at most {} entries",
        MAX_ENTRIES
    );
    for i in 0..addresses.len() {
        for j in (i + 1)..addresses.len() {
            assert!(
                !std::ptr::eq(addresses[i].as_atomic_bits(), addresses[j].as_atomic_bits()),
                "mwcas requires pairwise distinct addresses, got a duplicate at indices {} and {}",
                i,
                j
            );
        }
    }
    let mut entries: ArrayVec<[Entry<'_>; MAX_ENTRIES]> = ArrayVec::new();
    for ((addr, exp), new) in addresses.iter().zip(expected).zip(new) {
        entries.push(Entry {
            addr: addr.as_atomic_bits(),
            exp: (*exp).into(),
            new: (*new).into(),
        });
    }
    let descriptor_ptr = MWCAS.make_descriptor(&mut entries);
    MWCAS.help(descriptor_ptr, false)
}

pub(crate) struct Mwcas {
    map: ThreadLocal<ThreadMwcasDescriptor>,
}

impl Mwcas {
    /// Mark bit identifying a [`Bits`] word as an MwCAS descriptor
    /// reference, distinct from a plain value (mark 0) or an in-flight
    /// RDCSS descriptor reference (mark 1).
    pub const MARK: usize = 2;

    fn new() -> Self {
        Self {
            map: ThreadLocal::new(),
        }
    }

    fn make_descriptor(&'static self, entries: &mut [Entry]) -> Bits {
        let (tid, per_thread_descriptor) = self.map.get_or_insert_with(ThreadMwcasDescriptor::new);

        // invalidate the previous descriptor before mutating its fields
        per_thread_descriptor.inc_seq();

        fence(Ordering::Release);

        per_thread_descriptor.store_entries(entries);
        // make descriptor fully initialized
        per_thread_descriptor.inc_seq();
        let current_seq_num =
            MwcasStatus::from_bits(per_thread_descriptor.status.load(Ordering::SeqCst)).seq_number();

        Bits::new_descriptor_ptr(tid, current_seq_num).with_mark(Self::MARK)
    }

    fn try_snapshot(&'static self, descriptor_ptr: Bits) -> Result<ThreadMwcasSnapshot, ()> {
        let thread_descriptor = self
            .map
            .get_for_thread(descriptor_ptr.tid())
            .ok_or(())?;
        thread_descriptor.try_snapshot(descriptor_ptr.seq())
    }

    /// Drive a descriptor through install, decide and finalize. `help_other`
    /// is `true` when called by a thread other than the descriptor's owner —
    /// in that case entry 0 is assumed already installed by the owner
    /// (spec.md §4.3 "helping starts at the entry the helper observed").
    pub fn help(&'static self, descriptor_ptr: Bits, help_other: bool) -> bool {
        let descriptor_seq = descriptor_ptr.seq();

        let descriptor_snapshot = match self.try_snapshot(descriptor_ptr) {
            Ok(snapshot) => snapshot,
            Err(()) => {
                assert!(help_other, "owner must always be able to snapshot its own descriptor");
                return false;
            }
        };

        // Phase 1 (install): CAS each entry to point at the descriptor, only
        // while status is still Undecided.
        let descriptor_current_status = match descriptor_snapshot.try_read_status(descriptor_ptr) {
            Ok(status) => status,
            Err(()) => {
                assert!(help_other);
                return false;
            }
        };

        if descriptor_current_status.status() == MwcasStatus::UNDECIDED {
            let mut new_status = MwcasStatus::succeeded(descriptor_seq);
            let start = if help_other { 1 } else { 0 };
            let backoff = Backoff::new();
            'entry_loop: for entry in &descriptor_snapshot.entries[start..] {
                'install_loop: loop {
                    let entry_addr = entry.addr;
                    let entry_exp = entry.exp;
                    // Phase 2 (decide) happens implicitly inside rdcss: the
                    // swap only takes effect if our own status is still
                    // Undecided at the moment a helper observes it.
                    let swapped = RDCSS_DESCRIPTOR.rdcss(
                        descriptor_snapshot.status,
                        entry_addr,
                        descriptor_current_status.to_bits(),
                        entry_exp,
                        descriptor_ptr,
                    );

                    if swapped.mark() == Mwcas::MARK && swapped != descriptor_ptr {
                        if backoff.is_completed() {
                            self.help(swapped, true);
                        } else {
                            backoff.spin();
                        }
                        continue 'install_loop;
                    } else if swapped != entry_exp {
                        new_status = new_status.set_failed();
                        break 'entry_loop;
                    } else {
                        break 'install_loop;
                    }
                }
            }
            descriptor_snapshot.cas_status(descriptor_current_status, new_status);
        }

        // Phase 3 (finalize): sweep every entry to its decided value,
        // releasing the descriptor reference wherever a reader (or helper)
        // installed it.
        let descriptor_current_status = match descriptor_snapshot.try_read_status(descriptor_ptr) {
            Ok(status) => status,
            Err(()) => {
                assert!(help_other);
                return false;
            }
        };

        let succeeded = descriptor_current_status.status() == MwcasStatus::SUCCEEDED;
        for entry in &descriptor_snapshot.entries {
            let new = if succeeded { entry.new } else { entry.exp };
            let _ = entry.addr.compare_exchange(descriptor_ptr, new);
        }
        succeeded
    }
}

struct ThreadMwcasDescriptor {
    entries: [AtomicEntry; MAX_ENTRIES],
    num_entries: AtomicUsize,
    // Packed status+seq word, stored as a plain `Bits` so it can be handed
    // straight to `RDCSS_DESCRIPTOR.rdcss` as a status location — it shares
    // the `AtomicBits` machinery but not its tag-bit convention (the low
    // bits here are `MwcasStatus::NUM_STATUS_BITS` of status, not a mark).
    status: AtomicBits,
}

impl ThreadMwcasDescriptor {
    fn new() -> Self {
        Self {
            status: AtomicBits::new(MwcasStatus::undecided(SeqNumber::from_usize(0)).to_bits()),
            num_entries: AtomicUsize::new(0),
            entries: [
                AtomicEntry::empty(),
                AtomicEntry::empty(),
                AtomicEntry::empty(),
                AtomicEntry::empty(),
                AtomicEntry::empty(),
                AtomicEntry::empty(),
                AtomicEntry::empty(),
                AtomicEntry::empty(),
            ],
        }
    }

    /// Only the owning thread is allowed to call this — it mutates fields a
    /// helper may concurrently be reading via `try_snapshot`.
    fn inc_seq(&self) {
        let seq_num = MwcasStatus::from_bits(self.status.load(Ordering::Relaxed))
            .seq_number()
            .inc();
        self.status
            .store(MwcasStatus::undecided(seq_num).to_bits(), Ordering::SeqCst)
    }

    fn try_snapshot(&self, seq_num: SeqNumber) -> Result<ThreadMwcasSnapshot<'_>, ()> {
        let current_seq_num =
            MwcasStatus::from_bits(self.status.load(Ordering::SeqCst)).seq_number();
        if current_seq_num != seq_num {
            return Err(());
        }
        let num_entries = self.num_entries.load(Ordering::Relaxed);
        // arity 1 is legal (spec.md §8: "MwCAS with n == 1 is equivalent to a
        // single CAS"); the install/decide/finalize path degenerates cleanly
        // since a helper only ever discovers a descriptor via entry 0, which
        // by construction is already installed by the time it's observed.
        assert!(num_entries >= 1);
        let entries = self.entries[0..num_entries]
            .iter()
            .map(|atomic_entry| atomic_entry.load())
            .collect();

        fence(Ordering::Acquire);
        if seq_num == MwcasStatus::from_bits(self.status.load(Ordering::SeqCst)).seq_number() {
            Ok(ThreadMwcasSnapshot {
                entries,
                status: &self.status,
            })
        } else {
            Err(())
        }
    }

    fn store_entries(&self, entries: &mut [Entry<'_>]) {
        entries.sort_by_key(|e| e.addr as *const AtomicBits);
        for (atomic_entry, entry) in self.entries.iter().zip(&*entries) {
            atomic_entry.store(entry);
        }
        self.num_entries.store(entries.len(), Ordering::Relaxed);
    }
}

struct ThreadMwcasSnapshot<'a> {
    entries: ArrayVec<[Entry<'a>; MAX_ENTRIES]>,
    status: &'a AtomicBits,
}

impl ThreadMwcasSnapshot<'_> {
    fn try_read_status(&self, descriptor_ptr: Bits) -> Result<MwcasStatus, ()> {
        let status = MwcasStatus::from_bits(self.status.load(Ordering::SeqCst));
        if status.seq_number() == descriptor_ptr.seq() {
            Ok(status)
        } else {
            Err(())
        }
    }

    fn cas_status(&self, expected_status: MwcasStatus, new_status: MwcasStatus) {
        assert_eq!(expected_status.status(), MwcasStatus::UNDECIDED);
        let current_status = MwcasStatus::from_bits(self.status.load(Ordering::SeqCst));
        if current_status == expected_status {
            let _ = self
                .status
                .compare_exchange(expected_status.to_bits(), new_status.to_bits());
        }
    }
}

/// A descriptor's decision state, packed alongside its sequence number so a
/// stale helper can always detect it raced against a newer call. Stored as a
/// plain [`Bits`] word (`status.rdcss`'s status-location parameter), not as
/// the tid/seq-tagged pointer encoding `Bits` otherwise carries.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct MwcasStatus(usize);

impl MwcasStatus {
    pub const UNDECIDED: usize = 0;
    pub const SUCCEEDED: usize = 1;
    pub const FAILED: usize = 2;
    const NUM_STATUS_BITS: usize = 8;

    fn undecided(seq_num: SeqNumber) -> Self {
        Self((seq_num.as_usize() << Self::NUM_STATUS_BITS) | Self::UNDECIDED)
    }

    fn succeeded(seq_num: SeqNumber) -> Self {
        Self((seq_num.as_usize() << Self::NUM_STATUS_BITS) | Self::SUCCEEDED)
    }

    fn failed(seq_num: SeqNumber) -> Self {
        Self((seq_num.as_usize() << Self::NUM_STATUS_BITS) | Self::FAILED)
    }

    fn set_failed(self) -> MwcasStatus {
        Self::failed(self.seq_number())
    }

    fn seq_number(self) -> SeqNumber {
        SeqNumber::from_usize(self.0 >> Self::NUM_STATUS_BITS)
    }

    fn status(self) -> usize {
        self.0 & ((1 << Self::NUM_STATUS_BITS) - 1)
    }

    fn to_bits(self) -> Bits {
        Bits::from_usize(self.0)
    }

    fn from_bits(bits: Bits) -> Self {
        Self(bits.into_usize())
    }
}

struct AtomicEntry {
    addr: AtomicAddress<AtomicBits>,
    exp: AtomicBits,
    new: AtomicBits,
}

impl AtomicEntry {
    fn empty() -> Self {
        Self {
            addr: AtomicAddress::empty(),
            exp: AtomicBits::empty(),
            new: AtomicBits::empty(),
        }
    }

    fn load<'a>(&self) -> Entry<'a> {
        let addr = unsafe { self.addr.load(Ordering::Relaxed) };
        let exp = self.exp.load(Ordering::Relaxed);
        let new = self.new.load(Ordering::Relaxed);
        Entry { addr, exp, new }
    }

    fn store(&self, e: &Entry) {
        self.addr.store(e.addr, Ordering::Relaxed);
        self.new.store(e.new, Ordering::Relaxed);
        self.exp.store(e.exp, Ordering::Relaxed);
    }
}

pub(crate) struct Entry<'a> {
    addr: &'a AtomicBits,
    exp: Bits,
    new: Bits,
}
