use crate::atomic::{AtomicAddress, AtomicBits, Bits};
use crate::sequence_number::SeqNumberGenerator;
use crate::thread_local::ThreadLocal;
use once_cell::sync::Lazy;
use std::sync::atomic::Ordering;

/// Mark bit identifying a [`Bits`] word as an in-flight RDCSS descriptor
/// reference, as opposed to a plain value (mark 0) or an MwCAS descriptor
/// reference (mark [`crate::descriptor::Mwcas::MARK`]).
const DESCRIPTOR_MARKER: usize = 1;

pub(crate) static RDCSS_DESCRIPTOR: Lazy<RdcssDescriptor> = Lazy::new(RdcssDescriptor::new);

/// A restricted double-compare single-swap: the install phase of
/// [`crate::descriptor::Mwcas`] uses this to atomically install an MwCAS
/// descriptor reference into one entry's address while simultaneously
/// checking that the MwCAS descriptor's own status word hasn't already been
/// decided by a racing helper.
struct PerThreadRdcssDescriptor {
    status_location: AtomicAddress<AtomicBits>,
    data_location: AtomicAddress<AtomicBits>,
    expected_status: AtomicBits,
    expected_data: AtomicBits,
    new_value: AtomicBits,
    seq_number: SeqNumberGenerator,
}

impl PerThreadRdcssDescriptor {
    fn new() -> Self {
        Self {
            status_location: AtomicAddress::empty(),
            data_location: AtomicAddress::empty(),
            expected_status: AtomicBits::empty(),
            expected_data: AtomicBits::empty(),
            new_value: AtomicBits::empty(),
            seq_number: SeqNumberGenerator::new(),
        }
    }

    fn read_fields(&self) -> PerThreadDescriptorFields<'_> {
        unsafe {
            PerThreadDescriptorFields {
                status_location: self.status_location.load(Ordering::SeqCst),
                data_location: self.data_location.load(Ordering::SeqCst),
                expected_status: self.expected_status.load(Ordering::SeqCst),
                expected_data: self.expected_data.load(Ordering::SeqCst),
                new_value: self.new_value.load(Ordering::SeqCst),
            }
        }
    }
}

struct PerThreadDescriptorFields<'g> {
    status_location: &'g AtomicBits,
    data_location: &'g AtomicBits,
    expected_status: Bits,
    expected_data: Bits,
    new_value: Bits,
}

pub struct RdcssDescriptor {
    per_thread: ThreadLocal<PerThreadRdcssDescriptor>,
}

impl RdcssDescriptor {
    fn new() -> Self {
        Self {
            per_thread: ThreadLocal::new(),
        }
    }

    fn new_ptr(
        &self,
        status_location: &AtomicBits,
        data_location: &AtomicBits,
        expected_status: Bits,
        expected_data: Bits,
        new_value: Bits,
    ) -> Bits {
        let (tid, desc) = self
            .per_thread
            .get_or_insert_with(PerThreadRdcssDescriptor::new);
        // invalidate any snapshot a concurrent helper might be mid-read of
        desc.seq_number.inc(Ordering::SeqCst);

        desc.status_location.store(status_location, Ordering::SeqCst);
        desc.data_location.store(data_location, Ordering::SeqCst);
        desc.expected_status.store(expected_status, Ordering::SeqCst);
        desc.expected_data.store(expected_data, Ordering::SeqCst);
        desc.new_value.store(new_value, Ordering::SeqCst);

        let seq = desc.seq_number.inc(Ordering::SeqCst);
        Bits::new_descriptor_ptr(tid, seq).with_mark(DESCRIPTOR_MARKER)
    }

    /// Swap `data_location` from `expected_data` to `new_value`, but only if
    /// `status_location` still equals `expected_status` at the moment the
    /// swap is helped to completion. Returns the value observed at
    /// `data_location` at the moment of the attempt (`expected_data` on
    /// success).
    pub fn rdcss(
        &self,
        status_location: &AtomicBits,
        data_location: &AtomicBits,
        expected_status: Bits,
        expected_data: Bits,
        new_value: Bits,
    ) -> Bits {
        let des_ptr = self.new_ptr(
            status_location,
            data_location,
            expected_status,
            expected_data,
            new_value,
        );
        loop {
            match data_location.compare_exchange(expected_data, des_ptr) {
                Ok(_) => {
                    self.help(des_ptr);
                    return expected_data;
                }
                Err(curr) => {
                    if curr.mark() == DESCRIPTOR_MARKER {
                        self.help(curr);
                        continue;
                    }
                    return curr;
                }
            }
        }
    }

    /// Read `data_location`, helping any in-flight RDCSS descriptor found
    /// there to completion first.
    pub fn read(&self, data_location: &AtomicBits) -> Bits {
        loop {
            let curr = data_location.load(Ordering::Acquire);
            if curr.mark() == DESCRIPTOR_MARKER {
                self.help(curr);
                continue;
            }
            return curr;
        }
    }

    fn help(&self, des: Bits) {
        if let Ok(fields) = self.read_fields(des) {
            let status = fields.status_location.load(Ordering::SeqCst);
            let target = if status == fields.expected_status {
                fields.new_value
            } else {
                fields.expected_data
            };
            let _ = fields.data_location.compare_exchange(des, target);
        }
    }

    fn read_fields(&self, des: Bits) -> Result<PerThreadDescriptorFields<'_>, ()> {
        let tid = des.tid();
        let seq = des.seq();
        let thread_desc = self
            .per_thread
            .get_for_thread(tid)
            .expect("missing thread RDCSS descriptor");
        if seq != thread_desc.seq_number.current(Ordering::SeqCst) {
            return Err(());
        }
        let fields = thread_desc.read_fields();
        if seq != thread_desc.seq_number.current(Ordering::SeqCst) {
            Err(())
        } else {
            Ok(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdcss_swaps_when_status_matches() {
        let status = AtomicBits::new(Bits::from_usize(0));
        let data = AtomicBits::new(Bits::from_usize(40));
        let des = RdcssDescriptor::new();

        let exp_status = Bits::from_usize(0);
        let exp_data = Bits::from_usize(40);
        let new_data = Bits::from_usize(80);

        let observed = des.rdcss(&status, &data, exp_status, exp_data, new_data);
        assert_eq!(observed, exp_data);
        assert_eq!(des.read(&data), new_data);
    }

    #[test]
    fn rdcss_reverts_when_status_changed_first() {
        let status = AtomicBits::new(Bits::from_usize(0));
        let data = AtomicBits::new(Bits::from_usize(40));
        let des = RdcssDescriptor::new();

        // simulate another helper having already decided the status word
        status.store(Bits::from_usize(99), Ordering::SeqCst);

        let exp_status = Bits::from_usize(0);
        let exp_data = Bits::from_usize(40);
        let new_data = Bits::from_usize(80);

        let _ = des.rdcss(&status, &data, exp_status, exp_data, new_data);
        assert_eq!(des.read(&data), exp_data);
    }

    #[test]
    fn rdcss_fails_when_data_already_changed() {
        let status = AtomicBits::new(Bits::from_usize(0));
        let data = AtomicBits::new(Bits::from_usize(41));
        let des = RdcssDescriptor::new();

        let exp_status = Bits::from_usize(0);
        let exp_data = Bits::from_usize(40);
        let new_data = Bits::from_usize(80);

        let observed = des.rdcss(&status, &data, exp_status, exp_data, new_data);
        assert_ne!(observed, exp_data);
        assert_eq!(observed, Bits::from_usize(41));
    }
}
