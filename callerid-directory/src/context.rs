//! The host side of a directory request.
//!
//! A request is a run of entry operations closed by [`DirectoryContext::complete_request`].
//! The host validates and commits the whole run at completion; a rejected
//! run leaves the committed entries as they were.

use crate::error::DirectoryRejection;

pub trait DirectoryContext {
    /// True when the host already holds entries and expects only a delta.
    fn is_incremental(&self) -> bool;

    /// Numbers must arrive in strictly increasing order within a request.
    fn add_blocking_entry(&mut self, number: u64);

    fn remove_blocking_entry(&mut self, number: u64);

    /// Numbers must arrive in strictly increasing order within a request.
    fn add_identification_entry(&mut self, number: u64, label: &str);

    fn remove_identification_entry(&mut self, number: u64);

    fn remove_all_blocking_entries(&mut self);

    fn remove_all_identification_entries(&mut self);

    /// Validate and commit everything submitted since the last completion.
    fn complete_request(&mut self) -> Result<(), DirectoryRejection>;
}

impl<C: DirectoryContext + ?Sized> DirectoryContext for Box<C> {
    fn is_incremental(&self) -> bool {
        (**self).is_incremental()
    }

    fn add_blocking_entry(&mut self, number: u64) {
        (**self).add_blocking_entry(number)
    }

    fn remove_blocking_entry(&mut self, number: u64) {
        (**self).remove_blocking_entry(number)
    }

    fn add_identification_entry(&mut self, number: u64, label: &str) {
        (**self).add_identification_entry(number, label)
    }

    fn remove_identification_entry(&mut self, number: u64) {
        (**self).remove_identification_entry(number)
    }

    fn remove_all_blocking_entries(&mut self) {
        (**self).remove_all_blocking_entries()
    }

    fn remove_all_identification_entries(&mut self) {
        (**self).remove_all_identification_entries()
    }

    fn complete_request(&mut self) -> Result<(), DirectoryRejection> {
        (**self).complete_request()
    }
}
