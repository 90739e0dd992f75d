//! 1-D dispatch grid sizing.

use crate::error::{Result, RuntimeError};

/// Shape of a single 1-D kernel dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    /// Number of work-items (one per element).
    pub threads: u64,

    /// Work-items per thread group.
    pub threads_per_group: u32,

    /// Number of thread groups launched.
    pub groups: u32,
}

impl DispatchGrid {
    /// Size a grid of exactly `length` work-items.
    ///
    /// The thread-group size is the pipeline maximum, clamped down to
    /// `length` so a small problem never launches an oversized group.
    /// Returns `Ok(None)` for `length == 0`: there is nothing to dispatch.
    ///
    /// # Errors
    /// Returns [`RuntimeError::DispatchTooLarge`] if the group count exceeds
    /// `max_groups`.
    pub fn for_length(
        length: usize,
        max_threads_per_group: u32,
        max_groups: u32,
    ) -> Result<Option<Self>> {
        if length == 0 {
            return Ok(None);
        }

        let threads = length as u64;
        let threads_per_group = u64::from(max_threads_per_group.max(1)).min(threads);
        let groups = threads.div_ceil(threads_per_group);

        if groups > u64::from(max_groups) {
            return Err(RuntimeError::DispatchTooLarge {
                groups,
                limit: max_groups,
            });
        }

        Ok(Some(Self {
            threads,
            threads_per_group: threads_per_group as u32,
            groups: groups as u32,
        }))
    }

    /// Threads launched in total, including the idle tail of the last group.
    pub fn launched_threads(&self) -> u64 {
        u64::from(self.groups) * u64::from(self.threads_per_group)
    }
}
