//! A semaphore for coordinating sequential access to a resource.

use snafu::Snafu;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Errors returned by a [`SlidingWindowSemaphore`].
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum SemaphoreError {
    /// The semaphore is exhausted and the caller asked not to block.
    #[snafu(display("cannot acquire tag {}", tag))]
    NoResourcesAvailable { tag: String },

    /// The tag has never been acquired.
    #[snafu(display("attempted to release unknown tag {}", tag))]
    UnknownTag { tag: String },

    /// The sequence number is not currently held for the tag.
    #[snafu(display(
        "attempted to release unknown sequence number {} for tag {}",
        sequence_number,
        tag
    ))]
    UnknownSequenceNumber { tag: String, sequence_number: u64 },

    /// The sequence number has already been released and is waiting on a lower one.
    #[snafu(display(
        "sequence number {} for tag {} is already pending release",
        sequence_number,
        tag
    ))]
    DuplicateRelease { tag: String, sequence_number: u64 },
}

/// Sequence numbers handed out for one tag.
#[derive(Debug, Default)]
struct Window {
    /// The sequence number the next acquire will get.
    next: u64,
    /// The lowest sequence number which has not been released.
    lowest: u64,
    /// Sequence numbers above `lowest` which have been released.
    pending: BTreeSet<u64>,
}

#[derive(Debug)]
struct State<T> {
    count: usize,
    windows: HashMap<T, Window>,
}

/// A semaphore used to coordinate sequential resource access.
///
/// Like a bounded semaphore, it is created with a count, each [`acquire`](Self::acquire)
/// decrements the count, and acquiring when the count is zero either blocks until the count
/// increases or fails with [`SemaphoreError::NoResourcesAvailable`].
///
/// The difference is that this semaphore limits access to a resource which must be accessed
/// sequentially. Each acquire is made for a tag, and returns the next sequence number for that tag
/// (starting from 0). Releasing a sequence number only returns capacity to the semaphore once all
/// lower sequence numbers for the same tag have been released as well. For example, a download
/// writing parts 0 through 19 of a file to a non-seekable stream can use a semaphore with count 10
/// to ensure it never buffers more than 10 parts beyond the last part written, no matter which
/// order the parts arrive in.
#[derive(Debug)]
pub struct SlidingWindowSemaphore<T = String> {
    state: Mutex<State<T>>,
    condition: Condvar,
}

impl<T: Clone + Debug + Eq + Hash> SlidingWindowSemaphore<T> {
    pub fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(State {
                count,
                windows: HashMap::new(),
            }),
            condition: Condvar::new(),
        }
    }

    /// The number of resources currently available.
    pub fn current_count(&self) -> usize {
        self.lock().count
    }

    /// Acquire a resource for `tag`, returning its sequence number.
    ///
    /// If no resources are available, this blocks until one is released or, if `blocking` is
    /// false, fails immediately.
    pub fn acquire(&self, tag: T, blocking: bool) -> Result<u64, SemaphoreError> {
        tracing::debug!(?tag, "acquiring");
        let mut state = self.lock();
        if state.count == 0 {
            if !blocking {
                return Err(SemaphoreError::NoResourcesAvailable {
                    tag: format!("{tag:?}"),
                });
            }
            state = self
                .condition
                .wait_while(state, |state| state.count == 0)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.count -= 1;
        let window = state.windows.entry(tag).or_default();
        let sequence_number = window.next;
        window.next += 1;
        Ok(sequence_number)
    }

    /// Release the resource acquired for `tag` with `sequence_number`.
    ///
    /// If this is the lowest outstanding sequence number for the tag, its resource becomes
    /// available again, along with those of any consecutive higher sequence numbers released
    /// earlier. Otherwise the release is recorded and takes effect once the lower sequence numbers
    /// are released.
    pub fn release(&self, tag: &T, sequence_number: u64) -> Result<(), SemaphoreError> {
        tracing::debug!(?tag, sequence_number, "releasing");
        let mut guard = self.lock();
        let state = &mut *guard;
        let window = state
            .windows
            .get_mut(tag)
            .ok_or_else(|| SemaphoreError::UnknownTag {
                tag: format!("{tag:?}"),
            })?;

        if sequence_number == window.lowest {
            let mut freed = 1;
            window.lowest += 1;
            while window.pending.first() == Some(&window.lowest) {
                window.pending.pop_first();
                window.lowest += 1;
                freed += 1;
            }
            state.count += freed;
            for _ in 0..freed {
                self.condition.notify_one();
            }
            Ok(())
        } else if window.lowest < sequence_number && sequence_number < window.next {
            // Still waiting on a lower sequence number, so just remember this one.
            if window.pending.insert(sequence_number) {
                Ok(())
            } else {
                Err(SemaphoreError::DuplicateRelease {
                    tag: format!("{tag:?}"),
                    sequence_number,
                })
            }
        } else {
            Err(SemaphoreError::UnknownSequenceNumber {
                tag: format!("{tag:?}"),
                sequence_number,
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
