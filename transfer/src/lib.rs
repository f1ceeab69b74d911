//! Utilities for transferring objects to and from S3.
//!
//! These are the building blocks used by the transfer manager: computing byte ranges for
//! multipart requests, wiring subscriber callbacks to transfers, reading files in chunks while
//! reporting progress, and bounding how far ahead of a sequential consumer the workers may get.

pub mod callbacks;
pub mod io;
pub mod os;
pub mod range;
pub mod semaphore;
pub mod task;

pub use callbacks::{
    get_callbacks, invoke_progress_callbacks, CallArgs, Callback, CallbackType, ProgressCallback,
    Subscriber, TransferFuture, TransferMeta,
};
pub use io::{DeferredOpenFile, ReadFileChunk, StreamReaderProgress};
pub use os::{OpenMode, OsUtils};
pub use range::{calculate_range, calculate_range_parameter, ByteRange};
pub use semaphore::{SemaphoreError, SlidingWindowSemaphore};
pub use task::{random_file_extension, unique_id, FunctionContainer};
