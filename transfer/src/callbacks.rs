//! Subscribers and the callbacks derived from them.
//!
//! A transfer is requested with a set of [`CallArgs`], which includes any number of
//! [`Subscriber`]s interested in the lifecycle of the transfer. When the transfer is scheduled,
//! each subscriber hook is bound to the [`TransferFuture`] it concerns, producing a [`Callback`]
//! which can be handed to the code doing the actual work without exposing the subscriber itself.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, OnceLock};
use strum::{Display, EnumString};

/// The lifecycle events a [`Subscriber`] can be notified of.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CallbackType {
    /// The transfer has been submitted and is waiting to be worked on.
    Queued,
    /// Some bytes of the transfer have been sent or received.
    Progress,
    /// The transfer has finished, successfully or not.
    Done,
}

/// An observer of a transfer.
///
/// All hooks do nothing by default. Implementors which only care about some of the events should
/// also override [`subscribes_to`](Self::subscribes_to), so that no callbacks are created for the
/// events they ignore.
pub trait Subscriber: Send + Sync {
    /// Called when the transfer is queued.
    fn on_queued(&self, _future: &TransferFuture) {}

    /// Called whenever bytes are transferred.
    ///
    /// `bytes_transferred` may be negative if a request was retried and progress had to be
    /// rewound.
    fn on_progress(&self, _future: &TransferFuture, _bytes_transferred: i64) {}

    /// Called when the transfer is done.
    fn on_done(&self, _future: &TransferFuture) {}

    /// Whether this subscriber has a hook for events of type `ty`.
    fn subscribes_to(&self, _ty: CallbackType) -> bool {
        true
    }
}

/// The arguments a transfer was requested with.
#[derive(Clone, Default)]
pub struct CallArgs {
    pub bucket: String,
    pub key: String,
    pub extra_args: HashMap<String, String>,
    pub subscribers: Vec<Arc<dyn Subscriber>>,
}

impl CallArgs {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// Add an extra request parameter, like `ContentType` or `ACL`.
    pub fn extra_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_args.insert(name.into(), value.into());
        self
    }

    /// Add a subscriber.
    pub fn subscriber(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }
}

impl Debug for CallArgs {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("CallArgs")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("extra_args", &self.extra_args)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Metadata about a transfer.
#[derive(Debug)]
pub struct TransferMeta {
    call_args: CallArgs,
    transfer_id: Option<u64>,
    size: OnceLock<u64>,
}

impl TransferMeta {
    pub fn new(call_args: CallArgs, transfer_id: Option<u64>) -> Self {
        Self {
            call_args,
            transfer_id,
            size: OnceLock::new(),
        }
    }

    /// The arguments the transfer was requested with.
    pub fn call_args(&self) -> &CallArgs {
        &self.call_args
    }

    /// The unique ID assigned to the transfer, if any.
    pub fn transfer_id(&self) -> Option<u64> {
        self.transfer_id
    }

    /// The total size of the transfer in bytes, if it is known yet.
    pub fn size(&self) -> Option<u64> {
        self.size.get().copied()
    }

    /// Record the total size of the transfer.
    ///
    /// The size can only be provided once; later calls are ignored.
    pub fn provide_transfer_size(&self, size: u64) {
        if self.size.set(size).is_err() {
            tracing::debug!(transfer_id = ?self.transfer_id, size, "transfer size already provided");
        }
    }
}

/// A handle to a pending transfer.
#[derive(Debug)]
pub struct TransferFuture {
    meta: TransferMeta,
}

impl TransferFuture {
    pub fn new(meta: TransferMeta) -> Self {
        Self { meta }
    }

    pub fn meta(&self) -> &TransferMeta {
        &self.meta
    }
}

/// A callback invoked with a number of bytes transferred.
pub type ProgressCallback = Arc<dyn Fn(i64) + Send + Sync>;

/// A subscriber hook bound to the future it concerns.
#[derive(Clone)]
pub struct Callback {
    ty: CallbackType,
    subscriber: Arc<dyn Subscriber>,
    future: Arc<TransferFuture>,
}

impl Callback {
    /// The event this callback handles.
    pub fn ty(&self) -> CallbackType {
        self.ty
    }

    /// Invoke the callback.
    ///
    /// `bytes_transferred` is only meaningful for [`CallbackType::Progress`] callbacks and is
    /// ignored by the others.
    pub fn call(&self, bytes_transferred: i64) {
        match self.ty {
            CallbackType::Queued => self.subscriber.on_queued(&self.future),
            CallbackType::Progress => self.subscriber.on_progress(&self.future, bytes_transferred),
            CallbackType::Done => self.subscriber.on_done(&self.future),
        }
    }

    /// Convert this callback into a plain [`ProgressCallback`].
    pub fn into_progress(self) -> ProgressCallback {
        Arc::new(move |bytes_transferred| self.call(bytes_transferred))
    }
}

impl Debug for Callback {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Callback")
            .field("ty", &self.ty)
            .field("future", &self.future)
            .finish()
    }
}

/// Retrieve the callbacks of type `ty` from the subscribers of a transfer.
///
/// Each returned callback is already bound to `future`. Subscribers which do not subscribe to `ty`
/// contribute nothing.
pub fn get_callbacks(future: &Arc<TransferFuture>, ty: CallbackType) -> Vec<Callback> {
    future
        .meta()
        .call_args()
        .subscribers
        .iter()
        .filter(|subscriber| subscriber.subscribes_to(ty))
        .map(|subscriber| Callback {
            ty,
            subscriber: subscriber.clone(),
            future: future.clone(),
        })
        .collect()
}

/// Call all progress callbacks with the number of bytes transferred.
///
/// Nothing is called if no bytes were transferred, since no progress was made. The amount may be
/// negative when a request is retried.
pub fn invoke_progress_callbacks(callbacks: &[ProgressCallback], bytes_transferred: i64) {
    if bytes_transferred != 0 {
        for callback in callbacks {
            callback(bytes_transferred);
        }
    }
}

/// A request body whose progress callbacks can be switched on and off.
pub trait ToggleCallbacks {
    fn enable_callback(&mut self);
    fn disable_callback(&mut self);
}

/// Operations whose request bodies report upload progress.
const UPLOAD_OPERATIONS: [&str; 2] = ["PutObject", "UploadPart"];

/// Stop `body` reporting progress, if `operation_name` is an upload.
///
/// Used before a request is signed, when the body is read in full to compute a checksum.
pub fn disable_upload_callbacks(
    operation_name: &str,
    body: Option<&mut (dyn ToggleCallbacks + '_)>,
) {
    if UPLOAD_OPERATIONS.contains(&operation_name) {
        if let Some(body) = body {
            body.disable_callback();
        }
    }
}

/// Resume progress reporting for `body`, if `operation_name` is an upload.
pub fn enable_upload_callbacks(operation_name: &str, body: Option<&mut (dyn ToggleCallbacks + '_)>) {
    if UPLOAD_OPERATIONS.contains(&operation_name) {
        if let Some(body) = body {
            body.enable_callback();
        }
    }
}
