//! Completion Callback Adapter
//!
//! Asynchronous host operations report their result by calling a
//! `CompletionCallback`: a raw function pointer paired with an opaque
//! context pointer. The host calls it exactly once, later, on the thread its
//! message loop designates.
//!
//! ## Lifecycle
//!
//! ```text
//! Unbound ──(passed into a host call)──▶ Crossed ──(host runs it once)──▶ Invoked
//! ```
//!
//! `CompletionCallback` is neither `Copy` nor `Clone`. Passing it to the host
//! and invoking it both consume the value, so the language side cannot run a
//! callback twice. Once crossed, the adapter never sees it again: there is no
//! queue, retry, cancellation or timeout here.
//!
//! A callback that will never cross (a host call rejected it, or the loop
//! that held it shut down) is released with [`CompletionCallback::abort`],
//! which runs it once with `Aborted` so a waiting receiver resolves.
//!
//! ## Blocking mode
//!
//! [`block_until_complete`] is the sentinel with no function. A host call
//! given the sentinel blocks the calling thread and returns the result code
//! directly instead of calling back.
//!
//! ## One-shot channel
//!
//! [`completion_channel`] pairs a crossable callback with a
//! [`CompletionReceiver`] the language side can await or wait on. The
//! callback is the producer; the host's single invocation sends the code.

use crate::code::Code;
use crate::error::{format_panic_payload, set_runtime_error};
use std::ffi::c_void;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::ptr;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Host calling convention for completion functions
pub type CompletionFn = unsafe extern "C" fn(user_data: *mut c_void, result: i32);

pub const COMPLETION_FLAG_NONE: i32 = 0;
/// The host may finish synchronously and skip the call
pub const COMPLETION_FLAG_OPTIONAL: i32 = 1 << 0;

/// Completion callback exactly as the host declares it.
#[repr(C)]
pub struct CompletionCallback {
    /// None is the blocking sentinel
    pub func: Option<CompletionFn>,
    pub user_data: *mut c_void,
    pub flags: i32,
}

// Safety: the host invokes callbacks on its own loop thread, so the value
// must move between threads. The context pointer is only dereferenced by
// `func`; closure-backed callbacks require `Send` closures.
unsafe impl Send for CompletionCallback {}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.func {
            None => write!(f, "CompletionCallback(block until complete)"),
            Some(func) => f
                .debug_struct("CompletionCallback")
                .field("func", &(func as *const c_void))
                .field("user_data", &self.user_data)
                .field("flags", &self.flags)
                .finish(),
        }
    }
}

/// Bind a function and context into a crossable callback. Nothing runs yet.
pub fn make_callback(func: CompletionFn, context: *mut c_void) -> CompletionCallback {
    CompletionCallback {
        func: Some(func),
        user_data: context,
        flags: COMPLETION_FLAG_NONE,
    }
}

/// The sentinel asking the host to block until the operation finishes.
pub fn block_until_complete() -> CompletionCallback {
    CompletionCallback {
        func: None,
        user_data: ptr::null_mut(),
        flags: COMPLETION_FLAG_NONE,
    }
}

/// Run a callback with `result`, the way the host's run primitive does.
///
/// Calls `func(context, result)` once. The blocking sentinel has no function
/// and is a no-op. Nothing is scheduled or deferred; the call happens on the
/// current thread.
///
/// # Safety
/// `cb.func` must be safe to call with `cb.user_data`. For callbacks built by
/// [`CompletionCallback::from_fn`] this holds as long as the callback has not
/// been invoked through a bitwise copy made on the native side.
pub unsafe fn invoke(cb: CompletionCallback, result: i32) {
    if let Some(func) = cb.func {
        unsafe { func(cb.user_data, result) }
    }
}

struct BoxedCompletion {
    /// For diagnostics only
    name: &'static str,
    call: Box<dyn FnOnce(Code) + Send>,
}

unsafe extern "C" fn run_boxed(user_data: *mut c_void, result: i32) {
    if user_data.is_null() {
        error!("completion trampoline called without a context");
        return;
    }
    // SAFETY: user_data came from Box::into_raw in `from_fn`, and the
    // callback is consumed by its single invocation.
    let boxed = unsafe { Box::from_raw(user_data as *mut BoxedCompletion) };
    let BoxedCompletion { name, call } = *boxed;
    let code = Code::from_i32(result);
    debug!(callback = name, %code, "entering completion callback");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || call(code))) {
        let msg = format_panic_payload(&*payload);
        error!(callback = name, "completion callback panicked: {}", msg);
        set_runtime_error(format!("completion callback `{}` panicked: {}", name, msg));
    }
}

impl CompletionCallback {
    /// Wrap a Rust closure. The closure is boxed into the context pointer and
    /// released when the callback runs, either by the host or through
    /// [`abort`](CompletionCallback::abort).
    pub fn from_fn<F>(name: &'static str, f: F) -> CompletionCallback
    where
        F: FnOnce(Code) + Send + 'static,
    {
        let boxed = Box::new(BoxedCompletion {
            name,
            call: Box::new(f),
        });
        make_callback(run_boxed, Box::into_raw(boxed) as *mut c_void)
    }

    /// Like `from_fn`, but the closure only runs for an ok result. Other
    /// results are logged and dropped.
    pub fn on_success<F>(name: &'static str, f: F) -> CompletionCallback
    where
        F: FnOnce() + Send + 'static,
    {
        CompletionCallback::from_fn(name, move |code| {
            if code.is_ok() {
                f()
            } else {
                warn!(callback = name, %code, "completion callback skipped");
            }
        })
    }

    /// Mark the callback optional: the host may return the result
    /// synchronously and never call it.
    pub fn optional(mut self) -> CompletionCallback {
        self.flags |= COMPLETION_FLAG_OPTIONAL;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.func.is_none()
    }

    pub fn is_optional(&self) -> bool {
        self.flags & COMPLETION_FLAG_OPTIONAL != 0
    }

    /// Method form of [`invoke`].
    ///
    /// # Safety
    /// Same contract as [`invoke`].
    pub unsafe fn invoke(self, result: i32) {
        unsafe { invoke(self, result) }
    }

    /// Release a callback that will never reach the host by running it with
    /// `Aborted`. The sentinel has nothing to release.
    ///
    /// # Safety
    /// Same contract as [`invoke`].
    pub unsafe fn abort(self) {
        if self.is_blocking() {
            return;
        }
        debug!("aborting completion callback");
        unsafe { invoke(self, Code::Aborted.to_i32()) }
    }
}

/// The producing callback was released without sending a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionDropped;

impl fmt::Display for CompletionDropped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completion callback released without a result")
    }
}

impl std::error::Error for CompletionDropped {}

/// Consumer side of a [`completion_channel`].
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: oneshot::Receiver<Code>,
}

impl CompletionReceiver {
    /// Block this thread until the host invokes the paired callback.
    ///
    /// Panics if called from inside an async runtime; `.await` the receiver
    /// there instead.
    pub fn wait(self) -> Result<Code, CompletionDropped> {
        self.rx.blocking_recv().map_err(|_| CompletionDropped)
    }

    /// Non-blocking check: `Ok(None)` while the callback is still pending.
    pub fn try_take(&mut self) -> Result<Option<Code>, CompletionDropped> {
        match self.rx.try_recv() {
            Ok(code) => Ok(Some(code)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(CompletionDropped),
        }
    }
}

impl Future for CompletionReceiver {
    type Output = Result<Code, CompletionDropped>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| CompletionDropped))
    }
}

/// A crossable callback paired with a receiver for its result code.
pub fn completion_channel(name: &'static str) -> (CompletionCallback, CompletionReceiver) {
    let (tx, rx) = oneshot::channel();
    let callback = CompletionCallback::from_fn(name, move |code| {
        // The receiver may already be gone; the result is then unobserved.
        let _ = tx.send(code);
    });
    (callback, CompletionReceiver { rx })
}

// =============================================================================
// Exported shims (C ABI)
// =============================================================================

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_make_completion_callback(
    func: CompletionFn,
    user_data: *mut c_void,
) -> CompletionCallback {
    make_callback(func, user_data)
}

#[unsafe(no_mangle)]
pub extern "C" fn plugbridge_block_until_complete() -> CompletionCallback {
    block_until_complete()
}

/// Run the callback at `cb` with `result`, leaving the blocking sentinel in
/// its place so the same slot cannot fire twice.
///
/// # Safety
/// `cb` must be null or point to a valid callback whose function is safe to
/// call with its context.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugbridge_run_completion_callback(
    cb: *mut CompletionCallback,
    result: i32,
) {
    if cb.is_null() {
        return;
    }
    let taken = unsafe { ptr::replace(cb, block_until_complete()) };
    unsafe { invoke(taken, result) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::PP_OK;
    use crate::error::{clear_runtime_error, take_runtime_error};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    struct Recorded {
        calls: AtomicUsize,
        last: AtomicI32,
    }

    unsafe extern "C" fn record(user_data: *mut c_void, result: i32) {
        let rec = unsafe { &*(user_data as *const Recorded) };
        rec.calls.fetch_add(1, Ordering::SeqCst);
        rec.last.store(result, Ordering::SeqCst);
    }

    fn recorded() -> Recorded {
        Recorded {
            calls: AtomicUsize::new(0),
            last: AtomicI32::new(i32::MIN),
        }
    }

    #[test]
    fn test_make_callback_does_not_invoke() {
        let p = recorded();
        let cb = make_callback(record, &p as *const Recorded as *mut c_void);
        assert!(!cb.is_blocking());
        assert!(!cb.is_optional());
        assert_eq!(cb.user_data, &p as *const Recorded as *mut c_void);
        assert_eq!(p.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invoke_calls_once_with_context_and_code() {
        let p = recorded();
        let cb = make_callback(record, &p as *const Recorded as *mut c_void);
        unsafe { invoke(cb, -4) };
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.last.load(Ordering::SeqCst), -4);
    }

    #[test]
    fn test_block_until_complete_is_sentinel() {
        let cb = block_until_complete();
        assert!(cb.is_blocking());
        assert!(cb.user_data.is_null());
        assert_eq!(cb.flags, COMPLETION_FLAG_NONE);
        // Running the sentinel does nothing
        unsafe { invoke(cb, PP_OK) };
    }

    #[test]
    fn test_optional_flag() {
        let cb = CompletionCallback::from_fn("optional", |_| {}).optional();
        assert!(cb.is_optional());
        unsafe { cb.invoke(PP_OK) };
    }

    #[test]
    fn test_from_fn_delivers_code() {
        let seen = Arc::new(AtomicI32::new(0));
        let seen2 = Arc::clone(&seen);
        let cb = CompletionCallback::from_fn("delivers", move |code| {
            seen2.store(code.to_i32(), Ordering::SeqCst);
        });
        unsafe { cb.invoke(-11) };
        assert_eq!(seen.load(Ordering::SeqCst), -11);
    }

    #[test]
    fn test_on_success_skips_failure() {
        let ran = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&ran);
        let cb = CompletionCallback::on_success("skips", move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        unsafe { cb.invoke(Code::Aborted.to_i32()) };
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        let r = Arc::clone(&ran);
        let cb = CompletionCallback::on_success("runs", move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        unsafe { cb.invoke(PP_OK) };
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_does_not_escape_trampoline() {
        clear_runtime_error();
        let cb = CompletionCallback::from_fn("explodes", |_| panic!("boom"));
        unsafe { cb.invoke(PP_OK) };
        let msg = take_runtime_error().expect("panic should be recorded");
        assert!(msg.contains("explodes"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_channel_try_take() {
        let (cb, mut rx) = completion_channel("try-take");
        assert_eq!(rx.try_take(), Ok(None));
        unsafe { cb.invoke(Code::TimedOut.to_i32()) };
        assert_eq!(rx.try_take(), Ok(Some(Code::TimedOut)));
    }

    #[test]
    fn test_abort_resolves_channel() {
        let (cb, mut rx) = completion_channel("abandoned");
        unsafe { cb.abort() };
        assert_eq!(rx.try_take(), Ok(Some(Code::Aborted)));

        let p = recorded();
        let cb = make_callback(record, &p as *const Recorded as *mut c_void);
        unsafe { cb.abort() };
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.last.load(Ordering::SeqCst), Code::Aborted.to_i32());

        unsafe { block_until_complete().abort() };
    }

    #[test]
    fn test_channel_wait_from_other_thread() {
        let (cb, rx) = completion_channel("wait");
        let handle = std::thread::spawn(move || unsafe { cb.invoke(PP_OK) });
        assert_eq!(rx.wait(), Ok(Code::Ok));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_channel_await() {
        let (cb, rx) = completion_channel("await");
        std::thread::spawn(move || unsafe { cb.invoke(Code::ContextLost.to_i32()) });
        assert_eq!(rx.await, Ok(Code::ContextLost));
    }

    #[test]
    fn test_run_completion_callback_clears_slot() {
        let p = recorded();
        let mut slot = make_callback(record, &p as *const Recorded as *mut c_void);
        unsafe {
            plugbridge_run_completion_callback(&mut slot, 3);
            plugbridge_run_completion_callback(&mut slot, 4);
            plugbridge_run_completion_callback(ptr::null_mut(), 5);
        }
        assert!(slot.is_blocking());
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.last.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exported_constructors() {
        assert!(plugbridge_block_until_complete().is_blocking());
        let p = recorded();
        let cb = plugbridge_make_completion_callback(record, &p as *const Recorded as *mut c_void);
        unsafe { cb.invoke(0) };
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }
}
