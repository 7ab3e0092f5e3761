//! In-process message loop
//!
//! A stand-in for the host's message loop: one dedicated thread that runs
//! posted completion callbacks, in order, each exactly once. Embedders use it
//! to drive host-style asynchronous completions without a host; tests use it
//! to check that callbacks run on the loop thread and nowhere else.
//!
//! ## Queue
//!
//! Work travels over a `may::sync::mpmc` channel, so any thread or strand can
//! post through a [`LoopPoster`]. The loop thread drains it until it sees the
//! quit marker. A posted delay is slept on the loop thread before the item
//! runs, which also holds back everything queued behind it.
//!
//! The quit flag and the send share one lock, so nothing can be queued
//! behind the quit marker. Work the loop will not run is never dropped
//! silently: a rejected callback runs with `Aborted` on the posting thread
//! before `post_work` returns.
//!
//! ## Completion semantics
//!
//! [`MessageLoop::complete`] mirrors what a host call does with the callback
//! it was given:
//!
//! | Callback | Outcome |
//! |----------|---------|
//! | blocking sentinel | result returned synchronously |
//! | optional | result returned synchronously, callback not run |
//! | otherwise | queued, `CompletionPending` returned |

use crate::config::BridgeConfig;
use may::sync::mpmc;
use plugbridge_core::code::Code;
use plugbridge_core::completion::CompletionCallback;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, warn};

enum Work {
    Run {
        callback: CompletionCallback,
        delay: Duration,
        result: i32,
    },
    Quit,
}

/// Posting side of a [`MessageLoop`]. Cheap to clone and can be moved to
/// any thread; every clone feeds the same loop.
#[derive(Clone)]
pub struct LoopPoster {
    name: Arc<str>,
    /// Quit flag; held across every send
    gate: Arc<Mutex<bool>>,
    sender: mpmc::Sender<Work>,
}

pub struct MessageLoop {
    poster: LoopPoster,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LoopPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopPoster")
            .field("name", &self.name)
            .field("quitting", &*self.lock_gate())
            .finish()
    }
}

impl std::fmt::Debug for MessageLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageLoop")
            .field("poster", &self.poster)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

fn abort_work(work: Work) {
    if let Work::Run { callback, .. } = work {
        // SAFETY: the callback was handed to the loop and never invoked;
        // aborting consumes it.
        unsafe { callback.abort() };
    }
}

impl LoopPoster {
    fn lock_gate(&self) -> MutexGuard<'_, bool> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `callback` to run on the loop thread with `result` after `delay`.
    ///
    /// Returns `Ok` once queued; a queued callback always runs. The blocking
    /// sentinel cannot be posted (`BadArgument`). After quit, or once the loop
    /// thread is gone, the result is `Failed` and the callback has already run
    /// with `Aborted` on this thread.
    pub fn post_work(&self, callback: CompletionCallback, delay: Duration, result: i32) -> Code {
        if callback.is_blocking() {
            warn!(message_loop = %self.name, "cannot post the blocking sentinel");
            return Code::BadArgument;
        }
        let work = Work::Run {
            callback,
            delay,
            result,
        };
        let rejected = {
            let quitting = self.lock_gate();
            if *quitting {
                warn!(message_loop = %self.name, "post after quit rejected");
                work
            } else {
                match self.sender.send(work) {
                    Ok(()) => return Code::Ok,
                    Err(err) => {
                        error!(message_loop = %self.name, "message loop is gone");
                        err.0
                    }
                }
            }
        };
        // Run outside the lock; the callback may post again
        abort_work(rejected);
        Code::Failed
    }

    /// Finish an operation with `result` the way a host call would.
    pub fn complete(&self, callback: CompletionCallback, result: i32) -> Code {
        if callback.is_blocking() || callback.is_optional() {
            return Code::from_i32(result);
        }
        match self.post_work(callback, Duration::ZERO, result) {
            Code::Ok => Code::CompletionPending,
            rejected => rejected,
        }
    }

    /// Stop accepting work. Items already queued still run.
    pub fn post_quit(&self) {
        let mut quitting = self.lock_gate();
        if !*quitting {
            *quitting = true;
            // The loop may already be gone; then there is nothing to stop.
            let _ = self.sender.send(Work::Quit);
        }
    }
}

fn run_loop(name: &str, receiver: mpmc::Receiver<Work>) {
    debug!(message_loop = name, "message loop started");
    while let Ok(work) = receiver.recv() {
        match work {
            Work::Run {
                callback,
                delay,
                result,
            } => {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                debug!(message_loop = name, result, "running completion callback");
                // SAFETY: the poster handed over ownership of a callback that
                // has not been invoked; it is consumed here exactly once.
                unsafe { callback.invoke(result) };
            }
            Work::Quit => break,
        }
    }
    debug!(message_loop = name, "message loop stopped");
}

impl MessageLoop {
    /// Start a loop on a new thread named `name`.
    pub fn spawn(name: impl Into<String>) -> io::Result<MessageLoop> {
        let name: Arc<str> = Arc::from(name.into());
        let (sender, receiver) = mpmc::channel();
        let loop_name = Arc::clone(&name);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(&loop_name, receiver))?;
        Ok(MessageLoop {
            poster: LoopPoster {
                name,
                gate: Arc::new(Mutex::new(false)),
                sender,
            },
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    /// Start a loop named after `config.loop_name`
    pub fn from_config(config: &BridgeConfig) -> io::Result<MessageLoop> {
        MessageLoop::spawn(config.loop_name.clone())
    }

    pub fn name(&self) -> &str {
        &self.poster.name
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn is_loop_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// A handle other threads can post through
    pub fn poster(&self) -> LoopPoster {
        self.poster.clone()
    }

    /// See [`LoopPoster::post_work`]
    pub fn post_work(&self, callback: CompletionCallback, delay: Duration, result: i32) -> Code {
        self.poster.post_work(callback, delay, result)
    }

    /// See [`LoopPoster::complete`]
    pub fn complete(&self, callback: CompletionCallback, result: i32) -> Code {
        self.poster.complete(callback, result)
    }

    pub fn post_quit(&self) {
        self.poster.post_quit()
    }

    /// Quit and wait for the loop thread to drain and exit.
    pub fn join(mut self) -> thread::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> thread::Result<()> {
        self.post_quit();
        match self.handle.take() {
            Some(handle) if !self.is_loop_thread() => handle.join(),
            _ => Ok(()),
        }
    }
}

impl Drop for MessageLoop {
    fn drop(&mut self) {
        if self.shutdown().is_err() {
            error!(message_loop = %self.poster.name, "message loop thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugbridge_core::completion::block_until_complete;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_runs_on_loop_thread() {
        let ml = MessageLoop::spawn("test-loop").unwrap();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let cb = CompletionCallback::from_fn("thread-check", move |code| {
            let name = thread::current().name().map(str::to_string);
            *seen2.lock().unwrap() = Some((thread::current().id(), name, code));
        });
        assert_eq!(ml.post_work(cb, Duration::ZERO, 0), Code::Ok);
        let id = ml.thread_id();
        ml.join().unwrap();

        let (ran_on, name, code) = seen.lock().unwrap().take().unwrap();
        assert_eq!(ran_on, id);
        assert_eq!(name.as_deref(), Some("test-loop"));
        assert_eq!(code, Code::Ok);
    }

    #[test]
    fn test_sentinel_rejected() {
        let ml = MessageLoop::spawn("sentinel").unwrap();
        assert_eq!(
            ml.post_work(block_until_complete(), Duration::ZERO, 0),
            Code::BadArgument
        );
        assert!(!ml.is_loop_thread());
    }

    #[test]
    fn test_post_after_quit_aborts() {
        let ml = MessageLoop::spawn("quitting").unwrap();
        ml.post_quit();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let cb = CompletionCallback::from_fn("late", move |code| {
            *seen2.lock().unwrap() = Some((thread::current().id(), code));
        });
        assert_eq!(ml.post_work(cb, Duration::ZERO, 0), Code::Failed);

        let (ran_on, code) = seen.lock().unwrap().take().unwrap();
        assert_eq!(ran_on, thread::current().id());
        assert_eq!(code, Code::Aborted);
        ml.join().unwrap();
    }

    #[test]
    fn test_posts_racing_quit_are_never_lost() {
        for _ in 0..50 {
            let ml = MessageLoop::spawn("racing").unwrap();
            let ran = Arc::new(AtomicUsize::new(0));
            let aborted = Arc::new(AtomicUsize::new(0));
            let accepted = Arc::new(AtomicUsize::new(0));

            let posters: Vec<_> = (0..4)
                .map(|_| {
                    let poster = ml.poster();
                    let (ran, aborted, accepted) =
                        (Arc::clone(&ran), Arc::clone(&aborted), Arc::clone(&accepted));
                    thread::spawn(move || {
                        for _ in 0..20 {
                            let (ran, aborted) = (Arc::clone(&ran), Arc::clone(&aborted));
                            let cb = CompletionCallback::from_fn("race", move |code| {
                                let counter = if code == Code::Aborted { &aborted } else { &ran };
                                counter.fetch_add(1, Ordering::SeqCst);
                            });
                            if poster.post_work(cb, Duration::ZERO, 0) == Code::Ok {
                                accepted.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    })
                })
                .collect();
            ml.post_quit();
            for p in posters {
                p.join().unwrap();
            }
            ml.join().unwrap();

            assert_eq!(ran.load(Ordering::SeqCst), accepted.load(Ordering::SeqCst));
            assert_eq!(ran.load(Ordering::SeqCst) + aborted.load(Ordering::SeqCst), 80);
        }
    }

    #[test]
    fn test_items_run_in_post_order() {
        let ml = MessageLoop::spawn("ordered").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (i, delay) in [(0, 20u64), (1, 0), (2, 5)] {
            let order = Arc::clone(&order);
            let cb = CompletionCallback::from_fn("ordered", move |_| {
                order.lock().unwrap().push(i);
            });
            assert_eq!(ml.post_work(cb, Duration::from_millis(delay), 0), Code::Ok);
        }
        ml.join().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_complete_paths() {
        let ml = MessageLoop::spawn("complete").unwrap();
        assert_eq!(
            ml.complete(block_until_complete(), Code::FileNotFound.to_i32()),
            Code::FileNotFound
        );

        let optional = CompletionCallback::from_fn("optional", |_| panic!("must not run"));
        assert_eq!(ml.complete(optional.optional(), 0), Code::Ok);

        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let cb = CompletionCallback::from_fn("async", move |_| ran2.store(true, Ordering::SeqCst));
        assert_eq!(ml.complete(cb, 0), Code::CompletionPending);
        ml.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_from_config_uses_loop_name() {
        let config = BridgeConfig {
            loop_name: "configured-loop".to_string(),
            ..BridgeConfig::default()
        };
        let ml = MessageLoop::from_config(&config).unwrap();
        assert_eq!(ml.name(), "configured-loop");
    }
}
