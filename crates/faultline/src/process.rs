// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process self-identification and self-termination primitives.
//!
//! The servant never talks to the operating system directly. It is handed an
//! implementation of these traits at construction so tests can swap in
//! [`testing::SimulatedProcess`] and keep the test runner alive.

/// Source of the current process identity.
pub trait ProcessIdentity: Send + Sync + 'static {
    /// Look up the identity of the running process.
    ///
    /// Assumed to be slow; callers cache the result.
    fn lookup(&self) -> i32;
}

/// Capability to end the current process.
pub trait ProcessController: Send + Sync + 'static {
    /// Terminate the hosting process immediately.
    ///
    /// No destructors run, no buffered output is flushed and no reply is sent
    /// for the request being dispatched.
    fn terminate_self(&self) -> !;
}

/// The real operating system process.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcess;

impl ProcessIdentity for OsProcess {
    #[cfg(unix)]
    fn lookup(&self) -> i32 {
        // SAFETY: getpid has no preconditions and cannot fail.
        unsafe { libc::getpid() }
    }

    #[cfg(not(unix))]
    fn lookup(&self) -> i32 {
        i32::try_from(std::process::id()).unwrap_or(i32::MAX)
    }
}

impl ProcessController for OsProcess {
    fn terminate_self(&self) -> ! {
        kill_self();
        std::process::abort()
    }
}

#[cfg(unix)]
fn kill_self() {
    // SAFETY: signalling our own pid. SIGKILL cannot be caught, so this does
    // not return on success.
    unsafe {
        libc::kill(libc::getpid(), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_self() {}

/// Simulated process primitives for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::{ProcessController, ProcessIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Unwind payload used by [`SimulatedProcess::terminate_self`].
    #[derive(Debug)]
    pub struct Terminated;

    /// In-process stand-in for [`super::OsProcess`].
    ///
    /// Counts identity lookups and terminations. `terminate_self` unwinds
    /// with a [`Terminated`] payload instead of exiting; the panic hook is
    /// bypassed so test output stays clean.
    #[derive(Debug)]
    pub struct SimulatedProcess {
        pid: i32,
        lookup_delay: Duration,
        lookups: AtomicUsize,
        terminations: AtomicUsize,
    }

    impl SimulatedProcess {
        pub fn new(pid: i32) -> Self {
            Self {
                pid,
                lookup_delay: Duration::ZERO,
                lookups: AtomicUsize::new(0),
                terminations: AtomicUsize::new(0),
            }
        }

        /// Make every lookup sleep, widening race windows.
        pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
            self.lookup_delay = delay;
            self
        }

        /// Number of identity lookups performed so far.
        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }

        /// Number of times termination was requested.
        pub fn terminations(&self) -> usize {
            self.terminations.load(Ordering::SeqCst)
        }

        pub fn is_terminated(&self) -> bool {
            self.terminations() > 0
        }
    }

    impl ProcessIdentity for SimulatedProcess {
        fn lookup(&self) -> i32 {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if !self.lookup_delay.is_zero() {
                std::thread::sleep(self.lookup_delay);
            }
            self.pid
        }
    }

    impl ProcessController for SimulatedProcess {
        fn terminate_self(&self) -> ! {
            self.terminations.fetch_add(1, Ordering::SeqCst);
            std::panic::resume_unwind(Box::new(Terminated))
        }
    }
}
