//! Environment abstraction for deterministic testing.
//!
//! Decouples the request engine and handler pipeline from system resources
//! (monotonic time, randomness) so they can run against a manual clock and
//! scripted message ids in tests, and against the real clock in production.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::{Add, Sub};
use std::rc::Rc;
use std::time::Duration;

use rand::RngCore as _;

/// Time and randomness provider.
///
/// Implementations must guarantee `now()` never goes backwards within one
/// execution context.
pub trait Env: Clone {
    /// Monotonic instant type.
    type Instant: Copy
        + Ord
        + std::fmt::Debug
        + Add<Duration, Output = Self::Instant>
        + Sub<Self::Instant, Output = Duration>;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Fill `buf` with random bytes.
    fn random_bytes(&self, buf: &mut [u8]);

    /// A random 16-bit value (CoAP message ids).
    fn random_u16(&self) -> u16 {
        let mut bytes = [0u8; 2];
        self.random_bytes(&mut bytes);
        u16::from_be_bytes(bytes)
    }
}

/// Production environment: system clock and thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Env for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn random_bytes(&self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    mids: VecDeque<u16>,
    counter: u16,
}

/// Test environment with a manually advanced clock and scripted message
/// ids. Clones share state, so the test can hold one handle while the
/// engine holds another.
#[derive(Debug, Clone, Default)]
pub struct ManualEnv {
    state: Rc<RefCell<ManualState>>,
}

impl ManualEnv {
    /// An environment starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, d: Duration) {
        self.state.borrow_mut().now += d;
    }

    /// Queue the next message id `random_u16` hands out.
    pub fn push_mid(&self, mid: u16) {
        self.state.borrow_mut().mids.push_back(mid);
    }
}

impl Env for ManualEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        self.state.borrow().now
    }

    fn random_bytes(&self, buf: &mut [u8]) {
        let mut state = self.state.borrow_mut();
        let v = state.mids.pop_front().unwrap_or_else(|| {
            state.counter = state.counter.wrapping_add(1);
            state.counter
        });
        let bytes = v.to_be_bytes();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = bytes[i % 2];
        }
    }
}
