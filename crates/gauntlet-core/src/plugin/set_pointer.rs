//! Scoped overrides of process-wide values.
//!
//! Code under test reads a replaceable value through an [`Overridable`]
//! static. A test swaps it with
//! [`TestContext::set_pointer`](crate::TestContext::set_pointer) and the
//! [`SetPointerPlugin`] puts every original back after the test, newest first.

use std::cell::RefCell;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::plugin::TestPlugin;
use crate::result::TestResult;
use crate::shell::TestCase;

/// Overrides allowed per test.
pub const MAX_SET: usize = 32;

pub const SET_POINTER_PLUGIN_NAME: &str = "SetPointerPlugin";

/// Errors raised when installing an override.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetPointerError {
    #[error("Maximum number of function pointers installed! (limit is {max})")]
    TooManyOverrides { max: usize },
}

/// A process-wide value that tests may replace for their duration.
///
/// ```
/// use gauntlet_core::plugin::Overridable;
///
/// fn real_clock() -> u64 { 42 }
/// static CLOCK: Overridable<fn() -> u64> = Overridable::new(real_clock);
///
/// assert_eq!((CLOCK.get())(), 42);
/// ```
pub struct Overridable<T> {
    value: Mutex<T>,
}

impl<T: Copy> Overridable<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: parking_lot::const_mutex(value),
        }
    }

    pub fn get(&self) -> T {
        *self.value.lock()
    }

    /// Store `value`, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.value.lock(), value)
    }
}

type Restore = Box<dyn FnOnce()>;

thread_local! {
    static PENDING_RESTORES: RefCell<Vec<Restore>> = const { RefCell::new(Vec::new()) };
}

/// Replace the value in `slot`, remembering the original for restoration.
pub fn override_value<T: Copy + 'static>(
    slot: &'static Overridable<T>,
    value: T,
) -> Result<(), SetPointerError> {
    PENDING_RESTORES.with(|pending| {
        let mut pending = pending.borrow_mut();
        if pending.len() >= MAX_SET {
            return Err(SetPointerError::TooManyOverrides { max: MAX_SET });
        }
        let original = slot.replace(value);
        pending.push(Box::new(move || {
            slot.replace(original);
        }));
        Ok(())
    })
}

/// Put back every overridden value, newest first. Returns how many.
pub fn restore_all() -> usize {
    let restores = PENDING_RESTORES.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
    let count = restores.len();
    for restore in restores.into_iter().rev() {
        restore();
    }
    count
}

/// Overrides currently waiting to be restored.
pub fn pending_overrides() -> usize {
    PENDING_RESTORES.with(|pending| pending.borrow().len())
}

/// Restores overridden values after each test.
#[derive(Debug, Default)]
pub struct SetPointerPlugin;

impl SetPointerPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl TestPlugin for SetPointerPlugin {
    fn name(&self) -> &str {
        SET_POINTER_PLUGIN_NAME
    }

    fn post_test_action(&mut self, test: &TestCase, _result: &mut TestResult) {
        let restored = restore_all();
        if restored > 0 {
            debug!(test = %test.identity(), restored, "restored overridden values");
        }
    }
}
