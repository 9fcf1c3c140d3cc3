//! Mock call verification.
//!
//! Tests record expectations through [`mock()`] (or a named
//! [`mock_scope`]); code under test reports what actually happened through
//! the same handles. Each actual call is charged to the first expectation it
//! satisfies, and anything left over is reported when expectations are
//! checked.
//!
//! ```
//! use gauntlet_core::mock::{mock, MockFailureRecorder};
//! use std::rc::Rc;
//!
//! let recorder = MockFailureRecorder::new();
//! mock().set_failure_reporter(Rc::new(recorder.clone()));
//!
//! mock().expect_one_call("read").with_parameter("fd", 3).and_return_value(7);
//! let read = mock().actual_call("read").with_parameter("fd", 3).return_int_value();
//!
//! assert_eq!(read, 7);
//! assert!(recorder.is_empty());
//! mock().clear();
//! mock().reset_failure_reporter();
//! ```

pub mod actual;
pub mod expected;
pub mod failure;
pub mod list;
pub mod plugin;
pub mod support;
pub mod value;

pub use actual::{ActualCall, CallMode};
pub use expected::{ExpectedOutput, MockExpectedCall};
pub use failure::{MockFailure, MockFailureKind, MockFailureRecorder, MockFailureReporter, TestFailureReporter};
pub use list::MockExpectedCallsList;
pub use plugin::{MockSupportPlugin, MOCK_SUPPORT_PLUGIN_NAME};
pub use support::{mock, mock_scope, ExpectedCallBuilder, MockScope};
pub use value::{
    ComparatorRepository, FunctionComparator, FunctionCopier, MockNamedValue, MockValue, MockValueComparator,
    MockValueCopier, ObjectId,
};
