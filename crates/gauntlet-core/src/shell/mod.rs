//! Test cases and how a single test is carried out.
//!
//! A [`TestCase`] pairs a [`TestIdentity`] with a procedure: either plain
//! functions or a factory for a [`Utest`] fixture. Running it goes through the
//! plugin chain and the three-phase lifecycle:
//!
//! ```text
//! pre-test plugins -> setup -> body (only if setup passed) -> teardown -> post-test plugins
//! ```
//!
//! Teardown runs even when setup or the body failed.

mod containment;
mod context;
mod process;

use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::filter::{matches_any, TestFilter};
use crate::plugin::PluginChain;
use crate::result::TestResult;

pub use containment::{
    crash, crash_on_fail, current_test, exit_current_test, fail_current_test, install_panic_hook,
    reset_crash_method, rethrow_panics, run_depth, set_crash_method, set_crash_on_fail,
    set_rethrow_panics, Abort, Outcome,
};
pub use context::TestContext;

use containment::FrameGuard;

/// Who a test is and where it was declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestIdentity {
    pub group: String,
    pub name: String,
    pub file: String,
    pub line: u32,
}

impl TestIdentity {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            file: file.into(),
            line,
        }
    }

    /// Placeholder for failures raised while no test is running.
    pub fn outside_of_test() -> Self {
        Self::new("", "", "<no test>", 0)
    }

    /// `TEST(group, name)` or `IGNORE_TEST(group, name)`.
    pub fn formatted_name(&self, kind: TestKind) -> String {
        format!("{}({}, {})", kind.macro_name(), self.group, self.name)
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted_name(TestKind::Normal))
    }
}

/// Whether a test runs by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    #[default]
    Normal,
    /// Declared but skipped unless ignored tests are requested.
    Ignored,
}

impl TestKind {
    pub fn macro_name(&self) -> &'static str {
        match self {
            Self::Normal => "TEST",
            Self::Ignored => "IGNORE_TEST",
        }
    }
}

/// A test phase written as a plain function.
pub type TestFn = fn(&mut TestContext<'_>) -> Outcome;

/// A fixture: state shared by the setup, body, and teardown of one test.
///
/// A fresh instance is created for every run.
pub trait Utest {
    fn setup(&mut self, _t: &mut TestContext<'_>) -> Outcome {
        Ok(())
    }

    fn test_body(&mut self, t: &mut TestContext<'_>) -> Outcome;

    fn teardown(&mut self, _t: &mut TestContext<'_>) -> Outcome {
        Ok(())
    }
}

struct FunctionUtest {
    setup: Option<TestFn>,
    body: TestFn,
    teardown: Option<TestFn>,
}

impl Utest for FunctionUtest {
    fn setup(&mut self, t: &mut TestContext<'_>) -> Outcome {
        match self.setup {
            Some(setup) => setup(t),
            None => Ok(()),
        }
    }

    fn test_body(&mut self, t: &mut TestContext<'_>) -> Outcome {
        (self.body)(t)
    }

    fn teardown(&mut self, t: &mut TestContext<'_>) -> Outcome {
        match self.teardown {
            Some(teardown) => teardown(t),
            None => Ok(()),
        }
    }
}

type FixtureFactory = Box<dyn Fn() -> Box<dyn Utest>>;

enum Procedure {
    Functions {
        setup: Option<TestFn>,
        body: TestFn,
        teardown: Option<TestFn>,
    },
    Fixture(FixtureFactory),
}

impl Procedure {
    fn instantiate(&self) -> Box<dyn Utest> {
        match self {
            Self::Functions {
                setup,
                body,
                teardown,
            } => Box::new(FunctionUtest {
                setup: *setup,
                body: *body,
                teardown: *teardown,
            }),
            Self::Fixture(factory) => factory(),
        }
    }
}

/// A registered test.
pub struct TestCase {
    identity: TestIdentity,
    kind: TestKind,
    procedure: Procedure,
}

impl TestCase {
    /// A test made of a single body function, located at the caller.
    #[track_caller]
    pub fn new(group: impl Into<String>, name: impl Into<String>, body: TestFn) -> Self {
        let location = Location::caller();
        Self {
            identity: TestIdentity::new(group, name, location.file(), location.line()),
            kind: TestKind::Normal,
            procedure: Procedure::Functions {
                setup: None,
                body,
                teardown: None,
            },
        }
    }

    /// A test whose phases live on a fixture built fresh for every run.
    #[track_caller]
    pub fn with_fixture<F, U>(group: impl Into<String>, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> U + 'static,
        U: Utest + 'static,
    {
        let location = Location::caller();
        Self {
            identity: TestIdentity::new(group, name, location.file(), location.line()),
            kind: TestKind::Normal,
            procedure: Procedure::Fixture(Box::new(move || -> Box<dyn Utest> {
                Box::new(factory())
            })),
        }
    }

    /// Override the declared location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.identity.file = file.into();
        self.identity.line = line;
        self
    }

    /// Mark the test ignored.
    pub fn ignored(mut self) -> Self {
        self.kind = TestKind::Ignored;
        self
    }

    pub fn with_setup(mut self, setup_fn: TestFn) -> Self {
        match &mut self.procedure {
            Procedure::Functions { setup, .. } => *setup = Some(setup_fn),
            Procedure::Fixture(_) => warn!(test = %self.identity, "setup ignored for fixture test"),
        }
        self
    }

    pub fn with_teardown(mut self, teardown_fn: TestFn) -> Self {
        match &mut self.procedure {
            Procedure::Functions { teardown, .. } => *teardown = Some(teardown_fn),
            Procedure::Fixture(_) => warn!(test = %self.identity, "teardown ignored for fixture test"),
        }
        self
    }

    pub fn identity(&self) -> &TestIdentity {
        &self.identity
    }

    pub fn group(&self) -> &str {
        &self.identity.group
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn file(&self) -> &str {
        &self.identity.file
    }

    pub fn line(&self) -> u32 {
        self.identity.line
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn is_ignored(&self) -> bool {
        self.kind == TestKind::Ignored
    }

    pub fn formatted_name(&self) -> String {
        self.identity.formatted_name(self.kind)
    }

    /// Whether the body would execute given the run-ignored setting.
    pub fn will_run(&self, run_ignored: bool) -> bool {
        !self.is_ignored() || run_ignored
    }

    /// Whether both filter lists accept this test.
    pub fn should_run(&self, group_filters: &[TestFilter], name_filters: &[TestFilter]) -> bool {
        matches_any(group_filters, self.group()) && matches_any(name_filters, self.name())
    }

    pub fn has_same_group(&self, other: &TestCase) -> bool {
        self.group() == other.group()
    }

    /// Run through the plugins and the lifecycle, isolated in a child process
    /// when requested.
    pub(crate) fn run_one_test(
        &self,
        plugins: &mut PluginChain,
        result: &mut TestResult,
        separate_process: bool,
    ) {
        if separate_process {
            process::run_in_separate_process(self, plugins, result);
        } else {
            self.run_in_current_process(plugins, result);
        }
    }

    pub(crate) fn run_in_current_process(&self, plugins: &mut PluginChain, result: &mut TestResult) {
        plugins.run_all_pre_test_actions(self, result);
        self.run_lifecycle(result);
        plugins.run_all_post_test_actions(self, result);
    }

    /// Setup, body, teardown. Each phase is contained on its own.
    fn run_lifecycle(&self, result: &mut TestResult) {
        trace!(test = %self.identity, "running");
        let frame = FrameGuard::enter(&self.identity);
        let mut fixture = self.procedure.instantiate();
        let mut t = TestContext::new(&self.identity, result);

        if t.run_phase(&frame, |t| fixture.setup(t)) {
            t.run_phase(&frame, |t| fixture.test_body(t));
        }
        t.run_phase(&frame, |t| fixture.teardown(t));
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::NullOutput;

    fn passing(_t: &mut TestContext<'_>) -> Outcome {
        Ok(())
    }

    #[test]
    fn test_formatted_names() {
        let test = TestCase::new("Group", "name", passing);
        assert_eq!(test.formatted_name(), "TEST(Group, name)");
        assert_eq!(test.ignored().formatted_name(), "IGNORE_TEST(Group, name)");
    }

    #[test]
    fn test_location_is_caller() {
        let test = TestCase::new("Group", "name", passing);
        assert!(test.file().ends_with("mod.rs"));
        let moved = test.at("other.rs", 9);
        assert_eq!(moved.file(), "other.rs");
        assert_eq!(moved.line(), 9);
    }

    #[test]
    fn test_will_run() {
        let ignored = TestCase::new("Group", "name", passing).ignored();
        assert!(!ignored.will_run(false));
        assert!(ignored.will_run(true));
    }

    #[test]
    fn test_teardown_runs_after_failed_setup() {
        fn failing_setup(t: &mut TestContext<'_>) -> Outcome {
            t.fail("setup failed")
        }
        fn body(t: &mut TestContext<'_>) -> Outcome {
            t.fail("body must not run")
        }
        fn teardown(t: &mut TestContext<'_>) -> Outcome {
            t.check(true, "true")
        }

        let test = TestCase::new("Group", "name", body)
            .with_setup(failing_setup)
            .with_teardown(teardown);
        let mut result = TestResult::new(NullOutput);
        let mut plugins = PluginChain::new();
        test.run_one_test(&mut plugins, &mut result, false);

        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures()[0].message(), "setup failed");
        assert_eq!(result.check_count(), 1);
    }
}
