//! Static test registration.
//!
//! Tests declared with [`test_case!`](crate::test_case) or
//! [`ignore_test_case!`](crate::ignore_test_case) are collected at link time
//! and picked up by [`TestRegistry::from_registered`](crate::TestRegistry::from_registered).
//!
//! ```ignore
//! use gauntlet_core::{check, test_case, Outcome, TestContext};
//!
//! fn adds_up(t: &mut TestContext<'_>) -> Outcome {
//!     check!(t, 1 + 1 == 2)?;
//!     t.longs_equal(4, 2 * 2)
//! }
//!
//! test_case!(Arithmetic, adds_up, adds_up);
//! ```

use crate::shell::{TestCase, TestFn, TestKind};

/// One statically declared test.
#[derive(Debug, Clone, Copy)]
pub struct TestRegistration {
    pub group: &'static str,
    pub name: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub kind: TestKind,
    pub body: TestFn,
    pub setup: Option<TestFn>,
    pub teardown: Option<TestFn>,
}

inventory::collect!(TestRegistration);

impl TestRegistration {
    pub const fn new(
        group: &'static str,
        name: &'static str,
        file: &'static str,
        line: u32,
        kind: TestKind,
        body: TestFn,
    ) -> Self {
        Self {
            group,
            name,
            file,
            line,
            kind,
            body,
            setup: None,
            teardown: None,
        }
    }

    pub const fn with_fixture_functions(mut self, setup: TestFn, teardown: TestFn) -> Self {
        self.setup = Some(setup);
        self.teardown = Some(teardown);
        self
    }

    pub fn to_test_case(&self) -> TestCase {
        let mut test = TestCase::new(self.group, self.name, self.body).at(self.file, self.line);
        if let Some(setup) = self.setup {
            test = test.with_setup(setup);
        }
        if let Some(teardown) = self.teardown {
            test = test.with_teardown(teardown);
        }
        if self.kind == TestKind::Ignored {
            test = test.ignored();
        }
        test
    }
}

/// Every statically declared test, in declaration order.
///
/// Link order is not stable, so tests are sorted by file and line.
pub fn registered_tests() -> Vec<TestCase> {
    let mut registrations: Vec<&TestRegistration> = inventory::iter::<TestRegistration>.into_iter().collect();
    registrations.sort_by(|a, b| (a.file, a.line, a.name).cmp(&(b.file, b.line, b.name)));
    registrations.into_iter().map(TestRegistration::to_test_case).collect()
}

/// Declare a test: `test_case!(Group, name, body_fn)`, optionally followed by
/// `setup = fn, teardown = fn`.
#[macro_export]
macro_rules! test_case {
    ($group:ident, $name:ident, $body:path) => {
        $crate::test_case!(@register $group, $name, $crate::TestKind::Normal, $body);
    };
    ($group:ident, $name:ident, $body:path, setup = $setup:path, teardown = $teardown:path) => {
        $crate::inventory::submit! {
            $crate::registration::TestRegistration::new(
                stringify!($group),
                stringify!($name),
                file!(),
                line!(),
                $crate::TestKind::Normal,
                $body,
            )
            .with_fixture_functions($setup, $teardown)
        }
    };
    (@register $group:ident, $name:ident, $kind:expr, $body:path) => {
        $crate::inventory::submit! {
            $crate::registration::TestRegistration::new(
                stringify!($group),
                stringify!($name),
                file!(),
                line!(),
                $kind,
                $body,
            )
        }
    };
}

/// Declare a test that is counted but not run unless ignored tests are enabled.
#[macro_export]
macro_rules! ignore_test_case {
    ($group:ident, $name:ident, $body:path) => {
        $crate::test_case!(@register $group, $name, $crate::TestKind::Ignored, $body);
    };
}

/// `check!(t, condition)` records the condition's source text with the check.
#[macro_export]
macro_rules! check {
    ($t:expr, $condition:expr) => {
        $t.check($condition, stringify!($condition))
    };
    ($t:expr, $condition:expr, $text:expr) => {
        $t.check_text($condition, stringify!($condition), $text)
    };
}

/// `check_false!(t, condition)`.
#[macro_export]
macro_rules! check_false {
    ($t:expr, $condition:expr) => {
        $t.check_false($condition, stringify!($condition))
    };
}
