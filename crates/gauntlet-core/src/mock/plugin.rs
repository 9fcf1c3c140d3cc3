//! Verifies and resets mock expectations around every test.

use tracing::debug;

use crate::failure::TestFailure;
use crate::mock::support::{mock, with_mock};
use crate::mock::value::{ComparatorRepository, MockValueComparator, MockValueCopier};
use crate::plugin::TestPlugin;
use crate::result::TestResult;
use crate::shell::TestCase;

pub const MOCK_SUPPORT_PLUGIN_NAME: &str = "MockSupportPlugin";

/// Checks expectations after each test, then clears every scope.
///
/// Comparators and copiers installed on the plugin are made available to
/// each test and removed again afterwards.
#[derive(Debug, Default)]
pub struct MockSupportPlugin {
    repository: ComparatorRepository,
}

impl MockSupportPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_comparator(&mut self, type_name: &str, comparator: impl MockValueComparator + 'static) {
        self.repository.install_comparator(type_name, comparator);
    }

    pub fn install_copier(&mut self, type_name: &str, copier: impl MockValueCopier + 'static) {
        self.repository.install_copier(type_name, copier);
    }

    pub fn clear(&mut self) {
        self.repository.clear();
    }
}

impl TestPlugin for MockSupportPlugin {
    fn name(&self) -> &str {
        MOCK_SUPPORT_PLUGIN_NAME
    }

    fn pre_test_action(&mut self, _test: &TestCase, _result: &mut TestResult) {
        mock().install_comparators_and_copiers(&self.repository);
    }

    fn post_test_action(&mut self, test: &TestCase, result: &mut TestResult) {
        let failure = with_mock(|support| support.expectation_failure(""));
        if !result.current_test_failed() {
            if let Some(failure) = failure {
                debug!(test = %test.identity(), kind = ?failure.kind(), "mock expectations not met");
                result.add_failure(TestFailure::mock(test.identity(), &failure));
            }
        }
        mock().clear();
        mock().remove_all_comparators_and_copiers();
    }
}
