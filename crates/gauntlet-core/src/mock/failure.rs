//! Mock failures, their messages, and where they are reported.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::failure::TestFailure;
use crate::mock::expected::OutputSpec;
use crate::mock::list::{MatchFailure, MockExpectedCallsList};
use crate::mock::value::{ComparatorRepository, MockNamedValue, ObjectId};
use crate::shell;

/// Category of a mock failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MockFailureKind {
    ExpectedCallsDidntHappen,
    UnexpectedCallHappened,
    CallOrderViolated,
    UnexpectedInputParameter,
    UnexpectedOutputParameter,
    ExpectedParameterDidntHappen,
    NoWayToCompareCustomType,
    NoWayToCopyCustomType,
    UnexpectedObject,
    ExpectedObjectDidntHappen,
}

/// A mock failure with its rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockFailure {
    kind: MockFailureKind,
    message: String,
}

impl MockFailure {
    pub fn new(kind: MockFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> MockFailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn expected_calls_didnt_happen(
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        let header = if expectations.amount_of_unfulfilled_expectations() > 1 {
            "Mock Failure: Expected calls WERE NOT fulfilled."
        } else {
            "Mock Failure: Expected call WAS NOT fulfilled."
        };
        Self::new(
            MockFailureKind::ExpectedCallsDidntHappen,
            format!("{header}\n{}", history(expectations, repository)),
        )
    }

    pub(crate) fn unexpected_call(
        name: &str,
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        let related = expectations.related_to(name);
        let message = if related.is_empty() {
            format!(
                "Mock Failure: Unexpected call to function: {name}\n{}",
                history(expectations, repository)
            )
        } else {
            let call_number = related.amount_of_actual_calls_fulfilled_for(name) + 1;
            format!(
                "Mock Failure: Unexpected additional ({}) call to function: {name}\n{}",
                ordinal(call_number),
                history(&related, repository)
            )
        };
        Self::new(MockFailureKind::UnexpectedCallHappened, message)
    }

    pub(crate) fn call_order_violated(expectations: &MockExpectedCallsList, repository: &ComparatorRepository) -> Self {
        Self::new(
            MockFailureKind::CallOrderViolated,
            format!("Mock Failure: Out of order calls\n{}", history(expectations, repository)),
        )
    }

    pub(crate) fn unexpected_object(
        name: &str,
        object: ObjectId,
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        Self::new(
            MockFailureKind::UnexpectedObject,
            format!(
                "Mock Failure: Function called on an unexpected object: {name}\n\tActual object for call has address: <{object}>\n{}",
                history(&expectations.related_to(name), repository)
            ),
        )
    }

    pub(crate) fn expected_object_didnt_happen(
        name: &str,
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        Self::new(
            MockFailureKind::ExpectedObjectDidntHappen,
            format!(
                "Mock Failure: Expected call on object for function \"{name}\" but it did not happen.\n{}",
                history(&expectations.related_to(name), repository)
            ),
        )
    }

    pub(crate) fn unexpected_input_parameter(
        name: &str,
        parameter: &MockNamedValue,
        name_known: bool,
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        let headline = if name_known {
            format!(
                "Mock Failure: Unexpected parameter value to parameter \"{}\" to function \"{}\": <{}>",
                parameter.name(),
                name,
                parameter.value().to_display_string(repository)
            )
        } else {
            format!(
                "Mock Failure: Unexpected parameter name to function \"{}\": {}",
                name,
                parameter.name()
            )
        };
        Self::new(
            MockFailureKind::UnexpectedInputParameter,
            format!(
                "{headline}\n{}\n\tACTUAL unexpected parameter passed to function: {name}\n\t\t{} {}: <{}>",
                history(&expectations.related_to(name), repository),
                parameter.type_name(),
                parameter.name(),
                parameter.value().to_display_string(repository)
            ),
        )
    }

    pub(crate) fn unexpected_output_parameter(
        name: &str,
        output: &OutputSpec,
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        Self::new(
            MockFailureKind::UnexpectedOutputParameter,
            format!(
                "Mock Failure: Unexpected output parameter name to function \"{}\": {}\n{}\n\tACTUAL unexpected output parameter passed to function: {}\n\t\t{} {}: <output>",
                name,
                output.name,
                history(&expectations.related_to(name), repository),
                name,
                output.type_name.as_deref().unwrap_or("output"),
                output.name
            ),
        )
    }

    pub(crate) fn expected_parameter_didnt_happen(
        name: &str,
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        Self::new(
            MockFailureKind::ExpectedParameterDidntHappen,
            format!(
                "Mock Failure: Expected parameter for function \"{name}\" did not happen.\n{}",
                history(&expectations.related_to(name), repository)
            ),
        )
    }

    pub(crate) fn no_way_to_compare(type_name: &str) -> Self {
        Self::new(
            MockFailureKind::NoWayToCompareCustomType,
            format!("MockFailure: No way to compare type <{type_name}>. Please install a MockValueComparator."),
        )
    }

    pub(crate) fn no_way_to_copy(type_name: &str) -> Self {
        Self::new(
            MockFailureKind::NoWayToCopyCustomType,
            format!("MockFailure: No way to copy type <{type_name}>. Please install a MockValueCopier."),
        )
    }

    /// Build the failure for an actual call nothing accepted.
    pub(crate) fn for_mismatch(
        reason: MatchFailure,
        name: &str,
        object: Option<ObjectId>,
        inputs: &[MockNamedValue],
        outputs: &[OutputSpec],
        expectations: &MockExpectedCallsList,
        repository: &ComparatorRepository,
    ) -> Self {
        match reason {
            MatchFailure::UnknownName | MatchFailure::Exhausted => {
                Self::unexpected_call(name, expectations, repository)
            }
            MatchFailure::WrongObject => match object {
                Some(object) => Self::unexpected_object(name, object, expectations, repository),
                None => Self::expected_object_didnt_happen(name, expectations, repository),
            },
            MatchFailure::MissingObject => Self::expected_object_didnt_happen(name, expectations, repository),
            MatchFailure::OutOfOrder => Self::call_order_violated(expectations, repository),
            MatchFailure::Inputs => {
                let related = expectations.related_to(name);
                let mut ignored = Vec::new();
                let rejected = inputs.iter().find(|parameter| {
                    !related
                        .iter()
                        .any(|call| call.accepts_input(parameter, repository, &mut ignored))
                });
                match rejected {
                    Some(parameter) => {
                        let name_known = related.iter().any(|c| c.has_input_parameter_with_name(parameter.name()));
                        Self::unexpected_input_parameter(name, parameter, name_known, expectations, repository)
                    }
                    None => Self::expected_parameter_didnt_happen(name, expectations, repository),
                }
            }
            MatchFailure::Outputs => {
                let related = expectations.related_to(name);
                let rejected = outputs
                    .iter()
                    .find(|output| !related.iter().any(|call| call.accepts_output(output)));
                match rejected {
                    Some(output) => Self::unexpected_output_parameter(name, output, expectations, repository),
                    None => Self::expected_parameter_didnt_happen(name, expectations, repository),
                }
            }
        }
    }
}

impl fmt::Display for MockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn history(expectations: &MockExpectedCallsList, repository: &ComparatorRepository) -> String {
    format!(
        "\tEXPECTED calls that WERE NOT fulfilled:\n{}\n\tEXPECTED calls that WERE fulfilled:\n{}",
        expectations.unfulfilled_calls_to_string("\t\t", repository),
        expectations.fulfilled_calls_to_string("\t\t", repository)
    )
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Where mock failures go.
pub trait MockFailureReporter {
    fn fail_test(&self, failure: MockFailure);
}

/// Fails the running test. This is the default reporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestFailureReporter;

impl MockFailureReporter for TestFailureReporter {
    fn fail_test(&self, failure: MockFailure) {
        shell::fail_current_test(|test| TestFailure::mock(test, &failure));
    }
}

/// Collects failures instead of failing the test.
#[derive(Debug, Default, Clone)]
pub struct MockFailureRecorder {
    failures: Rc<RefCell<Vec<MockFailure>>>,
}

impl MockFailureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<MockFailure> {
        self.failures.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.failures.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.borrow().is_empty()
    }

    pub fn last(&self) -> Option<MockFailure> {
        self.failures.borrow().last().cloned()
    }

    pub fn clear(&self) {
        self.failures.borrow_mut().clear();
    }
}

impl MockFailureReporter for MockFailureRecorder {
    fn fail_test(&self, failure: MockFailure) {
        self.failures.borrow_mut().push(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::expected::MockExpectedCall;

    #[test]
    fn test_expected_call_not_fulfilled() {
        let repository = ComparatorRepository::new();
        let mut list = MockExpectedCallsList::new();
        list.add_expected_call(MockExpectedCall::new("foo"));

        let failure = MockFailure::expected_calls_didnt_happen(&list, &repository);
        assert_eq!(failure.kind(), MockFailureKind::ExpectedCallsDidntHappen);
        assert_eq!(
            failure.message(),
            "Mock Failure: Expected call WAS NOT fulfilled.\n\
             \tEXPECTED calls that WERE NOT fulfilled:\n\
             \t\tfoo -> no parameters (expected 1 call, called 0 times)\n\
             \tEXPECTED calls that WERE fulfilled:\n\
             \t\t<none>"
        );
    }

    #[test]
    fn test_unexpected_call_lists_expectations() {
        let repository = ComparatorRepository::new();
        let mut list = MockExpectedCallsList::new();
        list.add_expected_call(MockExpectedCall::new("foo"));

        let failure = MockFailure::unexpected_call("bar", &list, &repository);
        assert!(failure
            .message()
            .starts_with("Mock Failure: Unexpected call to function: bar\n\tEXPECTED calls that WERE NOT fulfilled:\n\t\tfoo"));
    }

    #[test]
    fn test_additional_call_is_numbered() {
        let repository = ComparatorRepository::new();
        let mut list = MockExpectedCallsList::new();
        let mut call = MockExpectedCall::new("foo");
        call.call_was_made();
        list.add_expected_call(call);

        let failure = MockFailure::unexpected_call("foo", &list, &repository);
        assert!(failure
            .message()
            .starts_with("Mock Failure: Unexpected additional (2nd) call to function: foo\n"));
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
    }

    #[test]
    fn test_recorder_collects() {
        let recorder = MockFailureRecorder::new();
        let reporter: Rc<dyn MockFailureReporter> = Rc::new(recorder.clone());
        reporter.fail_test(MockFailure::no_way_to_compare("Point"));
        assert_eq!(recorder.len(), 1);
        assert_eq!(
            recorder.last().map(|f| f.kind()),
            Some(MockFailureKind::NoWayToCompareCustomType)
        );
    }
}
