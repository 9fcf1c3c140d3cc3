//! Mock state for the running thread, and the scope facade tests use.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::mock::actual::{ActualCall, ActualOutput, CallMode};
use crate::mock::expected::{CallPosition, CallSignature, ExpectedOutput, MockExpectedCall, OutputSpec};
use crate::mock::failure::{MockFailure, MockFailureReporter, TestFailureReporter};
use crate::mock::list::MockExpectedCallsList;
use crate::mock::value::{
    ComparatorRepository, MockNamedValue, MockValue, MockValueComparator, MockValueCopier, ObjectId,
};

thread_local! {
    static SUPPORT: RefCell<MockSupport> = RefCell::new(MockSupport::default());
}

pub(crate) fn with_mock<R>(f: impl FnOnce(&mut MockSupport) -> R) -> R {
    SUPPORT.with(|support| f(&mut support.borrow_mut()))
}

/// Hand failures to the installed reporter, outside the state borrow.
pub(crate) fn report_failures(failures: Vec<MockFailure>) {
    if failures.is_empty() {
        return;
    }
    let reporter = with_mock(|support| support.reporter.clone());
    for failure in failures {
        trace!(kind = ?failure.kind(), "mock failure");
        match &reporter {
            Some(reporter) => reporter.fail_test(failure),
            None => TestFailureReporter.fail_test(failure),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MissingHandler {
    Comparator,
    Copier,
}

#[derive(Debug)]
struct ScopeState {
    expectations: MockExpectedCallsList,
    enabled: bool,
    ignore_other_calls: bool,
    strict_order: bool,
    data: BTreeMap<String, MockValue>,
}

impl Default for ScopeState {
    fn default() -> Self {
        Self {
            expectations: MockExpectedCallsList::new(),
            enabled: true,
            ignore_other_calls: false,
            strict_order: false,
            data: BTreeMap::new(),
        }
    }
}

/// All mock bookkeeping for one thread.
///
/// Call order counters and the strict-order sequence are shared by every
/// scope so orderings across scopes stay comparable. Flags set on the default
/// scope apply to all scopes.
#[derive(Default)]
pub(crate) struct MockSupport {
    scopes: BTreeMap<String, ScopeState>,
    repository: ComparatorRepository,
    actual_call_order: u32,
    strict_sequence: u64,
    tracing: bool,
    trace: String,
    reported_missing: BTreeSet<(MissingHandler, String)>,
    reporter: Option<Rc<dyn MockFailureReporter>>,
    generation: u64,
}

impl MockSupport {
    fn scope_mut(&mut self, scope: &str) -> &mut ScopeState {
        self.scopes.entry(scope.to_string()).or_default()
    }

    fn root_flags(&self) -> (bool, bool, bool) {
        self.scopes
            .get("")
            .map(|root| (root.enabled, root.ignore_other_calls, root.strict_order))
            .unwrap_or((true, false, false))
    }

    fn add_expectation(&mut self, scope: &str, mut call: MockExpectedCall) -> (usize, u64) {
        let (_, _, root_strict) = self.root_flags();
        let strict = root_strict || self.scopes.get(scope).is_some_and(|s| s.strict_order);
        if strict {
            self.strict_sequence += 1;
            call.set_strict_position(self.strict_sequence);
        }
        trace!(scope, expectation = call.name(), "expectation added");
        let index = self.scope_mut(scope).expectations.add_expected_call(call);
        (index, self.generation)
    }

    fn update_expectation(
        &mut self,
        scope: &str,
        index: usize,
        generation: u64,
        update: impl FnOnce(&mut MockExpectedCall),
    ) {
        let call = match self.scopes.get_mut(scope) {
            Some(state) if generation == self.generation => state.expectations.get_mut(index),
            _ => None,
        };
        match call {
            Some(call) => update(call),
            None => warn!(scope, index, "expectation was cleared before it was configured"),
        }
    }

    fn begin_actual_call(&mut self, scope: &str, name: &str) -> (CallMode, u32) {
        if self.tracing {
            return (CallMode::Traced, 0);
        }
        let (root_enabled, root_ignore_others, _) = self.root_flags();
        let state = self.scope_mut(scope);
        if !root_enabled || !state.enabled {
            return (CallMode::Ignored, 0);
        }
        if (root_ignore_others || state.ignore_other_calls) && !state.expectations.has_expectation_with_name(name) {
            return (CallMode::Ignored, 0);
        }
        self.actual_call_order = self.actual_call_order.saturating_add(1);
        (CallMode::Checked, self.actual_call_order)
    }

    fn note_missing(&mut self, handler: MissingHandler, type_name: String, failures: &mut Vec<MockFailure>) {
        let failure = match handler {
            MissingHandler::Comparator => MockFailure::no_way_to_compare(&type_name),
            MissingHandler::Copier => MockFailure::no_way_to_copy(&type_name),
        };
        if self.reported_missing.insert((handler, type_name)) {
            failures.push(failure);
        }
    }

    /// Strict positions a call may be charged to now. Every earlier position
    /// must be fulfilled, and nothing later may have been called yet.
    fn strict_window(&self) -> (u64, u64) {
        let mut lowest = 0;
        let mut highest = u64::MAX;
        for call in self.scopes.values().flat_map(|state| state.expectations.iter()) {
            let Some(position) = call.strict_position() else {
                continue;
            };
            if call.actual_calls() > 0 {
                lowest = lowest.max(position);
            }
            if !call.is_fulfilled() {
                highest = highest.min(position);
            }
        }
        (lowest, highest)
    }

    /// Charge an actual call to an expectation and bind its outputs.
    pub(crate) fn resolve_actual_call(
        &mut self,
        scope: &str,
        name: &str,
        object: Option<ObjectId>,
        call_order: u32,
        inputs: &[MockNamedValue],
        outputs: &mut [ActualOutput<'_>],
    ) -> (Option<MockValue>, Vec<MockFailure>) {
        let specs: Vec<OutputSpec> = outputs.iter().map(|o| o.spec.clone()).collect();
        let signature = CallSignature {
            name,
            object,
            inputs,
            outputs: &specs,
        };
        let mut missing = Vec::new();
        let mut failures = Vec::new();
        let mut missing_copiers = Vec::new();
        let position = CallPosition {
            ordinal: call_order,
            sequence: self.strict_window(),
        };

        let state = self.scopes.entry(scope.to_string()).or_default();
        let found = state
            .expectations
            .find_match(&signature, position, &self.repository, &mut missing);

        let value = match found {
            Ok(index) => {
                trace!(call = name, index, call_order, "matched expectation");
                let mut value = None;
                if let Some(expected) = state.expectations.get_mut(index) {
                    expected.call_was_made();
                    value = expected.return_value().cloned();
                    for output in outputs.iter_mut() {
                        let Some(source) = expected
                            .outputs()
                            .iter()
                            .find(|o| o.name() == output.spec.name)
                            .and_then(ExpectedOutput::value)
                        else {
                            continue;
                        };
                        match source.copy_into(output.target, &self.repository) {
                            Ok(true) => {}
                            Ok(false) => warn!(
                                call = name,
                                output = %output.spec.name,
                                "output slot has a different type than the expected value"
                            ),
                            Err(type_name) => missing_copiers.push(type_name),
                        }
                    }
                }
                value
            }
            Err(reason) => {
                trace!(call = name, ?reason, "no expectation accepted the call");
                failures.push(MockFailure::for_mismatch(
                    reason,
                    name,
                    object,
                    inputs,
                    &specs,
                    &state.expectations,
                    &self.repository,
                ));
                None
            }
        };

        let mut handler_failures = Vec::new();
        for type_name in missing {
            self.note_missing(MissingHandler::Comparator, type_name, &mut handler_failures);
        }
        for type_name in missing_copiers {
            self.note_missing(MissingHandler::Copier, type_name, &mut handler_failures);
        }
        handler_failures.extend(failures);
        (value, handler_failures)
    }

    pub(crate) fn record_trace(&mut self, line: &str) {
        self.trace.push_str(line);
    }

    fn scopes_in<'s>(&'s self, scope: &'s str) -> impl Iterator<Item = &'s ScopeState> + 's {
        self.scopes
            .iter()
            .filter(move |(name, _)| scope.is_empty() || name.as_str() == scope)
            .map(|(_, state)| state)
    }

    /// A single failure listing the expectations of every scope involved, if
    /// any is unfulfilled. The default scope covers every scope.
    pub(crate) fn expectation_failure(&self, scope: &str) -> Option<MockFailure> {
        let mut merged = MockExpectedCallsList::new();
        for state in self.scopes_in(scope) {
            merged.add_expectations(&state.expectations);
        }
        merged
            .has_unfulfilled_expectations()
            .then(|| MockFailure::expected_calls_didnt_happen(&merged, &self.repository))
    }

    fn expected_calls_left(&self, scope: &str) -> usize {
        self.scopes_in(scope)
            .map(|state| state.expectations.amount_of_unfulfilled_expectations())
            .sum()
    }

    fn clear(&mut self, scope: &str) {
        self.generation += 1;
        if scope.is_empty() {
            self.scopes.clear();
            self.actual_call_order = 0;
            self.strict_sequence = 0;
            self.tracing = false;
            self.trace.clear();
            self.reported_missing.clear();
        } else {
            self.scopes.remove(scope);
        }
    }
}

fn qualified_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}::{name}")
    }
}

/// The default mock scope.
pub fn mock() -> MockScope {
    MockScope {
        name: String::new(),
    }
}

/// A named mock scope. Calls made through it are named `scope::function`.
pub fn mock_scope(name: &str) -> MockScope {
    MockScope { name: name.to_string() }
}

/// Handle on one mock scope.
///
/// The handle holds no state itself; everything lives in the thread's mock
/// support, so handles can be created freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockScope {
    name: String,
}

impl MockScope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expect_one_call(&self, name: &str) -> ExpectedCallBuilder {
        self.expect_calls_between(1, 1, name)
    }

    pub fn expect_n_calls(&self, amount: u32, name: &str) -> ExpectedCallBuilder {
        self.expect_calls_between(amount, amount, name)
    }

    /// Any call to `name` becomes an unexpected call.
    pub fn expect_no_call(&self, name: &str) {
        let call = MockExpectedCall::with_count(qualified_name(&self.name, name), 0, 0);
        with_mock(|support| support.scope_mut(&self.name).expectations.add_expected_call(call));
    }

    pub fn expect_calls_between(&self, min: u32, max: u32, name: &str) -> ExpectedCallBuilder {
        let call = MockExpectedCall::with_count(qualified_name(&self.name, name), min, max);
        let (index, generation) = with_mock(|support| support.add_expectation(&self.name, call));
        ExpectedCallBuilder {
            scope: self.name.clone(),
            index,
            generation,
        }
    }

    /// Start an actual call. It is checked when its builder chain ends.
    pub fn actual_call<'a>(&self, name: &str) -> ActualCall<'a> {
        let name = qualified_name(&self.name, name);
        let (mode, call_order) = with_mock(|support| support.begin_actual_call(&self.name, &name));
        ActualCall::new(self.name.clone(), name, mode, call_order)
    }

    /// Report unfulfilled expectations through the failure reporter.
    pub fn check_expectations(&self) {
        let failure = with_mock(|support| support.expectation_failure(&self.name));
        report_failures(failure.into_iter().collect());
    }

    pub fn expected_calls_left(&self) -> usize {
        with_mock(|support| support.expected_calls_left(&self.name))
    }

    /// Whether any expectation in this scope is still unfulfilled.
    pub fn has_unfulfilled_expectations(&self) -> bool {
        self.expected_calls_left() > 0
    }

    /// Drop expectations, data and flags. Clearing the default scope resets
    /// everything, call order counters and trace included.
    pub fn clear(&self) {
        debug!(scope = %self.name, "clearing mock scope");
        with_mock(|support| support.clear(&self.name));
    }

    /// Expectations created from now on must be called in creation order.
    pub fn strict_order(&self) {
        with_mock(|support| support.scope_mut(&self.name).strict_order = true);
    }

    pub fn enable(&self) {
        with_mock(|support| support.scope_mut(&self.name).enabled = true);
    }

    /// Accept every actual call without checking it.
    pub fn disable(&self) {
        with_mock(|support| support.scope_mut(&self.name).enabled = false);
    }

    pub fn is_enabled(&self) -> bool {
        with_mock(|support| {
            let (root_enabled, _, _) = support.root_flags();
            root_enabled && support.scopes.get(&self.name).map_or(true, |s| s.enabled)
        })
    }

    /// Accept calls to functions that have no expectation at all.
    pub fn ignore_other_calls(&self) {
        with_mock(|support| support.scope_mut(&self.name).ignore_other_calls = true);
    }

    /// Record actual calls to the trace instead of checking them.
    pub fn tracing(&self, enabled: bool) {
        with_mock(|support| support.tracing = enabled);
    }

    pub fn trace_output(&self) -> String {
        with_mock(|support| support.trace.clone())
    }

    pub fn install_comparator(&self, type_name: &str, comparator: impl MockValueComparator + 'static) {
        with_mock(|support| support.repository.install_comparator(type_name, comparator));
    }

    pub fn install_copier(&self, type_name: &str, copier: impl MockValueCopier + 'static) {
        with_mock(|support| support.repository.install_copier(type_name, copier));
    }

    pub fn install_comparators_and_copiers(&self, repository: &ComparatorRepository) {
        with_mock(|support| support.repository.install_all(repository));
    }

    pub fn remove_all_comparators_and_copiers(&self) {
        with_mock(|support| support.repository.clear());
    }

    pub fn set_data(&self, name: &str, value: impl Into<MockValue>) {
        let value = value.into();
        with_mock(|support| {
            support.scope_mut(&self.name).data.insert(name.to_string(), value);
        });
    }

    pub fn set_data_object<T: Any>(&self, name: &str, type_name: &str, value: T) {
        self.set_data(name, MockValue::custom(type_name, value));
    }

    pub fn data(&self, name: &str) -> Option<MockValue> {
        with_mock(|support| {
            support
                .scopes
                .get(&self.name)
                .and_then(|state| state.data.get(name))
                .cloned()
        })
    }

    /// Route failures somewhere other than the running test.
    pub fn set_failure_reporter(&self, reporter: Rc<dyn MockFailureReporter>) {
        with_mock(|support| support.reporter = Some(reporter));
    }

    pub fn reset_failure_reporter(&self) {
        with_mock(|support| support.reporter = None);
    }
}

/// Configures the expectation it was created for.
///
/// If the scope is cleared while the builder is alive, further calls log a
/// warning and do nothing.
#[derive(Debug)]
pub struct ExpectedCallBuilder {
    scope: String,
    index: usize,
    generation: u64,
}

impl ExpectedCallBuilder {
    fn update(self, update: impl FnOnce(&mut MockExpectedCall)) -> Self {
        with_mock(|support| support.update_expectation(&self.scope, self.index, self.generation, update));
        self
    }

    pub fn with_parameter(self, name: &str, value: impl Into<MockValue>) -> Self {
        let parameter = MockNamedValue::new(name, value.into());
        self.update(|call| call.add_input(parameter))
    }

    pub fn with_double_parameter(self, name: &str, value: f64, tolerance: f64) -> Self {
        self.with_parameter(name, MockValue::double(value, tolerance))
    }

    pub fn with_pointer_parameter<T: ?Sized>(self, name: &str, ptr: *const T) -> Self {
        self.with_parameter(name, MockValue::pointer(ptr))
    }

    pub fn with_const_pointer_parameter<T: ?Sized>(self, name: &str, ptr: *const T) -> Self {
        self.with_parameter(name, MockValue::const_pointer(ptr))
    }

    pub fn with_function_pointer_parameter(self, name: &str, address: usize) -> Self {
        self.with_parameter(name, MockValue::function_pointer(address))
    }

    pub fn with_memory_buffer_parameter(self, name: &str, bytes: &[u8]) -> Self {
        self.with_parameter(name, MockValue::MemoryBuffer(bytes.to_vec()))
    }

    pub fn with_parameter_of_type<T: Any>(self, type_name: &str, name: &str, value: T) -> Self {
        self.with_parameter(name, MockValue::custom(type_name, value))
    }

    /// The matching actual call gets `value` written into its output slot.
    pub fn with_output_parameter_returning(self, name: &str, value: impl Into<MockValue>) -> Self {
        let output = ExpectedOutput::new(name, None, Some(value.into()));
        self.update(|call| call.add_output(output))
    }

    pub fn with_output_parameter_of_type_returning<T: Any>(self, type_name: &str, name: &str, value: T) -> Self {
        let output = ExpectedOutput::new(
            name,
            Some(type_name.to_string()),
            Some(MockValue::custom(type_name, value)),
        );
        self.update(|call| call.add_output(output))
    }

    /// The output must be passed but is left untouched.
    pub fn with_unmodified_output_parameter(self, name: &str) -> Self {
        let output = ExpectedOutput::new(name, None, None);
        self.update(|call| call.add_output(output))
    }

    pub fn on_object<T: ?Sized>(self, object: &T) -> Self {
        self.on_object_id(ObjectId::of(object))
    }

    pub fn on_object_id(self, object: ObjectId) -> Self {
        self.update(|call| call.set_object(object))
    }

    pub fn with_call_order(self, order: u32) -> Self {
        self.update(|call| call.set_call_order(order))
    }

    pub fn with_call_order_range(self, first: u32, last: u32) -> Self {
        self.update(|call| call.set_call_order_range(first, last))
    }

    pub fn ignore_other_parameters(self) -> Self {
        self.update(|call| call.set_ignore_other_parameters())
    }

    pub fn and_return_value(self, value: impl Into<MockValue>) -> Self {
        let value = value.into();
        self.update(|call| call.set_return_value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::failure::{MockFailureKind, MockFailureRecorder};

    fn recording() -> MockFailureRecorder {
        mock().clear();
        let recorder = MockFailureRecorder::new();
        mock().set_failure_reporter(Rc::new(recorder.clone()));
        recorder
    }

    #[test]
    fn test_matching_call_fulfils_expectation() {
        let recorder = recording();
        mock().expect_one_call("init").with_parameter("mode", 1);
        mock().actual_call("init").with_parameter("mode", 1).check();

        assert!(recorder.is_empty());
        assert_eq!(mock().expected_calls_left(), 0);
    }

    #[test]
    fn test_expectations_per_scope() {
        let recorder = recording();
        mock_scope("io").expect_one_call("open");
        mock().expect_one_call("close");

        assert_eq!(mock_scope("io").expected_calls_left(), 1);
        assert_eq!(mock().expected_calls_left(), 2);

        mock_scope("io").actual_call("open").check();
        assert_eq!(mock_scope("io").expected_calls_left(), 0);
        assert!(recorder.is_empty());

        mock().actual_call("open").check();
        assert_eq!(recorder.last().map(|f| f.kind()), Some(MockFailureKind::UnexpectedCallHappened));
    }

    #[test]
    fn test_clear_invalidates_builders() {
        let _recorder = recording();
        let builder = mock().expect_one_call("foo");
        mock().clear();
        let _ = builder.with_parameter("a", 1);
        assert_eq!(mock().expected_calls_left(), 0);
    }

    #[test]
    fn test_strict_order_spans_scopes() {
        let recorder = recording();
        mock().strict_order();
        mock().expect_one_call("first");
        mock_scope("other").expect_one_call("second");

        mock_scope("other").actual_call("second").check();
        assert_eq!(recorder.last().map(|f| f.kind()), Some(MockFailureKind::CallOrderViolated));
    }

    #[test]
    fn test_data_is_cleared_with_scope() {
        let _recorder = recording();
        mock().set_data("answer", 42);
        assert_eq!(mock().data("answer").and_then(|v| v.as_int()), Some(42));
        mock().clear();
        assert!(mock().data("answer").is_none());
    }
}
