//! One expected call and its constraints.

use crate::mock::value::{ComparatorRepository, MockNamedValue, MockValue, ObjectId};

/// An output parameter an expectation knows about.
#[derive(Debug, Clone)]
pub struct ExpectedOutput {
    name: String,
    /// Custom type the actual output must be declared with, if any.
    type_name: Option<String>,
    /// Value written to the caller's slot. `None` leaves the slot alone.
    value: Option<MockValue>,
}

impl ExpectedOutput {
    pub fn new(name: impl Into<String>, type_name: Option<String>, value: Option<MockValue>) -> Self {
        Self {
            name: name.into(),
            type_name,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    pub fn value(&self) -> Option<&MockValue> {
        self.value.as_ref()
    }
}

/// An output parameter as declared by an actual call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputSpec {
    pub(crate) name: String,
    pub(crate) type_name: Option<String>,
}

/// What an actual call looks like to the matcher.
pub(crate) struct CallSignature<'c> {
    pub(crate) name: &'c str,
    pub(crate) object: Option<ObjectId>,
    pub(crate) inputs: &'c [MockNamedValue],
    pub(crate) outputs: &'c [OutputSpec],
}

/// Where an actual call lands: its global ordinal, and the strict-order
/// positions it may still be charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallPosition {
    pub(crate) ordinal: u32,
    pub(crate) sequence: (u64, u64),
}

impl CallPosition {
    /// A call with no strict-order constraint.
    pub(crate) fn unordered(ordinal: u32) -> Self {
        Self {
            ordinal,
            sequence: (0, u64::MAX),
        }
    }
}

/// How an expectation's parameters compare to an actual call's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParameterMatch {
    Matches,
    InputMismatch,
    OutputMismatch,
}

/// A call the code under test is expected to make.
#[derive(Debug, Clone)]
pub struct MockExpectedCall {
    name: String,
    object: Option<ObjectId>,
    inputs: Vec<MockNamedValue>,
    outputs: Vec<ExpectedOutput>,
    /// First and last ordinal this expectation may be called at.
    call_order: Option<(u32, u32)>,
    /// Place in the strict-order sequence.
    strict_position: Option<u64>,
    min_calls: u32,
    max_calls: u32,
    actual_calls: u32,
    ignore_other_parameters: bool,
    return_value: Option<MockValue>,
}

impl MockExpectedCall {
    /// Expect exactly one call.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_count(name, 1, 1)
    }

    /// Expect between `min` and `max` calls, inclusive.
    pub fn with_count(name: impl Into<String>, min: u32, max: u32) -> Self {
        Self {
            name: name.into(),
            object: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            call_order: None,
            strict_position: None,
            min_calls: min,
            max_calls: max.max(min),
            actual_calls: 0,
            ignore_other_parameters: false,
            return_value: None,
        }
    }

    /// Add an input, replacing any earlier one with the same name.
    pub fn add_input(&mut self, parameter: MockNamedValue) {
        self.inputs.retain(|p| p.name() != parameter.name());
        self.inputs.push(parameter);
    }

    pub fn add_output(&mut self, output: ExpectedOutput) {
        self.outputs.retain(|o| o.name() != output.name());
        self.outputs.push(output);
    }

    pub fn set_object(&mut self, object: ObjectId) {
        self.object = Some(object);
    }

    pub fn set_call_order(&mut self, order: u32) {
        self.call_order = Some((order, order));
    }

    /// Each successive call must land on the next ordinal in `first..=last`.
    pub fn set_call_order_range(&mut self, first: u32, last: u32) {
        self.call_order = Some((first, last.max(first)));
    }

    pub(crate) fn set_strict_position(&mut self, position: u64) {
        self.strict_position = Some(position);
    }

    pub fn set_ignore_other_parameters(&mut self) {
        self.ignore_other_parameters = true;
    }

    pub fn set_return_value(&mut self, value: MockValue) {
        self.return_value = Some(value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self) -> Option<ObjectId> {
        self.object
    }

    pub fn inputs(&self) -> &[MockNamedValue] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ExpectedOutput] {
        &self.outputs
    }

    pub fn call_order(&self) -> Option<u32> {
        self.call_order.map(|(first, _)| first)
    }

    pub fn call_order_range(&self) -> Option<(u32, u32)> {
        self.call_order
    }

    pub fn strict_position(&self) -> Option<u64> {
        self.strict_position
    }

    /// Whether a call arriving at position `order` is in sequence.
    pub fn accepts_call_order(&self, order: u32) -> bool {
        match self.call_order {
            Some((first, last)) => first
                .checked_add(self.actual_calls)
                .is_some_and(|next| next == order && next <= last),
            None => true,
        }
    }

    pub(crate) fn accepts_position(&self, position: CallPosition) -> bool {
        let (lowest, highest) = position.sequence;
        self.accepts_call_order(position.ordinal)
            && self
                .strict_position
                .map_or(true, |strict| lowest <= strict && strict <= highest)
    }

    pub fn min_calls(&self) -> u32 {
        self.min_calls
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn actual_calls(&self) -> u32 {
        self.actual_calls
    }

    pub fn ignores_other_parameters(&self) -> bool {
        self.ignore_other_parameters
    }

    pub fn return_value(&self) -> Option<&MockValue> {
        self.return_value.as_ref()
    }

    pub fn input_parameter(&self, name: &str) -> Option<&MockNamedValue> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    pub fn has_input_parameter_with_name(&self, name: &str) -> bool {
        self.input_parameter(name).is_some()
    }

    pub fn has_output_parameter_with_name(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o.name() == name)
    }

    /// Called at least the minimum number of times.
    pub fn is_fulfilled(&self) -> bool {
        self.actual_calls >= self.min_calls
    }

    /// Still able to absorb another call.
    pub fn can_match_actual_calls(&self) -> bool {
        self.actual_calls < self.max_calls
    }

    pub(crate) fn call_was_made(&mut self) {
        self.actual_calls = self.actual_calls.saturating_add(1);
    }

    /// Whether this expectation accepts the given input `parameter` on its own.
    pub(crate) fn accepts_input(
        &self,
        parameter: &MockNamedValue,
        repository: &ComparatorRepository,
        missing: &mut Vec<String>,
    ) -> bool {
        match self.input_parameter(parameter.name()) {
            Some(expected) => match expected.value().equals(parameter.value(), repository) {
                Ok(equal) => equal,
                Err(type_name) => {
                    missing.push(type_name);
                    false
                }
            },
            None => self.ignore_other_parameters,
        }
    }

    pub(crate) fn accepts_output(&self, output: &OutputSpec) -> bool {
        match self.outputs.iter().find(|o| o.name() == output.name) {
            Some(expected) => match expected.type_name() {
                Some(type_name) => output.type_name.as_deref() == Some(type_name),
                None => true,
            },
            None => self.ignore_other_parameters,
        }
    }

    pub(crate) fn match_parameters(
        &self,
        call: &CallSignature<'_>,
        repository: &ComparatorRepository,
        missing: &mut Vec<String>,
    ) -> ParameterMatch {
        for input in call.inputs {
            if !self.accepts_input(input, repository, missing) {
                return ParameterMatch::InputMismatch;
            }
        }
        let all_inputs_given = self
            .inputs
            .iter()
            .all(|expected| call.inputs.iter().any(|actual| actual.name() == expected.name()));
        if !all_inputs_given {
            return ParameterMatch::InputMismatch;
        }

        if !call.outputs.iter().all(|output| self.accepts_output(output)) {
            return ParameterMatch::OutputMismatch;
        }
        let all_outputs_given = self
            .outputs
            .iter()
            .all(|expected| call.outputs.iter().any(|actual| actual.name == expected.name()));
        if !all_outputs_given {
            return ParameterMatch::OutputMismatch;
        }

        ParameterMatch::Matches
    }

    /// One-line description used in failure messages.
    pub fn call_to_string(&self, repository: &ComparatorRepository) -> String {
        let mut text = String::new();
        if let Some(object) = self.object {
            text.push_str(&format!("(object address: {object})::"));
        }
        text.push_str(&self.name);
        text.push_str(" -> ");
        match self.call_order {
            Some((first, last)) if first == last => {
                text.push_str(&format!("expected call order: <{first}> -> "));
            }
            Some((first, last)) => {
                text.push_str(&format!("expected calls order: <{first}..{last}> -> "));
            }
            None => {}
        }
        if let Some(position) = self.strict_position {
            text.push_str(&format!("strict order position: <{position}> -> "));
        }

        if self.inputs.is_empty() && self.outputs.is_empty() {
            text.push_str(if self.ignore_other_parameters {
                "all parameters ignored"
            } else {
                "no parameters"
            });
        } else {
            let mut parameters: Vec<String> = self
                .inputs
                .iter()
                .map(|p| format!("{} {}: <{}>", p.type_name(), p.name(), p.value().to_display_string(repository)))
                .collect();
            parameters.extend(self.outputs.iter().map(|o| {
                let type_name = o
                    .type_name()
                    .or_else(|| o.value().map(|v| v.type_name()))
                    .unwrap_or("unmodified");
                format!("{} {}: <output>", type_name, o.name())
            }));
            text.push_str(&parameters.join(", "));
            if self.ignore_other_parameters {
                text.push_str(", other parameters are ignored");
            }
        }

        text.push_str(&format!(" ({})", self.count_description()));
        text
    }

    fn count_description(&self) -> String {
        let called = format!(
            "called {} time{}",
            self.actual_calls,
            if self.actual_calls == 1 { "" } else { "s" }
        );
        if self.min_calls == self.max_calls {
            format!(
                "expected {} call{}, {}",
                self.min_calls,
                if self.min_calls == 1 { "" } else { "s" },
                called
            )
        } else {
            format!(
                "expected between {} and {} calls, {}",
                self.min_calls, self.max_calls, called
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_to_string_without_parameters() {
        let call = MockExpectedCall::new("foo");
        assert_eq!(
            call.call_to_string(&ComparatorRepository::new()),
            "foo -> no parameters (expected 1 call, called 0 times)"
        );
    }

    #[test]
    fn test_call_to_string_with_everything() {
        let mut call = MockExpectedCall::with_count("foo", 2, 2);
        call.set_object(ObjectId(0x10));
        call.set_call_order(3);
        call.add_input(MockNamedValue::new("a", MockValue::Int(1)));
        call.add_output(ExpectedOutput::new("out", None, Some(MockValue::Int(2))));
        call.set_ignore_other_parameters();
        call.call_was_made();

        assert_eq!(
            call.call_to_string(&ComparatorRepository::new()),
            "(object address: 0x10)::foo -> expected call order: <3> -> i32 a: <1 (0x1)>, i32 out: <output>, other parameters are ignored (expected 2 calls, called 1 time)"
        );
    }

    #[test]
    fn test_call_to_string_range() {
        let mut call = MockExpectedCall::with_count("foo", 1, 3);
        call.set_ignore_other_parameters();
        assert_eq!(
            call.call_to_string(&ComparatorRepository::new()),
            "foo -> all parameters ignored (expected between 1 and 3 calls, called 0 times)"
        );
    }

    #[test]
    fn test_fulfilment() {
        let mut call = MockExpectedCall::with_count("foo", 1, 2);
        assert!(!call.is_fulfilled());
        call.call_was_made();
        assert!(call.is_fulfilled());
        assert!(call.can_match_actual_calls());
        call.call_was_made();
        assert!(!call.can_match_actual_calls());
    }

    #[test]
    fn test_call_order_range_advances() {
        let mut call = MockExpectedCall::with_count("foo", 2, 2);
        call.set_call_order_range(3, 4);
        assert!(!call.accepts_call_order(4));
        assert!(call.accepts_call_order(3));
        call.call_was_made();
        assert!(call.accepts_call_order(4));
        assert!(call
            .call_to_string(&ComparatorRepository::new())
            .starts_with("foo -> expected calls order: <3..4> -> "));
    }

    #[test]
    fn test_call_order_near_the_top_of_the_range() {
        let mut call = MockExpectedCall::with_count("foo", 0, u32::MAX);
        call.set_call_order_range(u32::MAX, u32::MAX);
        assert!(call.accepts_call_order(u32::MAX));
        call.call_was_made();
        assert!(!call.accepts_call_order(u32::MAX));
    }

    #[test]
    fn test_strict_position_must_be_inside_the_window() {
        let mut call = MockExpectedCall::new("foo");
        call.set_strict_position(3);
        let position = |sequence| CallPosition { ordinal: 1, sequence };

        assert!(call.accepts_position(position((0, 3))));
        assert!(call.accepts_position(position((3, u64::MAX))));
        assert!(!call.accepts_position(position((0, 2))));
        assert!(!call.accepts_position(position((4, u64::MAX))));
        assert!(MockExpectedCall::new("bar").accepts_position(position((4, 4))));
    }

    #[test]
    fn test_parameter_matching() {
        let repository = ComparatorRepository::new();
        let mut call = MockExpectedCall::new("foo");
        call.add_input(MockNamedValue::new("a", MockValue::Int(1)));

        let matching = [MockNamedValue::new("a", MockValue::Int(1))];
        let other_value = [MockNamedValue::new("a", MockValue::Int(2))];
        let extra = [
            MockNamedValue::new("a", MockValue::Int(1)),
            MockNamedValue::new("b", MockValue::Int(1)),
        ];
        fn signature(inputs: &[MockNamedValue]) -> CallSignature<'_> {
            CallSignature {
                name: "foo",
                object: None,
                inputs,
                outputs: &[],
            }
        }
        let mut missing = Vec::new();

        assert_eq!(
            call.match_parameters(&signature(&matching), &repository, &mut missing),
            ParameterMatch::Matches
        );
        assert_eq!(
            call.match_parameters(&signature(&other_value), &repository, &mut missing),
            ParameterMatch::InputMismatch
        );
        assert_eq!(
            call.match_parameters(&signature(&extra), &repository, &mut missing),
            ParameterMatch::InputMismatch
        );
        assert_eq!(
            call.match_parameters(&signature(&[]), &repository, &mut missing),
            ParameterMatch::InputMismatch
        );

        call.set_ignore_other_parameters();
        assert_eq!(
            call.match_parameters(&signature(&extra), &repository, &mut missing),
            ParameterMatch::Matches
        );
    }
}
