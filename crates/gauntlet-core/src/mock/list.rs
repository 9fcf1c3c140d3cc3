//! The ordered list of expectations in one scope, and call matching.

use crate::mock::expected::{CallPosition, CallSignature, MockExpectedCall, ParameterMatch};
use crate::mock::value::ComparatorRepository;

/// Why no expectation accepted an actual call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchFailure {
    /// No expectation has the call's name.
    UnknownName,
    /// Every expectation with the name is already exhausted.
    Exhausted,
    /// The call was made on an object no expectation allows.
    WrongObject,
    /// The call named no object but every expectation requires one.
    MissingObject,
    /// The call arrived at a different position than expected.
    OutOfOrder,
    /// Input parameters did not line up.
    Inputs,
    /// Output parameters did not line up.
    Outputs,
}

/// Expectations in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MockExpectedCallsList {
    calls: Vec<MockExpectedCall>,
}

impl MockExpectedCallsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation, returning its index.
    pub fn add_expected_call(&mut self, call: MockExpectedCall) -> usize {
        self.calls.push(call);
        self.calls.len() - 1
    }

    /// Append copies of every expectation in `other`.
    pub fn add_expectations(&mut self, other: &MockExpectedCallsList) {
        self.calls.extend(other.calls.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MockExpectedCall> {
        self.calls.iter()
    }

    pub fn get(&self, index: usize) -> Option<&MockExpectedCall> {
        self.calls.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut MockExpectedCall> {
        self.calls.get_mut(index)
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn amount_of_expectations_for(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| c.name() == name).count()
    }

    pub fn amount_of_unfulfilled_expectations(&self) -> usize {
        self.calls.iter().filter(|c| !c.is_fulfilled()).count()
    }

    pub fn has_unfulfilled_expectations(&self) -> bool {
        self.calls.iter().any(|c| !c.is_fulfilled())
    }

    pub fn has_expectation_with_name(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c.name() == name)
    }

    /// Total calls already absorbed by expectations called `name`.
    pub fn amount_of_actual_calls_fulfilled_for(&self, name: &str) -> u32 {
        self.calls
            .iter()
            .filter(|c| c.name() == name)
            .map(|c| c.actual_calls())
            .sum()
    }

    pub(crate) fn unfulfilled_calls_to_string(&self, prefix: &str, repository: &ComparatorRepository) -> String {
        calls_to_string(self.calls.iter().filter(|c| !c.is_fulfilled()), prefix, repository)
    }

    pub(crate) fn fulfilled_calls_to_string(&self, prefix: &str, repository: &ComparatorRepository) -> String {
        calls_to_string(self.calls.iter().filter(|c| c.is_fulfilled()), prefix, repository)
    }

    /// Only the expectations called `name`.
    pub(crate) fn related_to(&self, name: &str) -> MockExpectedCallsList {
        Self {
            calls: self.calls.iter().filter(|c| c.name() == name).cloned().collect(),
        }
    }

    /// Find the expectation an actual call should be charged to.
    ///
    /// Candidates are narrowed by name, remaining capacity, object, and call
    /// order, then the first one whose parameters match wins. Custom types
    /// without a comparator are collected into `missing`.
    pub(crate) fn find_match(
        &self,
        call: &CallSignature<'_>,
        position: CallPosition,
        repository: &ComparatorRepository,
        missing: &mut Vec<String>,
    ) -> Result<usize, MatchFailure> {
        let named: Vec<usize> = self
            .calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name() == call.name)
            .map(|(i, _)| i)
            .collect();
        if named.is_empty() {
            return Err(MatchFailure::UnknownName);
        }

        let open: Vec<usize> = named
            .into_iter()
            .filter(|&i| self.calls[i].can_match_actual_calls())
            .collect();
        if open.is_empty() {
            return Err(MatchFailure::Exhausted);
        }

        let on_object: Vec<usize> = open
            .into_iter()
            .filter(|&i| match (self.calls[i].object(), call.object) {
                (None, _) => true,
                (Some(expected), Some(actual)) => expected == actual,
                (Some(_), None) => false,
            })
            .collect();
        if on_object.is_empty() {
            return Err(if call.object.is_some() {
                MatchFailure::WrongObject
            } else {
                MatchFailure::MissingObject
            });
        }

        let in_order: Vec<usize> = on_object
            .into_iter()
            .filter(|&i| self.calls[i].accepts_position(position))
            .collect();
        if in_order.is_empty() {
            return Err(MatchFailure::OutOfOrder);
        }

        let mut output_mismatch = false;
        for index in in_order {
            match self.calls[index].match_parameters(call, repository, missing) {
                ParameterMatch::Matches => return Ok(index),
                ParameterMatch::InputMismatch => {}
                ParameterMatch::OutputMismatch => output_mismatch = true,
            }
        }
        Err(if output_mismatch {
            MatchFailure::Outputs
        } else {
            MatchFailure::Inputs
        })
    }
}

fn calls_to_string<'c>(
    calls: impl Iterator<Item = &'c MockExpectedCall>,
    prefix: &str,
    repository: &ComparatorRepository,
) -> String {
    let lines: Vec<String> = calls
        .map(|call| format!("{prefix}{}", call.call_to_string(repository)))
        .collect();
    if lines.is_empty() {
        format!("{prefix}<none>")
    } else {
        lines.join("\n")
    }
}
