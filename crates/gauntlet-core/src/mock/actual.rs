//! The production-code side: one actual call, checked when it completes.

use std::any::Any;

use tracing::trace;

use crate::mock::expected::OutputSpec;
use crate::mock::support::{self, with_mock};
use crate::mock::value::{MockNamedValue, MockValue, ObjectId};

/// How an actual call is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Matched against expectations.
    Checked,
    /// Accepted without checking (scope disabled or other calls ignored).
    Ignored,
    /// Only written to the call trace.
    Traced,
}

/// An output slot the call was given.
pub(crate) struct ActualOutput<'a> {
    pub(crate) spec: OutputSpec,
    pub(crate) target: &'a mut dyn Any,
}

/// One call made by production code.
///
/// Parameters are added fluently; the call is checked by the first terminal
/// method (`return_*`, [`has_return_value`](Self::has_return_value),
/// [`check`](Self::check)) or, failing that, when it is dropped.
///
/// ```ignore
/// fn read_sensor(id: i32) -> i32 {
///     mock().actual_call("read_sensor").with_parameter("id", id).return_int_value_or_default(0)
/// }
/// ```
pub struct ActualCall<'a> {
    scope: String,
    name: String,
    mode: CallMode,
    call_order: u32,
    object: Option<ObjectId>,
    inputs: Vec<MockNamedValue>,
    outputs: Vec<ActualOutput<'a>>,
    outcome: Option<Option<MockValue>>,
}

impl<'a> ActualCall<'a> {
    pub(crate) fn new(scope: String, name: String, mode: CallMode, call_order: u32) -> Self {
        trace!(call = %name, ?mode, call_order, "actual call");
        Self {
            scope,
            name,
            mode,
            call_order,
            object: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            outcome: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> CallMode {
        self.mode
    }

    pub fn on_object<T: ?Sized>(mut self, object: &T) -> Self {
        self.object = Some(ObjectId::of(object));
        self
    }

    pub fn on_object_id(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<MockValue>) -> Self {
        self.inputs.push(MockNamedValue::new(name, value.into()));
        self
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

    /// A slot the matched expectation may write into.
    pub fn with_output_parameter(mut self, name: &str, target: &'a mut dyn Any) -> Self {
        self.outputs.push(ActualOutput {
            spec: OutputSpec {
                name: name.to_string(),
                type_name: None,
            },
            target,
        });
        self
    }

    pub fn with_output_parameter_of_type(mut self, type_name: &str, name: &str, target: &'a mut dyn Any) -> Self {
        self.outputs.push(ActualOutput {
            spec: OutputSpec {
                name: name.to_string(),
                type_name: Some(type_name.to_string()),
            },
            target,
        });
        self
    }

    /// Check the call now.
    pub fn check(mut self) {
        self.finish();
    }

    pub fn has_return_value(&mut self) -> bool {
        self.finish().is_some()
    }

    pub fn return_value(mut self) -> Option<MockValue> {
        self.finish()
    }

    pub fn return_bool_value(self) -> bool {
        self.return_value().and_then(|v| v.as_bool()).unwrap_or_default()
    }

    pub fn return_bool_value_or_default(self, default: bool) -> bool {
        self.return_value().and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn return_int_value(self) -> i32 {
        self.return_value().and_then(|v| v.as_int()).unwrap_or_default()
    }

    pub fn return_int_value_or_default(self, default: i32) -> i32 {
        self.return_value().and_then(|v| v.as_int()).unwrap_or(default)
    }

    pub fn return_unsigned_int_value(self) -> u32 {
        self.return_value().and_then(|v| v.as_unsigned_int()).unwrap_or_default()
    }

    pub fn return_unsigned_int_value_or_default(self, default: u32) -> u32 {
        self.return_value().and_then(|v| v.as_unsigned_int()).unwrap_or(default)
    }

    pub fn return_long_int_value(self) -> i64 {
        self.return_value().and_then(|v| v.as_long_int()).unwrap_or_default()
    }

    pub fn return_long_int_value_or_default(self, default: i64) -> i64 {
        self.return_value().and_then(|v| v.as_long_int()).unwrap_or(default)
    }

    pub fn return_unsigned_long_int_value(self) -> u64 {
        self.return_value().and_then(|v| v.as_unsigned_long_int()).unwrap_or_default()
    }

    pub fn return_unsigned_long_int_value_or_default(self, default: u64) -> u64 {
        self.return_value().and_then(|v| v.as_unsigned_long_int()).unwrap_or(default)
    }

    pub fn return_double_value(self) -> f64 {
        self.return_value().and_then(|v| v.as_double()).unwrap_or_default()
    }

    pub fn return_double_value_or_default(self, default: f64) -> f64 {
        self.return_value().and_then(|v| v.as_double()).unwrap_or(default)
    }

    pub fn return_string_value(self) -> String {
        self.return_string_value_or_default("")
    }

    pub fn return_string_value_or_default(self, default: &str) -> String {
        match self.return_value() {
            Some(MockValue::String(s)) => s,
            _ => default.to_string(),
        }
    }

    pub fn return_pointer_value(self) -> usize {
        self.return_value().and_then(|v| v.as_pointer()).unwrap_or_default()
    }

    pub fn return_pointer_value_or_default(self, default: usize) -> usize {
        self.return_value().and_then(|v| v.as_pointer()).unwrap_or(default)
    }

    pub fn return_const_pointer_value(self) -> usize {
        self.return_value().and_then(|v| v.as_const_pointer()).unwrap_or_default()
    }

    pub fn return_const_pointer_value_or_default(self, default: usize) -> usize {
        self.return_value().and_then(|v| v.as_const_pointer()).unwrap_or(default)
    }

    pub fn return_function_pointer_value(self) -> usize {
        self.return_value().and_then(|v| v.as_function_pointer()).unwrap_or_default()
    }

    pub fn return_function_pointer_value_or_default(self, default: usize) -> usize {
        self.return_value().and_then(|v| v.as_function_pointer()).unwrap_or(default)
    }

    fn finish(&mut self) -> Option<MockValue> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        // Recorded before checking so a failure that unwinds from here does
        // not get the call checked again on drop.
        self.outcome = Some(None);

        let value = match self.mode {
            CallMode::Ignored => None,
            CallMode::Traced => {
                let line = self.trace_line();
                with_mock(|support| support.record_trace(&line));
                None
            }
            CallMode::Checked => {
                let (value, failures) = with_mock(|support| {
                    support.resolve_actual_call(
                        &self.scope,
                        &self.name,
                        self.object,
                        self.call_order,
                        &self.inputs,
                        &mut self.outputs,
                    )
                });
                self.outcome = Some(value.clone());
                support::report_failures(failures);
                value
            }
        };
        self.outcome = Some(value.clone());
        value
    }

    fn trace_line(&self) -> String {
        let mut line = format!("\nFunction name:{}", self.name);
        if let Some(object) = self.object {
            line.push_str(&format!(" onObject:{object}"));
        }
        for input in &self.inputs {
            match input.value().custom_address() {
                Some(address) => {
                    line.push_str(&format!(" {} {}:0x{:x}", input.type_name(), input.name(), address));
                }
                None => line.push_str(&format!(" {}:{}", input.name(), input.value())),
            }
        }
        for output in &self.outputs {
            let address = (&*output.target as *const dyn Any).cast::<()>() as usize;
            line.push_str(&format!(" {}:0x{:x}", output.spec.name, address));
        }
        line
    }
}

impl Drop for ActualCall<'_> {
    fn drop(&mut self) {
        if self.outcome.is_none() && !std::thread::panicking() {
            self.finish();
        }
    }
}

impl std::fmt::Debug for ActualCall<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActualCall")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("object", &self.object)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}
