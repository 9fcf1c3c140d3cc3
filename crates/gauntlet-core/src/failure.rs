//! Assertion failures and how their messages are rendered.
//!
//! A [`TestFailure`] is an immutable value: it is built at the point where an
//! assertion fails, handed to the [`TestResult`](crate::TestResult), and never
//! changed afterwards.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::mock::{MockFailure, MockFailureKind};
use crate::shell::TestIdentity;

/// Width of the excerpt shown around the first differing character.
const DIFFERENCE_WINDOW: usize = 20;

/// What produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Fail,
    Equals,
    CheckEqual,
    Check,
    Contains,
    StringEqual,
    StringEqualNoCase,
    LongsEqual,
    UnsignedLongsEqual,
    DoublesEqual,
    BinaryEqual,
    BitsEqual,
    FeatureUnsupported,
    UnexpectedException,
    MemoryLeak,
    SeparateProcess,
    Mock(MockFailureKind),
}

/// A single failure, attributed to a test and a source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFailure {
    kind: FailureKind,
    test: TestIdentity,
    file: String,
    line: u32,
    message: String,
}

impl TestFailure {
    /// A plain failure with a free-form message.
    pub fn new(test: &TestIdentity, file: &str, line: u32, message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Fail, test, file, line, message.into())
    }

    /// A failure located at the test's own declaration.
    pub fn at_test(test: &TestIdentity, message: impl Into<String>) -> Self {
        Self::new(test, &test.file, test.line, message)
    }

    fn with_kind(kind: FailureKind, test: &TestIdentity, file: &str, line: u32, message: String) -> Self {
        Self {
            kind,
            test: test.clone(),
            file: file.to_string(),
            line,
            message,
        }
    }

    pub fn fail(test: &TestIdentity, file: &str, line: u32, text: &str) -> Self {
        Self::new(test, file, line, text)
    }

    /// `CHECK(condition) failed`, optionally prefixed by a user message.
    pub fn check(
        test: &TestIdentity,
        file: &str,
        line: u32,
        check_name: &str,
        condition: &str,
        text: Option<&str>,
    ) -> Self {
        let message = format!("{}{}({}) failed", user_text(text), check_name, condition);
        Self::with_kind(FailureKind::Check, test, file, line, message)
    }

    pub fn equals(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: &str,
        actual: &str,
        text: Option<&str>,
    ) -> Self {
        let message = format!("{}{}", user_text(text), but_was(expected, actual));
        Self::with_kind(FailureKind::Equals, test, file, line, message)
    }

    /// Like [`equals`](Self::equals) but also points at the first difference.
    pub fn check_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: &str,
        actual: &str,
        text: Option<&str>,
    ) -> Self {
        let message = format!("{}{}", user_text(text), string_difference(expected, actual, false));
        Self::with_kind(FailureKind::CheckEqual, test, file, line, message)
    }

    pub fn contains(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: &str,
        actual: &str,
        text: Option<&str>,
    ) -> Self {
        let message = format!(
            "{}actual <{}>\n\tdid not contain  <{}>",
            user_text(text),
            actual,
            expected
        );
        Self::with_kind(FailureKind::Contains, test, file, line, message)
    }

    pub fn string_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: &str,
        actual: &str,
        text: Option<&str>,
    ) -> Self {
        let message = format!("{}{}", user_text(text), string_difference(expected, actual, false));
        Self::with_kind(FailureKind::StringEqual, test, file, line, message)
    }

    pub fn string_equal_no_case(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: &str,
        actual: &str,
        text: Option<&str>,
    ) -> Self {
        let message = format!("{}{}", user_text(text), string_difference(expected, actual, true));
        Self::with_kind(FailureKind::StringEqualNoCase, test, file, line, message)
    }

    /// Signed comparison, rendered as `decimal (0xhex)` with aligned decimals.
    pub fn longs_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: i64,
        actual: i64,
        text: Option<&str>,
    ) -> Self {
        let (e, a) = pad_to_same_length(expected.to_string(), actual.to_string());
        let message = format!(
            "{}{}",
            user_text(text),
            but_was(&format!("{e} (0x{expected:x})"), &format!("{a} (0x{actual:x})"))
        );
        Self::with_kind(FailureKind::LongsEqual, test, file, line, message)
    }

    pub fn unsigned_longs_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: u64,
        actual: u64,
        text: Option<&str>,
    ) -> Self {
        let (e, a) = pad_to_same_length(expected.to_string(), actual.to_string());
        let message = format!(
            "{}{}",
            user_text(text),
            but_was(&format!("{e} (0x{expected:x})"), &format!("{a} (0x{actual:x})"))
        );
        Self::with_kind(FailureKind::UnsignedLongsEqual, test, file, line, message)
    }

    pub fn doubles_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: f64,
        actual: f64,
        threshold: f64,
        text: Option<&str>,
    ) -> Self {
        let mut message = format!(
            "{}{} threshold used was <{}>",
            user_text(text),
            but_was(&format_double(expected), &format_double(actual)),
            format_double(threshold)
        );
        if expected.is_nan() || actual.is_nan() || threshold.is_nan() {
            message.push_str("\n\tCannot make comparisons with Nan");
        }
        Self::with_kind(FailureKind::DoublesEqual, test, file, line, message)
    }

    /// Byte buffers, rendered as space separated hex.
    pub fn binary_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: &[u8],
        actual: &[u8],
        text: Option<&str>,
    ) -> Self {
        let expected_hex = hex_bytes(expected);
        let actual_hex = hex_bytes(actual);
        let start = expected.iter().zip(actual).take_while(|(e, a)| e == a).count();
        let message = format!(
            "{}{}{}",
            user_text(text),
            but_was(&expected_hex, &actual_hex),
            difference_at(&actual_hex, start * 3 + 1, start)
        );
        Self::with_kind(FailureKind::BinaryEqual, test, file, line, message)
    }

    /// Bit patterns; bits outside `mask` are shown as `x`.
    #[allow(clippy::too_many_arguments)]
    pub fn bits_equal(
        test: &TestIdentity,
        file: &str,
        line: u32,
        expected: u64,
        actual: u64,
        mask: u64,
        byte_count: usize,
        text: Option<&str>,
    ) -> Self {
        let message = format!(
            "{}{}",
            user_text(text),
            but_was(
                &masked_bits(expected, mask, byte_count),
                &masked_bits(actual, mask, byte_count)
            )
        );
        Self::with_kind(FailureKind::BitsEqual, test, file, line, message)
    }

    pub fn feature_unsupported(test: &TestIdentity, file: &str, line: u32, feature: &str) -> Self {
        let message = format!(
            "The feature \"{feature}\" is not supported in this environment or with the feature set selected when building the library."
        );
        Self::with_kind(FailureKind::FeatureUnsupported, test, file, line, message)
    }

    /// A panic that was not raised by the framework itself.
    pub fn unexpected_panic(test: &TestIdentity, file: &str, line: u32, panic_message: Option<&str>) -> Self {
        let message = match panic_message {
            Some(text) => format!("Unexpected panic was raised: {text}"),
            None => "Unexpected panic of unknown type was raised.".to_string(),
        };
        Self::with_kind(FailureKind::UnexpectedException, test, file, line, message)
    }

    pub fn memory_leak(test: &TestIdentity, report: &str) -> Self {
        Self::with_kind(FailureKind::MemoryLeak, test, &test.file, test.line, report.to_string())
    }

    pub fn separate_process(test: &TestIdentity, reason: &str) -> Self {
        Self::with_kind(FailureKind::SeparateProcess, test, &test.file, test.line, reason.to_string())
    }

    pub fn mock(test: &TestIdentity, failure: &MockFailure) -> Self {
        Self::with_kind(
            FailureKind::Mock(failure.kind()),
            test,
            &test.file,
            test.line,
            failure.message().to_string(),
        )
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn test(&self) -> &TestIdentity {
        &self.test
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the failure was raised in a helper outside the test's file.
    pub fn is_outside_test_file(&self) -> bool {
        self.file != self.test.file
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: error: Failure in {}\n\t{}",
            self.file, self.line, self.test, self.message
        )
    }
}

/// Compares two doubles the way every doubles assertion does.
///
/// NaN never compares equal; two infinities always do.
pub fn doubles_equal(d1: f64, d2: f64, threshold: f64) -> bool {
    if d1.is_nan() || d2.is_nan() || threshold.is_nan() {
        return false;
    }
    if d1.is_infinite() && d2.is_infinite() {
        return true;
    }
    (d1 - d2).abs() <= threshold
}

fn user_text(text: Option<&str>) -> String {
    match text {
        Some(text) if !text.is_empty() => format!("Message: {text}\n\t"),
        _ => String::new(),
    }
}

fn but_was(expected: &str, actual: &str) -> String {
    format!("expected <{expected}>\n\tbut was  <{actual}>")
}

fn string_difference(expected: &str, actual: &str, ignore_case: bool) -> String {
    let printable_expected = printable(expected);
    let printable_actual = printable(actual);
    let (start, printable_start) = if ignore_case {
        (
            common_prefix(&expected.to_lowercase(), &actual.to_lowercase()),
            common_prefix(&printable_expected.to_lowercase(), &printable_actual.to_lowercase()),
        )
    } else {
        (
            common_prefix(expected, actual),
            common_prefix(&printable_expected, &printable_actual),
        )
    };
    format!(
        "{}{}",
        but_was(&printable_expected, &printable_actual),
        difference_at(&printable_actual, printable_start, start)
    )
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Renders the excerpt of `actual` starting at `offset` (in a view padded by
/// half a window on both sides) followed by a caret line.
fn difference_at(actual: &str, offset: usize, reported_position: usize) -> String {
    let half = DIFFERENCE_WINDOW / 2;
    let padding = " ".repeat(half);
    let window: String = padding
        .chars()
        .chain(actual.chars())
        .chain(padding.chars())
        .skip(offset)
        .take(DIFFERENCE_WINDOW)
        .collect();
    let prefix = format!("difference starts at position {reported_position} at: <");
    format!(
        "\n\t{prefix}{window}>\n\t{}^",
        " ".repeat(prefix.len() + half)
    )
}

/// Escapes control characters so messages stay on one line.
pub(crate) fn printable(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn pad_to_same_length(a: String, b: String) -> (String, String) {
    let width = a.len().max(b.len());
    (format!("{a:>width$}"), format!("{b:>width$}"))
}

pub(crate) fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn masked_bits(value: u64, mask: u64, byte_count: usize) -> String {
    let bit_count = (byte_count * 8).min(64);
    let mut out = String::with_capacity(bit_count + bit_count / 8);
    for i in 0..bit_count {
        let bit = 1u64 << (bit_count - 1 - i);
        if mask & bit == 0 {
            out.push('x');
        } else if value & bit != 0 {
            out.push('1');
        } else {
            out.push('0');
        }
        if i % 8 == 7 && i != bit_count - 1 {
            out.push(' ');
        }
    }
    out
}

/// Renders a double with seven significant digits, `%g` style.
pub(crate) fn format_double(value: f64) -> String {
    const PRECISION: i32 = 7;

    if value.is_nan() {
        return "Nan - Not a number".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "Inf - Positive infinity".to_string()
        } else {
            "-Inf - Negative infinity".to_string()
        };
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{value:.decimals$}"))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> TestIdentity {
        TestIdentity::new("Group", "test", "failingTestFile", 1)
    }

    #[test]
    fn test_check_failure_with_text() {
        let f = TestFailure::check(&identity(), "file", 2, "CHECK", "chk", Some("text"));
        assert_eq!(f.message(), "Message: text\n\tCHECK(chk) failed");
    }

    #[test]
    fn test_equals_failure() {
        let f = TestFailure::equals(&identity(), "file", 2, "expected", "actual", None);
        assert_eq!(f.message(), "expected <expected>\n\tbut was  <actual>");
    }

    #[test]
    fn test_check_equal_points_at_difference() {
        let f = TestFailure::check_equal(&identity(), "file", 2, "expected", "actual", None);
        assert_eq!(
            f.message(),
            "expected <expected>\n\tbut was  <actual>\n\tdifference starts at position 0 at: <          actual    >\n\t                                               ^"
        );
    }

    #[test]
    fn test_string_equal_difference_window() {
        let f = TestFailure::string_equal(&identity(), "file", 2, "abc", "abd", None);
        assert_eq!(
            f.message(),
            "expected <abc>\n\tbut was  <abd>\n\tdifference starts at position 2 at: <        abd         >\n\t                                               ^"
        );
    }

    #[test]
    fn test_string_equal_escapes_control_characters() {
        let f = TestFailure::string_equal(
            &identity(),
            "file",
            2,
            "StringWith\t\nDifferentString",
            "StringWith\t\ndifferentString",
            None,
        );
        assert_eq!(
            f.message(),
            "expected <StringWith\\t\\nDifferentString>\n\tbut was  <StringWith\\t\\ndifferentString>\n\tdifference starts at position 12 at: <ngWith\\t\\ndifferentS>\n\t                                                ^"
        );
    }

    #[test]
    fn test_longs_equal_shows_hex_and_aligns() {
        let f = TestFailure::longs_equal(&identity(), "file", 2, 1, 2, None);
        assert_eq!(f.message(), "expected <1 (0x1)>\n\tbut was  <2 (0x2)>");

        let f = TestFailure::longs_equal(&identity(), "file", 2, 10, 2, None);
        assert_eq!(f.message(), "expected <10 (0xa)>\n\tbut was  < 2 (0x2)>");
    }

    #[test]
    fn test_doubles_equal_failure() {
        let f = TestFailure::doubles_equal(&identity(), "file", 2, 1.0, 2.0, 3.0, None);
        assert_eq!(
            f.message(),
            "expected <1>\n\tbut was  <2> threshold used was <3>"
        );
    }

    #[test]
    fn test_doubles_equal_failure_mentions_nan() {
        let f = TestFailure::doubles_equal(&identity(), "file", 2, f64::NAN, 2.0, 3.0, None);
        assert!(f.message().ends_with("\n\tCannot make comparisons with Nan"));
        assert!(f.message().contains("Nan - Not a number"));
    }

    #[test]
    fn test_binary_equal_failure() {
        let f = TestFailure::binary_equal(&identity(), "file", 2, &[0x00, 0x01], &[0x00, 0x02], None);
        assert_eq!(
            f.message(),
            "expected <00 01>\n\tbut was  <00 02>\n\tdifference starts at position 1 at: <      00 02         >\n\t                                               ^"
        );
    }

    #[test]
    fn test_bits_equal_masks_bits() {
        let f = TestFailure::bits_equal(&identity(), "file", 2, 0x0001, 0x0003, 0xFFFF, 2, None);
        assert_eq!(
            f.message(),
            "expected <00000000 00000001>\n\tbut was  <00000000 00000011>"
        );

        let f = TestFailure::bits_equal(&identity(), "file", 2, 0x0001, 0x0003, 0x00FF, 2, None);
        assert_eq!(
            f.message(),
            "expected <xxxxxxxx 00000001>\n\tbut was  <xxxxxxxx 00000011>"
        );
    }

    #[test]
    fn test_feature_unsupported() {
        let f = TestFailure::feature_unsupported(&identity(), "file", 2, "SOME_FEATURE");
        assert_eq!(
            f.message(),
            "The feature \"SOME_FEATURE\" is not supported in this environment or with the feature set selected when building the library."
        );
    }

    #[test]
    fn test_unexpected_panic_messages() {
        let known = TestFailure::unexpected_panic(&identity(), "file", 2, Some("boom"));
        assert_eq!(known.message(), "Unexpected panic was raised: boom");

        let unknown = TestFailure::unexpected_panic(&identity(), "file", 2, None);
        assert_eq!(unknown.message(), "Unexpected panic of unknown type was raised.");
    }

    #[test]
    fn test_display_and_location() {
        let f = TestFailure::fail(&identity(), "helper.rs", 7, "boom");
        assert!(f.is_outside_test_file());
        assert_eq!(
            f.to_string(),
            "helper.rs:7: error: Failure in TEST(Group, test)\n\tboom"
        );
    }

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(0.1 + 0.2), "0.3");
        assert_eq!(format_double(12345678.0), "1.234568e+07");
        assert_eq!(format_double(0.00001), "1e-05");
    }

    #[test]
    fn test_doubles_equal_semantics() {
        assert!(doubles_equal(1.0, 1.001, 0.01));
        assert!(!doubles_equal(1.0, 1.1, 0.05));
        assert!(!doubles_equal(f64::NAN, 1.0, 1.0));
        assert!(doubles_equal(f64::INFINITY, f64::INFINITY, 0.0));
    }
}
