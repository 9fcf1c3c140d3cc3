//! Typed values carried by expectations and actual calls.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::config::DEFAULT_DOUBLE_TOLERANCE;
use crate::failure::{doubles_equal, format_double, hex_bytes};

/// Address of an object a call is made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

impl ObjectId {
    pub fn of<T: ?Sized>(object: &T) -> Self {
        Self((object as *const T).cast::<()>() as usize)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// A parameter, output, return, or data value.
///
/// Equality is type-exact: an `Int(1)` never equals a `LongInt(1)`.
#[derive(Clone)]
pub enum MockValue {
    Bool(bool),
    Int(i32),
    UnsignedInt(u32),
    LongInt(i64),
    UnsignedLongInt(u64),
    Double { value: f64, tolerance: f64 },
    String(String),
    Pointer(usize),
    ConstPointer(usize),
    FunctionPointer(usize),
    MemoryBuffer(Vec<u8>),
    /// A user type, compared and copied through the handlers installed for
    /// `type_name`.
    Custom { type_name: String, value: Rc<dyn Any> },
}

impl MockValue {
    pub fn double(value: f64, tolerance: f64) -> Self {
        Self::Double { value, tolerance }
    }

    pub fn pointer<T: ?Sized>(ptr: *const T) -> Self {
        Self::Pointer(ptr.cast::<()>() as usize)
    }

    pub fn const_pointer<T: ?Sized>(ptr: *const T) -> Self {
        Self::ConstPointer(ptr.cast::<()>() as usize)
    }

    pub fn function_pointer(address: usize) -> Self {
        Self::FunctionPointer(address)
    }

    pub fn custom<T: Any>(type_name: impl Into<String>, value: T) -> Self {
        Self::Custom {
            type_name: type_name.into(),
            value: Rc::new(value),
        }
    }

    /// Name of the value's type as shown in failure messages.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "i32",
            Self::UnsignedInt(_) => "u32",
            Self::LongInt(_) => "i64",
            Self::UnsignedLongInt(_) => "u64",
            Self::Double { .. } => "f64",
            Self::String(_) => "&str",
            Self::Pointer(_) => "*mut ()",
            Self::ConstPointer(_) => "*const ()",
            Self::FunctionPointer(_) => "fn()",
            Self::MemoryBuffer(_) => "&[u8]",
            Self::Custom { type_name, .. } => type_name,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_unsigned_int(&self) -> Option<u32> {
        match self {
            Self::UnsignedInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long_int(&self) -> Option<i64> {
        match self {
            Self::LongInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_unsigned_long_int(&self) -> Option<u64> {
        match self {
            Self::UnsignedLongInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<usize> {
        match self {
            Self::Pointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_const_pointer(&self) -> Option<usize> {
        match self {
            Self::ConstPointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_function_pointer(&self) -> Option<usize> {
        match self {
            Self::FunctionPointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_memory_buffer(&self) -> Option<&[u8]> {
        match self {
            Self::MemoryBuffer(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_custom<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom { value, .. } => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Compare two values. `Err` carries the custom type name when no
    /// comparator is installed for it.
    pub(crate) fn equals(&self, other: &MockValue, repository: &ComparatorRepository) -> Result<bool, String> {
        let equal = match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UnsignedInt(a), Self::UnsignedInt(b)) => a == b,
            (Self::LongInt(a), Self::LongInt(b)) => a == b,
            (Self::UnsignedLongInt(a), Self::UnsignedLongInt(b)) => a == b,
            (Self::Double { value: a, tolerance }, Self::Double { value: b, .. }) => {
                doubles_equal(*a, *b, *tolerance)
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            (Self::ConstPointer(a), Self::ConstPointer(b)) => a == b,
            (Self::FunctionPointer(a), Self::FunctionPointer(b)) => a == b,
            (Self::MemoryBuffer(a), Self::MemoryBuffer(b)) => a == b,
            (
                Self::Custom { type_name: ta, value: va },
                Self::Custom { type_name: tb, value: vb },
            ) => {
                if ta != tb {
                    return Ok(false);
                }
                match repository.comparator(ta) {
                    Some(comparator) => comparator.is_equal(va.as_ref(), vb.as_ref()),
                    None => return Err(ta.clone()),
                }
            }
            _ => false,
        };
        Ok(equal)
    }

    /// Write this value into a caller's output slot.
    ///
    /// Native values are copied when the slot has the matching Rust type.
    /// `Err` carries the custom type name when no copier is installed.
    pub(crate) fn copy_into(&self, slot: &mut dyn Any, repository: &ComparatorRepository) -> Result<bool, String> {
        fn put<T: Any>(slot: &mut dyn Any, value: T) -> bool {
            match slot.downcast_mut::<T>() {
                Some(target) => {
                    *target = value;
                    true
                }
                None => false,
            }
        }

        let copied = match self {
            Self::Bool(v) => put(slot, *v),
            Self::Int(v) => put(slot, *v),
            Self::UnsignedInt(v) => put(slot, *v),
            Self::LongInt(v) => put(slot, *v),
            Self::UnsignedLongInt(v) => put(slot, *v),
            Self::Double { value, .. } => put(slot, *value),
            Self::String(v) => put(slot, v.clone()),
            Self::Pointer(v) | Self::ConstPointer(v) | Self::FunctionPointer(v) => put(slot, *v),
            Self::MemoryBuffer(bytes) => match slot.downcast_mut::<Vec<u8>>() {
                Some(target) => {
                    target.clear();
                    target.extend_from_slice(bytes);
                    true
                }
                None => false,
            },
            Self::Custom { type_name, value } => match repository.copier(type_name) {
                Some(copier) => {
                    copier.copy(slot, value.as_ref());
                    true
                }
                None => return Err(type_name.clone()),
            },
        };
        Ok(copied)
    }

    /// Text shown in failure messages.
    pub(crate) fn to_display_string(&self, repository: &ComparatorRepository) -> String {
        match self {
            Self::Custom { type_name, value } => match repository.comparator(type_name) {
                Some(comparator) => comparator.value_to_string(value.as_ref()),
                None => format!("No comparator found for type: \"{type_name}\""),
            },
            other => other.to_string(),
        }
    }

    /// Address of a custom value, used by the call trace.
    pub(crate) fn custom_address(&self) -> Option<usize> {
        match self {
            Self::Custom { value, .. } => Some(Rc::as_ptr(value).cast::<()>() as usize),
            _ => None,
        }
    }
}

impl fmt::Display for MockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v} (0x{v:x})"),
            Self::UnsignedInt(v) => write!(f, "{v} (0x{v:x})"),
            Self::LongInt(v) => write!(f, "{v} (0x{v:x})"),
            Self::UnsignedLongInt(v) => write!(f, "{v} (0x{v:x})"),
            Self::Double { value, .. } => write!(f, "{}", format_double(*value)),
            Self::String(v) => write!(f, "{v}"),
            Self::Pointer(v) | Self::ConstPointer(v) | Self::FunctionPointer(v) => write!(f, "0x{v:x}"),
            Self::MemoryBuffer(bytes) => {
                write!(f, "Size = {} | HexContents = {}", bytes.len(), hex_bytes(bytes))
            }
            Self::Custom { type_name, value } => {
                write!(f, "{} at 0x{:x}", type_name, Rc::as_ptr(value).cast::<()>() as usize)
            }
        }
    }
}

impl fmt::Debug for MockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self)
    }
}

impl From<bool> for MockValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for MockValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for MockValue {
    fn from(value: u32) -> Self {
        Self::UnsignedInt(value)
    }
}

impl From<i64> for MockValue {
    fn from(value: i64) -> Self {
        Self::LongInt(value)
    }
}

impl From<u64> for MockValue {
    fn from(value: u64) -> Self {
        Self::UnsignedLongInt(value)
    }
}

impl From<f64> for MockValue {
    fn from(value: f64) -> Self {
        Self::double(value, DEFAULT_DOUBLE_TOLERANCE)
    }
}

impl From<&str> for MockValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MockValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&[u8]> for MockValue {
    fn from(value: &[u8]) -> Self {
        Self::MemoryBuffer(value.to_vec())
    }
}

impl From<Vec<u8>> for MockValue {
    fn from(value: Vec<u8>) -> Self {
        Self::MemoryBuffer(value)
    }
}

/// A value with a parameter name attached.
#[derive(Debug, Clone)]
pub struct MockNamedValue {
    name: String,
    value: MockValue,
}

impl MockNamedValue {
    pub fn new(name: impl Into<String>, value: MockValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MockValue {
        &self.value
    }

    pub fn type_name(&self) -> &str {
        self.value.type_name()
    }
}

/// Decides equality of, and renders, values of one custom type.
pub trait MockValueComparator {
    fn is_equal(&self, left: &dyn Any, right: &dyn Any) -> bool;

    fn value_to_string(&self, value: &dyn Any) -> String;
}

/// Copies a custom value into an output slot.
pub trait MockValueCopier {
    fn copy(&self, destination: &mut dyn Any, source: &dyn Any);
}

/// A comparator built from two plain functions.
pub struct FunctionComparator<T> {
    equal: fn(&T, &T) -> bool,
    describe: fn(&T) -> String,
}

impl<T> FunctionComparator<T> {
    pub fn new(equal: fn(&T, &T) -> bool, describe: fn(&T) -> String) -> Self {
        Self { equal, describe }
    }
}

impl<T: Any> MockValueComparator for FunctionComparator<T> {
    fn is_equal(&self, left: &dyn Any, right: &dyn Any) -> bool {
        match (left.downcast_ref::<T>(), right.downcast_ref::<T>()) {
            (Some(left), Some(right)) => (self.equal)(left, right),
            _ => false,
        }
    }

    fn value_to_string(&self, value: &dyn Any) -> String {
        value
            .downcast_ref::<T>()
            .map(self.describe)
            .unwrap_or_else(|| "<value of another type>".to_string())
    }
}

/// A copier built from a plain function.
pub struct FunctionCopier<T> {
    copy: fn(&mut T, &T),
}

impl<T> FunctionCopier<T> {
    pub fn new(copy: fn(&mut T, &T)) -> Self {
        Self { copy }
    }
}

impl<T: Any> MockValueCopier for FunctionCopier<T> {
    fn copy(&self, destination: &mut dyn Any, source: &dyn Any) {
        if let (Some(destination), Some(source)) =
            (destination.downcast_mut::<T>(), source.downcast_ref::<T>())
        {
            (self.copy)(destination, source);
        }
    }
}

/// Comparators and copiers by custom type name.
#[derive(Clone, Default)]
pub struct ComparatorRepository {
    comparators: BTreeMap<String, Rc<dyn MockValueComparator>>,
    copiers: BTreeMap<String, Rc<dyn MockValueCopier>>,
}

impl ComparatorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_comparator(
        &mut self,
        type_name: impl Into<String>,
        comparator: impl MockValueComparator + 'static,
    ) {
        self.comparators.insert(type_name.into(), Rc::new(comparator));
    }

    pub fn install_copier(&mut self, type_name: impl Into<String>, copier: impl MockValueCopier + 'static) {
        self.copiers.insert(type_name.into(), Rc::new(copier));
    }

    /// Install everything from `other`, replacing handlers with the same name.
    pub fn install_all(&mut self, other: &ComparatorRepository) {
        for (name, comparator) in &other.comparators {
            self.comparators.insert(name.clone(), Rc::clone(comparator));
        }
        for (name, copier) in &other.copiers {
            self.copiers.insert(name.clone(), Rc::clone(copier));
        }
    }

    pub fn comparator(&self, type_name: &str) -> Option<&dyn MockValueComparator> {
        self.comparators.get(type_name).map(|c| c.as_ref())
    }

    pub fn copier(&self, type_name: &str) -> Option<&dyn MockValueCopier> {
        self.copiers.get(type_name).map(|c| c.as_ref())
    }

    pub fn clear(&mut self) {
        self.comparators.clear();
        self.copiers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty() && self.copiers.is_empty()
    }
}

impl fmt::Debug for ComparatorRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparatorRepository")
            .field("comparators", &self.comparators.keys().collect::<Vec<_>>())
            .field("copiers", &self.copiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn point_repository() -> ComparatorRepository {
        let mut repository = ComparatorRepository::new();
        repository.install_comparator(
            "Point",
            FunctionComparator::new(|a: &Point, b: &Point| a == b, |p: &Point| format!("({}, {})", p.x, p.y)),
        );
        repository.install_copier(
            "Point",
            FunctionCopier::new(|dst: &mut Point, src: &Point| {
                dst.x = src.x;
                dst.y = src.y;
            }),
        );
        repository
    }

    #[test]
    fn test_equality_is_type_exact() {
        let repository = ComparatorRepository::new();
        assert_eq!(MockValue::Int(1).equals(&MockValue::Int(1), &repository), Ok(true));
        assert_eq!(MockValue::Int(1).equals(&MockValue::LongInt(1), &repository), Ok(false));
        assert_eq!(MockValue::from(1.0).equals(&MockValue::from(1.004), &repository), Ok(true));
    }

    #[test]
    fn test_custom_values_need_a_comparator() {
        let a = MockValue::custom("Point", Point { x: 1, y: 2 });
        let b = MockValue::custom("Point", Point { x: 1, y: 2 });
        assert_eq!(a.equals(&b, &ComparatorRepository::new()), Err("Point".to_string()));
        assert_eq!(a.equals(&b, &point_repository()), Ok(true));
        assert_eq!(a.to_display_string(&point_repository()), "(1, 2)");
    }

    #[test]
    fn test_copy_into_native_and_custom_slots() {
        let repository = point_repository();
        let mut number = 0i32;
        assert_eq!(MockValue::Int(5).copy_into(&mut number, &repository), Ok(true));
        assert_eq!(number, 5);

        let mut point = Point { x: 0, y: 0 };
        let source = MockValue::custom("Point", Point { x: 3, y: 4 });
        assert_eq!(source.copy_into(&mut point, &repository), Ok(true));
        assert_eq!(point, Point { x: 3, y: 4 });
    }

    #[test]
    fn test_display() {
        assert_eq!(MockValue::Int(10).to_string(), "10 (0xa)");
        assert_eq!(MockValue::from(&[0xFEu8, 0x15][..]).to_string(), "Size = 2 | HexContents = FE 15");
        assert_eq!(MockValue::Pointer(0x10).to_string(), "0x10");
        assert_eq!(MockValue::from("text").to_string(), "text");
    }
}
