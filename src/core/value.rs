use crate::core::{Exception, GcBuffer};
use crate::generator::GeneratorRef;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<str>),
}

impl From<&ArrayKey> for Value {
    fn from(key: &ArrayKey) -> Self {
        match key {
            ArrayKey::Int(i) => Value::Int(*i),
            ArrayKey::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(i) => write!(f, "{i}"),
            ArrayKey::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Ordered hash map with integer or string keys. Packed lists simply use keys 0..n.
pub type Array = IndexMap<ArrayKey, Value>;

pub fn new_list(values: impl IntoIterator<Item = Value>) -> Rc<Array> {
    Rc::new(values.into_iter().enumerate().map(|(i, v)| (ArrayKey::Int(i as i64), v)).collect())
}

/// An object that can hand out an external iterator (`yield from $traversable`).
pub trait Traversable {
    fn class_name(&self) -> &str;

    fn get_iterator(&self) -> Result<Box<dyn ValueIterator>, Exception>;
}

/// Iterator protocol of external objects used as delegation sources.
pub trait ValueIterator {
    fn rewind(&mut self) -> Result<(), Exception> {
        Ok(())
    }

    fn valid(&mut self) -> Result<bool, Exception>;

    fn current(&mut self) -> Result<Option<Value>, Exception>;

    /// Optional key accessor. Iterators without one are keyed by their position.
    fn key(&mut self) -> Option<Result<Value, Exception>> {
        None
    }

    fn move_forward(&mut self) -> Result<(), Exception>;

    fn trace(&self, _buf: &mut GcBuffer) {}
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<Array>),
    Generator(GeneratorRef),
    Traversable(Rc<dyn Traversable>),
    Exception(Exception),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(new_list(values))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && &**s != "0",
            Value::Array(a) => !a.is_empty(),
            Value::Generator(_) | Value::Traversable(_) | Value::Exception(_) => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Generator(_) => "Generator",
            Value::Traversable(t) => t.class_name(),
            Value::Exception(e) => e.class(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) => Some(*f as i64),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Null => Some(0),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            (Value::Traversable(a), Value::Traversable(b)) => Rc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Exception> for Value {
    fn from(e: Exception) -> Self {
        Value::Exception(e)
    }
}

impl From<GeneratorRef> for Value {
    fn from(g: GeneratorRef) -> Self {
        Value::Generator(g)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, (k, v)) in a.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k} => {v}")?;
                }
                f.write_str("]")
            }
            Value::Generator(g) => write!(f, "Generator#{}({})", g.id(), g.function().qualified_name()),
            Value::Traversable(t) => write!(f, "object({})", t.class_name()),
            Value::Exception(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

/// `range(start, end, step)` as a traversable object; bounds are inclusive.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Range {
            start,
            end,
            step: if end >= start { 1 } else { -1 },
        }
    }
}

impl Traversable for Range {
    fn class_name(&self) -> &str {
        "Range"
    }

    fn get_iterator(&self) -> Result<Box<dyn ValueIterator>, Exception> {
        if self.step == 0 {
            return Err(Exception::new("ValueError", "range() step cannot be 0"));
        }
        Ok(Box::new(RangeIter { range: *self, next: self.start }))
    }
}

struct RangeIter {
    range: Range,
    next: i64,
}

impl ValueIterator for RangeIter {
    fn rewind(&mut self) -> Result<(), Exception> {
        self.next = self.range.start;
        Ok(())
    }

    fn valid(&mut self) -> Result<bool, Exception> {
        Ok(if self.range.step > 0 {
            self.next <= self.range.end
        } else {
            self.next >= self.range.end
        })
    }

    fn current(&mut self) -> Result<Option<Value>, Exception> {
        Ok(Some(Value::Int(self.next)))
    }

    fn move_forward(&mut self) -> Result<(), Exception> {
        self.next += self.range.step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_keys_are_positions() {
        let list = new_list([Value::str("a"), Value::str("b")]);
        let keys: Vec<_> = list.keys().cloned().collect();
        assert_eq!(keys, vec![ArrayKey::Int(0), ArrayKey::Int(1)]);
    }

    #[test]
    fn range_iterates_inclusive_bounds() {
        let mut it = Range::new(3, 1).get_iterator().unwrap();
        let mut seen = Vec::new();
        it.rewind().unwrap();
        while it.valid().unwrap() {
            seen.push(it.current().unwrap().unwrap());
            it.move_forward().unwrap();
        }
        assert_eq!(seen, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!Value::str("0").is_truthy());
        assert!(Value::str("00").is_truthy());
        assert!(!Value::list([]).is_truthy());
        assert!(Value::Int(-1).is_truthy());
    }
}
