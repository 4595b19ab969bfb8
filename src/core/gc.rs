use crate::core::Value;
use crate::generator::GeneratorRef;
use std::rc::Rc;

/// A reference reported to the cycle collector.
#[derive(Clone, Debug)]
pub enum GcRef {
    Value(Value),
    Generator(GeneratorRef),
}

/// Reachability buffer filled by `get_gc`.
///
/// Only values that can take part in a reference cycle are recorded; scalars and
/// strings are skipped the same way a refcounting collector ignores them.
#[derive(Default, Debug)]
pub struct GcBuffer {
    refs: Vec<GcRef>,
    deferred: bool,
}

impl GcBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, value: &Value) {
        match value {
            Value::Array(_) | Value::Traversable(_) | Value::Exception(_) => self.refs.push(GcRef::Value(value.clone())),
            Value::Generator(g) => self.refs.push(GcRef::Generator(g.clone())),
            _ => {}
        }
    }

    pub fn add_slot(&mut self, slot: &Option<Value>) {
        if let Some(v) = slot {
            self.add_value(v);
        }
    }

    pub fn add_generator(&mut self, generator: &GeneratorRef) {
        self.refs.push(GcRef::Generator(generator.clone()));
    }

    /// Marks the report as incomplete; the collector should retry on a later pass.
    pub fn defer(&mut self) {
        self.refs.clear();
        self.deferred = true;
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn refs(&self) -> &[GcRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn contains_generator(&self, generator: &GeneratorRef) -> bool {
        self.refs.iter().any(|r| match r {
            GcRef::Generator(g) => Rc::ptr_eq(g, generator),
            GcRef::Value(_) => false,
        })
    }

    pub fn contains_value(&self, value: &Value) -> bool {
        self.refs.iter().any(|r| match r {
            GcRef::Value(v) => v == value,
            GcRef::Generator(g) => matches!(value, Value::Generator(other) if Rc::ptr_eq(g, other)),
        })
    }
}

/// Types that can report the references they hold.
pub trait Trace {
    fn trace(&self, buf: &mut GcBuffer);
}

impl Trace for Value {
    fn trace(&self, buf: &mut GcBuffer) {
        buf.add_value(self);
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, buf: &mut GcBuffer) {
        if let Some(t) = self {
            t.trace(buf);
        }
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, buf: &mut GcBuffer) {
        for t in self {
            t.trace(buf);
        }
    }
}
