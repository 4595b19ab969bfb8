use crate::core::{Array, ExecContext, Exception, Frame, FrozenCallStack, GcBuffer, Trace, Value, ValueIterator};
use crate::generator::GeneratorRef;
use std::fmt;
use std::rc::Rc;

/// Result of running a frame until it stops.
#[derive(Debug)]
pub enum ExecOutcome {
    /// The frame stopped at a suspension op and left `opline` pointing at it.
    Suspended(Suspension),
    Returned(Value),
    /// An exception left the function body.
    Raised(Exception),
    /// The body ran off the end of a finally block entered by a forced close.
    Unwound,
    /// Unrecoverable abort, interpreter state can no longer be trusted.
    Aborted(String),
}

#[derive(Debug)]
pub enum Suspension {
    Yield {
        value: Option<Value>,
        key: Option<Value>,
        /// Variable slot receiving the value passed to `send`.
        send_target: Option<usize>,
    },
    Delegate {
        target: DelegateTarget,
        result_slot: Option<usize>,
    },
}

#[derive(Debug)]
pub enum DelegateTarget {
    Values(DelegationSource),
    Generator(GeneratorRef),
}

/// An array or external iterator a generator is yielding from.
pub enum DelegationSource {
    Array { array: Rc<Array>, pos: usize },
    Iterator { iter: Box<dyn ValueIterator>, index: usize, origin: Value },
}

impl DelegationSource {
    pub fn array(array: Rc<Array>) -> Self {
        DelegationSource::Array { array, pos: 0 }
    }

    pub fn iterator(iter: Box<dyn ValueIterator>, origin: Value) -> Self {
        DelegationSource::Iterator { iter, index: 0, origin }
    }

    pub fn rewind(&mut self) -> Result<(), Exception> {
        match self {
            DelegationSource::Array { pos, .. } => {
                *pos = 0;
                Ok(())
            }
            DelegationSource::Iterator { iter, index, .. } => {
                *index = 0;
                iter.rewind()
            }
        }
    }

    /// Fetches the next `(value, key)` pair, `None` once the source is exhausted.
    ///
    /// Iterators are advanced lazily: the first call reads the rewound position,
    /// later calls move forward first. Iterators without a key accessor are keyed
    /// by their position.
    pub fn next_delegated(&mut self) -> Result<Option<(Value, Value)>, Exception> {
        match self {
            DelegationSource::Array { array, pos } => {
                let Some((key, value)) = array.get_index(*pos) else {
                    return Ok(None);
                };
                *pos += 1;
                Ok(Some((value.clone(), Value::from(key))))
            }
            DelegationSource::Iterator { iter, index, .. } => {
                if *index > 0 {
                    iter.move_forward()?;
                }
                let position = *index as i64;
                *index += 1;
                if !iter.valid()? {
                    return Ok(None);
                }
                let Some(value) = iter.current()? else {
                    return Ok(None);
                };
                let key = match iter.key() {
                    Some(key) => key?,
                    None => Value::Int(position),
                };
                Ok(Some((value, key)))
            }
        }
    }
}

impl Trace for DelegationSource {
    fn trace(&self, buf: &mut GcBuffer) {
        match self {
            DelegationSource::Array { array, .. } => buf.add_value(&Value::Array(array.clone())),
            DelegationSource::Iterator { iter, origin, .. } => {
                buf.add_value(origin);
                iter.trace(buf);
            }
        }
    }
}

impl fmt::Debug for DelegationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegationSource::Array { array, pos } => write!(f, "Array(len={}, pos={pos})", array.len()),
            DelegationSource::Iterator { index, origin, .. } => write!(f, "Iterator({}, index={index})", origin.type_name()),
        }
    }
}

/// Runs generator function bodies.
///
/// The driver never interprets ops itself: it hands the frame to `execute`, which
/// runs from `frame.opline` (or dispatches `frame.pending_exception` raised at that
/// op) until the body suspends, returns, raises or aborts.
pub trait FrameExecutor {
    fn execute(&mut self, ctx: &mut ExecContext, frame: &mut Frame) -> ExecOutcome;

    /// Releases state of a frame abandoned at `op_num` before reaching `catch_op`
    /// (0 when the whole frame is abandoned).
    fn cleanup_unfinished(&mut self, ctx: &mut ExecContext, frame: &mut Frame, op_num: usize, catch_op: usize) {
        log::trace!("cleanup of {} at op {op_num} up to {catch_op}", frame.function.qualified_name());
        frame.discard_pending_calls(&mut ctx.stack);
    }

    /// Takes over the frame of a generator that was just closed. The default drops
    /// it, which releases its variables without running any code.
    fn release_frame(&mut self, _ctx: &mut ExecContext, frame: Frame) {
        drop(frame);
    }

    /// Reports values reachable from a suspended frame and its frozen calls.
    fn frame_gc(&self, frame: &Frame, frozen: Option<&FrozenCallStack>, buf: &mut GcBuffer) {
        frame.trace(buf);
        if let Some(frozen) = frozen {
            frozen.trace(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArrayKey, Range, Traversable};

    fn drain(source: &mut DelegationSource) -> Vec<(Value, Value)> {
        let mut out = Vec::new();
        while let Some(pair) = source.next_delegated().unwrap() {
            out.push(pair);
        }
        out
    }

    #[test]
    fn array_source_uses_array_keys() {
        let mut array = Array::new();
        array.insert(ArrayKey::Str(Rc::from("a")), Value::Int(1));
        array.insert(ArrayKey::Int(10), Value::Int(2));
        let mut source = DelegationSource::array(Rc::new(array));
        assert_eq!(
            drain(&mut source),
            vec![(Value::Int(1), Value::str("a")), (Value::Int(2), Value::Int(10))]
        );
        assert!(source.next_delegated().unwrap().is_none());
    }

    #[test]
    fn iterator_without_key_accessor_is_keyed_by_position() {
        let range = Range::new(5, 7);
        let iter = range.get_iterator().unwrap();
        let mut source = DelegationSource::iterator(iter, Value::Null);
        source.rewind().unwrap();
        assert_eq!(
            drain(&mut source),
            vec![
                (Value::Int(5), Value::Int(0)),
                (Value::Int(6), Value::Int(1)),
                (Value::Int(7), Value::Int(2))
            ]
        );
    }
}
