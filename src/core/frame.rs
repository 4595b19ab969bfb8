use crate::core::{Exception, Function, GcBuffer, Trace, Value};
use indexmap::IndexMap;
use std::rc::Rc;

pub type CallId = usize;

pub type NamedParams = IndexMap<Rc<str>, Value>;

/// Where a suspended frame stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuspendKind {
    #[default]
    Start,
    Yield,
    YieldFrom {
        result_slot: Option<usize>,
    },
}

/// Bookkeeping of one try/finally region while its finally block runs.
#[derive(Debug, Clone, Default)]
pub struct FastCall {
    /// Exception parked while the finally block runs.
    pub exception: Option<Exception>,
    /// Op that jumped into the finally block, execution continues after it.
    pub return_op: Option<usize>,
    /// Slot holding a return value that waits for the finally block.
    pub retval_slot: Option<usize>,
}

/// Suspended execution state of one generator function invocation.
pub struct Frame {
    pub function: Rc<Function>,
    /// Index of the op execution stopped at; the driver moves past it on resume.
    pub opline: usize,
    pub vars: Vec<Value>,
    pub fast_calls: Vec<FastCall>,
    /// Innermost call whose arguments are still being evaluated.
    pub call: Option<CallId>,
    pub extra_named_params: Option<NamedParams>,
    pub this: Option<Value>,
    /// Exception raised at the suspension point, dispatched on the next resume.
    pub pending_exception: Option<Exception>,
    pub suspension: SuspendKind,
}

impl Frame {
    pub fn new(function: Rc<Function>, args: Vec<Value>, this: Option<Value>) -> Self {
        let mut vars = args;
        let size = vars.len().max(function.num_vars);
        vars.resize(size, Value::Null);
        let fast_calls = vec![FastCall::default(); function.try_catch.len()];
        Frame {
            function,
            opline: 0,
            vars,
            fast_calls,
            call: None,
            extra_named_params: None,
            this,
            pending_exception: None,
            suspension: SuspendKind::Start,
        }
    }

    pub fn raise(&mut self, exception: Exception) {
        self.pending_exception = Some(exception);
    }

    pub fn var(&self, slot: usize) -> Value {
        self.vars.get(slot).cloned().unwrap_or(Value::Null)
    }

    /// Writes a variable slot, growing the table when needed. The old occupant is dropped.
    pub fn set_var(&mut self, slot: usize, value: Value) {
        drop(self.replace_var(slot, value));
    }

    /// Writes a variable slot and hands back what it held.
    pub fn replace_var(&mut self, slot: usize, value: Value) -> Value {
        if slot >= self.vars.len() {
            self.vars.resize(slot + 1, Value::Null);
        }
        std::mem::replace(&mut self.vars[slot], value)
    }

    pub fn take_var(&mut self, slot: usize) -> Value {
        match self.vars.get_mut(slot) {
            Some(value) => std::mem::replace(value, Value::Null),
            None => Value::Null,
        }
    }

    /// Pops every pending call of this frame off the live stack, releasing its arguments.
    pub fn discard_pending_calls(&mut self, stack: &mut VmStack) {
        while let Some(id) = self.call {
            match stack.pop_call(id) {
                Some((call, _args)) => self.call = call.prev,
                None => {
                    log::warn!("pending call {id} of {} is not on top of the stack", self.function.qualified_name());
                    self.call = None;
                }
            }
        }
    }
}

impl Trace for Frame {
    fn trace(&self, buf: &mut GcBuffer) {
        self.vars.trace(buf);
        for fast_call in &self.fast_calls {
            if let Some(exc) = &fast_call.exception {
                buf.add_value(&Value::Exception(exc.clone()));
            }
        }
        self.this.trace(buf);
        if let Some(named) = &self.extra_named_params {
            named.values().for_each(|v| buf.add_value(v));
        }
        if let Some(exc) = &self.pending_exception {
            buf.add_value(&Value::Exception(exc.clone()));
        }
    }
}

/// A call pushed on the shared stack whose arguments are not complete yet.
#[derive(Debug)]
pub struct PendingCall {
    pub callee: Rc<str>,
    base: usize,
    pub num_args: usize,
    pub extra_named_params: Option<NamedParams>,
    pub this: Option<Value>,
    pub prev: Option<CallId>,
}

/// The shared growable stack of in-progress nested calls.
///
/// Argument slots of all calls live in one contiguous vector; each call record
/// knows its base offset and links to the call that was pending before it.
#[derive(Debug, Default)]
pub struct VmStack {
    slots: Vec<Value>,
    calls: Vec<PendingCall>,
}

impl VmStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_call(&mut self, callee: Rc<str>, num_args: usize, this: Option<Value>, prev: Option<CallId>) -> CallId {
        let base = self.slots.len();
        self.slots.resize(base + num_args, Value::Null);
        self.calls.push(PendingCall {
            callee,
            base,
            num_args,
            extra_named_params: None,
            this,
            prev,
        });
        self.calls.len() - 1
    }

    pub fn call(&self, id: CallId) -> Option<&PendingCall> {
        self.calls.get(id)
    }

    pub fn call_mut(&mut self, id: CallId) -> Option<&mut PendingCall> {
        self.calls.get_mut(id)
    }

    pub fn args(&self, id: CallId) -> &[Value] {
        match self.calls.get(id) {
            Some(call) => &self.slots[call.base..call.base + call.num_args],
            None => &[],
        }
    }

    pub fn args_mut(&mut self, id: CallId) -> Option<&mut [Value]> {
        let call = self.calls.get(id)?;
        let (base, len) = (call.base, call.num_args);
        Some(&mut self.slots[base..base + len])
    }

    /// Removes the topmost call. Calls are strictly LIFO, popping anything else fails.
    pub fn pop_call(&mut self, id: CallId) -> Option<(PendingCall, Vec<Value>)> {
        if id + 1 != self.calls.len() {
            return None;
        }
        let call = self.calls.pop()?;
        let args = self.slots.drain(call.base..).collect();
        Some((call, args))
    }

    pub fn depth(&self) -> usize {
        self.calls.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FrozenCall {
    pub callee: Rc<str>,
    pub num_args: usize,
    pub extra_named_params: Option<NamedParams>,
    pub this: Option<Value>,
}

/// Pending calls of a suspended generator, moved off the shared stack.
///
/// Calls are stored oldest first and their argument slots are packed into a single
/// buffer whose length is exactly the sum of the calls' argument counts.
#[derive(Debug)]
pub struct FrozenCallStack {
    slots: Box<[Value]>,
    calls: Box<[FrozenCall]>,
}

impl FrozenCallStack {
    /// Moves the frame's chain of pending calls into a private buffer.
    /// Returns `None` when the frame has no pending call.
    pub fn freeze(stack: &mut VmStack, frame: &mut Frame) -> Option<FrozenCallStack> {
        let innermost = frame.call.take()?;

        let mut used = 0;
        let mut cursor = Some(innermost);
        while let Some(id) = cursor {
            let Some(call) = stack.call(id) else { break };
            used += call.num_args;
            cursor = call.prev;
        }

        let mut slots = vec![Value::Null; used];
        let mut calls = Vec::new();
        let mut end = used;
        let mut cursor = Some(innermost);
        while let Some(id) = cursor {
            let Some((call, args)) = stack.pop_call(id) else {
                log::warn!("call chain of {} broken while freezing at call {id}", frame.function.qualified_name());
                break;
            };
            end -= args.len();
            for (dst, value) in slots[end..].iter_mut().zip(args) {
                *dst = value;
            }
            cursor = call.prev;
            calls.push(FrozenCall {
                callee: call.callee,
                num_args: call.num_args,
                extra_named_params: call.extra_named_params,
                this: call.this,
            });
        }
        calls.reverse();
        log::trace!("froze {} pending call(s), {used} slot(s)", calls.len());

        Some(FrozenCallStack {
            slots: slots.into_boxed_slice(),
            calls: calls.into_boxed_slice(),
        })
    }

    /// Pushes the frozen calls back onto the live stack, oldest first.
    pub fn thaw(self, stack: &mut VmStack, frame: &mut Frame) {
        let mut args = self.slots.into_vec().into_iter();
        let mut prev = frame.call;
        for call in self.calls.into_vec() {
            let id = stack.push_call(call.callee, call.num_args, call.this, prev);
            if let Some(dst) = stack.args_mut(id) {
                for (slot, value) in dst.iter_mut().zip(args.by_ref()) {
                    *slot = value;
                }
            }
            if let Some(pushed) = stack.call_mut(id) {
                pushed.extra_named_params = call.extra_named_params;
            }
            prev = Some(id);
        }
        frame.call = prev;
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Calls oldest first, each with its argument slots.
    pub fn calls(&self) -> impl Iterator<Item = (&FrozenCall, &[Value])> {
        let mut offset = 0;
        self.calls.iter().map(move |call| {
            let args = &self.slots[offset..offset + call.num_args];
            offset += call.num_args;
            (call, args)
        })
    }
}

impl Trace for FrozenCallStack {
    fn trace(&self, buf: &mut GcBuffer) {
        self.slots.trace(buf);
        for call in self.calls.iter() {
            call.this.trace(buf);
            if let Some(named) = &call.extra_named_params {
                named.values().for_each(|v| buf.add_value(v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FunctionFlags;

    fn frame() -> Frame {
        let function = Rc::new(Function {
            name: Rc::from("f"),
            scope: None,
            num_params: 0,
            num_vars: 2,
            var_names: Vec::new(),
            code: Vec::new(),
            try_catch: Vec::new(),
            flags: FunctionFlags::default(),
        });
        Frame::new(function, vec![Value::Int(7)], None)
    }

    fn chain(stack: &VmStack, frame: &Frame) -> Vec<(String, Vec<Value>, Option<Vec<(String, Value)>>)> {
        let mut out = Vec::new();
        let mut cursor = frame.call;
        while let Some(id) = cursor {
            let call = stack.call(id).unwrap();
            let named = call
                .extra_named_params
                .as_ref()
                .map(|m| m.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
            out.push((call.callee.to_string(), stack.args(id).to_vec(), named));
            cursor = call.prev;
        }
        out
    }

    #[test]
    fn new_frame_places_args_first() {
        let f = frame();
        assert_eq!(f.vars, vec![Value::Int(7), Value::Null]);
        assert_eq!(f.opline, 0);
    }

    #[test]
    fn freeze_then_thaw_restores_identical_chain() {
        let mut stack = VmStack::new();
        let mut f = frame();

        let outer = stack.push_call(Rc::from("outer"), 2, None, None);
        stack.args_mut(outer).unwrap().clone_from_slice(&[Value::Int(1), Value::str("x")]);
        stack
            .call_mut(outer)
            .unwrap()
            .extra_named_params
            .get_or_insert_default()
            .insert(Rc::from("flag"), Value::Bool(true));
        let inner = stack.push_call(Rc::from("inner"), 1, None, Some(outer));
        stack.args_mut(inner).unwrap()[0] = Value::Int(2);
        f.call = Some(inner);

        let before = chain(&stack, &f);
        let frozen = FrozenCallStack::freeze(&mut stack, &mut f).unwrap();
        assert!(stack.is_empty());
        assert_eq!(stack.slot_count(), 0);
        assert!(f.call.is_none());
        assert_eq!(frozen.len(), 2);
        assert_eq!(frozen.slot_count(), 3);
        let names: Vec<_> = frozen.calls().map(|(c, _)| c.callee.to_string()).collect();
        assert_eq!(names, vec!["outer", "inner"]);

        frozen.thaw(&mut stack, &mut f);
        assert_eq!(chain(&stack, &f), before);
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn freeze_without_pending_calls_is_none() {
        let mut stack = VmStack::new();
        let mut f = frame();
        assert!(FrozenCallStack::freeze(&mut stack, &mut f).is_none());
    }

    #[test]
    fn thaw_links_above_calls_of_the_frame_below() {
        let mut stack = VmStack::new();
        let below = stack.push_call(Rc::from("host"), 1, None, None);
        let mut f = frame();
        let own = stack.push_call(Rc::from("own"), 1, None, None);
        stack.args_mut(own).unwrap()[0] = Value::Int(5);
        f.call = Some(own);
        let frozen = FrozenCallStack::freeze(&mut stack, &mut f).unwrap();
        assert_eq!(stack.depth(), 1);

        frozen.thaw(&mut stack, &mut f);
        let id = f.call.unwrap();
        assert_ne!(id, below);
        assert_eq!(stack.args(id), &[Value::Int(5)]);
    }

    #[test]
    fn discard_pending_calls_pops_the_chain() {
        let mut stack = VmStack::new();
        let mut f = frame();
        let a = stack.push_call(Rc::from("a"), 1, None, None);
        let b = stack.push_call(Rc::from("b"), 2, None, Some(a));
        f.call = Some(b);
        f.discard_pending_calls(&mut stack);
        assert!(stack.is_empty());
        assert!(f.call.is_none());
    }
}
