use crate::core::{Array, ArrayKey, Frame, FrozenCallStack, Function, Value};
use crate::delegation;
use crate::executor::DelegationSource;
use indexmap::IndexMap;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

pub type GeneratorRef = Rc<Generator>;
pub type WeakGenerator = Weak<Generator>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneratorId(u64);

impl GeneratorId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        GeneratorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Unstarted,
    Suspended,
    Running,
    Delegating,
    /// Finished with a return value.
    Completed,
    /// Finished without a return value (raised, unwound or destroyed).
    Closed,
}

impl GeneratorState {
    pub fn is_finished(self) -> bool {
        matches!(self, GeneratorState::Completed | GeneratorState::Closed)
    }
}

/// Cross-cutting flags that do not belong to the lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorFlags {
    pub in_fiber: bool,
    pub forced_close: bool,
    pub do_init: bool,
    pub at_first_yield: bool,
    pub destructor_called: bool,
}

#[derive(Debug, Default)]
pub(crate) enum Children {
    #[default]
    None,
    One(GeneratorId, WeakGenerator),
    Many(IndexMap<GeneratorId, WeakGenerator>),
}

impl Children {
    pub(crate) fn len(&self) -> usize {
        match self {
            Children::None => 0,
            Children::One(..) => 1,
            Children::Many(map) => map.len(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Node {
    /// The generator this one is yielding from.
    pub(crate) parent: Option<GeneratorRef>,
    pub(crate) children: Children,
    /// On a delegating consumer: the generator currently producing its values.
    pub(crate) root: Option<WeakGenerator>,
    /// On a tree root: the consumer currently driving it.
    pub(crate) leaf: Option<WeakGenerator>,
}

/// A generator object.
///
/// Shared through `GeneratorRef`; all mutation goes through interior cells, and no
/// borrow of a cell is ever held while user code runs.
pub struct Generator {
    id: GeneratorId,
    function: Rc<Function>,
    state: Cell<GeneratorState>,
    flags: Cell<GeneratorFlags>,
    pub(crate) frame: RefCell<Option<Box<Frame>>>,
    pub(crate) frozen_calls: RefCell<Option<FrozenCallStack>>,
    pub(crate) value: RefCell<Option<Value>>,
    pub(crate) key: RefCell<Option<Value>>,
    pub(crate) retval: RefCell<Option<Value>>,
    pub(crate) source: RefCell<Option<DelegationSource>>,
    pub(crate) send_target: Cell<Option<usize>>,
    pub(crate) largest_used_integer_key: Cell<i64>,
    pub(crate) node: RefCell<Node>,
}

impl Generator {
    pub fn new(function: Rc<Function>, args: Vec<Value>, this: Option<Value>) -> GeneratorRef {
        let frame = Frame::new(function.clone(), args, this);
        let generator = Rc::new(Generator {
            id: GeneratorId::next(),
            function,
            state: Cell::new(GeneratorState::Unstarted),
            flags: Cell::new(GeneratorFlags::default()),
            frame: RefCell::new(Some(Box::new(frame))),
            frozen_calls: RefCell::new(None),
            value: RefCell::new(None),
            key: RefCell::new(None),
            retval: RefCell::new(None),
            source: RefCell::new(None),
            send_target: Cell::new(None),
            largest_used_integer_key: Cell::new(-1),
            node: RefCell::new(Node::default()),
        });
        log::trace!("created generator #{} for {}", generator.id, generator.function.qualified_name());
        generator
    }

    pub fn id(&self) -> GeneratorId {
        self.id
    }

    pub fn function(&self) -> &Rc<Function> {
        &self.function
    }

    pub fn state(&self) -> GeneratorState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: GeneratorState) {
        self.state.set(state);
    }

    pub fn flags(&self) -> GeneratorFlags {
        self.flags.get()
    }

    pub(crate) fn update_flags(&self, f: impl FnOnce(&mut GeneratorFlags)) {
        let mut flags = self.flags.get();
        f(&mut flags);
        self.flags.set(flags);
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub fn is_running(&self) -> bool {
        self.state() == GeneratorState::Running
    }

    /// Raw value slot of this generator, without delegation resolution.
    pub fn value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    pub fn key(&self) -> Option<Value> {
        self.key.borrow().clone()
    }

    pub fn retval(&self) -> Option<Value> {
        self.retval.borrow().clone()
    }

    pub fn parent(&self) -> Option<GeneratorRef> {
        self.node.borrow().parent.clone()
    }

    pub fn children_count(&self) -> usize {
        self.node.borrow().children.len()
    }

    pub fn has_frozen_calls(&self) -> bool {
        self.frozen_calls.borrow().is_some()
    }

    pub fn has_delegation_source(&self) -> bool {
        self.source.borrow().is_some()
    }

    pub(crate) fn has_pending_exception(&self) -> bool {
        self.frame.borrow().as_ref().is_some_and(|f| f.pending_exception.is_some())
    }

    /// Borrow of the frame; `None` once closed or while the generator runs.
    pub fn frame(&self) -> Ref<'_, Option<Box<Frame>>> {
        self.frame.borrow()
    }

    pub(crate) fn take_frame(&self) -> Option<Box<Frame>> {
        self.frame.borrow_mut().take()
    }

    pub(crate) fn put_frame(&self, frame: Box<Frame>) {
        *self.frame.borrow_mut() = Some(frame);
    }

    pub(crate) fn with_frame_mut<R>(&self, f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
        self.frame.borrow_mut().as_mut().map(|frame| f(frame))
    }

    /// Installs the value/key pair of a yield. Explicit integer keys move the
    /// auto-key counter forward, missing keys take the next integer.
    pub(crate) fn install_yield(&self, value: Option<Value>, key: Option<Value>) {
        let key = match key {
            Some(key) => {
                if let Value::Int(i) = key
                    && i > self.largest_used_integer_key.get()
                {
                    self.largest_used_integer_key.set(i);
                }
                key
            }
            None => {
                let next = self.largest_used_integer_key.get() + 1;
                self.largest_used_integer_key.set(next);
                Value::Int(next)
            }
        };
        *self.value.borrow_mut() = Some(value.unwrap_or(Value::Null));
        *self.key.borrow_mut() = Some(key);
    }

    pub(crate) fn install_pair(&self, value: Value, key: Value) {
        *self.value.borrow_mut() = Some(value);
        *self.key.borrow_mut() = Some(key);
    }

    pub fn debug_info(&self) -> Array {
        let mut info = Array::new();
        info.insert(ArrayKey::Str(Rc::from("function")), Value::str(&self.function.qualified_name()));
        info
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        log::trace!("freeing generator #{}", self.id);
        let parent = self.node.get_mut().parent.take();
        if let Some(parent) = parent {
            delegation::remove_child(&parent, self.id);
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("id", &self.id)
            .field("function", &self.function.qualified_name())
            .field("state", &self.state.get())
            .field("flags", &self.flags.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::FunctionBuilder;

    fn generator() -> GeneratorRef {
        let mut b = FunctionBuilder::new("numbers");
        b.ret(None);
        Generator::new(b.finish().unwrap(), vec![], None)
    }

    #[test]
    fn auto_keys_follow_largest_integer_key() {
        let g = generator();
        g.install_yield(Some(Value::Int(1)), None);
        assert_eq!(g.key(), Some(Value::Int(0)));
        g.install_yield(Some(Value::Int(2)), Some(Value::Int(10)));
        g.install_yield(None, None);
        assert_eq!(g.key(), Some(Value::Int(11)));
        assert_eq!(g.value(), Some(Value::Null));
        g.install_yield(None, Some(Value::str("k")));
        g.install_yield(None, Some(Value::Int(3)));
        g.install_yield(None, None);
        assert_eq!(g.key(), Some(Value::Int(12)));
    }

    #[test]
    fn new_generator_is_unstarted_single_node() {
        let g = generator();
        assert_eq!(g.state(), GeneratorState::Unstarted);
        assert!(g.frame().is_some());
        assert!(g.parent().is_none());
        assert_eq!(g.children_count(), 0);
        assert!(g.value().is_none());
    }

    #[test]
    fn debug_info_reports_scoped_name() {
        let mut b = FunctionBuilder::new("items");
        b.scope("Repo");
        b.ret(None);
        let g = Generator::new(b.finish().unwrap(), vec![], None);
        let info = g.debug_info();
        assert_eq!(info.get(&ArrayKey::Str(Rc::from("function"))), Some(&Value::str("Repo::items")));
    }
}
