pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod executor;
pub(crate) mod generator;
pub(crate) mod repl;
pub(crate) mod repl_utils;
pub(crate) mod runtime;

pub mod delegation;
pub mod interp;
pub mod iterator;
pub mod resume;

pub use self::core::{
    Activation, Array, ArrayKey, CLOSED_GENERATOR_EXCEPTION, CallId, ExecContext, Exception, FastCall, FiberId, Frame, FrozenCall,
    FrozenCallStack, Function, FunctionFlags, GcBuffer, GcRef, NamedParams, PendingCall, Range, SuspendKind, Trace, Traversable,
    TryCatchRegion, Value, ValueIterator, VmStack, new_list,
};
pub use error::GeneratorError;
pub use executor::{DelegateTarget, DelegationSource, ExecOutcome, FrameExecutor, Suspension};
pub use generator::{Generator, GeneratorFlags, GeneratorId, GeneratorRef, GeneratorState, WeakGenerator};
pub use interp::{FunctionBuilder, Interpreter, Program, assemble};
pub use repl::Repl;
pub use resume::{close, destroy, resolve_effective, resume, throw_into};
pub use runtime::Runtime;
