//! A small register machine that runs generator bodies.
//!
//! Every function is a generator function: calling one creates a generator.
//! Exceptions are dispatched over the function's try/catch/finally regions the
//! same way for user `throw`s, failed operations and exceptions raised at a
//! suspension point by the driver.

mod asm;
mod builder;
mod op;

pub use asm::{assemble, parse_literal};
pub use builder::{FunctionBuilder, Label};
pub use op::{BinaryOp, GenMethod, Op, Slot};

use crate::core::{Array, ArrayKey, ExecContext, Exception, FastCall, Frame, Function, NamedParams, Range, Value};
use crate::error::GeneratorError;
use crate::executor::{DelegateTarget, DelegationSource, ExecOutcome, FrameExecutor, Suspension};
use crate::generator::{Generator, GeneratorRef};
use crate::{iterator, resume};
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Compiled functions by name.
#[derive(Debug, Default, Clone)]
pub struct Program {
    functions: IndexMap<Rc<str>, Rc<Function>>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function, replacing one with the same name.
    pub fn insert(&mut self, function: Rc<Function>) -> Option<Rc<Function>> {
        self.functions.insert(function.name.clone(), function)
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Function>> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Rc<Function>> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for function in self.functions.values() {
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

/// Arguments of a native function call.
#[derive(Debug, Default)]
pub struct NativeCall {
    pub args: Vec<Value>,
    pub named: Option<NamedParams>,
    pub this: Option<Value>,
}

impl NativeCall {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Null)
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &mut ExecContext, NativeCall) -> Result<Value, Exception>>;

/// Where execution goes after an exception was dispatched.
enum Flow {
    Jump(usize),
    Exit(ExecOutcome),
}

pub struct Interpreter {
    program: Program,
    natives: IndexMap<Rc<str>, NativeFn>,
    output: Vec<String>,
    steps: u64,
    step_limit: Option<u64>,
}

impl Interpreter {
    pub fn new(program: Program) -> Self {
        let mut interp = Interpreter {
            program,
            natives: IndexMap::new(),
            output: Vec::new(),
            steps: 0,
            step_limit: None,
        };
        interp.register_builtins();
        interp
    }

    /// Aborts execution once more than `limit` ops ran in total.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn program_mut(&mut self) -> &mut Program {
        &mut self.program
    }

    pub fn register_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Interpreter, &mut ExecContext, NativeCall) -> Result<Value, Exception> + 'static,
    {
        self.natives.insert(Rc::from(name), Rc::new(f));
    }

    /// Lines written by `echo` so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Calls generator function `name`, creating an unstarted generator.
    pub fn spawn(&self, name: &str, args: Vec<Value>) -> Result<GeneratorRef, GeneratorError> {
        self.instantiate(name, args, None).map_err(GeneratorError::Thrown)
    }

    fn instantiate(&self, name: &str, mut args: Vec<Value>, named: Option<NamedParams>) -> Result<GeneratorRef, Exception> {
        let Some(function) = self.program.get(name) else {
            return Err(Exception::error(format!("Call to undefined function {name}()")));
        };
        if let Some(named) = named {
            for (param, value) in named {
                let Some(slot) = function.var_names[..function.num_params].iter().position(|n| *n == param) else {
                    return Err(Exception::error(format!("Unknown named parameter ${param}")));
                };
                if slot >= args.len() {
                    args.resize(slot + 1, Value::Null);
                }
                args[slot] = value;
            }
        }
        if args.len() < function.num_params {
            return Err(Exception::new(
                "ArgumentCountError",
                format!(
                    "Too few arguments to function {}(), {} passed and exactly {} expected",
                    function.qualified_name(),
                    args.len(),
                    function.num_params
                ),
            ));
        }
        Ok(Generator::new(function.clone(), args, None))
    }

    fn register_builtins(&mut self) {
        self.register_native("count", |_, _, call| match call.arg(0) {
            Value::Array(array) => Ok(Value::Int(array.len() as i64)),
            other => Err(Exception::new(
                "TypeError",
                format!("count(): Argument #1 ($value) must be of type array, {} given", other.type_name()),
            )),
        });
        self.register_native("intdiv", |_, _, call| {
            let (a, b) = (call.arg(0).as_int().unwrap_or(0), call.arg(1).as_int().unwrap_or(0));
            if b == 0 {
                return Err(Exception::new("DivisionByZeroError", "Division by zero"));
            }
            match a.checked_div(b) {
                Some(quotient) => Ok(Value::Int(quotient)),
                None => Err(Exception::new("ArithmeticError", "Division of the minimum integer by -1 is not an integer")),
            }
        });
        self.register_native("destroy", destroy_native);
        self.register_native("backtrace", |_, ctx, _| Ok(Value::list(ctx.backtrace().iter().map(|name| Value::str(name)))));
    }

    fn step(&mut self) -> Result<(), String> {
        self.steps += 1;
        match self.step_limit {
            Some(limit) if self.steps > limit => Err(format!("Maximum execution steps of {limit} exceeded")),
            _ => Ok(()),
        }
    }

    /// Walks the regions from `offset` outwards, the way an exception (or a forced
    /// unwind when `exception` is `None`) leaves the code at `op_num`.
    fn dispatch(
        frame: &mut Frame,
        caught: &mut Option<Exception>,
        exception: Option<Exception>,
        op_num: usize,
        offset: Option<usize>,
    ) -> Flow {
        let function = frame.function.clone();
        let mut exception = exception;
        let mut offset = offset;
        while let Some(index) = offset {
            let region = function.try_catch[index];
            if op_num < region.catch_op && exception.is_some() {
                *caught = exception;
                return Flow::Jump(region.catch_op);
            } else if op_num < region.finally_op {
                frame.fast_calls[index] = FastCall {
                    exception,
                    return_op: None,
                    retval_slot: None,
                };
                return Flow::Jump(region.finally_op);
            } else if op_num < region.finally_end {
                let fast_call = std::mem::take(&mut frame.fast_calls[index]);
                if fast_call.return_op.is_some()
                    && let Some(slot) = fast_call.retval_slot
                {
                    frame.set_var(slot, Value::Null);
                }
                // an exception leaving a finally block keeps the one it interrupted
                if let Some(parked) = fast_call.exception {
                    match &exception {
                        Some(current) => current.set_previous(parked),
                        None => exception = Some(parked),
                    }
                }
            }
            offset = index.checked_sub(1);
        }
        Flow::Exit(match exception {
            Some(exception) => ExecOutcome::Raised(exception),
            None => ExecOutcome::Unwound,
        })
    }

    fn raise(ctx: &mut ExecContext, frame: &mut Frame, caught: &mut Option<Exception>, exception: Exception, op_num: usize) -> Flow {
        log::trace!("{} raised {exception} at op {op_num}", frame.function.qualified_name());
        frame.discard_pending_calls(&mut ctx.stack);
        let offset = frame.function.innermost_region(op_num);
        Self::dispatch(frame, caught, Some(exception), op_num, offset)
    }

    fn call(&mut self, ctx: &mut ExecContext, frame: &mut Frame) -> Result<Value, Exception> {
        let Some(id) = frame.call else {
            return Err(Exception::error("No call in progress"));
        };
        let Some((call, args)) = ctx.stack.pop_call(id) else {
            return Err(Exception::error("Call stack out of order"));
        };
        frame.call = call.prev;

        if let Some(native) = self.natives.get(&call.callee).cloned() {
            let native_call = NativeCall {
                args,
                named: call.extra_named_params,
                this: call.this,
            };
            return native(self, ctx, native_call);
        }
        self.instantiate(&call.callee, args, call.extra_named_params).map(Value::Generator)
    }

    fn gen_call(&mut self, ctx: &mut ExecContext, method: GenMethod, target: &Value, arg: Value) -> Result<Value, GeneratorError> {
        let Value::Generator(generator) = target else {
            return Err(GeneratorError::Thrown(Exception::error(format!(
                "Call to a member function {method}() on {}",
                target.type_name()
            ))));
        };
        let generator = generator.clone();
        Ok(match method {
            GenMethod::Current => iterator::current(self, ctx, &generator)?.unwrap_or(Value::Null),
            GenMethod::Key => iterator::key(self, ctx, &generator)?.unwrap_or(Value::Null),
            GenMethod::Next => {
                iterator::next(self, ctx, &generator)?;
                Value::Null
            }
            GenMethod::Send => iterator::send(self, ctx, &generator, arg)?.unwrap_or(Value::Null),
            GenMethod::Valid => Value::Bool(iterator::valid(self, ctx, &generator)?),
            GenMethod::Rewind => {
                iterator::rewind(self, ctx, &generator)?;
                Value::Null
            }
            GenMethod::GetReturn => iterator::get_return(self, ctx, &generator)?,
            GenMethod::Throw => {
                let Value::Exception(exception) = arg else {
                    return Err(GeneratorError::Thrown(Exception::new(
                        "TypeError",
                        format!("Generator::throw(): Argument #1 ($exception) must be of type Throwable, {} given", arg.type_name()),
                    )));
                };
                iterator::throw(self, ctx, &generator, exception)?.unwrap_or(Value::Null)
            }
        })
    }
}

impl Interpreter {
    /// Drops a value the running code let go of. A generator losing its last owner
    /// is destroyed, so its pending finally blocks run now.
    fn release(&mut self, ctx: &mut ExecContext, value: Value) -> Result<(), Exception> {
        let Value::Generator(generator) = value else {
            return Ok(());
        };
        if Rc::strong_count(&generator) > 1 {
            return Ok(());
        }
        log::debug!("generator #{} lost its last owner", generator.id());
        resume::destroy(self, ctx, &generator).map_err(GeneratorError::into_exception)
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("functions", &self.program.len())
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

fn array_key(value: &Value) -> Result<ArrayKey, Exception> {
    match value {
        Value::Int(i) => Ok(ArrayKey::Int(*i)),
        Value::Bool(b) => Ok(ArrayKey::Int(*b as i64)),
        Value::Str(s) => Ok(match s.parse::<i64>() {
            Ok(i) if i.to_string() == **s => ArrayKey::Int(i),
            _ => ArrayKey::Str(s.clone()),
        }),
        Value::Null => Ok(ArrayKey::Str(Rc::from(""))),
        other => Err(Exception::new("TypeError", format!("Illegal offset type {}", other.type_name()))),
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Null => Some(Number::Int(0)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Number::Int)
                .ok()
                .or_else(|| s.trim().parse::<f64>().map(Number::Float).ok()),
            _ => None,
        }
    }

    fn float(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, Exception> {
    let numbers = || match (Number::of(lhs), Number::of(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Exception::new(
            "TypeError",
            format!("Unsupported operand types: {} {} {}", lhs.type_name(), op.symbol(), rhs.type_name()),
        )),
    };
    let arithmetic = |int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64| -> Result<Value, Exception> {
        Ok(match numbers()? {
            (Number::Int(x), Number::Int(y)) => int(x, y).map(Value::Int).unwrap_or_else(|| Value::Float(float(x as f64, y as f64))),
            (a, b) => Value::Float(float(a.float(), b.float())),
        })
    };
    match op {
        BinaryOp::Concat => Ok(Value::Str(Rc::from(format!("{lhs}{rhs}")))),
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Add => arithmetic(i64::checked_add, |x, y| x + y),
        BinaryOp::Sub => arithmetic(i64::checked_sub, |x, y| x - y),
        BinaryOp::Mul => arithmetic(i64::checked_mul, |x, y| x * y),
        BinaryOp::Lt => numbers().map(|(a, b)| Value::Bool(a.float() < b.float())),
        BinaryOp::Le => numbers().map(|(a, b)| Value::Bool(a.float() <= b.float())),
    }
}

impl FrameExecutor for Interpreter {
    fn execute(&mut self, ctx: &mut ExecContext, frame: &mut Frame) -> ExecOutcome {
        let function = frame.function.clone();
        let mut caught: Option<Exception> = None;
        let mut pc = frame.opline;

        if let Some(exception) = frame.pending_exception.take() {
            match Self::raise(ctx, frame, &mut caught, exception, pc) {
                Flow::Jump(target) => pc = target,
                Flow::Exit(outcome) => return outcome,
            }
        }

        macro_rules! throw {
            ($exception:expr) => {{
                match Self::raise(ctx, frame, &mut caught, $exception, pc) {
                    Flow::Jump(target) => {
                        pc = target;
                        continue;
                    }
                    Flow::Exit(outcome) => {
                        frame.opline = pc;
                        return outcome;
                    }
                }
            }};
        }

        macro_rules! assign {
            ($dst:expr, $value:expr) => {{
                let old = frame.replace_var($dst, $value);
                if let Err(exception) = self.release(ctx, old) {
                    throw!(exception);
                }
            }};
        }

        loop {
            if let Err(message) = self.step() {
                frame.opline = pc;
                return ExecOutcome::Aborted(message);
            }
            let Some(op) = function.code.get(pc) else {
                log::warn!("{} ran past its last op", function.qualified_name());
                frame.opline = pc;
                return ExecOutcome::Returned(Value::Null);
            };

            match op {
                Op::Start | Op::Nop => {}
                Op::Const { dst, value } => assign!(*dst, value.clone()),
                Op::Move { dst, src } => {
                    // temporaries are read once, so their value moves instead of being copied
                    let value = if function.is_temp(*src) { frame.take_var(*src) } else { frame.var(*src) };
                    assign!(*dst, value);
                }
                Op::Binary { op, dst, lhs, rhs } => match binary(*op, &frame.var(*lhs), &frame.var(*rhs)) {
                    Ok(value) => assign!(*dst, value),
                    Err(exception) => throw!(exception),
                },
                Op::Yield { value, key, result } => {
                    if let Some(result) = result {
                        frame.set_var(*result, Value::Null);
                    }
                    frame.opline = pc;
                    return ExecOutcome::Suspended(Suspension::Yield {
                        value: value.map(|slot| frame.var(slot)),
                        key: key.map(|slot| frame.var(slot)),
                        send_target: *result,
                    });
                }
                Op::YieldFrom { src, result } => {
                    let source = frame.var(*src);
                    let target = match &source {
                        Value::Array(array) => DelegateTarget::Values(DelegationSource::array(array.clone())),
                        Value::Traversable(traversable) => match traversable.get_iterator() {
                            Ok(iter) => DelegateTarget::Values(DelegationSource::iterator(iter, source.clone())),
                            Err(exception) => throw!(exception),
                        },
                        Value::Generator(generator) => DelegateTarget::Generator(generator.clone()),
                        _ => throw!(Exception::error("Can use \"yield from\" only with arrays and Traversables")),
                    };
                    if let Some(result) = result {
                        frame.set_var(*result, Value::Null);
                    }
                    frame.opline = pc;
                    return ExecOutcome::Suspended(Suspension::Delegate {
                        target,
                        result_slot: *result,
                    });
                }
                Op::Return { src } => {
                    frame.opline = pc;
                    return ExecOutcome::Returned(src.map(|slot| frame.var(slot)).unwrap_or(Value::Null));
                }
                Op::Throw { src } => match frame.var(*src) {
                    Value::Exception(exception) => throw!(exception),
                    _ => throw!(Exception::error("Can only throw objects")),
                },
                Op::Jump { target } => {
                    pc = *target;
                    continue;
                }
                Op::JumpIfFalse { cond, target } => {
                    if !frame.var(*cond).is_truthy() {
                        pc = *target;
                        continue;
                    }
                }
                Op::Catch { class, dst, next } => {
                    let Some(exception) = caught.take() else {
                        frame.opline = pc;
                        return ExecOutcome::Aborted(format!("catch block of {} entered without an exception", function.qualified_name()));
                    };
                    if exception.is_instance_of(class) {
                        if let Some(dst) = dst {
                            assign!(*dst, Value::Exception(exception));
                        }
                    } else if let Some(next) = next {
                        caught = Some(exception);
                        pc = *next;
                        continue;
                    } else {
                        throw!(exception);
                    }
                }
                Op::FastCall { region, retval } => {
                    frame.fast_calls[*region] = FastCall {
                        exception: None,
                        return_op: Some(pc),
                        retval_slot: *retval,
                    };
                    pc = function.try_catch[*region].finally_op;
                    continue;
                }
                Op::FastRet { region } => {
                    let fast_call = std::mem::take(&mut frame.fast_calls[*region]);
                    if let Some(return_op) = fast_call.return_op {
                        pc = return_op + 1;
                        continue;
                    }
                    match Self::dispatch(frame, &mut caught, fast_call.exception, pc, Some(*region)) {
                        Flow::Jump(target) => {
                            pc = target;
                            continue;
                        }
                        Flow::Exit(outcome) => {
                            frame.opline = pc;
                            return outcome;
                        }
                    }
                }
                Op::DiscardFinally { region } => {
                    let fast_call = std::mem::take(&mut frame.fast_calls[*region]);
                    if fast_call.return_op.is_some()
                        && let Some(slot) = fast_call.retval_slot
                    {
                        frame.set_var(slot, Value::Null);
                    }
                }
                Op::InitCall { func, argc } => {
                    let id = ctx.stack.push_call(func.clone(), *argc, None, frame.call);
                    frame.call = Some(id);
                }
                Op::SendArg { arg, src } => {
                    let value = frame.var(*src);
                    match frame.call.and_then(|id| ctx.stack.args_mut(id)).and_then(|args| args.get_mut(*arg)) {
                        Some(slot) => *slot = value,
                        None => throw!(Exception::error(format!("Argument #{} sent without a pending call", arg + 1))),
                    }
                }
                Op::SendNamed { name, src } => {
                    let value = frame.var(*src);
                    match frame.call.and_then(|id| ctx.stack.call_mut(id)) {
                        Some(call) => {
                            call.extra_named_params.get_or_insert_default().insert(name.clone(), value);
                        }
                        None => throw!(Exception::error(format!("Named argument ${name} sent without a pending call"))),
                    }
                }
                Op::DoCall { dst } => match self.call(ctx, frame) {
                    Ok(value) => {
                        if let Some(dst) = dst {
                            assign!(*dst, value);
                        }
                    }
                    Err(exception) => throw!(exception),
                },
                Op::Echo { src } => {
                    let line = frame.var(*src).to_string();
                    log::debug!("echo: {line}");
                    self.output.push(line);
                }
                Op::NewGenerator { dst, func, args } => {
                    let args = args.iter().map(|slot| frame.var(*slot)).collect();
                    match self.instantiate(func, args, None) {
                        Ok(generator) => assign!(*dst, Value::Generator(generator)),
                        Err(exception) => throw!(exception),
                    }
                }
                Op::NewArray { dst, items } => {
                    let mut array = Array::new();
                    let mut next_key = 0;
                    for (key, value) in items {
                        let key = match key {
                            Some(slot) => match array_key(&frame.var(*slot)) {
                                Ok(key) => key,
                                Err(exception) => throw!(exception),
                            },
                            None => ArrayKey::Int(next_key),
                        };
                        if let ArrayKey::Int(i) = key
                            && i >= next_key
                        {
                            next_key = i + 1;
                        }
                        array.insert(key, frame.var(*value));
                    }
                    assign!(*dst, Value::Array(Rc::new(array)));
                }
                Op::NewRange { dst, start, end } => match (frame.var(*start).as_int(), frame.var(*end).as_int()) {
                    (Some(start), Some(end)) => assign!(*dst, Value::Traversable(Rc::new(Range::new(start, end)))),
                    _ => throw!(Exception::new("TypeError", "range(): bounds must be integers")),
                },
                Op::NewException { dst, class, message } => {
                    let message = message.map(|slot| frame.var(slot).to_string()).unwrap_or_default();
                    assign!(*dst, Value::Exception(Exception::new(class, message)));
                }
                Op::GenCall { dst, method, target, arg } => {
                    let target = frame.var(*target);
                    let arg = arg.map(|slot| frame.var(slot)).unwrap_or(Value::Null);
                    let result = self.gen_call(ctx, *method, &target, arg);
                    drop(target);
                    match result {
                        Ok(value) => {
                            if let Some(dst) = dst {
                                assign!(*dst, value);
                            }
                        }
                        Err(GeneratorError::Fatal { message }) => {
                            frame.opline = pc;
                            return ExecOutcome::Aborted(message);
                        }
                        Err(err) => throw!(err.into_exception()),
                    }
                }
                Op::Abort { message } => {
                    frame.opline = pc;
                    return ExecOutcome::Aborted(message.to_string());
                }
            }
            pc += 1;
        }
    }

    fn release_frame(&mut self, ctx: &mut ExecContext, frame: Frame) {
        for value in frame.vars {
            if let Err(exception) = self.release(ctx, value) {
                log::warn!("{exception} raised while releasing a frame of {}", frame.function.qualified_name());
            }
        }
    }

    fn cleanup_unfinished(&mut self, ctx: &mut ExecContext, frame: &mut Frame, op_num: usize, catch_op: usize) {
        log::trace!("cleanup of {} at op {op_num} up to {catch_op}", frame.function.qualified_name());
        frame.discard_pending_calls(&mut ctx.stack);
        if catch_op == 0 {
            // the whole frame is abandoned, nothing parked by finally blocks survives
            for fast_call in frame.fast_calls.iter_mut() {
                *fast_call = FastCall::default();
            }
        }
    }
}

/// Destroys the generator passed as first argument, surfacing what its finally
/// blocks raise.
fn destroy_native(interp: &mut Interpreter, ctx: &mut ExecContext, call: NativeCall) -> Result<Value, Exception> {
    match call.arg(0) {
        Value::Generator(generator) => resume::destroy(interp, ctx, &generator).map(|_| Value::Null).map_err(GeneratorError::into_exception),
        other => Err(Exception::new("TypeError", format!("destroy(): Argument #1 must be a Generator, {} given", other.type_name()))),
    }
}
