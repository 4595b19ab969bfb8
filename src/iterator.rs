//! Iterator-facing surface of a generator and its GC reachability report.
//!
//! Every accessor resolves the effective generator first, so a consumer that
//! delegates reports the values of whatever generator currently produces them.

use crate::core::{ExecContext, Exception, GcBuffer, Trace, Value};
use crate::error::GeneratorError;
use crate::executor::FrameExecutor;
use crate::generator::GeneratorRef;
use crate::resume::{resolve_effective, resume, throw_into};

/// Runs an unstarted generator to its first suspension point.
pub fn ensure_initialized<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
) -> Result<(), GeneratorError> {
    if generator.value.borrow().is_none() && !generator.is_finished() && generator.parent().is_none() {
        let result = resume(exec, ctx, generator);
        generator.update_flags(|f| f.at_first_yield = true);
        return result;
    }
    Ok(())
}

pub fn rewind<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<(), GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    if !generator.flags().at_first_yield {
        return Err(GeneratorError::RewindAfterRun);
    }
    Ok(())
}

pub fn valid<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<bool, GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    resolve_effective(exec, ctx, generator)?;
    Ok(!generator.is_finished())
}

pub fn current<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
) -> Result<Option<Value>, GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    let root = resolve_effective(exec, ctx, generator)?;
    if generator.is_finished() {
        return Ok(None);
    }
    Ok(root.value())
}

pub fn key<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<Option<Value>, GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    let root = resolve_effective(exec, ctx, generator)?;
    if generator.is_finished() {
        return Ok(None);
    }
    Ok(root.key())
}

pub fn next<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<(), GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    resume(exec, ctx, generator)
}

/// Writes `value` as the result of the pending `yield` and resumes. Returns the
/// next current value, `None` once the generator finished.
pub fn send<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
    value: Value,
) -> Result<Option<Value>, GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    if generator.is_finished() {
        return Ok(None);
    }

    let root = resolve_effective(exec, ctx, generator)?;
    if !root.is_running()
        && let Some(slot) = root.send_target.get()
    {
        root.with_frame_mut(|frame| frame.set_var(slot, value));
    }
    resume(exec, ctx, generator)?;

    let root = resolve_effective(exec, ctx, generator)?;
    Ok(if generator.is_finished() { None } else { root.value() })
}

/// Throws `exception` at the current suspension point. A finished generator
/// rethrows it to the caller unchanged.
pub fn throw<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
    exception: Exception,
) -> Result<Option<Value>, GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    if generator.is_finished() {
        return Err(GeneratorError::Thrown(exception));
    }
    throw_into(exec, ctx, generator, exception)?;
    let root = resolve_effective(exec, ctx, generator)?;
    Ok(if generator.is_finished() { None } else { root.value() })
}

pub fn get_return<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<Value, GeneratorError> {
    ensure_initialized(exec, ctx, generator)?;
    generator.retval().ok_or(GeneratorError::NoReturnValue)
}

/// Foreach-style iteration: rewinds first, then advances after every pair.
pub fn get_iterator<'a, E: FrameExecutor + ?Sized>(
    exec: &'a mut E,
    ctx: &'a mut ExecContext,
    generator: &GeneratorRef,
    by_ref: bool,
) -> Result<GeneratorIter<'a, E>, GeneratorError> {
    if generator.is_finished() {
        return Err(GeneratorError::TraverseClosed);
    }
    if by_ref && !generator.function().flags.returns_reference {
        return Err(GeneratorError::ByReferenceMismatch);
    }
    Ok(GeneratorIter {
        exec,
        ctx,
        generator: generator.clone(),
        started: false,
        done: false,
    })
}

pub struct GeneratorIter<'a, E: FrameExecutor + ?Sized> {
    exec: &'a mut E,
    ctx: &'a mut ExecContext,
    generator: GeneratorRef,
    started: bool,
    done: bool,
}

impl<E: FrameExecutor + ?Sized> GeneratorIter<'_, E> {
    fn step(&mut self) -> Result<Option<(Value, Value)>, GeneratorError> {
        if self.started {
            next(self.exec, self.ctx, &self.generator)?;
        } else {
            self.started = true;
            rewind(self.exec, self.ctx, &self.generator)?;
        }
        if !valid(self.exec, self.ctx, &self.generator)? {
            return Ok(None);
        }
        let value = current(self.exec, self.ctx, &self.generator)?.unwrap_or(Value::Null);
        let key = key(self.exec, self.ctx, &self.generator)?.unwrap_or(Value::Null);
        Ok(Some((key, value)))
    }
}

impl<E: FrameExecutor + ?Sized> Iterator for GeneratorIter<'_, E> {
    type Item = Result<(Value, Value), GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Reports what `generator` keeps reachable.
///
/// A running generator reports nothing and marks the buffer deferred since its
/// frame is out on the executor. The delegate (`parent`) is reported so tracing
/// keeps the whole chain alive.
pub fn get_gc<E: FrameExecutor + ?Sized>(exec: &E, generator: &GeneratorRef, buf: &mut GcBuffer) {
    if generator.is_running() {
        buf.defer();
        return;
    }
    buf.add_slot(&generator.value.borrow());
    buf.add_slot(&generator.key.borrow());
    buf.add_slot(&generator.retval.borrow());
    if generator.is_finished() {
        return;
    }

    if let Some(source) = generator.source.borrow().as_ref() {
        source.trace(buf);
    }
    let frame = generator.frame();
    if let Some(frame) = frame.as_deref() {
        exec.frame_gc(frame, generator.frozen_calls.borrow().as_ref(), buf);
    }
    if let Some(parent) = generator.parent() {
        buf.add_generator(&parent);
    }
}
