//! The resume driver: runs the effective generator of a consumer until it produces
//! a value, finishes or fails, and closes or destroys generators.

use crate::core::{Activation, ExecContext, Exception, FastCall, FrozenCallStack, SuspendKind, Value};
use crate::delegation;
use crate::error::GeneratorError;
use crate::executor::{DelegateTarget, ExecOutcome, FrameExecutor, Suspension};
use crate::generator::{GeneratorRef, GeneratorState};
use crate::internal_error_here;
use std::rc::Rc;

const YIELD_IN_FORCED_CLOSE: &str = "Cannot yield from finally in a force-closed generator";
const YIELD_FROM_IN_FORCED_CLOSE: &str = "Cannot use \"yield from\" in a force-closed generator";
const ABORTED_DELEGATE: &str = "Generator passed to yield from was aborted without proper return and is unable to continue";
const SELF_DELEGATION: &str = "Impossible to yield from the Generator being currently run";
const NO_RETURN_VALUE: &str = "Generator yielded from aborted, no return value available";

pub(crate) struct Effective {
    pub(crate) generator: GeneratorRef,
    /// Resolution raised an exception into the new effective generator.
    pub(crate) raised: bool,
}

impl Effective {
    fn plain(generator: GeneratorRef) -> Self {
        Effective { generator, raised: false }
    }
}

/// Resolves through the delegation tree without running any code.
///
/// When the cached root finished, the next live generator takes over: unless an
/// exception is in flight or the consumer is being destroyed, the finished
/// delegate's return value is written into the `yield from` result and its last
/// value is copied, or `ClosedGeneratorException` is raised when it left no
/// return value.
pub(crate) fn effective(ctx: &ExecContext, generator: &GeneratorRef, in_flight: bool) -> Result<Effective, GeneratorError> {
    if generator.parent().is_none() {
        return Ok(Effective::plain(generator.clone()));
    }
    let root = match delegation::cached_root(generator) {
        Some(root) => root,
        None => delegation::update_root(generator),
    };
    if !root.is_finished() {
        return Ok(Effective::plain(root));
    }
    update_current(ctx, generator, root, in_flight)
}

enum Transfer {
    Skipped,
    Returned,
    Raised,
}

fn update_current(ctx: &ExecContext, generator: &GeneratorRef, old_root: GeneratorRef, in_flight: bool) -> Result<Effective, GeneratorError> {
    let new_root = delegation::find_new_root(generator, old_root.clone());
    delegation::reroot(generator, &old_root, &new_root);

    let Some(delegate) = new_root.parent() else {
        return Err(internal_error_here!(format!("generator #{} has no finished delegate", new_root.id())));
    };
    delegation::remove_child(&delegate, new_root.id());

    let mut transfer = Transfer::Skipped;
    if !in_flight && ctx.exception.is_none() && !generator.flags().destructor_called {
        let retval = delegate.retval();
        transfer = new_root
            .with_frame_mut(|frame| {
                let SuspendKind::YieldFrom { result_slot } = frame.suspension else {
                    return Transfer::Skipped;
                };
                match retval {
                    Some(retval) => {
                        if let Some(slot) = result_slot {
                            frame.set_var(slot, retval);
                        }
                        Transfer::Returned
                    }
                    None => {
                        frame.raise(Exception::closed_generator(NO_RETURN_VALUE));
                        Transfer::Raised
                    }
                }
            })
            .unwrap_or(Transfer::Skipped);
        if let Transfer::Returned = transfer {
            *new_root.value.borrow_mut() = delegate.value();
        }
    }

    log::debug!("generator #{} left finished delegate #{}", new_root.id(), delegate.id());
    delegation::release_parent(&new_root);
    Ok(Effective {
        generator: new_root,
        raised: matches!(transfer, Transfer::Raised),
    })
}

/// The generator currently producing values on behalf of `generator`.
///
/// Equals `generator` for a generator that is not delegating. If resolution had to
/// raise into a delegating frame, that frame runs before the answer is returned.
pub fn resolve_effective<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
) -> Result<GeneratorRef, GeneratorError> {
    let resolved = effective(ctx, generator, false)?;
    if resolved.raised {
        resume(exec, ctx, generator)?;
        return Ok(effective(ctx, generator, false)?.generator);
    }
    Ok(resolved.generator)
}

enum Step {
    /// A value/key pair is available.
    Produced,
    /// The frame started yielding from another generator.
    Linked,
    Returned(Value),
    Raised(Exception),
    Unwound,
    Aborted(String),
}

/// Advances `generator` to its next value.
///
/// Resuming a finished generator does nothing. Resuming a generator whose effective
/// generator is already running fails with `AlreadyRunning`.
pub fn resume<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<(), GeneratorError> {
    let current = effective(ctx, generator, false)?.generator;
    if current.is_finished() {
        return Ok(());
    }
    let result = drive(exec, ctx, generator, current);
    generator.update_flags(|f| {
        f.do_init = false;
        f.in_fiber = false;
    });
    result
}

fn drive<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    orig: &GeneratorRef,
    mut generator: GeneratorRef,
) -> Result<(), GeneratorError> {
    loop {
        if generator.is_finished() {
            return Ok(());
        }
        if generator.is_running() {
            return Err(GeneratorError::AlreadyRunning);
        }
        // a freshly linked delegate that already produced a value must not be advanced
        if orig.flags().do_init && generator.value.borrow().is_some() && !generator.has_pending_exception() {
            return Ok(());
        }

        if ctx.in_fiber() {
            orig.update_flags(|f| f.in_fiber = true);
            generator.update_flags(|f| f.in_fiber = true);
        }
        orig.update_flags(|f| f.at_first_yield = false);

        log::trace!("resuming generator #{} for #{}", generator.id(), orig.id());
        let step = ctx.with_activation(Activation::new(&generator, orig), |ctx| run_once(exec, ctx, &generator));
        generator.update_flags(|f| f.in_fiber = false);

        match step? {
            Step::Produced => {}
            Step::Linked => {
                generator = effective(ctx, orig, false)?.generator;
                continue;
            }
            Step::Returned(value) => {
                *generator.retval.borrow_mut() = Some(value);
                close(exec, ctx, &generator, true);
            }
            Step::Unwound => close(exec, ctx, &generator, true),
            Step::Raised(exception) => {
                close(exec, ctx, &generator, true);
                if Rc::ptr_eq(&generator, orig) {
                    return Err(GeneratorError::Thrown(exception));
                }
                generator = effective(ctx, orig, true)?.generator;
                log::debug!("rethrowing {exception} into generator #{}", generator.id());
                raise_at_suspension(&generator, exception);
                orig.update_flags(|f| f.do_init = false);
                continue;
            }
            Step::Aborted(message) => {
                ctx.unclean_shutdown = true;
                close(exec, ctx, &generator, false);
                return Err(GeneratorError::Fatal { message });
            }
        }

        // the delegate returned, hand its result to the delegating frame and keep going
        if !Rc::ptr_eq(&generator, orig) && generator.retval.borrow().is_some() {
            generator = effective(ctx, orig, false)?.generator;
            continue;
        }
        return Ok(());
    }
}

fn run_once<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<Step, GeneratorError> {
    let previous = generator.state();
    generator.set_state(GeneratorState::Running);

    let source = generator.source.borrow_mut().take();
    if let Some(mut source) = source {
        match source.next_delegated() {
            Ok(Some((value, key))) => {
                generator.install_pair(value, key);
                *generator.source.borrow_mut() = Some(source);
                generator.set_state(previous);
                return Ok(Step::Produced);
            }
            Ok(None) => log::trace!("delegated values of generator #{} exhausted", generator.id()),
            Err(exception) => {
                generator.with_frame_mut(|frame| frame.raise(exception));
            }
        }
    }

    let Some(mut frame) = generator.take_frame() else {
        generator.set_state(previous);
        return Err(internal_error_here!(format!("generator #{} has no frame to resume", generator.id())));
    };
    let frozen = generator.frozen_calls.borrow_mut().take();
    if let Some(frozen) = frozen {
        frozen.thaw(&mut ctx.stack, &mut frame);
    }

    if frame.pending_exception.is_none() {
        frame.opline += 1;
    }
    let step = loop {
        match exec.execute(ctx, &mut frame) {
            ExecOutcome::Suspended(suspension) => {
                if let Some(step) = handle_suspension(generator, &mut frame, suspension) {
                    break step;
                }
            }
            ExecOutcome::Returned(value) => break Step::Returned(value),
            ExecOutcome::Raised(exception) => break Step::Raised(exception),
            ExecOutcome::Unwound => break Step::Unwound,
            ExecOutcome::Aborted(message) => break Step::Aborted(message),
        }
    };

    match step {
        Step::Produced | Step::Linked => {
            let frozen = FrozenCallStack::freeze(&mut ctx.stack, &mut frame);
            *generator.frozen_calls.borrow_mut() = frozen;
        }
        _ => frame.discard_pending_calls(&mut ctx.stack),
    }
    generator.put_frame(frame);
    generator.set_state(match step {
        Step::Linked => GeneratorState::Delegating,
        _ => GeneratorState::Suspended,
    });
    Ok(step)
}

/// Applies a suspension reported by the executor. `None` means the frame has to
/// continue right away, possibly with an exception raised at the suspension op.
fn handle_suspension(generator: &GeneratorRef, frame: &mut crate::core::Frame, suspension: Suspension) -> Option<Step> {
    let forced_close = generator.flags().forced_close;
    match suspension {
        Suspension::Yield { .. } if forced_close => {
            frame.raise(Exception::error(YIELD_IN_FORCED_CLOSE));
            None
        }
        Suspension::Yield { value, key, send_target } => {
            generator.install_yield(value, key);
            generator.send_target.set(send_target);
            frame.suspension = SuspendKind::Yield;
            Some(Step::Produced)
        }
        Suspension::Delegate { .. } if forced_close => {
            frame.raise(Exception::error(YIELD_FROM_IN_FORCED_CLOSE));
            None
        }
        Suspension::Delegate { target, result_slot } => {
            frame.suspension = SuspendKind::YieldFrom { result_slot };
            generator.send_target.set(None);
            match target {
                DelegateTarget::Values(mut source) => {
                    if let Err(exception) = source.rewind() {
                        frame.raise(exception);
                        return None;
                    }
                    match source.next_delegated() {
                        Ok(Some((value, key))) => {
                            generator.install_pair(value, key);
                            *generator.source.borrow_mut() = Some(source);
                            Some(Step::Produced)
                        }
                        Ok(None) => {
                            frame.opline += 1;
                            None
                        }
                        Err(exception) => {
                            frame.raise(exception);
                            None
                        }
                    }
                }
                DelegateTarget::Generator(target) => {
                    if target.is_finished() {
                        match target.retval() {
                            Some(retval) => {
                                if let Some(slot) = result_slot {
                                    frame.set_var(slot, retval);
                                }
                                frame.opline += 1;
                            }
                            None => frame.raise(Exception::error(ABORTED_DELEGATE)),
                        }
                        None
                    } else if Rc::ptr_eq(&delegation::tree_root(&target), generator) {
                        frame.raise(Exception::error(SELF_DELEGATION));
                        None
                    } else {
                        delegation::link(generator, &target);
                        Some(Step::Linked)
                    }
                }
            }
        }
    }
}

/// Raises `exception` at the suspension point of a suspended generator and stops
/// any value delegation in progress.
fn raise_at_suspension(generator: &GeneratorRef, exception: Exception) {
    if generator.with_frame_mut(|frame| frame.raise(exception)).is_none() {
        log::debug!("generator #{} has no frame, exception dropped", generator.id());
    }
    generator.source.borrow_mut().take();
}

/// Throws `exception` into the effective generator of `generator` and resumes it.
pub fn throw_into<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
    exception: Exception,
) -> Result<(), GeneratorError> {
    let current = resolve_effective(exec, ctx, generator)?;
    if current.is_running() {
        log::debug!("discarding {exception}, generator #{} is running", current.id());
        return Err(GeneratorError::AlreadyRunning);
    }
    if current.is_finished() {
        return Ok(());
    }
    raise_at_suspension(&current, exception);
    resume(exec, ctx, generator)
}

/// Releases the frame of `generator`.
///
/// A frame closed before it finished gets its pending calls released first, unless
/// the context went through an unrecoverable abort.
pub fn close<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef, finished: bool) {
    let Some(mut frame) = generator.take_frame() else {
        return;
    };
    generator.send_target.set(None);
    let frozen = generator.frozen_calls.borrow_mut().take();
    generator.source.borrow_mut().take();
    // a closed consumer no longer yields from anything
    if generator.parent().is_some() {
        delegation::detach(generator);
    }
    generator.set_state(if generator.retval.borrow().is_some() {
        GeneratorState::Completed
    } else {
        GeneratorState::Closed
    });

    if ctx.unclean_shutdown {
        log::debug!("generator #{} discarded without cleanup", generator.id());
        return;
    }
    if !finished && frame.opline != 0 {
        if let Some(frozen) = frozen {
            frozen.thaw(&mut ctx.stack, &mut frame);
        }
        let op_num = frame.opline;
        exec.cleanup_unfinished(ctx, &mut frame, op_num, 0);
    }
    log::trace!("closed generator #{}", generator.id());
    exec.release_frame(ctx, *frame);
}

/// Destructor-time close: runs pending finally code, then releases the frame.
///
/// Destroying a generator whose delegation chain is running inside a fiber only
/// marks it force-closed; destroying a running generator outside a fiber is
/// refused. Both cases leave the destructor to be run again later.
pub fn destroy<E: FrameExecutor + ?Sized>(exec: &mut E, ctx: &mut ExecContext, generator: &GeneratorRef) -> Result<(), GeneratorError> {
    if generator.flags().destructor_called {
        return Ok(());
    }
    generator.update_flags(|f| f.destructor_called = true);

    let current = effective(ctx, generator, false)?.generator;
    if current.is_running() {
        if current.flags().in_fiber && delegation::running_in_fiber(generator) {
            generator.update_flags(|f| {
                f.forced_close = true;
                f.destructor_called = false;
            });
            log::debug!("generator #{} runs in a fiber, destruction deferred", generator.id());
            return Ok(());
        }
        if generator.is_running() {
            generator.update_flags(|f| f.destructor_called = false);
            log::warn!("generator #{} is running, destruction deferred", generator.id());
            return Ok(());
        }
    }

    generator.source.borrow_mut().take();
    delegation::detach(generator);

    let function = generator.function().clone();
    let op_num = generator.frame().as_ref().map(|frame| frame.opline);
    let op_num = match op_num {
        Some(op_num) if function.flags.has_finally && !ctx.unclean_shutdown => op_num,
        _ => {
            close(exec, ctx, generator, false);
            return Ok(());
        }
    };

    let mut result = Ok(());
    let mut offset = function.innermost_region(op_num);
    while let Some(index) = offset {
        let region = function.try_catch[index];
        if op_num < region.finally_op {
            // only one finally block is entered per pass; a yield inside it raises
            result = run_finally(exec, ctx, generator, op_num, index, region.finally_op);
            break;
        } else if op_num < region.finally_end {
            generator.with_frame_mut(|frame| {
                let fast_call = frame.fast_calls.get_mut(index).map(std::mem::take).unwrap_or_default();
                if fast_call.return_op.is_some()
                    && let Some(slot) = fast_call.retval_slot
                {
                    frame.set_var(slot, Value::Null);
                }
            });
        }
        offset = index.checked_sub(1);
    }

    close(exec, ctx, generator, false);
    result
}

fn run_finally<E: FrameExecutor + ?Sized>(
    exec: &mut E,
    ctx: &mut ExecContext,
    generator: &GeneratorRef,
    op_num: usize,
    region: usize,
    finally_op: usize,
) -> Result<(), GeneratorError> {
    let Some(mut frame) = generator.take_frame() else {
        return Ok(());
    };
    let frozen = generator.frozen_calls.borrow_mut().take();
    if let Some(frozen) = frozen {
        frozen.thaw(&mut ctx.stack, &mut frame);
    }
    exec.cleanup_unfinished(ctx, &mut frame, op_num, finally_op);
    if let Some(fast_call) = frame.fast_calls.get_mut(region) {
        *fast_call = FastCall::default();
    }
    frame.pending_exception = None;
    frame.opline = finally_op - 1;
    generator.put_frame(frame);
    generator.update_flags(|f| f.forced_close = true);
    log::debug!("running finally block of generator #{} at op {finally_op}", generator.id());

    let in_flight = ctx.exception.take();
    let raised = match resume(exec, ctx, generator) {
        Ok(()) => None,
        Err(GeneratorError::Thrown(exception)) => Some(exception),
        Err(other) => {
            ctx.exception = in_flight;
            return Err(other);
        }
    };
    match (raised, in_flight) {
        (Some(exception), Some(previous)) => {
            exception.set_previous(previous);
            Err(GeneratorError::Thrown(exception))
        }
        (Some(exception), None) => Err(GeneratorError::Thrown(exception)),
        (None, previous) => {
            ctx.exception = previous;
            Ok(())
        }
    }
}
