use crate::core::{ExecContext, Exception, GcBuffer, Value};
use crate::error::GeneratorError;
use crate::executor::FrameExecutor;
use crate::generator::GeneratorRef;
use crate::interp::{Interpreter, assemble};
use crate::{iterator, resume};

/// An executor together with the execution context it runs in.
pub struct Runtime<E: FrameExecutor> {
    pub executor: E,
    pub ctx: ExecContext,
}

impl<E: FrameExecutor> Runtime<E> {
    pub fn new(executor: E) -> Self {
        Runtime {
            executor,
            ctx: ExecContext::new(),
        }
    }

    pub fn resume(&mut self, generator: &GeneratorRef) -> Result<(), GeneratorError> {
        resume::resume(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn throw_into(&mut self, generator: &GeneratorRef, exception: Exception) -> Result<(), GeneratorError> {
        resume::throw_into(&mut self.executor, &mut self.ctx, generator, exception)
    }

    pub fn close(&mut self, generator: &GeneratorRef, finished: bool) {
        resume::close(&mut self.executor, &mut self.ctx, generator, finished)
    }

    pub fn destroy(&mut self, generator: &GeneratorRef) -> Result<(), GeneratorError> {
        resume::destroy(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn resolve_effective(&mut self, generator: &GeneratorRef) -> Result<GeneratorRef, GeneratorError> {
        resume::resolve_effective(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn ensure_initialized(&mut self, generator: &GeneratorRef) -> Result<(), GeneratorError> {
        iterator::ensure_initialized(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn rewind(&mut self, generator: &GeneratorRef) -> Result<(), GeneratorError> {
        iterator::rewind(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn valid(&mut self, generator: &GeneratorRef) -> Result<bool, GeneratorError> {
        iterator::valid(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn current(&mut self, generator: &GeneratorRef) -> Result<Option<Value>, GeneratorError> {
        iterator::current(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn key(&mut self, generator: &GeneratorRef) -> Result<Option<Value>, GeneratorError> {
        iterator::key(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn next(&mut self, generator: &GeneratorRef) -> Result<(), GeneratorError> {
        iterator::next(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn send(&mut self, generator: &GeneratorRef, value: Value) -> Result<Option<Value>, GeneratorError> {
        iterator::send(&mut self.executor, &mut self.ctx, generator, value)
    }

    pub fn throw(&mut self, generator: &GeneratorRef, exception: Exception) -> Result<Option<Value>, GeneratorError> {
        iterator::throw(&mut self.executor, &mut self.ctx, generator, exception)
    }

    pub fn get_return(&mut self, generator: &GeneratorRef) -> Result<Value, GeneratorError> {
        iterator::get_return(&mut self.executor, &mut self.ctx, generator)
    }

    pub fn get_gc(&self, generator: &GeneratorRef) -> GcBuffer {
        let mut buf = GcBuffer::new();
        iterator::get_gc(&self.executor, generator, &mut buf);
        buf
    }

    pub fn iter(&mut self, generator: &GeneratorRef, by_ref: bool) -> Result<iterator::GeneratorIter<'_, E>, GeneratorError> {
        iterator::get_iterator(&mut self.executor, &mut self.ctx, generator, by_ref)
    }

    /// Runs `f` inside a fresh fiber.
    pub fn in_fiber<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.ctx.enter_fiber();
        let result = f(self);
        self.ctx.leave_fiber(previous);
        result
    }
}

impl Runtime<Interpreter> {
    /// Assembles `source` and wraps a fresh interpreter for it.
    pub fn from_source(source: &str) -> Result<Self, GeneratorError> {
        Ok(Runtime::new(Interpreter::new(assemble(source)?)))
    }

    pub fn spawn(&self, name: &str, args: Vec<Value>) -> Result<GeneratorRef, GeneratorError> {
        self.executor.spawn(name, args)
    }

    pub fn take_output(&mut self) -> Vec<String> {
        self.executor.take_output()
    }
}
