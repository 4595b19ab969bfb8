use crate::core::{Exception, VmStack};
use crate::delegation;
use crate::generator::GeneratorRef;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(u64);

/// One entry of the activation stack: a generator frame being executed.
///
/// When the executing generator runs on behalf of a delegating consumer, the
/// consumer is recorded so backtraces can show the whole delegation chain.
#[derive(Debug, Clone)]
pub struct Activation {
    pub generator: GeneratorRef,
    pub consumer: Option<GeneratorRef>,
}

impl Activation {
    pub fn new(generator: &GeneratorRef, consumer: &GeneratorRef) -> Self {
        Activation {
            generator: generator.clone(),
            consumer: (!Rc::ptr_eq(generator, consumer)).then(|| consumer.clone()),
        }
    }
}

/// Execution context passed explicitly through every resume.
#[derive(Debug, Default)]
pub struct ExecContext {
    pub stack: VmStack,
    /// Exception propagating in the host while generator code runs.
    pub exception: Option<Exception>,
    /// Set after an unrecoverable abort; cleanup of unfinished frames is skipped from then on.
    pub unclean_shutdown: bool,
    fiber: Option<FiberId>,
    next_fiber: u64,
    activations: Vec<Activation>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_fiber(&self) -> bool {
        self.fiber.is_some()
    }

    /// Switches to a fresh fiber and returns the one that was active before.
    pub fn enter_fiber(&mut self) -> Option<FiberId> {
        self.next_fiber += 1;
        self.fiber.replace(FiberId(self.next_fiber))
    }

    pub fn leave_fiber(&mut self, previous: Option<FiberId>) {
        self.fiber = previous;
    }

    /// Runs `f` with `activation` on top of the activation stack. The entry is
    /// popped on every return path of `f`.
    pub fn with_activation<R>(&mut self, activation: Activation, f: impl FnOnce(&mut Self) -> R) -> R {
        self.activations.push(activation);
        let depth = self.activations.len();
        let result = f(self);
        self.activations.truncate(depth - 1);
        result
    }

    pub fn depth(&self) -> usize {
        self.activations.len()
    }

    /// Names of the active generator functions, innermost first.
    ///
    /// A delegated activation expands into the executing generator followed by every
    /// delegating generator down to the consumer that was resumed.
    pub fn backtrace(&self) -> Vec<String> {
        let mut out = Vec::new();
        for activation in self.activations.iter().rev() {
            match &activation.consumer {
                Some(consumer) => {
                    let chain = delegation::chain(consumer);
                    if !chain.last().is_some_and(|root| Rc::ptr_eq(root, &activation.generator)) {
                        out.push(activation.generator.function().qualified_name());
                    }
                    out.extend(chain.iter().rev().map(|g| g.function().qualified_name()));
                }
                None => out.push(activation.generator.function().qualified_name()),
            }
        }
        out
    }
}
