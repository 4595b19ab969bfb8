use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub const CLOSED_GENERATOR_EXCEPTION: &str = "ClosedGeneratorException";

/// A thrown object: class name, message and an optional cause chain.
///
/// Cloning shares the same object, identity is pointer identity.
#[derive(Clone)]
pub struct Exception(Rc<ExceptionData>);

struct ExceptionData {
    class: Rc<str>,
    message: String,
    previous: RefCell<Option<Exception>>,
}

impl Exception {
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        Exception(Rc::new(ExceptionData {
            class: Rc::from(class),
            message: message.into(),
            previous: RefCell::new(None),
        }))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Exception::new("Error", message)
    }

    pub fn closed_generator(message: impl Into<String>) -> Self {
        Exception::new(CLOSED_GENERATOR_EXCEPTION, message)
    }

    pub fn class(&self) -> &str {
        &self.0.class
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn previous(&self) -> Option<Exception> {
        self.0.previous.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &Exception) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Walks the class hierarchy of the built-in exception classes.
    /// User classes not listed here derive from `Exception`.
    pub fn is_instance_of(&self, class: &str) -> bool {
        let mut current: &str = self.class();
        loop {
            if current == class {
                return true;
            }
            match parent_class(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Appends `previous` to the end of this exception's cause chain.
    ///
    /// Linking an exception into its own chain is ignored, so chains stay acyclic.
    pub fn set_previous(&self, previous: Exception) {
        if self.ptr_eq(&previous) {
            return;
        }
        let mut cursor = Some(previous.clone());
        while let Some(exc) = cursor {
            if exc.ptr_eq(self) {
                return;
            }
            cursor = exc.previous();
        }
        let mut tail = self.clone();
        while let Some(next) = tail.previous() {
            if next.ptr_eq(&previous) {
                return;
            }
            tail = next;
        }
        *tail.0.previous.borrow_mut() = Some(previous);
    }

    /// This exception followed by its causes, outermost first.
    pub fn chain(&self) -> Vec<Exception> {
        let mut out = vec![self.clone()];
        while let Some(prev) = out.last().and_then(|e| e.previous()) {
            out.push(prev);
        }
        out
    }
}

fn parent_class(class: &str) -> Option<&'static str> {
    match class {
        "Throwable" => None,
        "Error" | "Exception" => Some("Throwable"),
        "TypeError" | "ValueError" | "ArithmeticError" => Some("Error"),
        "DivisionByZeroError" => Some("ArithmeticError"),
        "ArgumentCountError" => Some("TypeError"),
        _ => Some("Exception"),
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class(), self.message())
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Exception");
        d.field("class", &self.class()).field("message", &self.message());
        if let Some(prev) = self.previous() {
            d.field("previous", &prev);
        }
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_of_builtin_classes() {
        let e = Exception::closed_generator("x");
        assert!(e.is_instance_of("Exception"));
        assert!(e.is_instance_of("Throwable"));
        assert!(!e.is_instance_of("Error"));
        assert!(Exception::new("DivisionByZeroError", "x").is_instance_of("Error"));
    }

    #[test]
    fn set_previous_appends_to_tail_and_ignores_cycles() {
        let a = Exception::error("a");
        let b = Exception::error("b");
        let c = Exception::error("c");
        a.set_previous(b.clone());
        a.set_previous(c.clone());
        let chain: Vec<_> = a.chain().iter().map(|e| e.message().to_string()).collect();
        assert_eq!(chain, vec!["a", "b", "c"]);

        c.set_previous(a.clone());
        assert!(c.previous().is_none());
        a.set_previous(a.clone());
        assert_eq!(a.chain().len(), 3);
    }
}
