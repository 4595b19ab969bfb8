use crate::core::Exception;

#[derive(thiserror::Error, Debug)]
pub enum GeneratorError {
    #[error("Cannot resume an already running generator")]
    AlreadyRunning,

    #[error("Cannot rewind a generator that was already run")]
    RewindAfterRun,

    #[error("Cannot get return value of a generator that hasn't returned")]
    NoReturnValue,

    #[error("Cannot traverse an already closed generator")]
    TraverseClosed,

    #[error("You can only iterate a generator by-reference if it declared that it yields by-reference")]
    ByReferenceMismatch,

    #[error("Uncaught {0}")]
    Thrown(Exception),

    #[error("Fatal error: {message}")]
    Fatal { message: String },

    #[error("Internal error at {method} {file}:{line}: {message}")]
    Internal {
        message: String,
        file: String,
        line: usize,
        method: String,
    },

    #[error("Assembly error at line {line}: {message}")]
    Asm { line: usize, message: String },

    #[error("std::io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GeneratorError {
    /// Converts the error into an exception object that can be raised inside user code.
    ///
    /// Protocol misuse becomes an `Error` (or plain `Exception` for the iterator
    /// protocol errors), a thrown exception is passed through unchanged.
    pub fn into_exception(self) -> Exception {
        match self {
            GeneratorError::Thrown(exc) => exc,
            GeneratorError::RewindAfterRun
            | GeneratorError::NoReturnValue
            | GeneratorError::TraverseClosed
            | GeneratorError::ByReferenceMismatch => Exception::new("Exception", self.to_string()),
            other => Exception::error(other.to_string()),
        }
    }

    /// The exception carried by `Thrown`, if any.
    pub fn thrown(&self) -> Option<&Exception> {
        match self {
            GeneratorError::Thrown(exc) => Some(exc),
            _ => None,
        }
    }
}

impl From<GeneratorError> for std::io::Error {
    fn from(err: GeneratorError) -> std::io::Error {
        match err {
            GeneratorError::IoError(io_err) => io_err,
            _ => std::io::Error::other(err.to_string()),
        }
    }
}

// Builds an `Internal` error at the invocation site. A macro (rather than a
// function) makes `file!()` and `line!()` expand where the invariant broke.
#[macro_export]
macro_rules! internal_error_here {
    ($msg:expr) => {
        $crate::GeneratorError::Internal {
            message: $msg.to_string(),
            file: file!().to_string(),
            line: line!() as usize,
            method: $crate::function_name!().to_string(),
        }
    };
}

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        // remove the trailing "::f"
        &name[..name.len() - 3]
    }};
}
