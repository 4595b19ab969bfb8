mod value;
pub use value::*;

mod exception;
pub use exception::*;

mod gc;
pub use gc::*;

mod function;
pub use function::*;

mod frame;
pub use frame::*;

mod context;
pub use context::*;
