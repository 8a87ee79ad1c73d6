mod exception;
mod function;
mod values;

pub use exception::{ExcType, Exception};
pub use function::{FunctionValue, NativeFn, NativeFunction, Scope};
pub use values::*;
