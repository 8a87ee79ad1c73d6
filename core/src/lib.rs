pub mod op;
pub mod util;
pub mod val;

// Stack VM: decoder, dispatcher, frames and unwinding
pub mod vm;
