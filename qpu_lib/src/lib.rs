pub mod ast;
pub mod compile;
pub mod diagnostic;
pub mod heap;
pub mod kernel;
pub mod passes;
