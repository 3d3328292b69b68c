//! Assembly of IR text into compiled fragments.

pub mod fragment;
pub mod program;
mod random;

pub use program::{builtin_table, BuiltinDef, Fragment, FunctionRef, Program};
