//! Runtime library surface: the native functions compiled code calls and
//! the registry that binds their names to addresses and signatures.

pub mod natives;
pub mod registry;

pub use registry::{
    FunctionFamily, RuntimeEntry, RuntimeError, RuntimeManager, standard_registry,
};
