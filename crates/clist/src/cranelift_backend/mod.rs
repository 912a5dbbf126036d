//! Cranelift code generation and loading of specialized list types.

pub(crate) mod abi;
pub(crate) mod buffer;
mod generate;
mod jit_module;
mod loader;
pub(crate) mod runtime_helpers;
mod unit;

pub use generate::CompactListGenerator;
pub use loader::{GeneratedList, LoadedType, LoaderScope};
pub use unit::{GeneratedUnit, MethodBody, MethodKind, Symbol, SymbolOrigin};
