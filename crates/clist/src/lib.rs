mod config;
mod contract;
mod cranelift_backend;
mod error;
mod factory;
mod kinds;
mod object_list;
mod value;

pub use config::{
    parse_clist_toml, read_clist_toml, ClistConfig, FactoryConfig, JitConfig, KindsConfig,
    OptLevel,
};
pub use contract::{grown_capacity, CompactList, DEFAULT_CAPACITY};
pub use error::{ClistError, DefinitionError, ListError};
pub use factory::{CompactListFactory, FactoryStats};
pub use kinds::{ElementLayout, KindDescriptor, KindTable, LoadEncoding, StoreEncoding};
pub use object_list::ObjectCompactList;
pub use value::{Element, ElementKind, Value};

pub mod codegen {
    pub use crate::cranelift_backend::{
        CompactListGenerator, GeneratedList, GeneratedUnit, LoadedType, LoaderScope, MethodBody,
        MethodKind, Symbol, SymbolOrigin,
    };
}
