//! The artifact passed from the generator to the loader.
//!
//! Method bodies never name module functions directly. Every call target is
//! an index into the unit's symbol pool, encoded as a user external name in
//! namespace 0; the loader rewrites those indices into function ids once it
//! has declared the pool in a JIT module.

use std::fmt;

use cranelift_codegen::ir::{Function, Signature, Type};
use cranelift_codegen::isa::CallConv;

use crate::kinds::ElementLayout;
use crate::ElementKind;

/// Methods every generated list type defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Init,
    Size,
    Add,
    Get,
    CheckRange,
    EnsureCapacity,
}

impl MethodKind {
    pub const ALL: [MethodKind; 6] = [
        MethodKind::Init,
        MethodKind::Size,
        MethodKind::Add,
        MethodKind::Get,
        MethodKind::CheckRange,
        MethodKind::EnsureCapacity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MethodKind::Init => "init",
            MethodKind::Size => "size",
            MethodKind::Add => "add",
            MethodKind::Get => "get",
            MethodKind::CheckRange => "check_range",
            MethodKind::EnsureCapacity => "ensure_capacity",
        }
    }

    /// Private methods are only reachable from the unit's own methods.
    pub fn is_public(self) -> bool {
        !matches!(self, MethodKind::CheckRange | MethodKind::EnsureCapacity)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolOrigin {
    /// A runtime helper resolved against the JIT builder's symbol table.
    Helper,
    /// A method defined by this unit.
    Method(MethodKind),
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub origin: SymbolOrigin,
    pub signature: Signature,
}

#[derive(Clone, Debug)]
pub struct MethodBody {
    pub method: MethodKind,
    /// Index of this method's own entry in the symbol pool.
    pub symbol: u32,
    pub func: Function,
}

/// Definition of one specialized list type.
#[derive(Clone, Debug)]
pub struct GeneratedUnit {
    pub(crate) type_name: String,
    pub(crate) kind: ElementKind,
    pub(crate) layout: ElementLayout,
    pub(crate) pointer_type: Type,
    pub(crate) call_conv: CallConv,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) methods: Vec<MethodBody>,
}

impl GeneratedUnit {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn methods(&self) -> &[MethodBody] {
        &self.methods
    }

    pub fn method(&self, method: MethodKind) -> Option<&MethodBody> {
        self.methods.iter().find(|body| body.method == method)
    }

    /// Cranelift IR text of one method, for inspection and debugging.
    pub fn method_ir(&self, method: MethodKind) -> Option<String> {
        self.method(method).map(|body| body.func.display().to_string())
    }
}

impl fmt::Display for GeneratedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "; type {} ({} elements, {} bytes each, {})",
            self.type_name, self.kind, self.layout.size, self.call_conv
        )?;
        for (index, symbol) in self.symbols.iter().enumerate() {
            let origin = match symbol.origin {
                SymbolOrigin::Helper => "helper",
                SymbolOrigin::Method(method) if method.is_public() => "method",
                SymbolOrigin::Method(_) => "private method",
            };
            writeln!(f, "; u0:{index} = {origin} {}", symbol.name)?;
        }
        for body in &self.methods {
            writeln!(f)?;
            writeln!(f, "; {}", body.method.name())?;
            write!(f, "{}", body.func.display())?;
        }
        Ok(())
    }
}
