//! Installs generated units into a JIT module and instantiates them.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::rc::Rc;

use cranelift_codegen::ir::{UserExternalName, UserFuncName};
use cranelift_codegen::verify_function;
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module, ModuleError};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::config::JitConfig;
use crate::contract::CompactList;
use crate::kinds::ElementLayout;
use crate::{DefinitionError, Element, ElementKind, ListError, Value};

use super::abi::{AddFn, GetFn, InitFn, JitRuntimeCtx, ListHeader, SizeFn};
use super::buffer;
use super::jit_module::create_jit_module;
use super::runtime_helpers::is_runtime_helper;
use super::unit::{GeneratedUnit, MethodKind, SymbolOrigin};

/// Owner of a scope's compiled code. The code is freed once the scope and
/// every type handle installed into it are gone.
struct ScopeModule {
    module: RefCell<Option<JITModule>>,
}

impl Drop for ScopeModule {
    fn drop(&mut self) {
        if let Some(module) = self.module.get_mut().take() {
            // SAFETY: every `LoadedType` holding pointers into this module keeps
            // the `ScopeModule` alive, and every `GeneratedList` keeps its type.
            unsafe { module.free_memory() };
        }
    }
}

/// One JIT module. Type names are unique within a scope; separate scopes never
/// collide.
pub struct LoaderScope {
    module: Rc<ScopeModule>,
    installed: FxHashSet<String>,
    verify: bool,
    poisoned: bool,
}

impl LoaderScope {
    pub fn new(config: &JitConfig) -> Result<Self, DefinitionError> {
        Ok(Self {
            module: Rc::new(ScopeModule {
                module: RefCell::new(Some(create_jit_module(config)?)),
            }),
            installed: FxHashSet::default(),
            verify: config.verify,
            poisoned: false,
        })
    }

    pub fn is_installed(&self, type_name: &str) -> bool {
        self.installed.contains(type_name)
    }

    /// Links, verifies and compiles `unit`, returning a constructible type.
    pub fn install(&mut self, unit: &GeneratedUnit) -> Result<Rc<LoadedType>, DefinitionError> {
        if self.poisoned {
            return Err(DefinitionError::Backend(
                "loader scope is unusable after a failed definition".into(),
            ));
        }
        if self.installed.contains(&unit.type_name) {
            return Err(DefinitionError::Redefinition(unit.type_name.clone()));
        }

        let mut slot = self.module.module.borrow_mut();
        let module = slot
            .as_mut()
            .ok_or_else(|| DefinitionError::Backend("loader scope has no module".into()))?;

        check_structure(unit, module)?;
        if self.verify {
            for body in &unit.methods {
                verify_function(&body.func, module.isa()).map_err(|errors| {
                    malformed(unit, format!("{} fails verification: {errors}", body.method.name()))
                })?;
            }
        }

        let ids = declare_symbols(unit, module)?;
        let mut methods = Vec::with_capacity(unit.methods.len());
        for body in &unit.methods {
            let id = ids[body.symbol as usize];
            let mut func = body.func.clone();
            func.name = UserFuncName::user(0, id.as_u32());
            let references: Vec<_> = func
                .params
                .user_named_funcs()
                .iter()
                .map(|(reference, name)| (reference, name.clone()))
                .collect();
            for (reference, name) in references {
                let target = ids[name.index as usize];
                func.params
                    .reset_user_func_name(reference, UserExternalName::new(0, target.as_u32()));
            }

            let mut ctx = module.make_context();
            ctx.func = func;
            let defined = module.define_function(id, &mut ctx);
            module.clear_context(&mut ctx);
            if let Err(err) = defined {
                self.poisoned = true;
                return Err(match err {
                    ModuleError::DuplicateDefinition(name) => DefinitionError::Redefinition(name),
                    other => DefinitionError::Backend(format!(
                        "define {}::{}: {other}",
                        unit.type_name,
                        body.method.name()
                    )),
                });
            }
            methods.push((body.method, id));
        }

        if let Err(err) = module.finalize_definitions() {
            self.poisoned = true;
            return Err(DefinitionError::Backend(format!("finalize: {err}")));
        }

        let code = |method: MethodKind| {
            methods
                .iter()
                .find(|(kind, _)| *kind == method)
                .map(|(_, id)| module.get_finalized_function(*id))
                .ok_or_else(|| malformed(unit, format!("missing method {}", method.name())))
        };
        // SAFETY: each pointer is the finalized code of a verified function whose
        // signature was checked against the corresponding method signature.
        let table = unsafe {
            MethodTable {
                init: std::mem::transmute::<*const u8, InitFn>(code(MethodKind::Init)?),
                size: std::mem::transmute::<*const u8, SizeFn>(code(MethodKind::Size)?),
                add: std::mem::transmute::<*const u8, AddFn>(code(MethodKind::Add)?),
                get: std::mem::transmute::<*const u8, GetFn>(code(MethodKind::Get)?),
            }
        };
        drop(slot);

        self.installed.insert(unit.type_name.clone());
        debug!(
            type_name = %unit.type_name,
            kind = %unit.kind,
            symbols = unit.symbols.len(),
            "installed generated list type"
        );
        Ok(Rc::new(LoadedType {
            name: unit.type_name.clone(),
            kind: unit.kind,
            layout: unit.layout,
            methods: table,
            _module: Rc::clone(&self.module),
        }))
    }
}

fn malformed(unit: &GeneratedUnit, what: String) -> DefinitionError {
    DefinitionError::Malformed(format!("{}: {what}", unit.type_name))
}

/// Rejects a unit before anything is declared in the module.
fn check_structure(unit: &GeneratedUnit, module: &JITModule) -> Result<(), DefinitionError> {
    let pointer_type = module.target_config().pointer_type();
    if unit.pointer_type != pointer_type {
        return Err(malformed(
            unit,
            format!("pointer type {} but host uses {pointer_type}", unit.pointer_type),
        ));
    }
    let call_conv = module.isa().default_call_conv();
    if unit.call_conv != call_conv {
        return Err(malformed(
            unit,
            format!("calling convention {} but host uses {call_conv}", unit.call_conv),
        ));
    }

    for symbol in &unit.symbols {
        if symbol.signature.call_conv != call_conv {
            return Err(malformed(
                unit,
                format!("symbol {} uses calling convention {}", symbol.name, symbol.signature.call_conv),
            ));
        }
        if symbol.origin == SymbolOrigin::Helper && !is_runtime_helper(&symbol.name) {
            return Err(malformed(unit, format!("unknown runtime helper {}", symbol.name)));
        }
    }

    for method in MethodKind::ALL {
        let bodies = unit.methods.iter().filter(|body| body.method == method).count();
        let symbols = unit
            .symbols
            .iter()
            .filter(|symbol| symbol.origin == SymbolOrigin::Method(method))
            .count();
        match (bodies, symbols) {
            (1, 1) => {}
            (0, _) | (_, 0) => {
                return Err(malformed(unit, format!("missing method {}", method.name())));
            }
            _ => return Err(malformed(unit, format!("duplicate method {}", method.name()))),
        }
    }

    for body in &unit.methods {
        let Some(symbol) = unit.symbols.get(body.symbol as usize) else {
            return Err(malformed(
                unit,
                format!("{} refers to symbol u0:{} outside the pool", body.method.name(), body.symbol),
            ));
        };
        if symbol.origin != SymbolOrigin::Method(body.method) {
            return Err(malformed(
                unit,
                format!("{} is bound to symbol {}", body.method.name(), symbol.name),
            ));
        }
        if body.func.signature != symbol.signature {
            return Err(malformed(
                unit,
                format!("{} signature differs from its symbol", body.method.name()),
            ));
        }
        for name in body.func.params.user_named_funcs().values() {
            if name.namespace != 0 || name.index as usize >= unit.symbols.len() {
                return Err(malformed(
                    unit,
                    format!(
                        "{} calls u{}:{} outside the pool",
                        body.method.name(),
                        name.namespace,
                        name.index
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Declares the symbol pool; the result is indexed by pool position.
fn declare_symbols(
    unit: &GeneratedUnit,
    module: &mut JITModule,
) -> Result<Vec<FuncId>, DefinitionError> {
    unit.symbols
        .iter()
        .map(|symbol| {
            let (name, linkage) = match symbol.origin {
                SymbolOrigin::Helper => (symbol.name.clone(), Linkage::Import),
                SymbolOrigin::Method(method) => {
                    (format!("{}::{}", unit.type_name, method.name()), Linkage::Local)
                }
            };
            module
                .declare_function(&name, linkage, &symbol.signature)
                .map_err(|err| match err {
                    ModuleError::DuplicateDefinition(name) => DefinitionError::Redefinition(name),
                    ModuleError::IncompatibleDeclaration(_)
                    | ModuleError::IncompatibleSignature(..) => {
                        malformed(unit, format!("cannot declare {name}: {err}"))
                    }
                    other => DefinitionError::Backend(format!("declare {name}: {other}")),
                })
        })
        .collect()
}

#[derive(Clone, Copy)]
struct MethodTable {
    init: InitFn,
    size: SizeFn,
    add: AddFn,
    get: GetFn,
}

/// An installed list type: the compiled methods of one generated unit.
pub struct LoadedType {
    name: String,
    kind: ElementKind,
    layout: ElementLayout,
    methods: MethodTable,
    _module: Rc<ScopeModule>,
}

impl LoadedType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Constructs a new, empty instance.
    ///
    /// `T` must be the scalar type of this list's kind, or [`Value`] to use the
    /// list through the untyped element representation.
    pub fn instantiate<T: Element>(self: &Rc<Self>) -> Result<GeneratedList<T>, ListError> {
        if T::KIND != self.kind && T::KIND != ElementKind::Any {
            return Err(ListError::Type {
                expected: self.kind.wrapper_name(),
                found: T::KIND.wrapper_name(),
            });
        }
        let mut header = ListHeader::unallocated();
        let mut ctx = JitRuntimeCtx::new();
        // SAFETY: `init` only writes the header it is handed.
        let status = unsafe { (self.methods.init)(&mut ctx, &mut header) };
        ctx.finish(status)?;
        Ok(GeneratedList {
            header,
            ty: Rc::clone(self),
            _element: PhantomData,
        })
    }
}

impl std::fmt::Debug for LoadedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

/// An instance of a generated list type.
pub struct GeneratedList<T> {
    header: ListHeader,
    ty: Rc<LoadedType>,
    _element: PhantomData<fn() -> T>,
}

impl<T> GeneratedList<T> {
    pub fn loaded_type(&self) -> &Rc<LoadedType> {
        &self.ty
    }
}

impl<T: Element> CompactList<T> for GeneratedList<T> {
    fn size(&self) -> i32 {
        let mut ctx = JitRuntimeCtx::new();
        // SAFETY: the header was initialized by this type's `init`.
        unsafe { (self.ty.methods.size)(&mut ctx, &self.header) }
    }

    fn get(&self, index: i32) -> Result<T, ListError> {
        let mut ctx = JitRuntimeCtx::new();
        let mut out = MaybeUninit::<Value>::uninit();
        // SAFETY: the header was initialized by this type's `init`.
        let status = unsafe { (self.ty.methods.get)(&mut ctx, &self.header, index, out.as_mut_ptr()) };
        ctx.finish(status)?;
        // SAFETY: a successful `get` always reboxes into `out`.
        T::from_value(unsafe { out.assume_init() })
    }

    fn add(&mut self, element: Option<T>) -> Result<(), ListError> {
        let value = element.map_or(Value::Null, Element::into_value);
        let mut ctx = JitRuntimeCtx::new();
        // SAFETY: the header was initialized by this type's `init`; `value`
        // outlives the call and is only read.
        let status = unsafe { (self.ty.methods.add)(&mut ctx, &mut self.header, &value) };
        ctx.finish(status)
    }

    fn capacity(&self) -> i32 {
        self.header.capacity
    }
}

impl<T> Drop for GeneratedList<T> {
    fn drop(&mut self) {
        // SAFETY: the buffer was allocated by the runtime helpers with this
        // type's element layout and exactly `capacity` elements.
        unsafe { buffer::release(self.header.data, self.header.capacity, self.ty.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cranelift_backend::CompactListGenerator;
    use crate::kinds::KindTable;

    fn unit(kind: ElementKind, name: &str) -> GeneratedUnit {
        let table = KindTable::standard();
        CompactListGenerator::new(name, table.lookup(kind).unwrap())
            .unwrap()
            .generate()
            .unwrap()
    }

    #[test]
    fn installed_type_is_constructible() {
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        let ty = scope.install(&unit(ElementKind::Long, "LongCompactList")).unwrap();
        assert_eq!(ty.name(), "LongCompactList");
        assert!(scope.is_installed("LongCompactList"));

        let mut list = ty.instantiate::<i64>().unwrap();
        assert_eq!(list.size(), 0);
        list.push(i64::MIN).unwrap();
        list.push(7).unwrap();
        assert_eq!(list.get(0), Ok(i64::MIN));
        assert_eq!(list.get(1), Ok(7));
        assert_eq!(list.size(), 2);
    }

    #[test]
    fn same_name_in_one_scope_is_a_redefinition() {
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        scope.install(&unit(ElementKind::Int, "IntCompactList")).unwrap();
        let again = scope.install(&unit(ElementKind::Int, "IntCompactList"));
        assert_eq!(
            again.unwrap_err(),
            DefinitionError::Redefinition("IntCompactList".into())
        );
    }

    #[test]
    fn different_names_share_a_scope() {
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        let ints = scope.install(&unit(ElementKind::Int, "IntCompactList")).unwrap();
        let bytes = scope.install(&unit(ElementKind::Byte, "ByteCompactList")).unwrap();
        let mut a = ints.instantiate::<i32>().unwrap();
        let mut b = bytes.instantiate::<i8>().unwrap();
        a.push(-40_000).unwrap();
        b.push(-128).unwrap();
        assert_eq!(a.get(0), Ok(-40_000));
        assert_eq!(b.get(0), Ok(-128));
    }

    #[test]
    fn instantiating_for_another_kind_is_a_type_error() {
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        let ty = scope.install(&unit(ElementKind::Float, "FloatCompactList")).unwrap();
        assert!(matches!(
            ty.instantiate::<f64>(),
            Err(ListError::Type {
                expected: "Float",
                found: "Double"
            })
        ));
        assert!(ty.instantiate::<Value>().is_ok());
    }

    #[test]
    fn unit_missing_a_method_is_malformed() {
        let mut broken = unit(ElementKind::Int, "IntCompactList");
        broken.methods.retain(|body| body.method != MethodKind::Get);
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        let err = scope.install(&broken).unwrap_err();
        assert!(matches!(&err, DefinitionError::Malformed(what) if what.contains("missing method get")));
        assert!(!scope.is_installed("IntCompactList"));

        // Nothing was declared, so the correct unit still installs.
        scope.install(&unit(ElementKind::Int, "IntCompactList")).unwrap();
    }

    #[test]
    fn unknown_helper_is_malformed() {
        let mut broken = unit(ElementKind::Bool, "BoolCompactList");
        let helper = broken
            .symbols
            .iter_mut()
            .find(|symbol| symbol.name == "rt_unbox_bool")
            .unwrap();
        helper.name = "rt_unbox_text".into();
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        assert!(matches!(
            scope.install(&broken),
            Err(DefinitionError::Malformed(_))
        ));
    }

    #[test]
    fn method_bound_to_the_wrong_symbol_is_malformed() {
        let mut broken = unit(ElementKind::Char, "CharCompactList");
        let add_symbol = broken.method(MethodKind::Add).unwrap().symbol;
        let get = broken
            .methods
            .iter_mut()
            .find(|body| body.method == MethodKind::Get)
            .unwrap();
        get.symbol = add_symbol;
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        assert!(matches!(
            scope.install(&broken),
            Err(DefinitionError::Malformed(_))
        ));
    }

    #[test]
    fn foreign_pointer_width_is_malformed() {
        let mut broken = unit(ElementKind::Int, "IntCompactList");
        broken.pointer_type = if broken.pointer_type == cranelift_codegen::ir::types::I64 {
            cranelift_codegen::ir::types::I32
        } else {
            cranelift_codegen::ir::types::I64
        };
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        assert!(matches!(
            scope.install(&broken),
            Err(DefinitionError::Malformed(_))
        ));
    }

    #[test]
    fn size_overflow_is_a_capacity_error() {
        let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
        let ty = scope.install(&unit(ElementKind::Int, "IntCompactList")).unwrap();
        let mut list = ty.instantiate::<i32>().unwrap();
        let capacity = list.header.capacity;

        list.header.size = i32::MAX;
        list.header.capacity = i32::MAX;
        let added = list.push(1);
        let size = list.size();
        // Put back the real buffer length so the list is released correctly.
        list.header.size = 0;
        list.header.capacity = capacity;

        assert_eq!(
            added,
            Err(ListError::Capacity {
                current: i32::MAX,
                requested: i32::MIN
            })
        );
        assert_eq!(size, i32::MAX);
    }

    #[test]
    fn instances_outlive_their_scope() {
        let mut list = {
            let mut scope = LoaderScope::new(&JitConfig::default()).unwrap();
            let ty = scope.install(&unit(ElementKind::Short, "ShortCompactList")).unwrap();
            ty.instantiate::<i16>().unwrap()
        };
        for value in 0..25i16 {
            list.push(value * -100).unwrap();
        }
        assert_eq!(list.get(24), Ok(-2400));
        assert_eq!(list.loaded_type().kind(), ElementKind::Short);
    }
}
