//! Emits the Cranelift IR of a list type specialized for one primitive kind.
//!
//! The generated type stores its elements in a packed scalar buffer described
//! by the kind's descriptor. Each method is a separate function taking the
//! runtime context and the instance header:
//!
//! ```text
//! init(ctx, this) -> status
//! size(ctx, this) -> size
//! add(ctx, this, element: *const Value) -> status
//! get(ctx, this, index, out: *mut Value) -> status
//! check_range(ctx, this, index) -> status
//! ensure_capacity(ctx, this, min_capacity) -> status
//! ```

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{
    types, AbiParam, Block, ExtFuncData, ExternalName, FuncRef, Function, InstBuilder, MemFlags,
    Signature, StackSlotData, StackSlotKind, Type, UserExternalName, UserFuncName, Value,
};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use target_lexicon::Triple;

use crate::contract::DEFAULT_CAPACITY;
use crate::kinds::{KindDescriptor, LoadEncoding, StoreEncoding};
use crate::DefinitionError;

use super::abi::{CAPACITY_OFFSET, DATA_OFFSET, SIZE_OFFSET, STATUS_CAPACITY, STATUS_OK};
use super::runtime_helpers::{RT_ARRAY_GROW, RT_ARRAY_NEW, RT_RAISE_BOUNDS, RT_RAISE_CAPACITY};
use super::unit::{GeneratedUnit, MethodBody, MethodKind, Symbol, SymbolOrigin};

/// Bytes reserved for the local receiving an unboxed scalar.
const SCALAR_SLOT_SIZE: u32 = 8;
const SCALAR_SLOT_ALIGN_SHIFT: u8 = 3;

/// Everything a method body may call. The position in [`Callee::ALL`] is the
/// callee's index in the unit's symbol pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Callee {
    Method(MethodKind),
    ArrayNew,
    ArrayGrow,
    RaiseBounds,
    RaiseCapacity,
    Unbox,
    Rebox,
}

impl Callee {
    const ALL: [Callee; 12] = [
        Callee::Method(MethodKind::Init),
        Callee::Method(MethodKind::Size),
        Callee::Method(MethodKind::Add),
        Callee::Method(MethodKind::Get),
        Callee::Method(MethodKind::CheckRange),
        Callee::Method(MethodKind::EnsureCapacity),
        Callee::ArrayNew,
        Callee::ArrayGrow,
        Callee::RaiseBounds,
        Callee::RaiseCapacity,
        Callee::Unbox,
        Callee::Rebox,
    ];

    fn index(self) -> u32 {
        match self {
            Callee::Method(MethodKind::Init) => 0,
            Callee::Method(MethodKind::Size) => 1,
            Callee::Method(MethodKind::Add) => 2,
            Callee::Method(MethodKind::Get) => 3,
            Callee::Method(MethodKind::CheckRange) => 4,
            Callee::Method(MethodKind::EnsureCapacity) => 5,
            Callee::ArrayNew => 6,
            Callee::ArrayGrow => 7,
            Callee::RaiseBounds => 8,
            Callee::RaiseCapacity => 9,
            Callee::Unbox => 10,
            Callee::Rebox => 11,
        }
    }
}

pub struct CompactListGenerator<'a> {
    type_name: String,
    descriptor: &'a KindDescriptor,
    pointer_type: Type,
    call_conv: CallConv,
}

impl<'a> CompactListGenerator<'a> {
    /// Generator targeting the host's pointer width and default calling convention.
    pub fn new(
        type_name: impl Into<String>,
        descriptor: &'a KindDescriptor,
    ) -> Result<Self, DefinitionError> {
        descriptor.validate()?;
        let triple = Triple::host();
        let width = triple
            .pointer_width()
            .map_err(|()| DefinitionError::Backend("host pointer width is unknown".into()))?;
        let pointer_type = Type::int_with_byte_size(u16::from(width.bytes())).ok_or_else(|| {
            DefinitionError::Backend(format!("unsupported pointer width {}", width.bits()))
        })?;
        Ok(Self {
            type_name: type_name.into(),
            descriptor,
            pointer_type,
            call_conv: CallConv::triple_default(&triple),
        })
    }

    pub fn generate(&self) -> Result<GeneratedUnit, DefinitionError> {
        let symbols: Vec<Symbol> = Callee::ALL.iter().map(|callee| self.symbol(*callee)).collect();

        let mut methods = Vec::with_capacity(MethodKind::ALL.len());
        for method in MethodKind::ALL {
            let index = Callee::Method(method).index();
            let signature = symbols[index as usize].signature.clone();
            let mut func = Function::with_name_signature(UserFuncName::user(0, index), signature);
            let mut fb_ctx = FunctionBuilderContext::new();
            {
                let mut emitter = MethodEmitter {
                    builder: FunctionBuilder::new(&mut func, &mut fb_ctx),
                    symbols: &symbols,
                    descriptor: self.descriptor,
                    ptr: self.pointer_type,
                    imported: HashMap::new(),
                };
                match method {
                    MethodKind::Init => emitter.emit_init(),
                    MethodKind::Size => emitter.emit_size(),
                    MethodKind::Add => emitter.emit_add(),
                    MethodKind::Get => emitter.emit_get(),
                    MethodKind::CheckRange => emitter.emit_check_range(),
                    MethodKind::EnsureCapacity => emitter.emit_ensure_capacity(),
                }
                emitter.builder.finalize();
            }
            methods.push(MethodBody {
                method,
                symbol: index,
                func,
            });
        }

        Ok(GeneratedUnit {
            type_name: self.type_name.clone(),
            kind: self.descriptor.kind,
            layout: self.descriptor.layout,
            pointer_type: self.pointer_type,
            call_conv: self.call_conv,
            symbols,
            methods,
        })
    }

    fn signature(&self, params: &[Type], returns: &[Type]) -> Signature {
        let mut sig = Signature::new(self.call_conv);
        sig.params.extend(params.iter().map(|ty| AbiParam::new(*ty)));
        sig.returns.extend(returns.iter().map(|ty| AbiParam::new(*ty)));
        sig
    }

    fn symbol(&self, callee: Callee) -> Symbol {
        let p = self.pointer_type;
        let i = types::I32;
        let helper = |name: &str, signature| Symbol {
            name: name.to_string(),
            origin: SymbolOrigin::Helper,
            signature,
        };
        match callee {
            Callee::Method(method) => {
                let params: &[Type] = match method {
                    MethodKind::Init | MethodKind::Size => &[p, p],
                    MethodKind::Add => &[p, p, p],
                    MethodKind::Get => &[p, p, i, p],
                    MethodKind::CheckRange | MethodKind::EnsureCapacity => &[p, p, i],
                };
                Symbol {
                    name: method.name().to_string(),
                    origin: SymbolOrigin::Method(method),
                    signature: self.signature(params, &[i]),
                }
            }
            // (ctx, len, elem_size, elem_align) -> data
            Callee::ArrayNew => helper(RT_ARRAY_NEW, self.signature(&[p, i, i, i], &[p])),
            // (ctx, data, old_len, new_len, elem_size, elem_align) -> data
            Callee::ArrayGrow => helper(RT_ARRAY_GROW, self.signature(&[p, p, i, i, i, i], &[p])),
            // (ctx, index, size) -> status
            Callee::RaiseBounds => helper(RT_RAISE_BOUNDS, self.signature(&[p, i, i], &[i])),
            // (ctx, capacity, min_capacity) -> status
            Callee::RaiseCapacity => helper(RT_RAISE_CAPACITY, self.signature(&[p, i, i], &[i])),
            // (ctx, element, out) -> status
            Callee::Unbox => helper(self.descriptor.unbox, self.signature(&[p, p, p], &[i])),
            // (ctx, scalar, out)
            Callee::Rebox => helper(
                self.descriptor.rebox,
                self.signature(&[p, self.descriptor.stack_type, p], &[]),
            ),
        }
    }
}

struct MethodEmitter<'a> {
    builder: FunctionBuilder<'a>,
    symbols: &'a [Symbol],
    descriptor: &'a KindDescriptor,
    ptr: Type,
    imported: HashMap<Callee, FuncRef>,
}

impl MethodEmitter<'_> {
    /// Creates the entry block and returns the function parameters.
    fn entry(&mut self) -> Vec<Value> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        self.builder.seal_block(entry);
        self.builder.block_params(entry).to_vec()
    }

    /// Branches to the returned `(taken, fallthrough)` blocks on `cond`.
    fn branch(&mut self, cond: Value) -> (Block, Block) {
        let taken = self.builder.create_block();
        let fallthrough = self.builder.create_block();
        self.builder.ins().brif(cond, taken, &[], fallthrough, &[]);
        (taken, fallthrough)
    }

    /// Switches to a block whose predecessors have all been emitted.
    fn enter(&mut self, block: Block) {
        self.builder.switch_to_block(block);
        self.builder.seal_block(block);
    }

    fn import(&mut self, callee: Callee) -> FuncRef {
        if let Some(func_ref) = self.imported.get(&callee) {
            return *func_ref;
        }
        let index = callee.index();
        let symbol = &self.symbols[index as usize];
        let signature = self.builder.import_signature(symbol.signature.clone());
        let name = self
            .builder
            .func
            .declare_imported_user_function(UserExternalName::new(0, index));
        let func_ref = self.builder.import_function(ExtFuncData {
            name: ExternalName::user(name),
            signature,
            colocated: matches!(symbol.origin, SymbolOrigin::Method(_)),
            patchable: false,
        });
        self.imported.insert(callee, func_ref);
        func_ref
    }

    fn call(&mut self, callee: Callee, args: &[Value]) {
        let func_ref = self.import(callee);
        self.builder.ins().call(func_ref, args);
    }

    fn call_value(&mut self, callee: Callee, args: &[Value]) -> Value {
        let func_ref = self.import(callee);
        let call = self.builder.ins().call(func_ref, args);
        self.builder.inst_results(call)[0]
    }

    fn i32_const(&mut self, value: i64) -> Value {
        self.builder.ins().iconst(types::I32, value)
    }

    fn return_status(&mut self, status: i32) {
        let status = self.i32_const(i64::from(status));
        self.builder.ins().return_(&[status]);
    }

    fn load_field(&mut self, ty: Type, this: Value, offset: i32) -> Value {
        self.builder.ins().load(ty, MemFlags::trusted(), this, offset)
    }

    fn store_field(&mut self, value: Value, this: Value, offset: i32) {
        self.builder.ins().store(MemFlags::trusted(), value, this, offset);
    }

    fn layout_consts(&mut self) -> (Value, Value) {
        let layout = self.descriptor.layout;
        let size = self.i32_const(i64::from(layout.size));
        let align = self.i32_const(i64::from(layout.align));
        (size, align)
    }

    fn element_address(&mut self, data: Value, index: Value) -> Value {
        let index = if self.ptr.bits() > 32 {
            self.builder.ins().sextend(self.ptr, index)
        } else {
            index
        };
        let offset = self
            .builder
            .ins()
            .imul_imm(index, i64::from(self.descriptor.layout.size));
        self.builder.ins().iadd(data, offset)
    }

    fn store_element(&mut self, scalar: Value, addr: Value) {
        let flags = MemFlags::trusted();
        let ins = self.builder.ins();
        match self.descriptor.store {
            StoreEncoding::Full => ins.store(flags, scalar, addr, 0),
            StoreEncoding::Truncate8 => ins.istore8(flags, scalar, addr, 0),
            StoreEncoding::Truncate16 => ins.istore16(flags, scalar, addr, 0),
        };
    }

    fn load_element(&mut self, addr: Value) -> Value {
        let flags = MemFlags::trusted();
        let stack_type = self.descriptor.stack_type;
        let ins = self.builder.ins();
        match self.descriptor.load {
            LoadEncoding::Full => ins.load(stack_type, flags, addr, 0),
            LoadEncoding::Signed8 => ins.sload8(stack_type, flags, addr, 0),
            LoadEncoding::Unsigned8 => ins.uload8(stack_type, flags, addr, 0),
            LoadEncoding::Signed16 => ins.sload16(stack_type, flags, addr, 0),
            LoadEncoding::Unsigned16 => ins.uload16(stack_type, flags, addr, 0),
        }
    }

    fn emit_init(&mut self) {
        let params = self.entry();
        let (ctx, this) = (params[0], params[1]);

        let capacity = self.i32_const(i64::from(DEFAULT_CAPACITY));
        let (size, align) = self.layout_consts();
        let data = self.call_value(Callee::ArrayNew, &[ctx, capacity, size, align]);
        let is_null = self.builder.ins().icmp_imm(IntCC::Equal, data, 0);
        let (failed, allocated) = self.branch(is_null);

        self.enter(failed);
        self.return_status(STATUS_CAPACITY);

        self.enter(allocated);
        self.store_field(data, this, DATA_OFFSET);
        self.store_field(capacity, this, CAPACITY_OFFSET);
        let zero = self.i32_const(0);
        self.store_field(zero, this, SIZE_OFFSET);
        self.return_status(STATUS_OK);
    }

    fn emit_size(&mut self) {
        let params = self.entry();
        let size = self.load_field(types::I32, params[1], SIZE_OFFSET);
        self.builder.ins().return_(&[size]);
    }

    fn emit_add(&mut self) {
        let params = self.entry();
        let (ctx, this, element) = (params[0], params[1], params[2]);

        // Read once: both the capacity request and the store index use the
        // pre-increment size.
        let size = self.load_field(types::I32, this, SIZE_OFFSET);
        let min_capacity = self.builder.ins().iadd_imm(size, 1);
        let status = self.call_value(
            Callee::Method(MethodKind::EnsureCapacity),
            &[ctx, this, min_capacity],
        );
        let (grow_failed, grown) = self.branch(status);

        self.enter(grow_failed);
        self.builder.ins().return_(&[status]);

        self.enter(grown);
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            SCALAR_SLOT_SIZE,
            SCALAR_SLOT_ALIGN_SHIFT,
        ));
        let slot_addr = self.builder.ins().stack_addr(self.ptr, slot, 0);
        let unboxed_status = self.call_value(Callee::Unbox, &[ctx, element, slot_addr]);
        let (rejected, unboxed) = self.branch(unboxed_status);

        self.enter(rejected);
        self.builder.ins().return_(&[unboxed_status]);

        self.enter(unboxed);
        let scalar = self
            .builder
            .ins()
            .stack_load(self.descriptor.stack_type, slot, 0);
        // The buffer may have been replaced by ensure_capacity.
        let data = self.load_field(self.ptr, this, DATA_OFFSET);
        let addr = self.element_address(data, size);
        self.store_element(scalar, addr);
        let next = self.builder.ins().iadd_imm(size, 1);
        self.store_field(next, this, SIZE_OFFSET);
        self.return_status(STATUS_OK);
    }

    fn emit_get(&mut self) {
        let params = self.entry();
        let (ctx, this, index, out) = (params[0], params[1], params[2], params[3]);

        let status = self.call_value(Callee::Method(MethodKind::CheckRange), &[ctx, this, index]);
        let (out_of_range, in_range) = self.branch(status);

        self.enter(out_of_range);
        self.builder.ins().return_(&[status]);

        self.enter(in_range);
        let data = self.load_field(self.ptr, this, DATA_OFFSET);
        let addr = self.element_address(data, index);
        let scalar = self.load_element(addr);
        self.call(Callee::Rebox, &[ctx, scalar, out]);
        self.return_status(STATUS_OK);
    }

    fn emit_check_range(&mut self) {
        let params = self.entry();
        let (ctx, this, index) = (params[0], params[1], params[2]);

        let negative = self
            .builder
            .ins()
            .icmp_imm(IntCC::SignedLessThan, index, 0);
        let (raise, upper) = self.branch(negative);

        self.enter(upper);
        let size = self.load_field(types::I32, this, SIZE_OFFSET);
        let below_size = self.builder.ins().icmp(IntCC::SignedLessThan, index, size);
        let ok = self.builder.create_block();
        self.builder.ins().brif(below_size, ok, &[], raise, &[]);

        // Reached from both range tests.
        self.enter(raise);
        let size = self.load_field(types::I32, this, SIZE_OFFSET);
        let status = self.call_value(Callee::RaiseBounds, &[ctx, index, size]);
        self.builder.ins().return_(&[status]);

        self.enter(ok);
        self.return_status(STATUS_OK);
    }

    fn emit_ensure_capacity(&mut self) {
        let params = self.entry();
        let (ctx, this, min_capacity) = (params[0], params[1], params[2]);

        let non_positive = self
            .builder
            .ins()
            .icmp_imm(IntCC::SignedLessThanOrEqual, min_capacity, 0);
        let (overflowed, compare) = self.branch(non_positive);

        self.enter(overflowed);
        let capacity = self.load_field(types::I32, this, CAPACITY_OFFSET);
        let status = self.call_value(Callee::RaiseCapacity, &[ctx, capacity, min_capacity]);
        self.builder.ins().return_(&[status]);

        self.enter(compare);
        let capacity = self.load_field(types::I32, this, CAPACITY_OFFSET);
        let enough = self.builder.ins().icmp(
            IntCC::SignedGreaterThanOrEqual,
            capacity,
            min_capacity,
        );
        let (done, grow) = self.branch(enough);

        self.enter(grow);
        // new_capacity = max(saturating(capacity * 2), min_capacity)
        let saturates = self.builder.ins().icmp_imm(
            IntCC::SignedGreaterThan,
            capacity,
            i64::from(i32::MAX / 2),
        );
        let doubled = self.builder.ins().ishl_imm(capacity, 1);
        let max = self.i32_const(i64::from(i32::MAX));
        let doubled = self.builder.ins().select(saturates, max, doubled);
        let covers = self.builder.ins().icmp(
            IntCC::SignedGreaterThanOrEqual,
            doubled,
            min_capacity,
        );
        let new_capacity = self.builder.ins().select(covers, doubled, min_capacity);
        let old = self.load_field(self.ptr, this, DATA_OFFSET);
        let (size, align) = self.layout_consts();
        let data = self.call_value(
            Callee::ArrayGrow,
            &[ctx, old, capacity, new_capacity, size, align],
        );
        let is_null = self.builder.ins().icmp_imm(IntCC::Equal, data, 0);
        let (grow_failed, commit) = self.branch(is_null);

        self.enter(grow_failed);
        self.return_status(STATUS_CAPACITY);

        self.enter(commit);
        self.store_field(data, this, DATA_OFFSET);
        self.store_field(new_capacity, this, CAPACITY_OFFSET);
        self.builder.ins().jump(done, &[]);

        // Reached from the capacity test and after a successful grow.
        self.enter(done);
        self.return_status(STATUS_OK);
    }
}

#[cfg(test)]
mod tests {
    use cranelift_codegen::settings;
    use cranelift_codegen::verify_function;

    use super::*;
    use crate::kinds::KindTable;
    use crate::ElementKind;

    fn unit_for(kind: ElementKind) -> GeneratedUnit {
        let table = KindTable::standard();
        let descriptor = table.lookup(kind).unwrap();
        CompactListGenerator::new(format!("{kind}CompactList"), descriptor)
            .unwrap()
            .generate()
            .unwrap()
    }

    #[test]
    fn every_kind_generates_verifiable_methods() {
        let flags = settings::Flags::new(settings::builder());
        for kind in ElementKind::PRIMITIVES {
            let unit = unit_for(kind);
            assert_eq!(unit.kind(), kind);
            assert_eq!(unit.methods().len(), MethodKind::ALL.len());
            assert_eq!(unit.symbols().len(), Callee::ALL.len());
            for body in unit.methods() {
                if let Err(errors) = verify_function(&body.func, &flags) {
                    panic!("{kind} {}: {errors}", body.method.name());
                }
            }
        }
    }

    #[test]
    fn symbol_pool_order_matches_callee_indices() {
        let unit = unit_for(ElementKind::Int);
        for callee in Callee::ALL {
            let symbol = &unit.symbols()[callee.index() as usize];
            match callee {
                Callee::Method(method) => {
                    assert_eq!(symbol.origin, SymbolOrigin::Method(method));
                    assert_eq!(symbol.name, method.name());
                }
                _ => assert_eq!(symbol.origin, SymbolOrigin::Helper),
            }
        }
        assert_eq!(unit.symbols()[Callee::Unbox.index() as usize].name, "rt_unbox_int");
        assert_eq!(unit.symbols()[Callee::Rebox.index() as usize].name, "rt_box_int");
    }

    #[test]
    fn narrow_kinds_use_truncating_stores_and_extending_loads() {
        let byte = unit_for(ElementKind::Byte);
        assert!(byte.method_ir(MethodKind::Add).unwrap().contains("istore8"));
        assert!(byte.method_ir(MethodKind::Get).unwrap().contains("sload8"));

        let short = unit_for(ElementKind::Short);
        assert!(short.method_ir(MethodKind::Add).unwrap().contains("istore16"));
        assert!(short.method_ir(MethodKind::Get).unwrap().contains("sload16"));

        let boolean = unit_for(ElementKind::Bool);
        assert!(boolean.method_ir(MethodKind::Get).unwrap().contains("uload8"));
    }

    #[test]
    fn growth_path_calls_the_grow_helper() {
        let unit = unit_for(ElementKind::Double);
        let ir = unit.method_ir(MethodKind::EnsureCapacity).unwrap();
        assert!(ir.contains("select"));
        assert!(ir.contains("call"));
        let add = unit.method_ir(MethodKind::Add).unwrap();
        assert!(add.contains("stack_load.f64"));
    }

    #[test]
    fn unit_text_lists_the_symbol_pool() {
        let text = unit_for(ElementKind::Long).to_string();
        assert!(text.contains("LongCompactList"));
        assert!(text.contains("helper rt_array_grow"));
        assert!(text.contains("= method add"));
        assert!(text.contains("= private method ensure_capacity"));
        assert!(text.contains("= private method check_range"));
    }

    #[test]
    fn inconsistent_descriptor_is_refused() {
        let mut descriptor = KindTable::standard()
            .lookup(ElementKind::Float)
            .cloned()
            .unwrap();
        descriptor.stack_type = types::I64;
        assert!(matches!(
            CompactListGenerator::new("Broken", &descriptor),
            Err(DefinitionError::Descriptor(_))
        ));
    }
}
