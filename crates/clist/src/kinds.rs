//! Encoding parameters for every primitive kind that gets a generated list.

use std::collections::BTreeMap;

use cranelift_codegen::ir::{types, Type};

use crate::config::KindsConfig;
use crate::{DefinitionError, ElementKind};

/// Size and alignment of one packed array element, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementLayout {
    pub size: u32,
    pub align: u32,
}

/// How an in-flight scalar is written into the packed array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEncoding {
    Full,
    Truncate8,
    Truncate16,
}

/// How a packed element is read back into its in-flight scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadEncoding {
    Full,
    Signed8,
    Unsigned8,
    Signed16,
    Unsigned16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindDescriptor {
    pub kind: ElementKind,
    /// `Value` variant the list accepts and returns.
    pub wrapper: &'static str,
    /// Type of one packed array element.
    pub element_type: Type,
    /// Type of the scalar while it is being moved between the array and a helper.
    pub stack_type: Type,
    /// Runtime helper unwrapping a `Value` into `stack_type`.
    pub unbox: &'static str,
    /// Runtime helper wrapping a `stack_type` scalar into a `Value`.
    pub rebox: &'static str,
    pub layout: ElementLayout,
    pub store: StoreEncoding,
    pub load: LoadEncoding,
}

impl KindDescriptor {
    fn new(
        kind: ElementKind,
        element_type: Type,
        stack_type: Type,
        unbox: &'static str,
        rebox: &'static str,
        store: StoreEncoding,
        load: LoadEncoding,
    ) -> Self {
        let size = element_type.bytes();
        Self {
            kind,
            wrapper: kind.wrapper_name(),
            element_type,
            stack_type,
            unbox,
            rebox,
            layout: ElementLayout { size, align: size },
            store,
            load,
        }
    }

    /// Checks that the encodings agree with each other.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let fail = |what: &str| {
            Err(DefinitionError::Descriptor(format!(
                "{} descriptor: {what}",
                self.kind
            )))
        };
        if !self.kind.is_primitive() {
            return fail("not a primitive kind");
        }
        if self.layout.size != self.element_type.bytes() {
            return fail("layout size differs from element type");
        }
        if !self.layout.align.is_power_of_two() {
            return fail("alignment is not a power of two");
        }
        let narrow_int = self.stack_type == types::I32;
        let store_ok = match self.store {
            StoreEncoding::Full => self.element_type == self.stack_type,
            StoreEncoding::Truncate8 => narrow_int && self.element_type == types::I8,
            StoreEncoding::Truncate16 => narrow_int && self.element_type == types::I16,
        };
        if !store_ok {
            return fail("store encoding does not match element and stack types");
        }
        let load_ok = match self.load {
            LoadEncoding::Full => self.element_type == self.stack_type,
            LoadEncoding::Signed8 | LoadEncoding::Unsigned8 => {
                narrow_int && self.element_type == types::I8
            }
            LoadEncoding::Signed16 | LoadEncoding::Unsigned16 => {
                narrow_int && self.element_type == types::I16
            }
        };
        if !load_ok {
            return fail("load encoding does not match element and stack types");
        }
        Ok(())
    }
}

fn standard_descriptor(kind: ElementKind) -> Option<KindDescriptor> {
    use LoadEncoding as L;
    use StoreEncoding as S;

    let descriptor = match kind {
        ElementKind::Bool => KindDescriptor::new(
            kind,
            types::I8,
            types::I32,
            "rt_unbox_bool",
            "rt_box_bool",
            S::Truncate8,
            L::Unsigned8,
        ),
        ElementKind::Byte => KindDescriptor::new(
            kind,
            types::I8,
            types::I32,
            "rt_unbox_byte",
            "rt_box_byte",
            S::Truncate8,
            L::Signed8,
        ),
        ElementKind::Short => KindDescriptor::new(
            kind,
            types::I16,
            types::I32,
            "rt_unbox_short",
            "rt_box_short",
            S::Truncate16,
            L::Signed16,
        ),
        ElementKind::Char => KindDescriptor::new(
            kind,
            types::I32,
            types::I32,
            "rt_unbox_char",
            "rt_box_char",
            S::Full,
            L::Full,
        ),
        ElementKind::Int => KindDescriptor::new(
            kind,
            types::I32,
            types::I32,
            "rt_unbox_int",
            "rt_box_int",
            S::Full,
            L::Full,
        ),
        ElementKind::Long => KindDescriptor::new(
            kind,
            types::I64,
            types::I64,
            "rt_unbox_long",
            "rt_box_long",
            S::Full,
            L::Full,
        ),
        ElementKind::Float => KindDescriptor::new(
            kind,
            types::F32,
            types::F32,
            "rt_unbox_float",
            "rt_box_float",
            S::Full,
            L::Full,
        ),
        ElementKind::Double => KindDescriptor::new(
            kind,
            types::F64,
            types::F64,
            "rt_unbox_double",
            "rt_box_double",
            S::Full,
            L::Full,
        ),
        ElementKind::Text | ElementKind::Any => return None,
    };
    Some(descriptor)
}

/// Immutable mapping from element kind to its descriptor.
///
/// Built once and handed to the factory; lookups never mutate it.
#[derive(Clone, Debug)]
pub struct KindTable {
    descriptors: BTreeMap<ElementKind, KindDescriptor>,
}

impl KindTable {
    /// Every primitive kind.
    pub fn standard() -> Self {
        Self::with_kinds(ElementKind::PRIMITIVES)
    }

    /// Every primitive kind except those disabled in `config`.
    pub fn from_config(config: &KindsConfig) -> Self {
        Self::with_kinds(
            ElementKind::PRIMITIVES
                .into_iter()
                .filter(|kind| !config.disabled.contains(kind)),
        )
    }

    pub fn empty() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    fn with_kinds(kinds: impl IntoIterator<Item = ElementKind>) -> Self {
        let descriptors = kinds
            .into_iter()
            .filter_map(standard_descriptor)
            .map(|descriptor| (descriptor.kind, descriptor))
            .collect();
        Self { descriptors }
    }

    pub fn lookup(&self, kind: ElementKind) -> Option<&KindDescriptor> {
        self.descriptors.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ElementKind> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self::standard()
    }
}
