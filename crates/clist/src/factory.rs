//! Resolves an element kind to a generated list type or the object fallback.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::config::ClistConfig;
use crate::contract::CompactList;
use crate::cranelift_backend::{CompactListGenerator, LoadedType, LoaderScope};
use crate::kinds::{KindDescriptor, KindTable};
use crate::object_list::ObjectCompactList;
use crate::{ClistError, DefinitionError, Element, ElementKind, ListError, Value};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FactoryStats {
    /// Units generated and installed.
    pub generated: u64,
    /// Requests served by an already loaded type.
    pub cache_hits: u64,
    /// Requests served by the object list.
    pub fallbacks: u64,
}

pub struct CompactListFactory {
    table: KindTable,
    config: ClistConfig,
    cache: FxHashMap<ElementKind, Rc<LoadedType>>,
    stats: FactoryStats,
}

impl CompactListFactory {
    pub fn new(table: KindTable, config: ClistConfig) -> Self {
        Self {
            table,
            config,
            cache: FxHashMap::default(),
            stats: FactoryStats::default(),
        }
    }

    /// Factory whose kind table honours `config.kinds`.
    pub fn from_config(config: ClistConfig) -> Self {
        let table = KindTable::from_config(&config.kinds);
        Self::new(table, config)
    }

    pub fn resolve(&self, kind: ElementKind) -> Option<&KindDescriptor> {
        self.table.lookup(kind)
    }

    pub fn table(&self) -> &KindTable {
        &self.table
    }

    pub fn config(&self) -> &ClistConfig {
        &self.config
    }

    pub fn stats(&self) -> FactoryStats {
        self.stats
    }

    /// The generated list type for `kind`, or `None` when the kind has no
    /// descriptor.
    pub fn list_type(
        &mut self,
        kind: ElementKind,
    ) -> Result<Option<Rc<LoadedType>>, DefinitionError> {
        let Some(descriptor) = self.table.lookup(kind) else {
            return Ok(None);
        };
        if self.config.factory.cache_units {
            if let Some(ty) = self.cache.get(&kind) {
                self.stats.cache_hits += 1;
                trace!(%kind, type_name = ty.name(), "reusing loaded list type");
                return Ok(Some(Rc::clone(ty)));
            }
        }

        let type_name = format!("{}CompactList", descriptor.wrapper);
        let unit = CompactListGenerator::new(type_name, descriptor)?.generate()?;
        debug!(
            %kind,
            type_name = unit.type_name(),
            symbols = unit.symbols().len(),
            "generated list unit"
        );
        // Every unit gets its own scope, so repeated generation never collides.
        let mut scope = LoaderScope::new(&self.config.jit)?;
        let ty = scope.install(&unit)?;
        self.stats.generated += 1;
        if self.config.factory.cache_units {
            self.cache.insert(kind, Rc::clone(&ty));
        }
        Ok(Some(ty))
    }

    /// A list of `T`, specialized when `T`'s kind has a descriptor.
    pub fn new_compact_list<T: Element>(&mut self) -> Result<Box<dyn CompactList<T>>, ClistError> {
        if let Some(ty) = self.specialized(T::KIND)? {
            return Ok(Box::new(ty.instantiate::<T>()?));
        }
        self.stats.fallbacks += 1;
        Ok(Box::new(ObjectCompactList::<T>::new()))
    }

    /// A list of `kind` elements used through the untyped [`Value`]
    /// representation. Both implementations reject `Value::Null` and values of
    /// another kind the same way.
    pub fn new_value_list(
        &mut self,
        kind: ElementKind,
    ) -> Result<Box<dyn CompactList<Value>>, ClistError> {
        if let Some(ty) = self.specialized(kind)? {
            return Ok(Box::new(ty.instantiate::<Value>()?));
        }
        self.stats.fallbacks += 1;
        Ok(Box::new(KindCheckedList {
            kind,
            inner: ObjectCompactList::new(),
        }))
    }

    fn specialized(&mut self, kind: ElementKind) -> Result<Option<Rc<LoadedType>>, ClistError> {
        match self.list_type(kind) {
            Ok(ty) => Ok(ty),
            Err(err) if self.config.factory.fallback_on_definition_error => {
                warn!(%kind, error = %err, "list generation failed, using object list");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Default for CompactListFactory {
    fn default() -> Self {
        Self::from_config(ClistConfig::default())
    }
}

/// Object list of `Value`s restricted to one kind.
struct KindCheckedList {
    kind: ElementKind,
    inner: ObjectCompactList<Value>,
}

impl CompactList<Value> for KindCheckedList {
    fn size(&self) -> i32 {
        self.inner.size()
    }

    fn get(&self, index: i32) -> Result<Value, ListError> {
        self.inner.get(index)
    }

    fn add(&mut self, element: Option<Value>) -> Result<(), ListError> {
        let value = element
            .filter(|value| !value.is_null())
            .ok_or(ListError::Null)?;
        if self.kind != ElementKind::Any && value.kind() != Some(self.kind) {
            return Err(ListError::Type {
                expected: self.kind.wrapper_name(),
                found: value.type_name(),
            });
        }
        self.inner.add(Some(value))
    }

    fn capacity(&self) -> i32 {
        self.inner.capacity()
    }
}
