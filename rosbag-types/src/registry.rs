/// Process-addressable store of message type descriptors
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::builtin::builtin_types;
use crate::descriptor::{
    BaseType, EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME, FieldDef, FieldType, PrimitiveKind,
    TypeDescriptor,
};
use crate::errors::{TypesysError, TypesysResult};

/// Registry of message type descriptors keyed by normalized type name.
///
/// Registration is idempotent for structurally equal definitions and atomic:
/// a failing batch leaves the registry unchanged. Descriptors are immutable
/// once stored.
///
/// A process-wide default instance is available through
/// [`TypeRegistry::global`]; all consumers take the registry by reference so
/// isolated per-instance registries work the same way.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, TypeDescriptor>>,
}

impl TypeRegistry {
    /// Create a registry seeded with the builtin descriptors
    #[must_use]
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for desc in builtin_types() {
            types.insert(desc.name.clone(), desc);
        }
        Self {
            types: RwLock::new(types),
        }
    }

    /// Process-wide default registry
    #[must_use]
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TypeRegistry::new)
    }

    /// Register a batch of descriptors
    ///
    /// Field-less descriptors receive the synthetic
    /// [`EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME`] member before they are
    /// stored. Re-registering `std_msgs/msg/Header` is always accepted and
    /// keeps the stored definition.
    ///
    /// # Errors
    ///
    /// Returns [`TypesysError::Conflict`] if any type is already present with
    /// a structurally different field list (field names compared
    /// case-insensitively). No entry of the batch is stored in that case.
    pub fn register(&self, types: HashMap<String, TypeDescriptor>) -> TypesysResult<()> {
        let mut batch: Vec<TypeDescriptor> = types
            .into_values()
            .map(|mut desc| {
                if desc.fields.is_empty() {
                    desc.fields.push(FieldDef::new(
                        EMPTY_STRUCTURE_REQUIRED_MEMBER_NAME,
                        FieldType::Base(BaseType::new(PrimitiveKind::UInt8)),
                    ));
                }
                desc
            })
            .collect();

        let mut store = self.types.write();
        for desc in &batch {
            if desc.name == "std_msgs/msg/Header" {
                continue;
            }
            if let Some(have) = store.get(&desc.name)
                && !have.same_fields(desc)
            {
                return Err(TypesysError::conflict(&desc.name));
            }
        }
        for desc in batch.drain(..) {
            store.entry(desc.name.clone()).or_insert(desc);
        }
        Ok(())
    }

    /// Look up a descriptor by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TypeDescriptor> {
        self.types.read().get(name).cloned()
    }

    /// Look up a descriptor by name, failing for unknown types
    ///
    /// # Errors
    ///
    /// Returns [`TypesysError::UnknownType`] if the name is not registered.
    pub fn descriptor(&self, name: &str) -> TypesysResult<TypeDescriptor> {
        self.get(name).ok_or_else(|| TypesysError::unknown(name))
    }

    /// Check whether a type is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
