//! Descriptor lookup cache.
//!
//! Codec walks resolve nested type names repeatedly; the cache materializes
//! each descriptor once per operation and keeps it immutable thereafter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rosbag_types::{TypeDescriptor, TypeRegistry};

use crate::errors::SerdeResult;

pub(crate) struct Lookup<'a> {
    registry: &'a TypeRegistry,
    cache: RefCell<HashMap<String, Rc<TypeDescriptor>>>,
}

impl<'a> Lookup<'a> {
    pub(crate) fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn descriptor(&self, name: &str) -> SerdeResult<Rc<TypeDescriptor>> {
        if let Some(desc) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(desc));
        }
        let desc = Rc::new(self.registry.descriptor(name)?);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&desc));
        Ok(desc)
    }
}
