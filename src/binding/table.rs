//! Per-interface binding tables and their build-once cache

use super::{InterfaceDeclaration, OperationBinding, RestfulClient};
use crate::error::{ClientError, Result};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// All operation bindings of one client interface
#[derive(Debug)]
pub struct BindingTable {
    interface: String,
    bindings: HashMap<String, OperationBinding>,
}

impl BindingTable {
    /// Bind every declared operation, failing on the first invalid one
    pub fn build(declaration: &InterfaceDeclaration) -> Result<Self> {
        if declaration.name.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Client interface declared without a name is not a valid operation interface"
                    .to_string(),
            ));
        }

        let mut bindings = HashMap::with_capacity(declaration.operations.len());
        for meta in &declaration.operations {
            let binding = OperationBinding::bind(meta).map_err(|e| match e {
                ClientError::Configuration(msg) => ClientError::Configuration(format!(
                    "{} in interface {}",
                    msg, declaration.name
                )),
                other => other,
            })?;

            if bindings.insert(meta.name.clone(), binding).is_some() {
                return Err(ClientError::Configuration(format!(
                    "Interface {} declares operation '{}' more than once",
                    declaration.name, meta.name
                )));
            }
        }

        debug!(
            "Bound {} operation(s) for interface {}",
            bindings.len(),
            declaration.name
        );

        Ok(Self {
            interface: declaration.name.clone(),
            bindings,
        })
    }

    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    pub fn get(&self, operation: &str) -> Option<&OperationBinding> {
        self.bindings.get(operation)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Operation names, sorted
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

type Slot = Arc<Mutex<Option<Arc<BindingTable>>>>;

/// Build-or-fetch cache of binding tables keyed by interface type
///
/// Each type gets its own slot. The map lock is only held long enough to find
/// or create a slot; the build itself runs under the slot lock, so concurrent
/// callers for one type wait for a single build while other types proceed.
#[derive(Default)]
pub struct BindingTableCache {
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl BindingTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<C: RestfulClient>(&self) -> Result<Arc<BindingTable>> {
        self.get_or_build_with(TypeId::of::<C>(), C::declaration)
    }

    pub(crate) fn get_or_build_with<F>(&self, key: TypeId, declare: F) -> Result<Arc<BindingTable>>
    where
        F: FnOnce() -> InterfaceDeclaration,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key).or_default().clone()
        };

        let mut table = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table.as_ref() {
            return Ok(existing.clone());
        }

        let declaration = declare();
        let built = Arc::new(BindingTable::build(&declaration)?);
        info!(
            "Built binding table for {} ({} operations)",
            built.interface_name(),
            built.len()
        );
        *table = Some(built.clone());
        Ok(built)
    }

    /// Number of tables built so far
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
