//! Fluent container construction

use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::container::Container;
use crate::descriptor::Injectable;
use crate::error::DiResult;
use crate::lifetime::Lifetime;
use crate::registration::{Registration, RegistrationBuilder};
use crate::scope::Scope;

/// Accumulates registrations and builds the root scope.
///
/// Nothing is analyzed or constructed until [`ContainerBuilder::build`];
/// all registration errors surface there.
#[derive(Default)]
pub struct ContainerBuilder {
    registrations: Vec<RegistrationBuilder>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an injectable implementation with the given lifetime
    pub fn register<T: Injectable>(&mut self, lifetime: Lifetime) -> &mut RegistrationBuilder {
        let index = self.registrations.len();
        self.registrations.push(RegistrationBuilder::new::<T>(lifetime));
        &mut self.registrations[index]
    }

    /// Register an existing instance; it is shared like a singleton
    pub fn register_instance<T: Any + Send + Sync>(&mut self, value: T) -> &mut RegistrationBuilder {
        let index = self.registrations.len();
        self.registrations.push(RegistrationBuilder::for_instance(value));
        &mut self.registrations[index]
    }

    /// Apply a reusable registration bundle
    pub fn add_module(mut self, module: impl Module) -> Self {
        module.configure(&mut self);
        self
    }

    /// Build the root scope. Later registrations for the same exposed type
    /// win over earlier ones.
    pub fn build(self) -> DiResult<Container> {
        let registrations = self.build_registrations()?;
        Ok(Container::new(Scope::new_root(registrations)))
    }

    pub(crate) fn build_registrations(
        self,
    ) -> DiResult<FxHashMap<TypeId, Arc<Registration>>> {
        let mut table: FxHashMap<TypeId, Arc<Registration>> = FxHashMap::default();
        for builder in self.registrations {
            let registration = Arc::new(builder.build()?);
            for key in registration.keys() {
                table.insert(key.id, registration.clone());
            }
        }
        Ok(table)
    }
}

/// A reusable bundle of registrations
pub trait Module {
    fn configure(&self, builder: &mut ContainerBuilder);
}
