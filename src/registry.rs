//! By-name service registry for configuration-driven registration.
//!
//! Configuration files refer to services by name; the registry maps each
//! name to a closure that knows how to register the concrete type. Types
//! opt in once at startup with [`ServiceRegistry::register_type`].

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, OnceLock};

use crate::builder::ContainerBuilder;
use crate::config::ServiceConfig;
use crate::descriptor::Injectable;
use crate::error::{DiError, DiResult};
use crate::parameter::NamedParameter;

type RegisterFn = Arc<dyn Fn(&mut ContainerBuilder, &ServiceConfig) -> DiResult<()> + Send + Sync>;

/// Global table mapping service names to registration closures
pub struct ServiceRegistry {
    entries: RwLock<FxHashMap<String, RegisterFn>>,
}

impl ServiceRegistry {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<ServiceRegistry> = OnceLock::new();
        INSTANCE.get_or_init(|| ServiceRegistry {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    /// Make `T` registrable by name from configuration
    pub fn register_type<T: Injectable>(&self, name: impl Into<String>) {
        let register: RegisterFn = Arc::new(|builder, config| {
            let registration = builder.register::<T>(config.lifetime.into());
            registration.as_self();
            for interface in &config.expose {
                registration.as_interface_named(interface);
            }
            for (parameter, value) in &config.parameters {
                let value = crate::config::json_value_to_shared(value)?;
                registration.with_override(Arc::new(NamedParameter::from_value(parameter, value)));
            }
            Ok(())
        });
        self.entries.write().insert(name.into(), register);
    }

    /// Apply one configured service to a builder
    pub fn apply(&self, builder: &mut ContainerBuilder, config: &ServiceConfig) -> DiResult<()> {
        let register = self
            .entries
            .read()
            .get(&config.implementation_type)
            .cloned()
            .ok_or_else(|| DiError::ServiceNotFoundByName(config.implementation_type.clone()))?;
        register(builder, config)
    }
}
