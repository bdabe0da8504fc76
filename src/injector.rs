//! The injector capability and its process-wide cache.
//!
//! An injector is stateless and bound to exactly one type. The reflective
//! variant interprets the type's descriptor at call time; the generated
//! variant (see [`crate::generated`]) runs a precompiled plan. Both apply
//! the same rules: overrides are consulted before the container for every
//! parameter, fields and properties are injected after construction in
//! declaration order, and injection methods run last.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::descriptor::{
    analyze, Args, Injectable, ParameterSpec, SharedValue, TypeDescriptor,
};
use crate::error::{DiError, DiResult};
use crate::generated::{injector_name, GeneratedRegistry};
use crate::parameter::InjectParameter;
use crate::scope::{ResolutionContext, Scope};

/// An instance fresh out of an injector, before it is shared
pub type OwnedInstance = crate::descriptor::OwnedInstance;

/// The capability that constructs instances and populates injection points
pub trait Injector: Send + Sync {
    /// Construct a new instance, resolving every injection point
    fn create_instance(
        &self,
        scope: &Scope,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<OwnedInstance>;

    /// Populate the injection points of an existing instance
    fn inject_into(
        &self,
        instance: &mut dyn Any,
        scope: &Scope,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<()>;
}

/// Resolve a declared parameter list, override-first, in declaration order
pub(crate) fn resolve_parameters(
    scope: &Scope,
    params: &[ParameterSpec],
    overrides: &[Arc<dyn InjectParameter>],
    ctx: &mut ResolutionContext,
) -> DiResult<Vec<SharedValue>> {
    params
        .iter()
        .map(|p| scope.resolve_or_parameter(p.key, p.name, overrides, ctx))
        .collect()
}

/// Interprets a [`TypeDescriptor`] at call time.
///
/// Tolerates strictly more shapes than the generated path: private members
/// and nested types are fine here, since no source is emitted. The one
/// exception is a host-owned type, which cannot be `new`ed by anyone.
pub struct ReflectiveInjector {
    descriptor: Arc<TypeDescriptor>,
}

impl ReflectiveInjector {
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self { descriptor }
    }
}

impl Injector for ReflectiveInjector {
    fn create_instance(
        &self,
        scope: &Scope,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<OwnedInstance> {
        let descriptor = &self.descriptor;
        let type_name = descriptor.type_name();
        if descriptor.is_host_owned() {
            return Err(DiError::HostOwnedTypeCannotBeConstructed { type_name });
        }
        let ctor = descriptor
            .selected_constructor()
            .ok_or(DiError::NoConstructorFound { type_name })?;
        let values = resolve_parameters(scope, &ctor.params, overrides, ctx)?;
        let mut instance = (ctor.construct)(Args::new(&values, type_name, &ctor.params))?;
        self.inject_into(&mut *instance, scope, overrides, ctx)?;
        Ok(instance)
    }

    fn inject_into(
        &self,
        instance: &mut dyn Any,
        scope: &Scope,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<()> {
        let descriptor = &self.descriptor;
        for member in descriptor.fields.iter().chain(descriptor.properties.iter()) {
            let value = scope.resolve_or_parameter(member.key, member.name, overrides, ctx)?;
            (member.set)(instance, value)?;
        }
        for method in &descriptor.methods {
            let values = resolve_parameters(scope, &method.params, overrides, ctx)?;
            (method.invoke)(
                instance,
                Args::new(&values, descriptor.type_name(), &method.params),
            )?;
        }
        Ok(())
    }
}

/// Process-wide memoized mapping from type identity to its injector.
///
/// Exactly one injector is ever produced per type, even under concurrent
/// first-time lookups; entries are never invalidated. A generated injector
/// registered under the type's deterministic name is preferred over
/// building a reflective one.
pub struct InjectorCache {
    entries: RwLock<FxHashMap<TypeId, Arc<dyn Injector>>>,
}

impl InjectorCache {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<InjectorCache> = OnceLock::new();
        INSTANCE.get_or_init(|| InjectorCache {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn get_or_build<T: Injectable>(&self) -> DiResult<Arc<dyn Injector>> {
        let id = TypeId::of::<T>();
        if let Some(injector) = self.entries.read().get(&id) {
            return Ok(injector.clone());
        }
        let mut entries = self.entries.write();
        if let Some(injector) = entries.get(&id) {
            return Ok(injector.clone());
        }
        let injector: Arc<dyn Injector> =
            match GeneratedRegistry::global().find(&injector_name::<T>()) {
                Some(generated) => {
                    debug!(
                        type_name = std::any::type_name::<T>(),
                        "using generated injector"
                    );
                    generated
                }
                None => {
                    debug!(
                        type_name = std::any::type_name::<T>(),
                        "building reflective injector"
                    );
                    Arc::new(ReflectiveInjector::new(analyze::<T>()?))
                }
            };
        entries.insert(id, injector.clone());
        Ok(injector)
    }
}
