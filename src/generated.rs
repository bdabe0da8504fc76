//! The precompiled injector path.
//!
//! Code emission itself lives in offline tooling; what lives here is the
//! contract emitted code satisfies: the deterministic injector name derived
//! from type identity, the static-shape eligibility rules, and the global
//! registry the injector cache consults. [`precompile`] bakes a descriptor
//! into a flat plan ahead of time, which is exactly the shape emitted code
//! takes.
//!
//! Whenever [`check_eligibility`] rejects a type, the reflective injector
//! still handles it (host-owned types excepted); the cache falls back
//! automatically when no generated injector is registered.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::descriptor::{
    analyze, Args, ConstructorSpec, Injectable, MemberSpec, MethodSpec, TypeDescriptor,
};
use crate::error::{DiError, DiResult};
use crate::injector::{resolve_parameters, Injector, OwnedInstance};
use crate::parameter::InjectParameter;
use crate::scope::{ResolutionContext, Scope};

/// Normalize a fully-qualified type name into a valid, non-colliding
/// injector name. Pure function of type identity; no registry is needed to
/// derive it.
pub fn mangle(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 17);
    for ch in type_name.chars() {
        match ch {
            ':' | '<' | '>' | ',' | ' ' | '&' | '\'' | '(' | ')' | '[' | ']' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out.push_str("GeneratedInjector");
    out
}

/// The deterministic lookup name for `T`'s generated injector
pub fn injector_name<T: ?Sized + 'static>() -> String {
    mangle(std::any::type_name::<T>())
}

/// Verify that a type's shape can be handled by emitted code.
///
/// Every rejection here is a static-shape error, permanent for the type
/// until its source changes. Private members are waived when the type is
/// augmentable, because the emitted code is merged into the type itself.
pub fn check_eligibility(descriptor: &TypeDescriptor) -> DiResult<()> {
    let type_name = descriptor.type_name();
    if descriptor.abstract_type {
        return Err(DiError::AbstractNotEligible { type_name });
    }
    if descriptor.generic_arity > 0 {
        return Err(DiError::UnboundGenericNotEligible { type_name });
    }
    if descriptor
        .nested_visibility
        .map(|v| v.is_private())
        .unwrap_or(false)
    {
        return Err(DiError::NestedTypeInaccessible { type_name });
    }
    if descriptor.is_host_owned() {
        // Emitted code must never synthesize a constructor call for these
        return Err(DiError::HostOwnedTypeCannotBeConstructed { type_name });
    }

    let marked = descriptor.constructors.iter().filter(|c| c.marked).count();
    if marked > 1 {
        return Err(DiError::AmbiguousConstructor { type_name });
    }
    if let Some(ctor) = descriptor.selected_constructor() {
        if ctor.visibility.is_private() {
            return Err(DiError::PrivateConstructorInaccessible { type_name });
        }
        if ctor.generic_arity > 0 {
            return Err(DiError::OpenGenericMethodNotEligible {
                type_name,
                member: "constructor",
            });
        }
    }

    if !descriptor.augmentable {
        for member in descriptor.fields.iter().chain(descriptor.properties.iter()) {
            if member.visibility.is_private() {
                return Err(DiError::PrivateMemberInaccessible {
                    type_name,
                    member: member.name,
                });
            }
        }
        for method in &descriptor.methods {
            if method.visibility.is_private() {
                return Err(DiError::PrivateMemberInaccessible {
                    type_name,
                    member: method.name,
                });
            }
        }
    }
    for method in &descriptor.methods {
        if method.generic_arity > 0 {
            return Err(DiError::OpenGenericMethodNotEligible {
                type_name,
                member: method.name,
            });
        }
    }
    Ok(())
}

type CreateFn = Arc<
    dyn Fn(&Scope, &[Arc<dyn InjectParameter>], &mut ResolutionContext) -> DiResult<OwnedInstance>
        + Send
        + Sync,
>;
type InjectFn = Arc<
    dyn Fn(
            &mut dyn Any,
            &Scope,
            &[Arc<dyn InjectParameter>],
            &mut ResolutionContext,
        ) -> DiResult<()>
        + Send
        + Sync,
>;

/// A precompiled injector: the same capability as the reflective variant,
/// with the resolution plan baked in ahead of time
pub struct GeneratedInjector {
    name: String,
    create: CreateFn,
    inject: InjectFn,
}

impl GeneratedInjector {
    pub fn new<T: ?Sized + 'static>(create: CreateFn, inject: InjectFn) -> Self {
        Self {
            name: injector_name::<T>(),
            create,
            inject,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Injector for GeneratedInjector {
    fn create_instance(
        &self,
        scope: &Scope,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<OwnedInstance> {
        (self.create)(scope, overrides, ctx)
    }

    fn inject_into(
        &self,
        instance: &mut dyn Any,
        scope: &Scope,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<()> {
        (self.inject)(instance, scope, overrides, ctx)
    }
}

fn run_members(
    type_name: &'static str,
    members: &[MemberSpec],
    methods: &[MethodSpec],
    instance: &mut dyn Any,
    scope: &Scope,
    overrides: &[Arc<dyn InjectParameter>],
    ctx: &mut ResolutionContext,
) -> DiResult<()> {
    for member in members {
        let value = scope.resolve_or_parameter(member.key, member.name, overrides, ctx)?;
        (member.set)(instance, value)?;
    }
    for method in methods {
        let values = resolve_parameters(scope, &method.params, overrides, ctx)?;
        (method.invoke)(instance, Args::new(&values, type_name, &method.params))?;
    }
    Ok(())
}

/// Precompile `T`'s injector after the eligibility check passes.
///
/// This flattens the descriptor into plain closures, which is the exact
/// shape an offline generator emits; registering the result makes the
/// injector cache pick it over the reflective variant.
pub fn precompile<T: Injectable>() -> DiResult<GeneratedInjector> {
    let descriptor = analyze::<T>()?;
    check_eligibility(&descriptor)?;

    let type_name = descriptor.type_name();
    let ctor: Option<ConstructorSpec> = descriptor.selected_constructor().cloned();
    let members: Vec<MemberSpec> = descriptor
        .fields
        .iter()
        .chain(descriptor.properties.iter())
        .cloned()
        .collect();
    let methods: Vec<MethodSpec> = descriptor.methods.clone();

    let create: CreateFn = {
        let members = members.clone();
        let methods = methods.clone();
        Arc::new(move |scope, overrides, ctx| {
            let ctor = ctor
                .as_ref()
                .ok_or(DiError::NoConstructorFound { type_name })?;
            let values = resolve_parameters(scope, &ctor.params, overrides, ctx)?;
            let mut instance = (ctor.construct)(Args::new(&values, type_name, &ctor.params))?;
            run_members(
                type_name, &members, &methods, &mut *instance, scope, overrides, ctx,
            )?;
            Ok(instance)
        })
    };

    let inject: InjectFn = Arc::new(move |instance, scope, overrides, ctx| {
        run_members(type_name, &members, &methods, instance, scope, overrides, ctx)
    });

    Ok(GeneratedInjector::new::<T>(create, inject))
}

/// Precompile `T` and register the result for discovery by the cache
pub fn register_precompiled<T: Injectable>() -> DiResult<()> {
    let injector = precompile::<T>()?;
    GeneratedRegistry::global().register(injector);
    Ok(())
}

/// Global name-to-injector table consulted by the injector cache.
///
/// Emitted code registers its injectors here at startup; lookup is a pure
/// function of type identity via [`injector_name`].
pub struct GeneratedRegistry {
    entries: RwLock<FxHashMap<String, Arc<GeneratedInjector>>>,
}

impl GeneratedRegistry {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<GeneratedRegistry> = OnceLock::new();
        INSTANCE.get_or_init(|| GeneratedRegistry {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn register(&self, injector: GeneratedInjector) -> Arc<GeneratedInjector> {
        let injector = Arc::new(injector);
        debug!(name = injector.name(), "registered generated injector");
        self.entries
            .write()
            .insert(injector.name().to_string(), injector.clone());
        injector
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Injector>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .map(|i| i as Arc<dyn Injector>)
    }
}
