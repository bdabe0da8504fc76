//! Registrations: the immutable mapping from exposed types to one
//! implementation, lifetime and construction strategy.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::descriptor::{analyze, Injectable, SharedValue, TypeDescriptor, TypeKey};
use crate::error::{DiError, DiResult};
use crate::injector::{Injector, InjectorCache};
use crate::lifetime::{Disposable, Lifetime};
use crate::parameter::{
    FuncNamedParameter, FuncTypedParameter, InjectParameter, NamedParameter, TypedParameter,
};
use crate::scope::{ResolutionContext, Scope};

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);

/// Knows how to produce one instance for a registration
pub(crate) enum InstanceProvider {
    /// Construct and inject through the cached injector
    Injected {
        injector: Arc<dyn Injector>,
        parameters: Vec<Arc<dyn InjectParameter>>,
    },
    /// Hand out a pre-existing instance
    Existing(SharedValue),
}

impl InstanceProvider {
    pub(crate) fn instantiate(
        &self,
        scope: &Scope,
        ctx: &mut ResolutionContext,
    ) -> DiResult<SharedValue> {
        match self {
            InstanceProvider::Injected {
                injector,
                parameters,
            } => {
                let instance = injector.create_instance(scope, parameters, ctx)?;
                Ok(Arc::from(instance))
            }
            InstanceProvider::Existing(value) => Ok(value.clone()),
        }
    }
}

/// Immutable once built: one implementation, one lifetime, any number of
/// exposed interface types pointing back at it
pub struct Registration {
    id: u64,
    implementation: TypeKey,
    lifetime: Lifetime,
    keys: Vec<TypeKey>,
    descriptor: Option<Arc<TypeDescriptor>>,
    provider: InstanceProvider,
}

impl Registration {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn implementation_key(&self) -> TypeKey {
        self.implementation
    }

    pub fn type_name(&self) -> &'static str {
        self.implementation.name
    }

    /// Every type this registration is exposed as
    pub fn keys(&self) -> &[TypeKey] {
        &self.keys
    }

    pub(crate) fn provider(&self) -> &InstanceProvider {
        &self.provider
    }

    /// View the concrete instance as the requested exposed type
    pub(crate) fn upcast(&self, key: TypeKey, value: &SharedValue) -> Option<SharedValue> {
        if key.id == self.implementation.id {
            return Some(value.clone());
        }
        self.descriptor.as_ref()?.upcast_to(key, value)
    }

    /// Disposal hook for instances of this registration, if declared
    pub(crate) fn disposer_for(&self, value: &SharedValue) -> Option<Arc<dyn Disposable>> {
        let descriptor = self.descriptor.as_ref()?;
        let disposer = descriptor.disposer.as_ref()?;
        disposer(value)
    }
}

/// How a registration wants to be exposed; expanded against the descriptor
/// when the registration is built
enum KeyRequest {
    SelfType,
    AllInterfaces,
    Typed(TypeKey),
    Named(String),
}

type Finisher = Box<
    dyn FnOnce(Lifetime, Vec<KeyRequest>, Vec<Arc<dyn InjectParameter>>) -> DiResult<Registration>
        + Send,
>;

/// Fluent, mutable construction of a [`Registration`].
///
/// `build` is deferred until the container is built; descriptor analysis,
/// interface compatibility checks and the injector-cache lookup all happen
/// there, and no instance is ever created at build time.
pub struct RegistrationBuilder {
    lifetime: Lifetime,
    requests: Vec<KeyRequest>,
    parameters: Vec<Arc<dyn InjectParameter>>,
    finisher: Finisher,
}

/// Configuration refers to interfaces by short name; declared keys carry
/// the full type path
fn interface_name_matches(declared: &str, requested: &str) -> bool {
    declared == requested || declared.rsplit("::").next() == Some(requested)
}

fn expand_keys(
    descriptor: Option<&Arc<TypeDescriptor>>,
    implementation: TypeKey,
    requests: Vec<KeyRequest>,
) -> DiResult<Vec<TypeKey>> {
    let mut keys: Vec<TypeKey> = Vec::new();
    let mut push = |key: TypeKey| {
        if !keys.iter().any(|k| k.id == key.id) {
            keys.push(key);
        }
    };

    if requests.is_empty() {
        push(implementation);
        return Ok(keys);
    }

    for request in requests {
        match request {
            KeyRequest::SelfType => push(implementation),
            KeyRequest::AllInterfaces => {
                if let Some(descriptor) = descriptor {
                    for interface in descriptor.interfaces() {
                        push(interface.key());
                    }
                }
            }
            KeyRequest::Typed(key) => {
                if key.id == implementation.id {
                    push(implementation);
                    continue;
                }
                let declared = descriptor
                    .map(|d| d.interfaces().iter().any(|i| i.key().id == key.id))
                    .unwrap_or(false);
                if !declared {
                    return Err(DiError::IncompatibleInterface {
                        type_name: implementation.name,
                        interface: key.name.to_string(),
                    });
                }
                push(key);
            }
            KeyRequest::Named(name) => {
                let found = descriptor
                    .and_then(|d| {
                        d.interfaces()
                            .iter()
                            .find(|i| interface_name_matches(i.key().name, &name))
                    })
                    .map(|i| i.key());
                match found {
                    Some(key) => push(key),
                    None => {
                        return Err(DiError::IncompatibleInterface {
                            type_name: implementation.name,
                            interface: name,
                        })
                    }
                }
            }
        }
    }
    Ok(keys)
}

impl RegistrationBuilder {
    /// Registration constructed through `T`'s injector
    pub(crate) fn new<T: Injectable>(lifetime: Lifetime) -> Self {
        let finisher: Finisher = Box::new(move |lifetime, requests, parameters| {
            let descriptor = analyze::<T>()?;
            let injector = InjectorCache::global().get_or_build::<T>()?;
            let keys = expand_keys(Some(&descriptor), descriptor.key(), requests)?;
            Ok(Registration {
                id: NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed),
                implementation: descriptor.key(),
                lifetime,
                keys,
                descriptor: Some(descriptor),
                provider: InstanceProvider::Injected {
                    injector,
                    parameters,
                },
            })
        });
        Self {
            lifetime,
            requests: Vec::new(),
            parameters: Vec::new(),
            finisher,
        }
    }

    /// Registration handing out an existing instance (always singleton-like)
    pub(crate) fn for_instance<T: Any + Send + Sync>(value: T) -> Self {
        let implementation = TypeKey::of::<T>();
        let shared: SharedValue = Arc::new(value);
        let finisher: Finisher = Box::new(move |lifetime, requests, _parameters| {
            let keys = expand_keys(None, implementation, requests)?;
            Ok(Registration {
                id: NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed),
                implementation,
                lifetime,
                keys,
                descriptor: None,
                provider: InstanceProvider::Existing(shared),
            })
        });
        Self {
            lifetime: Lifetime::Singleton,
            requests: Vec::new(),
            parameters: Vec::new(),
            finisher,
        }
    }

    /// Expose the registration as its own concrete type
    pub fn as_self(&mut self) -> &mut Self {
        self.requests.push(KeyRequest::SelfType);
        self
    }

    /// Expose the registration as the interface `I`; fails at build time
    /// with `IncompatibleInterface` if the descriptor does not declare it
    pub fn as_type<I: ?Sized + 'static>(&mut self) -> &mut Self {
        self.requests.push(KeyRequest::Typed(TypeKey::of::<I>()));
        self
    }

    /// Expose the registration as a declared interface found by type name
    pub fn as_interface_named(&mut self, name: impl Into<String>) -> &mut Self {
        self.requests.push(KeyRequest::Named(name.into()));
        self
    }

    /// Expose the registration as every interface its descriptor declares
    pub fn as_implemented_interfaces(&mut self) -> &mut Self {
        self.requests.push(KeyRequest::AllInterfaces);
        self
    }

    /// Override any parameter declared with type `T`
    pub fn with_parameter<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.parameters.push(Arc::new(TypedParameter::new(value)));
        self
    }

    /// Override any parameter declared with type `T`, deferred through the
    /// resolving scope
    pub fn with_parameter_factory<T, F>(&mut self, func: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        self.parameters
            .push(Arc::new(FuncTypedParameter::new(func)));
        self
    }

    /// Override the parameter with the given declared name
    pub fn with_named_parameter<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> &mut Self {
        self.parameters.push(Arc::new(NamedParameter::new(name, value)));
        self
    }

    /// Override the parameter with the given declared name, deferred through
    /// the resolving scope
    pub fn with_named_parameter_factory<T, F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        self.parameters
            .push(Arc::new(FuncNamedParameter::new(name, func)));
        self
    }

    /// Append an arbitrary override (e.g. a trait-typed parameter)
    pub fn with_override(&mut self, parameter: Arc<dyn InjectParameter>) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    /// Produce the immutable registration
    pub(crate) fn build(self) -> DiResult<Registration> {
        (self.finisher)(self.lifetime, self.requests, self.parameters)
    }
}
