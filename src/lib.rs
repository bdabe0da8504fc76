//! Dependency injection with lifetime-scoped resolution.
//!
//! This crate builds object graphs on demand from declared injection
//! points: each participating type describes its constructors, fields,
//! properties and injection methods once, and the container resolves the
//! graph with transient, singleton or scoped reuse, hierarchical scope
//! fallback and ordered parameter overrides.
//!
//! Construction goes through one cached injector per type. The reflective
//! injector interprets the type descriptor at call time; a precompiled
//! injector registered under the type's deterministic name is preferred
//! when present, and both obey identical rules.

pub mod builder;
pub mod container;
pub mod descriptor;
pub mod error;
pub mod generated;
pub mod injector;
pub mod lifetime;
pub mod parameter;
pub mod registration;
pub mod scope;

#[cfg(feature = "config")]
pub mod config;

#[cfg(feature = "config")]
pub mod registry;

pub use builder::{ContainerBuilder, Module};
pub use container::Container;
pub use descriptor::{
    analyze, param, param_trait, Args, ConstructorSpec, DescriptorBuilder, Injectable,
    InterfaceSpec, MemberSpec, MethodSpec, OwnedInstance, ParameterSpec, SharedValue,
    TypeDescriptor, TypeKey, Visibility,
};
pub use error::{DiError, DiResult};
pub use generated::{
    check_eligibility, injector_name, precompile, register_precompiled, GeneratedInjector,
    GeneratedRegistry,
};
pub use injector::{Injector, InjectorCache, ReflectiveInjector};
pub use lifetime::{Disposable, Lifetime};
pub use parameter::{
    FuncNamedParameter, FuncTypedParameter, InjectParameter, NamedParameter, OverrideSet,
    TypedParameter,
};
pub use registration::{Registration, RegistrationBuilder};
pub use scope::{ResolutionContext, Scope};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        param, param_trait, Args, ConstructorSpec, Container, ContainerBuilder, DiError,
        DiResult, Injectable, Lifetime, MemberSpec, MethodSpec, Module, TypeDescriptor,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_basic_container() {
        struct Greeting {
            text: String,
        }

        impl Injectable for Greeting {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::describe::<Greeting>()
                    .constructor(ConstructorSpec::new([param::<String>("text")], |args| {
                        Ok(Box::new(Greeting {
                            text: args.get_cloned::<String>(0)?,
                        }))
                    }))
                    .finish()
            }
        }

        let mut builder = ContainerBuilder::new();
        builder
            .register::<Greeting>(Lifetime::Singleton)
            .with_named_parameter("text", "Hello, DI!".to_string());

        let container = builder.build().unwrap();
        let greeting = container.resolve::<Greeting>().unwrap();
        assert_eq!(greeting.text, "Hello, DI!");
    }
}
