//! Caller-supplied parameter overrides.
//!
//! An override matches a target parameter either by its declared type or by
//! its declared name, never both. Override sets are ordered: the first
//! matching entry wins and bypasses container resolution entirely.

use std::any::Any;
use std::sync::Arc;

use crate::descriptor::{SharedValue, TypeKey};
use crate::scope::Scope;

/// A unit of resolution override
pub trait InjectParameter: Send + Sync {
    /// Whether this override applies to a parameter of the given declared
    /// type and name
    fn matches(&self, key: TypeKey, name: &str) -> bool;

    /// Produce the override value, possibly through the current resolver
    fn value(&self, scope: &Scope) -> SharedValue;
}

/// An ordered override set threaded through every resolve call
pub type OverrideSet = Vec<Arc<dyn InjectParameter>>;

/// Matches any parameter of a given declared type
pub struct TypedParameter {
    key: TypeKey,
    value: SharedValue,
}

impl TypedParameter {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            value: Arc::new(value),
        }
    }

    /// Override for a trait-object parameter
    pub fn new_trait<I: ?Sized + 'static>(value: Arc<I>) -> Self
    where
        Arc<I>: Any + Send + Sync,
    {
        Self {
            key: TypeKey::of::<I>(),
            value: Arc::new(value),
        }
    }
}

impl InjectParameter for TypedParameter {
    fn matches(&self, key: TypeKey, _name: &str) -> bool {
        key.id == self.key.id
    }

    fn value(&self, _scope: &Scope) -> SharedValue {
        self.value.clone()
    }
}

/// Matches by declared type, producing the value through the resolver
pub struct FuncTypedParameter {
    key: TypeKey,
    func: Arc<dyn Fn(&Scope) -> SharedValue + Send + Sync>,
}

impl FuncTypedParameter {
    pub fn new<T, F>(func: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<T>(),
            func: Arc::new(move |scope| Arc::new(func(scope))),
        }
    }

    pub fn new_trait<I, F>(func: F) -> Self
    where
        I: ?Sized + 'static,
        Arc<I>: Any + Send + Sync,
        F: Fn(&Scope) -> Arc<I> + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<I>(),
            func: Arc::new(move |scope| Arc::new(func(scope))),
        }
    }
}

impl InjectParameter for FuncTypedParameter {
    fn matches(&self, key: TypeKey, _name: &str) -> bool {
        key.id == self.key.id
    }

    fn value(&self, scope: &Scope) -> SharedValue {
        (self.func)(scope)
    }
}

/// Matches any parameter with a given declared name
pub struct NamedParameter {
    name: String,
    value: SharedValue,
}

impl NamedParameter {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(value),
        }
    }

    /// Build from an already-erased value (used by the config layer)
    pub fn from_value(name: impl Into<String>, value: SharedValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl InjectParameter for NamedParameter {
    // The empty name denotes a whole-instance request, which no named
    // override can target
    fn matches(&self, _key: TypeKey, name: &str) -> bool {
        !name.is_empty() && name == self.name
    }

    fn value(&self, _scope: &Scope) -> SharedValue {
        self.value.clone()
    }
}

/// Matches by declared name, producing the value through the resolver
pub struct FuncNamedParameter {
    name: String,
    func: Arc<dyn Fn(&Scope) -> SharedValue + Send + Sync>,
}

impl FuncNamedParameter {
    pub fn new<T, F>(name: impl Into<String>, func: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |scope| Arc::new(func(scope))),
        }
    }
}

impl InjectParameter for FuncNamedParameter {
    fn matches(&self, _key: TypeKey, name: &str) -> bool {
        !name.is_empty() && name == self.name
    }

    fn value(&self, scope: &Scope) -> SharedValue {
        (self.func)(scope)
    }
}

/// First matching override in declaration order, if any
pub(crate) fn find_override<'a>(
    overrides: &'a [Arc<dyn InjectParameter>],
    key: TypeKey,
    name: &str,
) -> Option<&'a Arc<dyn InjectParameter>> {
    overrides.iter().find(|p| p.matches(key, name))
}
