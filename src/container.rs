//! The built container: a handle to the root scope

use std::any::Any;
use std::sync::Arc;

use crate::builder::ContainerBuilder;
use crate::error::DiResult;
use crate::parameter::InjectParameter;
use crate::scope::Scope;

/// An immutable container wrapping the root of the scope tree
pub struct Container {
    root: Arc<Scope>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub(crate) fn new(root: Arc<Scope>) -> Self {
        Self { root }
    }

    /// The root scope itself
    pub fn root(&self) -> &Arc<Scope> {
        &self.root
    }

    /// Resolve a concrete registered type from the root scope
    pub fn resolve<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        self.root.resolve::<T>()
    }

    /// Resolve with call-site overrides
    pub fn resolve_with<T: Any + Send + Sync>(
        &self,
        overrides: &[Arc<dyn InjectParameter>],
    ) -> DiResult<Arc<T>> {
        self.root.resolve_with::<T>(overrides)
    }

    /// Resolve a registration exposed as the interface `I`
    pub fn resolve_trait<I>(&self) -> DiResult<Arc<I>>
    where
        I: ?Sized + 'static,
        Arc<I>: Any + Send + Sync,
    {
        self.root.resolve_trait::<I>()
    }

    /// Open a child scope under the root; fails once the tree is closed
    pub fn create_scope(&self) -> DiResult<Arc<Scope>> {
        self.root.create_scope()
    }

    /// Close the whole tree, disposing child scopes before the root
    pub fn close(&self) {
        self.root.close();
    }
}
