//! Type descriptors: which constructors, fields, properties and methods of a
//! type participate in injection.
//!
//! Rust has no runtime reflection, so injection points are declared through
//! the [`DescriptorBuilder`] DSL: each participating type implements
//! [`Injectable`] and returns a [`TypeDescriptor`] enumerating its injection
//! points together with the erased thunks that perform construction and
//! member assignment. Analysis validates the descriptor once per type and
//! caches the outcome (including rejections) for the process lifetime.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

use crate::error::{DiError, DiResult};
use crate::lifetime::Disposable;

/// A resolved dependency value or caller-supplied override
pub type SharedValue = Arc<dyn Any + Send + Sync>;

/// An instance under construction, before it is shared
pub type OwnedInstance = Box<dyn Any + Send + Sync>;

/// Type identity: `TypeId` plus the human-readable name.
///
/// Works for unsized types, so interfaces key by `TypeId::of::<dyn I>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// Declared accessibility of a type or injection point, as an offline
/// generator would read it from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Crate,
    Private,
}

impl Visibility {
    /// Whether emitted code outside the declaring item can reach it
    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

/// Ordered argument list handed to constructor and method thunks
pub struct Args<'a> {
    values: &'a [SharedValue],
    owner: &'static str,
    params: &'a [ParameterSpec],
}

impl<'a> Args<'a> {
    pub(crate) fn new(
        values: &'a [SharedValue],
        owner: &'static str,
        params: &'a [ParameterSpec],
    ) -> Self {
        Self {
            values,
            owner,
            params,
        }
    }

    fn parameter_name(&self, index: usize) -> String {
        self.params
            .get(index)
            .map(|p| p.name.to_string())
            .unwrap_or_else(|| format!("#{index}"))
    }

    fn mismatch(&self, index: usize) -> DiError {
        DiError::ParameterTypeMismatch {
            type_name: self.owner,
            parameter: self.parameter_name(index),
        }
    }

    /// Shared handle to the argument at `index`
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> DiResult<Arc<T>> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| self.mismatch(index))?
            .downcast::<T>()
            .map_err(|_| self.mismatch(index))
    }

    /// Clone the argument at `index` out of its shared handle
    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, index: usize) -> DiResult<T> {
        Ok((*self.get::<T>(index)?).clone())
    }

    /// Trait-object argument, e.g. `args.get_trait::<dyn Logging>(0)`
    pub fn get_trait<I: ?Sized + 'static>(&self, index: usize) -> DiResult<Arc<I>>
    where
        Arc<I>: Any + Send + Sync,
    {
        Ok((*self.get::<Arc<I>>(index)?).clone())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub(crate) type ConstructFn = Arc<dyn Fn(Args<'_>) -> DiResult<OwnedInstance> + Send + Sync>;
pub(crate) type SetterFn = Arc<dyn Fn(&mut dyn Any, SharedValue) -> DiResult<()> + Send + Sync>;
pub(crate) type InvokeFn = Arc<dyn Fn(&mut dyn Any, Args<'_>) -> DiResult<()> + Send + Sync>;
pub(crate) type CastFn = Arc<dyn Fn(&SharedValue) -> Option<SharedValue> + Send + Sync>;
pub(crate) type DisposerFn =
    Arc<dyn Fn(&SharedValue) -> Option<Arc<dyn Disposable>> + Send + Sync>;

/// One declared parameter of a constructor or injection method
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub key: TypeKey,
}

/// Parameter resolved as a concrete type
pub fn param<T: Any + Send + Sync>(name: &'static str) -> ParameterSpec {
    ParameterSpec {
        name,
        key: TypeKey::of::<T>(),
    }
}

/// Parameter resolved as a trait object
pub fn param_trait<I: ?Sized + 'static>(name: &'static str) -> ParameterSpec {
    ParameterSpec {
        name,
        key: TypeKey::of::<I>(),
    }
}

/// A candidate constructor: declared parameters plus the construct thunk
#[derive(Clone)]
pub struct ConstructorSpec {
    pub(crate) marked: bool,
    pub(crate) visibility: Visibility,
    pub(crate) generic_arity: usize,
    pub(crate) params: Vec<ParameterSpec>,
    pub(crate) construct: ConstructFn,
}

impl ConstructorSpec {
    pub fn new<F>(params: impl Into<Vec<ParameterSpec>>, construct: F) -> Self
    where
        F: Fn(Args<'_>) -> DiResult<OwnedInstance> + Send + Sync + 'static,
    {
        Self {
            marked: false,
            visibility: Visibility::Public,
            generic_arity: 0,
            params: params.into(),
            construct: Arc::new(construct),
        }
    }

    /// Zero-parameter constructor
    pub fn nullary<F>(construct: F) -> Self
    where
        F: Fn() -> OwnedInstance + Send + Sync + 'static,
    {
        Self::new(Vec::new(), move |_| Ok(construct()))
    }

    /// Mark this constructor as the explicit injection constructor
    pub fn marked(mut self) -> Self {
        self.marked = true;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Number of open generic parameters on the constructor itself
    pub fn generic_arity(mut self, arity: usize) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.params
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }
}

/// An injectable field or property: declared type plus the setter thunk
#[derive(Clone)]
pub struct MemberSpec {
    pub(crate) name: &'static str,
    pub(crate) key: TypeKey,
    pub(crate) visibility: Visibility,
    pub(crate) set: SetterFn,
}

impl MemberSpec {
    pub fn new<T, V, F>(name: &'static str, set: F) -> Self
    where
        T: Any + Send + Sync,
        V: Any + Send + Sync,
        F: Fn(&mut T, Arc<V>) + Send + Sync + 'static,
    {
        let setter: SetterFn = Arc::new(move |instance, value| {
            let mismatch = || DiError::ParameterTypeMismatch {
                type_name: std::any::type_name::<T>(),
                parameter: name.to_string(),
            };
            let target = instance.downcast_mut::<T>().ok_or_else(mismatch)?;
            let value = value.downcast::<V>().map_err(|_| mismatch())?;
            set(target, value);
            Ok(())
        });
        Self {
            name,
            key: TypeKey::of::<V>(),
            visibility: Visibility::Public,
            set: setter,
        }
    }

    /// Member whose declared type is a trait object
    pub fn new_trait<T, I, F>(name: &'static str, set: F) -> Self
    where
        T: Any + Send + Sync,
        I: ?Sized + 'static,
        Arc<I>: Any + Send + Sync,
        F: Fn(&mut T, Arc<I>) + Send + Sync + 'static,
    {
        let setter: SetterFn = Arc::new(move |instance, value| {
            let mismatch = || DiError::ParameterTypeMismatch {
                type_name: std::any::type_name::<T>(),
                parameter: name.to_string(),
            };
            let target = instance.downcast_mut::<T>().ok_or_else(mismatch)?;
            let value = value.downcast::<Arc<I>>().map_err(|_| mismatch())?;
            set(target, (*value).clone());
            Ok(())
        });
        Self {
            name,
            key: TypeKey::of::<I>(),
            visibility: Visibility::Public,
            set: setter,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// An injection method: runs after all fields and properties are assigned
#[derive(Clone)]
pub struct MethodSpec {
    pub(crate) name: &'static str,
    pub(crate) visibility: Visibility,
    pub(crate) generic_arity: usize,
    pub(crate) params: Vec<ParameterSpec>,
    pub(crate) invoke: InvokeFn,
}

impl MethodSpec {
    pub fn new<T, F>(name: &'static str, params: impl Into<Vec<ParameterSpec>>, invoke: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut T, Args<'_>) -> DiResult<()> + Send + Sync + 'static,
    {
        let invoker: InvokeFn = Arc::new(move |instance, args| {
            let target =
                instance
                    .downcast_mut::<T>()
                    .ok_or_else(|| DiError::ParameterTypeMismatch {
                        type_name: std::any::type_name::<T>(),
                        parameter: name.to_string(),
                    })?;
            invoke(target, args)
        });
        Self {
            name,
            visibility: Visibility::Public,
            generic_arity: 0,
            params: params.into(),
            invoke: invoker,
        }
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn generic_arity(mut self, arity: usize) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// An interface the implementation can be exposed as, with its upcast thunk
#[derive(Clone)]
pub struct InterfaceSpec {
    pub(crate) key: TypeKey,
    pub(crate) cast: CastFn,
}

impl InterfaceSpec {
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

/// Everything the injectors need to know about one concrete type.
///
/// Immutable after analysis; shared behind `Arc` by the descriptor cache.
pub struct TypeDescriptor {
    pub(crate) key: TypeKey,
    pub(crate) abstract_type: bool,
    pub(crate) generic_arity: usize,
    pub(crate) nested_visibility: Option<Visibility>,
    pub(crate) augmentable: bool,
    pub(crate) host_owned: bool,
    pub(crate) constructors: Vec<ConstructorSpec>,
    pub(crate) fields: Vec<MemberSpec>,
    pub(crate) properties: Vec<MemberSpec>,
    pub(crate) methods: Vec<MethodSpec>,
    pub(crate) interfaces: Vec<InterfaceSpec>,
    pub(crate) disposer: Option<DisposerFn>,
    // Computed by analysis
    pub(crate) selected_constructor: Option<usize>,
    pub(crate) explicitly_injectable: bool,
    pub(crate) requires_private_access: bool,
}

impl TypeDescriptor {
    /// Start describing `T`'s injection points
    pub fn describe<T: Any + Send + Sync>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new()
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name
    }

    pub fn interfaces(&self) -> &[InterfaceSpec] {
        &self.interfaces
    }

    /// The constructor injection uses, per the selection rules
    pub fn selected_constructor(&self) -> Option<&ConstructorSpec> {
        self.selected_constructor.map(|i| &self.constructors[i])
    }

    /// True iff at least one injection point carries the explicit marker
    pub fn explicitly_injectable(&self) -> bool {
        self.explicitly_injectable
    }

    /// True iff any injection point is private to the declaring item
    pub fn requires_private_access(&self) -> bool {
        self.requires_private_access
    }

    pub fn is_host_owned(&self) -> bool {
        self.host_owned
    }

    pub(crate) fn upcast_to(&self, key: TypeKey, value: &SharedValue) -> Option<SharedValue> {
        self.interfaces
            .iter()
            .find(|i| i.key == key)
            .and_then(|i| (i.cast)(value))
    }

    /// Validate invariants and compute the derived flags.
    ///
    /// Selection: exactly one marked constructor wins; more than one is
    /// `AmbiguousConstructor`; with none marked, the greatest declared
    /// arity wins and ties resolve to the first declared.
    pub(crate) fn analyzed(mut self) -> DiResult<Self> {
        let type_name = self.key.name;
        if self.abstract_type {
            return Err(DiError::AbstractNotEligible { type_name });
        }
        if self.generic_arity > 0 {
            return Err(DiError::UnboundGenericNotEligible { type_name });
        }

        let marked: Vec<usize> = self
            .constructors
            .iter()
            .enumerate()
            .filter(|(_, c)| c.marked)
            .map(|(i, _)| i)
            .collect();

        self.selected_constructor = match marked.len() {
            0 => {
                let mut best: Option<usize> = None;
                for (i, ctor) in self.constructors.iter().enumerate() {
                    match best {
                        Some(b) if self.constructors[b].arity() >= ctor.arity() => {}
                        _ => best = Some(i),
                    }
                }
                best
            }
            1 => Some(marked[0]),
            _ => return Err(DiError::AmbiguousConstructor { type_name }),
        };

        self.explicitly_injectable = marked.len() == 1
            || !self.fields.is_empty()
            || !self.properties.is_empty()
            || !self.methods.is_empty();

        let selected_private = self
            .selected_constructor()
            .map(|c| c.visibility.is_private())
            .unwrap_or(false);
        self.requires_private_access = selected_private
            || self.fields.iter().any(|f| f.visibility.is_private())
            || self.properties.iter().any(|p| p.visibility.is_private())
            || self.methods.iter().any(|m| m.visibility.is_private());

        trace!(type_name, "type descriptor analyzed");
        Ok(self)
    }
}

/// Fluent construction of a [`TypeDescriptor`]
pub struct DescriptorBuilder<T: ?Sized> {
    inner: TypeDescriptor,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> DescriptorBuilder<T> {
    fn new() -> Self {
        Self {
            inner: TypeDescriptor {
                key: TypeKey::of::<T>(),
                abstract_type: false,
                generic_arity: 0,
                nested_visibility: None,
                augmentable: false,
                host_owned: false,
                constructors: Vec::new(),
                fields: Vec::new(),
                properties: Vec::new(),
                methods: Vec::new(),
                interfaces: Vec::new(),
                disposer: None,
                selected_constructor: None,
                explicitly_injectable: false,
                requires_private_access: false,
            },
            _marker: std::marker::PhantomData,
        }
    }

    pub fn constructor(mut self, spec: ConstructorSpec) -> Self {
        self.inner.constructors.push(spec);
        self
    }

    pub fn field(mut self, spec: MemberSpec) -> Self {
        self.inner.fields.push(spec);
        self
    }

    pub fn property(mut self, spec: MemberSpec) -> Self {
        self.inner.properties.push(spec);
        self
    }

    pub fn method(mut self, spec: MethodSpec) -> Self {
        self.inner.methods.push(spec);
        self
    }

    /// Declare that `T` can be exposed as the interface `I`
    pub fn implements<I, F>(mut self, cast: F) -> Self
    where
        I: ?Sized + 'static,
        Arc<I>: Any + Send + Sync,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        let caster: CastFn = Arc::new(move |value: &SharedValue| {
            let concrete = value.clone().downcast::<T>().ok()?;
            Some(Arc::new(cast(concrete)) as SharedValue)
        });
        self.inner.interfaces.push(InterfaceSpec {
            key: TypeKey::of::<I>(),
            cast: caster,
        });
        self
    }

    /// The type cannot be instantiated directly (models abstract host types)
    pub fn abstract_type(mut self) -> Self {
        self.inner.abstract_type = true;
        self
    }

    /// The type has unbound generic parameters
    pub fn generic(mut self, arity: usize) -> Self {
        self.inner.generic_arity = arity;
        self
    }

    /// The type is nested inside another item with the given visibility
    pub fn nested(mut self, visibility: Visibility) -> Self {
        self.inner.nested_visibility = Some(visibility);
        self
    }

    /// The type supports split/partial augmentation, so emitted code merges
    /// into the type itself and may reach private members
    pub fn augmentable(mut self) -> Self {
        self.inner.augmentable = true;
        self
    }

    /// Instances are created exclusively by the hosting environment
    pub fn host_owned(mut self) -> Self {
        self.inner.host_owned = true;
        self
    }

    pub fn finish(self) -> TypeDescriptor {
        self.inner
    }
}

impl<T: Any + Send + Sync + Disposable> DescriptorBuilder<T> {
    /// Collect instances for disposal when their owning scope closes
    pub fn disposable(mut self) -> Self {
        self.inner.disposer = Some(Arc::new(|value: &SharedValue| {
            value
                .clone()
                .downcast::<T>()
                .ok()
                .map(|a| a as Arc<dyn Disposable>)
        }));
        self
    }
}

/// A type that declares its injection points
pub trait Injectable: Any + Send + Sync + Sized {
    fn descriptor() -> TypeDescriptor;
}

/// Process-wide descriptor cache: analysis runs at most once per type and
/// its outcome, rejection included, is terminal
pub(crate) struct DescriptorCache {
    entries: RwLock<FxHashMap<TypeId, DiResult<Arc<TypeDescriptor>>>>,
}

impl DescriptorCache {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<DescriptorCache> = OnceLock::new();
        INSTANCE.get_or_init(|| DescriptorCache {
            entries: RwLock::new(FxHashMap::default()),
        })
    }

    pub fn analyze<T: Injectable>(&self) -> DiResult<Arc<TypeDescriptor>> {
        let id = TypeId::of::<T>();
        if let Some(entry) = self.entries.read().get(&id) {
            return entry.clone();
        }
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&id) {
            return entry.clone();
        }
        let result = T::descriptor().analyzed().map(Arc::new);
        if let Err(err) = &result {
            debug!(type_name = std::any::type_name::<T>(), %err, "type rejected by analysis");
        }
        entries.insert(id, result.clone());
        result
    }
}

/// Analyze `T`'s descriptor, reusing the cached outcome when present
pub fn analyze<T: Injectable>() -> DiResult<Arc<TypeDescriptor>> {
    DescriptorCache::global().analyze::<T>()
}
