//! The scope tree and the resolution algorithm.
//!
//! A scope is a node in a tree of resolvers: it owns its own registration
//! table, its singleton and scoped instance slots, and a disposal list.
//! Child scopes inherit parent registrations unless shadowed; disposal is
//! strictly child-before-parent.

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

use crate::descriptor::{SharedValue, TypeKey};
use crate::error::{DiError, DiResult};
use crate::lifetime::{Disposable, Lifetime};
use crate::parameter::{find_override, InjectParameter};
use crate::registration::Registration;

/// The set of registrations currently under construction on this logical
/// call chain. Threaded through nested resolutions so that re-entering one
/// fails fast with `CircularDependency` instead of recursing or blocking.
#[derive(Default)]
pub struct ResolutionContext {
    building: Vec<(u64, &'static str)>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enter(&mut self, id: u64, type_name: &'static str) -> DiResult<()> {
        if self.building.iter().any(|(entry, _)| *entry == id) {
            let mut path: Vec<&str> = self.building.iter().map(|(_, name)| *name).collect();
            path.push(type_name);
            return Err(DiError::CircularDependency {
                path: path.join(" -> "),
            });
        }
        self.building.push((id, type_name));
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.building.pop();
    }
}

enum SlotState {
    Empty,
    Building,
    Ready(SharedValue),
    /// First construction failed. Resolvers that were already waiting
    /// consume the error; the next fresh resolution clears it and retries.
    Failed(DiError),
}

/// One lazily-populated instance slot per registration.
///
/// First construction uses a claim pattern: the builder marks the slot
/// `Building` and releases the lock before constructing, so it never blocks
/// while holding the slot; concurrent resolvers wait on the condvar until
/// the outcome. A failed build is raised to every resolver that was
/// waiting on it; the slot then counts as unpopulated and a later
/// resolution may retry.
struct InstanceSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl InstanceSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Empty),
            ready: Condvar::new(),
        })
    }

    fn get_or_build(
        &self,
        build: impl FnOnce() -> DiResult<SharedValue>,
    ) -> DiResult<SharedValue> {
        {
            let mut state = self.state.lock();
            let mut waited = false;
            loop {
                match &*state {
                    SlotState::Ready(value) => return Ok(value.clone()),
                    SlotState::Building => {
                        waited = true;
                        self.ready.wait(&mut state);
                    }
                    // A waiter observes the failed outcome it waited on,
                    // it never claims the rebuild itself
                    SlotState::Failed(err) if waited => return Err(err.clone()),
                    SlotState::Failed(_) | SlotState::Empty => {
                        *state = SlotState::Building;
                        break;
                    }
                }
            }
        }

        // Reset the claim if construction panics, so waiters are not
        // stranded in Building forever
        struct Claim<'a> {
            slot: &'a InstanceSlot,
            armed: bool,
        }
        impl Drop for Claim<'_> {
            fn drop(&mut self) {
                if self.armed {
                    *self.slot.state.lock() = SlotState::Empty;
                    self.slot.ready.notify_all();
                }
            }
        }

        let mut claim = Claim {
            slot: self,
            armed: true,
        };
        let result = build();
        claim.armed = false;

        let mut state = self.state.lock();
        match result {
            Ok(value) => {
                *state = SlotState::Ready(value.clone());
                self.ready.notify_all();
                Ok(value)
            }
            Err(err) => {
                *state = SlotState::Failed(err.clone());
                self.ready.notify_all();
                Err(err)
            }
        }
    }
}

/// A node in the tree of resolvers
pub struct Scope {
    me: Weak<Scope>,
    parent: Option<Arc<Scope>>,
    registrations: RwLock<FxHashMap<TypeId, Arc<Registration>>>,
    /// Slots for singleton registrations owned by this scope
    singletons: RwLock<FxHashMap<u64, Arc<InstanceSlot>>>,
    /// Slots for scoped registrations resolved in this scope
    scoped: RwLock<FxHashMap<u64, Arc<InstanceSlot>>>,
    /// Slot-created instances, in creation order
    disposables: Mutex<Vec<Arc<dyn Disposable>>>,
    children: Mutex<Vec<Weak<Scope>>>,
    closed: AtomicBool,
}

impl Scope {
    pub(crate) fn new_root(registrations: FxHashMap<TypeId, Arc<Registration>>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            parent: None,
            registrations: RwLock::new(registrations),
            singletons: RwLock::new(FxHashMap::default()),
            scoped: RwLock::new(FxHashMap::default()),
            disposables: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn new_child(
        parent: &Arc<Scope>,
        registrations: FxHashMap<TypeId, Arc<Registration>>,
    ) -> Arc<Self> {
        let child = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            parent: Some(parent.clone()),
            registrations: RwLock::new(registrations),
            singletons: RwLock::new(FxHashMap::default()),
            scoped: RwLock::new(FxHashMap::default()),
            disposables: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        parent.children.lock().push(Arc::downgrade(&child));
        child
    }

    /// Open an empty child scope inheriting this scope's registrations.
    /// A closed scope cannot open children.
    pub fn create_scope(self: &Arc<Self>) -> DiResult<Arc<Scope>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DiError::ScopeClosed);
        }
        Ok(Scope::new_child(self, FxHashMap::default()))
    }

    /// Open a child scope with additional registrations that shadow the
    /// parent's for the same exposed types
    pub fn create_scope_with(
        self: &Arc<Self>,
        configure: impl FnOnce(&mut crate::builder::ContainerBuilder),
    ) -> DiResult<Arc<Scope>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DiError::ScopeClosed);
        }
        let mut builder = crate::builder::ContainerBuilder::new();
        configure(&mut builder);
        let registrations = builder.build_registrations()?;
        Ok(Scope::new_child(self, registrations))
    }

    /// Resolve a concrete registered type
    pub fn resolve<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        self.resolve_with::<T>(&[])
    }

    /// Resolve a concrete type with call-site overrides. The request itself
    /// carries no parameter name, so only typed overrides can match it.
    pub fn resolve_with<T: Any + Send + Sync>(
        &self,
        overrides: &[Arc<dyn InjectParameter>],
    ) -> DiResult<Arc<T>> {
        let key = TypeKey::of::<T>();
        let mut ctx = ResolutionContext::new();
        let value = self.resolve_or_parameter(key, "", overrides, &mut ctx)?;
        value
            .downcast::<T>()
            .map_err(|_| DiError::ParameterTypeMismatch {
                type_name: key.name,
                parameter: "instance".to_string(),
            })
    }

    /// Resolve a registration exposed as the interface `I`
    pub fn resolve_trait<I>(&self) -> DiResult<Arc<I>>
    where
        I: ?Sized + 'static,
        Arc<I>: Any + Send + Sync,
    {
        let key = TypeKey::of::<I>();
        let mut ctx = ResolutionContext::new();
        let value = self.resolve_key(key, &mut ctx)?;
        value
            .downcast::<Arc<I>>()
            .map(|v| (*v).clone())
            .map_err(|_| DiError::ParameterTypeMismatch {
                type_name: key.name,
                parameter: "instance".to_string(),
            })
    }

    /// Populate the injection points of an instance created elsewhere
    pub fn inject_into<T: crate::descriptor::Injectable>(&self, instance: &mut T) -> DiResult<()> {
        let injector = crate::injector::InjectorCache::global().get_or_build::<T>()?;
        let mut ctx = ResolutionContext::new();
        injector.inject_into(instance, self, &[], &mut ctx)
    }

    /// Override-first resolution of one declared parameter: the override
    /// set is scanned in order and the first match bypasses the container
    pub fn resolve_or_parameter(
        &self,
        key: TypeKey,
        name: &str,
        overrides: &[Arc<dyn InjectParameter>],
        ctx: &mut ResolutionContext,
    ) -> DiResult<SharedValue> {
        if let Some(parameter) = find_override(overrides, key, name) {
            return Ok(parameter.value(self));
        }
        self.resolve_key(key, ctx)
    }

    /// Container-driven resolution of a requested type
    pub fn resolve_key(&self, key: TypeKey, ctx: &mut ResolutionContext) -> DiResult<SharedValue> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DiError::ScopeClosed);
        }
        let (registration, owner) = self
            .find_registration(key.id)
            .ok_or(DiError::NoRegistrationFound { type_name: key.name })?;
        trace!(
            requested = key.name,
            implementation = registration.type_name(),
            "resolving"
        );
        self.resolve_registration(&registration, &owner, key, ctx)
    }

    /// Closest-scope-wins lookup, also yielding the scope that owns the
    /// winning registration
    fn find_registration(&self, id: TypeId) -> Option<(Arc<Registration>, Arc<Scope>)> {
        if let Some(registration) = self.registrations.read().get(&id) {
            return Some((registration.clone(), self.me.upgrade()?));
        }
        self.parent.as_ref()?.find_registration(id)
    }

    fn resolve_registration(
        &self,
        registration: &Arc<Registration>,
        owner: &Arc<Scope>,
        key: TypeKey,
        ctx: &mut ResolutionContext,
    ) -> DiResult<SharedValue> {
        ctx.enter(registration.id(), registration.type_name())?;
        let result = match registration.lifetime() {
            Lifetime::Transient => registration.provider().instantiate(self, ctx),
            Lifetime::Singleton => {
                // The slot lives in the registration's owning scope, shared
                // by the whole subtree; dependencies resolve from there. A
                // closed owner's cleared slot cache is never repopulated.
                if owner.is_closed() {
                    Err(DiError::ScopeClosed)
                } else {
                    let slot = slot_for(&owner.singletons, registration.id());
                    slot.get_or_build(|| owner.spawn_tracked(registration, ctx))
                }
            }
            Lifetime::Scoped => {
                let slot = slot_for(&self.scoped, registration.id());
                slot.get_or_build(|| self.spawn_tracked(registration, ctx))
            }
        };
        ctx.exit();
        let value = result?;

        if key.id == registration.implementation_key().id {
            return Ok(value);
        }
        registration
            .upcast(key, &value)
            .ok_or_else(|| DiError::IncompatibleInterface {
                type_name: registration.type_name(),
                interface: key.name.to_string(),
            })
    }

    /// Instantiate and remember the instance for disposal when this scope
    /// closes
    fn spawn_tracked(
        &self,
        registration: &Arc<Registration>,
        ctx: &mut ResolutionContext,
    ) -> DiResult<SharedValue> {
        let value = registration.provider().instantiate(self, ctx)?;
        if let Some(disposable) = registration.disposer_for(&value) {
            self.disposables.lock().push(disposable);
        }
        Ok(value)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close this scope: children first (reverse creation order), then this
    /// scope's slot-created instances in reverse creation order. The slot
    /// caches are invalidated and never revived. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing scope");

        let children: Vec<Weak<Scope>> = self.children.lock().drain(..).collect();
        for child in children.iter().rev() {
            if let Some(child) = child.upgrade() {
                child.close();
            }
        }

        let disposables: Vec<Arc<dyn Disposable>> = self.disposables.lock().drain(..).collect();
        for disposable in disposables.iter().rev() {
            disposable.dispose();
        }

        self.singletons.write().clear();
        self.scoped.write().clear();
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.close();
    }
}

fn slot_for(map: &RwLock<FxHashMap<u64, Arc<InstanceSlot>>>, id: u64) -> Arc<InstanceSlot> {
    if let Some(slot) = map.read().get(&id) {
        return slot.clone();
    }
    map.write().entry(id).or_insert_with(InstanceSlot::new).clone()
}
