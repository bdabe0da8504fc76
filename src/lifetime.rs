//! Instance lifetimes and disposal

/// Policy governing instance reuse for a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// A new instance for every resolution
    Transient,
    /// One instance shared by the whole scope tree below the owning scope
    Singleton,
    /// One instance per resolving scope
    Scoped,
}

/// Trait for instances that release resources when their scope closes.
///
/// Instances are shared behind `Arc`, so disposal goes through `&self`;
/// implementations use interior mutability where teardown needs it.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}
