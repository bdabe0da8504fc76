//! Integration tests for the DI container

use bindery::prelude::*;
use bindery::{Disposable, NamedParameter, TypedParameter, Visibility};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Test services

trait Logging: Send + Sync {
    fn log(&self, message: &str);
    fn name(&self) -> &str;
}

struct Logger {
    name: String,
    lines: Mutex<Vec<String>>,
}

impl Logger {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lines: Mutex::new(Vec::new()),
        }
    }
}

impl Logging for Logger {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Injectable for Logger {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::describe::<Logger>()
            .constructor(ConstructorSpec::new([param::<String>("name")], |args| {
                Ok(Box::new(Logger::new(&args.get_cloned::<String>(0)?)))
            }))
            .implements::<dyn Logging, _>(|logger: Arc<Logger>| logger as Arc<dyn Logging>)
            .finish()
    }
}

struct UserService {
    logger: Arc<dyn Logging>,
}

impl Injectable for UserService {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::describe::<UserService>()
            .constructor(ConstructorSpec::new(
                [param_trait::<dyn Logging>("logger")],
                |args| {
                    Ok(Box::new(UserService {
                        logger: args.get_trait::<dyn Logging>(0)?,
                    }))
                },
            ))
            .finish()
    }
}

fn register_logger(builder: &mut ContainerBuilder, lifetime: Lifetime) {
    builder
        .register::<Logger>(lifetime)
        .as_self()
        .as_type::<dyn Logging>()
        .with_named_parameter("name", "app".to_string());
}

#[test]
fn transient_services_share_one_singleton_logger() {
    let mut builder = ContainerBuilder::new();
    register_logger(&mut builder, Lifetime::Singleton);
    builder.register::<UserService>(Lifetime::Transient);

    let container = builder.build().unwrap();
    let a = container.resolve::<UserService>().unwrap();
    let b = container.resolve::<UserService>().unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a.logger, &b.logger));
    a.logger.log("shared");
}

#[test]
fn singleton_is_identical_across_scopes() {
    let mut builder = ContainerBuilder::new();
    register_logger(&mut builder, Lifetime::Singleton);

    let container = builder.build().unwrap();
    let child = container.create_scope().unwrap();
    let grandchild = child.create_scope().unwrap();

    let from_root = container.resolve::<Logger>().unwrap();
    let from_child = child.resolve::<Logger>().unwrap();
    let from_grandchild = grandchild.resolve::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&from_root, &from_child));
    assert!(Arc::ptr_eq(&from_child, &from_grandchild));
}

#[test]
fn scoped_is_per_scope_and_stable_within_one() {
    let mut builder = ContainerBuilder::new();
    register_logger(&mut builder, Lifetime::Scoped);

    let container = builder.build().unwrap();
    let first = container.create_scope().unwrap();
    let second = container.create_scope().unwrap();

    let a1 = first.resolve::<Logger>().unwrap();
    let a2 = first.resolve::<Logger>().unwrap();
    let b = second.resolve::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
}

#[test]
fn transient_always_creates_new_instances() {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct Ticket {
        number: usize,
    }

    impl Injectable for Ticket {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Ticket>()
                .constructor(ConstructorSpec::nullary(|| {
                    Box::new(Ticket {
                        number: COUNTER.fetch_add(1, Ordering::Relaxed),
                    })
                }))
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Ticket>(Lifetime::Transient);
    let container = builder.build().unwrap();

    let a = container.resolve::<Ticket>().unwrap();
    let b = container.resolve::<Ticket>().unwrap();
    assert_ne!(a.number, b.number);
}

#[derive(Clone, PartialEq, Debug)]
struct Port(u16);

impl Injectable for Port {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::describe::<Port>()
            .constructor(ConstructorSpec::nullary(|| Box::new(Port(1234))))
            .finish()
    }
}

struct Endpoint {
    port: Port,
}

impl Injectable for Endpoint {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::describe::<Endpoint>()
            .constructor(ConstructorSpec::new([param::<Port>("port")], |args| {
                Ok(Box::new(Endpoint {
                    port: args.get_cloned::<Port>(0)?,
                }))
            }))
            .finish()
    }
}

#[test]
fn typed_override_wins_over_registration() {
    let mut builder = ContainerBuilder::new();
    builder.register::<Port>(Lifetime::Transient);
    builder
        .register::<Endpoint>(Lifetime::Transient)
        .with_parameter(Port(9090));

    let container = builder.build().unwrap();
    let endpoint = container.resolve::<Endpoint>().unwrap();
    assert_eq!(endpoint.port, Port(9090));
}

#[test]
fn without_override_the_registration_is_used() {
    let mut builder = ContainerBuilder::new();
    builder.register::<Port>(Lifetime::Transient);
    builder.register::<Endpoint>(Lifetime::Transient);

    let container = builder.build().unwrap();
    let endpoint = container.resolve::<Endpoint>().unwrap();
    assert_eq!(endpoint.port, Port(1234));
}

#[test]
fn call_site_override_bypasses_the_container() {
    let mut builder = ContainerBuilder::new();
    builder.register::<Port>(Lifetime::Transient);

    let container = builder.build().unwrap();
    let overridden = container
        .resolve_with::<Port>(&[Arc::new(TypedParameter::new(Port(7)))])
        .unwrap();
    assert_eq!(*overridden, Port(7));
}

#[test]
fn mismatched_override_value_is_reported() {
    let mut builder = ContainerBuilder::new();
    builder.register::<Port>(Lifetime::Transient);
    builder
        .register::<Endpoint>(Lifetime::Transient)
        .with_named_parameter("port", "not a port".to_string());

    let container = builder.build().unwrap();
    let result = container.resolve::<Endpoint>();
    assert!(matches!(
        result,
        Err(DiError::ParameterTypeMismatch { .. })
    ));
}

#[test]
fn unregistered_type_is_not_found() {
    let container = ContainerBuilder::new().build().unwrap();
    let result = container.resolve::<Logger>();
    assert!(matches!(result, Err(DiError::NoRegistrationFound { .. })));
}

#[test]
fn self_referential_chain_fails_fast() {
    struct Ouroboros {
        _tail: Arc<Ouroboros>,
    }

    impl Injectable for Ouroboros {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Ouroboros>()
                .constructor(ConstructorSpec::new([param::<Ouroboros>("tail")], |args| {
                    Ok(Box::new(Ouroboros {
                        _tail: args.get::<Ouroboros>(0)?,
                    }))
                }))
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Ouroboros>(Lifetime::Transient);
    let container = builder.build().unwrap();

    let result = container.resolve::<Ouroboros>();
    assert!(matches!(result, Err(DiError::CircularDependency { .. })));
}

#[test]
fn transitive_cycle_reports_the_path() {
    struct Yin {
        _other: Arc<Yang>,
    }
    struct Yang {
        _other: Arc<Yin>,
    }

    impl Injectable for Yin {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Yin>()
                .constructor(ConstructorSpec::new([param::<Yang>("other")], |args| {
                    Ok(Box::new(Yin {
                        _other: args.get::<Yang>(0)?,
                    }))
                }))
                .finish()
        }
    }
    impl Injectable for Yang {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Yang>()
                .constructor(ConstructorSpec::new([param::<Yin>("other")], |args| {
                    Ok(Box::new(Yang {
                        _other: args.get::<Yin>(0)?,
                    }))
                }))
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Yin>(Lifetime::Transient);
    builder.register::<Yang>(Lifetime::Transient);
    let container = builder.build().unwrap();

    match container.resolve::<Yin>().err() {
        Some(DiError::CircularDependency { path }) => {
            assert!(path.contains("Yin"));
            assert!(path.contains("Yang"));
        }
        other => panic!("expected CircularDependency, got {other:?}"),
    }
}

trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
}

struct ParentPlugin;
struct ChildPlugin;

impl Plugin for ParentPlugin {
    fn id(&self) -> &'static str {
        "parent"
    }
}

impl Plugin for ChildPlugin {
    fn id(&self) -> &'static str {
        "child"
    }
}

impl Injectable for ParentPlugin {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::describe::<ParentPlugin>()
            .constructor(ConstructorSpec::nullary(|| Box::new(ParentPlugin)))
            .implements::<dyn Plugin, _>(|p: Arc<ParentPlugin>| p as Arc<dyn Plugin>)
            .finish()
    }
}

impl Injectable for ChildPlugin {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::describe::<ChildPlugin>()
            .constructor(ConstructorSpec::nullary(|| Box::new(ChildPlugin)))
            .implements::<dyn Plugin, _>(|p: Arc<ChildPlugin>| p as Arc<dyn Plugin>)
            .finish()
    }
}

#[test]
fn child_registration_shadows_the_parent() {
    let mut builder = ContainerBuilder::new();
    builder
        .register::<ParentPlugin>(Lifetime::Transient)
        .as_type::<dyn Plugin>();
    let container = builder.build().unwrap();

    let child = container
        .root()
        .create_scope_with(|b| {
            b.register::<ChildPlugin>(Lifetime::Transient)
                .as_type::<dyn Plugin>();
        })
        .unwrap();

    assert_eq!(container.resolve_trait::<dyn Plugin>().unwrap().id(), "parent");
    assert_eq!(child.resolve_trait::<dyn Plugin>().unwrap().id(), "child");

    // An empty grandchild falls back to the closest ancestor registration
    let grandchild = child.create_scope().unwrap();
    assert_eq!(grandchild.resolve_trait::<dyn Plugin>().unwrap().id(), "child");
}

#[test]
fn undeclared_interface_is_rejected_at_build_time() {
    let mut builder = ContainerBuilder::new();
    builder
        .register::<ParentPlugin>(Lifetime::Transient)
        .as_type::<dyn Logging>();
    let result = builder.build();
    assert!(matches!(result, Err(DiError::IncompatibleInterface { .. })));
}

#[test]
fn private_constructor_still_works_reflectively() {
    struct Hermit;

    impl Injectable for Hermit {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Hermit>()
                .constructor(
                    ConstructorSpec::nullary(|| Box::new(Hermit))
                        .visibility(Visibility::Private),
                )
                .finish()
        }
    }

    let descriptor = bindery::analyze::<Hermit>().unwrap();
    assert!(matches!(
        bindery::check_eligibility(&descriptor),
        Err(DiError::PrivateConstructorInaccessible { .. })
    ));

    let mut builder = ContainerBuilder::new();
    builder.register::<Hermit>(Lifetime::Transient);
    let container = builder.build().unwrap();
    assert!(container.resolve::<Hermit>().is_ok());
}

#[test]
fn host_owned_type_cannot_be_constructed() {
    struct NativeWindow;

    impl Injectable for NativeWindow {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<NativeWindow>()
                .constructor(ConstructorSpec::nullary(|| Box::new(NativeWindow)))
                .host_owned()
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<NativeWindow>(Lifetime::Transient);
    let container = builder.build().unwrap();

    assert!(matches!(
        container.resolve::<NativeWindow>(),
        Err(DiError::HostOwnedTypeCannotBeConstructed { .. })
    ));
}

#[test]
fn members_inject_in_declaration_order_then_methods() {
    #[derive(Default)]
    struct Gadget {
        order: Vec<&'static str>,
    }

    impl Injectable for Gadget {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Gadget>()
                .constructor(ConstructorSpec::nullary(|| Box::new(Gadget::default())))
                .field(MemberSpec::new::<Gadget, String, _>("first", |g, _| {
                    g.order.push("field")
                }))
                .property(MemberSpec::new::<Gadget, String, _>("second", |g, _| {
                    g.order.push("property")
                }))
                .method(MethodSpec::new::<Gadget, _>("setup", [], |g, _| {
                    g.order.push("method");
                    Ok(())
                }))
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register_instance::<String>("value".to_string());
    builder.register::<Gadget>(Lifetime::Transient);
    let container = builder.build().unwrap();

    let gadget = container.resolve::<Gadget>().unwrap();
    assert_eq!(gadget.order, vec!["field", "property", "method"]);
}

#[test]
fn inject_into_populates_an_existing_instance() {
    #[derive(Default)]
    struct Sidecar {
        logger: Option<Arc<dyn Logging>>,
    }

    impl Injectable for Sidecar {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Sidecar>()
                .constructor(ConstructorSpec::nullary(|| Box::new(Sidecar::default())))
                .field(MemberSpec::new_trait::<Sidecar, dyn Logging, _>(
                    "logger",
                    |s, v| s.logger = Some(v),
                ))
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    register_logger(&mut builder, Lifetime::Singleton);
    let container = builder.build().unwrap();

    let mut sidecar = Sidecar::default();
    container.root().inject_into(&mut sidecar).unwrap();
    assert_eq!(sidecar.logger.unwrap().name(), "app");
}

#[derive(Default)]
struct DisposalLog {
    entries: Mutex<Vec<&'static str>>,
}

macro_rules! tracked {
    ($name:ident, $tag:literal) => {
        struct $name {
            log: Arc<DisposalLog>,
        }

        impl Disposable for $name {
            fn dispose(&self) {
                self.log.entries.lock().unwrap().push($tag);
            }
        }

        impl Injectable for $name {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::describe::<$name>()
                    .constructor(ConstructorSpec::new([param::<DisposalLog>("log")], |args| {
                        Ok(Box::new($name {
                            log: args.get::<DisposalLog>(0)?,
                        }))
                    }))
                    .disposable()
                    .finish()
            }
        }
    };
}

tracked!(RootWorker, "root");
tracked!(ScopedWorker, "scoped");

#[test]
fn disposal_runs_child_before_parent_in_reverse_creation_order() {
    let mut builder = ContainerBuilder::new();
    builder.register_instance(DisposalLog::default());
    builder.register::<RootWorker>(Lifetime::Singleton);
    builder.register::<ScopedWorker>(Lifetime::Scoped);

    let container = builder.build().unwrap();
    let log = container.resolve::<DisposalLog>().unwrap();
    container.resolve::<RootWorker>().unwrap();

    let child = container.create_scope().unwrap();
    child.resolve::<ScopedWorker>().unwrap();

    container.close();
    let entries = log.entries.lock().unwrap();
    assert_eq!(*entries, vec!["scoped", "root"]);
}

#[test]
fn closing_twice_is_a_no_op_and_closed_scope_rejects_resolution() {
    let mut builder = ContainerBuilder::new();
    register_logger(&mut builder, Lifetime::Scoped);
    let container = builder.build().unwrap();

    let scope = container.create_scope().unwrap();
    scope.resolve::<Logger>().unwrap();
    scope.close();
    scope.close();

    assert!(matches!(
        scope.resolve::<Logger>(),
        Err(DiError::ScopeClosed)
    ));
}

#[test]
fn concurrent_singleton_resolution_observes_one_instance() {
    let mut builder = ContainerBuilder::new();
    register_logger(&mut builder, Lifetime::Singleton);
    let container = Arc::new(builder.build().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let container = container.clone();
            std::thread::spawn(move || container.resolve::<Logger>().unwrap())
        })
        .collect();

    let instances: Vec<Arc<Logger>> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();
    for pair in instances.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
    }
}

#[test]
fn modules_bundle_registrations() {
    struct LoggingModule;

    impl Module for LoggingModule {
        fn configure(&self, builder: &mut ContainerBuilder) {
            register_logger(builder, Lifetime::Singleton);
        }
    }

    let container = ContainerBuilder::new()
        .add_module(LoggingModule)
        .build()
        .unwrap();

    let logger = container.resolve_trait::<dyn Logging>().unwrap();
    assert_eq!(logger.name(), "app");
}

#[test]
fn failed_singleton_build_reaches_waiters_without_rebuilding() {
    static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

    struct Flaky;

    impl Injectable for Flaky {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Flaky>()
                .constructor(ConstructorSpec::new(Vec::new(), |_| {
                    if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                        std::thread::sleep(std::time::Duration::from_millis(200));
                        Err(DiError::ParameterTypeMismatch {
                            type_name: "Flaky",
                            parameter: "seed".to_string(),
                        })
                    } else {
                        Ok(Box::new(Flaky))
                    }
                }))
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Flaky>(Lifetime::Singleton);
    let container = Arc::new(builder.build().unwrap());

    let first = {
        let container = container.clone();
        std::thread::spawn(move || container.resolve::<Flaky>())
    };
    // Arrive while the first construction is still in flight
    std::thread::sleep(std::time::Duration::from_millis(50));
    let waiter = {
        let container = container.clone();
        std::thread::spawn(move || container.resolve::<Flaky>())
    };

    assert!(first.join().unwrap().is_err());
    // The waiter observes the same failed outcome and never runs the
    // constructor itself
    assert!(waiter.join().unwrap().is_err());
    assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 1);

    // A later resolution retries and succeeds
    assert!(container.resolve::<Flaky>().is_ok());
    assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
}

#[test]
fn closed_scopes_reject_new_children_and_never_revive_slots() {
    static DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct Resource;

    impl Disposable for Resource {
        fn dispose(&self) {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Injectable for Resource {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::describe::<Resource>()
                .constructor(ConstructorSpec::nullary(|| Box::new(Resource)))
                .disposable()
                .finish()
        }
    }

    let mut builder = ContainerBuilder::new();
    builder.register::<Resource>(Lifetime::Singleton);
    let container = builder.build().unwrap();

    container.resolve::<Resource>().unwrap();
    container.close();
    assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);

    assert!(matches!(
        container.create_scope(),
        Err(DiError::ScopeClosed)
    ));
    assert!(matches!(
        container.root().create_scope_with(|_| {}),
        Err(DiError::ScopeClosed)
    ));
    assert!(matches!(
        container.resolve::<Resource>(),
        Err(DiError::ScopeClosed)
    ));
    // Nothing was rebuilt into the cleared slot cache
    assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
}

#[test]
fn named_overrides_cannot_hijack_a_whole_instance_request() {
    let mut builder = ContainerBuilder::new();
    builder.register::<Port>(Lifetime::Transient);
    let container = builder.build().unwrap();

    let resolved = container
        .resolve_with::<Port>(&[Arc::new(NamedParameter::new("", "oops".to_string()))])
        .unwrap();
    assert_eq!(*resolved, Port(1234));
}

#[test]
fn last_registration_wins_for_the_same_interface() {
    let mut builder = ContainerBuilder::new();
    builder
        .register::<ParentPlugin>(Lifetime::Transient)
        .as_type::<dyn Plugin>();
    builder
        .register::<ChildPlugin>(Lifetime::Transient)
        .as_type::<dyn Plugin>();

    let container = builder.build().unwrap();
    assert_eq!(container.resolve_trait::<dyn Plugin>().unwrap().id(), "child");
}
