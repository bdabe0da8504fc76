//! Error types for the DI container

use thiserror::Error;

/// Result type alias for DI operations
pub type DiResult<T> = Result<T, DiError>;

/// Errors that can occur during analysis, registration and resolution.
///
/// Static-shape errors are raised once per type by descriptor analysis or
/// the generated-injector eligibility check and are terminal for that type.
/// Construction-time errors are raised per resolution attempt.
/// `DiError` is `Clone` so cached analysis rejections can be replayed to
/// every later caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiError {
    // --- Static-shape errors ---
    /// Abstract types cannot be constructed by any injector
    #[error("abstract type is not eligible for injection: {type_name}")]
    AbstractNotEligible { type_name: &'static str },

    /// Unbound generic types cannot be analyzed
    #[error("unbound generic type is not eligible for injection: {type_name}")]
    UnboundGenericNotEligible { type_name: &'static str },

    /// Nested type not reachable from the generated injector's emission context
    #[error("nested type is inaccessible to the generated injector: {type_name}")]
    NestedTypeInaccessible { type_name: &'static str },

    /// The selected injection constructor is private to the generated path
    #[error("constructor of {type_name} is inaccessible to the generated injector")]
    PrivateConstructorInaccessible { type_name: &'static str },

    /// An injectable member is private and the type is not augmentable
    #[error("member {member} of {type_name} is inaccessible to the generated injector")]
    PrivateMemberInaccessible {
        type_name: &'static str,
        member: &'static str,
    },

    /// More than one constructor carries the injection marker
    #[error("multiple constructors of {type_name} are marked for injection")]
    AmbiguousConstructor { type_name: &'static str },

    /// An injection point has open generic parameters
    #[error("injection point {member} of {type_name} has open generic parameters")]
    OpenGenericMethodNotEligible {
        type_name: &'static str,
        member: &'static str,
    },

    /// No usable constructor was declared for the type
    #[error("no constructor found for {type_name}")]
    NoConstructorFound { type_name: &'static str },

    // --- Construction-time errors ---
    /// No registration satisfies the requested type
    #[error("no registration found for {type_name}")]
    NoRegistrationFound { type_name: &'static str },

    /// A registration re-entered its own construction on the same call chain
    #[error("circular dependency detected: {path}")]
    CircularDependency { path: String },

    /// The type is created exclusively by the hosting environment
    #[error("host-owned type cannot be constructed: {type_name}")]
    HostOwnedTypeCannotBeConstructed { type_name: &'static str },

    /// An override or resolved value does not match the target parameter type
    #[error("value for parameter {parameter} of {type_name} has an incompatible type")]
    ParameterTypeMismatch {
        type_name: &'static str,
        parameter: String,
    },

    /// The scope was closed before this resolution
    #[error("scope is closed")]
    ScopeClosed,

    // --- Builder-time errors ---
    /// The implementation type does not declare the requested interface
    #[error("{type_name} does not implement interface {interface}")]
    IncompatibleInterface {
        type_name: &'static str,
        interface: String,
    },

    /// Configuration error
    #[cfg(feature = "config")]
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Service name unknown to the by-name registry
    #[cfg(feature = "config")]
    #[error("service not registered by name: {0}")]
    ServiceNotFoundByName(String),
}
