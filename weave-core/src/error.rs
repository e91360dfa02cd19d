//! Error taxonomy for the composition engine.
//!
//! One enum, hand-written `Display`/`Debug`/[`std::error::Error`] impls — no
//! `thiserror`, mirroring the rest of the crates this engine grew out of.

/// Every error the engine's public surface can return.
pub enum WeaveError {
    /// A facet of this kind is already present and neither side permits an override.
    DuplicateKind { kind: String },
    /// A hook or facet declared a dependency that no produced facet satisfies.
    MissingDependency { kind: String, dependency: String },
    /// The dependency graph contains a cycle; lists every kind with residual indegree.
    Cycle { kinds: Vec<String> },
    /// A facet names a contract that was never registered.
    UnknownContract { contract: String },
    /// A facet failed one or more requirements of its declared contract.
    ContractViolation {
        kind: String,
        contract: String,
        reasons: Vec<String>,
    },
    /// An operation that requires an un-initialized facet was attempted on one that
    /// is already initialized (`add`, `add_dependency`, `on_init`, `on_dispose`).
    AlreadyInitialized { kind: String },
    /// `on_init` or `on_dispose` was called twice on the same facet.
    DuplicateCallback { kind: String, callback: &'static str },
    /// `Subsystem::use_hook` was called on a subsystem that is already built.
    AlreadyBuilt { subsystem: String },
    /// `commit`/`rollback` was called with no active transaction frame.
    NoActiveTransaction,
    /// Attaching a facet under a kind the subsystem already exposes under a
    /// different, non-overridable instance.
    AttachConflict { kind: String },
    /// A hook descriptor failed validation at construction time.
    BadHook { reason: String },
    /// A factory returned something that isn't a usable facet (kind mismatch, etc).
    BadFacet { reason: String },
    /// A version string failed to parse as semver.
    InvalidVersion { value: String, reason: String },
    /// The build (execute) phase failed; wraps the triggering error.
    BuildFailed {
        kind: String,
        cause: Box<WeaveError>,
    },
}

impl std::fmt::Display for WeaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeaveError::DuplicateKind { kind } => {
                write!(f, "duplicate kind '{kind}': a facet of this kind is already registered and overriding is not permitted")
            }
            WeaveError::MissingDependency { kind, dependency } => {
                write!(f, "'{kind}' requires '{dependency}', which no registered hook or facet provides")
            }
            WeaveError::Cycle { kinds } => {
                write!(f, "dependency cycle among: {}", kinds.join(", "))
            }
            WeaveError::UnknownContract { contract } => {
                write!(f, "unknown contract '{contract}'")
            }
            WeaveError::ContractViolation { kind, contract, reasons } => {
                write!(f, "'{kind}' violates contract '{contract}': {}", reasons.join("; "))
            }
            WeaveError::AlreadyInitialized { kind } => {
                write!(f, "facet '{kind}' is already initialized")
            }
            WeaveError::DuplicateCallback { kind, callback } => {
                write!(f, "facet '{kind}' already has a {callback} callback set")
            }
            WeaveError::AlreadyBuilt { subsystem } => {
                write!(f, "subsystem '{subsystem}' is already built; reload() before use()")
            }
            WeaveError::NoActiveTransaction => {
                write!(f, "no active transaction frame")
            }
            WeaveError::AttachConflict { kind } => {
                write!(f, "'{kind}' is already attached to a different, non-overridable facet")
            }
            WeaveError::BadHook { reason } => {
                write!(f, "invalid hook: {reason}")
            }
            WeaveError::BadFacet { reason } => {
                write!(f, "invalid facet: {reason}")
            }
            WeaveError::InvalidVersion { value, reason } => {
                write!(f, "invalid version '{value}': {reason}")
            }
            WeaveError::BuildFailed { kind, cause } => {
                write!(f, "build failed while installing '{kind}': {cause}")
            }
        }
    }
}

impl std::fmt::Debug for WeaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for WeaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WeaveError::BuildFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}
