//! A framework-agnostic plugin composition runtime: hooks produce facets, a
//! dependency graph orders them, a pure planner verifies the wiring before a
//! transactional executor installs it, and a [`Subsystem`] ties the whole
//! lifecycle together.

pub mod cache;
pub mod context;
pub mod contract;
pub mod error;
pub mod executor;
pub mod facet;
pub mod graph;
pub mod hook;
pub mod planner;
pub mod registry;
pub mod subsystem;
pub mod transaction;
pub mod version;

pub use cache::{CachedSort, GraphCache};
pub use context::Context;
pub use contract::{default_registry, Contract, ContractRegistry, Predicate};
pub use error::WeaveError;
pub use facet::{
    BoxFuture, DisposeFn, Facet, FacetOptions, FacetView, InitFn, LifecycleArgs, Lookup,
    LookupSource, Member, MemberDescriptor,
};
pub use hook::{hook, HookDescriptor, HookParams};
pub use planner::{Plan, Planner};
pub use registry::{AddOptions, Registry};
pub use subsystem::{DisposeCallback, InitCallback, Subsystem, SubsystemOptions};
pub use transaction::TransactionLog;
pub use version::Version;
