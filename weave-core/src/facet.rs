//! Facets: the capability objects hook factories produce.
//!
//! A facet is built up with [`Facet::add`]/[`Facet::add_dependency`]/
//! [`Facet::on_init`]/[`Facet::on_dispose`], then frozen the moment [`Facet::init`]
//! succeeds. After that every mutator returns [`WeaveError::AlreadyInitialized`]
//! instead of failing to compile — see `DESIGN.md` (Open Question OQ-1) for why this
//! crate keeps a runtime state split instead of two separate Rust types.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::context::Context;
use crate::error::WeaveError;
use crate::version::Version;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One entry of a facet's method bag: a callable, an accessor pair, or a plain value.
#[derive(Clone)]
pub enum Member {
    Method(Arc<dyn Fn(&[Value]) -> Result<Value, WeaveError> + Send + Sync>),
    Accessor {
        get: Option<Arc<dyn Fn() -> Value + Send + Sync>>,
        set: Option<Arc<dyn Fn(Value) + Send + Sync>>,
    },
    Value(Value),
}

/// A method-bag entry plus the writable/enumerable/configurable bits the source's
/// reflective property-copy preserved; kept here so `add` can implement the same
/// "skip non-configurable, already-present keys" rule without actual reflection.
#[derive(Clone)]
pub struct MemberDescriptor {
    pub member: Member,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl MemberDescriptor {
    pub fn method(f: impl Fn(&[Value]) -> Result<Value, WeaveError> + Send + Sync + 'static) -> Self {
        Self {
            member: Member::Method(Arc::new(f)),
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn value(v: Value) -> Self {
        Self {
            member: Member::Value(v),
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }
}

/// Boxed, at-most-once lifecycle callback. Mirrors `r2e-core::beans::Factory`'s
/// "take self by value, return a boxed future" shape for async closures.
pub type InitFn = Box<dyn FnOnce(LifecycleArgs) -> BoxFuture<Result<(), WeaveError>> + Send + Sync>;
pub type DisposeFn = Box<dyn FnOnce(LifecycleArgs) -> BoxFuture<Result<(), WeaveError>> + Send + Sync>;

/// What a lifecycle callback (or a hook factory) receives: the resolved build
/// context, a handle to look up sibling facets by kind, and the owning
/// subsystem's name (used for diagnostics, never for dynamic dispatch back in).
#[derive(Clone)]
pub struct LifecycleArgs {
    pub context: Context,
    pub lookup: Lookup,
    pub subsystem_name: String,
}

/// Anything that can answer "what facet is registered under this kind right now".
/// Implemented by the registry (post-build lookups) and by the planner's
/// temporary verify-phase view (pre-build lookups) — both are just [`Lookup`] to a
/// hook factory, which is the whole point of `SPEC_FULL.md` §4.3's name-lookup view.
pub trait LookupSource: Send + Sync {
    fn lookup(&self, kind: &str) -> Option<FacetView>;
}

#[derive(Clone)]
pub struct Lookup(pub Arc<dyn LookupSource>);

impl Lookup {
    pub fn lookup(&self, kind: &str) -> Option<FacetView> {
        self.0.lookup(kind)
    }

    pub fn empty() -> Self {
        struct Empty;
        impl LookupSource for Empty {
            fn lookup(&self, _kind: &str) -> Option<FacetView> {
                None
            }
        }
        Lookup(Arc::new(Empty))
    }
}

/// A cheap, cloneable, read-only snapshot of a facet's public surface — what a
/// hook factory or a contract check actually needs, without handing out mutable
/// access to the registry's owned `Facet`.
#[derive(Clone)]
pub struct FacetView {
    pub kind: String,
    pub source: String,
    pub version: Version,
    pub contract: Option<String>,
    pub required: Vec<String>,
    methods: Arc<IndexMap<String, MemberDescriptor>>,
}

impl FacetView {
    pub fn has_method(&self, name: &str) -> bool {
        matches!(
            self.methods.get(name).map(|d| &d.member),
            Some(Member::Method(_))
        )
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.methods.get(name).map(|d| &d.member)
    }
}

enum FacetState {
    Building {
        required: IndexSet<String>,
        methods: IndexMap<String, MemberDescriptor>,
        init_callback: Option<InitFn>,
        dispose_callback: Option<DisposeFn>,
    },
    Initialized {
        required: IndexSet<String>,
        methods: Arc<IndexMap<String, MemberDescriptor>>,
        dispose_callback: Option<DisposeFn>,
    },
}

static NEXT_FACET_ID: AtomicU64 = AtomicU64::new(1);

/// Options accepted by [`Facet::new`], mirroring the hook descriptor fields a
/// factory typically forwards onto the facet it produces.
#[derive(Default, Clone)]
pub struct FacetOptions {
    pub source: String,
    pub version: Version,
    pub contract: Option<String>,
    pub attach: bool,
    pub overwrite: bool,
}

impl std::fmt::Debug for Facet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facet")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

pub struct Facet {
    kind: String,
    source: String,
    version: Version,
    contract: Option<String>,
    attach: bool,
    overwrite: bool,
    order_index: Option<usize>,
    id: u64,
    state: FacetState,
}

impl Facet {
    /// Construct a facet. Rejects an empty (or all-whitespace) `kind`, mirroring
    /// [`crate::hook::hook`]'s validation of its own `kind` field.
    pub fn new(kind: impl Into<String>, options: FacetOptions) -> Result<Self, WeaveError> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(WeaveError::BadFacet {
                reason: "kind must not be empty".into(),
            });
        }
        Ok(Facet {
            kind,
            source: options.source,
            version: options.version,
            contract: options.contract,
            attach: options.attach,
            overwrite: options.overwrite,
            order_index: None,
            id: NEXT_FACET_ID.fetch_add(1, Ordering::Relaxed),
            state: FacetState::Building {
                required: IndexSet::new(),
                methods: IndexMap::new(),
                init_callback: None,
                dispose_callback: None,
            },
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn contract(&self) -> Option<&str> {
        self.contract.as_deref()
    }

    pub fn attach(&self) -> bool {
        self.attach
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn order_index(&self) -> Option<usize> {
        self.order_index
    }

    pub fn set_order_index(&mut self, index: usize) {
        self.order_index = Some(index);
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, FacetState::Initialized { .. })
    }

    pub fn required(&self) -> Vec<String> {
        match &self.state {
            FacetState::Building { required, .. } => required.iter().cloned().collect(),
            FacetState::Initialized { required, .. } => required.iter().cloned().collect(),
        }
    }

    fn guard_building(&mut self) -> Result<(), WeaveError> {
        if self.is_initialized() {
            Err(WeaveError::AlreadyInitialized {
                kind: self.kind.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Copy every entry of `members` onto the method bag, skipping keys already
    /// present — the non-reflective analogue of the source's property-descriptor copy.
    pub fn add<I>(&mut self, members: I) -> Result<&mut Self, WeaveError>
    where
        I: IntoIterator<Item = (String, MemberDescriptor)>,
    {
        self.guard_building()?;
        if let FacetState::Building { methods, .. } = &mut self.state {
            for (name, descriptor) in members {
                methods.entry(name).or_insert(descriptor);
            }
        }
        Ok(self)
    }

    pub fn add_dependency(&mut self, kind: impl Into<String>) -> Result<&mut Self, WeaveError> {
        self.guard_building()?;
        if let FacetState::Building { required, .. } = &mut self.state {
            required.insert(kind.into());
        }
        Ok(self)
    }

    pub fn on_init(&mut self, callback: InitFn) -> Result<&mut Self, WeaveError> {
        self.guard_building()?;
        if let FacetState::Building { init_callback, .. } = &mut self.state {
            if init_callback.is_some() {
                return Err(WeaveError::DuplicateCallback {
                    kind: self.kind.clone(),
                    callback: "init",
                });
            }
            *init_callback = Some(callback);
        }
        Ok(self)
    }

    pub fn on_dispose(&mut self, callback: DisposeFn) -> Result<&mut Self, WeaveError> {
        self.guard_building()?;
        if let FacetState::Building { dispose_callback, .. } = &mut self.state {
            if dispose_callback.is_some() {
                return Err(WeaveError::DuplicateCallback {
                    kind: self.kind.clone(),
                    callback: "dispose",
                });
            }
            *dispose_callback = Some(callback);
        }
        Ok(self)
    }

    /// A cheap, shareable snapshot for lookups. Safe to call in either state.
    pub fn view(&self) -> FacetView {
        let methods = match &self.state {
            FacetState::Building { methods, .. } => Arc::new(methods.clone()),
            FacetState::Initialized { methods, .. } => methods.clone(),
        };
        FacetView {
            kind: self.kind.clone(),
            source: self.source.clone(),
            version: self.version.clone(),
            contract: self.contract.clone(),
            required: self.required(),
            methods,
        }
    }

    /// Run `init_callback` exactly once. On success the facet transitions to
    /// `Initialized` and becomes immutable. On failure the facet stays `Building`
    /// so the caller can still best-effort `dispose` it before discarding it.
    pub async fn init(&mut self, args: LifecycleArgs) -> Result<(), WeaveError> {
        self.guard_building()?;
        let (init_callback, required, methods, dispose_callback) = match &mut self.state {
            FacetState::Building {
                init_callback,
                required,
                methods,
                dispose_callback,
            } => (
                init_callback.take(),
                std::mem::take(required),
                std::mem::take(methods),
                dispose_callback.take(),
            ),
            FacetState::Initialized { .. } => unreachable!("guarded above"),
        };

        if let Some(callback) = init_callback {
            if let Err(err) = callback(args).await {
                // restore state so the caller can still dispose / inspect it.
                self.state = FacetState::Building {
                    required,
                    methods,
                    init_callback: None,
                    dispose_callback,
                };
                return Err(err);
            }
        }

        self.state = FacetState::Initialized {
            required,
            methods: Arc::new(methods),
            dispose_callback,
        };
        Ok(())
    }

    /// Best-effort: runs `dispose_callback` at most once. Safe to call on a facet
    /// whose `init` never ran or never succeeded.
    pub async fn dispose(&mut self, args: LifecycleArgs) -> Result<(), WeaveError> {
        let callback = match &mut self.state {
            FacetState::Building { dispose_callback, .. } => dispose_callback.take(),
            FacetState::Initialized { dispose_callback, .. } => dispose_callback.take(),
        };
        match callback {
            Some(callback) => callback(args).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> LifecycleArgs {
        LifecycleArgs {
            context: Context::new(),
            lookup: Lookup::empty(),
            subsystem_name: "test".into(),
        }
    }

    #[test]
    fn rejects_empty_kind() {
        let err = Facet::new("", FacetOptions::default()).unwrap_err();
        assert!(matches!(err, WeaveError::BadFacet { .. }));
        let err = Facet::new("   ", FacetOptions::default()).unwrap_err();
        assert!(matches!(err, WeaveError::BadFacet { .. }));
    }

    #[tokio::test]
    async fn init_runs_callback_exactly_once() {
        let mut facet = Facet::new("a", FacetOptions::default()).unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        let calls2 = calls.clone();
        facet
            .on_init(Box::new(move |_| {
                let calls = calls2.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .unwrap();
        facet.init(args()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(facet.is_initialized());
    }

    #[tokio::test]
    async fn add_after_init_fails() {
        let mut facet = Facet::new("a", FacetOptions::default()).unwrap();
        facet.init(args()).await.unwrap();
        let err = facet
            .add([("x".to_string(), MemberDescriptor::value(Value::Bool(true)))])
            .unwrap_err();
        assert!(matches!(err, WeaveError::AlreadyInitialized { .. }));
    }

    #[tokio::test]
    async fn failed_init_does_not_freeze_facet() {
        let mut facet = Facet::new("a", FacetOptions::default()).unwrap();
        facet
            .on_init(Box::new(|_| Box::pin(async { Err(WeaveError::BadFacet { reason: "boom".into() }) })))
            .unwrap();
        let err = facet.init(args()).await.unwrap_err();
        assert!(matches!(err, WeaveError::BadFacet { .. }));
        assert!(!facet.is_initialized());
    }

    #[tokio::test]
    async fn double_on_init_is_duplicate() {
        let mut facet = Facet::new("a", FacetOptions::default()).unwrap();
        facet.on_init(Box::new(|_| Box::pin(async { Ok(()) }))).unwrap();
        let err = facet
            .on_init(Box::new(|_| Box::pin(async { Ok(()) })))
            .unwrap_err();
        assert!(matches!(err, WeaveError::DuplicateCallback { .. }));
    }

    #[tokio::test]
    async fn dispose_without_callback_is_noop() {
        let mut facet = Facet::new("a", FacetOptions::default()).unwrap();
        facet.init(args()).await.unwrap();
        facet.dispose(args()).await.unwrap();
    }

    #[tokio::test]
    async fn dispose_runs_at_most_once() {
        let mut facet = Facet::new("a", FacetOptions::default()).unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        let calls2 = calls.clone();
        facet
            .on_dispose(Box::new(move |_| {
                let calls = calls2.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .unwrap();
        facet.init(args()).await.unwrap();
        facet.dispose(args()).await.unwrap();
        facet.dispose(args()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn view_reflects_added_methods() {
        let mut facet = Facet::new("db", FacetOptions::default()).unwrap();
        facet
            .add([(
                "query".to_string(),
                MemberDescriptor::method(|_args| Ok(Value::Null)),
            )])
            .unwrap();
        let view = facet.view();
        assert!(view.has_method("query"));
        assert!(!view.has_method("close"));
    }
}
