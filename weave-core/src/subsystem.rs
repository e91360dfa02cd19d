//! [`Subsystem`]: the aggregate root that owns hooks, a registry, children, and
//! lifecycle callbacks, and drives the planner/executor pair through its state
//! machine (`build`/`dispose`/`reload`).
//!
//! The single `tokio::sync::Mutex` guarding every entry point mirrors the
//! teacher's "one gate, whole critical section" shape for `BeanRegistry::resolve`,
//! which consumes `self` and runs to completion without interleaving — here the
//! gate plays the same role without requiring ownership transfer.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::context::Context;
use crate::contract::{default_registry, ContractRegistry};
use crate::error::WeaveError;
use crate::executor;
use crate::facet::{BoxFuture, Facet, Lookup};
use crate::hook::HookDescriptor;
use crate::planner::Planner;
use crate::registry::Registry;

/// Runs once per registered `on_init`/`on_dispose` call, every `build`/`reload`
/// cycle — must be `Fn`, not `FnOnce`, since a reload preserves callbacks.
pub type InitCallback = Box<dyn Fn(Lookup, Context) -> BoxFuture<Result<(), WeaveError>> + Send + Sync>;
pub type DisposeCallback = Box<dyn Fn(Lookup, Context) -> BoxFuture<Result<(), WeaveError>> + Send + Sync>;

/// Options accepted by [`Subsystem::new`]. `message_system` is accepted and
/// never read — a passthrough slot for callers migrating code that used to
/// thread an external message bus through construction.
#[derive(Default)]
pub struct SubsystemOptions {
    pub config: std::collections::HashMap<String, serde_json::Value>,
    pub debug: bool,
    pub default_hooks: Vec<HookDescriptor>,
    pub contracts: Option<Arc<ContractRegistry>>,
    pub message_system: Option<serde_json::Value>,
    /// Capacity for the planner's graph-result cache; `None` uses `Planner::new`'s default.
    pub cache_capacity: Option<usize>,
}

pub struct Subsystem {
    name: String,
    hooks: Vec<HookDescriptor>,
    default_hooks: Vec<HookDescriptor>,
    context: Context,
    registry: Registry,
    init_callbacks: Vec<InitCallback>,
    dispose_callbacks: Vec<DisposeCallback>,
    children: Vec<Subsystem>,
    is_built: bool,
    planner: Planner,
    contracts: Arc<ContractRegistry>,
    gate: Arc<Mutex<()>>,
    root_name: String,
    /// Names from root to self, inclusive; `[root_name]` for a root subsystem.
    /// A real parent back-reference would need `Rc<RefCell<_>>` since children
    /// are owned directly by their parent (`DESIGN.md`, Open Question OQ-3) —
    /// this copied path gives `name_string`/`is_root`/`get_parent` the same
    /// observable answers without it.
    full_path: Vec<String>,
}

impl Subsystem {
    pub fn new(name: impl Into<String>, opts: SubsystemOptions) -> Self {
        let name = name.into();
        let context = Context {
            config: opts.config,
            debug: opts.debug,
            extra: std::collections::HashMap::new(),
        };
        Subsystem {
            full_path: vec![name.clone()],
            root_name: name.clone(),
            name,
            hooks: Vec::new(),
            default_hooks: opts.default_hooks,
            context,
            registry: Registry::new(),
            init_callbacks: Vec::new(),
            dispose_callbacks: Vec::new(),
            children: Vec::new(),
            is_built: false,
            planner: opts
                .cache_capacity
                .map(Planner::with_cache_capacity)
                .unwrap_or_else(Planner::new),
            contracts: opts.contracts.unwrap_or_else(|| Arc::new(ContractRegistry::new())),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// A root-only convenience: uses the process-wide default contract registry
    /// instead of a fresh, subsystem-private one.
    pub fn new_with_default_contracts(name: impl Into<String>, opts: SubsystemOptions) -> Self {
        let mut opts = opts;
        opts.contracts = None;
        let mut s = Self::new(name, opts);
        s.contracts = Arc::new(ContractRegistry::new());
        let _ = default_registry(); // warm the process-wide singleton
        s
    }

    pub fn name_str(&self) -> &str {
        &self.name
    }

    pub fn is_built(&self) -> bool {
        self.is_built
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.registry.all_kinds()
    }

    pub fn find(&self, kind: &str, order_index: Option<usize>) -> Option<&Facet> {
        self.registry.find(kind, order_index)
    }

    pub fn get_by_index(&self, kind: &str, i: usize) -> Option<&Facet> {
        self.registry.get_by_index(kind, i)
    }

    /// Append `hook`; rejects once the subsystem is built (`reload` first).
    pub fn use_hook(&mut self, hook: HookDescriptor) -> Result<(), WeaveError> {
        if self.is_built {
            return Err(WeaveError::AlreadyBuilt { subsystem: self.name.clone() });
        }
        self.hooks.push(hook);
        Ok(())
    }

    pub fn use_if(&mut self, condition: bool, hook: HookDescriptor) -> Result<(), WeaveError> {
        if condition {
            self.use_hook(hook)
        } else {
            Ok(())
        }
    }

    pub fn on_init(&mut self, callback: InitCallback) {
        self.init_callbacks.push(callback);
    }

    pub fn on_dispose(&mut self, callback: DisposeCallback) {
        self.dispose_callbacks.push(callback);
    }

    /// Take ownership of `child`, wiring its hierarchy path to hang off `self`.
    pub fn add_child(&mut self, mut child: Subsystem) {
        child.set_parent(self);
        self.children.push(child);
    }

    /// Copies `parent`'s hierarchy path onto `self`, as though `self` had just
    /// been added as one of its children. `add_child` calls this internally;
    /// exposed directly for callers that build the path without transferring
    /// ownership through `add_child`.
    pub fn set_parent(&mut self, parent: &Subsystem) {
        self.root_name = parent.root_name.clone();
        self.full_path = parent.full_path.clone();
        self.full_path.push(self.name.clone());
    }

    pub fn children(&self) -> &[Subsystem] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.full_path.len() <= 1
    }

    pub fn get_root(&self) -> &str {
        &self.root_name
    }

    pub fn get_parent(&self) -> Option<&str> {
        if self.full_path.len() >= 2 {
            self.full_path.get(self.full_path.len() - 2).map(|s| s.as_str())
        } else {
            None
        }
    }

    pub fn name_string(&self) -> String {
        if self.is_root() {
            format!("{}://", self.root_name)
        } else {
            format!("{}://{}", self.root_name, self.full_path[1..].join("/"))
        }
    }

    /// Verify then execute. A no-op if already built; awaits any in-progress
    /// `build`/`dispose` first so concurrent callers observe one outcome.
    #[tracing::instrument(level = "info", skip_all, fields(subsystem = %self.name))]
    pub async fn build(&mut self, extra_ctx: Option<Context>) -> Result<(), WeaveError> {
        let gate = self.gate.clone();
        let _gate = gate.lock().await;
        if self.is_built {
            return Ok(());
        }

        let hooks: Vec<HookDescriptor> = self
            .default_hooks
            .iter()
            .cloned()
            .chain(self.hooks.iter().cloned())
            .collect();

        let plan = self
            .planner
            .verify(&hooks, &self.context, extra_ctx.as_ref(), &self.contracts, &self.name)
            .await?;

        let resolved_ctx = executor::execute(&mut self.registry, plan, self.name.clone()).await?;
        self.context = resolved_ctx;

        for child in &mut self.children {
            if let Err(err) = Box::pin(child.build(None)).await {
                self.unwind_partial_build().await;
                return Err(err);
            }
        }

        for callback in &self.init_callbacks {
            let lookup = self.registry.lookup_handle();
            if let Err(err) = callback(lookup, self.context.clone()).await {
                self.unwind_partial_build().await;
                return Err(WeaveError::BuildFailed {
                    kind: self.name.clone(),
                    cause: Box::new(err),
                });
            }
        }

        self.is_built = true;
        Ok(())
    }

    /// Disposes every child already built and clears this subsystem's own
    /// registry, leaving it back in `Created`. Used when a child or an
    /// `init_callback` fails partway through `build`, after the executor
    /// itself already committed this subsystem's own facets.
    async fn unwind_partial_build(&mut self) {
        for child in &mut self.children {
            if child.is_built {
                Box::pin(child.dispose()).await;
            }
        }
        self.registry.clear(self.context.clone(), self.name.clone()).await;
    }

    /// Dispose children (insertion order), then this subsystem's own registry,
    /// then run `dispose_callbacks` in reverse registration order, best-effort.
    /// Idempotent.
    #[tracing::instrument(level = "info", skip_all, fields(subsystem = %self.name))]
    pub async fn dispose(&mut self) {
        let gate = self.gate.clone();
        let _gate = gate.lock().await;
        if !self.is_built {
            return;
        }
        for child in &mut self.children {
            Box::pin(child.dispose()).await;
        }
        self.registry.clear(self.context.clone(), self.name.clone()).await;
        for callback in self.dispose_callbacks.iter().rev() {
            let lookup = self.registry.lookup_handle();
            if let Err(err) = callback(lookup, self.context.clone()).await {
                tracing::warn!(subsystem = %self.name, error = %err, "dispose callback failed");
            }
        }
        self.is_built = false;
    }

    /// Dispose children and clear the registry, invalidate the cached plan,
    /// and return to `Created` — but keep hooks, default_hooks, context, and
    /// callbacks so a subsequent `build` reconstructs from the same wiring.
    pub async fn reload(&mut self) {
        let gate = self.gate.clone();
        let _gate = gate.lock().await;
        if !self.is_built {
            return;
        }
        for child in &mut self.children {
            Box::pin(child.dispose()).await;
        }
        self.registry.clear(self.context.clone(), self.name.clone()).await;
        self.planner.invalidate();
        self.is_built = false;
    }
}
