//! The pure verify phase: orders hooks, runs their factories against a temporary
//! lookup view, validates contracts, and produces a topologically sorted [`Plan`]
//! with no side effects on the real registry.

use std::sync::{Arc, RwLock};

use indexmap::{IndexMap, IndexSet};

use crate::cache::{sort_with_cache, GraphCache};
use crate::context::Context;
use crate::contract::ContractRegistry;
use crate::error::WeaveError;
use crate::facet::{Facet, FacetView, Lookup, LookupSource};
use crate::graph::{build_edges, topo_sort};
use crate::hook::HookDescriptor;

/// The verify phase's output: everything the executor needs, with no facet yet
/// registered in the real registry.
///
/// `facets_by_kind` maps each kind to its produced facets in hook-execution order
/// (more than one entry means an override chain) — a deliberate generalization of
/// `SPEC_FULL.md` §4.3's "mapping kind -> facet", since this registry supports
/// multiple instances per kind where the teacher's `BeanRegistry` only ever holds one.
#[derive(Debug)]
pub struct Plan {
    pub resolved_ctx: Context,
    pub ordered_kinds: Vec<String>,
    pub facets_by_kind: IndexMap<String, Vec<Facet>>,
    pub required_by_kind: IndexMap<String, Vec<String>>,
}

/// Owns the graph-result cache across `verify` calls on the same subsystem.
///
/// Plan results themselves are not cached: a facet's `init_callback` is an
/// `FnOnce` consumed on first run (mirrors `r2e-core::beans::Factory`, which is
/// likewise consumed by `resolve(self)`), so a previous verify's facets cannot be
/// replayed into a second build. Only the (comparatively expensive) topological
/// sort is worth memoizing — see `DESIGN.md`.
pub struct Planner {
    cache: GraphCache,
}

impl Planner {
    pub fn new() -> Self {
        Planner { cache: GraphCache::default() }
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Planner { cache: GraphCache::new(capacity) }
    }

    pub fn invalidate(&mut self) {
        self.cache = GraphCache::default();
    }

    #[tracing::instrument(level = "debug", skip_all, fields(subsystem = %subsystem_name, hooks = hooks.len()))]
    pub async fn verify(
        &mut self,
        hooks: &[HookDescriptor],
        base_ctx: &Context,
        extra_ctx: Option<&Context>,
        contracts: &ContractRegistry,
        subsystem_name: &str,
    ) -> Result<Plan, WeaveError> {
        let resolved_ctx = match extra_ctx {
            Some(extra) => base_ctx.merge(extra),
            None => base_ctx.clone(),
        };

        let order = order_hooks(hooks)?;

        let shared_view: Arc<RwLock<IndexMap<String, FacetView>>> =
            Arc::new(RwLock::new(IndexMap::new()));
        let lookup = Lookup(Arc::new(TempLookup(shared_view.clone())));

        let mut facets_by_kind: IndexMap<String, Vec<Facet>> = IndexMap::new();
        let mut required_by_kind: IndexMap<String, Vec<String>> = IndexMap::new();

        for idx in order {
            let descriptor = &hooks[idx];
            let facet = descriptor
                .produce(resolved_ctx.clone(), lookup.clone(), subsystem_name.to_string())
                .await?;

            contracts.validate_facet(&facet.view())?;

            shared_view
                .write()
                .unwrap()
                .insert(facet.kind().to_string(), facet.view());

            let kind = facet.kind().to_string();
            let deps = required_by_kind.entry(kind.clone()).or_default();
            for dep in &descriptor.required {
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }
            for dep in facet.required() {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }

            facets_by_kind.entry(kind).or_default().push(facet);
        }

        let nodes: IndexSet<String> = facets_by_kind.keys().cloned().collect();
        let edges = build_edges(&nodes, &required_by_kind)?;
        let kinds_for_key: Vec<String> = nodes.iter().cloned().collect();
        let ordered_kinds = sort_with_cache(&mut self.cache, &kinds_for_key, || {
            topo_sort(&nodes, &edges)
        })?;

        Ok(Plan {
            resolved_ctx,
            ordered_kinds,
            facets_by_kind,
            required_by_kind,
        })
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

struct TempLookup(Arc<RwLock<IndexMap<String, FacetView>>>);

impl LookupSource for TempLookup {
    fn lookup(&self, kind: &str) -> Option<FacetView> {
        self.0.read().unwrap().get(kind).cloned()
    }
}

/// Hook-level ordering (`SPEC_FULL.md` §4.5): override chains run in registration
/// order, and a hook that requires kind `D` runs after the *last* hook producing `D`.
fn order_hooks(hooks: &[HookDescriptor]) -> Result<Vec<usize>, WeaveError> {
    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (i, h) in hooks.iter().enumerate() {
        groups.entry(h.kind.clone()).or_default().push(i);
    }

    for (kind, indices) in &groups {
        for pair in indices.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            if !hooks[prev].overwrite && !hooks[curr].overwrite {
                return Err(WeaveError::DuplicateKind { kind: kind.clone() });
            }
        }
    }

    let nodes: IndexSet<String> = (0..hooks.len()).map(|i| i.to_string()).collect();
    let mut edges: Vec<(String, String)> = Vec::new();

    for indices in groups.values() {
        for pair in indices.windows(2) {
            edges.push((pair[0].to_string(), pair[1].to_string()));
        }
    }

    for (i, h) in hooks.iter().enumerate() {
        for dep_kind in &h.required {
            let Some(dep_indices) = groups.get(dep_kind) else {
                return Err(WeaveError::MissingDependency {
                    kind: h.kind.clone(),
                    dependency: dep_kind.clone(),
                });
            };
            let last = *dep_indices.last().unwrap();
            if last != i {
                edges.push((last.to_string(), i.to_string()));
            }
        }
    }

    let order = topo_sort(&nodes, &edges)?;
    Ok(order.into_iter().map(|s| s.parse().unwrap()).collect())
}
