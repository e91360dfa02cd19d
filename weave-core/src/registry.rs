//! Per-subsystem store of installed facets: ordered per-kind sequences, override
//! semantics, attach bookkeeping, and the transactional `add_many` used by the executor.
//!
//! Generalized from `r2e-core::beans::BeanRegistry`, whose `TypeId -> single value`
//! store only ever holds one instance per type. Here the key is a runtime `kind`
//! string and each kind holds an ordered sequence of facets (override chains),
//! which the teacher's registry has no equivalent for.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::context::Context;
use crate::error::WeaveError;
use crate::facet::{Facet, FacetView, Lookup, LookupSource};
use crate::transaction::TransactionLog;

/// Options controlling a single [`Registry::add`] call.
pub struct AddOptions {
    pub init: bool,
    pub attach: bool,
    pub context: Context,
    pub subsystem_name: String,
}

pub struct Registry {
    facets: IndexMap<String, Vec<Facet>>,
    /// kind -> id of the facet currently exposed as the subsystem's attached identifier.
    attached: HashMap<String, u64>,
    transaction: TransactionLog,
    /// Monotonic counter handed out as `order_index`, independent of any one
    /// kind's sequence length — keeps `order_index` distinct from `get_by_index`
    /// (which is always a 0-based position within a single kind's `Vec<Facet>`).
    next_order_index: usize,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            facets: IndexMap::new(),
            attached: HashMap::new(),
            transaction: TransactionLog::new(),
            next_order_index: 0,
        }
    }

    fn take_order_index(&mut self) -> usize {
        let index = self.next_order_index;
        self.next_order_index += 1;
        index
    }

    pub fn has(&self, kind: &str) -> bool {
        self.facets.get(kind).is_some_and(|v| !v.is_empty())
    }

    pub fn count(&self, kind: &str) -> usize {
        self.facets.get(kind).map_or(0, |v| v.len())
    }

    pub fn has_multiple(&self, kind: &str) -> bool {
        self.count(kind) > 1
    }

    pub fn all_kinds(&self) -> Vec<String> {
        self.facets
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// The last-wins facet for `kind` (highest `order_index`), or a specific
    /// `order_index` if one is given.
    pub fn find(&self, kind: &str, order_index: Option<usize>) -> Option<&Facet> {
        let facets = self.facets.get(kind)?;
        match order_index {
            None => facets.iter().max_by_key(|f| f.order_index().unwrap_or(0)),
            Some(idx) => facets.iter().find(|f| f.order_index() == Some(idx)),
        }
    }

    /// The facet at position `i` in insertion order (distinct from `order_index`).
    pub fn get_by_index(&self, kind: &str, i: usize) -> Option<&Facet> {
        self.facets.get(kind)?.get(i)
    }

    /// A cheap, cloneable [`Lookup`] snapshotting the registry's current last-wins
    /// facets by kind. Handed to hook factories and lifecycle callbacks.
    pub fn lookup_handle(&self) -> Lookup {
        struct Snapshot(IndexMap<String, FacetView>);
        impl LookupSource for Snapshot {
            fn lookup(&self, kind: &str) -> Option<FacetView> {
                self.0.get(kind).cloned()
            }
        }
        let views = self
            .facets
            .iter()
            .filter_map(|(kind, facets)| {
                facets
                    .iter()
                    .max_by_key(|f| f.order_index().unwrap_or(0))
                    .map(|f| (kind.clone(), f.view()))
            })
            .collect();
        Lookup(std::sync::Arc::new(Snapshot(views)))
    }

    /// Register `facet` under `kind` without running `init`/`attach`. Used both by
    /// [`Registry::add`] and as the first half of each `add_many` level.
    fn register_only(&mut self, kind: &str, facet: Facet) -> Result<(), WeaveError> {
        if facet.kind() != kind {
            return Err(WeaveError::BadFacet {
                reason: format!("facet kind '{}' does not match registration key '{kind}'", facet.kind()),
            });
        }

        let slot = self.facets.entry(kind.to_string()).or_default();

        if let Some(existing) = slot.last() {
            if existing.id() == facet.id() {
                // Same instance already present (carryover) — nothing to do.
                return Ok(());
            }
            if !existing.overwrite() && !facet.overwrite() {
                return Err(WeaveError::DuplicateKind { kind: kind.to_string() });
            }
        }

        self.transaction.track_addition(kind);
        slot.push(facet);
        Ok(())
    }

    pub async fn add(&mut self, kind: &str, mut facet: Facet, opts: AddOptions) -> Result<(), WeaveError> {
        facet.set_order_index(self.take_order_index());
        self.register_only(kind, facet)?;

        if opts.init {
            let lookup = self.lookup_handle();
            let should_attach = opts.attach;
            let args = crate::facet::LifecycleArgs {
                context: opts.context,
                lookup,
                subsystem_name: opts.subsystem_name,
            };
            let slot = self.facets.get_mut(kind).unwrap();
            let facet_ref = slot.last_mut().unwrap();
            if let Err(err) = facet_ref.init(args.clone()).await {
                let mut failed = slot.pop().unwrap();
                if let Err(dispose_err) = failed.dispose(args).await {
                    tracing::warn!(kind = %kind, error = %dispose_err, "dispose failed during add rollback");
                }
                return Err(err);
            }
            if should_attach && self.facets.get(kind).unwrap().last().unwrap().attach() {
                self.attach(kind)?;
            }
        }
        Ok(())
    }

    /// Transactional, level-batched installation used by the executor. `ordered_kinds`
    /// must already be topologically sorted; `required_by_kind` groups kinds into
    /// dependency levels so siblings in the same level can be jointly initialized
    /// (`SPEC_FULL.md` §5).
    ///
    /// Each kind may carry more than one facet (an override chain, already validated
    /// by the planner's hook ordering); those run sequentially within the kind so a
    /// later override sees the earlier one already attached, while different kinds in
    /// the same level still run concurrently via a joint wait.
    pub async fn add_many(
        &mut self,
        ordered_kinds: &[String],
        mut facets_by_kind: IndexMap<String, Vec<Facet>>,
        required_by_kind: &IndexMap<String, Vec<String>>,
        context: Context,
        subsystem_name: String,
    ) -> Result<(), WeaveError> {
        self.transaction.begin();
        let levels = compute_levels(ordered_kinds, required_by_kind);

        // Pre-assign every facet's order_index up front, walking `ordered_kinds` (the
        // topological order) so the result reflects topological position with ties
        // within an override chain broken by insertion order — independent of the
        // concurrency below, which would otherwise make assignment order nondeterministic.
        let mut order_indices: HashMap<String, Vec<usize>> = HashMap::new();
        for kind in ordered_kinds {
            if let Some(seq) = facets_by_kind.get(kind) {
                let idxs = (0..seq.len()).map(|_| self.take_order_index()).collect();
                order_indices.insert(kind.clone(), idxs);
            }
        }

        for level in &levels {
            let lookup = self.lookup_handle();
            let args = crate::facet::LifecycleArgs {
                context: context.clone(),
                lookup,
                subsystem_name: subsystem_name.clone(),
            };

            let sequences: Vec<(String, Vec<usize>, Vec<Facet>)> = level
                .iter()
                .filter_map(|kind| {
                    let idxs = order_indices.remove(kind)?;
                    facets_by_kind.shift_remove(kind).map(|seq| (kind.clone(), idxs, seq))
                })
                .collect();

            let outcomes = futures_util::future::join_all(sequences.into_iter().map(|(kind, idxs, mut sequence)| {
                let args = args.clone();
                async move {
                    let mut done = Vec::with_capacity(sequence.len());
                    let mut error = None;
                    for (offset, mut facet) in sequence.drain(..).enumerate() {
                        facet.set_order_index(idxs[offset]);
                        let result = facet.init(args.clone()).await;
                        let failed = result.is_err();
                        done.push(facet);
                        if let Err(err) = result {
                            error = Some(err);
                        }
                        if failed {
                            break;
                        }
                    }
                    (kind, done, error)
                }
            }))
            .await;

            let mut first_error = None;
            for (kind, facets, error) in outcomes {
                for facet in facets {
                    self.transaction.track_addition(&kind);
                    self.facets.entry(kind.clone()).or_default().push(facet);
                }
                if let Some(err) = error {
                    if first_error.is_none() {
                        first_error = Some((kind, err));
                    }
                }
            }

            if let Some((kind, err)) = first_error {
                self.rollback(context.clone(), subsystem_name.clone()).await;
                return Err(WeaveError::BuildFailed {
                    kind,
                    cause: Box::new(err),
                });
            }

            for kind in level {
                if let Some(facet) = self.facets.get(kind).and_then(|s| s.last()) {
                    if facet.attach() && facet.is_initialized() {
                        self.attach(kind)?;
                    }
                }
            }
        }

        self.transaction.commit()
    }

    /// Best-effort rollback: disposes and removes every facet recorded in the
    /// active transaction frame, newest addition first. Never itself returns an error.
    #[tracing::instrument(level = "debug", skip_all, fields(subsystem = %subsystem_name))]
    async fn rollback(&mut self, context: Context, subsystem_name: String) {
        let Ok(kinds) = self.transaction.rollback() else {
            return;
        };
        tracing::info!(kinds = kinds.len(), "rolling back transaction");
        for kind in kinds {
            let lookup = self.lookup_handle();
            if let Some(slot) = self.facets.get_mut(&kind) {
                if let Some(mut facet) = slot.pop() {
                    let args = crate::facet::LifecycleArgs {
                        context: context.clone(),
                        lookup,
                        subsystem_name: subsystem_name.clone(),
                    };
                    if let Err(err) = facet.dispose(args).await {
                        tracing::warn!(kind = %kind, error = %err, "dispose failed during rollback");
                    }
                    self.attached.remove(&kind);
                }
                if slot.is_empty() {
                    self.facets.shift_remove(&kind);
                }
            }
        }
    }

    pub fn attach(&mut self, kind: &str) -> Result<(), WeaveError> {
        let facet = self
            .find(kind, None)
            .ok_or_else(|| WeaveError::AttachConflict { kind: kind.to_string() })?;
        let id = facet.id();
        let overwrite = facet.overwrite();
        match self.attached.get(kind) {
            Some(&existing_id) if existing_id == id => {}
            Some(_) if overwrite => {
                self.attached.insert(kind.to_string(), id);
            }
            Some(_) => return Err(WeaveError::AttachConflict { kind: kind.to_string() }),
            None => {
                self.attached.insert(kind.to_string(), id);
            }
        }
        Ok(())
    }

    pub fn is_attached(&self, kind: &str) -> bool {
        self.attached.contains_key(kind)
    }

    /// Best-effort dispose of every facet of `kind`, then drop the key.
    pub async fn remove(&mut self, kind: &str, context: Context, subsystem_name: String) {
        if let Some(mut slot) = self.facets.shift_remove(kind) {
            while let Some(mut facet) = slot.pop() {
                let lookup = self.lookup_handle();
                let args = crate::facet::LifecycleArgs {
                    context: context.clone(),
                    lookup,
                    subsystem_name: subsystem_name.clone(),
                };
                if let Err(err) = facet.dispose(args).await {
                    tracing::warn!(kind = %kind, error = %err, "dispose failed during remove");
                }
            }
        }
        self.attached.remove(kind);
    }

    /// Dispose every facet, in insertion order of kinds and, within a kind,
    /// oldest-to-newest — see `DESIGN.md` Open Question OQ-2.
    pub async fn clear(&mut self, context: Context, subsystem_name: String) {
        let kinds: Vec<String> = self.facets.keys().cloned().collect();
        for kind in kinds {
            if let Some(mut slot) = self.facets.shift_remove(&kind) {
                slot.reverse(); // pop() from the end == oldest-to-newest dispose order
                while let Some(mut facet) = slot.pop() {
                    let lookup = self.lookup_handle();
                    let args = crate::facet::LifecycleArgs {
                        context: context.clone(),
                        lookup,
                        subsystem_name: subsystem_name.clone(),
                    };
                    if let Err(err) = facet.dispose(args).await {
                        tracing::warn!(kind = %kind, error = %err, "dispose failed during clear");
                    }
                }
            }
        }
        self.attached.clear();
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupSource for Registry {
    fn lookup(&self, kind: &str) -> Option<FacetView> {
        self.find(kind, None).map(|f| f.view())
    }
}

/// Bucket `ordered_kinds` into dependency levels: a kind's level is one more than
/// the maximum level of any dependency that also appears in `ordered_kinds`
/// (dependencies outside this batch are assumed already satisfied). Kinds within
/// a level keep their relative order from `ordered_kinds`.
fn compute_levels(
    ordered_kinds: &[String],
    required_by_kind: &IndexMap<String, Vec<String>>,
) -> Vec<Vec<String>> {
    let mut level_of: HashMap<String, usize> = HashMap::new();
    let mut levels: Vec<Vec<String>> = Vec::new();

    for kind in ordered_kinds {
        let deps = required_by_kind.get(kind).cloned().unwrap_or_default();
        let level = deps
            .iter()
            .filter_map(|d| level_of.get(d))
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        level_of.insert(kind.clone(), level);
        if levels.len() <= level {
            levels.push(Vec::new());
        }
        levels[level].push(kind.clone());
    }

    levels
}
