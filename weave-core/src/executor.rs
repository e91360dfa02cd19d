//! The transactional build (execute) phase: turns a [`Plan`] into side effects on
//! a real [`Registry`].
//!
//! Grounded on `r2e-core::beans::BeanRegistry::construct_beans_in_order`, which
//! drives a topologically sorted bean list through construction while the
//! registry accumulates state. Here the planner has already done the pure work
//! (producing facets and the order); the executor's only job is to hand the plan
//! to the registry's transaction and surface the resolved context.

use crate::context::Context;
use crate::error::WeaveError;
use crate::planner::Plan;
use crate::registry::Registry;

/// Install every facet named by `plan` into `registry`, running `init` (and, for
/// facets marked `attach`, attaching) in dependency order with level-local joint
/// waits. On success returns the plan's resolved context, which the caller
/// (the owning subsystem) assigns as its own.
///
/// `registry` is expected to already be empty of the kinds `plan` names: a
/// subsystem only reaches `build` from `Created`, and `reload` clears the
/// registry first, so there is no "overwrite an existing instance" case to
/// partition out here — see `DESIGN.md` (Open Question OQ-3) for why the
/// to_add/to_overwrite split described for the source design collapses to a
/// single path in this ownership model.
pub async fn execute(
    registry: &mut Registry,
    plan: Plan,
    subsystem_name: String,
) -> Result<Context, WeaveError> {
    let resolved_ctx = plan.resolved_ctx.clone();
    registry
        .add_many(
            &plan.ordered_kinds,
            plan.facets_by_kind,
            &plan.required_by_kind,
            resolved_ctx.clone(),
            subsystem_name,
        )
        .await?;
    Ok(resolved_ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractRegistry;
    use crate::facet::{Facet, FacetOptions};
    use crate::hook::{hook, HookParams};
    use crate::planner::Planner;

    fn simple_hook(kind: &str, required: &[&str]) -> crate::hook::HookDescriptor {
        let k = kind.to_string();
        hook(
            HookParams {
                kind: kind.into(),
                required: required.iter().map(|s| s.to_string()).collect(),
                source: "test".into(),
                ..Default::default()
            },
            move |_, _, _| {
                let k = k.clone();
                async move { Facet::new(k, FacetOptions::default()) }
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn execute_installs_every_planned_kind() {
        let hooks = vec![simple_hook("a", &[]), simple_hook("b", &["a"])];
        let mut planner = Planner::new();
        let plan = planner
            .verify(&hooks, &Context::new(), None, &ContractRegistry::new(), "root")
            .await
            .unwrap();

        let mut registry = Registry::new();
        execute(&mut registry, plan, "root".into()).await.unwrap();

        assert!(registry.find("a", None).unwrap().is_initialized());
        assert!(registry.find("b", None).unwrap().is_initialized());
    }

    #[tokio::test]
    async fn execute_rolls_back_when_a_facet_fails_to_init() {
        let failing = hook(
            HookParams { kind: "bad".into(), source: "test".into(), ..Default::default() },
            |_, _, _| async {
                let mut facet = Facet::new("bad", FacetOptions::default()).unwrap();
                facet
                    .on_init(Box::new(|_| {
                        Box::pin(async { Err(WeaveError::BadFacet { reason: "boom".into() }) })
                    }))
                    .unwrap();
                Ok(facet)
            },
        )
        .unwrap();
        let hooks = vec![simple_hook("a", &[]), failing];
        let mut planner = Planner::new();
        let plan = planner
            .verify(&hooks, &Context::new(), None, &ContractRegistry::new(), "root")
            .await
            .unwrap();

        let mut registry = Registry::new();
        let err = execute(&mut registry, plan, "root".into()).await.unwrap_err();
        assert!(matches!(err, WeaveError::BuildFailed { .. }));
        assert!(registry.all_kinds().is_empty());
    }
}
