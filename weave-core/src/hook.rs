//! Hook descriptors: validated metadata plus the factory that produces a facet.

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::WeaveError;
use crate::facet::{BoxFuture, Facet, Lookup};
use crate::version::Version;

type Factory = Arc<
    dyn Fn(Context, Lookup, String) -> BoxFuture<Result<Facet, WeaveError>> + Send + Sync,
>;

/// The raw fields a caller supplies to [`hook`]; mirrors the fields carried
/// through onto the facets hooks usually produce (see [`crate::facet::FacetOptions`]).
#[derive(Default, Clone)]
pub struct HookParams {
    pub kind: String,
    pub version: Option<Version>,
    pub required: Vec<String>,
    pub attach: bool,
    pub overwrite: bool,
    pub source: String,
    pub contract: Option<String>,
}

/// An immutable, validated capability provider: metadata plus a reusable factory.
///
/// A hook's factory is called once per `build`/`reload` cycle — it must be `Fn`,
/// not `FnOnce`, since hooks persist across reloads (`SPEC_FULL.md` §4.10).
#[derive(Clone)]
pub struct HookDescriptor {
    pub kind: String,
    pub version: Version,
    pub required: Vec<String>,
    pub attach: bool,
    pub overwrite: bool,
    pub source: String,
    pub contract: Option<String>,
    factory: Factory,
}

impl std::fmt::Debug for HookDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDescriptor")
            .field("kind", &self.kind)
            .field("version", &self.version)
            .field("required", &self.required)
            .field("attach", &self.attach)
            .field("overwrite", &self.overwrite)
            .field("source", &self.source)
            .field("contract", &self.contract)
            .finish()
    }
}

impl HookDescriptor {
    pub async fn produce(
        &self,
        ctx: Context,
        lookup: Lookup,
        subsystem_name: String,
    ) -> Result<Facet, WeaveError> {
        let facet = (self.factory)(ctx, lookup, subsystem_name).await?;
        if facet.kind() != self.kind {
            return Err(WeaveError::BadFacet {
                reason: format!(
                    "hook '{}' factory returned a facet of kind '{}'",
                    self.kind,
                    facet.kind()
                ),
            });
        }
        Ok(facet)
    }
}

/// Construct a validated [`HookDescriptor`].
///
/// `factory` receives the resolved build context, a [`Lookup`] view over
/// already-produced sibling facets, and the owning subsystem's name, and must
/// resolve to a [`Facet`] whose `kind` matches `params.kind`.
pub fn hook<F, Fut>(params: HookParams, factory: F) -> Result<HookDescriptor, WeaveError>
where
    F: Fn(Context, Lookup, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Facet, WeaveError>> + Send + 'static,
{
    if params.kind.trim().is_empty() {
        return Err(WeaveError::BadHook {
            reason: "kind must not be empty".into(),
        });
    }
    if params.source.trim().is_empty() {
        return Err(WeaveError::BadHook {
            reason: format!("hook '{}' must declare a source", params.kind),
        });
    }

    Ok(HookDescriptor {
        kind: params.kind,
        version: params.version.unwrap_or_default(),
        required: params.required,
        attach: params.attach,
        overwrite: params.overwrite,
        source: params.source,
        contract: params.contract,
        factory: Arc::new(move |ctx, lookup, name| Box::pin(factory(ctx, lookup, name))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::FacetOptions;

    fn params(kind: &str) -> HookParams {
        HookParams {
            kind: kind.into(),
            source: "test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_kind() {
        let err = hook(params(""), |_, _, _| async { unreachable!() }).unwrap_err();
        assert!(matches!(err, WeaveError::BadHook { .. }));
    }

    #[test]
    fn rejects_missing_source() {
        let mut p = params("a");
        p.source = String::new();
        let err = hook(p, |_, _, _| async { unreachable!() }).unwrap_err();
        assert!(matches!(err, WeaveError::BadHook { .. }));
    }

    #[tokio::test]
    async fn produce_checks_kind_matches() {
        let h = hook(params("a"), |_, _, _| async {
            Facet::new("b", FacetOptions::default())
        })
        .unwrap();
        let err = h
            .produce(Context::new(), Lookup::empty(), "root".into())
            .await
            .unwrap_err();
        assert!(matches!(err, WeaveError::BadFacet { .. }));
    }

    #[tokio::test]
    async fn produce_succeeds_on_matching_kind() {
        let h = hook(params("a"), |_, _, _| async {
            Facet::new("a", FacetOptions::default())
        })
        .unwrap();
        let facet = h
            .produce(Context::new(), Lookup::empty(), "root".into())
            .await
            .unwrap();
        assert_eq!(facet.kind(), "a");
    }
}
