//! Contracts: named method/property requirements a facet can be checked against.
//!
//! Grounded on `r2e-core::config::validation::{validate_keys, validate_section}` —
//! the "collect every failing reason, then report them together" shape, reused here
//! for [`crate::error::WeaveError::ContractViolation`].

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, RwLock};

use indexmap::IndexMap;

use crate::error::WeaveError;
use crate::facet::FacetView;

pub type Predicate = Arc<dyn Fn(&FacetView) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct Contract {
    pub name: String,
    pub required_methods: HashSet<String>,
    pub required_properties: HashSet<String>,
    pub custom_predicate: Option<Predicate>,
}

impl Contract {
    pub fn new(name: impl Into<String>) -> Self {
        Contract {
            name: name.into(),
            required_methods: HashSet::new(),
            required_properties: HashSet::new(),
            custom_predicate: None,
        }
    }

    pub fn require_method(mut self, name: impl Into<String>) -> Self {
        self.required_methods.insert(name.into());
        self
    }

    pub fn require_property(mut self, name: impl Into<String>) -> Self {
        self.required_properties.insert(name.into());
        self
    }

    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&FacetView) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.custom_predicate = Some(Arc::new(predicate));
        self
    }

    /// Validate `facet` against this contract, aggregating every failure reason
    /// rather than stopping at the first.
    pub fn validate(&self, facet: &FacetView) -> Result<(), WeaveError> {
        let mut reasons = Vec::new();

        let mut missing_methods: Vec<&String> = self
            .required_methods
            .iter()
            .filter(|m| !facet.has_method(m))
            .collect();
        missing_methods.sort();
        reasons.extend(missing_methods.into_iter().map(|m| format!("missing method: {m}")));

        let mut missing_props: Vec<&String> = self
            .required_properties
            .iter()
            .filter(|p| !facet.has_property(p))
            .collect();
        missing_props.sort();
        reasons.extend(missing_props.into_iter().map(|p| format!("missing property: {p}")));

        if let Some(predicate) = &self.custom_predicate {
            if let Err(reason) = predicate(facet) {
                reasons.push(reason);
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(WeaveError::ContractViolation {
                kind: facet.kind.clone(),
                contract: self.name.clone(),
                reasons,
            })
        }
    }
}

/// Named store of contracts, keyed by name, insertion-ordered.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: RwLock<IndexMap<String, Contract>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, contract: Contract) {
        self.contracts.write().unwrap().insert(contract.name.clone(), contract);
    }

    pub fn lookup(&self, name: &str) -> Option<Contract> {
        self.contracts.read().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Contract> {
        self.contracts.write().unwrap().shift_remove(name)
    }

    /// Validate `facet` against the contract it declares, if any. A facet with no
    /// declared contract always passes.
    pub fn validate_facet(&self, facet: &FacetView) -> Result<(), WeaveError> {
        let Some(contract_name) = &facet.contract else {
            return Ok(());
        };
        let contract = self
            .lookup(contract_name)
            .ok_or_else(|| WeaveError::UnknownContract {
                contract: contract_name.clone(),
            })?;
        contract.validate(facet)
    }
}

static DEFAULT_REGISTRY: OnceLock<ContractRegistry> = OnceLock::new();

/// The process-wide default contract registry, lazily initialized on first use
/// (mirroring the module-level singleton pattern the teacher uses for shared config).
pub fn default_registry() -> &'static ContractRegistry {
    DEFAULT_REGISTRY.get_or_init(ContractRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::{Facet, FacetOptions, MemberDescriptor};
    use serde_json::Value;

    fn facet_with_methods(kind: &str, methods: &[&str], contract: Option<&str>) -> FacetView {
        let mut facet = Facet::new(
            kind,
            FacetOptions {
                contract: contract.map(String::from),
                ..Default::default()
            },
        )
        .unwrap();
        for m in methods {
            facet
                .add([(m.to_string(), MemberDescriptor::method(|_| Ok(Value::Null)))])
                .unwrap();
        }
        facet.view()
    }

    #[test]
    fn validate_passes_when_all_methods_present() {
        let contract = Contract::new("database").require_method("query").require_method("close");
        let facet = facet_with_methods("db", &["query", "close"], Some("database"));
        assert!(contract.validate(&facet).is_ok());
    }

    #[test]
    fn validate_lists_every_missing_method() {
        let contract = Contract::new("database").require_method("query").require_method("close");
        let facet = facet_with_methods("db", &["query"], Some("database"));
        let err = contract.validate(&facet).unwrap_err();
        match err {
            WeaveError::ContractViolation { reasons, .. } => {
                assert_eq!(reasons, vec!["missing method: close"]);
            }
            other => panic!("expected ContractViolation, got {other}"),
        }
    }

    #[test]
    fn registry_lookup_unknown_contract_fails() {
        let registry = ContractRegistry::new();
        let facet = facet_with_methods("db", &[], Some("missing"));
        let err = registry.validate_facet(&facet).unwrap_err();
        assert!(matches!(err, WeaveError::UnknownContract { .. }));
    }

    #[test]
    fn registry_validates_against_registered_contract() {
        let registry = ContractRegistry::new();
        registry.register(Contract::new("database").require_method("query"));
        let ok_facet = facet_with_methods("db", &["query"], Some("database"));
        assert!(registry.validate_facet(&ok_facet).is_ok());
    }

    #[test]
    fn facet_without_contract_always_passes() {
        let registry = ContractRegistry::new();
        let facet = facet_with_methods("db", &[], None);
        assert!(registry.validate_facet(&facet).is_ok());
    }

    #[test]
    fn custom_predicate_failure_is_aggregated() {
        let contract = Contract::new("checked").with_predicate(|_f| Err("custom check failed".into()));
        let facet = facet_with_methods("x", &[], Some("checked"));
        let err = contract.validate(&facet).unwrap_err();
        match err {
            WeaveError::ContractViolation { reasons, .. } => {
                assert_eq!(reasons, vec!["custom check failed"]);
            }
            other => panic!("expected ContractViolation, got {other}"),
        }
    }
}
