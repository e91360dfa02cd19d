use weave_core::{
    hook, Contract, ContractRegistry, Facet, FacetOptions, HookParams, MemberDescriptor, Subsystem,
    SubsystemOptions, WeaveError,
};

#[tokio::test]
async fn contract_violation_fails_build_before_any_init_runs() {
    let contracts = std::sync::Arc::new(ContractRegistry::new());
    contracts.register(
        Contract::new("database")
            .require_method("query")
            .require_method("close"),
    );

    let init_ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let init_ran2 = init_ran.clone();

    let db_hook = hook(
        HookParams {
            kind: "db".into(),
            source: "test".into(),
            contract: Some("database".into()),
            ..Default::default()
        },
        move |_, _, _| {
            let init_ran = init_ran2.clone();
            async move {
                let mut facet = Facet::new(
                    "db",
                    FacetOptions { contract: Some("database".into()), ..Default::default() },
                )
                .unwrap();
                facet
                    .add([("query".to_string(), MemberDescriptor::method(|_| Ok(serde_json::Value::Null)))])
                    .unwrap();
                facet
                    .on_init(Box::new(move |_| {
                        let init_ran = init_ran.clone();
                        Box::pin(async move {
                            init_ran.store(true, std::sync::atomic::Ordering::SeqCst);
                            Ok(())
                        })
                    }))
                    .unwrap();
                Ok(facet)
            }
        },
    )
    .unwrap();

    let mut sys = Subsystem::new(
        "root",
        SubsystemOptions {
            contracts: Some(contracts),
            ..Default::default()
        },
    );
    sys.use_hook(db_hook).unwrap();

    let err = sys.build(None).await.unwrap_err();
    match err {
        WeaveError::ContractViolation { kind, contract, reasons } => {
            assert_eq!(kind, "db");
            assert_eq!(contract, "database");
            assert!(reasons.iter().any(|r| r.contains("close")));
        }
        other => panic!("expected ContractViolation, got {other}"),
    }
    assert!(!init_ran.load(std::sync::atomic::Ordering::SeqCst));
    assert!(!sys.is_built());
}

#[tokio::test]
async fn unknown_contract_name_is_rejected() {
    let db_hook = hook(
        HookParams {
            kind: "db".into(),
            source: "test".into(),
            contract: Some("nonexistent".into()),
            ..Default::default()
        },
        |_, _, _| async {
            Facet::new(
                "db",
                FacetOptions { contract: Some("nonexistent".into()), ..Default::default() },
            )
        },
    )
    .unwrap();

    let mut sys = Subsystem::new("root", SubsystemOptions::default());
    sys.use_hook(db_hook).unwrap();
    let err = sys.build(None).await.unwrap_err();
    assert!(matches!(err, WeaveError::UnknownContract { .. }));
}
