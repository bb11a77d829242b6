//! Artifact ordering: the resolver only ever sees an SBOM that is already stored.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ironvuln_engine::{
    ArtifactKind, CveManifest, CveResolver, ImageIdentity, Sbom, ScanOrchestrator, ScanRequest,
    StageSet, ToolError,
};

use crate::helpers::mocks::{RecordingNotifier, ScriptedGenerator, expected_cve};
use crate::helpers::store::RecordingStore;
use crate::helpers::{image, test_config};

/// Resolver that inspects the shared store when it is entered.
#[derive(Clone)]
struct StoreCheckingResolver {
    store: RecordingStore,
    sbom_stored_on_entry: Arc<Mutex<Vec<bool>>>,
}

impl CveResolver for StoreCheckingResolver {
    async fn resolve(
        &self,
        image: &ImageIdentity,
        sbom: &Sbom,
        _deadline: Duration,
    ) -> Result<CveManifest, ToolError> {
        let stored = self.store.peek(image, ArtifactKind::Sbom).await;
        self.sbom_stored_on_entry
            .lock()
            .unwrap()
            .push(stored.as_ref() == Some(sbom.as_bytes()));
        self.store.record("resolve");
        Ok(CveManifest::new(expected_cve(&image.canonical())))
    }
}

#[tokio::test]
async fn test_e2e_sbom_is_stored_before_resolver_runs() {
    let store = RecordingStore::new();
    let resolver = StoreCheckingResolver {
        store: store.clone(),
        sbom_stored_on_entry: Arc::default(),
    };
    let orch = ScanOrchestrator::builder()
        .config(test_config(2))
        .generator(ScriptedGenerator::new())
        .resolver(resolver.clone())
        .store(store.clone())
        .notifier(RecordingNotifier::new())
        .build()
        .unwrap();

    for raw in ["postgres:16", "mysql:8"] {
        let outcome = orch
            .submit(ScanRequest::new(raw, StageSet::SbomAndCve))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert!(outcome.cve.is_some());
        assert!(
            store
                .peek(&image(raw), ArtifactKind::CveManifest)
                .await
                .is_some()
        );
    }

    assert_eq!(*resolver.sbom_stored_on_entry.lock().unwrap(), vec![true, true]);
    assert_eq!(
        store.events(),
        vec![
            "put:sbom", "resolve", "put:cve", "put:sbom", "resolve", "put:cve"
        ]
    );
}
