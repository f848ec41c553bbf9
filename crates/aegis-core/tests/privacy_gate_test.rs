//! Integration test: the privacy gate.
//!
//! With mode LOCAL and no approvals, only the local backend is ever invoked,
//! the session log stays empty, and enabling/disabling providers walks the
//! LOCAL -> HYBRID -> LOCAL mode machine.

mod common;

use aegis_core::{
    CloudProvider, GenerateOptions, ModelClient, ModelKind, Orchestrator, PrivacyController,
    PrivacyMode,
};
use common::ScriptedClient;
use std::sync::Arc;

fn orchestrator(
    local: Arc<ScriptedClient>,
    cloud: Vec<(CloudProvider, Arc<ScriptedClient>)>,
    privacy: Arc<PrivacyController>,
) -> Orchestrator {
    let cloud = cloud
        .into_iter()
        .map(|(p, c)| (p, c as Arc<dyn ModelClient>))
        .collect();
    Orchestrator::new(local as Arc<dyn ModelClient>, cloud, privacy, None)
}

#[tokio::test]
async fn local_mode_never_touches_cloud() {
    let local = ScriptedClient::local("Hello from the local model.");
    let claude = ScriptedClient::cloud("claude", "cloud answer");
    let privacy = Arc::new(PrivacyController::local());

    let orch = orchestrator(
        Arc::clone(&local),
        vec![(CloudProvider::Claude, Arc::clone(&claude))],
        Arc::clone(&privacy),
    );

    let outcome = orch
        .generate("Hello", &[], &GenerateOptions::default())
        .await
        .expect("local backend should answer");

    assert_eq!(outcome.text, "Hello from the local model.");
    assert_eq!(local.call_count(), 1);
    assert_eq!(claude.call_count(), 0, "cloud backend must not be invoked in LOCAL mode");
    assert!(privacy.session_log().is_empty());
}

#[tokio::test]
async fn approved_provider_joins_fallback_after_local_failure() {
    let local = ScriptedClient::failing("local", ModelKind::Local);
    let claude = ScriptedClient::cloud("claude", "cloud answer");
    let privacy = Arc::new(PrivacyController::new(PrivacyMode::Local, true));
    privacy.request_cloud_access(CloudProvider::Claude, "fallback");

    let orch = orchestrator(
        Arc::clone(&local),
        vec![(CloudProvider::Claude, Arc::clone(&claude))],
        Arc::clone(&privacy),
    );

    let opts = GenerateOptions { consensus: false, ..GenerateOptions::default() };
    let outcome = orch.generate("Hello", &[], &opts).await.expect("cloud should answer");
    assert_eq!(outcome.text, "cloud answer");
    assert_eq!(local.call_count(), 1);
    assert_eq!(claude.call_count(), 1);
    assert_eq!(outcome.models_used, vec!["claude".to_string()]);
}

#[tokio::test]
async fn disabling_provider_restores_local_only() {
    let privacy = Arc::new(PrivacyController::new(PrivacyMode::Local, true));
    assert!(privacy.request_cloud_access(CloudProvider::Groq, "test"));
    assert_eq!(privacy.mode(), PrivacyMode::Hybrid);

    privacy.disable_provider(CloudProvider::Groq);
    assert_eq!(privacy.mode(), PrivacyMode::Local);
    assert!(!privacy.can_use(CloudProvider::Groq));
}

#[tokio::test]
async fn force_cloud_skips_local() {
    let local = ScriptedClient::local("local answer");
    let groq = ScriptedClient::cloud("groq", "fast cloud answer");
    let privacy = Arc::new(PrivacyController::new(PrivacyMode::Local, true));
    privacy.request_cloud_access(CloudProvider::Groq, "forced");

    let orch = orchestrator(
        Arc::clone(&local),
        vec![(CloudProvider::Groq, Arc::clone(&groq))],
        privacy,
    );

    let opts = GenerateOptions { force_cloud: true, consensus: false, ..GenerateOptions::default() };
    let outcome = orch.generate("question", &[], &opts).await.unwrap();
    assert_eq!(outcome.text, "fast cloud answer");
    assert_eq!(local.call_count(), 0);
}

#[tokio::test]
async fn no_backends_returns_none() {
    let local = ScriptedClient::unavailable("local", ModelKind::Local);
    let privacy = Arc::new(PrivacyController::local());
    let orch = orchestrator(local, vec![], privacy);
    assert!(orch.generate("anyone there?", &[], &GenerateOptions::default()).await.is_none());
    assert!(!orch.any_backend_available());
}
