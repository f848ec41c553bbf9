//! Privacy controller: mode machine gating every cloud call.
//!
//! The process starts 100% local. Cloud access is granted per provider, per
//! session, either by `auto_confirm` (pre-consented non-interactive contexts)
//! or by a registered approval callback. No callback + no auto-confirm means
//! DENY. Every request and decision lands in the session log.

use crate::shared::CloudProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::{info, warn};

/// Privacy operation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyMode {
    /// 100% local, no internet. Invariant: `enabled_providers` is empty.
    Local,
    /// Local plus explicitly approved cloud providers.
    Hybrid,
    /// Cloud-forward operation (all providers pre-enabled).
    Cloud,
}

impl PrivacyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyMode::Local => "local",
            PrivacyMode::Hybrid => "hybrid",
            PrivacyMode::Cloud => "cloud",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => PrivacyMode::Hybrid,
            "cloud" => PrivacyMode::Cloud,
            _ => PrivacyMode::Local,
        }
    }
}

/// One session-log line: a request or decision with its reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub provider: Option<CloudProvider>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Snapshot of the current privacy state for the API surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyStatus {
    pub mode: PrivacyMode,
    pub local_only: bool,
    pub cloud_enabled: bool,
    pub enabled_providers: Vec<CloudProvider>,
    pub session_requests: usize,
    pub last_cloud_request: Option<DateTime<Utc>>,
}

/// Pluggable approval decision: given (provider, reason), approve or deny.
pub type ApprovalCallback = Box<dyn Fn(CloudProvider, &str) -> bool + Send + Sync>;

struct PrivacyState {
    mode: PrivacyMode,
    enabled: HashSet<CloudProvider>,
    log: Vec<SessionLogEntry>,
}

/// The gatekeeper. Readers see a consistent snapshot; mode changes are atomic
/// under the inner lock.
pub struct PrivacyController {
    state: RwLock<PrivacyState>,
    auto_confirm: bool,
    approval: RwLock<Option<ApprovalCallback>>,
}

impl PrivacyController {
    pub fn new(default_mode: PrivacyMode, auto_confirm: bool) -> Self {
        let enabled = if default_mode == PrivacyMode::Cloud {
            CloudProvider::ALL.into_iter().collect()
        } else {
            HashSet::new()
        };
        info!("privacy controller initialized in {} mode", default_mode.as_str());
        Self {
            state: RwLock::new(PrivacyState { mode: default_mode, enabled, log: Vec::new() }),
            auto_confirm,
            approval: RwLock::new(None),
        }
    }

    /// Strict local controller: deny everything unless explicitly approved.
    pub fn local() -> Self {
        Self::new(PrivacyMode::Local, false)
    }

    /// Registers the approval callback consulted when `auto_confirm` is off.
    pub fn set_approval_callback(&self, cb: ApprovalCallback) {
        if let Ok(mut slot) = self.approval.write() {
            *slot = Some(cb);
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.state.read().map(|s| s.mode == PrivacyMode::Local).unwrap_or(true)
    }

    pub fn is_cloud_enabled(&self) -> bool {
        self.state.read().map(|s| !s.enabled.is_empty()).unwrap_or(false)
    }

    /// True iff `provider` has been approved in this session. The caller is
    /// still responsible for checking the backend's own `available()`.
    pub fn can_use(&self, provider: CloudProvider) -> bool {
        self.state.read().map(|s| s.enabled.contains(&provider)).unwrap_or(false)
    }

    /// Requests cloud access for one provider. Approval path:
    /// `auto_confirm` → grant; registered callback → its decision; neither →
    /// deny. Both the request and the decision are logged.
    pub fn request_cloud_access(&self, provider: CloudProvider, reason: &str) -> bool {
        if self.can_use(provider) {
            return true;
        }

        let approved = if self.auto_confirm {
            true
        } else {
            let cb = self.approval.read().ok();
            match cb.as_ref().and_then(|g| g.as_ref()) {
                Some(cb) => cb(provider, reason),
                None => {
                    warn!(
                        "cloud access requested for {} ({}) with no approver; denying",
                        provider, reason
                    );
                    false
                }
            }
        };

        if let Ok(mut state) = self.state.write() {
            state.log.push(SessionLogEntry {
                timestamp: Utc::now(),
                action: if approved { "enable_provider".into() } else { "deny_provider".into() },
                provider: Some(provider),
                reason: Some(reason.to_string()),
            });
            if approved {
                state.enabled.insert(provider);
                if state.mode == PrivacyMode::Local {
                    state.mode = PrivacyMode::Hybrid;
                }
                info!("{} enabled | {}", provider, reason);
            }
        }
        approved
    }

    /// Disables one provider. Dropping the last enabled provider returns the
    /// controller to LOCAL mode.
    pub fn disable_provider(&self, provider: CloudProvider) {
        if let Ok(mut state) = self.state.write() {
            state.enabled.remove(&provider);
            state.log.push(SessionLogEntry {
                timestamp: Utc::now(),
                action: "disable_provider".into(),
                provider: Some(provider),
                reason: None,
            });
            if state.enabled.is_empty() && state.mode != PrivacyMode::Local {
                state.mode = PrivacyMode::Local;
                info!("all cloud providers disabled; returned to LOCAL mode");
            }
        }
    }

    /// Disables every cloud provider and returns to LOCAL mode.
    pub fn disable_all_cloud(&self) {
        if let Ok(mut state) = self.state.write() {
            state.enabled.clear();
            state.mode = PrivacyMode::Local;
            state.log.push(SessionLogEntry {
                timestamp: Utc::now(),
                action: "disable_all_cloud".into(),
                provider: None,
                reason: None,
            });
            info!("all cloud providers disabled; LOCAL mode active");
        }
    }

    pub fn mode(&self) -> PrivacyMode {
        self.state.read().map(|s| s.mode).unwrap_or(PrivacyMode::Local)
    }

    pub fn session_log(&self) -> Vec<SessionLogEntry> {
        self.state.read().map(|s| s.log.clone()).unwrap_or_default()
    }

    pub fn status(&self) -> PrivacyStatus {
        let state = match self.state.read() {
            Ok(s) => s,
            Err(_) => {
                return PrivacyStatus {
                    mode: PrivacyMode::Local,
                    local_only: true,
                    cloud_enabled: false,
                    enabled_providers: Vec::new(),
                    session_requests: 0,
                    last_cloud_request: None,
                }
            }
        };
        let mut providers: Vec<CloudProvider> = state.enabled.iter().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        PrivacyStatus {
            mode: state.mode,
            local_only: state.mode == PrivacyMode::Local,
            cloud_enabled: !state.enabled.is_empty(),
            enabled_providers: providers,
            session_requests: state.log.len(),
            last_cloud_request: state
                .log
                .iter()
                .rev()
                .find(|e| e.provider.is_some())
                .map(|e| e.timestamp),
        }
    }

    /// Human-readable session summary for status surfaces.
    pub fn session_summary(&self) -> String {
        let status = self.status();
        let mut lines = vec![
            "=== Privacy Session Summary ===".to_string(),
            format!("Current Mode: {}", status.mode.as_str().to_uppercase()),
            format!("Local Only: {}", if status.local_only { "Yes" } else { "No" }),
            format!("Cloud Enabled: {}", if status.cloud_enabled { "Yes" } else { "No" }),
        ];
        if !status.enabled_providers.is_empty() {
            let names: Vec<&str> = status.enabled_providers.iter().map(|p| p.as_str()).collect();
            lines.push(format!("Active Providers: {}", names.join(", ")));
        }
        lines.push(format!("Session Requests: {}", status.session_requests));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_deny_without_approver() {
        let privacy = PrivacyController::local();
        assert!(!privacy.request_cloud_access(CloudProvider::Claude, "test"));
        assert_eq!(privacy.mode(), PrivacyMode::Local);
        assert!(!privacy.can_use(CloudProvider::Claude));
        // The denied request is still logged.
        assert_eq!(privacy.session_log().len(), 1);
    }

    #[test]
    fn auto_confirm_moves_to_hybrid() {
        let privacy = PrivacyController::new(PrivacyMode::Local, true);
        assert!(privacy.request_cloud_access(CloudProvider::Groq, "consensus"));
        assert_eq!(privacy.mode(), PrivacyMode::Hybrid);
        assert!(privacy.can_use(CloudProvider::Groq));
        assert!(!privacy.can_use(CloudProvider::OpenAi));
    }

    #[test]
    fn disabling_last_provider_returns_to_local() {
        let privacy = PrivacyController::new(PrivacyMode::Local, true);
        privacy.request_cloud_access(CloudProvider::Claude, "r");
        privacy.request_cloud_access(CloudProvider::Gemini, "r");
        privacy.disable_provider(CloudProvider::Claude);
        assert_eq!(privacy.mode(), PrivacyMode::Hybrid);
        privacy.disable_provider(CloudProvider::Gemini);
        assert_eq!(privacy.mode(), PrivacyMode::Local);
    }

    #[test]
    fn callback_approval_is_consulted() {
        let privacy = PrivacyController::local();
        privacy.set_approval_callback(Box::new(|p, _| p == CloudProvider::Claude));
        assert!(privacy.request_cloud_access(CloudProvider::Claude, "ok"));
        assert!(!privacy.request_cloud_access(CloudProvider::OpenAi, "no"));
    }

    #[test]
    fn approval_caches_within_session() {
        let privacy = PrivacyController::new(PrivacyMode::Local, true);
        assert!(privacy.request_cloud_access(CloudProvider::Claude, "first"));
        let log_len = privacy.session_log().len();
        // Second request short-circuits without a new log entry.
        assert!(privacy.request_cloud_access(CloudProvider::Claude, "second"));
        assert_eq!(privacy.session_log().len(), log_len);
    }

    #[test]
    fn cloud_mode_pre_enables_all() {
        let privacy = PrivacyController::new(PrivacyMode::Cloud, false);
        for p in CloudProvider::ALL {
            assert!(privacy.can_use(p));
        }
        privacy.disable_all_cloud();
        assert_eq!(privacy.mode(), PrivacyMode::Local);
        assert!(!privacy.is_cloud_enabled());
    }
}
