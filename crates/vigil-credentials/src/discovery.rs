use tracing::{debug, info};
use vigil_core::now_unix;
use vigil_diagnostics::{DiagnosticCategory, DiagnosticsLedger};
use vigil_habitat::{ChannelPolicy, IsolationGroup, Platform, Provider, ProviderKeys};

use crate::auth::{credential_fingerprint, ProviderAuthMethod};
use crate::oauth_profiles::{OAuthProfileStatus, OAuthProfileStore};
use crate::validators::{PlatformValidator, ProbeOutcome, ProviderValidator};

/// Ledger identity of the record that closes each discovery pass.
pub const SELECTION_IDENTITY: &str = "selection";

#[derive(Clone, PartialEq, Eq)]
/// One `(agent, platform, credential)` tuple to probe. The credential may be empty.
pub struct ChannelCandidate {
    pub agent_id: String,
    pub platform: Platform,
    pub credential: String,
}

impl ChannelCandidate {
    pub fn identity(&self) -> String {
        format!("{}/{}", self.platform, self.agent_id)
    }
}

impl std::fmt::Debug for ChannelCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCandidate")
            .field("agent_id", &self.agent_id)
            .field("platform", &self.platform)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ChannelCredential {
    pub agent_id: String,
    pub platform: Platform,
    pub credential: String,
}

impl std::fmt::Debug for ChannelCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCredential")
            .field("agent_id", &self.agent_id)
            .field("platform", &self.platform)
            .field("credential", &credential_fingerprint(&self.credential))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    pub provider: Provider,
    pub credential: String,
    pub auth_method: ProviderAuthMethod,
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("provider", &self.provider)
            .field("credential", &credential_fingerprint(&self.credential))
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Orders channel candidates platform-major, then agent declaration order.
pub fn build_channel_candidates(
    group: &IsolationGroup,
    policy: &ChannelPolicy,
    preferred: Option<Platform>,
) -> Vec<ChannelCandidate> {
    let mut candidates = Vec::new();
    for platform in policy.search_order(preferred) {
        for agent in &group.agents {
            candidates.push(ChannelCandidate {
                agent_id: agent.id.clone(),
                platform,
                credential: agent.credential_for(platform).unwrap_or_default().to_string(),
            });
        }
    }
    candidates
}

/// `[preferred, remaining providers in fallback order]` for `group`.
pub fn build_provider_candidates(group: &IsolationGroup) -> Vec<Provider> {
    Provider::discovery_order(group.preferred_provider())
}

/// Ordered first-working-credential search over injected validators.
pub struct CredentialDiscovery<'a> {
    platforms: &'a dyn PlatformValidator,
    providers: &'a dyn ProviderValidator,
    oauth_profiles: &'a OAuthProfileStore,
    now_unix: u64,
}

impl<'a> CredentialDiscovery<'a> {
    pub fn new(
        platforms: &'a dyn PlatformValidator,
        providers: &'a dyn ProviderValidator,
        oauth_profiles: &'a OAuthProfileStore,
    ) -> Self {
        Self {
            platforms,
            providers,
            oauth_profiles,
            now_unix: now_unix(),
        }
    }

    pub fn with_now_unix(mut self, now_unix: u64) -> Self {
        self.now_unix = now_unix;
        self
    }

    /// Probes candidates strictly in order and stops at the first valid one.
    ///
    /// Returns `None` when nothing authenticates; every attempt plus a closing
    /// selection record lands in `ledger` either way.
    pub fn find_working_channel_credential(
        &self,
        group: &IsolationGroup,
        policy: &ChannelPolicy,
        preferred: Option<Platform>,
        ledger: &mut DiagnosticsLedger,
    ) -> Option<ChannelCredential> {
        for candidate in build_channel_candidates(group, policy, preferred) {
            let identity = candidate.identity();
            if candidate.credential.is_empty() {
                ledger.fail(DiagnosticCategory::Platform, &identity, "missing");
                continue;
            }
            debug!(
                group = %group.id,
                candidate = %identity,
                fingerprint = %credential_fingerprint(&candidate.credential),
                "probing channel credential"
            );
            match self
                .platforms
                .validate_token(candidate.platform, &candidate.credential)
            {
                ProbeOutcome::Valid => {
                    ledger.pass(DiagnosticCategory::Platform, &identity, "token valid");
                    ledger.pass(DiagnosticCategory::Platform, SELECTION_IDENTITY, &identity);
                    info!(group = %group.id, selected = %identity, "working channel credential found");
                    return Some(ChannelCredential {
                        agent_id: candidate.agent_id,
                        platform: candidate.platform,
                        credential: candidate.credential,
                    });
                }
                ProbeOutcome::Invalid { reason } => {
                    ledger.fail(DiagnosticCategory::Platform, &identity, &reason);
                }
            }
        }
        ledger.fail(
            DiagnosticCategory::Platform,
            SELECTION_IDENTITY,
            "no working channel credential",
        );
        info!(group = %group.id, "no working channel credential");
        None
    }

    /// A usable OAuth profile outranks the same provider's API key and is
    /// returned without a probe. Empty keys are recorded as `missing`.
    pub fn find_working_provider_credential(
        &self,
        group: &IsolationGroup,
        keys: &ProviderKeys,
        ledger: &mut DiagnosticsLedger,
    ) -> Option<ProviderCredential> {
        for provider in build_provider_candidates(group) {
            let oauth_identity = format!("{provider}/oauth");
            match self.oauth_profiles.status_for(provider, self.now_unix) {
                OAuthProfileStatus::Usable(profile) => {
                    ledger.pass(
                        DiagnosticCategory::Provider,
                        &oauth_identity,
                        OAuthProfileStatus::Usable(profile).reason(),
                    );
                    ledger.pass(DiagnosticCategory::Provider, SELECTION_IDENTITY, &oauth_identity);
                    info!(group = %group.id, %provider, "using oauth profile");
                    return Some(ProviderCredential {
                        provider,
                        credential: profile.access_token.trim().to_string(),
                        auth_method: ProviderAuthMethod::OauthToken,
                    });
                }
                OAuthProfileStatus::Absent => {}
                failed => {
                    ledger.fail(DiagnosticCategory::Provider, &oauth_identity, failed.reason());
                }
            }

            let Some(key) = keys.key_for(provider) else {
                ledger.fail(DiagnosticCategory::Provider, provider.as_str(), "missing");
                continue;
            };
            debug!(
                group = %group.id,
                %provider,
                fingerprint = %credential_fingerprint(key),
                "probing provider key"
            );
            match self.providers.validate_key(provider, key) {
                ProbeOutcome::Valid => {
                    ledger.pass(DiagnosticCategory::Provider, provider.as_str(), "key valid");
                    ledger.pass(DiagnosticCategory::Provider, SELECTION_IDENTITY, provider.as_str());
                    info!(group = %group.id, %provider, "working provider key found");
                    return Some(ProviderCredential {
                        provider,
                        credential: key.to_string(),
                        auth_method: ProviderAuthMethod::ApiKey,
                    });
                }
                ProbeOutcome::Invalid { reason } => {
                    ledger.fail(DiagnosticCategory::Provider, provider.as_str(), &reason);
                }
            }
        }
        ledger.fail(
            DiagnosticCategory::Provider,
            SELECTION_IDENTITY,
            "no working provider credential",
        );
        info!(group = %group.id, "no working provider credential");
        None
    }
}
