use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vigil_habitat::Provider;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_OAUTH_BETA: &str = "oauth-2025-04-20";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// How a selected provider credential authenticates.
pub enum ProviderAuthMethod {
    ApiKey,
    OauthToken,
}

impl ProviderAuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderAuthMethod::ApiKey => "api_key",
            ProviderAuthMethod::OauthToken => "oauth_token",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Shape of a raw provider credential, judged by its prefix alone.
pub enum CredentialKind {
    ApiKey,
    OauthToken,
    Unknown,
}

pub fn classify_provider_credential(provider: Provider, credential: &str) -> CredentialKind {
    let value = credential.trim();
    if value.is_empty() {
        return CredentialKind::Unknown;
    }
    match provider {
        Provider::Anthropic => {
            if value.starts_with("sk-ant-oat") {
                CredentialKind::OauthToken
            } else if value.starts_with("sk-ant-") {
                CredentialKind::ApiKey
            } else {
                CredentialKind::Unknown
            }
        }
        Provider::OpenAi => {
            if value.starts_with("sk-") {
                CredentialKind::ApiKey
            } else if value.starts_with("eyJ") && value.matches('.').count() == 2 {
                CredentialKind::OauthToken
            } else {
                CredentialKind::Unknown
            }
        }
        Provider::Google => {
            if value.starts_with("ya29.") {
                CredentialKind::OauthToken
            } else if value.starts_with("AIza") {
                CredentialKind::ApiKey
            } else {
                CredentialKind::Unknown
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    NativeKeyHeader,
}

#[derive(Clone, PartialEq, Eq)]
/// Headers needed to authenticate one provider request.
pub struct AuthSpec {
    pub scheme: AuthScheme,
    pub header_name: &'static str,
    pub header_value: String,
    pub extra_headers: Vec<(&'static str, &'static str)>,
}

impl std::fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSpec")
            .field("scheme", &self.scheme)
            .field("header_name", &self.header_name)
            .field("header_value", &"[REDACTED]")
            .field("extra_headers", &self.extra_headers)
            .finish()
    }
}

/// Pure header selection. Unknown or malformed values fall back to the
/// provider's native key header instead of failing.
pub fn auth_header_for(provider: Provider, credential: &str) -> AuthSpec {
    let value = credential.trim();
    let kind = classify_provider_credential(provider, value);
    let bearer = |extra_headers: Vec<(&'static str, &'static str)>| AuthSpec {
        scheme: AuthScheme::Bearer,
        header_name: "authorization",
        header_value: format!("Bearer {value}"),
        extra_headers,
    };
    match (provider, kind) {
        (Provider::Anthropic, CredentialKind::OauthToken) => bearer(vec![
            ("anthropic-version", ANTHROPIC_VERSION),
            ("anthropic-beta", ANTHROPIC_OAUTH_BETA),
        ]),
        (Provider::Anthropic, _) => AuthSpec {
            scheme: AuthScheme::NativeKeyHeader,
            header_name: "x-api-key",
            header_value: value.to_string(),
            extra_headers: vec![("anthropic-version", ANTHROPIC_VERSION)],
        },
        (Provider::OpenAi, _) => bearer(Vec::new()),
        (Provider::Google, CredentialKind::OauthToken) => bearer(Vec::new()),
        (Provider::Google, _) => AuthSpec {
            scheme: AuthScheme::NativeKeyHeader,
            header_name: "x-goog-api-key",
            header_value: value.to_string(),
            extra_headers: Vec::new(),
        },
    }
}

/// Stable, non-reversible label for a secret, safe for logs and reports.
pub fn credential_fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.trim().as_bytes());
    let hex: String = digest
        .iter()
        .take(6)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    format!("sha256:{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_classify_uses_provider_specific_prefixes() {
        assert_eq!(
            classify_provider_credential(Provider::Anthropic, "sk-ant-oat01-abc"),
            CredentialKind::OauthToken
        );
        assert_eq!(
            classify_provider_credential(Provider::Anthropic, "sk-ant-api03-abc"),
            CredentialKind::ApiKey
        );
        assert_eq!(
            classify_provider_credential(Provider::OpenAi, "sk-proj-abc"),
            CredentialKind::ApiKey
        );
        assert_eq!(
            classify_provider_credential(Provider::OpenAi, "eyJhbGci.eyJzdWIi.c2ln"),
            CredentialKind::OauthToken
        );
        assert_eq!(
            classify_provider_credential(Provider::Google, "ya29.a0Af"),
            CredentialKind::OauthToken
        );
        assert_eq!(
            classify_provider_credential(Provider::Google, "AIzaSyD"),
            CredentialKind::ApiKey
        );
        assert_eq!(
            classify_provider_credential(Provider::Google, "garbage"),
            CredentialKind::Unknown
        );
        assert_eq!(
            classify_provider_credential(Provider::OpenAi, "   "),
            CredentialKind::Unknown
        );
    }

    #[test]
    fn unit_anthropic_oauth_routes_to_bearer_with_beta_header() {
        let spec = auth_header_for(Provider::Anthropic, "sk-ant-oat01-abc");
        assert_eq!(spec.scheme, AuthScheme::Bearer);
        assert_eq!(spec.header_name, "authorization");
        assert_eq!(spec.header_value, "Bearer sk-ant-oat01-abc");
        assert!(spec
            .extra_headers
            .contains(&("anthropic-beta", ANTHROPIC_OAUTH_BETA)));
    }

    #[test]
    fn unit_unknown_values_default_to_native_key_header() {
        let anthropic = auth_header_for(Provider::Anthropic, " not-a-known-shape ");
        assert_eq!(anthropic.scheme, AuthScheme::NativeKeyHeader);
        assert_eq!(anthropic.header_name, "x-api-key");
        assert_eq!(anthropic.header_value, "not-a-known-shape");

        let google = auth_header_for(Provider::Google, "opaque");
        assert_eq!(google.header_name, "x-goog-api-key");

        let openai = auth_header_for(Provider::OpenAi, "opaque");
        assert_eq!(openai.header_value, "Bearer opaque");
    }

    #[test]
    fn regression_auth_spec_debug_redacts_secret() {
        let rendered = format!("{:?}", auth_header_for(Provider::OpenAi, "sk-secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn unit_fingerprint_is_stable_and_short() {
        let first = credential_fingerprint("tg-token");
        assert_eq!(first, credential_fingerprint(" tg-token "));
        assert_ne!(first, credential_fingerprint("other"));
        assert_eq!(first.len(), "sha256:".len() + 12);
    }
}
