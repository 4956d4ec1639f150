//! Locally stored OAuth profiles.
//!
//! A profile is trusted without a network probe when it is present, not
//! revoked, carries a non-empty access token, and has not expired. Multiple
//! profiles for one provider are consulted in key order.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use vigil_core::{has_lapsed, write_text_atomic};
use vigil_habitat::Provider;

const OAUTH_PROFILE_SCHEMA_VERSION: u32 = 1;

fn oauth_profile_schema_version() -> u32 {
    OAUTH_PROFILE_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct OAuthProfileFile {
    #[serde(default = "oauth_profile_schema_version")]
    schema_version: u32,
    #[serde(default)]
    profiles: BTreeMap<String, OAuthProfile>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: Provider,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_unix: Option<u64>,
    #[serde(default)]
    pub revoked: bool,
}

impl std::fmt::Debug for OAuthProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProfile")
            .field("provider", &self.provider)
            .field("access_token", &"[REDACTED]")
            .field("expires_unix", &self.expires_unix)
            .field("revoked", &self.revoked)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthProfileStatus<'a> {
    Usable(&'a OAuthProfile),
    Expired,
    Revoked,
    Empty,
    Absent,
}

impl OAuthProfileStatus<'_> {
    pub fn reason(&self) -> &'static str {
        match self {
            OAuthProfileStatus::Usable(_) => "oauth profile valid",
            OAuthProfileStatus::Expired => "oauth expired",
            OAuthProfileStatus::Revoked => "oauth revoked",
            OAuthProfileStatus::Empty => "oauth token empty",
            OAuthProfileStatus::Absent => "oauth profile absent",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthProfileStore {
    profiles: BTreeMap<String, OAuthProfile>,
}

impl OAuthProfileStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, name: impl Into<String>, profile: OAuthProfile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    pub fn has_profile_for(&self, provider: Provider) -> bool {
        self.profiles
            .values()
            .any(|profile| profile.provider == provider)
    }

    /// Best status across the provider's profiles: a usable profile wins,
    /// otherwise the first profile's failure reason is reported.
    pub fn status_for(&self, provider: Provider, now_unix: u64) -> OAuthProfileStatus<'_> {
        let mut first_failure = None;
        for profile in self
            .profiles
            .values()
            .filter(|profile| profile.provider == provider)
        {
            let status = if profile.revoked {
                OAuthProfileStatus::Revoked
            } else if profile.access_token.trim().is_empty() {
                OAuthProfileStatus::Empty
            } else if has_lapsed(profile.expires_unix, now_unix) {
                OAuthProfileStatus::Expired
            } else {
                return OAuthProfileStatus::Usable(profile);
            };
            first_failure.get_or_insert(status);
        }
        first_failure.unwrap_or(OAuthProfileStatus::Absent)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

pub fn load_oauth_profiles(path: &Path) -> Result<OAuthProfileStore> {
    if !path.exists() {
        return Ok(OAuthProfileStore::empty());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read oauth profiles {}", path.display()))?;
    let parsed = serde_json::from_str::<OAuthProfileFile>(&raw)
        .with_context(|| format!("failed to parse oauth profiles {}", path.display()))?;
    if parsed.schema_version != OAUTH_PROFILE_SCHEMA_VERSION {
        bail!(
            "unsupported oauth profile schema_version {} in {} (expected {})",
            parsed.schema_version,
            path.display(),
            OAUTH_PROFILE_SCHEMA_VERSION
        );
    }
    Ok(OAuthProfileStore {
        profiles: parsed.profiles,
    })
}

pub fn save_oauth_profiles(path: &Path, store: &OAuthProfileStore) -> Result<()> {
    let file = OAuthProfileFile {
        schema_version: OAUTH_PROFILE_SCHEMA_VERSION,
        profiles: store.profiles.clone(),
    };
    let payload =
        serde_json::to_string_pretty(&file).context("failed to serialize oauth profiles")?;
    write_text_atomic(path, &payload)
        .with_context(|| format!("failed to persist oauth profiles {}", path.display()))
}
