#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_credentials::ProviderAuthMethod;
use vigil_habitat::{Platform, Provider};
use vigil_recovery::validate_safe_mode_config;

const GATEWAY_PORT: u16 = 18789;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    for platform in [Platform::Telegram, Platform::Discord] {
        for auth_method in [ProviderAuthMethod::ApiKey, ProviderAuthMethod::OauthToken] {
            if let Ok(document) = validate_safe_mode_config(
                &raw,
                platform,
                Provider::Anthropic,
                auth_method,
                GATEWAY_PORT,
            ) {
                assert!(document.is_object());
                let agents = document
                    .pointer("/agents/list")
                    .and_then(|value| value.as_array())
                    .expect("validated agents.list");
                assert_eq!(agents.len(), 1);
                assert_eq!(
                    document.pointer("/gateway/port").and_then(|value| value.as_u64()),
                    Some(u64::from(GATEWAY_PORT))
                );
            }
        }
    }
});
