#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_habitat::{Habitat, ParameterSet};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Ok(params) = ParameterSet::parse(&raw) else {
        return;
    };
    if let Ok(habitat) = Habitat::from_parameters(&params) {
        let grouped: usize = habitat.groups.iter().map(|group| group.agents.len()).sum();
        assert_eq!(grouped, habitat.agents.len());
        for group in &habitat.groups {
            assert!(!group.id.is_empty());
            assert!(group
                .id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
        }
    }
});
