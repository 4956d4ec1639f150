use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_habitat::{IsolationGroup, IsolationMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// The single process-manager target a group's cycle is allowed to touch.
pub enum RestartPrimitive {
    ServiceUnit { unit: String, user_scope: bool },
    Container { name: String },
}

impl RestartPrimitive {
    pub fn for_group(group: &IsolationGroup, unit_base: &str, user_scope: bool) -> Self {
        let target = group.unit_name(unit_base);
        match group.mode {
            IsolationMode::None | IsolationMode::Session => RestartPrimitive::ServiceUnit {
                unit: format!("{target}.service"),
                user_scope,
            },
            IsolationMode::Container => RestartPrimitive::Container { name: target },
        }
    }

    pub fn target(&self) -> &str {
        match self {
            RestartPrimitive::ServiceUnit { unit, .. } => unit,
            RestartPrimitive::Container { name } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RestartPrimitive::ServiceUnit { .. } => "service_unit",
            RestartPrimitive::Container { .. } => "container",
        }
    }
}

impl fmt::Display for RestartPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.target())
    }
}
