//! Raw serde shapes of the phase, gate and ticket-limit documents.

use std::collections::BTreeMap;

use serde::Deserialize;

/// `phases.toml` (path whitelist).
///
/// ```toml
/// [[phase]]
/// id = "plan"
/// patterns = ["PLAN.md"]
/// auto_advance = true
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PhasesDoc {
    #[serde(rename = "phase", default)]
    pub phases: Vec<PhaseDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PhaseDoc {
    pub id: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Deliberately required: whether a phase auto-advances is never inferred.
    pub auto_advance: bool,
}

/// `gates.toml`: phase id -> gates in evaluation order.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GatesDoc {
    #[serde(default)]
    pub gates: BTreeMap<String, Vec<GateDoc>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum GateDoc {
    Exists {
        name: Option<String>,
        path: String,
    },
    Contains {
        name: Option<String>,
        path: String,
        pattern: String,
        #[serde(default)]
        regex: bool,
    },
    Count {
        name: Option<String>,
        path: String,
        pattern: Option<String>,
        min: u32,
        label: Option<String>,
    },
    Command {
        name: Option<String>,
        command: String,
        #[serde(default)]
        args: Vec<String>,
        timeout_secs: Option<u64>,
    },
}

/// `ticket_limits.toml`.
///
/// ```toml
/// default = 3
/// [limits]
/// build = 1
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TicketLimitsDoc {
    pub default: Option<u32>,
    #[serde(default)]
    pub limits: BTreeMap<String, u32>,
}
