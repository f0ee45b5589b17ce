use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregate distress classification, ordered from calm to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    Stable,
    MildStress,
    ModerateDistress,
    CriticalDistress,
}

impl EmotionalState {
    pub const ALL: [EmotionalState; 4] = [
        EmotionalState::Stable,
        EmotionalState::MildStress,
        EmotionalState::ModerateDistress,
        EmotionalState::CriticalDistress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalState::Stable => "stable",
            EmotionalState::MildStress => "mild_stress",
            EmotionalState::ModerateDistress => "moderate_distress",
            EmotionalState::CriticalDistress => "critical_distress",
        }
    }

    /// Position in the total order, starting at zero for Stable
    pub fn rank(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionalState::ALL
            .into_iter()
            .find(|state| state.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown emotional state: {}", s))
    }
}

/// Escalation state of one patient
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientRiskState {
    #[default]
    Stable,
    Warning,
    Critical,
    EmergencyDispatched,
    Cooldown,
}

impl PatientRiskState {
    pub const ALL: [PatientRiskState; 5] = [
        PatientRiskState::Stable,
        PatientRiskState::Warning,
        PatientRiskState::Critical,
        PatientRiskState::EmergencyDispatched,
        PatientRiskState::Cooldown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatientRiskState::Stable => "stable",
            PatientRiskState::Warning => "warning",
            PatientRiskState::Critical => "critical",
            PatientRiskState::EmergencyDispatched => "emergency_dispatched",
            PatientRiskState::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for PatientRiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientRiskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatientRiskState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown risk state: {}", s))
    }
}
