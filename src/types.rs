use serde::{Deserialize, Serialize};

/// Promoted vocation label as stored on a player row.
///
/// Base vocations are folded into their promoted counterpart when parsed, so
/// only the promoted variants and `None` ever reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vocation {
    EliteKnight,
    MasterSorcerer,
    ElderDruid,
    RoyalPaladin,
    None,
}

impl Vocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vocation::EliteKnight => "Elite Knight",
            Vocation::MasterSorcerer => "Master Sorcerer",
            Vocation::ElderDruid => "Elder Druid",
            Vocation::RoyalPaladin => "Royal Paladin",
            Vocation::None => "None",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Knight" | "Elite Knight" => Vocation::EliteKnight,
            "Sorcerer" | "Master Sorcerer" => Vocation::MasterSorcerer,
            "Druid" | "Elder Druid" => Vocation::ElderDruid,
            "Paladin" | "Royal Paladin" => Vocation::RoyalPaladin,
            _ => Vocation::None,
        }
    }
}

impl std::fmt::Display for Vocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PvP ruleset of a game world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServerKind {
    #[default]
    #[serde(rename = "OpenPVP", alias = "open_pvp")]
    OpenPvp,
    #[serde(rename = "RetroPVP", alias = "retro_pvp")]
    RetroPvp,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::OpenPvp => "OpenPVP",
            ServerKind::RetroPvp => "RetroPVP",
        }
    }
}

/// Outcome class of one task execution in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    Warning,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Warning => "warning",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => RunStatus::Success,
            "warning" => RunStatus::Warning,
            _ => RunStatus::Error,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
