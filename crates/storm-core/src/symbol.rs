//! Symbol definitions for the Infinity Storm grid

use serde::{Deserialize, Serialize};

/// Symbol classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// High-paying character symbol
    HighPay,
    /// Low-paying gem symbol
    LowPay,
    /// Scatter - counted globally, triggers free spins
    Scatter,
}

/// The closed symbol set
///
/// Every cell of every grid holds exactly one of these. The discriminant
/// order is stable and doubles as the canonical byte code for hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Symbol {
    TimeGem = 0,
    SpaceGem = 1,
    MindGem = 2,
    PowerGem = 3,
    RealityGem = 4,
    SoulGem = 5,
    ThanosWeapon = 6,
    ScarletWitch = 7,
    Thanos = 8,
    InfinityGlove = 9,
}

impl Symbol {
    /// All symbols in canonical order
    pub const ALL: [Symbol; 10] = [
        Symbol::TimeGem,
        Symbol::SpaceGem,
        Symbol::MindGem,
        Symbol::PowerGem,
        Symbol::RealityGem,
        Symbol::SoulGem,
        Symbol::ThanosWeapon,
        Symbol::ScarletWitch,
        Symbol::Thanos,
        Symbol::InfinityGlove,
    ];

    /// Canonical byte code (stable across releases; feeds validation hashes)
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Symbol from its canonical byte code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Wire identifier (snake_case, matches the JSON representation)
    pub fn name(self) -> &'static str {
        match self {
            Symbol::TimeGem => "time_gem",
            Symbol::SpaceGem => "space_gem",
            Symbol::MindGem => "mind_gem",
            Symbol::PowerGem => "power_gem",
            Symbol::RealityGem => "reality_gem",
            Symbol::SoulGem => "soul_gem",
            Symbol::ThanosWeapon => "thanos_weapon",
            Symbol::ScarletWitch => "scarlet_witch",
            Symbol::Thanos => "thanos",
            Symbol::InfinityGlove => "infinity_glove",
        }
    }

    /// Classification of this symbol
    pub fn kind(self) -> SymbolKind {
        match self {
            Symbol::Thanos | Symbol::ScarletWitch | Symbol::ThanosWeapon => SymbolKind::HighPay,
            Symbol::InfinityGlove => SymbolKind::Scatter,
            _ => SymbolKind::LowPay,
        }
    }

    /// Scatter symbols never participate in cluster matching
    pub fn is_scatter(self) -> bool {
        self == Symbol::InfinityGlove
    }

    /// High-pay character symbol?
    pub fn is_high_pay(self) -> bool {
        self.kind() == SymbolKind::HighPay
    }
}
