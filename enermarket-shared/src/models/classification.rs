use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {type_name}: {value}")]
pub struct ParseEnumError {
    pub type_name: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(type_name: &'static str, value: &str) -> Self {
        Self {
            type_name,
            value: value.to_string(),
        }
    }
}

/// Generation source of the energy being traded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnergyType {
    Solar,
    Eolic,
    Hydroelectric,
    Geothermal,
}

impl EnergyType {
    pub const ALL: [EnergyType; 4] = [
        EnergyType::Solar,
        EnergyType::Eolic,
        EnergyType::Hydroelectric,
        EnergyType::Geothermal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyType::Solar => "solar",
            EnergyType::Eolic => "eolic",
            EnergyType::Hydroelectric => "hydroelectric",
            EnergyType::Geothermal => "geothermal",
        }
    }
}

impl FromStr for EnergyType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnergyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("energy type", s))
    }
}

impl fmt::Display for EnergyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Electrical submarket of the interconnected grid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Submarket {
    /// Southeast and Center-West
    #[serde(rename = "SE_CO")]
    SoutheastCenterWest,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "NE")]
    Northeast,
    #[serde(rename = "N")]
    North,
}

impl Submarket {
    pub const ALL: [Submarket; 4] = [
        Submarket::SoutheastCenterWest,
        Submarket::South,
        Submarket::Northeast,
        Submarket::North,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Submarket::SoutheastCenterWest => "SE_CO",
            Submarket::South => "S",
            Submarket::Northeast => "NE",
            Submarket::North => "N",
        }
    }
}

impl FromStr for Submarket {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Submarket::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("submarket", s))
    }
}

impl fmt::Display for Submarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a buyer pays for a purchase. Each method settles after a different delay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Instant transfer
    Pix,
    /// Card authorization, settles within minutes
    Card,
    /// Bank slip, settles within days
    Billet,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [PaymentMethod::Pix, PaymentMethod::Card, PaymentMethod::Billet];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::Card => "card",
            PaymentMethod::Billet => "billet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("payment method", s))
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
