use std::fmt;

use serde::{Deserialize, Serialize};

/// How a person gets to work. Free-form labels from the input are normalised
/// to lowercase with `_` separators; anything unrecognised is kept verbatim in
/// `Other` and treated as driving-equivalent for emissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommuteMode {
    #[default]
    Drive,
    Car,
    Transit,
    PublicTransit,
    Bike,
    Walk,
    Ev,
    Other(String),
}

impl CommuteMode {
    pub fn parse(raw: &str) -> Self {
        let norm: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match norm.as_str() {
            "drive" => CommuteMode::Drive,
            "car" => CommuteMode::Car,
            "transit" => CommuteMode::Transit,
            "public_transit" => CommuteMode::PublicTransit,
            "bike" => CommuteMode::Bike,
            "walk" => CommuteMode::Walk,
            "ev" => CommuteMode::Ev,
            _ => CommuteMode::Other(norm),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CommuteMode::Drive => "drive",
            CommuteMode::Car => "car",
            CommuteMode::Transit => "transit",
            CommuteMode::PublicTransit => "public_transit",
            CommuteMode::Bike => "bike",
            CommuteMode::Walk => "walk",
            CommuteMode::Ev => "ev",
            CommuteMode::Other(s) => s,
        }
    }

    /// Combustion-vehicle commuters: the only ones eligible for the transit
    /// and EV switches.
    pub fn is_driving(&self) -> bool {
        matches!(self, CommuteMode::Drive | CommuteMode::Car)
    }
}

/// Highest completed education. Only the first three rungs take part in the
/// education-subsidy promotion ladder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EducationLevel {
    #[default]
    HighSchool,
    SomeCollege,
    Bachelor,
    Other(String),
}

impl EducationLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high school" | "high_school" => EducationLevel::HighSchool,
            "some college" | "some_college" => EducationLevel::SomeCollege,
            "bachelor" | "bachelors" | "bachelor's" => EducationLevel::Bachelor,
            _ => EducationLevel::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EducationLevel::HighSchool => "High School",
            EducationLevel::SomeCollege => "Some College",
            EducationLevel::Bachelor => "Bachelor",
            EducationLevel::Other(s) => s,
        }
    }
}

/// Fixed income brackets; lower bound inclusive, upper bound exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IncomeBracket {
    Under25k,
    From25kTo50k,
    From50kTo75k,
    From75kTo100k,
    Over100k,
}

impl IncomeBracket {
    pub const ALL: [IncomeBracket; 5] = [
        IncomeBracket::Under25k,
        IncomeBracket::From25kTo50k,
        IncomeBracket::From50kTo75k,
        IncomeBracket::From75kTo100k,
        IncomeBracket::Over100k,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IncomeBracket::Under25k => "Under $25k",
            IncomeBracket::From25kTo50k => "$25k-$50k",
            IncomeBracket::From50kTo75k => "$50k-$75k",
            IncomeBracket::From75kTo100k => "$75k-$100k",
            IncomeBracket::Over100k => "Over $100k",
        }
    }
}

impl fmt::Display for IncomeBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dimensions along which equity impact is broken down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Race,
    County,
    IncomeBracket,
    Sector,
}

impl GroupKind {
    pub const ALL: [GroupKind; 4] =
        [GroupKind::Race, GroupKind::County, GroupKind::IncomeBracket, GroupKind::Sector];
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GroupKind::Race => "race",
            GroupKind::County => "county",
            GroupKind::IncomeBracket => "income bracket",
            GroupKind::Sector => "sector",
        };
        f.write_str(s)
    }
}
