use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SimError, SimResult};
use crate::types::{CommuteMode, EducationLevel};

pub const DEFAULT_INCOME: f64 = 30_000.0;
pub const DEFAULT_RENT: f64 = 1_200.0;
pub const DEFAULT_COMMUTE_DISTANCE: f64 = 10.0;
pub const DEFAULT_HOUSEHOLD_SIZE: u32 = 2;
pub const DEFAULT_ENERGY_USE: f64 = 100.0;
pub const DEFAULT_SECTOR: &str = "Retail";
pub const DEFAULT_LABEL: &str = "Unknown";

// ── Alias table ──────────────────────────────────────────────────────────────
// Candidates are tried in order; matching is case-insensitive with spaces and
// hyphens treated as underscores.

pub const INCOME_ALIASES: &[&str] = &["income", "annual_income", "household_income"];
pub const RENT_ALIASES: &[&str] = &["rent", "monthly_rent"];
pub const EMPLOYED_ALIASES: &[&str] = &["employed", "is_employed", "employment_status"];
pub const COMMUTE_MODE_ALIASES: &[&str] = &["commute_mode", "commute", "transport_mode"];
pub const COMMUTE_DISTANCE_ALIASES: &[&str] = &["commute_distance", "commute_miles"];
pub const VEHICLE_ALIASES: &[&str] = &[
    "vehicle_own",
    "vehicle_ownership",
    "vehic_own",
    "vehicleownership",
    "own_vehicle",
    "car_ownership",
    "has_vehicle",
    "owns_car",
];
pub const EDUCATION_ALIASES: &[&str] = &["education_level", "education"];
pub const SECTOR_ALIASES: &[&str] = &["employment_sector", "sector", "industry"];
pub const HOUSEHOLD_SIZE_ALIASES: &[&str] = &["household_size", "hh_size"];
pub const RACE_ALIASES: &[&str] = &["race_ethnicity", "race", "ethnicity"];
pub const COUNTY_ALIASES: &[&str] = &["county"];
pub const RENT_PAID_ALIASES: &[&str] = &["rent_paid"];
pub const ENERGY_USE_ALIASES: &[&str] = &["energy_use", "energy_kwh"];

/// One person after alias resolution and defaulting. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Currency per year.
    pub income: f64,
    /// Currency per month.
    pub rent: f64,
    pub employed: bool,
    pub commute_mode: CommuteMode,
    /// Miles per day.
    pub commute_distance: f64,
    /// `None` when the input carries no ownership information for this person.
    pub vehicle_owned: Option<bool>,
    pub education_level: EducationLevel,
    pub employment_sector: String,
    pub household_size: u32,
    pub race_ethnicity: String,
    pub county: String,
    /// Currency per month; defaults to `rent`.
    pub rent_paid: f64,
    /// kWh per month.
    pub energy_use: f64,
}

impl Default for PersonRecord {
    fn default() -> Self {
        Self {
            income: DEFAULT_INCOME,
            rent: DEFAULT_RENT,
            employed: true,
            commute_mode: CommuteMode::Drive,
            commute_distance: DEFAULT_COMMUTE_DISTANCE,
            vehicle_owned: None,
            education_level: EducationLevel::HighSchool,
            employment_sector: DEFAULT_SECTOR.to_string(),
            household_size: DEFAULT_HOUSEHOLD_SIZE,
            race_ethnicity: DEFAULT_LABEL.to_string(),
            county: DEFAULT_LABEL.to_string(),
            rent_paid: DEFAULT_RENT,
            energy_use: DEFAULT_ENERGY_USE,
        }
    }
}

/// One input row with normalised column names.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    fields: Vec<(String, Value)>,
}

fn normalise_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

impl RawRecord {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self { fields: map.into_iter().map(|(k, v)| (normalise_key(&k), v)).collect() }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self { fields: pairs.into_iter().map(|(k, v)| (normalise_key(k), v)).collect() }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First candidate column holding a non-empty value.
    pub fn first_present(&self, candidates: &[&str]) -> Option<&Value> {
        candidates.iter().filter_map(|c| self.get(c)).find(|v| !is_blank(v))
    }

    /// First non-empty candidate rendered as text.
    pub fn first_text(&self, candidates: &[&str]) -> Option<String> {
        self.first_present(candidates).map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
    }

    /// First candidate parsing as a non-zero number. Zero is treated as missing.
    pub fn first_number(&self, candidates: &[&str]) -> Option<f64> {
        candidates
            .iter()
            .filter_map(|c| self.get(c))
            .filter_map(as_number)
            .find(|x| *x != 0.0)
    }

    pub fn first_bool(&self, candidates: &[&str]) -> Option<bool> {
        self.first_present(candidates).and_then(as_bool)
    }

    /// Resolve into a canonical record, applying per-field defaults.
    pub fn resolve(&self) -> PersonRecord {
        let d = PersonRecord::default();
        let rent = self.first_number(RENT_ALIASES).unwrap_or(d.rent);
        PersonRecord {
            income: self.first_number(INCOME_ALIASES).unwrap_or(d.income),
            rent,
            // Only an explicit negative marks someone unemployed.
            employed: self.first_bool(EMPLOYED_ALIASES).unwrap_or(true),
            commute_mode: self
                .first_text(COMMUTE_MODE_ALIASES)
                .map(|s| CommuteMode::parse(&s))
                .unwrap_or_default(),
            commute_distance: self
                .first_number(COMMUTE_DISTANCE_ALIASES)
                .unwrap_or(d.commute_distance),
            vehicle_owned: self.first_bool(VEHICLE_ALIASES),
            education_level: self
                .first_text(EDUCATION_ALIASES)
                .map(|s| EducationLevel::parse(&s))
                .unwrap_or_default(),
            employment_sector: self.first_text(SECTOR_ALIASES).unwrap_or(d.employment_sector),
            household_size: self
                .first_number(HOUSEHOLD_SIZE_ALIASES)
                .filter(|x| *x > 0.0)
                .map(|x| x.round() as u32)
                .unwrap_or(d.household_size),
            race_ethnicity: self.first_text(RACE_ALIASES).unwrap_or(d.race_ethnicity),
            county: self.first_text(COUNTY_ALIASES).unwrap_or(d.county),
            rent_paid: self.first_number(RENT_PAID_ALIASES).unwrap_or(rent),
            energy_use: self.first_number(ENERGY_USE_ALIASES).unwrap_or(d.energy_use),
        }
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace([',', '$'], "").parse().ok(),
        _ => None,
    };
    // "NaN" and "inf" parse as f64 but are not usable values.
    x.filter(|x| x.is_finite())
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "1" | "true" => Some(true),
            "no" | "n" | "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve raw rows; fails with `EmptyPopulation` when there are none.
pub fn resolve_all(rows: &[RawRecord]) -> SimResult<Vec<PersonRecord>> {
    if rows.is_empty() {
        return Err(SimError::EmptyPopulation);
    }
    Ok(rows.iter().map(RawRecord::resolve).collect())
}

/// Parse either a JSON array of row objects or newline-delimited JSON objects.
pub fn parse_rows(text: &str) -> SimResult<Vec<RawRecord>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed)?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, v)| row_from_value(i + 1, v))
            .collect();
    }
    let mut rows = Vec::new();
    for (line_no, line) in BufReader::new(text.as_bytes()).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|e| SimError::MalformedInput {
            line: line_no + 1,
            reason: e.to_string(),
        })?;
        rows.push(row_from_value(line_no + 1, value)?);
    }
    Ok(rows)
}

fn row_from_value(line: usize, value: Value) -> SimResult<RawRecord> {
    match value {
        Value::Object(map) => Ok(RawRecord::from_map(map)),
        other => Err(SimError::MalformedInput {
            line,
            reason: format!("expected an object, found {other}"),
        }),
    }
}

/// Load and resolve a population file (JSON array or NDJSON).
pub fn load(path: impl AsRef<Path>) -> SimResult<Vec<PersonRecord>> {
    let mut text = String::new();
    File::open(path.as_ref())?.read_to_string(&mut text)?;
    let rows = parse_rows(&text)?;
    log::info!("loaded {} rows from {}", rows.len(), path.as_ref().display());
    resolve_all(&rows)
}
