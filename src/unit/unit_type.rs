use std::{fmt, str::FromStr};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Kind of polygon a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    State,      // Region of interest (e.g. California)
    County,     // Unit of analysis, keyed by COUNTYFP
    Msa,        // Unit of analysis, keyed by CBSAFP
}

impl UnitType {
    pub fn to_str(&self) -> &'static str {
        match self {
            UnitType::State => "state",
            UnitType::County => "county",
            UnitType::Msa => "msa",
        }
    }

    /// Name used in export file names (`County_NDUI_2013`, `MSA_NDUI_2013`).
    pub fn label(&self) -> &'static str {
        match self {
            UnitType::State => "State",
            UnitType::County => "County",
            UnitType::Msa => "MSA",
        }
    }

    /// Identifier attribute of Census cartographic boundary files.
    pub fn key_field(&self) -> &'static str {
        match self {
            UnitType::State => "STATEFP",
            UnitType::County => "COUNTYFP",
            UnitType::Msa => "CBSAFP",
        }
    }

    /// Units of analysis aggregated by a default run.
    pub fn analysis_units() -> [UnitType; 2] {
        [UnitType::County, UnitType::Msa]
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UnitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "state" => Ok(UnitType::State),
            "county" | "counties" => Ok(UnitType::County),
            "msa" | "cbsa" | "msas" => Ok(UnitType::Msa),
            _ => bail!("unknown unit type: {s:?} (expected state, county or msa)"),
        }
    }
}
