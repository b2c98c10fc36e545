use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Continent {
    NorthAmerica,
    SouthAmerica,
    Europe,
    Asia,
    Africa,
    Oceania,
}

impl Continent {
    pub fn is_americas(&self) -> bool {
        matches!(self, Continent::NorthAmerica | Continent::SouthAmerica)
    }
}

impl Display for Continent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Continent::NorthAmerica => "North America",
            Continent::SouthAmerica => "South America",
            Continent::Europe => "Europe",
            Continent::Asia => "Asia",
            Continent::Africa => "Africa",
            Continent::Oceania => "Oceania",
        };
        write!(f, "{name}")
    }
}

/// Reference data for one country of origin.
///
/// `fips` is the FIPS 10-4 code used by GDELT's `ActionGeo_CountryCode`, which is what
/// the nationality crosswalk resolves to. `latitude`/`longitude` is a representative
/// point used for border distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryInfo {
    /// Title-cased name, matching the nationality labels of the encounter sheets.
    pub name: String,
    pub fips: String,
    pub iso_a3: String,
    pub continent: Continent,
    pub latitude: f64,
    pub longitude: f64,
}

impl CountryInfo {
    pub fn new(
        name: &str,
        fips: &str,
        iso_a3: &str,
        continent: Continent,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            fips: fips.to_string(),
            iso_a3: iso_a3.to_string(),
            continent,
            latitude,
            longitude,
        }
    }
}
