use crate::types::country::CountryInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ISO-A3 codes of island states and territories in the Americas.
pub const AMERICAN_ISLANDS: [&str; 30] = [
    "ATG", "AIA", "BES", "BHS", "BMU", "BRB", "CUB", "CUW", "CYM", "DMA", "DOM", "FLK", "GRD",
    "GRL", "GLP", "HTI", "JAM", "KNA", "LCA", "MAF", "MSR", "MTQ", "PRI", "SGS", "SXM", "TCA",
    "TTO", "VCT", "VGB", "VIR",
];

/// Countries that reach the border overland regardless of the other rules.
pub const ALWAYS_CONNECTED: [&str; 3] = ["USA", "MEX", "CAN"];

/// Heuristic for whether migrants from a country can reach the US–Mexico border by land.
///
/// A country qualifies when it is in North or South America and its ISO-A3 code is not in
/// the island exception list. Codes in `always_connected` qualify unconditionally. The
/// exception list is an approximation and is meant to be edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandRouteRule {
    pub island_exceptions: BTreeSet<String>,
    pub always_connected: BTreeSet<String>,
}

impl Default for LandRouteRule {
    fn default() -> Self {
        Self {
            island_exceptions: AMERICAN_ISLANDS.iter().map(|c| c.to_string()).collect(),
            always_connected: ALWAYS_CONNECTED.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl LandRouteRule {
    pub fn with_exception(mut self, iso_a3: impl Into<String>) -> Self {
        self.island_exceptions.insert(iso_a3.into());
        self
    }

    pub fn has_land_route(&self, country: &CountryInfo) -> bool {
        if self.always_connected.contains(&country.iso_a3) {
            return true;
        }
        country.continent.is_americas() && !self.island_exceptions.contains(&country.iso_a3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::country::Continent;

    fn country(iso: &str, continent: Continent) -> CountryInfo {
        CountryInfo::new(iso, "XX", iso, continent, 0.0, 0.0)
    }

    #[test]
    fn test_mainland_americas_have_land_route() {
        let rule = LandRouteRule::default();
        assert!(rule.has_land_route(&country("GTM", Continent::NorthAmerica)));
        assert!(rule.has_land_route(&country("PER", Continent::SouthAmerica)));
        assert!(rule.has_land_route(&country("CAN", Continent::NorthAmerica)));
    }

    #[test]
    fn test_islands_and_other_continents_do_not() {
        let rule = LandRouteRule::default();
        assert!(!rule.has_land_route(&country("CUB", Continent::NorthAmerica)));
        assert!(!rule.has_land_route(&country("HTI", Continent::NorthAmerica)));
        assert!(!rule.has_land_route(&country("IND", Continent::Asia)));
    }

    #[test]
    fn test_exception_list_is_configurable() {
        let rule = LandRouteRule::default().with_exception("PAN");
        assert!(!rule.has_land_route(&country("PAN", Continent::NorthAmerica)));

        let mut no_exceptions = LandRouteRule::default();
        no_exceptions.island_exceptions.clear();
        assert!(no_exceptions.has_land_route(&country("CUB", Continent::NorthAmerica)));
    }
}
