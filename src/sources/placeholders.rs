//! Hand-authored reference tables standing in for datasets that have no public API.

use crate::types::country::{Continent, CountryInfo};
use crate::types::covariate::{CovariateTable, COUNTRY_CODE};
use crate::types::month::Month;
use crate::types::observation::{NATIONALITY, PERIOD};
use polars::prelude::*;
use std::collections::BTreeMap;

pub const US_HOSPITALITY_JOB_OPENINGS: &str = "us_hospitality_job_openings";
pub const US_CONSTRUCTION_JOB_OPENINGS: &str = "us_construction_job_openings";

/// Countries of origin with FIPS/ISO codes and a representative point (lat, lon).
pub fn reference_countries() -> Vec<CountryInfo> {
    use Continent::*;
    vec![
        CountryInfo::new("Mexico", "MX", "MEX", NorthAmerica, 23.6345, -102.5528),
        CountryInfo::new("Guatemala", "GT", "GTM", NorthAmerica, 15.7835, -90.2308),
        CountryInfo::new("Honduras", "HO", "HND", NorthAmerica, 15.2000, -86.2419),
        CountryInfo::new("El Salvador", "ES", "SLV", NorthAmerica, 13.7942, -88.8965),
        CountryInfo::new("Nicaragua", "NU", "NIC", NorthAmerica, 12.8654, -85.2072),
        CountryInfo::new("Cuba", "CU", "CUB", NorthAmerica, 21.5218, -77.7812),
        CountryInfo::new("Haiti", "HA", "HTI", NorthAmerica, 18.9712, -72.2852),
        CountryInfo::new("Dominican Republic", "DR", "DOM", NorthAmerica, 18.7357, -70.1627),
        CountryInfo::new("Jamaica", "JM", "JAM", NorthAmerica, 18.1096, -77.2975),
        CountryInfo::new("Canada", "CA", "CAN", NorthAmerica, 56.1304, -106.3468),
        CountryInfo::new("Venezuela", "VE", "VEN", SouthAmerica, 6.4238, -66.5897),
        CountryInfo::new("Ecuador", "EC", "ECU", SouthAmerica, -1.8312, -78.1834),
        CountryInfo::new("Colombia", "CO", "COL", SouthAmerica, 4.5709, -74.2973),
        CountryInfo::new("Peru", "PE", "PER", SouthAmerica, -9.1900, -75.0152),
        CountryInfo::new("Brazil", "BR", "BRA", SouthAmerica, -14.2350, -51.9253),
        CountryInfo::new("India", "IN", "IND", Asia, 20.5937, 78.9629),
        CountryInfo::new("China", "CH", "CHN", Asia, 35.8617, 104.1954),
        CountryInfo::new("Russia", "RS", "RUS", Europe, 61.5240, 105.3188),
        CountryInfo::new("Turkey", "TU", "TUR", Asia, 38.9637, 35.2433),
        CountryInfo::new("Senegal", "SG", "SEN", Africa, 14.4974, -14.4524),
    ]
}

/// Nationality name to FIPS code, the key GDELT uses for countries.
pub fn fips_crosswalk(countries: &[CountryInfo]) -> BTreeMap<String, String> {
    countries
        .iter()
        .map(|c| (c.name.clone(), c.fips.clone()))
        .collect()
}

/// Crosswalk as a `(nationality, country_code)` frame for joining.
pub fn crosswalk_frame(crosswalk: &BTreeMap<String, String>) -> PolarsResult<DataFrame> {
    let (names, codes): (Vec<&str>, Vec<&str>) = crosswalk
        .iter()
        .map(|(name, code)| (name.as_str(), code.as_str()))
        .unzip();
    DataFrame::new(vec![
        Column::new(NATIONALITY.into(), names),
        Column::new(COUNTRY_CODE.into(), codes),
    ])
}

/// Twelve months of 2023 US job openings for hospitality and construction.
pub fn economic_indicators() -> PolarsResult<CovariateTable> {
    let months: Vec<Month> = (1..=12).map(|m| Month::new(m, 2023)).collect();
    let periods: Vec<i32> = months.iter().map(|m| m.period_index()).collect();
    let hospitality: Vec<f64> = (0..12).map(|i| 9_000_000.0 + i as f64 * 10_000.0).collect();
    let construction: Vec<f64> = (0..12).map(|i| 800_000.0 + i as f64 * 5_000.0).collect();

    let frame = DataFrame::new(vec![
        Column::new(PERIOD.into(), periods),
        Column::new(US_HOSPITALITY_JOB_OPENINGS.into(), hospitality),
        Column::new(US_CONSTRUCTION_JOB_OPENINGS.into(), construction),
    ])?;
    Ok(CovariateTable::monthly_global("economic", frame))
}
