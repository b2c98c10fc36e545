pub mod border;
pub mod land_route;

use crate::geo::border::BorderLine;
use crate::geo::land_route::LandRouteRule;
use crate::types::country::CountryInfo;
use crate::types::covariate::CovariateTable;
use crate::types::observation::NATIONALITY;
use polars::prelude::*;

pub const DISTANCE_KM: &str = "distance_km";
pub const LAND_ROUTE: &str = "land_route";

/// Static per-nationality geography: border distance in km and a 0/1 land-route flag.
pub fn geography_table(
    countries: &[CountryInfo],
    border: &BorderLine,
    rule: &LandRouteRule,
) -> PolarsResult<CovariateTable> {
    let names: Vec<&str> = countries.iter().map(|c| c.name.as_str()).collect();
    let distances: Vec<Option<f64>> = countries
        .iter()
        .map(|c| border.distance_km(c.latitude, c.longitude))
        .collect();
    let land_route: Vec<i32> = countries
        .iter()
        .map(|c| i32::from(rule.has_land_route(c)))
        .collect();

    let frame = DataFrame::new(vec![
        Column::new(NATIONALITY.into(), names),
        Column::new(DISTANCE_KM.into(), distances),
        Column::new(LAND_ROUTE.into(), land_route),
    ])?;
    Ok(CovariateTable::per_country("geography", frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::placeholders::reference_countries;

    #[test]
    fn test_geography_table() -> Result<(), Box<dyn std::error::Error>> {
        let countries = reference_countries();
        let table = geography_table(&countries, &BorderLine::us_mexico(), &LandRouteRule::default())?;
        assert_eq!(table.frame.height(), countries.len());
        assert_eq!(table.value_columns(), vec![DISTANCE_KM, LAND_ROUTE]);
        assert_eq!(table.frame.column(DISTANCE_KM)?.null_count(), 0);

        let df = table
            .frame
            .lazy()
            .filter(col(NATIONALITY).eq(lit("Cuba")))
            .collect()?;
        assert_eq!(df.column(LAND_ROUTE)?.i32()?.get(0), Some(0));
        Ok(())
    }
}
