//! Geocoding collaborator seam.
//!
//! The engine never talks to a geocoding provider. Callers pass an
//! implementation that resolves an intervention's new location into
//! region identifiers, synchronously. Partial resolution is reported
//! through `warning` and is never fatal.

use crate::{intervention::NewLocation, types::EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedLocation {
    #[serde(default)]
    pub admin_region_id: Option<EntityId>,
    #[serde(default)]
    pub geo_region_id:   Option<EntityId>,
    #[serde(default)]
    pub warning:         Option<String>,
}

pub trait Geocoder: Send + Sync {
    fn geocode(&self, location: &NewLocation) -> GeocodedLocation;
}

/// Geocoder backed by a fixed country → region table.
/// Unknown countries resolve to nothing and carry a warning.
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    regions: std::collections::HashMap<String, GeocodedLocation>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(
        mut self,
        country: impl Into<String>,
        admin_region_id: impl Into<EntityId>,
        geo_region_id: impl Into<EntityId>,
    ) -> Self {
        self.regions.insert(
            country.into(),
            GeocodedLocation {
                admin_region_id: Some(admin_region_id.into()),
                geo_region_id:   Some(geo_region_id.into()),
                warning:         None,
            },
        );
        self
    }
}

impl Geocoder for StaticGeocoder {
    fn geocode(&self, location: &NewLocation) -> GeocodedLocation {
        match self.regions.get(&location.country) {
            Some(found) => {
                let mut found = found.clone();
                if location.address.is_some() && location.lat.is_none() {
                    found.warning = Some(format!(
                        "Address could not be resolved precisely; using country '{}'",
                        location.country
                    ));
                }
                found
            }
            None => GeocodedLocation {
                warning: Some(format!("Country '{}' could not be geocoded", location.country)),
                ..GeocodedLocation::default()
            },
        }
    }
}

impl<G: Geocoder + ?Sized> Geocoder for &G {
    fn geocode(&self, location: &NewLocation) -> GeocodedLocation {
        (**self).geocode(location)
    }
}
