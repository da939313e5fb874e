use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Reverse geocoder backed by a Nominatim-compatible endpoint.
#[derive(Clone)]
pub struct Geocoder {
    client: Client,
    url: Option<String>,
}

impl Geocoder {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent("TMD-System/1.0")
            .build()
            .unwrap_or_default();
        Self { client, url }
    }

    /// Resolves coordinates to an address, falling back to the formatted
    /// coordinates on any failure.
    pub async fn reverse(&self, latitude: f64, longitude: f64) -> String {
        let Some(url) = self.url.as_deref() else {
            return fallback_address(latitude, longitude);
        };

        match self.lookup(url, latitude, longitude).await {
            Ok(Some(address)) if !address.trim().is_empty() => address,
            Ok(_) => fallback_address(latitude, longitude),
            Err(e) => {
                tracing::warn!(error = %e, latitude, longitude, "Reverse geocoding failed");
                fallback_address(latitude, longitude)
            }
        }
    }

    async fn lookup(&self, url: &str, latitude: f64, longitude: f64) -> Result<Option<String>, reqwest::Error> {
        let body: ReverseResponse = self
            .client
            .get(url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.display_name)
    }
}

pub fn fallback_address(latitude: f64, longitude: f64) -> String {
    format!("Lat: {:.6}, Long: {:.6}", latitude, longitude)
}

/// Great-circle distance in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_six_decimals() {
        assert_eq!(fallback_address(10.7769, 106.7009), "Lat: 10.776900, Long: 106.700900");
    }

    #[test]
    fn haversine_matches_known_distances() {
        assert!(haversine_meters(10.7769, 106.7009, 10.7769, 106.7009) < 1e-6);
        // one degree of latitude is roughly 111.2 km
        let d = haversine_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 100.0, "{d}");
    }

    #[actix_web::test]
    async fn disabled_geocoder_returns_fallback() {
        let geocoder = Geocoder::new(None);
        assert_eq!(geocoder.reverse(1.5, -2.25).await, "Lat: 1.500000, Long: -2.250000");
    }
}
