use std::fmt;
use std::future::Future;

use crate::error::DispatchError;
use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Average urban delivery speed used for travel-time estimates.
const AVERAGE_SPEED_KMH: f64 = 30.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Distance between two optional coordinate pairs, rounded to one decimal.
/// `None` when either side is missing; a distance is never fabricated from
/// incomplete data.
pub fn distance_km(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((haversine_km(a, b) * 10.0).round() / 10.0),
        _ => None,
    }
}

pub fn travel_minutes(distance_km: f64) -> f64 {
    distance_km / AVERAGE_SPEED_KMH * 60.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eta {
    LessThanAMinute,
    Minutes(u32),
    HoursMinutes { hours: u32, minutes: u32 },
}

impl Eta {
    pub fn from_distance_km(distance_km: f64) -> Self {
        let minutes = travel_minutes(distance_km);
        if minutes < 1.0 {
            Eta::LessThanAMinute
        } else if minutes < 60.0 {
            Eta::Minutes(minutes.round() as u32)
        } else {
            let hours = (minutes / 60.0).floor() as u32;
            let remainder = (minutes - f64::from(hours) * 60.0).round() as u32;
            Eta::HoursMinutes {
                hours,
                minutes: remainder,
            }
        }
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::LessThanAMinute => write!(f, "Menos de un minuto"),
            Eta::Minutes(minutes) => write!(f, "{minutes} min"),
            Eta::HoursMinutes { hours, minutes } => write!(f, "{hours} h {minutes} min"),
        }
    }
}

/// One-shot position source. The production implementation wraps the device
/// geolocation API; tests use `FixedPosition`.
pub trait PositionProvider: Send + Sync {
    fn current_position(&self) -> impl Future<Output = Result<GeoPoint, DispatchError>> + Send;
}

pub struct FixedPosition(pub GeoPoint);

impl PositionProvider for FixedPosition {
    async fn current_position(&self) -> Result<GeoPoint, DispatchError> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Eta, distance_km, haversine_km, travel_minutes};
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 4.7110,
            lng: -74.0721,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn distance_is_rounded_to_one_decimal() {
        let a = GeoPoint {
            lat: 4.7110,
            lng: -74.0721,
        };
        let b = GeoPoint {
            lat: 4.7200,
            lng: -74.0600,
        };
        let rounded = distance_km(Some(&a), Some(&b)).unwrap();
        assert_eq!((rounded * 10.0).round() / 10.0, rounded);
    }

    #[test]
    fn missing_coordinates_yield_no_distance() {
        let p = GeoPoint { lat: 0.0, lng: 0.0 };
        assert_eq!(distance_km(None, Some(&p)), None);
        assert_eq!(distance_km(Some(&p), None), None);
        assert_eq!(distance_km(None, None), None);
    }

    #[test]
    fn eta_buckets_match_distance() {
        // 0.4 km at 30 km/h is 0.8 minutes
        assert_eq!(Eta::from_distance_km(0.4), Eta::LessThanAMinute);
        // 5 km is 10 minutes
        assert_eq!(Eta::from_distance_km(5.0), Eta::Minutes(10));
        // 35 km is 70 minutes
        assert_eq!(
            Eta::from_distance_km(35.0),
            Eta::HoursMinutes {
                hours: 1,
                minutes: 10
            }
        );
    }

    #[test]
    fn eta_display_formats() {
        assert_eq!(Eta::from_distance_km(0.2).to_string(), "Menos de un minuto");
        assert_eq!(Eta::from_distance_km(5.0).to_string(), "10 min");
        assert_eq!(Eta::from_distance_km(35.0).to_string(), "1 h 10 min");
    }

    #[test]
    fn travel_minutes_is_monotonic_in_distance() {
        let mut previous = 0.0;
        let mut km = 0.0;
        while km <= 200.0 {
            let minutes = travel_minutes(km);
            assert!(minutes >= previous);
            previous = minutes;
            km += 0.5;
        }
    }
}
