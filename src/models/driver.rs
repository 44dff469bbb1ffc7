use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Self-reported availability, independent of any job the driver may be on.
/// A driver can be mid-delivery and still report a break to stop receiving
/// new work. Persisted as the flat wire strings the upstream documents use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DriverStatus {
    Available,
    OnBreak(BreakKind),
    Stalled,
    EndingShift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Breakfast,
    Lunch,
    Rest,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Available => "disponible",
            DriverStatus::OnBreak(BreakKind::Breakfast) => "desayunando",
            DriverStatus::OnBreak(BreakKind::Lunch) => "almorzando",
            DriverStatus::OnBreak(BreakKind::Rest) => "descanso",
            DriverStatus::Stalled => "varado",
            DriverStatus::EndingShift => "terminando",
        }
    }

    /// Unknown strings resolve to `Available`, matching how upstream treats a
    /// profile that has never set a status.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "desayunando" => DriverStatus::OnBreak(BreakKind::Breakfast),
            "almorzando" => DriverStatus::OnBreak(BreakKind::Lunch),
            "descanso" => DriverStatus::OnBreak(BreakKind::Rest),
            "varado" => DriverStatus::Stalled,
            "terminando" => DriverStatus::EndingShift,
            _ => DriverStatus::Available,
        }
    }

    /// Only an available driver may accept new jobs.
    pub fn permits_accept(&self) -> bool {
        matches!(self, DriverStatus::Available)
    }
}

impl From<String> for DriverStatus {
    fn from(raw: String) -> Self {
        DriverStatus::parse(&raw)
    }
}

impl From<DriverStatus> for String {
    fn from(status: DriverStatus) -> Self {
        status.as_str().to_string()
    }
}

/// The slice of the driver document this core reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub status: DriverStatus,
    pub active_deliveries: u32,
    pub total_deliveries: u32,
    pub total_earnings: f64,
    pub location: Option<GeoPoint>,
    pub last_status_update: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::{BreakKind, DriverStatus};

    #[test]
    fn status_round_trips_through_wire_strings() {
        for status in [
            DriverStatus::Available,
            DriverStatus::OnBreak(BreakKind::Breakfast),
            DriverStatus::OnBreak(BreakKind::Lunch),
            DriverStatus::OnBreak(BreakKind::Rest),
            DriverStatus::Stalled,
            DriverStatus::EndingShift,
        ] {
            assert_eq!(DriverStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_falls_back_to_available() {
        assert_eq!(DriverStatus::parse("ocupado"), DriverStatus::Available);
        assert!(DriverStatus::parse("").permits_accept());
    }

    #[test]
    fn only_available_permits_accept() {
        assert!(!DriverStatus::OnBreak(BreakKind::Lunch).permits_accept());
        assert!(!DriverStatus::Stalled.permits_accept());
        assert!(!DriverStatus::EndingShift.permits_accept());
    }
}
