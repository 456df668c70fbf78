use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use crate::api::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Movie {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub duration_minutes: i32,
    pub genre: String,
    pub rating: Option<String>,
    pub created_at: i64, // timestamp unix
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Theater {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub capacity: i32,
    pub created_at: i64, // timestamp unix
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Seat {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub theater_id: ObjectId,
    pub seat_number: String,
    pub is_accessible: bool,
    pub is_available: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionQuality {
    #[serde(rename = "2D")]
    TwoD,
    #[serde(rename = "3D")]
    ThreeD,
    #[serde(rename = "IMAX")]
    Imax,
    #[serde(rename = "4DX")]
    FourDx,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Showtime {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub movie_id: ObjectId,
    pub theater_id: ObjectId,
    pub start_time: i64, // timestamp unix
    pub end_time: i64,   // timestamp unix
    pub quality: ProjectionQuality,
    /// Precio base en céntimos
    pub base_price: i64,
    /// Ajuste sobre el precio base en céntimos (puede ser negativo)
    pub price_adjustment: i64,
    pub is_promotion: bool,
    pub available_seats: i32,
    pub created_at: i64, // timestamp unix
}

/// Estados de una reserva
///
/// `Pending` solo existe mientras se finaliza una retención; lo que se
/// persiste es `Confirmed` o `Cancelled`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Aplica una transición de estado, rechazando las que no están permitidas
    pub fn transition(self, to: ReservationStatus) -> AppResult<ReservationStatus> {
        use ReservationStatus::*;
        match (self, to) {
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) => Ok(to),
            (from, to) => Err(AppError::Conflict(format!(
                "Transición de reserva no permitida: {} -> {}",
                from.as_str(),
                to.as_str()
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Reservation {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: String,
    pub showtime_id: ObjectId,
    pub seats: Vec<String>,
    /// Precio total en céntimos
    pub total_price: i64,
    pub qr_credential: String,
    pub is_validated: bool,
    pub status: ReservationStatus,
    pub created_at: i64, // timestamp unix
    pub updated_at: i64, // timestamp unix
}

/// Normaliza un número de asiento (" c7 " -> "C7")
pub fn normalize_seat_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Formatea céntimos como decimal con dos cifras ("3600" -> "36.00")
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
