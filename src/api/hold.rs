//! # API de Retenciones
//!
//! Una retención bloquea asientos de una sesión durante el proceso de compra.
//! Caduca sola pasado su TTL; el token se usa después para confirmar la reserva.

use actix_web::{delete, get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use super::middleware::ErrorLogExt;
use super::{parse_object_id, AppResult, ResultExt};
use crate::booking::Hold;
use crate::state::AppState;

/// Datos para retener asientos
#[derive(Deserialize)]
struct CreateHold {
    /// ID de la sesión (ObjectId como string)
    showtime_id: String,
    /// Números de asiento ("A1", "B7"...)
    seats: Vec<String>,
    /// Duración pedida en segundos; si falta se usa la configurada
    ttl_seconds: Option<u64>,
}

/// Retención tal como se envía al cliente
#[derive(Serialize)]
struct HoldResponse {
    token: String,
    showtime_id: String,
    seats: Vec<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        HoldResponse {
            token: hold.token.to_string(),
            showtime_id: hold.showtime_id.to_hex(),
            seats: hold.seats,
            created_at: hold.created_at,
            expires_at: hold.expires_at,
        }
    }
}

fn parse_token(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err_validation("Token de retención inválido")
}

/// Retiene asientos de una sesión
///
/// # Validaciones
/// - Entre 1 y `MAX_SEATS_PER_HOLD` asientos, sin repetir
/// - Todos los asientos deben existir en la sala de la sesión
/// - `ttl_seconds`, si se indica, dentro del rango permitido
///
/// # Respuesta
/// ```json
/// {
///   "token": "6f1c8a9e-3b7d-4f0e-9a51-2c3d4e5f6a7b",
///   "showtime_id": "507f1f77bcf86cd799439011",
///   "seats": ["A1", "A2"],
///   "created_at": "2024-05-01T18:00:00Z",
///   "expires_at": "2024-05-01T18:10:00Z"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Datos de validación incorrectos
/// - `404 Not Found`: Sesión no encontrada
/// - `409 Conflict`: Algún asiento ya está retenido, reservado o fuera de servicio
#[post("/holds")]
async fn create_hold(
    state: web::Data<AppState>,
    data: web::Json<CreateHold>,
) -> AppResult<impl Responder> {
    let showtime_id = parse_object_id(&data.showtime_id, "showtime_id")?;
    let ttl = data.ttl_seconds.map(Duration::from_secs);

    let hold = state
        .holds
        .create_hold(showtime_id, &data.seats, ttl)
        .await
        .log_error_context("creating hold")?;

    Ok(HttpResponse::Created().json(HoldResponse::from(hold)))
}

/// Consulta una retención vigente
///
/// # Errores
/// - `400 Bad Request`: Token mal formado
/// - `404 Not Found`: Token desconocido
/// - `410 Gone`: La retención ya caducó
#[get("/holds/{token}")]
async fn get_hold(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let token = parse_token(&path)?;
    let hold = state.holds.get(token, Utc::now())?;
    Ok(HttpResponse::Ok().json(HoldResponse::from(hold)))
}

/// Libera una retención y sus asientos
///
/// Es idempotente: liberar un token desconocido o ya liberado responde 200
/// con `"released": false`.
///
/// # Respuesta
/// ```json
/// {
///   "message": "Retención liberada",
///   "released": true
/// }
/// ```
#[delete("/holds/{token}")]
async fn release_hold(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let token = parse_token(&path)?;

    let released = state
        .holds
        .release_hold(token)
        .await
        .log_error_context("releasing hold")?;

    let message = if released {
        "Retención liberada"
    } else {
        "La retención no existe o ya fue liberada"
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": message,
        "released": released
    })))
}

/// Configura las rutas de retenciones
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_hold);
    cfg.service(get_hold);
    cfg.service(release_hold);
}
