//! # API de Reservas
//!
//! Este módulo maneja todas las operaciones relacionadas con reservas:
//! - Confirmar una retención como reserva
//! - Consultar una reserva y las reservas de un usuario
//! - Cancelar reservas
//! - Validar la credencial QR en la entrada de la sala
//!
//! La identidad del usuario la resuelve un servicio externo; aquí llega ya
//! autenticada como `user_id`.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use super::middleware::ErrorLogExt;
use super::{parse_object_id, to_rfc3339, AppError, AppResult, ResultExt};
use crate::db::models::format_cents;
use crate::db::{Reservation, ReservationStatus};
use crate::state::AppState;

/// Datos para confirmar una retención
#[derive(Deserialize)]
struct MakeReservation {
    /// Token devuelto al crear la retención
    hold_token: String,
    /// Usuario autenticado que compra
    user_id: String,
}

/// Datos para validar una credencial en la entrada
#[derive(Deserialize)]
struct ValidateCredential {
    /// Contenido del código QR
    credential: String,
}

/// Estructura de respuesta para una reserva
///
/// Versión del modelo Reservation para envío al cliente,
/// con ObjectIds convertidos a strings y el importe formateado.
#[derive(Serialize)]
struct ReservationResponse {
    /// ID único de la reserva (ObjectId convertido a string)
    id: String,
    /// Usuario que hizo la reserva
    user_id: String,
    /// ID de la sesión (ObjectId convertido a string)
    showtime_id: String,
    /// Asientos reservados
    seats: Vec<String>,
    /// Importe total en céntimos
    total_price: i64,
    /// Importe total formateado ("36.00")
    total_price_display: String,
    /// Credencial QR para la entrada
    qr_credential: String,
    /// Si la credencial ya se usó en la entrada
    is_validated: bool,
    /// Estado actual ("pending", "confirmed", "cancelled")
    status: ReservationStatus,
    created_at: String,
    updated_at: String,
}

/// Convierte un modelo Reservation interno a la respuesta del API
impl From<Reservation> for ReservationResponse {
    fn from(reservation: Reservation) -> Self {
        ReservationResponse {
            id: reservation.id.to_hex(),
            user_id: reservation.user_id,
            showtime_id: reservation.showtime_id.to_hex(),
            seats: reservation.seats,
            total_price: reservation.total_price,
            total_price_display: format_cents(reservation.total_price),
            qr_credential: reservation.qr_credential,
            is_validated: reservation.is_validated,
            status: reservation.status,
            created_at: to_rfc3339(reservation.created_at),
            updated_at: to_rfc3339(reservation.updated_at),
        }
    }
}

/// Confirma una retención como reserva
///
/// Calcula el precio, persiste la reserva y descuenta los asientos de la
/// sesión en una sola transacción. Si el almacenamiento falla la retención
/// se restaura y el cliente puede reintentar.
///
/// # Respuesta
/// ```json
/// {
///   "id": "507f1f77bcf86cd799439011",
///   "user_id": "user-42",
///   "showtime_id": "507f191e810c19729de860ea",
///   "seats": ["A1", "A2", "A3"],
///   "total_price": 3600,
///   "total_price_display": "36.00",
///   "qr_credential": "507f1f77bcf86cd799439011.9f86d081884c7d659a2feaa0c55ad015",
///   "is_validated": false,
///   "status": "confirmed",
///   ...
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Token mal formado o usuario vacío
/// - `404 Not Found`: Retención desconocida
/// - `409 Conflict`: La sesión ya no tiene asientos suficientes
/// - `410 Gone`: La retención caducó
/// - `500 Internal Server Error`: Error de almacenamiento tras reintentar
#[post("/reservations")]
async fn make_reservation(
    state: web::Data<AppState>,
    data: web::Json<MakeReservation>,
) -> AppResult<impl Responder> {
    let token = uuid::Uuid::parse_str(data.hold_token.trim())
        .map_err_validation("Token de retención inválido")?;

    let reservation = state
        .finalizer
        .finalize(token, &data.user_id)
        .await
        .log_error_context("finalizing reservation")?;

    Ok(HttpResponse::Created().json(ReservationResponse::from(reservation)))
}

/// Consulta una reserva por su ID
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: La reserva no existe
#[get("/reservations/{id}")]
async fn get_reservation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let id = parse_object_id(&path, "id")?;

    let reservation = state
        .store
        .get_reservation(id)
        .await
        .log_error_context("fetching reservation")?
        .ok_or_else(|| AppError::not_found_id("Reserva", &id.to_hex()))?;

    Ok(HttpResponse::Ok().json(ReservationResponse::from(reservation)))
}

/// Lista las reservas de un usuario, de la más reciente a la más antigua
#[get("/users/{user_id}/reservations")]
async fn list_user_reservations(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let user_id = path.into_inner();
    if user_id.trim().is_empty() {
        return Err(AppError::validation_field("user_id", "El usuario es requerido"));
    }

    let reservations = state
        .store
        .list_user_reservations(user_id.trim())
        .await
        .log_error_context("listing user reservations")?;

    let response: Vec<ReservationResponse> = reservations
        .into_iter()
        .map(ReservationResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(response))
}

/// Cancela una reserva confirmada y libera sus asientos
///
/// Cancelar una reserva ya cancelada no es un error: devuelve la reserva tal cual.
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: La reserva no existe
#[post("/reservations/{id}/cancel")]
async fn cancel_reservation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let id = parse_object_id(&path, "id")?;

    let reservation = state
        .finalizer
        .cancel(id)
        .await
        .log_error_context("cancelling reservation")?;

    Ok(HttpResponse::Ok().json(ReservationResponse::from(reservation)))
}

/// Valida la credencial QR en la entrada de la sala
///
/// Cada credencial se acepta una sola vez.
///
/// # Errores
/// - `400 Bad Request`: Credencial mal formada o reserva no confirmada
/// - `404 Not Found`: Credencial desconocida
/// - `409 Conflict`: La credencial ya se utilizó
#[post("/reservations/validate")]
async fn validate_credential(
    state: web::Data<AppState>,
    data: web::Json<ValidateCredential>,
) -> AppResult<impl Responder> {
    let reservation = state
        .finalizer
        .validate_credential(&data.credential)
        .await
        .log_error_context("validating credential")?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Credencial válida",
        "reservation": ReservationResponse::from(reservation)
    })))
}

/// Configura las rutas de reservas
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(validate_credential);
    cfg.service(make_reservation);
    cfg.service(get_reservation);
    cfg.service(list_user_reservations);
    cfg.service(cancel_reservation);
}
