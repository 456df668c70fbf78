//! # API de Sesiones
//!
//! Programación de sesiones (película + sala + horario) y consulta del
//! mapa de asientos en tiempo real.

use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::middleware::ErrorLogExt;
use super::{parse_object_id, to_rfc3339, AppError, AppResult, ResultExt};
use crate::booking::{SeatState, SeatView};
use crate::db::models::format_cents;
use crate::db::{MongoRepo, ProjectionQuality, Showtime};
use crate::state::AppState;

/// Datos para programar una sesión
#[derive(Deserialize)]
struct CreateShowtime {
    /// ID de la película (ObjectId como string)
    movie_id: String,
    /// ID de la sala (ObjectId como string)
    theater_id: String,
    /// Inicio en formato RFC 3339
    start_time: String,
    /// Fin en formato RFC 3339
    end_time: String,
    /// Calidad de proyección ("2D", "3D", "IMAX", "4DX")
    quality: ProjectionQuality,
    /// Precio base por asiento, en céntimos
    base_price: i64,
    /// Ajuste por calidad u horario, en céntimos (puede ser negativo)
    #[serde(default)]
    price_adjustment: i64,
    /// Sesión en promoción
    #[serde(default)]
    is_promotion: bool,
}

/// Sesión tal como se envía al cliente
#[derive(Serialize)]
struct ShowtimeResponse {
    id: String,
    movie_id: String,
    theater_id: String,
    start_time: String,
    end_time: String,
    quality: ProjectionQuality,
    base_price: i64,
    price_adjustment: i64,
    /// Precio por asiento antes de promociones, formateado
    unit_price_display: String,
    is_promotion: bool,
    available_seats: i32,
}

impl From<Showtime> for ShowtimeResponse {
    fn from(showtime: Showtime) -> Self {
        ShowtimeResponse {
            id: showtime.id.map(|id| id.to_hex()).unwrap_or_default(),
            movie_id: showtime.movie_id.to_hex(),
            theater_id: showtime.theater_id.to_hex(),
            start_time: to_rfc3339(showtime.start_time),
            end_time: to_rfc3339(showtime.end_time),
            quality: showtime.quality,
            base_price: showtime.base_price,
            price_adjustment: showtime.price_adjustment,
            unit_price_display: showtime
                .base_price
                .checked_add(showtime.price_adjustment)
                .map(format_cents)
                .unwrap_or_default(),
            is_promotion: showtime.is_promotion,
            available_seats: showtime.available_seats,
        }
    }
}

/// Mapa de asientos de una sesión
#[derive(Serialize)]
struct SeatMapResponse {
    showtime_id: String,
    /// Asientos que se pueden retener ahora mismo
    available_count: usize,
    seats: Vec<SeatView>,
}

fn parse_time(raw: &str, field: &str) -> AppResult<i64> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err_validation(&format!("{} debe estar en formato RFC 3339", field))?;
    Ok(parsed.with_timezone(&Utc).timestamp())
}

/// Programa una nueva sesión
///
/// # Validaciones
/// - La película y la sala deben existir
/// - El fin debe ser posterior al inicio
/// - El precio base y el precio por asiento (base + ajuste) no pueden ser negativos
///
/// La sesión arranca con todos los asientos de la sala disponibles.
///
/// # Respuesta
/// ```json
/// {
///   "message": "Sesión creada correctamente",
///   "id": "507f1f77bcf86cd799439011"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Datos de validación incorrectos
/// - `404 Not Found`: Película o sala no encontrada
/// - `500 Internal Server Error`: Error de base de datos
#[post("/showtimes")]
async fn create_showtime(
    state: web::Data<AppState>,
    data: web::Json<CreateShowtime>,
) -> AppResult<impl Responder> {
    let movie_id = parse_object_id(&data.movie_id, "movie_id")?;
    let theater_id = parse_object_id(&data.theater_id, "theater_id")?;
    let start_time = parse_time(&data.start_time, "start_time")?;
    let end_time = parse_time(&data.end_time, "end_time")?;

    if end_time <= start_time {
        return Err(AppError::validation_field(
            "end_time",
            "El fin debe ser posterior al inicio",
        ));
    }
    if data.base_price < 0 {
        return Err(AppError::validation_field(
            "base_price",
            "El precio base no puede ser negativo",
        ));
    }
    let unit_price = data
        .base_price
        .checked_add(data.price_adjustment)
        .ok_or_else(|| AppError::validation_field("price_adjustment", "Importe fuera de rango"))?;
    if unit_price < 0 {
        return Err(AppError::validation_field(
            "price_adjustment",
            "El precio por asiento no puede ser negativo",
        ));
    }

    state
        .store
        .get_movie(movie_id)
        .await
        .log_error_context("fetching movie")?
        .ok_or_else(|| AppError::not_found_id("Película", &movie_id.to_hex()))?;

    let theater = state
        .store
        .get_theater(theater_id)
        .await
        .log_error_context("fetching theater")?
        .ok_or_else(|| AppError::not_found_id("Sala", &theater_id.to_hex()))?;

    let showtime = Showtime {
        id: None,
        movie_id,
        theater_id,
        start_time,
        end_time,
        quality: data.quality,
        base_price: data.base_price,
        price_adjustment: data.price_adjustment,
        is_promotion: data.is_promotion,
        available_seats: theater.capacity,
        created_at: MongoRepo::current_timestamp(),
    };

    let id = state
        .store
        .insert_showtime(showtime)
        .await
        .log_error_context("creating showtime")?;

    tracing::info!(
        showtime_id = %id.to_hex(),
        movie_id = %movie_id.to_hex(),
        theater_id = %theater_id.to_hex(),
        "Sesión creada"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Sesión creada correctamente",
        "id": id.to_hex()
    })))
}

/// Consulta una sesión por su ID
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: La sesión no existe
#[get("/showtimes/{id}")]
async fn get_showtime(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let id = parse_object_id(&path, "id")?;

    let showtime = state
        .store
        .get_showtime(id)
        .await
        .log_error_context("fetching showtime")?
        .ok_or_else(|| AppError::not_found_id("Sesión", &id.to_hex()))?;

    Ok(HttpResponse::Ok().json(ShowtimeResponse::from(showtime)))
}

/// Mapa de asientos de una sesión
///
/// Cada asiento aparece como `available`, `held`, `reserved` u `out_of_service`.
///
/// # Respuesta
/// ```json
/// {
///   "showtime_id": "507f1f77bcf86cd799439011",
///   "available_count": 1,
///   "seats": [
///     { "seat_number": "A1", "is_accessible": true, "state": "available" },
///     { "seat_number": "A2", "is_accessible": true, "state": "held" }
///   ]
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: La sesión no existe
#[get("/showtimes/{id}/seats")]
async fn get_seat_map(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let id = parse_object_id(&path, "id")?;

    let seats = state
        .inventory
        .seat_map(id)
        .await
        .log_error_context("loading seat map")?;
    let available_count = seats
        .iter()
        .filter(|seat| seat.state == SeatState::Available)
        .count();

    Ok(HttpResponse::Ok().json(SeatMapResponse {
        showtime_id: id.to_hex(),
        available_count,
        seats,
    }))
}

/// Configura las rutas de sesiones
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_showtime);
    cfg.service(get_showtime);
    cfg.service(get_seat_map);
}
