//! # Módulo API
//!
//! Este módulo contiene todas las rutas y controladores de la API REST.
//!
//! ## Módulos principales
//!
//! - [`movie`] - Catálogo de películas
//! - [`theater`] - Salas y su plano de asientos
//! - [`showtime`] - Sesiones y mapa de asientos
//! - [`hold`] - Retenciones de asientos durante la compra
//! - [`reservation`] - Confirmación, consulta, cancelación y validación de reservas
//! - [`errors`] - Manejo de errores de la aplicación

pub mod errors;
pub mod hold;
mod middleware;
pub mod movie;
pub mod reservation;
pub mod showtime;
pub mod theater;


// Re-exportar tipos comunes para facilitar su uso
pub use errors::{AppError, AppResult, ErrorResponse, ResultExt};

use actix_web::web;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

/// Configura todas las rutas de la API
///
/// ## Rutas configuradas
///
/// - `/movies/*` - Ver [`movie::routes`]
/// - `/theaters/*` - Ver [`theater::routes`]
/// - `/showtimes/*` - Ver [`showtime::routes`]
/// - `/holds/*` - Ver [`hold::routes`]
/// - `/reservations/*`, `/users/{user_id}/reservations` - Ver [`reservation::routes`]
///
/// # Ejemplo
///
/// ```ignore
/// let app = App::new()
///     .app_data(web::Data::new(state))
///     .configure(api::init_routes);
/// ```
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    movie::routes(cfg);
    theater::routes(cfg);
    showtime::routes(cfg);
    hold::routes(cfg);
    reservation::routes(cfg);
}

/// Parsea un ObjectId recibido en la URL o en el cuerpo
pub(crate) fn parse_object_id(raw: &str, field: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| AppError::validation_field(field, "ID inválido"))
}

/// Timestamp unix (segundos) a RFC 3339 para las respuestas
pub(crate) fn to_rfc3339(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
