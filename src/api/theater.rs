//! # API de Salas
//!
//! Alta y consulta de salas. Al crear una sala se genera su plano de asientos
//! (filas `A`, `B`, ... con butacas numeradas desde 1) y la capacidad es el
//! número de asientos generados.

use actix_web::{get, post, web, HttpResponse, Responder};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use super::middleware::ErrorLogExt;
use super::{parse_object_id, AppError, AppResult};
use crate::db::models::normalize_seat_number;
use crate::db::{MongoRepo, Seat, Theater};
use crate::state::AppState;

/// Máximo de filas por sala (una letra por fila)
const MAX_ROWS: u32 = 26;
/// Máximo de butacas por fila
const MAX_SEATS_PER_ROW: u32 = 50;

/// Datos para crear una sala
#[derive(Deserialize)]
struct CreateTheater {
    /// Nombre visible de la sala
    name: String,
    /// Número de filas (1-26)
    rows: u32,
    /// Butacas por fila (1-50)
    seats_per_row: u32,
    /// Asientos adaptados para movilidad reducida
    #[serde(default)]
    accessible_seats: Vec<String>,
    /// Asientos fuera de servicio
    #[serde(default)]
    out_of_service_seats: Vec<String>,
}

/// Asiento tal como se envía al cliente
#[derive(Serialize)]
struct SeatResponse {
    seat_number: String,
    is_accessible: bool,
    is_available: bool,
}

/// Sala con su plano de asientos
#[derive(Serialize)]
struct TheaterResponse {
    id: String,
    name: String,
    capacity: i32,
    seats: Vec<SeatResponse>,
}

/// Genera el plano de asientos de una sala
///
/// Los asientos marcados como accesibles o fuera de servicio deben existir
/// en el plano generado.
///
/// # Errores
/// - `Validation`: dimensiones fuera de rango o asientos marcados inexistentes
fn generate_layout(
    theater_id: ObjectId,
    rows: u32,
    seats_per_row: u32,
    accessible: &[String],
    out_of_service: &[String],
) -> AppResult<Vec<Seat>> {
    if rows == 0 || rows > MAX_ROWS {
        return Err(AppError::validation_field(
            "rows",
            &format!("Debe estar entre 1 y {}", MAX_ROWS),
        ));
    }
    if seats_per_row == 0 || seats_per_row > MAX_SEATS_PER_ROW {
        return Err(AppError::validation_field(
            "seats_per_row",
            &format!("Debe estar entre 1 y {}", MAX_SEATS_PER_ROW),
        ));
    }

    let mut seats = Vec::with_capacity((rows * seats_per_row) as usize);
    for row in (b'A'..).take(rows as usize) {
        for number in 1..=seats_per_row {
            seats.push(Seat {
                id: Some(ObjectId::new()),
                theater_id,
                seat_number: format!("{}{}", row as char, number),
                is_accessible: false,
                is_available: true,
            });
        }
    }

    let known: BTreeSet<String> = seats.iter().map(|s| s.seat_number.clone()).collect();
    let accessible = marked_seats(&known, accessible, "accessible_seats")?;
    let out_of_service = marked_seats(&known, out_of_service, "out_of_service_seats")?;

    for seat in &mut seats {
        seat.is_accessible = accessible.contains(&seat.seat_number);
        seat.is_available = !out_of_service.contains(&seat.seat_number);
    }
    Ok(seats)
}

fn marked_seats(
    known: &BTreeSet<String>,
    raw: &[String],
    field: &str,
) -> AppResult<BTreeSet<String>> {
    let mut marked = BTreeSet::new();
    for seat in raw.iter().map(|s| normalize_seat_number(s)) {
        if !known.contains(&seat) {
            return Err(AppError::validation_field(
                field,
                &format!("El asiento {} no existe en la sala", seat),
            ));
        }
        marked.insert(seat);
    }
    Ok(marked)
}

/// Crea una sala y su plano de asientos
///
/// # Validaciones
/// - El nombre no puede estar vacío
/// - Filas entre 1 y 26, butacas por fila entre 1 y 50
/// - Los asientos accesibles y fuera de servicio deben existir
///
/// # Respuesta
/// ```json
/// {
///   "message": "Sala creada correctamente",
///   "id": "507f1f77bcf86cd799439011",
///   "capacity": 120
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Datos de validación incorrectos
/// - `500 Internal Server Error`: Error de base de datos
#[post("/theaters")]
async fn create_theater(
    state: web::Data<AppState>,
    data: web::Json<CreateTheater>,
) -> AppResult<impl Responder> {
    if data.name.trim().is_empty() {
        return Err(AppError::validation_field("name", "El nombre es requerido"));
    }

    let theater_id = ObjectId::new();
    let seats = generate_layout(
        theater_id,
        data.rows,
        data.seats_per_row,
        &data.accessible_seats,
        &data.out_of_service_seats,
    )?;

    let theater = Theater {
        id: Some(theater_id),
        name: data.name.trim().to_string(),
        capacity: seats.len() as i32,
        created_at: MongoRepo::current_timestamp(),
    };

    state
        .store
        .insert_theater(&theater, &seats)
        .await
        .log_error_context("creating theater")?;

    tracing::info!(
        theater_id = %theater_id.to_hex(),
        capacity = theater.capacity,
        "Sala creada"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Sala creada correctamente",
        "id": theater_id.to_hex(),
        "capacity": theater.capacity
    })))
}

/// Consulta una sala con su plano de asientos
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: La sala no existe
#[get("/theaters/{id}")]
async fn get_theater(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let id = parse_object_id(&path, "id")?;

    let theater = state
        .store
        .get_theater(id)
        .await
        .log_error_context("fetching theater")?
        .ok_or_else(|| AppError::not_found_id("Sala", &id.to_hex()))?;

    let seats = state
        .store
        .list_seats(id)
        .await
        .log_error_context("listing seats")?;

    Ok(HttpResponse::Ok().json(TheaterResponse {
        id: id.to_hex(),
        name: theater.name,
        capacity: theater.capacity,
        seats: seats
            .into_iter()
            .map(|seat| SeatResponse {
                seat_number: seat.seat_number,
                is_accessible: seat.is_accessible,
                is_available: seat.is_available,
            })
            .collect(),
    }))
}

/// Configura las rutas de salas
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_theater);
    cfg.service(get_theater);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_marks_accessible_and_broken_seats() {
        let seats = generate_layout(
            ObjectId::new(),
            2,
            3,
            &["a1".to_string()],
            &["B3".to_string()],
        )
        .unwrap();

        assert_eq!(seats.len(), 6);
        assert_eq!(seats[0].seat_number, "A1");
        assert!(seats[0].is_accessible);
        assert_eq!(seats[5].seat_number, "B3");
        assert!(!seats[5].is_available);
        assert_eq!(seats.iter().filter(|s| s.is_available).count(), 5);
    }

    #[test]
    fn layout_rejects_unknown_marked_seat() {
        let err = generate_layout(ObjectId::new(), 1, 5, &["Z9".to_string()], &[]).unwrap_err();
        assert!(matches!(err, AppError::ValidationWithField { ref field, .. } if field == "accessible_seats"));
    }

    #[test]
    fn layout_rejects_empty_dimensions() {
        assert!(generate_layout(ObjectId::new(), 0, 5, &[], &[]).is_err());
        assert!(generate_layout(ObjectId::new(), 27, 5, &[], &[]).is_err());
        assert!(generate_layout(ObjectId::new(), 2, 51, &[], &[]).is_err());
    }
}
