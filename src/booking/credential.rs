//! Credencial QR de una reserva
//!
//! Formato: `<id de reserva en hex>.<128 bits aleatorios en hex>`. El prefijo
//! permite localizar la reserva sin índice adicional; la parte aleatoria es lo
//! que hace la credencial imposible de adivinar.

use mongodb::bson::oid::ObjectId;
use uuid::Uuid;
use crate::api::{AppError, AppResult};

const SEPARATOR: char = '.';

pub fn issue(reservation_id: ObjectId) -> String {
    format!("{}{}{}", reservation_id.to_hex(), SEPARATOR, Uuid::new_v4().simple())
}

/// Extrae el ID de reserva de una credencial, rechazando las mal formadas
pub fn parse(credential: &str) -> AppResult<ObjectId> {
    let invalid = || AppError::validation_field("credential", "credencial QR mal formada");

    let (id, secret) = credential.trim().split_once(SEPARATOR).ok_or_else(invalid)?;
    if secret.len() != 32 || !secret.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    ObjectId::parse_str(id).map_err(|_| invalid())
}
