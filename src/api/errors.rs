//! # Manejo de errores de la aplicación
//!
//! Jerarquía de errores construida con thiserror. Cada variante sabe a qué
//! código HTTP corresponde y cómo registrarse en los logs.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::error::Error;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Tipos de error de la aplicación con contexto
#[derive(Error, Debug)]
pub enum AppError {
    /// Fallo del almacenamiento subyacente
    ///
    /// Mantiene la operación que falló y la cadena de errores original.
    #[error("Fallo de almacenamiento en operación '{operation}': {source}")]
    StorageFailure {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// Error de validación con campo específico
    #[error("Error de validación en campo '{field}': {message}")]
    ValidationWithField {
        field: String,
        message: String,
    },

    /// Error de validación general
    #[error("Error de validación: {0}")]
    Validation(String),

    /// Alguno de los asientos pedidos ya está retenido, reservado o fuera de servicio
    #[error("Asientos no disponibles: {}", seats.join(", "))]
    SeatUnavailable {
        seats: Vec<String>,
    },

    /// Error de conflicto
    #[error("Conflicto: {0}")]
    Conflict(String),

    /// La retención existía pero su TTL ya venció
    #[error("Retención expirada: {0}")]
    HoldExpired(String),

    /// No existe ninguna retención con ese token
    #[error("Retención no encontrada: {0}")]
    HoldNotFound(String),

    /// Error de recurso no encontrado
    #[error("No encontrado: {resource_type} con ID '{id}'")]
    NotFoundWithId {
        resource_type: String,
        id: String,
    },

    /// Error de no encontrado simple
    #[error("No encontrado: {0}")]
    NotFound(String),

    /// Error interno simple
    #[error("Error interno: {0}")]
    Internal(String),
}

// Métodos helper para crear errores con contexto
impl AppError {
    /// Crea un fallo de almacenamiento con contexto de operación
    pub fn storage<E>(operation: &str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::StorageFailure {
            operation: operation.to_string(),
            source: source.into(),
        }
    }

    /// Crea un error de validación con campo específico
    pub fn validation_field(field: &str, message: &str) -> Self {
        Self::ValidationWithField {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Crea un error de no encontrado con ID
    pub fn not_found_id(resource_type: &str, id: &str) -> Self {
        Self::NotFoundWithId {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    /// Solo los fallos de almacenamiento se reintentan en la frontera de la transacción
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::StorageFailure { .. })
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ValidationWithField { .. } => StatusCode::BAD_REQUEST,
            Self::SeatUnavailable { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::HoldExpired(_) => StatusCode::GONE,
            Self::HoldNotFound(_) | Self::NotFound(_) | Self::NotFoundWithId { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::StorageFailure { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Log detallado del error antes de responder
        let body = match self {
            Self::StorageFailure { operation, source } => {
                let trace_id = uuid::Uuid::new_v4();
                tracing::error!(
                    trace_id = %trace_id,
                    operation = %operation,
                    error = %source,
                    error_chain = ?source.source(),
                    "Storage failure"
                );
                ErrorResponse::new(
                    "Error de almacenamiento",
                    &format!("Error interno (trace: {})", trace_id),
                )
            }
            Self::ValidationWithField { field, message } => {
                tracing::warn!(field = %field, message = %message, "Validation error");
                ErrorResponse::new(
                    "Error de validación",
                    &format!("Campo '{}': {}", field, message),
                )
            }
            Self::Validation(message) => {
                tracing::warn!(message = %message, "Validation error");
                ErrorResponse::new("Error de validación", message)
            }
            Self::SeatUnavailable { seats } => {
                tracing::info!(seats = ?seats, "Seats unavailable");
                ErrorResponse::new("Asientos no disponibles", &self.to_string())
            }
            Self::Conflict(message) => {
                tracing::info!(message = %message, "Conflict");
                ErrorResponse::new("Conflicto", message)
            }
            Self::HoldExpired(token) => {
                tracing::info!(token = %token, "Hold expired");
                ErrorResponse::new("Retención expirada", &self.to_string())
            }
            Self::HoldNotFound(token) => {
                tracing::info!(token = %token, "Hold not found");
                ErrorResponse::new("Retención no encontrada", &self.to_string())
            }
            Self::NotFoundWithId { resource_type, id } => {
                tracing::info!(resource_type = %resource_type, id = %id, "Resource not found");
                ErrorResponse::new(
                    "No encontrado",
                    &format!("{} con ID '{}' no encontrado", resource_type, id),
                )
            }
            Self::NotFound(message) => ErrorResponse::new("No encontrado", message),
            Self::Internal(message) => {
                let trace_id = uuid::Uuid::new_v4();
                tracing::error!(trace_id = %trace_id, message = %message, "Internal error");
                ErrorResponse::new(
                    "Error interno",
                    &format!("Error interno (trace: {})", trace_id),
                )
            }
        };

        HttpResponse::build(status).json(body)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub trait ResultExt<T> {
    fn map_err_validation(self, message: &str) -> AppResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn map_err_validation(self, message: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Validation(format!("{}: {}", message, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(
            AppError::SeatUnavailable { seats: vec!["A1".into()] }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::HoldExpired("t".into()).status_code(), StatusCode::GONE);
        assert_eq!(AppError::HoldNotFound("t".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::validation_field("seats", "vacío").status_code(),
            StatusCode::BAD_REQUEST
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let storage = AppError::storage("commit_reservation", io);
        assert!(storage.is_storage_failure());
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn seat_unavailable_lists_every_seat() {
        let err = AppError::SeatUnavailable { seats: vec!["A1".into(), "B2".into()] };
        assert_eq!(err.to_string(), "Asientos no disponibles: A1, B2");
    }

    #[test]
    fn storage_failure_keeps_operation_and_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = AppError::storage("find_showtime", io);
        match &err {
            AppError::StorageFailure { operation, .. } => assert_eq!(operation, "find_showtime"),
            other => panic!("variante inesperada: {:?}", other),
        }
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("socket closed"));
    }
}
