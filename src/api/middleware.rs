//! # Utilidades de logging para errores
//!
//! Registro de la cadena completa de errores (`source()`) antes de propagarlos.

use std::error::Error as StdError;

/// Registra la cadena completa de errores
///
/// # Parámetros
/// - `error`: Error a analizar y registrar
/// - `context`: Contexto opcional para añadir información
pub fn log_error_chain<E>(error: &E, context: Option<&str>)
where
    E: StdError + 'static,
{
    let mut error_chain = Vec::new();
    let mut current_error: Option<&dyn StdError> = Some(error);

    while let Some(err) = current_error {
        error_chain.push(err.to_string());
        current_error = err.source();
    }

    if let Some(ctx) = context {
        tracing::error!(
            context = %ctx,
            error_chain = ?error_chain,
            "Error with full chain (with context)"
        );
    } else {
        tracing::error!(error_chain = ?error_chain, "Error with full chain");
    }
}

/// Extension trait para Results que añade logging automático de error chains
///
/// Solo registra fallos de almacenamiento e internos; los errores de negocio
/// (conflictos, validación) ya se registran al convertirse en respuesta.
///
/// # Ejemplo de uso
/// ```ignore
/// state.store
///     .list_movies()
///     .await
///     .log_error_context("listing movies")?;
/// ```
pub trait ErrorLogExt<T> {
    /// Loggea la cadena de errores con contexto adicional
    fn log_error_context(self, context: &str) -> Self;
}

impl<T> ErrorLogExt<T> for Result<T, super::AppError> {
    fn log_error_context(self, context: &str) -> Self {
        if let Err(ref error) = self {
            if matches!(
                error,
                super::AppError::StorageFailure { .. } | super::AppError::Internal(_)
            ) {
                log_error_chain(error, Some(context));
            }
        }
        self
    }
}
