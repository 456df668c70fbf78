//! # API de Películas
//!
//! Catálogo de películas que se proyectan en las sesiones:
//! - Registrar una película
//! - Listar el catálogo
//! - Consultar una película por ID

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use super::middleware::ErrorLogExt;
use super::{parse_object_id, AppError, AppResult};
use crate::db::{Movie, MongoRepo};
use crate::state::AppState;

/// Datos para registrar una película
#[derive(Deserialize)]
struct CreateMovie {
    /// Título de la película
    title: String,
    /// Duración en minutos
    duration_minutes: i32,
    /// Género ("drama", "comedia"...)
    genre: String,
    /// Clasificación por edades, opcional
    rating: Option<String>,
}

/// Película tal como se envía al cliente
#[derive(Serialize)]
pub(crate) struct MovieResponse {
    id: String,
    title: String,
    duration_minutes: i32,
    genre: String,
    rating: Option<String>,
}

impl From<Movie> for MovieResponse {
    fn from(movie: Movie) -> Self {
        MovieResponse {
            id: movie.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: movie.title,
            duration_minutes: movie.duration_minutes,
            genre: movie.genre,
            rating: movie.rating,
        }
    }
}

/// Registra una película en el catálogo
///
/// # Validaciones
/// - El título y el género no pueden estar vacíos
/// - La duración debe ser mayor a 0
///
/// # Respuesta
/// ```json
/// {
///   "message": "Película creada correctamente",
///   "id": "507f1f77bcf86cd799439011"
/// }
/// ```
///
/// # Errores
/// - `400 Bad Request`: Datos de validación incorrectos
/// - `500 Internal Server Error`: Error de base de datos
#[post("/movies")]
async fn create_movie(
    state: web::Data<AppState>,
    data: web::Json<CreateMovie>,
) -> AppResult<impl Responder> {
    let data = data.into_inner();

    if data.title.trim().is_empty() {
        return Err(AppError::validation_field("title", "El título es requerido"));
    }
    if data.genre.trim().is_empty() {
        return Err(AppError::validation_field("genre", "El género es requerido"));
    }
    if data.duration_minutes <= 0 {
        return Err(AppError::validation_field(
            "duration_minutes",
            "La duración debe ser mayor a 0",
        ));
    }

    let movie = Movie {
        id: None,
        title: data.title.trim().to_string(),
        duration_minutes: data.duration_minutes,
        genre: data.genre.trim().to_string(),
        rating: data.rating.filter(|r| !r.trim().is_empty()),
        created_at: MongoRepo::current_timestamp(),
    };

    let id = state
        .store
        .insert_movie(movie)
        .await
        .log_error_context("creating movie")?;

    tracing::info!(movie_id = %id.to_hex(), "Película creada");

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Película creada correctamente",
        "id": id.to_hex()
    })))
}

/// Lista el catálogo completo de películas
#[get("/movies")]
async fn list_movies(state: web::Data<AppState>) -> AppResult<impl Responder> {
    let movies = state
        .store
        .list_movies()
        .await
        .log_error_context("listing movies")?;

    let response: Vec<MovieResponse> = movies.into_iter().map(MovieResponse::from).collect();
    Ok(HttpResponse::Ok().json(response))
}

/// Consulta una película por su ID
///
/// # Errores
/// - `400 Bad Request`: ID mal formado
/// - `404 Not Found`: La película no existe
#[get("/movies/{id}")]
async fn get_movie(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let id = parse_object_id(&path, "id")?;

    let movie = state
        .store
        .get_movie(id)
        .await
        .log_error_context("fetching movie")?
        .ok_or_else(|| AppError::not_found_id("Película", &id.to_hex()))?;

    Ok(HttpResponse::Ok().json(MovieResponse::from(movie)))
}

/// Configura las rutas de películas
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_movie);
    cfg.service(list_movies);
    cfg.service(get_movie);
}
