//! # Cinema Reservation Server
//!
//! Núcleo de reservas de butacas para cines construido con Rust, Actix Web y MongoDB.
//!
//! ## Características principales
//!
//! - **Catálogo**: Películas, salas con su plano de asientos y sesiones
//! - **Retenciones**: Bloqueo temporal de asientos durante la compra, con caducidad automática
//! - **Reservas**: Confirmación atómica con precio calculado y credencial QR
//! - **Entrada**: Validación de la credencial QR una sola vez
//! - **API REST**: Actix Web con errores JSON uniformes
//!
//! ## Configuración
//!
//! El servidor se configura mediante variables de entorno (archivo `.env`),
//! ver [`config`]:
//!
//! ```env
//! # Base de datos MongoDB
//! MONGODB_URI=mongodb://localhost:27017
//! MONGODB_DATABASE=cinema_reservation
//!
//! # Servidor
//! BIND_ADDRESS=0.0.0.0:8080
//!
//! # Retenciones
//! HOLD_TTL_SECS=600
//!
//! # Logging
//! RUST_LOG=cinema_reservation=debug,mongodb=info
//! ```
//!
//! ## Arquitectura
//!
//! ```text
//! Cliente (taquilla, web, app)
//!     ↓ HTTP/JSON
//! API REST (Actix Web)
//!     ↓
//! Núcleo de reservas (inventario, retenciones, precio, confirmación)
//!     ↓ MongoDB Driver
//! MongoDB Database
//! ```

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod booking;
mod config;
mod db;
mod state;

use config::{AppConfig, StorageBackend};
use db::ReservationStore;
use state::AppState;

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

/// Función principal que inicia el servidor web
///
/// # Funcionalidad
///
/// 1. Carga variables de entorno desde `.env`
/// 2. Configura el sistema de logging con tracing
/// 3. Lee y valida la configuración
/// 4. Conecta con MongoDB y crea índices (o usa el almacén en memoria)
/// 5. Lanza el barrido de retenciones y el oyente de notificaciones
/// 6. Inicia el servidor HTTP en la dirección especificada
///
/// # Errores
///
/// Retorna `std::io::Error` si:
/// - La configuración no es válida
/// - No se puede conectar a MongoDB
/// - No se puede bindear al puerto especificado
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Configurar sistema de logging con tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cinema_reservation=debug,mongodb=info")),
        )
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuración inválida: {}", e);
        io_error(format!("Configuración inválida: {}", e))
    })?;

    tracing::info!(
        backend = ?config.storage_backend,
        "Iniciando Cinema Reservation Server"
    );

    let store: Arc<dyn ReservationStore> = match config.storage_backend {
        StorageBackend::MongoDb => {
            let repo = db::MongoRepo::init(&config.mongodb_uri, &config.mongodb_database)
                .await
                .map_err(|e| {
                    tracing::error!("Error conectando a MongoDB: {}", e);
                    io_error(format!("Error de MongoDB: {}", e))
                })?;
            tracing::info!("Conexión a MongoDB establecida exitosamente");

            // No es un error fatal, continuamos sin índices
            if let Err(e) = repo.create_indexes().await {
                tracing::warn!("Advertencia creando índices: {}", e);
            }
            Arc::new(repo)
        }
        StorageBackend::Memory => {
            tracing::warn!("Usando almacenamiento en memoria, los datos no se persisten");
            Arc::new(db::MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.holds.clone(), config.promotion_percent_off);

    booking::sweeper::spawn_hold_sweeper(state.holds.clone());
    booking::notifications::spawn_listener(state.events.subscribe());

    tracing::info!("Servidor iniciando en {}", config.bind_address);

    // Crear y configurar el servidor HTTP
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(api::init_routes)
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
