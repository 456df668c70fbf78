//! # Configuración
//!
//! Todo se lee de variables de entorno (el archivo `.env` se carga antes con
//! dotenvy). Cada valor tiene un default razonable para desarrollo local.
//!
//! | Variable | Default |
//! |---|---|
//! | `MONGODB_URI` | `mongodb://localhost:27017` |
//! | `MONGODB_DATABASE` | `cinema_reservation` |
//! | `BIND_ADDRESS` | `0.0.0.0:8080` |
//! | `STORAGE_BACKEND` | `mongodb` (`memory` para desarrollo sin base de datos) |
//! | `HOLD_TTL_SECS` | `600` |
//! | `HOLD_MAX_TTL_SECS` | `1800` |
//! | `MAX_SEATS_PER_HOLD` | `10` |
//! | `HOLD_SWEEP_INTERVAL_SECS` | `15` |
//! | `EXPIRED_HOLD_RETENTION_SECS` | `3600` |
//! | `PROMOTION_PERCENT_OFF` | `20` |

use std::env;
use std::str::FromStr;
use std::time::Duration;
use crate::api::{AppError, AppResult};

/// TTL mínimo que puede pedir un cliente para una retención
pub const MIN_HOLD_TTL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    MongoDb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            "memory" => Ok(Self::Memory),
            other => Err(format!("backend desconocido '{}'", other)),
        }
    }
}

/// Reglas de negocio de las retenciones
#[derive(Debug, Clone)]
pub struct HoldRules {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
    pub max_seats: usize,
    pub sweep_interval: Duration,
    pub expired_retention: Duration,
}

impl Default for HoldRules {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(600),
            max_ttl: Duration::from_secs(1800),
            max_seats: 10,
            sweep_interval: Duration::from_secs(15),
            expired_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub bind_address: String,
    pub storage_backend: StorageBackend,
    pub holds: HoldRules,
    pub promotion_percent_off: u32,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let holds = HoldRules {
            default_ttl: Duration::from_secs(parse_var("HOLD_TTL_SECS", 600u64)?),
            max_ttl: Duration::from_secs(parse_var("HOLD_MAX_TTL_SECS", 1800u64)?),
            max_seats: parse_var("MAX_SEATS_PER_HOLD", 10usize)?,
            sweep_interval: Duration::from_secs(parse_var("HOLD_SWEEP_INTERVAL_SECS", 15u64)?),
            expired_retention: Duration::from_secs(parse_var("EXPIRED_HOLD_RETENTION_SECS", 3600u64)?),
        };

        let config = Self {
            mongodb_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongodb_database: env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| "cinema_reservation".to_string()),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            storage_backend: parse_var("STORAGE_BACKEND", StorageBackend::MongoDb)?,
            holds,
            promotion_percent_off: parse_var("PROMOTION_PERCENT_OFF", 20u32)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        let holds = &self.holds;
        if holds.default_ttl.as_secs() < MIN_HOLD_TTL_SECS {
            return Err(AppError::validation_field(
                "HOLD_TTL_SECS",
                &format!("debe ser al menos {}", MIN_HOLD_TTL_SECS),
            ));
        }
        if holds.max_ttl < holds.default_ttl {
            return Err(AppError::validation_field(
                "HOLD_MAX_TTL_SECS",
                "no puede ser menor que HOLD_TTL_SECS",
            ));
        }
        if holds.max_seats == 0 {
            return Err(AppError::validation_field("MAX_SEATS_PER_HOLD", "debe ser mayor a 0"));
        }
        if holds.sweep_interval.is_zero() {
            return Err(AppError::validation_field(
                "HOLD_SWEEP_INTERVAL_SECS",
                "debe ser mayor a 0",
            ));
        }
        if self.promotion_percent_off > 100 {
            return Err(AppError::validation_field(
                "PROMOTION_PERCENT_OFF",
                "debe estar entre 0 y 100",
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| AppError::validation_field(key, &e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: "test".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            storage_backend: StorageBackend::Memory,
            holds: HoldRules::default(),
            promotion_percent_off: 20,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_max_ttl_below_default() {
        let mut config = config();
        config.holds.max_ttl = Duration::from_secs(60);
        assert!(matches!(
            config.validate(),
            Err(AppError::ValidationWithField { field, .. }) if field == "HOLD_MAX_TTL_SECS"
        ));
    }

    #[test]
    fn rejects_discount_over_hundred() {
        let mut config = config();
        config.promotion_percent_off = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_storage_backend() {
        assert_eq!("Memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!("mongodb".parse::<StorageBackend>(), Ok(StorageBackend::MongoDb));
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }
}
