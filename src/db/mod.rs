// src/db/mod.rs
pub mod memory;
pub mod models;
pub mod mongodb;
pub mod store;

pub use memory::MemoryStore;
pub use models::{Movie, ProjectionQuality, Reservation, ReservationStatus, Seat, Showtime, Theater};
pub use self::mongodb::MongoRepo;
pub use store::ReservationStore;
