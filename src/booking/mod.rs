//! # Núcleo de reservas
//!
//! - [`inventory`] - Disponibilidad de asientos por sesión
//! - [`holds`] - Retenciones temporales durante la compra
//! - [`pricing`] - Cálculo de precio
//! - [`finalizer`] - Confirmación, cancelación y validación de reservas
//! - [`credential`] - Credenciales QR
//! - [`notifications`] - Eventos hacia el servicio de notificaciones
//! - [`sweeper`] - Barrido de retenciones vencidas

pub mod credential;
pub mod finalizer;
pub mod holds;
pub mod inventory;
pub mod notifications;
pub mod pricing;
pub mod sweeper;

pub use finalizer::ReservationFinalizer;
pub use holds::{Hold, HoldManager};
pub use inventory::{SeatInventory, SeatState, SeatView};
pub use notifications::{EventPublisher, ReservationEvent};
pub use pricing::PriceCalculator;
