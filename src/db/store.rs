use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use crate::api::AppResult;
use super::models::{Movie, Reservation, Seat, Showtime, Theater};

/// Acceso al almacenamiento de la cartelera y las reservas
///
/// Las entidades se referencian por ID y se resuelven aquí; ningún modelo
/// guarda punteros a otro. Las operaciones que tocan más de un documento
/// (`insert_theater`, `commit_reservation`, `cancel_reservation`) son
/// todo-o-nada.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert_movie(&self, movie: Movie) -> AppResult<ObjectId>;

    async fn get_movie(&self, id: ObjectId) -> AppResult<Option<Movie>>;

    async fn list_movies(&self) -> AppResult<Vec<Movie>>;

    /// Inserta la sala junto con su plano de asientos. Los IDs vienen ya asignados.
    async fn insert_theater(&self, theater: &Theater, seats: &[Seat]) -> AppResult<()>;

    async fn get_theater(&self, id: ObjectId) -> AppResult<Option<Theater>>;

    async fn list_seats(&self, theater_id: ObjectId) -> AppResult<Vec<Seat>>;

    async fn insert_showtime(&self, showtime: Showtime) -> AppResult<ObjectId>;

    async fn get_showtime(&self, id: ObjectId) -> AppResult<Option<Showtime>>;

    /// Reservas confirmadas de la sesión (son las que ocupan asientos)
    async fn confirmed_reservations(&self, showtime_id: ObjectId) -> AppResult<Vec<Reservation>>;

    /// Persiste la reserva y descuenta `available_seats` en la misma transacción.
    ///
    /// Falla con `Conflict` si la sesión no tiene asientos suficientes o si algún
    /// asiento ya pertenece a otra reserva confirmada.
    async fn commit_reservation(&self, reservation: &Reservation) -> AppResult<()>;

    async fn get_reservation(&self, id: ObjectId) -> AppResult<Option<Reservation>>;

    async fn list_user_reservations(&self, user_id: &str) -> AppResult<Vec<Reservation>>;

    /// Cancela una reserva confirmada y devuelve sus asientos a la sesión.
    ///
    /// Devuelve el estado final de la reserva y si esta llamada fue la que la
    /// canceló; cancelar dos veces no cambia nada y devuelve `false`.
    async fn cancel_reservation(
        &self,
        id: ObjectId,
        capacity: i32,
    ) -> AppResult<Option<(Reservation, bool)>>;

    /// Marca la credencial como usada. `false` si ya estaba validada o la reserva no está confirmada.
    async fn mark_validated(&self, id: ObjectId) -> AppResult<bool>;
}
