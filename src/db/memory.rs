//! Almacenamiento en memoria
//!
//! Todas las tablas viven detrás de un único lock, así que cada operación es
//! atómica por construcción. Se usa con `STORAGE_BACKEND=memory` y en los tests.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use crate::api::{AppError, AppResult};
use super::models::{Movie, Reservation, ReservationStatus, Seat, Showtime, Theater};
use super::mongodb::MongoRepo;
use super::store::ReservationStore;

#[derive(Default)]
struct Tables {
    movies: HashMap<ObjectId, Movie>,
    theaters: HashMap<ObjectId, Theater>,
    seats: Vec<Seat>,
    showtimes: HashMap<ObjectId, Showtime>,
    reservations: HashMap<ObjectId, Reservation>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace que los próximos `count` commits de reserva fallen como fallo de almacenamiento
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn injected_failure(&self) -> Option<AppError> {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| {
                AppError::storage(
                    "commit_reservation",
                    std::io::Error::new(std::io::ErrorKind::Other, "fallo simulado"),
                )
            })
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert_movie(&self, mut movie: Movie) -> AppResult<ObjectId> {
        let id = *movie.id.get_or_insert_with(ObjectId::new);
        self.tables().movies.insert(id, movie);
        Ok(id)
    }

    async fn get_movie(&self, id: ObjectId) -> AppResult<Option<Movie>> {
        Ok(self.tables().movies.get(&id).cloned())
    }

    async fn list_movies(&self) -> AppResult<Vec<Movie>> {
        let mut movies: Vec<Movie> = self.tables().movies.values().cloned().collect();
        movies.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(movies)
    }

    async fn insert_theater(&self, theater: &Theater, seats: &[Seat]) -> AppResult<()> {
        let id = theater
            .id
            .ok_or_else(|| AppError::Internal("Sala sin ID asignado".to_string()))?;

        let mut tables = self.tables();
        if tables.theaters.contains_key(&id) {
            return Err(AppError::Conflict("La sala ya existe".to_string()));
        }
        tables.theaters.insert(id, theater.clone());
        tables.seats.extend(seats.iter().cloned().map(|mut seat| {
            seat.id.get_or_insert_with(ObjectId::new);
            seat
        }));
        Ok(())
    }

    async fn get_theater(&self, id: ObjectId) -> AppResult<Option<Theater>> {
        Ok(self.tables().theaters.get(&id).cloned())
    }

    async fn list_seats(&self, theater_id: ObjectId) -> AppResult<Vec<Seat>> {
        Ok(self
            .tables()
            .seats
            .iter()
            .filter(|seat| seat.theater_id == theater_id)
            .cloned()
            .collect())
    }

    async fn insert_showtime(&self, mut showtime: Showtime) -> AppResult<ObjectId> {
        let id = *showtime.id.get_or_insert_with(ObjectId::new);
        self.tables().showtimes.insert(id, showtime);
        Ok(id)
    }

    async fn get_showtime(&self, id: ObjectId) -> AppResult<Option<Showtime>> {
        Ok(self.tables().showtimes.get(&id).cloned())
    }

    async fn confirmed_reservations(&self, showtime_id: ObjectId) -> AppResult<Vec<Reservation>> {
        Ok(self
            .tables()
            .reservations
            .values()
            .filter(|r| r.showtime_id == showtime_id && r.status == ReservationStatus::Confirmed)
            .cloned()
            .collect())
    }

    async fn commit_reservation(&self, reservation: &Reservation) -> AppResult<()> {
        if let Some(err) = self.injected_failure() {
            return Err(err);
        }

        let mut tables = self.tables();
        let count = reservation.seats.len() as i32;

        let taken = tables.reservations.values().any(|r| {
            r.showtime_id == reservation.showtime_id
                && r.status == ReservationStatus::Confirmed
                && r.seats.iter().any(|seat| reservation.seats.contains(seat))
        });
        if taken {
            return Err(AppError::Conflict(
                "Algún asiento ya pertenece a otra reserva".to_string(),
            ));
        }

        let showtime = tables
            .showtimes
            .get_mut(&reservation.showtime_id)
            .ok_or_else(|| AppError::not_found_id("Sesión", &reservation.showtime_id.to_hex()))?;

        if showtime.available_seats < count {
            return Err(AppError::Conflict(
                "La sesión no tiene asientos disponibles suficientes".to_string(),
            ));
        }
        showtime.available_seats -= count;
        tables.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, id: ObjectId) -> AppResult<Option<Reservation>> {
        Ok(self.tables().reservations.get(&id).cloned())
    }

    async fn list_user_reservations(&self, user_id: &str) -> AppResult<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .tables()
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reservations)
    }

    async fn cancel_reservation(
        &self,
        id: ObjectId,
        capacity: i32,
    ) -> AppResult<Option<(Reservation, bool)>> {
        let mut guard = self.tables();
        let tables = &mut *guard;

        let reservation = match tables.reservations.get_mut(&id) {
            Some(reservation) => reservation,
            None => return Ok(None),
        };
        if reservation.status != ReservationStatus::Confirmed {
            return Ok(Some((reservation.clone(), false)));
        }

        let count = reservation.seats.len() as i32;
        let showtime = tables
            .showtimes
            .get_mut(&reservation.showtime_id)
            .ok_or_else(|| AppError::not_found_id("Sesión", &reservation.showtime_id.to_hex()))?;

        if showtime.available_seats + count > capacity {
            return Err(AppError::Conflict(
                "Los asientos disponibles superarían la capacidad de la sala".to_string(),
            ));
        }
        showtime.available_seats += count;
        reservation.status = ReservationStatus::Cancelled;
        reservation.updated_at = MongoRepo::current_timestamp();
        Ok(Some((reservation.clone(), true)))
    }

    async fn mark_validated(&self, id: ObjectId) -> AppResult<bool> {
        let mut tables = self.tables();
        match tables.reservations.get_mut(&id) {
            Some(r) if r.status == ReservationStatus::Confirmed && !r.is_validated => {
                r.is_validated = true;
                r.updated_at = MongoRepo::current_timestamp();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
