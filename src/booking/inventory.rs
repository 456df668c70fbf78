//! Inventario de asientos por sesión
//!
//! Cada sesión tiene un libro de asientos en memoria que se carga del
//! almacenamiento la primera vez que se usa. A partir de ahí todas las
//! retenciones, reservas y cancelaciones del proceso pasan por él, así que el
//! libro es la fuente de verdad de qué asiento está ocupado y por quién.
//!
//! El lock de cada libro solo se toma para comprobar y registrar; nunca se
//! mantiene a través de un `.await`.

use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use uuid::Uuid;
use crate::api::{AppError, AppResult};
use crate::db::ReservationStore;

/// Quién ocupa un asiento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatClaim {
    Hold(Uuid),
    Reservation(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatState {
    Available,
    Held,
    Reserved,
    OutOfService,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatView {
    pub seat_number: String,
    pub is_accessible: bool,
    pub state: SeatState,
}

#[derive(Debug, Clone, Copy)]
struct SeatInfo {
    is_accessible: bool,
    is_available: bool,
}

#[derive(Debug, Default)]
struct SeatLedger {
    seats: BTreeMap<String, SeatInfo>,
    claims: HashMap<String, SeatClaim>,
}

impl SeatLedger {
    fn state_of(&self, seat_number: &str, info: &SeatInfo) -> SeatState {
        match self.claims.get(seat_number) {
            Some(SeatClaim::Hold(_)) => SeatState::Held,
            Some(SeatClaim::Reservation(_)) => SeatState::Reserved,
            None if !info.is_available => SeatState::OutOfService,
            None => SeatState::Available,
        }
    }

    fn views(&self) -> Vec<SeatView> {
        self.seats
            .iter()
            .map(|(number, info)| SeatView {
                seat_number: number.clone(),
                is_accessible: info.is_accessible,
                state: self.state_of(number, info),
            })
            .collect()
    }

    /// Registra `claim` sobre todos los asientos o sobre ninguno
    fn claim(&mut self, seats: &[String], claim: SeatClaim) -> AppResult<()> {
        let unknown: Vec<&str> = seats
            .iter()
            .filter(|seat| !self.seats.contains_key(seat.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(AppError::validation_field(
                "seats",
                &format!("asientos que no pertenecen a la sala: {}", unknown.join(", ")),
            ));
        }

        let unavailable: Vec<String> = seats
            .iter()
            .filter(|seat| {
                let taken = match self.claims.get(seat.as_str()) {
                    Some(existing) => *existing != claim,
                    None => false,
                };
                let out_of_service = self
                    .seats
                    .get(seat.as_str())
                    .map(|info| !info.is_available)
                    .unwrap_or(true);
                taken || out_of_service
            })
            .cloned()
            .collect();
        if !unavailable.is_empty() {
            return Err(AppError::SeatUnavailable { seats: unavailable });
        }

        for seat in seats {
            self.claims.insert(seat.clone(), claim);
        }
        Ok(())
    }

    /// Libera solo los asientos que `claim` ocupa; devuelve cuántos se liberaron
    fn release(&mut self, seats: &[String], claim: SeatClaim) -> usize {
        let mut released = 0;
        for seat in seats {
            if self.claims.get(seat.as_str()) == Some(&claim) {
                self.claims.remove(seat.as_str());
                released += 1;
            }
        }
        released
    }

    fn transfer(&mut self, seats: &[String], from: SeatClaim, to: SeatClaim) -> AppResult<()> {
        if let Some(seat) = seats
            .iter()
            .find(|seat| self.claims.get(seat.as_str()) != Some(&from))
        {
            return Err(AppError::Internal(format!(
                "El asiento {} no pertenece a la retención que se confirma",
                seat
            )));
        }
        for seat in seats {
            self.claims.insert(seat.clone(), to);
        }
        Ok(())
    }
}

type SharedLedger = Arc<Mutex<SeatLedger>>;

pub struct SeatInventory {
    store: Arc<dyn ReservationStore>,
    ledgers: Mutex<HashMap<ObjectId, Arc<OnceCell<SharedLedger>>>>,
}

impl SeatInventory {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self {
            store,
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    /// Todos los asientos de la sala de la sesión con su estado actual
    pub async fn seat_map(&self, showtime_id: ObjectId) -> AppResult<Vec<SeatView>> {
        let ledger = self.ledger(showtime_id).await?;
        let views = lock(&ledger).views();
        Ok(views)
    }

    /// Números de los asientos libres de la sesión
    pub async fn list_available(&self, showtime_id: ObjectId) -> AppResult<Vec<String>> {
        Ok(self
            .seat_map(showtime_id)
            .await?
            .into_iter()
            .filter(|seat| seat.state == SeatState::Available)
            .map(|seat| seat.seat_number)
            .collect())
    }

    /// Ocupa los asientos para `claim`, todos o ninguno.
    ///
    /// # Errores
    /// - `ValidationWithField`: algún asiento no pertenece a la sala
    /// - `SeatUnavailable`: algún asiento ya está retenido, reservado o fuera de servicio
    pub async fn reserve(
        &self,
        showtime_id: ObjectId,
        seats: &[String],
        claim: SeatClaim,
    ) -> AppResult<()> {
        let ledger = self.ledger(showtime_id).await?;
        let result = lock(&ledger).claim(seats, claim);
        result
    }

    /// Devuelve al inventario los asientos ocupados por `claim`. Idempotente.
    pub async fn release(
        &self,
        showtime_id: ObjectId,
        seats: &[String],
        claim: SeatClaim,
    ) -> AppResult<usize> {
        let ledger = self.ledger(showtime_id).await?;
        let released = lock(&ledger).release(seats, claim);
        Ok(released)
    }

    /// Pasa los asientos de una retención a la reserva que la confirmó
    pub async fn promote(
        &self,
        showtime_id: ObjectId,
        seats: &[String],
        hold_token: Uuid,
        reservation_id: ObjectId,
    ) -> AppResult<()> {
        let ledger = self.ledger(showtime_id).await?;
        let result = lock(&ledger).transfer(
            seats,
            SeatClaim::Hold(hold_token),
            SeatClaim::Reservation(reservation_id),
        );
        result
    }

    async fn ledger(&self, showtime_id: ObjectId) -> AppResult<SharedLedger> {
        let cell = {
            let mut ledgers = self.ledgers.lock().unwrap_or_else(PoisonError::into_inner);
            ledgers.entry(showtime_id).or_default().clone()
        };

        match cell.get_or_try_init(|| self.load_ledger(showtime_id)).await {
            Ok(ledger) => Ok(ledger.clone()),
            Err(err) => {
                // Una sesión que no se pudo cargar no deja rastro en el mapa
                let mut ledgers = self.ledgers.lock().unwrap_or_else(PoisonError::into_inner);
                let stale = ledgers
                    .get(&showtime_id)
                    .is_some_and(|entry| Arc::ptr_eq(entry, &cell) && !entry.initialized());
                if stale {
                    ledgers.remove(&showtime_id);
                }
                Err(err)
            }
        }
    }

    #[cfg(test)]
    fn cached_showtimes(&self) -> usize {
        self.ledgers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn load_ledger(&self, showtime_id: ObjectId) -> AppResult<SharedLedger> {
        let showtime = self
            .store
            .get_showtime(showtime_id)
            .await?
            .ok_or_else(|| AppError::not_found_id("Sesión", &showtime_id.to_hex()))?;

        let seats = self.store.list_seats(showtime.theater_id).await?;
        let reservations = self.store.confirmed_reservations(showtime_id).await?;

        let mut ledger = SeatLedger::default();
        for seat in seats {
            ledger.seats.insert(
                seat.seat_number,
                SeatInfo {
                    is_accessible: seat.is_accessible,
                    is_available: seat.is_available,
                },
            );
        }
        for reservation in reservations {
            for seat in reservation.seats {
                ledger.claims.insert(seat, SeatClaim::Reservation(reservation.id));
            }
        }

        tracing::debug!(
            showtime_id = %showtime_id.to_hex(),
            seats = ledger.seats.len(),
            reserved = ledger.claims.len(),
            "Inventario de asientos cargado"
        );

        Ok(Arc::new(Mutex::new(ledger)))
    }
}

fn lock(ledger: &SharedLedger) -> MutexGuard<'_, SeatLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{MemoryStore, ProjectionQuality, Seat, Showtime, Theater};
    use tokio_test::assert_ok;

    /// Crea una sala de `rows` filas de 10 asientos y una sesión sobre ella
    pub(crate) async fn seed_showtime(store: &MemoryStore, rows: usize) -> ObjectId {
        let theater_id = ObjectId::new();
        let mut seats = Vec::new();
        for row in 0..rows {
            let letter = (b'A' + row as u8) as char;
            for number in 1..=10 {
                seats.push(Seat {
                    id: None,
                    theater_id,
                    seat_number: format!("{}{}", letter, number),
                    is_accessible: row == 0,
                    // C10 fuera de servicio
                    is_available: !(row == 2 && number == 10),
                });
            }
        }
        let theater = Theater {
            id: Some(theater_id),
            name: "Sala 1".to_string(),
            capacity: seats.len() as i32,
            created_at: 0,
        };
        store.insert_theater(&theater, &seats).await.unwrap();

        store
            .insert_showtime(Showtime {
                id: None,
                movie_id: ObjectId::new(),
                theater_id,
                start_time: 1_700_000_000,
                end_time: 1_700_007_200,
                quality: ProjectionQuality::TwoD,
                base_price: 1000,
                price_adjustment: 200,
                is_promotion: false,
                available_seats: theater.capacity,
                created_at: 0,
            })
            .await
            .unwrap()
    }

    fn seats(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn reserve_is_all_or_nothing() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 3).await;
        let inventory = SeatInventory::new(store);

        let first = SeatClaim::Hold(Uuid::new_v4());
        assert_ok!(inventory.reserve(showtime_id, &seats(&["A1", "A2"]), first).await);

        let second = SeatClaim::Hold(Uuid::new_v4());
        let err = inventory
            .reserve(showtime_id, &seats(&["A3", "A2"]), second)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SeatUnavailable { ref seats } if seats == &["A2".to_string()]));

        // A3 no quedó ocupado por el intento fallido
        let available = inventory.list_available(showtime_id).await.unwrap();
        assert!(available.contains(&"A3".to_string()));
        assert!(!available.contains(&"A1".to_string()));
    }

    #[tokio::test]
    async fn rejects_seats_outside_the_theater() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 1).await;
        let inventory = SeatInventory::new(store);

        let err = inventory
            .reserve(showtime_id, &seats(&["Z99"]), SeatClaim::Hold(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationWithField { .. }));
    }

    #[tokio::test]
    async fn out_of_service_seats_are_never_claimed() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 3).await;
        let inventory = SeatInventory::new(store);

        let err = inventory
            .reserve(showtime_id, &seats(&["C10"]), SeatClaim::Hold(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SeatUnavailable { .. }));

        let map = inventory.seat_map(showtime_id).await.unwrap();
        let c10 = map.iter().find(|s| s.seat_number == "C10").unwrap();
        assert_eq!(c10.state, SeatState::OutOfService);
        assert!(map.iter().filter(|s| s.seat_number.starts_with('A')).all(|s| s.is_accessible));
    }

    #[tokio::test]
    async fn release_only_frees_own_claims_and_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 1).await;
        let inventory = SeatInventory::new(store);

        let owner = SeatClaim::Hold(Uuid::new_v4());
        let stranger = SeatClaim::Hold(Uuid::new_v4());
        inventory.reserve(showtime_id, &seats(&["A1"]), owner).await.unwrap();

        assert_eq!(inventory.release(showtime_id, &seats(&["A1"]), stranger).await.unwrap(), 0);
        assert_eq!(inventory.release(showtime_id, &seats(&["A1"]), owner).await.unwrap(), 1);
        assert_eq!(inventory.release(showtime_id, &seats(&["A1"]), owner).await.unwrap(), 0);
        assert_eq!(inventory.list_available(showtime_id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn unknown_showtime_is_not_found() {
        let inventory = SeatInventory::new(Arc::new(MemoryStore::new()));
        let err = inventory.seat_map(ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundWithId { .. }));
    }

    #[tokio::test]
    async fn unknown_showtimes_leave_no_ledger_behind() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 1).await;
        let inventory = SeatInventory::new(store);

        for _ in 0..100 {
            assert!(inventory.seat_map(ObjectId::new()).await.is_err());
            let claim = SeatClaim::Hold(Uuid::new_v4());
            assert!(inventory.reserve(ObjectId::new(), &seats(&["A1"]), claim).await.is_err());
        }
        assert_eq!(inventory.cached_showtimes(), 0);

        assert_ok!(inventory.seat_map(showtime_id).await);
        assert_eq!(inventory.cached_showtimes(), 1);
    }
}
