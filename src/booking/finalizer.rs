//! Confirmación de retenciones y ciclo de vida de las reservas
//!
//! `finalize` convierte una retención vigente en una reserva confirmada con su
//! credencial QR. La inserción de la reserva y el descuento de asientos de la
//! sesión se confirman juntos o no se confirman.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use uuid::Uuid;
use crate::api::{AppError, AppResult};
use crate::db::{Reservation, ReservationStatus, ReservationStore};
use super::credential;
use super::holds::{Hold, HoldManager};
use super::inventory::{SeatClaim, SeatInventory};
use super::notifications::{EventPublisher, ReservationEvent};
use super::pricing::PriceCalculator;

pub struct ReservationFinalizer {
    store: Arc<dyn ReservationStore>,
    inventory: Arc<SeatInventory>,
    holds: Arc<HoldManager>,
    pricing: PriceCalculator,
    events: EventPublisher,
}

impl ReservationFinalizer {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        inventory: Arc<SeatInventory>,
        holds: Arc<HoldManager>,
        pricing: PriceCalculator,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            inventory,
            holds,
            pricing,
            events,
        }
    }

    pub async fn finalize(&self, hold_token: Uuid, user_id: &str) -> AppResult<Reservation> {
        self.finalize_at(hold_token, user_id, Utc::now()).await
    }

    /// Confirma la retención `hold_token` a nombre de `user_id`.
    ///
    /// # Errores
    /// - `HoldNotFound`: el token no existe o ya se usó/liberó
    /// - `HoldExpired`: la retención venció; nunca se crea reserva
    /// - `StorageFailure`: el almacenamiento falló dos veces seguidas; la retención se repone
    pub async fn finalize_at(
        &self,
        hold_token: Uuid,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::validation_field("user_id", "es requerido"));
        }

        let hold = self.holds.take(hold_token, now).await?;

        let reservation = match self.confirm(&hold, user_id, now).await {
            Ok(reservation) => reservation,
            Err(err) => {
                if let Err(reinstate_err) = self.holds.reinstate(hold, now).await {
                    tracing::error!(
                        token = %hold_token,
                        error = %reinstate_err,
                        "No se pudo reponer la retención"
                    );
                }
                return Err(err);
            }
        };

        self.inventory
            .promote(hold.showtime_id, &hold.seats, hold.token, reservation.id)
            .await?;

        tracing::info!(
            reservation_id = %reservation.id.to_hex(),
            user_id = %reservation.user_id,
            showtime_id = %reservation.showtime_id.to_hex(),
            seats = ?reservation.seats,
            total_price = reservation.total_price,
            "Reserva confirmada"
        );

        self.events.publish(ReservationEvent::ReservationConfirmed {
            reservation_id: reservation.id.to_hex(),
            user_id: reservation.user_id.clone(),
            showtime_id: reservation.showtime_id.to_hex(),
            seats: reservation.seats.clone(),
            total_price: reservation.total_price,
            qr_credential: reservation.qr_credential.clone(),
        });

        Ok(reservation)
    }

    async fn confirm(&self, hold: &Hold, user_id: &str, now: DateTime<Utc>) -> AppResult<Reservation> {
        let showtime = self
            .store
            .get_showtime(hold.showtime_id)
            .await?
            .ok_or_else(|| AppError::not_found_id("Sesión", &hold.showtime_id.to_hex()))?;

        let total_price = self.pricing.price(&showtime, hold.seats.len())?;
        let id = ObjectId::new();
        let status = ReservationStatus::Pending.transition(ReservationStatus::Confirmed)?;

        let reservation = Reservation {
            id,
            user_id: user_id.to_string(),
            showtime_id: hold.showtime_id,
            seats: hold.seats.clone(),
            total_price,
            qr_credential: credential::issue(id),
            is_validated: false,
            status,
            created_at: now.timestamp(),
            updated_at: now.timestamp(),
        };

        self.commit_with_retry(&reservation).await?;
        Ok(reservation)
    }

    /// Un fallo de almacenamiento se reintenta una vez; el resto de errores no
    async fn commit_with_retry(&self, reservation: &Reservation) -> AppResult<()> {
        match self.store.commit_reservation(reservation).await {
            Err(err) if err.is_storage_failure() => {
                tracing::warn!(
                    reservation_id = %reservation.id.to_hex(),
                    error = %err,
                    "Fallo de almacenamiento confirmando reserva, reintentando"
                );
                self.store.commit_reservation(reservation).await
            }
            other => other,
        }
    }

    /// Cancela una reserva confirmada y devuelve sus asientos. Cancelar una
    /// reserva ya cancelada devuelve la reserva sin cambios.
    pub async fn cancel(&self, reservation_id: ObjectId) -> AppResult<Reservation> {
        let reservation = self
            .store
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::not_found_id("Reserva", &reservation_id.to_hex()))?;

        if reservation.status == ReservationStatus::Cancelled {
            return Ok(reservation);
        }
        reservation.status.transition(ReservationStatus::Cancelled)?;

        let showtime = self
            .store
            .get_showtime(reservation.showtime_id)
            .await?
            .ok_or_else(|| AppError::not_found_id("Sesión", &reservation.showtime_id.to_hex()))?;
        let theater = self
            .store
            .get_theater(showtime.theater_id)
            .await?
            .ok_or_else(|| AppError::not_found_id("Sala", &showtime.theater_id.to_hex()))?;

        let (cancelled, changed) = self
            .store
            .cancel_reservation(reservation_id, theater.capacity)
            .await?
            .ok_or_else(|| AppError::not_found_id("Reserva", &reservation_id.to_hex()))?;

        // Otra cancelación simultánea ya la aplicó
        if !changed {
            return Ok(cancelled);
        }

        self.inventory
            .release(
                cancelled.showtime_id,
                &cancelled.seats,
                SeatClaim::Reservation(cancelled.id),
            )
            .await?;

        tracing::info!(
            reservation_id = %cancelled.id.to_hex(),
            seats = ?cancelled.seats,
            "Reserva cancelada"
        );

        self.events.publish(ReservationEvent::ReservationCancelled {
            reservation_id: cancelled.id.to_hex(),
            user_id: cancelled.user_id.clone(),
            showtime_id: cancelled.showtime_id.to_hex(),
            seats: cancelled.seats.clone(),
        });

        Ok(cancelled)
    }

    /// Valida una credencial QR en la entrada de la sala. Cada credencial vale una vez.
    pub async fn validate_credential(&self, credential: &str) -> AppResult<Reservation> {
        let credential = credential.trim();
        let reservation_id = credential::parse(credential)?;

        let mut reservation = self
            .store
            .get_reservation(reservation_id)
            .await?
            .filter(|r| r.qr_credential == credential)
            .ok_or_else(|| AppError::NotFound("Credencial QR desconocida".to_string()))?;

        if reservation.status != ReservationStatus::Confirmed {
            return Err(AppError::Validation(format!(
                "La reserva está {}",
                reservation.status.as_str()
            )));
        }
        if reservation.is_validated || !self.store.mark_validated(reservation_id).await? {
            return Err(AppError::Conflict("La credencial QR ya fue utilizada".to_string()));
        }

        reservation.is_validated = true;
        tracing::info!(reservation_id = %reservation_id.to_hex(), "Credencial QR validada");
        Ok(reservation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::inventory::tests::seed_showtime;
    use crate::config::HoldRules;
    use crate::db::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        inventory: Arc<SeatInventory>,
        holds: Arc<HoldManager>,
        finalizer: ReservationFinalizer,
        events: EventPublisher,
        showtime_id: ObjectId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 3).await;
        let inventory = Arc::new(SeatInventory::new(store.clone()));
        let holds = Arc::new(HoldManager::new(inventory.clone(), HoldRules::default()));
        let events = EventPublisher::new(16);
        let finalizer = ReservationFinalizer::new(
            store.clone(),
            inventory.clone(),
            holds.clone(),
            PriceCalculator::default(),
            events.clone(),
        );
        Fixture {
            store,
            inventory,
            holds,
            finalizer,
            events,
            showtime_id,
        }
    }

    fn seats(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|s| s.to_string()).collect()
    }

    async fn available_count(f: &Fixture) -> i32 {
        f.store.get_showtime(f.showtime_id).await.unwrap().unwrap().available_seats
    }

    #[tokio::test]
    async fn finalize_confirms_prices_and_decrements() {
        let f = fixture().await;
        let mut rx = f.events.subscribe();
        let hold = f
            .holds
            .create_hold(f.showtime_id, &seats(&["A1", "A2", "A3"]), None)
            .await
            .unwrap();

        let reservation = f.finalizer.finalize(hold.token, "user-42").await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
        // (10.00 + 2.00) * 3
        assert_eq!(reservation.total_price, 3600);
        assert_eq!(credential::parse(&reservation.qr_credential).unwrap(), reservation.id);
        assert_eq!(available_count(&f).await, 27);
        assert_eq!(f.holds.active_count(), 0);

        let map = f.inventory.list_available(f.showtime_id).await.unwrap();
        assert!(!map.contains(&"A1".to_string()));

        match rx.recv().await.unwrap() {
            ReservationEvent::ReservationConfirmed { reservation_id, .. } => {
                assert_eq!(reservation_id, reservation.id.to_hex())
            }
            other => panic!("evento inesperado: {:?}", other),
        }

        // El token ya se consumió
        let err = f.finalizer.finalize(hold.token, "user-42").await.unwrap_err();
        assert!(matches!(err, AppError::HoldNotFound(_)));
    }

    #[tokio::test]
    async fn expired_hold_never_becomes_a_reservation() {
        let f = fixture().await;
        let hold = f
            .holds
            .create_hold(f.showtime_id, &seats(&["B1"]), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        let later = hold.expires_at + chrono::Duration::seconds(1);
        let err = f.finalizer.finalize_at(hold.token, "user-1", later).await.unwrap_err();
        assert!(matches!(err, AppError::HoldExpired(_)));
        assert!(f.store.list_user_reservations("user-1").await.unwrap().is_empty());
        assert_eq!(available_count(&f).await, 30);

        // Tras el barrido sigue siendo HoldExpired
        let hold = f
            .holds
            .create_hold(f.showtime_id, &seats(&["B2"]), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        let later = hold.expires_at + chrono::Duration::seconds(1);
        f.holds.sweep_expired(later).await.unwrap();
        let err = f.finalizer.finalize_at(hold.token, "user-1", later).await.unwrap_err();
        assert!(matches!(err, AppError::HoldExpired(_)));
    }

    #[tokio::test]
    async fn unknown_token_is_hold_not_found() {
        let f = fixture().await;
        let err = f.finalizer.finalize(Uuid::new_v4(), "user-1").await.unwrap_err();
        assert!(matches!(err, AppError::HoldNotFound(_)));
    }

    #[tokio::test]
    async fn single_storage_failure_is_retried() {
        let f = fixture().await;
        let hold = f.holds.create_hold(f.showtime_id, &seats(&["C1"]), None).await.unwrap();

        f.store.fail_next_commits(1);
        let reservation = f.finalizer.finalize(hold.token, "user-7").await.unwrap();
        assert_eq!(reservation.seats, seats(&["C1"]));
        assert_eq!(available_count(&f).await, 29);
    }

    #[tokio::test]
    async fn persistent_storage_failure_leaves_no_partial_state() {
        let f = fixture().await;
        let hold = f.holds.create_hold(f.showtime_id, &seats(&["C2"]), None).await.unwrap();

        f.store.fail_next_commits(2);
        let err = f.finalizer.finalize(hold.token, "user-7").await.unwrap_err();
        assert!(err.is_storage_failure());
        assert!(f.store.list_user_reservations("user-7").await.unwrap().is_empty());
        assert_eq!(available_count(&f).await, 30);

        // La retención se repuso y se puede volver a intentar
        assert!(f.holds.get(hold.token, Utc::now()).is_ok());
        let reservation = f.finalizer.finalize(hold.token, "user-7").await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
    }

    #[tokio::test]
    async fn cancel_returns_seats_and_is_idempotent() {
        let f = fixture().await;
        let hold = f.holds.create_hold(f.showtime_id, &seats(&["A5", "A6"]), None).await.unwrap();
        let reservation = f.finalizer.finalize(hold.token, "user-3").await.unwrap();
        assert_eq!(available_count(&f).await, 28);

        let cancelled = f.finalizer.cancel(reservation.id).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(available_count(&f).await, 30);
        assert!(f.inventory.list_available(f.showtime_id).await.unwrap().contains(&"A5".to_string()));

        let again = f.finalizer.cancel(reservation.id).await.unwrap();
        assert_eq!(again.status, ReservationStatus::Cancelled);
        assert_eq!(available_count(&f).await, 30);

        // Los asientos liberados se pueden volver a retener
        assert!(f.holds.create_hold(f.showtime_id, &seats(&["A5"]), None).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancels_publish_one_event() {
        let f = Arc::new(fixture().await);
        let hold = f.holds.create_hold(f.showtime_id, &seats(&["C1", "C2"]), None).await.unwrap();
        let reservation = f.finalizer.finalize(hold.token, "user-5").await.unwrap();
        let mut rx = f.events.subscribe();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let f = f.clone();
            let id = reservation.id;
            tasks.push(tokio::spawn(async move { f.finalizer.cancel(id).await }));
        }
        for task in tasks {
            let cancelled = task.await.unwrap().unwrap();
            assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        }

        let mut cancellations = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ReservationEvent::ReservationCancelled { .. }) {
                cancellations += 1;
            }
        }
        assert_eq!(cancellations, 1);
        assert_eq!(available_count(&f).await, 30);
    }

    #[tokio::test]
    async fn credential_validates_once() {
        let f = fixture().await;
        let hold = f.holds.create_hold(f.showtime_id, &seats(&["B7"]), None).await.unwrap();
        let reservation = f.finalizer.finalize(hold.token, "user-9").await.unwrap();

        let validated = f.finalizer.validate_credential(&reservation.qr_credential).await.unwrap();
        assert!(validated.is_validated);

        let err = f
            .finalizer
            .validate_credential(&reservation.qr_credential)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let forged = credential::issue(reservation.id);
        assert!(matches!(
            f.finalizer.validate_credential(&forged).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_reservation_credential_is_rejected() {
        let f = fixture().await;
        let hold = f.holds.create_hold(f.showtime_id, &seats(&["B8"]), None).await.unwrap();
        let reservation = f.finalizer.finalize(hold.token, "user-9").await.unwrap();
        f.finalizer.cancel(reservation.id).await.unwrap();

        let err = f
            .finalizer
            .validate_credential(&reservation.qr_credential)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn available_seats_stay_within_capacity_under_load() {
        let f = Arc::new(fixture().await);

        let mut tasks = Vec::new();
        for i in 0..20 {
            let f = f.clone();
            tasks.push(tokio::spawn(async move {
                // Pares de asientos solapados: A1+A2, A2+A3, ...
                let row = if i < 10 { 'A' } else { 'B' };
                let first = (i % 9) + 1;
                let wanted = vec![format!("{}{}", row, first), format!("{}{}", row, first + 1)];
                let hold = f.holds.create_hold(f.showtime_id, &wanted, None).await.ok()?;
                f.finalizer.finalize(hold.token, &format!("user-{}", i)).await.ok()
            }));
        }

        let mut booked = Vec::new();
        for task in tasks {
            if let Some(reservation) = task.await.unwrap() {
                booked.extend(reservation.seats);
            }
        }

        let available = available_count(&f).await;
        assert!(available >= 0 && available <= 30);
        assert_eq!(available, 30 - booked.len() as i32);

        let mut unique = booked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), booked.len());
    }
}
