//! Retenciones temporales de asientos
//!
//! Una retención bloquea un conjunto de asientos mientras el cliente completa
//! la compra. Vive solo en memoria y caduca con su TTL; el barrido en segundo
//! plano devuelve sus asientos al inventario.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;
use crate::api::{AppError, AppResult};
use crate::config::{HoldRules, MIN_HOLD_TTL_SECS};
use crate::db::models::normalize_seat_number;
use super::inventory::{SeatClaim, SeatInventory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hold {
    pub token: Uuid,
    pub showtime_id: ObjectId,
    pub seats: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    fn claim(&self) -> SeatClaim {
        SeatClaim::Hold(self.token)
    }
}

pub struct HoldManager {
    inventory: Arc<SeatInventory>,
    rules: HoldRules,
    holds: Mutex<HashMap<Uuid, Hold>>,
    // token -> momento en que el barrido la retiró
    expired: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl HoldManager {
    pub fn new(inventory: Arc<SeatInventory>, rules: HoldRules) -> Self {
        Self {
            inventory,
            rules,
            holds: Mutex::new(HashMap::new()),
            expired: Mutex::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &HoldRules {
        &self.rules
    }

    /// Crea una retención sobre todos los asientos pedidos.
    ///
    /// La comprobación de disponibilidad y el registro son atómicos: si algún
    /// asiento no está libre no se retiene ninguno.
    ///
    /// # Errores
    /// - `Validation`: lista vacía, repetida, demasiado larga o TTL fuera de rango
    /// - `NotFoundWithId`: la sesión no existe
    /// - `Conflict`: algún asiento ya está retenido, reservado o fuera de servicio
    pub async fn create_hold(
        &self,
        showtime_id: ObjectId,
        seat_numbers: &[String],
        ttl: Option<Duration>,
    ) -> AppResult<Hold> {
        let seats = self.validate_seats(seat_numbers)?;
        let ttl = self.validate_ttl(ttl)?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| AppError::validation_field("ttl_seconds", "fuera de rango"))?;

        let token = Uuid::new_v4();
        self.inventory
            .reserve(showtime_id, &seats, SeatClaim::Hold(token))
            .await
            .map_err(|err| match err {
                AppError::SeatUnavailable { seats } => AppError::Conflict(format!(
                    "Asientos no disponibles: {}",
                    seats.join(", ")
                )),
                other => other,
            })?;

        let now = Utc::now();
        let hold = Hold {
            token,
            showtime_id,
            seats,
            created_at: now,
            expires_at: now + ttl,
        };
        self.holds().insert(token, hold.clone());

        tracing::info!(
            token = %token,
            showtime_id = %showtime_id.to_hex(),
            seats = ?hold.seats,
            expires_at = %hold.expires_at,
            "Retención creada"
        );
        Ok(hold)
    }

    /// Devuelve una retención vigente
    pub fn get(&self, token: Uuid, now: DateTime<Utc>) -> AppResult<Hold> {
        match self.holds().get(&token) {
            Some(hold) if hold.is_expired_at(now) => Err(AppError::HoldExpired(token.to_string())),
            Some(hold) => Ok(hold.clone()),
            None => Err(self.missing(token)),
        }
    }

    /// Libera una retención y sus asientos.
    ///
    /// Liberar una retención que ya no existe no es un error: devuelve `false`.
    pub async fn release_hold(&self, token: Uuid) -> AppResult<bool> {
        let removed = self.holds().remove(&token);
        match removed {
            Some(hold) => {
                self.inventory
                    .release(hold.showtime_id, &hold.seats, hold.claim())
                    .await?;
                tracing::info!(token = %token, "Retención liberada");
                Ok(true)
            }
            None => {
                tracing::debug!(token = %token, "Retención ya liberada");
                Ok(false)
            }
        }
    }

    /// Retira la retención para confirmarla. Mientras esté retirada el barrido
    /// no puede liberarla y los asientos siguen bloqueados a su nombre.
    pub async fn take(&self, token: Uuid, now: DateTime<Utc>) -> AppResult<Hold> {
        let taken = self.holds().remove(&token);
        let hold = taken.ok_or_else(|| self.missing(token))?;

        if hold.is_expired_at(now) {
            self.retire_expired(vec![hold], now).await?;
            return Err(AppError::HoldExpired(token.to_string()));
        }
        Ok(hold)
    }

    /// Devuelve una retención retirada con `take` si la confirmación no prosperó
    pub async fn reinstate(&self, hold: Hold, now: DateTime<Utc>) -> AppResult<()> {
        if hold.is_expired_at(now) {
            return self.retire_expired(vec![hold], now).await;
        }
        self.holds().insert(hold.token, hold);
        Ok(())
    }

    /// Libera todas las retenciones vencidas. Devuelve cuántas se retiraron.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let expired: Vec<Hold> = {
            let mut holds = self.holds();
            let tokens: Vec<Uuid> = holds
                .values()
                .filter(|hold| hold.is_expired_at(now))
                .map(|hold| hold.token)
                .collect();
            tokens.iter().filter_map(|token| holds.remove(token)).collect()
        };

        let retention = chrono::Duration::from_std(self.rules.expired_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        self.expired_tokens()
            .retain(|_, retired_at| *retired_at + retention > now);

        let count = expired.len();
        self.retire_expired(expired, now).await?;
        Ok(count)
    }

    pub fn active_count(&self) -> usize {
        self.holds().len()
    }

    async fn retire_expired(&self, expired: Vec<Hold>, now: DateTime<Utc>) -> AppResult<()> {
        {
            let mut tombstones = self.expired_tokens();
            for hold in &expired {
                tombstones.insert(hold.token, now);
            }
        }
        for hold in expired {
            self.inventory
                .release(hold.showtime_id, &hold.seats, hold.claim())
                .await?;
            tracing::info!(
                token = %hold.token,
                showtime_id = %hold.showtime_id.to_hex(),
                seats = ?hold.seats,
                "Retención expirada, asientos devueltos"
            );
        }
        Ok(())
    }

    fn missing(&self, token: Uuid) -> AppError {
        if self.expired_tokens().contains_key(&token) {
            AppError::HoldExpired(token.to_string())
        } else {
            AppError::HoldNotFound(token.to_string())
        }
    }

    fn validate_seats(&self, seat_numbers: &[String]) -> AppResult<Vec<String>> {
        if seat_numbers.is_empty() {
            return Err(AppError::validation_field("seats", "debe contener al menos un asiento"));
        }
        if seat_numbers.len() > self.rules.max_seats {
            return Err(AppError::validation_field(
                "seats",
                &format!("máximo {} asientos por retención", self.rules.max_seats),
            ));
        }

        let seats: Vec<String> = seat_numbers.iter().map(|s| normalize_seat_number(s)).collect();
        if seats.iter().any(String::is_empty) {
            return Err(AppError::validation_field("seats", "número de asiento vacío"));
        }
        let unique: HashSet<&String> = seats.iter().collect();
        if unique.len() != seats.len() {
            return Err(AppError::validation_field("seats", "asientos repetidos"));
        }
        Ok(seats)
    }

    fn validate_ttl(&self, ttl: Option<Duration>) -> AppResult<Duration> {
        let ttl = ttl.unwrap_or(self.rules.default_ttl);
        if ttl.as_secs() < MIN_HOLD_TTL_SECS || ttl > self.rules.max_ttl {
            return Err(AppError::validation_field(
                "ttl_seconds",
                &format!(
                    "debe estar entre {} y {} segundos",
                    MIN_HOLD_TTL_SECS,
                    self.rules.max_ttl.as_secs()
                ),
            ));
        }
        Ok(ttl)
    }

    fn holds(&self) -> MutexGuard<'_, HashMap<Uuid, Hold>> {
        self.holds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired_tokens(&self) -> MutexGuard<'_, HashMap<Uuid, DateTime<Utc>>> {
        self.expired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::inventory::tests::seed_showtime;
    use crate::db::MemoryStore;
    use tokio_test::assert_ok;

    async fn manager() -> (Arc<HoldManager>, Arc<SeatInventory>, ObjectId) {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 3).await;
        let inventory = Arc::new(SeatInventory::new(store));
        let holds = Arc::new(HoldManager::new(inventory.clone(), HoldRules::default()));
        (holds, inventory, showtime_id)
    }

    fn seats(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn hold_blocks_seats_until_released() {
        let (holds, inventory, showtime_id) = manager().await;

        let hold = holds.create_hold(showtime_id, &seats(&["a1", " A2 "]), None).await.unwrap();
        assert_eq!(hold.seats, seats(&["A1", "A2"]));
        assert_eq!(inventory.list_available(showtime_id).await.unwrap().len(), 27);

        assert!(holds.release_hold(hold.token).await.unwrap());
        assert_eq!(inventory.list_available(showtime_id).await.unwrap().len(), 29);
    }

    #[tokio::test]
    async fn releasing_twice_is_a_no_op() {
        let (holds, _, showtime_id) = manager().await;
        let hold = holds.create_hold(showtime_id, &seats(&["B1"]), None).await.unwrap();

        assert_ok!(holds.release_hold(hold.token).await);
        assert!(!holds.release_hold(hold.token).await.unwrap());
        assert!(!holds.release_hold(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn overlapping_hold_conflicts_without_partial_claim() {
        let (holds, inventory, showtime_id) = manager().await;
        holds.create_hold(showtime_id, &seats(&["A1", "A2"]), None).await.unwrap();

        let err = holds
            .create_hold(showtime_id, &seats(&["A2", "A3"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(inventory.list_available(showtime_id).await.unwrap().contains(&"A3".to_string()));
        assert_eq!(holds.active_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_overlapping_holds_exactly_one_wins() {
        let (holds, _, showtime_id) = manager().await;

        let mut tasks = Vec::new();
        for i in 0..16 {
            let holds = holds.clone();
            // Todos piden B5 más un asiento propio
            let own = format!("C{}", (i % 9) + 1);
            tasks.push(tokio::spawn(async move {
                holds
                    .create_hold(showtime_id, &[String::from("B5"), own], None)
                    .await
            }));
        }

        let mut won = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::Conflict(_)) => {}
                Err(other) => panic!("error inesperado: {other}"),
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn validates_requested_seats_and_ttl() {
        let (holds, _, showtime_id) = manager().await;

        assert!(holds.create_hold(showtime_id, &[], None).await.is_err());
        assert!(holds.create_hold(showtime_id, &seats(&["A1", "a1"]), None).await.is_err());
        let too_many: Vec<String> = (1..=11).map(|n| format!("A{}", n)).collect();
        assert!(holds.create_hold(showtime_id, &too_many, None).await.is_err());
        assert!(holds
            .create_hold(showtime_id, &seats(&["A1"]), Some(Duration::from_secs(5)))
            .await
            .is_err());
        assert!(holds
            .create_hold(showtime_id, &seats(&["A1"]), Some(Duration::from_secs(7200)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn unknown_showtime_is_not_found() {
        let (holds, _, _) = manager().await;
        let err = holds
            .create_hold(ObjectId::new(), &seats(&["A1"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFoundWithId { .. }));
    }

    #[tokio::test]
    async fn sweep_returns_expired_seats_and_remembers_token() {
        let (holds, inventory, showtime_id) = manager().await;
        let hold = holds
            .create_hold(showtime_id, &seats(&["A1"]), Some(Duration::from_secs(30)))
            .await
            .unwrap();
        let keep = holds
            .create_hold(showtime_id, &seats(&["A2"]), Some(Duration::from_secs(600)))
            .await
            .unwrap();

        let later = hold.expires_at + chrono::Duration::seconds(1);
        assert_eq!(holds.sweep_expired(later).await.unwrap(), 1);
        assert_eq!(holds.active_count(), 1);
        assert!(inventory.list_available(showtime_id).await.unwrap().contains(&"A1".to_string()));

        assert!(matches!(holds.get(hold.token, later), Err(AppError::HoldExpired(_))));
        assert!(holds.get(keep.token, later).is_ok());

        // Pasada la retención del tombstone, el token deja de conocerse
        let much_later = later + chrono::Duration::hours(2);
        holds.sweep_expired(much_later).await.unwrap();
        assert!(matches!(holds.get(hold.token, much_later), Err(AppError::HoldNotFound(_))));
    }

    #[tokio::test]
    async fn take_of_expired_hold_fails_and_frees_seats() {
        let (holds, inventory, showtime_id) = manager().await;
        let hold = holds
            .create_hold(showtime_id, &seats(&["B2"]), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        let later = hold.expires_at + chrono::Duration::seconds(1);
        let err = holds.take(hold.token, later).await.unwrap_err();
        assert!(matches!(err, AppError::HoldExpired(_)));
        assert!(inventory.list_available(showtime_id).await.unwrap().contains(&"B2".to_string()));
        assert!(matches!(holds.take(hold.token, later).await, Err(AppError::HoldExpired(_))));
    }
}
