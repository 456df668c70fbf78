use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use super::holds::HoldManager;

/// Lanza el barrido periódico de retenciones vencidas.
///
/// Corre independiente de las peticiones; un fallo en una pasada se registra
/// y la siguiente lo vuelve a intentar.
pub fn spawn_hold_sweeper(holds: Arc<HoldManager>) -> JoinHandle<()> {
    spawn_with_clock(holds, Utc::now)
}

fn spawn_with_clock<C>(holds: Arc<HoldManager>, clock: C) -> JoinHandle<()>
where
    C: Fn() -> DateTime<Utc> + Send + 'static,
{
    let period = holds.rules().sweep_interval;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match holds.sweep_expired(clock()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "Retenciones vencidas liberadas"),
                Err(e) => tracing::error!(error = %e, "Error en el barrido de retenciones"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::inventory::tests::seed_showtime;
    use crate::booking::SeatInventory;
    use crate::config::HoldRules;
    use crate::db::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn sweeper_runs_in_background() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 1).await;
        let inventory = Arc::new(SeatInventory::new(store));
        let rules = HoldRules {
            sweep_interval: Duration::from_millis(10),
            ..HoldRules::default()
        };
        let holds = Arc::new(HoldManager::new(inventory, rules));

        holds
            .create_hold(showtime_id, &["A1".to_string()], None)
            .await
            .unwrap();

        let handle = spawn_hold_sweeper(holds.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Varias pasadas sin tocar una retención vigente
        assert_eq!(holds.active_count(), 1);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn sweeper_frees_expired_holds() {
        let store = Arc::new(MemoryStore::new());
        let showtime_id = seed_showtime(&store, 1).await;
        let inventory = Arc::new(SeatInventory::new(store));
        let rules = HoldRules {
            sweep_interval: Duration::from_millis(10),
            ..HoldRules::default()
        };
        let holds = Arc::new(HoldManager::new(inventory.clone(), rules));

        let hold = holds
            .create_hold(showtime_id, &["A1".to_string(), "A2".to_string()], None)
            .await
            .unwrap();
        assert_eq!(inventory.list_available(showtime_id).await.unwrap().len(), 8);

        // Reloj adelantado más allá del TTL de la retención
        let handle = spawn_with_clock(holds.clone(), || Utc::now() + chrono::Duration::hours(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(holds.active_count(), 0);
        assert_eq!(inventory.list_available(showtime_id).await.unwrap().len(), 10);
        assert!(matches!(
            holds.get(hold.token, Utc::now()),
            Err(crate::api::AppError::HoldExpired(_))
        ));
    }
}
