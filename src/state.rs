use std::sync::Arc;
use crate::booking::{
    EventPublisher, HoldManager, PriceCalculator, ReservationFinalizer, SeatInventory,
};
use crate::config::HoldRules;
use crate::db::ReservationStore;

/// Manejadores compartidos por todas las peticiones
///
/// Se construye una vez en el arranque y se inyecta con `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReservationStore>,
    pub inventory: Arc<SeatInventory>,
    pub holds: Arc<HoldManager>,
    pub finalizer: Arc<ReservationFinalizer>,
    pub events: EventPublisher,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        hold_rules: HoldRules,
        promotion_percent_off: u32,
    ) -> Self {
        let inventory = Arc::new(SeatInventory::new(store.clone()));
        let holds = Arc::new(HoldManager::new(inventory.clone(), hold_rules));
        let events = EventPublisher::new(256);
        let finalizer = Arc::new(ReservationFinalizer::new(
            store.clone(),
            inventory.clone(),
            holds.clone(),
            PriceCalculator::new(promotion_percent_off),
            events.clone(),
        ));

        Self {
            store,
            inventory,
            holds,
            finalizer,
            events,
        }
    }
}
