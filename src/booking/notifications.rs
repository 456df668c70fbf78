//! Eventos de reserva para el servicio de notificaciones
//!
//! Se publican en un canal broadcast en proceso. El envío real del email con
//! el QR lo hace un servicio externo; el listener de aquí registra la entrega.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReservationEvent {
    ReservationConfirmed {
        reservation_id: String,
        user_id: String,
        showtime_id: String,
        seats: Vec<String>,
        total_price: i64,
        qr_credential: String,
    },
    ReservationCancelled {
        reservation_id: String,
        user_id: String,
        showtime_id: String,
        seats: Vec<String>,
    },
}

#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<ReservationEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.tx.subscribe()
    }

    /// Publica sin bloquear. Sin suscriptores el evento se descarta.
    pub fn publish(&self, event: ReservationEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Evento de reserva sin suscriptores");
        }
    }
}

/// Consume los eventos y los entrega al servicio de notificaciones
pub fn spawn_listener(mut rx: broadcast::Receiver<ReservationEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => tracing::info!(payload = %payload, "Notificación encolada"),
                    Err(e) => tracing::warn!(error = %e, "Error serializando evento"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Listener de notificaciones retrasado");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Listener de notificaciones detenido");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();

        let event = ReservationEvent::ReservationCancelled {
            reservation_id: "r1".to_string(),
            user_id: "u1".to_string(),
            showtime_id: "s1".to_string(),
            seats: vec!["A1".to_string()],
        };
        publisher.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn events_are_tagged_by_type() {
        let event = ReservationEvent::ReservationCancelled {
            reservation_id: "r1".to_string(),
            user_id: "u1".to_string(),
            showtime_id: "s1".to_string(),
            seats: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reservation_cancelled");
    }

    #[tokio::test]
    async fn listener_stops_when_channel_closes() {
        let publisher = EventPublisher::new(8);
        let handle = spawn_listener(publisher.subscribe());
        drop(publisher);
        handle.await.unwrap();
    }
}
