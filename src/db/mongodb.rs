use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, ClientSession, Collection, Cursor, Database};
use serde::de::DeserializeOwned;
use crate::api::AppError;
use super::models::{Movie, Reservation, ReservationStatus, Seat, Showtime, Theater};
use super::store::ReservationStore;

pub type Result<T> = std::result::Result<T, AppError>;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Clone)]
pub struct MongoRepo {
    pub client: Client,
    pub database: Database,
}

impl MongoRepo {
    pub async fn init(mongo_uri: &str, database_name: &str) -> Result<MongoRepo> {
        let client = Client::with_uri_str(mongo_uri)
            .await
            .map_err(|e| AppError::storage("connect", e))?;

        let database = client.database(database_name);

        // Test connection
        database
            .run_command(doc! {"ping": 1})
            .await
            .map_err(|e| AppError::storage("ping", e))?;

        tracing::info!(database = %database_name, "Conexión a MongoDB establecida exitosamente");

        Ok(MongoRepo { client, database })
    }

    pub fn movies(&self) -> Collection<Movie> {
        self.database.collection("movies")
    }

    pub fn theaters(&self) -> Collection<Theater> {
        self.database.collection("theaters")
    }

    pub fn seats(&self) -> Collection<Seat> {
        self.database.collection("seats")
    }

    pub fn showtimes(&self) -> Collection<Showtime> {
        self.database.collection("showtimes")
    }

    pub fn reservations(&self) -> Collection<Reservation> {
        self.database.collection("reservations")
    }

    // Método para crear índices si es necesario
    pub async fn create_indexes(&self) -> Result<()> {
        use mongodb::{options::IndexOptions, IndexModel};

        // Un número de asiento es único dentro de su sala
        self.seats()
            .create_indexes(vec![IndexModel::builder()
                .keys(doc! { "theater_id": 1, "seat_number": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()])
            .await
            .map_err(|e| AppError::storage("create_indexes_seats", e))?;

        self.showtimes()
            .create_indexes(vec![
                IndexModel::builder()
                    .keys(doc! { "theater_id": 1, "start_time": 1 })
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "movie_id": 1 })
                    .build(),
            ])
            .await
            .map_err(|e| AppError::storage("create_indexes_showtimes", e))?;

        // Índice multiclave: dos reservas confirmadas no pueden compartir asiento
        let reservation_indexes = vec![
            IndexModel::builder()
                .keys(doc! { "showtime_id": 1, "seats": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "status": "confirmed" })
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "user_id": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "qr_credential": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        ];

        self.reservations()
            .create_indexes(reservation_indexes)
            .await
            .map_err(|e| AppError::storage("create_indexes_reservations", e))?;

        tracing::info!("Índices MongoDB creados exitosamente");
        Ok(())
    }

    // Función auxiliar para obtener timestamp actual
    pub fn current_timestamp() -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn collect<T>(mut cursor: Cursor<T>, operation: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        let mut results = Vec::new();
        while cursor.advance().await.map_err(|e| AppError::storage(operation, e))? {
            let item = cursor
                .deserialize_current()
                .map_err(|e| AppError::storage(operation, e))?;
            results.push(item);
        }
        Ok(results)
    }

    async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| AppError::storage("start_session", e))?;
        session
            .start_transaction()
            .await
            .map_err(|e| AppError::storage("start_transaction", e))?;
        Ok(session)
    }

    /// Confirma la transacción si `outcome` es Ok, si no la aborta y devuelve el error original
    async fn finish_transaction<T>(session: &mut ClientSession, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| AppError::storage("commit_transaction", e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::warn!(error = %abort, "Error abortando transacción");
                }
                Err(err)
            }
        }
    }

    async fn write_theater(
        &self,
        session: &mut ClientSession,
        theater: &Theater,
        seats: &[Seat],
    ) -> Result<()> {
        self.theaters()
            .insert_one(theater)
            .session(&mut *session)
            .await
            .map_err(|e| AppError::storage("insert_theater", e))?;

        if !seats.is_empty() {
            self.seats()
                .insert_many(seats)
                .session(&mut *session)
                .await
                .map_err(|e| AppError::storage("insert_seats", e))?;
        }
        Ok(())
    }

    async fn write_reservation(
        &self,
        session: &mut ClientSession,
        reservation: &Reservation,
    ) -> Result<()> {
        let count = reservation.seats.len() as i32;

        // Descontar solo si quedan asientos suficientes: nunca por debajo de cero
        let decremented = self
            .showtimes()
            .update_one(
                doc! {
                    "_id": reservation.showtime_id,
                    "available_seats": { "$gte": count }
                },
                doc! { "$inc": { "available_seats": -count } },
            )
            .session(&mut *session)
            .await
            .map_err(|e| AppError::storage("decrement_available_seats", e))?;

        if decremented.modified_count == 0 {
            return Err(AppError::Conflict(
                "La sesión no tiene asientos disponibles suficientes".to_string(),
            ));
        }

        self.reservations()
            .insert_one(reservation)
            .session(&mut *session)
            .await
            .map_err(|e| map_duplicate(e, "insert_reservation", "Algún asiento ya pertenece a otra reserva"))?;

        Ok(())
    }

    async fn write_cancellation(
        &self,
        session: &mut ClientSession,
        id: ObjectId,
        capacity: i32,
    ) -> Result<Option<(Reservation, bool)>> {
        let cancelled = self
            .reservations()
            .find_one_and_update(
                doc! { "_id": id, "status": ReservationStatus::Confirmed.as_str() },
                doc! {
                    "$set": {
                        "status": ReservationStatus::Cancelled.as_str(),
                        "updated_at": MongoRepo::current_timestamp()
                    }
                },
            )
            .return_document(ReturnDocument::After)
            .session(&mut *session)
            .await
            .map_err(|e| AppError::storage("cancel_reservation", e))?;

        let reservation = match cancelled {
            Some(reservation) => reservation,
            // Ya cancelada o inexistente: devolver el estado actual sin tocar nada
            None => {
                let current = self
                    .reservations()
                    .find_one(doc! { "_id": id })
                    .session(&mut *session)
                    .await
                    .map_err(|e| AppError::storage("get_reservation", e))?;
                return Ok(current.map(|reservation| (reservation, false)));
            }
        };

        let count = reservation.seats.len() as i32;
        let restored = self
            .showtimes()
            .update_one(
                doc! {
                    "_id": reservation.showtime_id,
                    "available_seats": { "$lte": capacity - count }
                },
                doc! { "$inc": { "available_seats": count } },
            )
            .session(&mut *session)
            .await
            .map_err(|e| AppError::storage("restore_available_seats", e))?;

        if restored.modified_count == 0 {
            return Err(AppError::Conflict(
                "Los asientos disponibles superarían la capacidad de la sala".to_string(),
            ));
        }

        Ok(Some((reservation, true)))
    }
}

/// Traduce las violaciones de índice único a `Conflict`
fn map_duplicate(error: mongodb::error::Error, operation: &str, message: &str) -> AppError {
    let duplicate = matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    );

    if duplicate {
        AppError::Conflict(message.to_string())
    } else {
        AppError::storage(operation, error)
    }
}

#[async_trait]
impl ReservationStore for MongoRepo {
    async fn insert_movie(&self, movie: Movie) -> Result<ObjectId> {
        let result = self
            .movies()
            .insert_one(movie)
            .await
            .map_err(|e| AppError::storage("insert_movie", e))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::Internal("ID de película no generado".to_string()))
    }

    async fn get_movie(&self, id: ObjectId) -> Result<Option<Movie>> {
        self.movies()
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::storage("get_movie", e))
    }

    async fn list_movies(&self) -> Result<Vec<Movie>> {
        let cursor = self
            .movies()
            .find(Document::new())
            .sort(doc! { "title": 1 })
            .await
            .map_err(|e| AppError::storage("list_movies", e))?;
        Self::collect(cursor, "list_movies").await
    }

    async fn insert_theater(&self, theater: &Theater, seats: &[Seat]) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = self.write_theater(&mut session, theater, seats).await;
        Self::finish_transaction(&mut session, outcome).await
    }

    async fn get_theater(&self, id: ObjectId) -> Result<Option<Theater>> {
        self.theaters()
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::storage("get_theater", e))
    }

    async fn list_seats(&self, theater_id: ObjectId) -> Result<Vec<Seat>> {
        let cursor = self
            .seats()
            .find(doc! { "theater_id": theater_id })
            .await
            .map_err(|e| AppError::storage("list_seats", e))?;
        Self::collect(cursor, "list_seats").await
    }

    async fn insert_showtime(&self, showtime: Showtime) -> Result<ObjectId> {
        let result = self
            .showtimes()
            .insert_one(showtime)
            .await
            .map_err(|e| AppError::storage("insert_showtime", e))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::Internal("ID de sesión no generado".to_string()))
    }

    async fn get_showtime(&self, id: ObjectId) -> Result<Option<Showtime>> {
        self.showtimes()
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::storage("get_showtime", e))
    }

    async fn confirmed_reservations(&self, showtime_id: ObjectId) -> Result<Vec<Reservation>> {
        let cursor = self
            .reservations()
            .find(doc! {
                "showtime_id": showtime_id,
                "status": ReservationStatus::Confirmed.as_str()
            })
            .await
            .map_err(|e| AppError::storage("confirmed_reservations", e))?;
        Self::collect(cursor, "confirmed_reservations").await
    }

    async fn commit_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut session = self.start_transaction().await?;
        let outcome = self.write_reservation(&mut session, reservation).await;
        Self::finish_transaction(&mut session, outcome).await
    }

    async fn get_reservation(&self, id: ObjectId) -> Result<Option<Reservation>> {
        self.reservations()
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::storage("get_reservation", e))
    }

    async fn list_user_reservations(&self, user_id: &str) -> Result<Vec<Reservation>> {
        let cursor = self
            .reservations()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|e| AppError::storage("list_user_reservations", e))?;
        Self::collect(cursor, "list_user_reservations").await
    }

    async fn cancel_reservation(
        &self,
        id: ObjectId,
        capacity: i32,
    ) -> Result<Option<(Reservation, bool)>> {
        let mut session = self.start_transaction().await?;
        let outcome = self.write_cancellation(&mut session, id, capacity).await;
        Self::finish_transaction(&mut session, outcome).await
    }

    async fn mark_validated(&self, id: ObjectId) -> Result<bool> {
        let result = self
            .reservations()
            .update_one(
                doc! {
                    "_id": id,
                    "status": ReservationStatus::Confirmed.as_str(),
                    "is_validated": false
                },
                doc! {
                    "$set": {
                        "is_validated": true,
                        "updated_at": MongoRepo::current_timestamp()
                    }
                },
            )
            .await
            .map_err(|e| AppError::storage("mark_validated", e))?;

        Ok(result.modified_count == 1)
    }
}
