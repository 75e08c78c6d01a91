use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use tuck_core::{RecordStore, StoreError, StoreResult};
use tuck_shared::{Booking, BookingFilter, DriverPresence};

const BOOKING_INDEX: &str = "bookings:index";

fn booking_key(booking_id: &str) -> String {
    format!("booking:{}", booking_id)
}

fn presence_key(driver_id: &str) -> String {
    format!("driver:{}:presence", driver_id)
}

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|source| StoreError::Corrupt { key: key.to_string(), source })
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|source| StoreError::Corrupt { key: key.to_string(), source })
}

/// Record store backed by Redis, one JSON document per record.
///
/// Keys: `booking:{id}`, `driver:{id}:presence`, plus the `bookings:index` set of booking ids.
/// Transition commits go through `MULTI`/`EXEC` so the booking and presence land together.
#[derive(Clone)]
pub struct RedisRecordStore {
    conn: MultiplexedConnection,
}

impl RedisRecordStore {
    pub async fn connect(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to redis record store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn load_booking(&self, booking_id: &str) -> StoreResult<Option<Booking>> {
        let key = booking_key(booking_id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(unavailable)?;
        raw.map(|raw| decode(&key, &raw)).transpose()
    }

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()> {
        let key = booking_key(&booking.id);
        let json = encode(&key, booking)?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(&key, json)
            .ignore()
            .sadd(BOOKING_INDEX, &booking.id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn load_driver_presence(&self, driver_id: &str) -> StoreResult<Option<DriverPresence>> {
        let key = presence_key(driver_id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(unavailable)?;
        raw.map(|raw| decode(&key, &raw)).transpose()
    }

    async fn save_driver_presence(&self, presence: &DriverPresence) -> StoreResult<()> {
        let key = presence_key(&presence.driver_id);
        let json = encode(&key, presence)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&key, json).await.map_err(unavailable)
    }

    async fn commit_transition(
        &self,
        booking: &Booking,
        presence: Option<&DriverPresence>,
    ) -> StoreResult<()> {
        let bkey = booking_key(&booking.id);
        let booking_json = encode(&bkey, booking)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(&bkey, booking_json)
            .ignore()
            .sadd(BOOKING_INDEX, &booking.id)
            .ignore();

        if let Some(presence) = presence {
            let pkey = presence_key(&presence.driver_id);
            let presence_json = encode(&pkey, presence)?;
            pipe.set(&pkey, presence_json).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await.map_err(unavailable)?;
        debug!(booking_id = %booking.id, status = %booking.status, "Committed transition");
        Ok(())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(BOOKING_INDEX).await.map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| booking_key(id)).collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        let mut matched = Vec::new();
        for (key, raw) in keys.iter().zip(raws) {
            // Index entries can outlive their record if someone deletes keys by hand.
            let Some(raw) = raw else { continue };
            let booking: Booking = decode(key, &raw)?;
            if filter.matches(&booking) {
                matched.push(booking);
            }
        }
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }
}
