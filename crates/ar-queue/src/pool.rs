//! Fixed-size AMQP connection pool.
//!
//! The pool holds `size` broker connections behind a semaphore. `acquire`
//! suspends the caller when every connection is checked out; it never
//! errors on exhaustion. A connection found dead at checkout is replaced
//! transparently.

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties, ConnectionState};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::{QueueError, Result};

struct PoolInner {
    uri: String,
    free: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

/// Pool of broker connections shared by publish operations.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open `size` connections to the broker.
    pub async fn connect(uri: &str, size: usize) -> Result<Self> {
        let size = size.max(1);
        let mut free = Vec::with_capacity(size);
        for _ in 0..size {
            free.push(open_connection(uri).await?);
        }
        info!(size, "AMQP connection pool ready");

        Ok(Self {
            inner: Arc::new(PoolInner {
                uri: uri.to_string(),
                free: Mutex::new(free),
                permits: Arc::new(Semaphore::new(size)),
            }),
        })
    }

    /// Check a connection out of the pool, waiting if none is free.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| QueueError::Stopped)?;

        let existing = self.inner.free.lock().pop();
        let connection = match existing {
            Some(conn) if conn.status().state() == ConnectionState::Connected => conn,
            other => {
                if other.is_some() {
                    warn!("pooled AMQP connection is dead, reconnecting");
                }
                open_connection(&self.inner.uri).await?
            }
        };

        Ok(PooledConnection {
            connection: Some(connection),
            inner: self.inner.clone(),
            _permit: permit,
        })
    }
}

async fn open_connection(uri: &str) -> Result<Connection> {
    let connection = Connection::connect(
        uri,
        ConnectionProperties::default().with_connection_name("ar-queue".into()),
    )
    .await?;
    debug!("opened AMQP connection");
    Ok(connection)
}

/// A checked-out connection; returned to the pool on drop.
pub struct PooledConnection {
    connection: Option<Connection>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection.as_ref().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.inner.free.lock().push(connection);
        }
    }
}
