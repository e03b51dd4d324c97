//! Bounded PostgreSQL connection pool

use crate::config::DatabaseConfig;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::{Client, NoTls};

/// Process-wide pool of `tokio_postgres` clients.
///
/// Checkout is bounded by a semaphore sized to `database.pool_size`; idle
/// clients are reused and closed ones discarded. Connections are opened
/// lazily on first demand.
pub struct Pool {
    conn_string: String,
    idle: Arc<Mutex<Vec<Client>>>,
    permits: Arc<Semaphore>,
}

impl Pool {
    /// Create a pool for the given database settings
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            conn_string: config.conn_string(),
            idle: Arc::new(Mutex::new(Vec::new())),
            permits: Arc::new(Semaphore::new(config.pool_size)),
        }
    }

    /// Check out a connection, opening a new one if no idle client is usable
    pub async fn get(&self) -> Result<PooledClient, tokio_postgres::Error> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("pool semaphore closed");

        loop {
            let candidate = self.idle.lock().expect("pool mutex poisoned").pop();
            match candidate {
                Some(client) if client.is_closed() => {
                    tracing::debug!("discarding closed pooled connection");
                    continue;
                }
                Some(client) => {
                    return Ok(PooledClient {
                        client: Some(client),
                        idle: Arc::clone(&self.idle),
                        _permit: permit,
                    })
                }
                None => break,
            }
        }

        let (client, connection) =
            tokio_postgres::connect(&self.conn_string, NoTls).await?;

        // Drive the connection until it closes, same as a dedicated task per client
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(PooledClient {
            client: Some(client),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }

    /// Number of idle clients currently held
    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("pool mutex poisoned").len()
    }
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            conn_string: self.conn_string.clone(),
            idle: Arc::clone(&self.idle),
            permits: Arc::clone(&self.permits),
        }
    }
}

/// A checked-out client; returns itself to the pool on drop
pub struct PooledClient {
    client: Option<Client>,
    idle: Arc<Mutex<Vec<Client>>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("client taken")
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("client taken")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if !client.is_closed() {
                self.idle.lock().expect("pool mutex poisoned").push(client);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[test]
    fn test_pool_starts_empty() {
        let pool = Pool::new(&DatabaseConfig::default());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_pool_clone_shares_idle_list() {
        let pool = Pool::new(&DatabaseConfig::default());
        let clone = pool.clone();
        assert!(Arc::ptr_eq(&pool.idle, &clone.idle));
        assert!(Arc::ptr_eq(&pool.permits, &clone.permits));
    }
}
