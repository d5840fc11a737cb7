//! Read cache adapter backed by Redis.

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};

use crate::{
    application::repos::{CacheError, ReadCache, ScanBatch},
    infra::deadline::with_deadline,
};

/// Keys requested per SCAN round trip. A hint only; the server may return more or fewer.
const SCAN_COUNT: usize = 100;

#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, redis::RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            timeout,
        })
    }

    async fn run<T>(
        &self,
        operation: &'static str,
        key: &str,
        command: redis::Cmd,
    ) -> Result<T, CacheError>
    where
        T: redis::FromRedisValue,
    {
        let mut connection = self.connection.clone();
        with_deadline(
            self.timeout,
            async {
                command
                    .query_async(&mut connection)
                    .await
                    .map_err(|err| CacheError::Backend {
                        operation,
                        key: key.to_string(),
                        message: err.to_string(),
                    })
            },
            || CacheError::Timeout {
                operation,
                key: key.to_string(),
            },
        )
        .await
    }
}

#[async_trait]
impl ReadCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut command = redis::cmd("GET");
        command.arg(key);
        self.run("get", key, command).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value);
        self.run::<()>("set", key, command).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut command = redis::cmd("EXISTS");
        command.arg(key);
        let count: i64 = self.run("exists", key, command).await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut command = redis::cmd("DEL");
        command.arg(key);
        self.run::<i64>("delete", key, command).await.map(|_| ())
    }

    async fn scan(&self, cursor: u64, pattern: &str) -> Result<ScanBatch, CacheError> {
        let mut command = redis::cmd("SCAN");
        command
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT);
        let (cursor, keys): (u64, Vec<String>) = self.run("scan", pattern, command).await?;
        Ok(ScanBatch { cursor, keys })
    }
}
