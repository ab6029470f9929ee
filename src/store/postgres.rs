//! PostgreSQL implementation of the store seams
//!
//! Each call opens its own connection, so the three level tasks never share
//! a COPY stream. Appends use `COPY ... FROM STDIN BINARY`.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use futures::pin_mut;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use super::types::{PgColumn, copy_statement, pg_type};
use super::{FactSink, SqlExecutor};
use crate::config::DatabaseConfig;
use crate::error::{LqError, Result};

/// Connection factory for one database
#[derive(Debug, Clone)]
pub struct PostgresStore {
    config: DatabaseConfig,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open a connection and drive it on a background task
    pub async fn connect(&self) -> Result<Client> {
        let (client, connection) = self.config.pg_config().connect(NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("PostgreSQL connection error: {e}");
            }
        });
        Ok(client)
    }

    /// Stream a batch into `table` with binary COPY
    pub async fn copy_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64> {
        let start = Instant::now();
        let schema = batch.schema();

        let mut types = Vec::with_capacity(schema.fields().len());
        let mut columns = Vec::with_capacity(schema.fields().len());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let pg = pg_type(field.data_type()).ok_or_else(|| {
                LqError::persistence(
                    table,
                    format!("column '{}' has no PostgreSQL type", field.name()),
                )
            })?;
            types.push(pg);
            columns.push(PgColumn::try_new(field.name(), array)?);
        }

        let statement = copy_statement(table, &schema);
        let client = self.connect().await?;
        let sink = client.copy_in(statement.as_str()).await?;
        let writer = BinaryCopyInWriter::new(sink, &types);
        pin_mut!(writer);

        for row in 0..batch.num_rows() {
            let cells: Vec<_> = columns.iter().map(|c| c.cell(row)).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = cells
                .iter()
                .map(|c| c.as_ref() as &(dyn ToSql + Sync))
                .collect();
            writer.as_mut().write(&refs).await?;
        }
        let written = writer.finish().await?;

        log::debug!("Copied {written} rows into {table} in {:?}", start.elapsed());
        Ok(written)
    }
}

impl FactSink for PostgresStore {
    fn append<'a>(
        &'a self,
        table: &'a str,
        batch: &'a RecordBatch,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            self.copy_batch(table, batch).await.map_err(|e| match e {
                LqError::Persistence { .. } => e,
                other => LqError::persistence(table, other),
            })
        })
    }
}

impl SqlExecutor for PostgresStore {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.connect().await?;
            client.batch_execute(sql).await?;
            Ok(())
        })
    }
}
