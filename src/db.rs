//! MySQL storage adapter.
//!
//! Wraps a single `sqlx` MySQL connection and drives it on a private
//! current-thread tokio runtime, so every call blocks until the database
//! answers. One connection, one transaction at a time.

use log::LevelFilter;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlStatement};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection, Executor, Row, Statement, Transaction};
use tokio::runtime::{Builder, Runtime};

use crate::config::{ConnectionSettings, ImportConfig};
use crate::storage::{Param, QueryText, Storage, StorageError, StorageTransaction};

/// Blocking handle to a MySQL database.
pub struct MySqlStore {
    // dropped before the runtime it was created on
    conn: MySqlConnection,
    runtime: Runtime,
}

impl MySqlStore {
    /// Connect and authenticate using the configured credentials.
    ///
    /// # Arguments
    /// * `settings` - Server host and port
    /// * `config` - Database name, user and password
    pub fn connect(
        settings: &ConnectionSettings,
        config: &ImportConfig,
    ) -> Result<Self, StorageError> {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(config.store_user.as_str())
            .password(config.store_credential.as_str())
            .database(config.store_name.as_str())
            .log_statements(LevelFilter::Trace);

        Self::connect_with(options)
    }

    /// Connect with fully specified options.
    pub fn connect_with(options: MySqlConnectOptions) -> Result<Self, StorageError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StorageError::Runtime)?;

        let conn = runtime
            .block_on(options.connect())
            .map_err(StorageError::Connect)?;

        log::debug!("mysql connection established");
        Ok(Self { conn, runtime })
    }

    /// Server version string, for the startup banner.
    pub fn server_version(&mut self) -> Result<String, StorageError> {
        let row = self
            .runtime
            .block_on(sqlx::query("SELECT VERSION()").fetch_one(&mut self.conn))
            .map_err(StorageError::Execute)?;
        row.try_get::<String, _>(0).map_err(StorageError::Execute)
    }

    /// Gracefully close the connection.
    pub fn close(self) -> Result<(), StorageError> {
        let Self { runtime, conn } = self;
        runtime.block_on(conn.close()).map_err(StorageError::Close)?;
        log::debug!("mysql connection closed");
        Ok(())
    }
}

impl Storage for MySqlStore {
    type Transaction<'s> = MySqlBatch<'s>;

    fn begin(&mut self) -> Result<MySqlBatch<'_>, StorageError> {
        let Self { runtime, conn } = self;
        let tx = runtime.block_on(conn.begin()).map_err(StorageError::Begin)?;
        Ok(MySqlBatch { runtime, tx })
    }
}

/// An open MySQL transaction.
///
/// `sqlx` rolls the transaction back when it is dropped uncommitted.
pub struct MySqlBatch<'s> {
    runtime: &'s Runtime,
    tx: Transaction<'s, MySql>,
}

fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Param<'_>],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match *param {
            Param::Text(value) => query.bind(value.to_string()),
            Param::Int(value) => query.bind(value),
        };
    }
    query
}

/// Parameter encoding surfaces from `sqlx` at execution time.
fn execute_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Encode(_) => StorageError::Bind(err),
        err => StorageError::Execute(err),
    }
}

impl StorageTransaction for MySqlBatch<'_> {
    type Statement = MySqlStatement<'static>;

    fn prepare(&mut self, query: &QueryText) -> Result<Self::Statement, StorageError> {
        log::debug!("preparing {:?} statement", query.kind);
        let statement = self
            .runtime
            .block_on((&mut *self.tx).prepare(query.sql.as_str()))
            .map_err(StorageError::Prepare)?;
        Ok(Statement::to_owned(&statement))
    }

    fn execute(
        &mut self,
        statement: &Self::Statement,
        params: &[Param<'_>],
    ) -> Result<u64, StorageError> {
        let query = bind_params(statement.query(), params);
        let result = self
            .runtime
            .block_on(query.execute(&mut *self.tx))
            .map_err(execute_error)?;
        Ok(result.rows_affected())
    }

    fn fetch_id(
        &mut self,
        statement: &Self::Statement,
        params: &[Param<'_>],
    ) -> Result<Option<i64>, StorageError> {
        let query = bind_params(statement.query(), params);
        let row = self
            .runtime
            .block_on(query.fetch_optional(&mut *self.tx))
            .map_err(execute_error)?;

        row.map(|row| row.try_get::<i64, _>(0))
            .transpose()
            .map_err(StorageError::Execute)
    }

    fn commit(self) -> Result<(), StorageError> {
        self.runtime
            .block_on(self.tx.commit())
            .map_err(StorageError::Commit)
    }

    fn rollback(self) -> Result<(), StorageError> {
        self.runtime
            .block_on(self.tx.rollback())
            .map_err(StorageError::Rollback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_errors_are_binding_failures() {
        let encode = sqlx::Error::Encode(Box::new(std::io::Error::other("value too large")));
        let mapped = execute_error(encode);
        assert!(matches!(mapped, StorageError::Bind(_)));
        assert!(mapped.is_binding());

        let mapped = execute_error(sqlx::Error::RowNotFound);
        assert!(matches!(mapped, StorageError::Execute(_)));
        assert!(!mapped.is_binding());
    }
}
