pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod storage;

pub use error::ImportError;
pub use import::{BatchOutcome, ImportSession};

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::collections::{BTreeMap, HashSet};

    use crate::storage::{
        Param, QueryText, StatementKind, Storage, StorageError, StorageTransaction,
    };

    pub use database::{TestDatabase, TestDatabaseError};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct StoredProduct {
        quantity: i32,
        stock_id: Option<i64>,
    }

    /// Failures the in-memory store should inject.
    #[derive(Debug, Clone, Default)]
    pub struct FailurePlan {
        pub begin: bool,
        pub prepare: Option<StatementKind>,
        /// Identifiers whose quantity update fails.
        pub execute_for: HashSet<String>,
        /// Identifiers whose update parameters fail to bind.
        pub bind_for: HashSet<String>,
        /// Identifiers whose stock lookup fails.
        pub lookup_for: HashSet<String>,
        pub commit: bool,
        pub rollback: bool,
    }

    /// In-memory product table with snapshot transactions.
    ///
    /// A transaction works on a copy of the products and only writes it back
    /// on commit, so rollback and drop leave the store untouched.
    #[derive(Debug, Default)]
    pub struct MemoryStorage {
        products: BTreeMap<String, StoredProduct>,
        pub failures: FailurePlan,
        pub prepared: Vec<StatementKind>,
        pub executions: usize,
        pub commits: usize,
        pub rollbacks: usize,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_product(mut self, identifier: &str, quantity: i32) -> Self {
            self.products.insert(
                identifier.to_string(),
                StoredProduct {
                    quantity,
                    stock_id: None,
                },
            );
            self
        }

        pub fn with_stock(mut self, identifier: &str, quantity: i32, stock_id: i64) -> Self {
            self.products.insert(
                identifier.to_string(),
                StoredProduct {
                    quantity,
                    stock_id: Some(stock_id),
                },
            );
            self
        }

        pub fn quantity(&self, identifier: &str) -> Option<i32> {
            self.products.get(identifier).map(|p| p.quantity)
        }

        /// Identifier → quantity, for before/after comparisons.
        pub fn snapshot(&self) -> BTreeMap<String, i32> {
            self.products
                .iter()
                .map(|(id, p)| (id.clone(), p.quantity))
                .collect()
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemoryStatement {
        kind: StatementKind,
    }

    pub struct MemoryTransaction<'s> {
        storage: &'s mut MemoryStorage,
        working: BTreeMap<String, StoredProduct>,
    }

    impl Storage for MemoryStorage {
        type Transaction<'s> = MemoryTransaction<'s>;

        fn begin(&mut self) -> Result<MemoryTransaction<'_>, StorageError> {
            if self.failures.begin {
                return Err(StorageError::Injected("begin refused".to_string()));
            }
            let working = self.products.clone();
            Ok(MemoryTransaction {
                storage: self,
                working,
            })
        }
    }

    fn bad_params(kind: StatementKind, params: &[Param<'_>]) -> StorageError {
        StorageError::Parameters {
            kind,
            detail: format!("{:?}", params),
        }
    }

    impl StorageTransaction for MemoryTransaction<'_> {
        type Statement = MemoryStatement;

        fn prepare(&mut self, query: &QueryText) -> Result<MemoryStatement, StorageError> {
            self.storage.prepared.push(query.kind);
            if self.storage.failures.prepare == Some(query.kind) {
                return Err(StorageError::Injected(format!("cannot prepare {}", query.sql)));
            }
            Ok(MemoryStatement { kind: query.kind })
        }

        fn execute(
            &mut self,
            statement: &MemoryStatement,
            params: &[Param<'_>],
        ) -> Result<u64, StorageError> {
            let (quantity, identifier) = match (statement.kind, params) {
                (StatementKind::UpdateQuantity, [Param::Int(q), Param::Text(id)]) => (*q, *id),
                (kind, params) => return Err(bad_params(kind, params)),
            };

            if self.storage.failures.bind_for.contains(identifier) {
                return Err(StorageError::Parameters {
                    kind: statement.kind,
                    detail: format!("cannot bind {identifier}"),
                });
            }

            self.storage.executions += 1;
            if self.storage.failures.execute_for.contains(identifier) {
                return Err(StorageError::Injected(format!("update of {identifier} refused")));
            }

            match self.working.get_mut(identifier) {
                Some(product) => {
                    product.quantity = quantity;
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn fetch_id(
            &mut self,
            statement: &MemoryStatement,
            params: &[Param<'_>],
        ) -> Result<Option<i64>, StorageError> {
            let identifier = match (statement.kind, params) {
                (StatementKind::LookupStock, [Param::Text(id)]) => *id,
                (kind, params) => return Err(bad_params(kind, params)),
            };

            self.storage.executions += 1;
            if self.storage.failures.lookup_for.contains(identifier) {
                return Err(StorageError::Injected(format!("lookup of {identifier} refused")));
            }
            Ok(self.working.get(identifier).and_then(|p| p.stock_id))
        }

        fn commit(self) -> Result<(), StorageError> {
            if self.storage.failures.commit {
                return Err(StorageError::Injected("connection lost during commit".to_string()));
            }
            self.storage.products = self.working;
            self.storage.commits += 1;
            Ok(())
        }

        fn rollback(self) -> Result<(), StorageError> {
            self.storage.rollbacks += 1;
            if self.storage.failures.rollback {
                return Err(StorageError::Injected("rollback refused".to_string()));
            }
            Ok(())
        }
    }

    pub mod database {
        use log::LevelFilter;
        use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
        use sqlx::ConnectOptions;
        use testcontainers::{ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner};
        use testcontainers_modules::mysql::Mysql;
        use thiserror::Error;

        const SCHEMA: [&str; 2] = [
            "CREATE TABLE ps_product (
                id_product INT UNSIGNED NOT NULL PRIMARY KEY,
                ean13 VARCHAR(13) NOT NULL,
                quantity INT NOT NULL DEFAULT 0,
                KEY ean13 (ean13)
            )",
            "CREATE TABLE ps_stock_available (
                id_stock_available INT UNSIGNED NOT NULL PRIMARY KEY,
                id_product INT UNSIGNED NOT NULL,
                quantity INT NOT NULL DEFAULT 0
            )",
        ];

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("IMPORT_MYSQL_TESTS not set")]
            Disabled,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Disposable MySQL server with the product tables created under the
        /// `ps_` prefix.
        pub struct TestDatabase {
            pool: MySqlPool,
            options: MySqlConnectOptions,
            container: Option<ContainerAsync<Mysql>>,
        }

        impl TestDatabase {
            /// Start a container when `IMPORT_MYSQL_TESTS` is set.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                if std::env::var_os("IMPORT_MYSQL_TESTS").is_none() {
                    return Err(TestDatabaseError::Disabled);
                }
                Self::new().await
            }

            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Mysql::default().start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(3306).await?;

                let options = MySqlConnectOptions::new()
                    .host(&host)
                    .port(port)
                    .username("root")
                    .database("test")
                    .log_statements(LevelFilter::Off);

                let pool = MySqlPoolOptions::new()
                    .max_connections(2)
                    .connect_with(options.clone())
                    .await?;

                for statement in SCHEMA {
                    sqlx::query(statement).execute(&pool).await?;
                }

                Ok(Self {
                    pool,
                    options,
                    container: Some(container),
                })
            }

            /// Options for opening an independent connection to the same database.
            pub fn connect_options(&self) -> MySqlConnectOptions {
                self.options.clone()
            }

            pub fn pool(&self) -> &MySqlPool {
                &self.pool
            }

            pub async fn insert_product(
                &self,
                id_product: u32,
                ean13: &str,
                quantity: i32,
            ) -> Result<(), sqlx::Error> {
                sqlx::query("INSERT INTO ps_product (id_product, ean13, quantity) VALUES (?, ?, ?)")
                    .bind(id_product)
                    .bind(ean13)
                    .bind(quantity)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }

            pub async fn insert_stock(
                &self,
                id_stock_available: u32,
                id_product: u32,
            ) -> Result<(), sqlx::Error> {
                sqlx::query(
                    "INSERT INTO ps_stock_available (id_stock_available, id_product) VALUES (?, ?)",
                )
                .bind(id_stock_available)
                .bind(id_product)
                .execute(&self.pool)
                .await?;
                Ok(())
            }

            pub async fn quantity(&self, ean13: &str) -> Result<Option<i32>, sqlx::Error> {
                sqlx::query_scalar("SELECT quantity FROM ps_product WHERE ean13 = ?")
                    .bind(ean13)
                    .fetch_optional(&self.pool)
                    .await
            }

            /// Close pool connections and stop the container.
            pub async fn close(mut self) {
                self.pool.close().await;
                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }
}
