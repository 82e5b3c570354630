//! SQL issued by the importer.
//!
//! Table names carry the configured prefix (`ps_product`, `ps_stock_available`
//! for the usual `ps_` prefix). Values are always bound as parameters; only
//! the prefix is interpolated, so it is restricted to `[A-Za-z0-9_]`.

use thiserror::Error;

use crate::storage::{QueryText, StatementKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("table prefix `{0}` may only contain ASCII letters, digits and underscores")]
pub struct InvalidTablePrefix(pub String);

/// The statements used by one import, qualified by table prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub update_quantity: QueryText,
    pub lookup_stock: QueryText,
}

impl Statements {
    pub fn new(table_prefix: &str) -> Result<Self, InvalidTablePrefix> {
        if !table_prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(InvalidTablePrefix(table_prefix.to_string()));
        }

        Ok(Self {
            update_quantity: QueryText {
                kind: StatementKind::UpdateQuantity,
                sql: format!("UPDATE {table_prefix}product SET quantity = ? WHERE ean13 = ?"),
            },
            lookup_stock: QueryText {
                kind: StatementKind::LookupStock,
                sql: format!(
                    "SELECT CAST(sa.id_stock_available AS SIGNED) \
                     FROM {table_prefix}stock_available sa \
                     INNER JOIN {table_prefix}product p ON p.id_product = sa.id_product \
                     WHERE p.ean13 = ? \
                     LIMIT 1"
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_use_prefix() {
        let statements = Statements::new("ps_").unwrap();
        assert_eq!(
            statements.update_quantity.sql,
            "UPDATE ps_product SET quantity = ? WHERE ean13 = ?"
        );
        assert!(statements.lookup_stock.sql.contains("FROM ps_stock_available sa"));
        assert!(statements.lookup_stock.sql.contains("JOIN ps_product p"));
        assert_eq!(statements.lookup_stock.kind, StatementKind::LookupStock);
    }

    #[test]
    fn test_empty_prefix_allowed() {
        let statements = Statements::new("").unwrap();
        assert!(statements.update_quantity.sql.starts_with("UPDATE product "));
    }

    #[test]
    fn test_rejects_unsafe_prefix() {
        assert!(Statements::new("ps_; DROP TABLE x; --").is_err());
        assert!(Statements::new("my-shop_").is_err());
    }
}
