//! The catalog's table set and row-key derivation.
//!
//! Every catalog table lives in its own storage partition. Tables with a
//! natural single-field identifier are keyed by that field; join and edge
//! tables are keyed by a composite of their foreign-key fields.
//!
//! # Composite keys
//!
//! Composite keys join the rendered key fields with [`KEY_SEPARATOR`].
//! Backslashes and separators inside a field are escaped, so two records
//! yield the same key only if every key field renders identically. Missing
//! fields render as the empty string.
//!
//! ```
//! use catalog_cache_core::{Record, Value, table};
//!
//! let row = Record::new()
//!     .with("item_id", "10030-1".into())
//!     .with("version", Value::Int(1));
//! assert_eq!(table::REVISIONS.key_for(&row), "10030-1|1");
//! ```

use crate::record::Record;

/// Separator between composite key parts.
pub const KEY_SEPARATOR: char = '|';

/// How a table derives the storage key of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// A single natural unique field.
    Field(&'static str),
    /// Foreign-key fields concatenated in declaration order.
    Composite(&'static [&'static str]),
}

impl KeyStrategy {
    /// Derives the storage key of `record`.
    pub fn key_for(&self, record: &Record) -> String {
        match *self {
            KeyStrategy::Field(field) => record.key_text(field).unwrap_or_default(),
            KeyStrategy::Composite(fields) => composite_key(record, fields),
        }
    }
}

/// Static description of one catalog table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// Source base name, also used as the partition name.
    pub name: &'static str,
    pub key: KeyStrategy,
}

impl TableSpec {
    /// Derives the storage key of `record`.
    pub fn key_for(&self, record: &Record) -> String {
        self.key.key_for(record)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.key, KeyStrategy::Composite(_))
    }
}

pub const ITEMS: TableSpec = TableSpec {
    name: "items",
    key: KeyStrategy::Field("id"),
};

pub const COMPONENTS: TableSpec = TableSpec {
    name: "components",
    key: KeyStrategy::Field("id"),
};

pub const VARIANTS: TableSpec = TableSpec {
    name: "variants",
    key: KeyStrategy::Field("id"),
};

pub const REVISIONS: TableSpec = TableSpec {
    name: "revisions",
    key: KeyStrategy::Composite(&["item_id", "version"]),
};

pub const COMPOSITIONS: TableSpec = TableSpec {
    name: "compositions",
    key: KeyStrategy::Composite(&["item_id", "version", "component_id", "variant_id", "is_spare"]),
};

pub const CROSS_REFERENCES: TableSpec = TableSpec {
    name: "cross_references",
    key: KeyStrategy::Composite(&["component_id", "variant_id", "code"]),
};

pub const RELATIONSHIPS: TableSpec = TableSpec {
    name: "relationships",
    key: KeyStrategy::Composite(&["kind", "child_id", "parent_id"]),
};

pub const CATEGORIES: TableSpec = TableSpec {
    name: "categories",
    key: KeyStrategy::Field("id"),
};

pub const GROUPINGS: TableSpec = TableSpec {
    name: "groupings",
    key: KeyStrategy::Field("id"),
};

/// All catalog tables, in refresh order.
pub const CATALOG_TABLES: &[TableSpec] = &[
    ITEMS,
    COMPONENTS,
    VARIANTS,
    REVISIONS,
    COMPOSITIONS,
    CROSS_REFERENCES,
    RELATIONSHIPS,
    CATEGORIES,
    GROUPINGS,
];

/// Looks up a catalog table by name.
pub fn spec_for(name: &str) -> Option<&'static TableSpec> {
    CATALOG_TABLES.iter().find(|t| t.name == name)
}

/// Key strategy for any table name. Tables outside the catalog are keyed
/// by their `id` field.
pub fn key_strategy_for(name: &str) -> KeyStrategy {
    spec_for(name).map(|t| t.key).unwrap_or(KeyStrategy::Field("id"))
}

/// Revision key for a composition or revision row: `item_id|version`.
pub fn revision_key(record: &Record) -> String {
    composite_key(record, &["item_id", "version"])
}

/// Builds an escaped composite key from `fields` of `record`.
pub fn composite_key(record: &Record, fields: &[&str]) -> String {
    let mut key = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        if let Some(value) = record.get(field) {
            for c in value.as_key().chars() {
                if c == '\\' || c == KEY_SEPARATOR {
                    key.push('\\');
                }
                key.push(c);
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn composition(item: &str, component: &str, variant: i64, spare: bool) -> Record {
        Record::new()
            .with("item_id", item.into())
            .with("version", Value::Int(1))
            .with("component_id", component.into())
            .with("variant_id", Value::Int(variant))
            .with("quantity", Value::Int(4))
            .with("is_spare", Value::Bool(spare))
    }

    #[test]
    fn test_field_key() {
        let r = Record::new().with("id", Value::Int(3001));
        assert_eq!(COMPONENTS.key_for(&r), "3001");
    }

    #[test]
    fn test_composite_key_is_deterministic() {
        let a = composition("10030-1", "3001", 4, false);
        let b = composition("10030-1", "3001", 4, false);
        assert_eq!(COMPOSITIONS.key_for(&a), COMPOSITIONS.key_for(&b));
        assert_eq!(COMPOSITIONS.key_for(&a), "10030-1|1|3001|4|false");
    }

    #[test]
    fn test_composite_key_ignores_non_key_fields() {
        let a = composition("10030-1", "3001", 4, false);
        let b = composition("10030-1", "3001", 4, false).with("quantity", Value::Int(9));
        assert_eq!(COMPOSITIONS.key_for(&a), COMPOSITIONS.key_for(&b));
    }

    #[test]
    fn test_spare_flag_distinguishes_compositions() {
        let a = composition("10030-1", "3001", 4, false);
        let b = composition("10030-1", "3001", 4, true);
        assert_ne!(COMPOSITIONS.key_for(&a), COMPOSITIONS.key_for(&b));
    }

    #[test]
    fn test_separator_inside_field_cannot_collide() {
        let a = Record::new()
            .with("component_id", "a|b".into())
            .with("variant_id", "c".into())
            .with("code", "x".into());
        let b = Record::new()
            .with("component_id", "a".into())
            .with("variant_id", "b|c".into())
            .with("code", "x".into());
        assert_ne!(CROSS_REFERENCES.key_for(&a), CROSS_REFERENCES.key_for(&b));
        assert_eq!(CROSS_REFERENCES.key_for(&a), r"a\|b|c|x");
    }

    #[test]
    fn test_missing_field_renders_empty() {
        let r = Record::new().with("kind", "M".into()).with("parent_id", "3001".into());
        assert_eq!(RELATIONSHIPS.key_for(&r), "M||3001");
    }

    #[test]
    fn test_unknown_tables_keyed_by_id() {
        assert_eq!(key_strategy_for("parts"), KeyStrategy::Field("id"));
        assert_eq!(key_strategy_for("revisions"), REVISIONS.key);
    }

    #[test]
    fn test_spec_lookup() {
        assert_eq!(spec_for("compositions"), Some(&COMPOSITIONS));
        assert!(spec_for("unknown").is_none());
        assert!(REVISIONS.is_composite());
        assert!(!ITEMS.is_composite());
    }
}
