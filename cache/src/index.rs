//! Lookup structures over a resident dataset.
//!
//! The index owns the dataset and stores row positions, so every accessor
//! hands out borrowed records without copying. It is built once per
//! generation; [`IndexCell`] enforces that.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use catalog_cache_core::table::{self, revision_key};
use catalog_cache_core::{Dataset, Record};
use tracing::{debug, warn};

type Positions = HashMap<String, Vec<usize>>;

/// Primary-key and foreign-key indices over one dataset generation.
#[derive(Debug, Default)]
pub struct CatalogIndex {
    dataset: Dataset,
    primary: HashMap<String, HashMap<String, usize>>,
    compositions_by_revision: Positions,
    revisions_by_item: Positions,
    cross_refs_by_component: Positions,
    relationships_by_child: Positions,
    relationships_by_parent: Positions,
    groupings_by_parent: Positions,
    unresolved_compositions: usize,
}

impl CatalogIndex {
    /// Builds every index over `dataset`.
    ///
    /// Compositions whose revision, component or variant cannot be found
    /// stay in the dataset but are left out of the relation lookups.
    pub fn build(dataset: Dataset) -> Self {
        let mut primary = HashMap::new();
        for name in dataset.table_names() {
            let strategy = table::key_strategy_for(name);
            let keys: HashMap<String, usize> = dataset
                .table(name)
                .iter()
                .enumerate()
                .map(|(i, record)| (strategy.key_for(record), i))
                .collect();
            primary.insert(name.to_string(), keys);
        }

        let resolves = |table: &str, key: Option<String>| -> bool {
            key.is_some_and(|k| primary.get(table).is_some_and(|m| m.contains_key(&k)))
        };

        let mut compositions_by_revision = Positions::new();
        let mut unresolved_compositions = 0;
        for (i, row) in dataset.table(table::COMPOSITIONS.name).iter().enumerate() {
            let revision = revision_key(row);
            let resolved = resolves(table::REVISIONS.name, Some(revision.clone()))
                && resolves(table::COMPONENTS.name, row.key_text("component_id"))
                && resolves(table::VARIANTS.name, row.key_text("variant_id"));
            if resolved {
                compositions_by_revision.entry(revision).or_default().push(i);
            } else {
                unresolved_compositions += 1;
            }
        }
        if unresolved_compositions > 0 {
            warn!(
                count = unresolved_compositions,
                "Compositions with unresolved references excluded from lookups"
            );
        }

        let index = Self {
            revisions_by_item: group_by(&dataset, table::REVISIONS.name, "item_id"),
            cross_refs_by_component: group_by(&dataset, table::CROSS_REFERENCES.name, "component_id"),
            relationships_by_child: group_by(&dataset, table::RELATIONSHIPS.name, "child_id"),
            relationships_by_parent: group_by(&dataset, table::RELATIONSHIPS.name, "parent_id"),
            groupings_by_parent: group_by(&dataset, table::GROUPINGS.name, "parent_id"),
            compositions_by_revision,
            unresolved_compositions,
            primary,
            dataset,
        };
        debug!(
            tables = index.primary.len(),
            rows = index.dataset.total_rows(),
            "Catalog index built"
        );
        index
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Rows of `name` in load order.
    pub fn table(&self, name: &str) -> &[Record] {
        self.dataset.table(name)
    }

    /// Looks up a row of any table by its primary key.
    pub fn get(&self, table: &str, key: &str) -> Option<&Record> {
        let position = *self.primary.get(table)?.get(key)?;
        self.dataset.table(table).get(position)
    }

    pub fn item(&self, id: &str) -> Option<&Record> {
        self.get(table::ITEMS.name, id)
    }

    pub fn component(&self, id: &str) -> Option<&Record> {
        self.get(table::COMPONENTS.name, id)
    }

    pub fn variant(&self, id: &str) -> Option<&Record> {
        self.get(table::VARIANTS.name, id)
    }

    /// Looks up a revision by its `item_id|version` key.
    pub fn revision(&self, key: &str) -> Option<&Record> {
        self.get(table::REVISIONS.name, key)
    }

    pub fn category(&self, id: &str) -> Option<&Record> {
        self.get(table::CATEGORIES.name, id)
    }

    pub fn grouping(&self, id: &str) -> Option<&Record> {
        self.get(table::GROUPINGS.name, id)
    }

    /// Resolved compositions of a revision (`item_id|version`).
    pub fn compositions_for_revision<'a>(
        &'a self,
        revision: &str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(table::COMPOSITIONS.name, &self.compositions_by_revision, revision)
    }

    pub fn revisions_for_item<'a>(&'a self, item_id: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(table::REVISIONS.name, &self.revisions_by_item, item_id)
    }

    pub fn cross_references_for<'a>(
        &'a self,
        component_id: &str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(
            table::CROSS_REFERENCES.name,
            &self.cross_refs_by_component,
            component_id,
        )
    }

    /// Relationships where `id` is the child.
    pub fn parents_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(table::RELATIONSHIPS.name, &self.relationships_by_child, id)
    }

    /// Relationships where `id` is the parent.
    pub fn children_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(table::RELATIONSHIPS.name, &self.relationships_by_parent, id)
    }

    /// Direct sub-groupings of a grouping.
    pub fn groupings_under<'a>(&'a self, parent_id: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.rows(table::GROUPINGS.name, &self.groupings_by_parent, parent_id)
    }

    /// Walks from a grouping up to its root, nearest first. Stops at a
    /// missing parent or a cycle.
    pub fn grouping_path(&self, id: &str) -> Vec<&Record> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id.to_string());
        while let Some(current) = next.take() {
            if !seen.insert(current.clone()) {
                warn!(grouping = %current, "Cycle in grouping hierarchy");
                break;
            }
            let Some(grouping) = self.grouping(&current) else {
                break;
            };
            path.push(grouping);
            next = grouping.key_text("parent_id");
        }
        path
    }

    /// Number of compositions left out of relation lookups.
    pub fn unresolved_compositions(&self) -> usize {
        self.unresolved_compositions
    }

    fn rows<'a>(
        &'a self,
        table: &str,
        positions: &'a Positions,
        key: &str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        let rows = self.dataset.table(table);
        positions
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&i| rows.get(i))
    }
}

fn group_by(dataset: &Dataset, table: &str, field: &str) -> Positions {
    let mut positions = Positions::new();
    for (i, row) in dataset.table(table).iter().enumerate() {
        if let Some(key) = row.key_text(field) {
            positions.entry(key).or_default().push(i);
        }
    }
    positions
}

/// Holds the index of the current generation, built at most once.
#[derive(Debug, Default)]
pub struct IndexCell {
    cell: OnceLock<CatalogIndex>,
}

impl IndexCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from `dataset` on first call. Later calls ignore
    /// their argument and return the existing index.
    pub fn build_once(&self, dataset: Dataset) -> &CatalogIndex {
        let mut dataset = Some(dataset);
        self.cell
            .get_or_init(|| CatalogIndex::build(dataset.take().unwrap_or_default()))
    }

    pub fn get(&self) -> Option<&CatalogIndex> {
        self.cell.get()
    }

    pub fn is_built(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_cache_core::Value;

    fn composition(item: &str, component: &str, variant: i64) -> Record {
        Record::new()
            .with("item_id", item.into())
            .with("version", Value::Int(1))
            .with("component_id", component.into())
            .with("variant_id", Value::Int(variant))
            .with("quantity", Value::Int(2))
            .with("is_spare", Value::Bool(false))
    }

    fn sample() -> Dataset {
        let mut d = Dataset::new();
        d.set_table(
            "items",
            vec![Record::new().with("id", "10030-1".into()).with("name", "Star Destroyer".into())],
        );
        d.set_table(
            "revisions",
            vec![Record::new().with("item_id", "10030-1".into()).with("version", Value::Int(1))],
        );
        d.set_table(
            "components",
            vec![
                Record::new().with("id", "3001".into()),
                Record::new().with("id", "3002".into()),
            ],
        );
        d.set_table("variants", vec![Record::new().with("id", Value::Int(4))]);
        d.set_table(
            "compositions",
            vec![
                composition("10030-1", "3001", 4),
                composition("10030-1", "3002", 4),
                composition("10030-1", "9999", 4),
                composition("10030-1", "3001", 77),
            ],
        );
        d.set_table(
            "groupings",
            vec![
                Record::new().with("id", Value::Int(1)).with("name", "Star Wars".into()),
                Record::new()
                    .with("id", Value::Int(2))
                    .with("name", "UCS".into())
                    .with("parent_id", Value::Int(1)),
            ],
        );
        d
    }

    #[test]
    fn test_primary_lookups() {
        let index = CatalogIndex::build(sample());
        assert_eq!(index.item("10030-1").and_then(|r| r.text("name")), Some("Star Destroyer"));
        assert!(index.component("3001").is_some());
        assert!(index.variant("4").is_some());
        assert!(index.revision("10030-1|1").is_some());
        assert!(index.component("nope").is_none());
        assert!(index.get("no_such_table", "1").is_none());
    }

    #[test]
    fn test_unresolved_compositions_excluded() {
        let index = CatalogIndex::build(sample());
        let ids: Vec<_> = index
            .compositions_for_revision("10030-1|1")
            .filter_map(|r| r.key_text("component_id"))
            .collect();
        assert_eq!(ids, vec!["3001", "3002"]);
        assert_eq!(index.unresolved_compositions(), 2);
        assert_eq!(index.table("compositions").len(), 4);
    }

    #[test]
    fn test_grouping_hierarchy() {
        let index = CatalogIndex::build(sample());
        assert_eq!(index.groupings_under("1").count(), 1);
        let path: Vec<_> = index.grouping_path("2").iter().filter_map(|r| r.text("name")).collect();
        assert_eq!(path, vec!["UCS", "Star Wars"]);
    }

    #[test]
    fn test_grouping_cycle_terminates() {
        let mut d = Dataset::new();
        d.set_table(
            "groupings",
            vec![
                Record::new().with("id", Value::Int(1)).with("parent_id", Value::Int(2)),
                Record::new().with("id", Value::Int(2)).with("parent_id", Value::Int(1)),
            ],
        );
        let index = CatalogIndex::build(d);
        assert_eq!(index.grouping_path("1").len(), 2);
    }

    #[test]
    fn test_relationship_lookups() {
        let mut d = Dataset::new();
        d.set_table(
            "relationships",
            vec![Record::new()
                .with("kind", "M".into())
                .with("child_id", "3001a".into())
                .with("parent_id", "3001".into())],
        );
        let index = CatalogIndex::build(d);
        assert_eq!(index.parents_of("3001a").count(), 1);
        assert_eq!(index.children_of("3001").count(), 1);
        assert_eq!(index.children_of("3001a").count(), 0);
    }

    #[test]
    fn test_build_once_is_noop_on_second_call() {
        let cell = IndexCell::new();
        assert!(cell.get().is_none());
        cell.build_once(sample());
        let second = cell.build_once(Dataset::new());
        assert_eq!(second.table("compositions").len(), 4);
        assert!(cell.is_built());
    }
}
