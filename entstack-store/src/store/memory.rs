//! In-memory entity set

use super::{AddItem, AddOptions, CloneOptions, EntityStore, StoreConfig};
use crate::bitfield::BitField;
use crate::changeset::ChangeSets;
use crate::component::{Component, Entity, Populate};
use crate::def::{ComponentDef, DefSchema};
use crate::error::{Result, StoreError};
use crate::registry::{DefRegistry, Registration};
use entstack_types::{ComponentId, DefId, EntityId, UNASSIGNED};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// The default, single-process store
///
/// Entities are kept as a table of bitfields and components as a table keyed
/// by `(entity, def)`. An entity with an empty bitfield is never kept.
#[derive(Debug, Clone)]
pub struct EntitySet {
    uuid: Uuid,
    config: StoreConfig,
    registry: DefRegistry,
    entities: BTreeMap<EntityId, BitField>,
    components: BTreeMap<ComponentId, Component>,
    changes: ChangeSets,
    /// `None` once `EntityId::MAX` has been handed out
    next_entity_id: Option<EntityId>,
}

/// Work computed from a batch before anything is written
#[derive(Debug, Default)]
struct Plan {
    upserts: BTreeMap<ComponentId, Component>,
    removals: BTreeSet<ComponentId>,
    next_entity_id: Option<EntityId>,
}

#[derive(Default)]
struct Batch {
    defs: Vec<DefSchema>,
    entities: Vec<Entity>,
    components: Vec<Component>,
}

impl Batch {
    fn collect(&mut self, item: AddItem) {
        match item {
            AddItem::Def(schema) => self.defs.push(schema),
            AddItem::Entity(entity) => self.entities.push(entity),
            AddItem::Component(component) => self.components.push(component),
            AddItem::Many(items) => {
                for item in items {
                    self.collect(item);
                }
            }
        }
    }
}

fn component_range(entity: EntityId) -> std::ops::RangeInclusive<ComponentId> {
    ComponentId::new(entity, 0)..=ComponentId::new(entity, DefId::MAX)
}

fn check_def(registry: &DefRegistry, component: &Component) -> Result<()> {
    if registry.get_by_id(component.def).is_none() {
        return Err(StoreError::InvalidComponent {
            id: component.id(),
            message: format!("def {} is not registered", component.def),
        });
    }
    Ok(())
}

fn register_in(registry: &mut DefRegistry, schema: DefSchema, allow_shadowing: bool) -> Result<DefId> {
    let uri = schema.uri.clone();
    let registration = registry.register(schema, allow_shadowing)?;
    if let Registration::Shadowed { id, previous } = registration {
        tracing::warn!(
            "{} re-registered with different content: def {} now shadows def {}",
            uri,
            id,
            previous
        );
    }
    Ok(registration.id())
}

impl EntitySet {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            config,
            registry: DefRegistry::new(),
            entities: BTreeMap::new(),
            components: BTreeMap::new(),
            changes: ChangeSets::default(),
            next_entity_id: Some(1),
        }
    }

    pub fn registry(&self) -> &DefRegistry {
        &self.registry
    }

    fn component_ids_of(&self, entity: EntityId) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.range(component_range(entity)).map(|(id, _)| *id)
    }

    /// Work out what a batch does without touching the tables
    fn plan(&self, registry: &DefRegistry, entities: Vec<Entity>, components: Vec<Component>) -> Result<Plan> {
        let explicit_max = entities
            .iter()
            .map(|e| e.id)
            .chain(components.iter().map(|c| c.entity))
            .max()
            .unwrap_or(UNASSIGNED);
        let mut plan = Plan {
            next_entity_id: explicit_max
                .checked_add(1)
                .and_then(|after| self.next_entity_id.map(|next| next.max(after))),
            ..Plan::default()
        };

        for entity in entities {
            let id = if entity.id == UNASSIGNED {
                plan.allocate()?
            } else {
                entity.id
            };
            // The incoming entity replaces the whole component set
            plan.removals.extend(self.component_ids_of(id));
            for (_, mut component) in entity.components {
                component.entity = id;
                check_def(registry, &component)?;
                plan.upserts.insert(component.id(), component);
            }
        }

        let mut current: Option<EntityId> = None;
        let mut seen = BitField::new();
        for mut component in components {
            check_def(registry, &component)?;
            if !component.has_entity() {
                let id = match current {
                    Some(id) if !seen.get(component.def) => id,
                    _ => {
                        seen = BitField::new();
                        let id = plan.allocate()?;
                        current = Some(id);
                        id
                    }
                };
                seen.set(component.def);
                component.entity = id;
            }
            plan.upserts.insert(component.id(), component);
        }

        let kept: Vec<ComponentId> = plan.upserts.keys().copied().collect();
        for id in kept {
            plan.removals.remove(&id);
        }
        Ok(plan)
    }

    fn apply(&mut self, plan: Plan, debug: bool) {
        self.next_entity_id = plan.next_entity_id;

        for (id, component) in plan.upserts {
            match self.components.get(&id) {
                Some(existing) if existing.same_content(&component) => {}
                Some(_) => {
                    if debug {
                        tracing::debug!("update component {}", id);
                    }
                    self.components.insert(id, component);
                    self.changes.components.update(id);
                    self.changes.entities.update(id.entity);
                }
                None => {
                    if debug {
                        tracing::debug!("add component {}", id);
                    }
                    self.components.insert(id, component);
                    self.changes.components.add(id);
                    match self.entities.get_mut(&id.entity) {
                        Some(bf) => {
                            bf.set(id.def);
                            self.changes.entities.update(id.entity);
                        }
                        None => {
                            self.entities.insert(id.entity, BitField::from_ids([id.def]));
                            self.changes.entities.add(id.entity);
                        }
                    }
                }
            }
        }

        self.apply_removals(plan.removals, debug);
    }

    fn apply_removals(&mut self, removals: BTreeSet<ComponentId>, debug: bool) {
        let mut touched = BTreeSet::new();
        for id in removals {
            if self.components.remove(&id).is_none() {
                continue;
            }
            if debug {
                tracing::debug!("remove component {}", id);
            }
            self.changes.components.remove(id);
            if let Some(bf) = self.entities.get_mut(&id.entity) {
                bf.clear(id.def);
            }
            touched.insert(id.entity);
        }

        for entity in touched {
            let empty = self
                .entities
                .get(&entity)
                .map(|bf| bf.is_empty())
                .unwrap_or(false);
            if empty {
                if debug {
                    tracing::debug!("remove entity {}", entity);
                }
                self.entities.remove(&entity);
                self.changes.entities.remove(entity);
            } else {
                self.changes.entities.update(entity);
            }
        }
    }

    fn log_summary(&self, op: &str) {
        tracing::info!(
            "{} on {}: entities +{} ~{} -{}, components +{} ~{} -{}",
            op,
            &self.uuid.to_string()[..8],
            self.changes.entities.added.len(),
            self.changes.entities.updated.len(),
            self.changes.entities.removed.len(),
            self.changes.components.added.len(),
            self.changes.components.updated.len(),
            self.changes.components.removed.len(),
        );
    }
}

impl Plan {
    fn allocate(&mut self) -> Result<EntityId> {
        let id = self.next_entity_id.ok_or(StoreError::IdsExhausted("entity"))?;
        self.next_entity_id = id.checked_add(1);
        Ok(id)
    }
}

impl Default for EntitySet {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for EntitySet {
    fn uuid(&self) -> String {
        self.uuid.to_string()
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn register(&mut self, schema: DefSchema) -> Result<ComponentDef> {
        let id = register_in(&mut self.registry, schema, self.config.allow_def_shadowing)?;
        self.registry
            .get_by_id(id)
            .cloned()
            .ok_or_else(|| StoreError::DefNotFound(id.to_string()))
    }

    fn def_by_id(&self, id: DefId) -> Option<ComponentDef> {
        self.registry.get_by_id(id).cloned()
    }

    fn def_by_uri(&self, uri: &str) -> Option<ComponentDef> {
        self.registry.get_by_uri(uri).cloned()
    }

    fn def_by_hash(&self, hash: &str) -> Option<ComponentDef> {
        self.registry.get_by_hash(hash).cloned()
    }

    fn defs(&self) -> Vec<ComponentDef> {
        self.registry.iter().cloned().collect()
    }

    fn add(&mut self, item: AddItem, options: AddOptions) -> Result<&ChangeSets> {
        let mut batch = Batch::default();
        batch.collect(item);

        // Batch defs go into a staged registry; nothing is written until the plan succeeds
        let staged = if batch.defs.is_empty() {
            None
        } else {
            let mut registry = self.registry.clone();
            for schema in batch.defs {
                register_in(&mut registry, schema, self.config.allow_def_shadowing)?;
            }
            Some(registry)
        };
        let plan = self.plan(
            staged.as_ref().unwrap_or(&self.registry),
            batch.entities,
            batch.components,
        )?;

        if !options.retain {
            self.changes.clear();
        }
        if let Some(registry) = staged {
            self.registry = registry;
        }
        self.apply(plan, options.debug);
        self.log_summary("add");
        Ok(&self.changes)
    }

    fn remove_components(&mut self, ids: &[ComponentId], options: AddOptions) -> Result<&ChangeSets> {
        if !options.retain {
            self.changes.clear();
        }
        self.apply_removals(ids.iter().copied().collect(), options.debug);
        self.log_summary("remove");
        Ok(&self.changes)
    }

    fn remove_entities(&mut self, ids: &[EntityId], options: AddOptions) -> Result<&ChangeSets> {
        if !options.retain {
            self.changes.clear();
        }
        let removals: BTreeSet<ComponentId> = ids
            .iter()
            .flat_map(|id| self.component_ids_of(*id).collect::<Vec<_>>())
            .collect();
        self.apply_removals(removals, options.debug);
        self.log_summary("remove");
        Ok(&self.changes)
    }

    fn get_entity(&self, id: EntityId, populate: Populate) -> Option<Entity> {
        let bitfield = self.entities.get(&id)?.clone();
        let components = self
            .components
            .range(component_range(id))
            .filter(|(cid, _)| populate.includes(cid.def))
            .map(|(cid, c)| (cid.def, c.clone()))
            .collect();
        Some(Entity {
            id,
            bitfield,
            components,
        })
    }

    fn get_component(&self, id: ComponentId) -> Option<Component> {
        self.components.get(&id).cloned()
    }

    fn entity_bitfield(&self, id: EntityId) -> Option<BitField> {
        self.entities.get(&id).cloned()
    }

    fn entity_ids(&self) -> Box<dyn Iterator<Item = EntityId> + '_> {
        Box::new(self.entities.keys().copied())
    }

    fn components(&self) -> Box<dyn Iterator<Item = Component> + '_> {
        Box::new(self.components.values().cloned())
    }

    fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn component_count(&self) -> usize {
        self.components.len()
    }

    fn changes(&self) -> &ChangeSets {
        &self.changes
    }

    fn clear_changes(&mut self) {
        self.changes.clear();
    }

    fn clone_store(&self, options: CloneOptions) -> Result<Box<dyn EntityStore>> {
        let mut clone = EntitySet::with_config(self.config.clone());
        // Components are meaningless without their defs
        if options.clone_defs || options.clone_entities {
            clone.registry = self.registry.clone();
        }
        if options.clone_entities {
            clone.entities = self.entities.clone();
            clone.components = self.components.clone();
            clone.next_entity_id = self.next_entity_id;
        }
        Ok(Box::new(clone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::PropertyType;
    use proptest::prelude::*;
    use serde_json::json;

    fn store_with_defs(uris: &[&str]) -> (EntitySet, Vec<DefId>) {
        let mut es = EntitySet::new();
        let ids = uris
            .iter()
            .map(|uri| {
                es.register(DefSchema::new(*uri).property("value", PropertyType::Json))
                    .unwrap()
                    .id
            })
            .collect();
        (es, ids)
    }

    fn assert_consistent(es: &EntitySet) {
        for id in es.entity_ids() {
            let e = es.get_entity(id, Populate::All).unwrap();
            assert!(e.bitfield.count() > 0);
            assert_eq!(e.bitfield.count(), e.components.len());
            for def in e.bitfield.ids() {
                assert!(e.components.contains_key(&def));
            }
        }
    }

    #[test]
    fn test_add_entity() {
        let (mut es, ids) = store_with_defs(&["/component/title", "/component/completed"]);
        let e = Entity::new(100)
            .with_component(Component::new(ids[0]).with("text", "get out of bed"))
            .with_component(Component::new(ids[1]).with("isComplete", true));

        let changes = es.add(e.into(), AddOptions::default()).unwrap();
        assert!(changes.entities.is_added(&100));
        assert_eq!(changes.components.added.len(), 2);

        let stored = es.get_entity(100, Populate::All).unwrap();
        assert_eq!(stored.size(), 2);
        assert_eq!(
            stored.component(ids[0]).unwrap().get("text"),
            Some(&json!("get out of bed"))
        );
        assert_consistent(&es);
    }

    #[test]
    fn test_readd_entity_reconciles() {
        let (mut es, d) = store_with_defs(&["/a", "/b", "/c", "/d", "/e"]);
        let (a, b, c, dd, e) = (d[0], d[1], d[2], d[3], d[4]);

        let first = Entity::new(15)
            .with_component(Component::new(a))
            .with_component(Component::new(b).with("value", 1))
            .with_component(Component::new(c));
        es.add(first.into(), AddOptions::default()).unwrap();

        let second = Entity::new(15)
            .with_component(Component::new(dd))
            .with_component(Component::new(b).with("value", 1))
            .with_component(Component::new(e));
        let changes = es.add(second.into(), AddOptions::default()).unwrap().clone();

        let stored = es.get_entity(15, Populate::All).unwrap();
        assert_eq!(stored.bitfield.ids().collect::<Vec<_>>(), vec![b, dd, e]);

        let cid = |def| ComponentId::new(15, def);
        assert!(changes.components.is_removed(&cid(a)));
        assert!(changes.components.is_removed(&cid(c)));
        assert!(changes.components.is_added(&cid(dd)));
        assert!(changes.components.is_added(&cid(e)));
        assert!(!changes.components.is_updated(&cid(b)));
        assert!(!changes.components.is_added(&cid(b)));
        assert!(changes.entities.is_updated(&15));
        assert_consistent(&es);
    }

    #[test]
    fn test_changed_content_is_update() {
        let (mut es, d) = store_with_defs(&["/a"]);
        es.add(Component::new(d[0]).with_entity(3).with("value", 1).into(), AddOptions::default())
            .unwrap();
        let changes = es
            .add(Component::new(d[0]).with_entity(3).with("value", 2).into(), AddOptions::default())
            .unwrap();
        assert!(changes.components.is_updated(&ComponentId::new(3, d[0])));
        assert!(changes.entities.is_updated(&3));
    }

    #[test]
    fn test_loose_components_split_on_repeat() {
        let (mut es, d) = store_with_defs(&["/a", "/b"]);
        let batch = vec![
            Component::new(d[0]),
            Component::new(d[1]),
            Component::new(d[0]),
            Component::new(d[1]),
            Component::new(d[1]),
        ];
        es.add(batch.into(), AddOptions::default()).unwrap();
        assert_eq!(es.entity_count(), 3);
        let sizes: Vec<usize> = es
            .entity_ids()
            .map(|id| es.entity_bitfield(id).unwrap().count())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_empty_entity_not_stored() {
        let (mut es, _) = store_with_defs(&["/a"]);
        es.add(Entity::new(9).into(), AddOptions::default()).unwrap();
        assert_eq!(es.entity_count(), 0);
    }

    #[test]
    fn test_remove_last_component_removes_entity() {
        let (mut es, d) = store_with_defs(&["/a", "/b"]);
        let e = Entity::new(4)
            .with_component(Component::new(d[0]))
            .with_component(Component::new(d[1]));
        es.add(e.into(), AddOptions::default()).unwrap();

        let changes = es.remove_component(ComponentId::new(4, d[0])).unwrap();
        assert!(changes.entities.is_updated(&4));
        let changes = es.remove_component(ComponentId::new(4, d[1])).unwrap();
        assert!(changes.entities.is_removed(&4));
        assert!(es.is_empty());
    }

    #[test]
    fn test_remove_entity_cascades() {
        let (mut es, d) = store_with_defs(&["/a", "/b"]);
        let e = Entity::new(4)
            .with_component(Component::new(d[0]))
            .with_component(Component::new(d[1]));
        es.add(e.into(), AddOptions::default()).unwrap();
        es.remove_entity(4).unwrap();
        assert_eq!(es.component_count(), 0);
        assert_eq!(es.entity_count(), 0);
    }

    #[test]
    fn test_unknown_def_aborts_batch() {
        let (mut es, d) = store_with_defs(&["/a"]);
        let batch = vec![Component::new(d[0]).with_entity(1), Component::new(42).with_entity(1)];
        let err = es.add(batch.into(), AddOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidComponent { .. }));
        assert_eq!(es.component_count(), 0);
    }

    #[test]
    fn test_failed_batch_registers_nothing() {
        let (mut es, d) = store_with_defs(&["/a"]);
        es.add(Component::new(d[0]).with_entity(1).into(), AddOptions::default())
            .unwrap();

        let batch = AddItem::Many(vec![
            DefSchema::new("/b").into(),
            Component::new(9).with_entity(1).into(),
        ]);
        let err = es.add(batch, AddOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidComponent { .. }));
        assert_eq!(es.defs().len(), 1);
        assert!(es.def_by_uri("/b").is_none());
        // the previous call's changes are still reported
        assert!(es.changes().entities.is_added(&1));
    }

    #[test]
    fn test_batch_def_is_usable_in_same_batch() {
        let (mut es, _) = store_with_defs(&["/a"]);
        let batch = AddItem::Many(vec![
            DefSchema::new("/b").into(),
            Component::new(2).with_entity(1).into(),
        ]);
        es.add(batch, AddOptions::default()).unwrap();
        assert_eq!(es.def_by_uri("/b").unwrap().id, 2);
        assert_eq!(es.entity_bitfield(1).unwrap().ids().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_entity_ids_run_out() {
        let (mut es, d) = store_with_defs(&["/a"]);
        let batch = AddItem::Many(vec![
            Entity::new(EntityId::MAX)
                .with_component(Component::new(d[0]))
                .into(),
            Component::new(d[0]).into(),
        ]);
        let err = es.add(batch, AddOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::IdsExhausted("entity")));
        assert!(es.is_empty());

        // the last id can still be used explicitly
        es.add(Component::new(d[0]).with_entity(EntityId::MAX).into(), AddOptions::default())
            .unwrap();
        let err = es.add(Component::new(d[0]).into(), AddOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::IdsExhausted("entity")));
        assert_eq!(es.entity_count(), 1);
    }

    #[test]
    fn test_loose_components_get_fresh_ids() {
        let (mut es, d) = store_with_defs(&["/a"]);
        es.add(Component::new(d[0]).with_entity(7).into(), AddOptions::default())
            .unwrap();
        es.add(Component::new(d[0]).into(), AddOptions::default()).unwrap();
        assert_eq!(es.entity_ids().collect::<Vec<_>>(), vec![7, 8]);
    }

    #[test]
    fn test_shadowed_def_keeps_old_components() {
        let mut es = EntitySet::new();
        let old = es
            .register(DefSchema::new("/a").property("x", PropertyType::Integer))
            .unwrap();
        es.add(Component::new(old.id).with_entity(1).with("x", 1).into(), AddOptions::default())
            .unwrap();

        let new = es
            .register(
                DefSchema::new("/a")
                    .property("x", PropertyType::Integer)
                    .property("y", PropertyType::Integer),
            )
            .unwrap();
        assert_ne!(old.id, new.id);
        assert_eq!(es.def_by_uri("/a").unwrap().id, new.id);

        let stored = es.get_entity(1, Populate::All).unwrap();
        assert_eq!(stored.bitfield.ids().collect::<Vec<_>>(), vec![old.id]);
        assert_eq!(stored.component(old.id).unwrap().get("x"), Some(&json!(1)));
        assert_eq!(es.def_by_id(old.id).unwrap().properties.len(), 1);
        assert_eq!(es.def_by_hash(&old.hash).unwrap().id, old.id);
    }

    #[test]
    fn test_retain_merges_changes() {
        let (mut es, d) = store_with_defs(&["/a", "/b"]);
        es.add(Component::new(d[0]).with_entity(1).into(), AddOptions::default())
            .unwrap();
        let changes = es
            .add(Component::new(d[1]).with_entity(2).into(), AddOptions::retain())
            .unwrap();
        assert!(changes.entities.is_added(&1));
        assert!(changes.entities.is_added(&2));
    }

    #[test]
    fn test_populate_only() {
        let (mut es, d) = store_with_defs(&["/a", "/b"]);
        let e = Entity::new(1)
            .with_component(Component::new(d[0]))
            .with_component(Component::new(d[1]));
        es.add(e.into(), AddOptions::default()).unwrap();

        let partial = es
            .get_entity(1, Populate::Only(BitField::from_ids([d[1]])))
            .unwrap();
        assert_eq!(partial.components.len(), 1);
        assert_eq!(partial.bitfield.count(), 2);
        assert!(es.get_entity(1, Populate::None).unwrap().components.is_empty());
    }

    #[test]
    fn test_clone_store() {
        let (mut es, d) = store_with_defs(&["/a"]);
        es.add(Component::new(d[0]).with_entity(1).into(), AddOptions::default())
            .unwrap();

        let full = es.clone_store(CloneOptions::default()).unwrap();
        assert_eq!(full.entity_count(), 1);
        assert_ne!(full.uuid(), es.uuid());

        let defs_only = es
            .clone_store(CloneOptions {
                clone_entities: false,
                clone_defs: true,
            })
            .unwrap();
        assert_eq!(defs_only.entity_count(), 0);
        assert_eq!(defs_only.defs().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_batches_keep_bitfields_consistent(
            batches in proptest::collection::vec(
                proptest::collection::vec((1u32..6, 0usize..4, any::<bool>()), 0..12),
                1..6,
            )
        ) {
            let (mut es, d) = store_with_defs(&["/a", "/b", "/c", "/d"]);
            for batch in batches {
                let mut components = Vec::new();
                let mut removals = Vec::new();
                for (entity, def, keep) in batch {
                    if keep {
                        components.push(Component::new(d[def]).with_entity(entity));
                    } else {
                        removals.push(ComponentId::new(entity, d[def]));
                    }
                }
                let changes = es.add(components.into(), AddOptions::default()).unwrap().clone();
                for id in &changes.components.added {
                    prop_assert!(!changes.components.is_updated(id));
                    prop_assert!(!changes.components.is_removed(id));
                }
                es.remove_components(&removals, AddOptions::default()).unwrap();
                assert_consistent(&es);
            }
        }
    }
}
