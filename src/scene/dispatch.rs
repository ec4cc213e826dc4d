//! Veldtoegang, afhandeling van eventIns, uitwaaieren van eventOuts en routes.

use std::rc::Rc;

use super::{Scene, SceneError, SceneResult};
use crate::graph::event::Event;
use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::route::Route;
use crate::graph::value::{FieldType, FieldValue};

/// Grootste bewerkingsafstand voor een "bedoelde je"-suggestie.
const SUGGESTION_DISTANCE: usize = 2;

impl Scene {
    // ─────────────────────────────────────────────────────────────────────
    // Velden
    // ─────────────────────────────────────────────────────────────────────

    /// Ruw opgeslagen waarde van een veld of eventOut-slot, zonder
    /// PROTO-doorgifte of diagnostiek.
    #[must_use]
    pub fn field(&self, id: NodeId, name: &str) -> Option<&FieldValue> {
        let node = self.node(id)?;
        let declarations = node.node_type().declarations();
        let storage = declarations
            .resolve_storage(name)
            .map_or(name, |(storage, _)| storage);
        node.field(storage)
    }

    /// Leest een veld, een exposedField via zijn `_changed`-naam of de laatst
    /// verstuurde waarde van een eventOut. PROTO-instanties lezen hun eerste
    /// IS-doel.
    pub fn get_field(&self, id: NodeId, name: &str) -> SceneResult<FieldValue> {
        let node = self.require(id)?;
        if let Some(instance) = node.proto_instance() {
            let base = name.strip_suffix("_changed").unwrap_or(name);
            if let Some(target) = instance.targets(name).first().or_else(|| instance.targets(base).first()) {
                return self.get_field(target.node, &target.field);
            }
        }

        let declarations = node.node_type().declarations();
        let Some((storage, _)) = declarations.resolve_storage(name) else {
            drop(declarations);
            return Err(self.unknown_interface(id, name));
        };
        node.field(storage)
            .cloned()
            .ok_or_else(|| SceneError::UnknownNode(id))
    }

    /// Schrijft met typecontrole en markeert de node als gewijzigd.
    /// Nodeverwijzingen worden geretaind en vrijgegeven; PROTO-instanties
    /// schrijven ook elk IS-doel.
    pub fn set_field(&mut self, id: NodeId, name: &str, value: FieldValue) -> SceneResult<()> {
        let node = self.require(id)?;
        let node_type = Rc::clone(node.node_type());
        let resolved = node_type
            .declarations()
            .resolve_storage(name)
            .map(|(storage, field_type)| (storage.to_owned(), field_type));
        let Some((storage, field_type)) = resolved else {
            return Err(self.unknown_interface(id, name));
        };
        self.check_type(id, name, field_type, &value)?;

        let targets = node
            .proto_instance()
            .map(|instance| instance.targets(&storage).to_vec())
            .unwrap_or_default();
        for target in targets {
            if let Err(err) = self.set_field(target.node, &target.field, value.clone()) {
                log::warn!("IS-doorgifte naar {}.{} mislukt: {err}", target.node, target.field);
            }
        }

        self.store_field(id, &storage, value);
        self.set_modified(id);
        if node_type
            .class()
            .is_some_and(|class| class.affects_bounds(&storage))
        {
            self.set_bvolume_dirty(id, true);
        }
        Ok(())
    }

    /// Slaat een waarde op en houdt de referentietellers bij.
    pub(crate) fn store_field(&mut self, id: NodeId, storage: &str, value: FieldValue) {
        let added = value.node_refs();
        for child in &added {
            if let Err(err) = self.retain(*child) {
                log::warn!("kan node {child} niet vasthouden: {err}");
            }
        }
        let previous = self
            .node_mut(id)
            .and_then(|node| node.store_field(storage, value));
        if let Some(previous) = previous {
            for child in previous.node_refs() {
                self.release(child);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────

    /// Levert een event af bij een node.
    ///
    /// PROTO-instanties geven door aan hun IS-doelen. Ingebouwde klassen
    /// krijgen eerst de kans op klassespecifieke eventIns; de rest volgt de
    /// exposedField-regels van [`Scene::base_event_in`].
    pub fn event_in(
        &mut self,
        id: NodeId,
        name: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> SceneResult<()> {
        let node = self.require(id)?;
        let node_type = Rc::clone(node.node_type());

        if node.proto_instance().is_some() && self.proto_event_in(id, name, value, timestamp)? {
            return Ok(());
        }
        if let Some(class) = node_type.class() {
            if class.process_event(self, id, name, value, timestamp)? {
                return Ok(());
            }
        }
        self.base_event_in(id, name, value, timestamp)
    }

    /// `set_foo` op exposedField `foo` slaat de waarde op, stuurt
    /// `foo_changed` en markeert de node als gewijzigd. Een gewone eventIn met
    /// een gelijknamig veld slaat op en markeert. Een kale exposedField-naam
    /// geldt als zijn `set_`-eventIn.
    pub fn base_event_in(
        &mut self,
        id: NodeId,
        name: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> SceneResult<()> {
        let node_type = Rc::clone(self.require(id)?.node_type());
        let declarations = node_type.declarations();

        let exposed = match name.strip_prefix("set_") {
            Some(base) => declarations.has_exposed_field(base).map(|t| (base, t)),
            None => declarations.has_exposed_field(name).map(|t| (name, t)),
        };
        if let Some((base, field_type)) = exposed {
            let base = base.to_owned();
            drop(declarations);
            self.check_type(id, name, field_type, value)?;
            self.set_field(id, &base, value.clone())?;
            self.event_out(id, &format!("{base}_changed"), value, timestamp);
            return Ok(());
        }

        if let Some(field_type) = declarations.has_event_in(name) {
            let backed = declarations.has_field(name).is_some();
            drop(declarations);
            self.check_type(id, name, field_type, value)?;
            if backed {
                return self.set_field(id, name, value.clone());
            }
            return Err(self.unhandled_event_in(id, name));
        }

        drop(declarations);
        Err(self.unknown_interface(id, name))
    }

    /// Stuurt `value` langs elke route die uit `name` vertrekt. Aflevering
    /// gebeurt bij het volgende leeglopen van de wachtrij, nooit synchroon.
    /// Geeft het aantal toegevoegde events terug.
    pub fn event_out(&mut self, id: NodeId, name: &str, value: &FieldValue, timestamp: f64) -> usize {
        let Some(node) = self.node(id) else {
            return 0;
        };
        let is_slot = {
            let declarations = node.node_type().declarations();
            declarations.has_event_out(name).is_some() && declarations.exposed_base(name).is_none()
        };
        if is_slot {
            // Slots bezitten nodewaarden zoals velden.
            self.store_field(id, name, value.clone());
        }
        let Some(node) = self.node(id) else {
            return 0;
        };

        let events: Vec<Event> = node
            .routes()
            .iter()
            .filter(|route| route.from_event_out == name)
            .map(|route| Event::new(timestamp, value.clone(), route.to_node, route.to_event_in.clone()))
            .collect();
        let forwards: Vec<_> = node
            .is_forwards
            .iter()
            .filter(|forward| forward.event_out == name)
            .cloned()
            .collect();

        let mut queued = events.len();
        for event in events {
            if let Some(evicted) = self.queue.push(event) {
                log::trace!(
                    "event queue vol, {}.{} verdrongen",
                    evicted.to_node,
                    evicted.to_event_in
                );
            }
        }
        for forward in forwards {
            queued += self.event_out(forward.proto, &forward.proto_event_out, value, timestamp);
        }
        queued
    }

    // ─────────────────────────────────────────────────────────────────────
    // Routes
    // ─────────────────────────────────────────────────────────────────────

    /// Verbindt `from.from_event_out` met `to.to_event_in`. Kale
    /// exposedField-namen mogen aan beide kanten. Geeft `false` als de route
    /// al bestaat.
    pub fn add_route(
        &mut self,
        from: NodeId,
        from_event_out: &str,
        to: NodeId,
        to_event_in: &str,
    ) -> SceneResult<bool> {
        let route = self.resolve_route(from, from_event_out, to, to_event_in)?;
        let node = self.node_mut(from).ok_or(SceneError::UnknownNode(from))?;
        Ok(node.add_route(route))
    }

    pub fn delete_route(
        &mut self,
        from: NodeId,
        from_event_out: &str,
        to: NodeId,
        to_event_in: &str,
    ) -> SceneResult<bool> {
        let route = self.resolve_route(from, from_event_out, to, to_event_in)?;
        let node = self.node_mut(from).ok_or(SceneError::UnknownNode(from))?;
        Ok(node.delete_route(&route))
    }

    fn resolve_route(
        &self,
        from: NodeId,
        from_event_out: &str,
        to: NodeId,
        to_event_in: &str,
    ) -> SceneResult<Route> {
        let from_type = Rc::clone(self.require(from)?.node_type());
        let to_type = Rc::clone(self.require(to)?.node_type());

        let out = from_type.declarations().resolve_event_out(from_event_out);
        let Some((out_name, out_type)) = out else {
            return Err(self.unknown_interface(from, from_event_out));
        };
        let input = to_type.declarations().resolve_event_in(to_event_in);
        let Some((in_name, in_type)) = input else {
            return Err(self.unknown_interface(to, to_event_in));
        };
        if out_type != in_type {
            return Err(self.type_mismatch(to, &in_name, in_type, out_type));
        }
        Ok(Route::new(from, out_name, to, in_name))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Vlaggen
    // ─────────────────────────────────────────────────────────────────────

    /// Markeert een node als gewijzigd; de scene moet opnieuw renderen.
    pub fn set_modified(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.set_modified_flag(true);
            self.modified = true;
        }
    }

    pub fn clear_modified(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.set_modified_flag(false);
        }
    }

    #[must_use]
    pub fn is_node_modified(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.is_modified())
    }

    /// Dirty markeren stelt de ronde langs de voorouders uit tot de vlag weer gelezen wordt.
    pub fn set_bvolume_dirty(&mut self, id: NodeId, dirty: bool) {
        if let Some(node) = self.node_mut(id) {
            node.set_bvolume_dirty_flag(dirty);
            if dirty {
                self.flags_need_updating = true;
            }
        }
    }

    /// Of de omhulling van de node of iets eronder veranderde. Voert eerst de
    /// uitgestelde propagatie naar de voorouders uit.
    pub fn is_bvolume_dirty(&mut self, id: NodeId) -> bool {
        if self.flags_need_updating {
            self.update_flags();
        }
        self.node(id).is_some_and(|node| node.bvolume_dirty_flag())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Diagnostiek
    // ─────────────────────────────────────────────────────────────────────

    fn check_type(
        &self,
        id: NodeId,
        name: &str,
        expected: FieldType,
        value: &FieldValue,
    ) -> SceneResult<()> {
        if value.field_type() == expected {
            Ok(())
        } else {
            Err(self.type_mismatch(id, name, expected, value.field_type()))
        }
    }

    pub(crate) fn type_mismatch(
        &self,
        id: NodeId,
        name: &str,
        expected: FieldType,
        found: FieldType,
    ) -> SceneError {
        let error = SceneError::TypeMismatch {
            node: self.identity(id),
            name: name.to_owned(),
            expected,
            found,
        };
        log::warn!("{error}");
        error
    }

    pub(crate) fn unknown_interface(&self, id: NodeId, name: &str) -> SceneError {
        let (type_name, suggestion) = match self.node(id) {
            Some(node) => (
                node.type_name().to_owned(),
                suggest(&node.node_type().declarations(), name),
            ),
            None => (String::from("?"), None),
        };
        let error = SceneError::UnknownInterface {
            type_name,
            name: name.to_owned(),
            node: self.identity(id),
            suggestion,
        };
        log::warn!("{error}");
        error
    }

    pub(crate) fn unhandled_event_in(&self, id: NodeId, name: &str) -> SceneError {
        let error = SceneError::UnhandledEventIn {
            type_name: self
                .node(id)
                .map_or_else(String::new, |node| node.type_name().to_owned()),
            name: name.to_owned(),
            node: self.identity(id),
        };
        log::warn!("{error}");
        error
    }

    fn identity(&self, id: NodeId) -> String {
        self.node(id)
            .map_or_else(|| id.to_string(), |node| node.identity())
    }
}

/// Dichtstbijzijnde gedeclareerde naam binnen [`SUGGESTION_DISTANCE`] bewerkingen.
fn suggest(declarations: &Declarations, name: &str) -> Option<String> {
    declarations
        .names()
        .map(|candidate| (levenshtein::levenshtein(candidate, name), candidate))
        .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate.to_owned())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::graph::node::NodeId;
    use crate::graph::value::FieldValue;
    use crate::scene::{Scene, SceneError};

    fn scene_with(types: &[&str]) -> (Scene, Vec<NodeId>) {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let ids = types
            .iter()
            .map(|name| scene.create_node_by_name(name, &scope).unwrap())
            .collect();
        (scene, ids)
    }

    #[test]
    fn set_exposed_field_stores_and_fans_out_once_per_route() {
        let (mut scene, ids) = scene_with(&["Transform", "Transform", "Transform"]);
        let (source, first, second) = (ids[0], ids[1], ids[2]);
        scene.add_route(source, "translation_changed", first, "set_translation").unwrap();
        scene.add_route(source, "translation", second, "translation").unwrap();

        let value = FieldValue::SFVec3f([1.0, 2.0, 3.0]);
        scene.event_in(source, "set_translation", &value, 1.0).unwrap();

        assert_eq!(scene.get_field(source, "translation").unwrap(), value);
        assert!(scene.is_node_modified(source));
        let queued: Vec<_> = scene.queue().iter().map(|e| e.to_node).collect();
        assert_eq!(queued, vec![first, second]);
        assert!(scene.queue().iter().all(|e| e.value == value && e.to_event_in == "set_translation"));
        assert_eq!(
            scene.get_field(first, "translation").unwrap(),
            FieldValue::SFVec3f([0.0; 3])
        );
    }

    #[test]
    fn duplicate_routes_collapse_after_name_normalization() {
        let (mut scene, ids) = scene_with(&["TimeSensor", "ScalarInterpolator"]);
        assert!(scene.add_route(ids[0], "fraction_changed", ids[1], "set_fraction").unwrap());
        assert!(!scene.add_route(ids[0], "fraction_changed", ids[1], "set_fraction").unwrap());
        assert_eq!(scene.node(ids[0]).unwrap().routes().len(), 1);
        assert!(scene.delete_route(ids[0], "fraction_changed", ids[1], "set_fraction").unwrap());
        assert!(scene.node(ids[0]).unwrap().routes().is_empty());
    }

    #[test]
    fn route_type_mismatch_is_rejected() {
        let (mut scene, ids) = scene_with(&["TimeSensor", "Transform"]);
        assert!(matches!(
            scene.add_route(ids[0], "fraction_changed", ids[1], "set_translation"),
            Err(SceneError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_interface_suggests_close_name() {
        let (mut scene, ids) = scene_with(&["Transform"]);
        let err = scene
            .event_in(ids[0], "set_translaton", &FieldValue::SFVec3f([0.0; 3]), 0.0)
            .unwrap_err();
        match err {
            SceneError::UnknownInterface { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("set_translation"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wrong_value_type_leaves_state_unchanged() {
        let (mut scene, ids) = scene_with(&["Transform"]);
        let before = scene.get_field(ids[0], "scale").unwrap();
        assert!(matches!(
            scene.event_in(ids[0], "set_scale", &FieldValue::SFFloat(2.0), 0.0),
            Err(SceneError::TypeMismatch { .. })
        ));
        assert_eq!(scene.get_field(ids[0], "scale").unwrap(), before);
        assert!(!scene.is_node_modified(ids[0]));
        assert!(scene.queue().is_empty());
    }

    #[test]
    fn event_out_is_never_delivered_synchronously() {
        let (mut scene, ids) = scene_with(&["Transform", "Transform"]);
        scene.add_route(ids[0], "translation_changed", ids[1], "set_translation").unwrap();
        let value = FieldValue::SFVec3f([5.0, 0.0, 0.0]);
        assert_eq!(scene.event_out(ids[0], "translation_changed", &value, 1.0), 1);
        assert_eq!(
            scene.get_field(ids[1], "translation").unwrap(),
            FieldValue::SFVec3f([0.0; 3])
        );
        scene.update(1.0);
        assert_eq!(scene.get_field(ids[1], "translation").unwrap(), value);
    }

    #[test]
    fn node_valued_event_out_holds_its_reference() {
        let mut scene = Scene::default();
        scene
            .load_str(
                r#"<Scene>
                    <ProtoDeclare name="Emitter">
                      <ProtoInterface>
                        <field name="nodeOut" type="SFNode" accessType="outputOnly"/>
                      </ProtoInterface>
                      <ProtoBody><Group/></ProtoBody>
                    </ProtoDeclare>
                    <ProtoInstance DEF="E" name="Emitter"/>
                    <Group DEF="Keep"/>
                </Scene>"#,
                None,
            )
            .unwrap();
        let emitter = scene.find_node("E").unwrap();
        let keep = scene.find_node("Keep").unwrap();

        scene.event_out(emitter, "nodeOut", &FieldValue::SFNode(Some(keep)), 1.0);
        assert_eq!(scene.node(keep).map(|node| node.ref_count()), Some(2));
        scene.event_out(emitter, "nodeOut", &FieldValue::SFNode(None), 2.0);
        assert_eq!(scene.node(keep).map(|node| node.ref_count()), Some(1));

        scene.event_out(emitter, "nodeOut", &FieldValue::SFNode(Some(keep)), 3.0);
        scene.release(emitter);
        assert!(scene.node(emitter).is_none());
        assert_eq!(scene.node(keep).map(|node| node.ref_count()), Some(1));
    }
}
