//! PROTO-instanties, IS-doorgifte en het laden van EXTERNPROTO's.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use super::{Scene, SceneResult};
use crate::graph::node::{IsForward, NodeId, NodeState, ProtoInstance};
use crate::graph::node_type::{IsTarget, NodeTypeRef};
use crate::graph::scope::Scope;
use crate::graph::value::FieldValue;
use crate::resource;

impl Scene {
    /// Vouwt een vers gemaakte node met PROTO-type uit: kopieert het archetype
    /// naar een eigen scope, zet de IS-tabel om naar de kopieën en duwt de
    /// veldwaarden van de instantie door naar hun doelen.
    ///
    /// Een EXTERNPROTO waarvan de implementatie niet laadt, levert een lege
    /// instantie op die niets rendert.
    pub(crate) fn instantiate_proto(&mut self, id: NodeId, node_type: &NodeTypeRef, scope: &Rc<Scope>) {
        if !self.resolve_implementation(node_type) {
            log::warn!("PROTO {} heeft geen implementatie, instantie blijft leeg", node_type.name());
            return;
        }
        // Een EXTERNPROTO kent zijn standaardwaarden pas na het ophalen.
        if node_type
            .proto_implementation()
            .is_some_and(|implementation| implementation.actual_url.is_some())
        {
            let defaults: Vec<(String, FieldValue)> = node_type
                .declarations()
                .fields()
                .iter()
                .filter_map(|field| field.default.clone().map(|value| (field.name.clone(), value)))
                .collect();
            for (field, value) in defaults {
                self.store_field(id, &field, value);
            }
        }

        let Some((archetype, body_scope)) = node_type
            .proto_implementation()
            .map(|implementation| (implementation.nodes.clone(), implementation.scope.clone()))
        else {
            return;
        };

        let parent = body_scope.unwrap_or_else(|| Rc::clone(scope));
        let instance_scope = Scope::child(&parent, node_type.name());
        let cloned = self.clone_nodes(&archetype, &instance_scope);
        for root in &cloned.roots {
            if let Err(err) = self.retain(*root) {
                log::warn!("implementatie van {} onvolledig: {err}", node_type.name());
            }
        }

        let mut is_map: BTreeMap<String, Vec<IsTarget>> = BTreeMap::new();
        let mut forwards: Vec<(NodeId, IsForward)> = Vec::new();
        let mut initial: Vec<(IsTarget, FieldValue)> = Vec::new();
        {
            let declarations = node_type.declarations();
            for declaration in declarations.is_mapped() {
                let targets: Vec<IsTarget> = declaration
                    .is_map
                    .iter()
                    .filter_map(|target| {
                        cloned
                            .mapping
                            .get(&target.node)
                            .map(|copy| IsTarget::new(*copy, target.field.clone()))
                    })
                    .collect();

                let proto_event_out = if declarations.has_event_out(&declaration.name).is_some() {
                    Some(declaration.name.clone())
                } else if declarations.has_exposed_field(&declaration.name).is_some() {
                    Some(format!("{}_changed", declaration.name))
                } else {
                    None
                };

                for target in &targets {
                    if let Some(proto_event_out) = &proto_event_out {
                        let event_out = self.node(target.node).and_then(|node| {
                            node.node_type()
                                .declarations()
                                .resolve_event_out(&target.field)
                                .map(|(name, _)| name)
                        });
                        if let Some(event_out) = event_out {
                            forwards.push((
                                target.node,
                                IsForward {
                                    event_out,
                                    proto: id,
                                    proto_event_out: proto_event_out.clone(),
                                },
                            ));
                        }
                    }
                    if declarations.has_field(&declaration.name).is_some() {
                        if let Some(value) = self.field(id, &declaration.name) {
                            initial.push((target.clone(), value.clone()));
                        }
                    }
                }
                is_map.insert(declaration.name.clone(), targets);
            }
        }

        for (node, forward) in forwards {
            if let Some(node) = self.node_mut(node) {
                node.is_forwards.push(forward);
            }
        }
        if let Some(node) = self.node_mut(id) {
            node.state = NodeState::Proto(ProtoInstance {
                scope: instance_scope,
                implementation: cloned.roots,
                is_map,
            });
        }
        for (target, value) in initial {
            if let Err(err) = self.set_field(target.node, &target.field, value) {
                log::warn!("IS-koppeling {}.{} niet gezet: {err}", target.node, target.field);
            }
        }
    }

    /// Zorgt dat een PROTO-type een implementatie heeft en haalt een
    /// EXTERNPROTO op bij het eerste gebruik. Geeft `false` als er geen is.
    /// Een mislukte poging wordt niet herhaald. Ongebruikte PROTO's uit de
    /// bibliotheek worden meteen vrijgegeven.
    pub fn resolve_implementation(&mut self, node_type: &NodeTypeRef) -> bool {
        let urls = {
            let Some(mut implementation) = node_type.proto_implementation_mut() else {
                return false;
            };
            if implementation.loaded {
                return true;
            }
            if implementation.attempted {
                return false;
            }
            implementation.attempted = true;
            implementation.urls.clone()
        };

        for url in &urls {
            let resolved = resource::resolve(self.url.as_deref(), url);
            let (location, fragment) = resource::split_fragment(&resolved);
            let source = match self.fetcher.fetch(location) {
                Ok(source) => source,
                Err(err) => {
                    log::debug!("EXTERNPROTO {}: {err}", node_type.name());
                    continue;
                }
            };

            let library = Scope::root(location);
            let mark = self.arena.next_id();
            let parser = Rc::clone(&self.parser);
            let types = match parser.parse_prototypes(self, &source, &library) {
                Ok(types) => types,
                Err(err) => {
                    log::warn!("EXTERNPROTO {} in {location}: {err}", node_type.name());
                    self.discard_since(mark);
                    continue;
                }
            };
            let chosen = match fragment {
                Some(fragment) => types.iter().find(|candidate| candidate.name() == fragment),
                None => types.first(),
            }
            .cloned();

            let mut keep = Vec::new();
            if let Some(chosen) = &chosen {
                let archetype = chosen
                    .proto_implementation()
                    .map(|implementation| implementation.nodes.clone())
                    .unwrap_or_default();
                keep = self.proto_types_used_by(&archetype);
                keep.push(Rc::clone(chosen));
            }
            for unused in types
                .iter()
                .filter(|candidate| !keep.iter().any(|kept| Rc::ptr_eq(kept, candidate)))
            {
                self.release_archetype(unused, &library);
            }

            match chosen {
                Some(chosen) => {
                    node_type.adopt(&chosen, &resolved);
                    log::debug!("EXTERNPROTO {} geladen uit {resolved}", node_type.name());
                    return true;
                }
                None => log::debug!("{location} bevat geen PROTO {:?}", fragment),
            }
        }

        log::warn!(
            "EXTERNPROTO {}: geen van de urls bevat een implementatie: {urls:?}",
            node_type.name()
        );
        false
    }

    /// Geeft een eventIn van een PROTO-instantie door aan zijn IS-doelen.
    /// Geeft `false` als de interface geen IS-koppeling heeft.
    pub(crate) fn proto_event_in(
        &mut self,
        id: NodeId,
        name: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> SceneResult<bool> {
        let targets = match self.require(id)?.proto_instance() {
            Some(instance) => instance.targets(name).to_vec(),
            None => return Ok(false),
        };
        if targets.is_empty() {
            return Ok(false);
        }
        for target in targets {
            if let Err(err) = self.event_in(target.node, &target.field, value, timestamp) {
                log::debug!("IS-doorgifte {name} naar {}: {err}", target.node);
            }
        }
        Ok(true)
    }

    /// De eerste implementatienode van een PROTO-instantie; die wordt
    /// gerenderd en omhuld.
    #[must_use]
    pub fn proto_primary_node(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?
            .proto_instance()?
            .implementation
            .first()
            .copied()
    }

    /// Markeert instanties als gewijzigd zodra iets in hun implementatie dat is.
    pub(crate) fn update_protos(&mut self) {
        for id in self.protos.clone() {
            let implementation = match self.node(id).and_then(|node| node.proto_instance()) {
                Some(instance) => instance.implementation.clone(),
                None => continue,
            };
            if implementation
                .iter()
                .any(|root| self.subtree_modified(*root, &mut HashSet::new()))
            {
                self.set_modified(id);
            }
        }
    }

    fn subtree_modified(&self, id: NodeId, seen: &mut HashSet<NodeId>) -> bool {
        if !seen.insert(id) {
            return false;
        }
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.is_modified() {
            return true;
        }
        let mut children = node.node_refs();
        if let Some(instance) = node.proto_instance() {
            children.extend(instance.implementation.iter().copied());
        }
        children
            .into_iter()
            .any(|child| self.subtree_modified(child, seen))
    }

    /// Geeft de archetype-nodes vrij van elk PROTO dat in `scope` gedeclareerd is.
    pub(crate) fn release_proto_archetypes(&mut self, scope: &Rc<Scope>) {
        for node_type in scope.proto_types() {
            self.release_archetype(&node_type, scope);
        }
    }

    /// Geeft de archetype-nodes van één PROTO vrij, samen met de PROTO's uit
    /// zijn body.
    fn release_archetype(&mut self, node_type: &NodeTypeRef, scope: &Rc<Scope>) {
        let taken = node_type.proto_implementation_mut().map(|mut implementation| {
            (
                std::mem::take(&mut implementation.nodes),
                implementation.scope.clone(),
            )
        });
        let Some((nodes, body_scope)) = taken else {
            return;
        };
        if let Some(body_scope) = body_scope {
            if !Rc::ptr_eq(&body_scope, scope) {
                self.release_proto_archetypes(&body_scope);
            }
        }
        for node in nodes {
            self.release(node);
        }
    }

    /// PROTO-typen die onder `roots` geïnstantieerd worden, ook via geneste
    /// archetypes.
    fn proto_types_used_by(&self, roots: &[NodeId]) -> Vec<NodeTypeRef> {
        let mut used: Vec<NodeTypeRef> = Vec::new();
        let mut seen = HashSet::new();
        let mut worklist = roots.to_vec();
        while let Some(id) = worklist.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            worklist.extend(node.node_refs());
            let node_type = node.node_type();
            if used.iter().any(|known| Rc::ptr_eq(known, node_type)) {
                continue;
            }
            if let Some(implementation) = node_type.proto_implementation() {
                worklist.extend(implementation.nodes.iter().copied());
                used.push(Rc::clone(node_type));
            }
        }
        used
    }
}
