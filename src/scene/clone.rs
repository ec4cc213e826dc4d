//! Diepe kopieën van nodegrafen, gebruikt om PROTO-instanties uit te vouwen.
//!
//! Kopiëren gebeurt in twee rondes over de originelen. De eerste maakt de
//! kopieën en houdt gedeelde nodes gedeeld; de tweede loopt dezelfde nodes
//! opnieuw af en legt hun routes tussen de kopieën.

use std::collections::HashMap;
use std::rc::Rc;

use super::Scene;
use crate::graph::node::NodeId;
use crate::graph::route::Route;
use crate::graph::scope::Scope;
use crate::graph::value::{FieldValue, NodeList};

/// Resultaat van [`Scene::clone_nodes`]. De gekopieerde wortels zijn niet geretaind.
#[derive(Debug, Clone, Default)]
pub struct ClonedGraph {
    pub roots: Vec<NodeId>,
    /// Origineel naar kopie.
    pub mapping: HashMap<NodeId, NodeId>,
}

/// Eerste ronde: maakt de kopieën. Originelen worden als bezocht gemarkeerd;
/// een bezocht origineel wijst naar zijn bestaande kopie via de identiteitsmap,
/// en pas daarna via zijn DEF-naam in de doel-scope.
struct NodeCloneVisitor<'a> {
    dest: &'a Rc<Scope>,
    mapping: HashMap<NodeId, NodeId>,
}

impl NodeCloneVisitor<'_> {
    fn visit(&mut self, scene: &mut Scene, original: NodeId) -> Option<NodeId> {
        let node = scene.node(original)?;
        if node.is_visited() {
            return self
                .mapping
                .get(&original)
                .copied()
                .or_else(|| node.name().and_then(|name| self.dest.find_node(name)));
        }

        let node_type = Rc::clone(node.node_type());
        let name = node.name().map(str::to_owned);
        let fields: Vec<(String, FieldValue)> = node
            .fields()
            .map(|(field, value)| (field.to_owned(), value.clone()))
            .collect();
        if let Some(node) = scene.node_mut(original) {
            node.set_visited(true);
        }

        let copy = scene.create_node(&node_type, self.dest);
        self.mapping.insert(original, copy);

        for (field, value) in fields {
            let value = self.map_value(scene, value);
            if scene.field(copy, &field) == Some(&value) {
                continue;
            }
            if let Err(err) = scene.set_field(copy, &field, value) {
                log::warn!("veld {field} niet gekopieerd: {err}");
            }
        }

        if let Some(name) = name {
            if let Err(err) = scene.set_node_name(copy, &name) {
                log::warn!("naam {name} niet gekopieerd: {err}");
            }
        }
        Some(copy)
    }

    fn map_value(&mut self, scene: &mut Scene, value: FieldValue) -> FieldValue {
        match value {
            FieldValue::SFNode(Some(child)) => FieldValue::SFNode(self.visit(scene, child)),
            FieldValue::MFNode(children) => FieldValue::MFNode(
                children
                    .iter()
                    .filter_map(|child| self.visit(scene, child))
                    .collect::<NodeList>(),
            ),
            other => other,
        }
    }
}

/// Tweede ronde: loopt de originelen opnieuw af, wist de bezocht-vlaggen en
/// legt elke originele route tussen de bijbehorende kopieën.
struct RouteCopyVisitor<'a> {
    dest: &'a Rc<Scope>,
    mapping: &'a HashMap<NodeId, NodeId>,
}

impl RouteCopyVisitor<'_> {
    fn visit(&self, scene: &mut Scene, original: NodeId) {
        let Some(node) = scene.node(original) else {
            return;
        };
        if !node.is_visited() {
            return;
        }
        let routes = node.routes().to_vec();
        let children = node.node_refs();
        if let Some(node) = scene.node_mut(original) {
            node.set_visited(false);
        }

        for route in routes {
            let from = self.map(scene, route.from_node);
            let to = self.map(scene, route.to_node);
            debug_assert!(
                from.is_some() && to.is_some(),
                "route {}.{} naar {}.{} valt buiten de gekopieerde graaf",
                route.from_node,
                route.from_event_out,
                route.to_node,
                route.to_event_in
            );
            let (Some(from), Some(to)) = (from, to) else {
                log::error!(
                    "route {}.{} naar {}.{} valt buiten de gekopieerde graaf",
                    route.from_node,
                    route.from_event_out,
                    route.to_node,
                    route.to_event_in
                );
                continue;
            };
            if let Some(copy) = scene.node_mut(from) {
                copy.add_route(Route::new(from, route.from_event_out, to, route.to_event_in));
            }
        }

        for child in children {
            self.visit(scene, child);
        }
    }

    fn map(&self, scene: &Scene, original: NodeId) -> Option<NodeId> {
        self.mapping.get(&original).copied().or_else(|| {
            scene
                .node(original)
                .and_then(|node| node.name())
                .and_then(|name| self.dest.find_node(name))
        })
    }
}

impl Scene {
    /// Kopieert de grafen onder `originals` diep naar `dest`. DEF-namen worden
    /// in `dest` opnieuw gebonden, gedeelde nodes blijven gedeeld en routes
    /// tussen gekopieerde nodes worden verdubbeld. Nodes met een PROTO-type
    /// worden opnieuw geïnstantieerd.
    pub fn clone_nodes(&mut self, originals: &[NodeId], dest: &Rc<Scope>) -> ClonedGraph {
        let mut cloner = NodeCloneVisitor {
            dest,
            mapping: HashMap::new(),
        };
        let roots = originals
            .iter()
            .filter_map(|original| cloner.visit(self, *original))
            .collect();

        let routes = RouteCopyVisitor {
            dest,
            mapping: &cloner.mapping,
        };
        for original in originals {
            routes.visit(self, *original);
        }

        ClonedGraph {
            roots,
            mapping: cloner.mapping,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::graph::scope::Scope;
    use crate::graph::value::FieldValue;
    use crate::scene::Scene;

    #[test]
    fn shared_nodes_stay_shared_and_originals_are_untouched() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let shared = scene.create_node_by_name("Transform", &scope).unwrap();
        scene.set_node_name(shared, "Shared").unwrap();
        scene
            .set_field(group, "children", FieldValue::MFNode(vec![shared, shared].into()))
            .unwrap();
        scene
            .set_field(shared, "translation", FieldValue::SFVec3f([1.0, 2.0, 3.0]))
            .unwrap();

        let dest = Scope::child(&scope, "copy");
        let cloned = scene.clone_nodes(&[group], &dest);

        let copy = cloned.roots[0];
        assert_ne!(copy, group);
        let children = scene.field(copy, "children").and_then(FieldValue::as_mf_node).unwrap();
        let children: Vec<_> = children.iter().collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], children[1]);
        assert_ne!(children[0], shared);
        assert_eq!(dest.find_node("Shared"), Some(children[0]));
        assert_eq!(scope.find_node("Shared"), Some(shared));
        assert_eq!(
            scene.field(children[0], "translation"),
            Some(&FieldValue::SFVec3f([1.0, 2.0, 3.0]))
        );
        assert!(!scene.node(shared).unwrap().is_visited());
    }

    #[test]
    fn routes_are_rewired_onto_copies() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let timer = scene.create_node_by_name("TimeSensor", &scope).unwrap();
        let interpolator = scene.create_node_by_name("ScalarInterpolator", &scope).unwrap();
        scene
            .set_field(group, "children", FieldValue::MFNode(vec![timer, interpolator].into()))
            .unwrap();
        scene
            .add_route(timer, "fraction_changed", interpolator, "set_fraction")
            .unwrap();

        let dest = Scope::child(&scope, "copy");
        let cloned = scene.clone_nodes(&[group], &dest);
        let timer_copy = cloned.mapping[&timer];
        let interpolator_copy = cloned.mapping[&interpolator];

        let routes = scene.node(timer_copy).unwrap().routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].from_node, timer_copy);
        assert_eq!(routes[0].to_node, interpolator_copy);
        assert_eq!(scene.node(timer).unwrap().routes()[0].to_node, interpolator);
        assert!(scene.timers().contains(&timer_copy));
    }

    #[test]
    fn duplicate_names_keep_their_own_routes() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let mut pairs = Vec::new();
        for _ in 0..2 {
            let timer = scene.create_node_by_name("TimeSensor", &scope).unwrap();
            let interpolator = scene.create_node_by_name("ScalarInterpolator", &scope).unwrap();
            scene.set_node_name(timer, "Twin").unwrap();
            scene
                .add_route(timer, "fraction_changed", interpolator, "set_fraction")
                .unwrap();
            pairs.push((timer, interpolator));
        }
        let children: Vec<_> = pairs.iter().flat_map(|(timer, interpolator)| [*timer, *interpolator]).collect();
        scene
            .set_field(group, "children", FieldValue::MFNode(children.into()))
            .unwrap();

        let dest = Scope::child(&scope, "copy");
        let cloned = scene.clone_nodes(&[group], &dest);

        for (timer, interpolator) in pairs {
            let routes = scene.node(cloned.mapping[&timer]).unwrap().routes();
            assert_eq!(routes.len(), 1);
            assert_eq!(routes[0].to_node, cloned.mapping[&interpolator]);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "valt buiten de gekopieerde graaf")]
    fn route_leaving_the_copied_graph_is_a_bug() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let timer = scene.create_node_by_name("TimeSensor", &scope).unwrap();
        let outside = scene.create_node_by_name("ScalarInterpolator", &scope).unwrap();
        scene
            .set_field(group, "children", FieldValue::MFNode(vec![timer].into()))
            .unwrap();
        scene
            .add_route(timer, "fraction_changed", outside, "set_fraction")
            .unwrap();

        let dest = Scope::child(&scope, "copy");
        scene.clone_nodes(&[group], &dest);
    }
}
