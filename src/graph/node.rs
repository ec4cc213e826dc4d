//! Het runtime-object van een node: veldopslag, vlaggen en uitgaande routes.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::node_type::{IsTarget, NodeTypeRef};
use super::route::Route;
use super::scope::Scope;
use super::value::FieldValue;
use crate::math::BSphere;
use crate::nodes::time_sensor::TimerState;
use crate::viewer::ObjectHandle;

/// Arena-index van een node. Indices worden binnen een scene nooit hergebruikt.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct NodeId(pub usize);

impl NodeId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl From<usize> for NodeId {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Zendt een eventOut van een implementatienode opnieuw uit als eventOut van
/// de PROTO-instantie die hem bezit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsForward {
    pub event_out: String,
    pub proto: NodeId,
    pub proto_event_out: String,
}

/// Toestand per instantie van een node met een PROTO-type.
#[derive(Debug, Clone)]
pub struct ProtoInstance {
    pub scope: Rc<Scope>,
    pub implementation: Vec<NodeId>,
    pub is_map: BTreeMap<String, Vec<IsTarget>>,
}

impl ProtoInstance {
    /// IS-doelen van een interfacenaam. Een eventIn `set_foo` valt terug op
    /// de doelen van exposedField `foo`.
    #[must_use]
    pub fn targets(&self, name: &str) -> &[IsTarget] {
        if let Some(targets) = self.is_map.get(name).filter(|t| !t.is_empty()) {
            return targets;
        }
        name.strip_prefix("set_")
            .and_then(|base| self.is_map.get(base))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Klassespecifieke runtime-toestand die niet in velden staat.
#[derive(Debug, Clone, Default)]
pub enum NodeState {
    #[default]
    Plain,
    Timer(TimerState),
    Proto(ProtoInstance),
}

/// Een node van de scenegraaf.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    node_type: NodeTypeRef,
    name: Option<String>,
    scope: Option<Rc<Scope>>,
    fields: BTreeMap<String, FieldValue>,
    routes: Vec<Route>,
    modified: bool,
    bvolume_dirty: bool,
    visited: bool,
    pub(crate) ref_count: usize,
    pub state: NodeState,
    pub viewer_object: Option<ObjectHandle>,
    pub bsphere: BSphere,
    pub is_forwards: Vec<IsForward>,
}

impl Node {
    /// Maakt een node waarvan elk veld en elk eventOut-slot op zijn
    /// gedeclareerde standaardwaarde staat.
    #[must_use]
    pub fn new(node_type: NodeTypeRef) -> Self {
        let mut fields = BTreeMap::new();
        {
            let declarations = node_type.declarations();
            for field in declarations.fields() {
                let value = field
                    .default
                    .clone()
                    .unwrap_or_else(|| field.field_type.default_value());
                fields.insert(field.name.clone(), value);
            }
            for event_out in declarations.event_outs() {
                if declarations.exposed_base(&event_out.name).is_none() {
                    fields.insert(
                        event_out.name.clone(),
                        event_out.field_type.default_value(),
                    );
                }
            }
        }

        Self {
            id: NodeId::default(),
            node_type,
            name: None,
            scope: None,
            fields,
            routes: Vec::new(),
            modified: false,
            bvolume_dirty: true,
            visited: false,
            ref_count: 0,
            state: NodeState::Plain,
            viewer_object: None,
            bsphere: BSphere::empty(),
            is_forwards: Vec::new(),
        }
    }

    #[must_use]
    pub fn node_type(&self) -> &NodeTypeRef {
        &self.node_type
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.node_type.name()
    }

    /// DEF-naam, als die er is.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    #[must_use]
    pub fn scope(&self) -> Option<&Rc<Scope>> {
        self.scope.as_ref()
    }

    pub fn set_scope(&mut self, scope: Rc<Scope>) {
        self.scope = Some(scope);
    }

    /// Naam voor diagnostiek: de DEF-naam of de arena-index.
    #[must_use]
    pub fn identity(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    /// Ruwe opzoeking van een veld of eventOut-slot.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Slaat een waarde op zonder typecontrole of notificatie en geeft de
    /// vorige waarde terug.
    pub fn store_field(&mut self, name: &str, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(name.to_owned(), value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Elke node waarnaar de SFNode/MFNode-slots van deze node verwijzen.
    #[must_use]
    pub fn node_refs(&self) -> Vec<NodeId> {
        self.fields.values().flat_map(FieldValue::node_refs).collect()
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Voegt een uitgaande route toe; geeft `false` als precies dezelfde route
    /// al bestaat.
    pub fn add_route(&mut self, route: Route) -> bool {
        if self.routes.contains(&route) {
            return false;
        }
        self.routes.push(route);
        true
    }

    pub fn delete_route(&mut self, route: &Route) -> bool {
        let before = self.routes.len();
        self.routes.retain(|existing| existing != route);
        before != self.routes.len()
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn set_modified_flag(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// De ruwe vlag; [`crate::scene::Scene::is_bvolume_dirty`] voert eerst de
    /// uitgestelde propagatie naar de voorouders uit.
    #[must_use]
    pub fn bvolume_dirty_flag(&self) -> bool {
        self.bvolume_dirty
    }

    pub(crate) fn set_bvolume_dirty_flag(&mut self, dirty: bool) {
        self.bvolume_dirty = dirty;
    }

    #[must_use]
    pub fn is_visited(&self) -> bool {
        self.visited
    }

    pub(crate) fn set_visited(&mut self, visited: bool) {
        self.visited = visited;
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    #[must_use]
    pub fn proto_instance(&self) -> Option<&ProtoInstance> {
        match &self.state {
            NodeState::Proto(instance) => Some(instance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, NodeId};
    use crate::graph::node_type::{Declarations, NodeType};
    use crate::graph::route::Route;
    use crate::graph::value::{FieldType, FieldValue};
    use crate::nodes::NodeClass;

    fn test_node() -> Node {
        let mut declarations = Declarations::default();
        declarations.add_exposed_field("size", FieldType::SFFloat, Some(FieldValue::SFFloat(2.0)));
        declarations.add_field("solid", FieldType::SFBool, None);
        declarations.add_event_out("done", FieldType::SFTime);
        Node::new(NodeType::builtin("Thing", NodeClass::WorldInfo, declarations))
    }

    #[test]
    fn new_node_holds_defaults() {
        let node = test_node();
        assert_eq!(node.field("size"), Some(&FieldValue::SFFloat(2.0)));
        assert_eq!(node.field("solid"), Some(&FieldValue::SFBool(false)));
        assert_eq!(node.field("done"), Some(&FieldValue::SFTime(0.0)));
        assert!(node.field("size_changed").is_none());
        assert!(!node.is_modified());
    }

    #[test]
    fn duplicate_routes_are_ignored() {
        let mut node = test_node();
        let route = Route::new(NodeId::new(0), "done", NodeId::new(1), "set_startTime");
        assert!(node.add_route(route.clone()));
        assert!(!node.add_route(route.clone()));
        assert_eq!(node.routes().len(), 1);
        assert!(node.delete_route(&route));
        assert!(node.routes().is_empty());
        assert!(!node.delete_route(&route));
    }

    #[test]
    fn identity_falls_back_to_index() {
        let mut node = test_node();
        node.id = NodeId::new(4);
        assert_eq!(node.identity(), "#4");
        node.set_name(Some("Box1".to_owned()));
        assert_eq!(node.identity(), "Box1");
    }
}
