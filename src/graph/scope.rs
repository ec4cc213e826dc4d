//! Lexicale naamruimten voor DEF-namen en PROTO-typen.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::node::NodeId;
use super::node_type::{Declarations, NodeType, NodeTypeRef};
use crate::nodes;

/// De ingebouwde nodetypen. Eén exemplaar wordt gedeeld door alle levende
/// scopes op de thread en verdwijnt met de laatste scope.
#[derive(Debug)]
pub struct BuiltinTypes {
    types: Vec<NodeTypeRef>,
}

thread_local! {
    static SHARED_BUILTINS: RefCell<Weak<BuiltinTypes>> = RefCell::new(Weak::new());
}

impl BuiltinTypes {
    fn build() -> Self {
        let mut types: Vec<NodeTypeRef> = Vec::new();
        for registration in nodes::registrations() {
            if types.iter().any(|existing| existing.name() == registration.name) {
                log::error!("dubbele registratie van node type {}", registration.name);
                debug_assert!(false, "duplicate built-in node type {}", registration.name);
                continue;
            }
            let mut declarations = Declarations::default();
            (registration.declare)(&mut declarations);
            types.push(NodeType::builtin(
                registration.name,
                registration.class,
                declarations,
            ));
        }
        Self { types }
    }

    /// De gedeelde tabel van de thread, opgebouwd bij het eerste gebruik.
    #[must_use]
    pub fn shared() -> Rc<Self> {
        SHARED_BUILTINS.with(|cell| {
            if let Some(existing) = cell.borrow().upgrade() {
                return existing;
            }
            let built = Rc::new(Self::build());
            *cell.borrow_mut() = Rc::downgrade(&built);
            built
        })
    }

    /// Aantal scopes dat de gedeelde tabel nu vasthoudt.
    #[must_use]
    pub fn live_count() -> usize {
        SHARED_BUILTINS.with(|cell| cell.borrow().strong_count())
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&NodeTypeRef> {
        self.types.iter().find(|node_type| node_type.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeTypeRef> {
        self.types.iter()
    }
}

/// Koppelt DEF-namen aan nodes en PROTO-namen aan typen. PROTO-bodies krijgen
/// een kind-scope; typen worden ook bij de ouders gezocht, nodes alleen lokaal.
#[derive(Debug)]
pub struct Scope {
    name: String,
    parent: Option<Weak<Scope>>,
    builtins: Rc<BuiltinTypes>,
    types: RefCell<Vec<NodeTypeRef>>,
    nodes: RefCell<HashMap<String, NodeId>>,
}

impl Scope {
    /// Een scope op het hoogste niveau, met toegang tot de ingebouwde typen.
    #[must_use]
    pub fn root(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_owned(),
            parent: None,
            builtins: BuiltinTypes::shared(),
            types: RefCell::new(Vec::new()),
            nodes: RefCell::new(HashMap::new()),
        })
    }

    /// Een geneste scope. De ouder wordt zwak vastgehouden: ouders bezitten
    /// hun PROTO-typen en die bezitten hun body-scopes.
    #[must_use]
    pub fn child(parent: &Rc<Self>, name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_owned(),
            parent: Some(Rc::downgrade(parent)),
            builtins: Rc::clone(&parent.builtins),
            types: RefCell::new(Vec::new()),
            nodes: RefCell::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Declareert een PROTO-type. Een latere declaratie met dezelfde naam
    /// vervangt de eerdere.
    pub fn add_type(&self, node_type: NodeTypeRef) {
        let mut types = self.types.borrow_mut();
        types.retain(|existing| existing.name() != node_type.name());
        types.insert(0, node_type);
    }

    /// Zoekt een type hier, dan in de omsluitende scopes en ten slotte bij de
    /// ingebouwde typen.
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<NodeTypeRef> {
        if let Some(found) = self
            .types
            .borrow()
            .iter()
            .find(|node_type| node_type.name() == name)
        {
            return Some(Rc::clone(found));
        }
        match self.parent() {
            Some(parent) => parent.find_type(name),
            None => self.builtins.find(name).cloned(),
        }
    }

    /// Het eerste PROTO dat in deze scope gedeclareerd is, in documentvolgorde.
    #[must_use]
    pub fn first_type(&self) -> Option<NodeTypeRef> {
        self.types.borrow().last().cloned()
    }

    #[must_use]
    pub fn proto_types(&self) -> Vec<NodeTypeRef> {
        self.types.borrow().clone()
    }

    /// Bindt een DEF-naam en geeft de node terug die er eerder aan hing.
    pub fn bind_node(&self, name: &str, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow_mut().insert(name.to_owned(), node)
    }

    /// Verwijdert `name` alleen zolang die nog aan `node` gebonden is.
    pub fn unbind_node(&self, name: &str, node: NodeId) -> bool {
        let mut nodes = self.nodes.borrow_mut();
        if nodes.get(name) == Some(&node) {
            nodes.remove(name);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.borrow().get(name).copied()
    }

    /// Gebonden DEF-namen, gesorteerd.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_shared_and_counted_by_scopes() {
        let before = BuiltinTypes::live_count();
        let first = Scope::root("a");
        let second = Scope::root("b");
        let nested = Scope::child(&first, "proto");
        assert_eq!(BuiltinTypes::live_count(), before + 3);
        assert!(Rc::ptr_eq(&first.builtins, &second.builtins));
        assert!(Rc::ptr_eq(&first.builtins, &nested.builtins));
        drop(nested);
        drop(second);
        assert_eq!(BuiltinTypes::live_count(), before + 1);
    }

    #[test]
    fn type_lookup_walks_parents_and_builtins() {
        let root = Scope::root("world");
        let proto = NodeType::proto("Spinner", Declarations::default(), Vec::new());
        root.add_type(proto);
        let body = Scope::child(&root, "Spinner");

        assert!(body.find_type("Spinner").is_some_and(|t| t.is_proto()));
        assert!(body.find_type("Transform").is_some_and(|t| !t.is_proto()));
        assert!(body.find_type("Nope").is_none());
    }

    #[test]
    fn node_names_are_local_and_unbind_checks_identity() {
        let root = Scope::root("world");
        let body = Scope::child(&root, "body");
        root.bind_node("A", NodeId::new(1));

        assert_eq!(root.find_node("A"), Some(NodeId::new(1)));
        assert_eq!(body.find_node("A"), None);

        root.bind_node("A", NodeId::new(2));
        assert!(!root.unbind_node("A", NodeId::new(1)));
        assert!(root.unbind_node("A", NodeId::new(2)));
        assert!(root.node_names().is_empty());
    }

    #[test]
    fn redeclared_type_replaces_previous() {
        let root = Scope::root("world");
        root.add_type(NodeType::proto("P", Declarations::default(), Vec::new()));
        root.add_type(NodeType::proto("Q", Declarations::default(), Vec::new()));
        root.add_type(NodeType::proto(
            "P",
            Declarations::default(),
            vec!["x.x3d".to_owned()],
        ));

        assert_eq!(root.proto_types().len(), 2);
        let redeclared = root.find_type("P").unwrap();
        let urls = redeclared.proto_implementation().unwrap().urls.len();
        assert_eq!(urls, 1);
        assert_eq!(root.first_type().map(|t| t.name().to_owned()), Some("Q".to_owned()));
    }
}
