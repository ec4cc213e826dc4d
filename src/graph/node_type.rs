//! Interfacedeclaraties per type en de PROTO-implementatie die ze dragen.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::node::NodeId;
use super::scope::Scope;
use super::value::{FieldType, FieldValue};
use crate::nodes::NodeClass;

/// De vier soorten VRML-interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    EventIn,
    EventOut,
    Field,
    ExposedField,
}

impl InterfaceKind {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::EventIn => "eventIn",
            Self::EventOut => "eventOut",
            Self::Field => "field",
            Self::ExposedField => "exposedField",
        }
    }

    /// Kent zowel de VRML97-sleutelwoorden als de X3D-accessTypes.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim() {
            "eventIn" | "inputOnly" => Some(Self::EventIn),
            "eventOut" | "outputOnly" => Some(Self::EventOut),
            "field" | "initializeOnly" => Some(Self::Field),
            "exposedField" | "inputOutput" => Some(Self::ExposedField),
            _ => None,
        }
    }
}

/// Eén gedeclareerde interface, gezien van buiten het type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInterface {
    pub kind: InterfaceKind,
    pub field_type: FieldType,
    pub name: String,
}

/// Paar `(implementatienode, implementatieveld)` waaraan een interface met
/// `IS` gekoppeld is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsTarget {
    pub node: NodeId,
    pub field: String,
}

impl IsTarget {
    #[must_use]
    pub fn new(node: NodeId, field: impl Into<String>) -> Self {
        Self {
            node,
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub field_type: FieldType,
    pub default: Option<FieldValue>,
    pub is_map: Vec<IsTarget>,
}

impl Declaration {
    fn new(name: &str, field_type: FieldType, default: Option<FieldValue>) -> Self {
        Self {
            name: name.to_owned(),
            field_type,
            default,
            is_map: Vec::new(),
        }
    }
}

/// Tabellen met fields, eventIns en eventOuts van een nodetype. Een
/// exposedField staat erin als zijn drie afgeleide delen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declarations {
    fields: Vec<Declaration>,
    event_ins: Vec<Declaration>,
    event_outs: Vec<Declaration>,
}

impl Declarations {
    pub fn add_field(&mut self, name: &str, field_type: FieldType, default: Option<FieldValue>) {
        upsert(&mut self.fields, Declaration::new(name, field_type, default));
    }

    pub fn add_event_in(&mut self, name: &str, field_type: FieldType) {
        upsert(&mut self.event_ins, Declaration::new(name, field_type, None));
    }

    pub fn add_event_out(&mut self, name: &str, field_type: FieldType) {
        upsert(&mut self.event_outs, Declaration::new(name, field_type, None));
    }

    /// Declareert field `name`, eventIn `set_name` en eventOut `name_changed`.
    pub fn add_exposed_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        default: Option<FieldValue>,
    ) {
        self.add_field(name, field_type, default);
        self.add_event_in(&format!("set_{name}"), field_type);
        self.add_event_out(&format!("{name}_changed"), field_type);
    }

    pub fn add(&mut self, interface: &NodeInterface, default: Option<FieldValue>) {
        match interface.kind {
            InterfaceKind::EventIn => self.add_event_in(&interface.name, interface.field_type),
            InterfaceKind::EventOut => self.add_event_out(&interface.name, interface.field_type),
            InterfaceKind::Field => self.add_field(&interface.name, interface.field_type, default),
            InterfaceKind::ExposedField => {
                self.add_exposed_field(&interface.name, interface.field_type, default);
            }
        }
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> Option<FieldType> {
        find(&self.fields, name).map(|decl| decl.field_type)
    }

    #[must_use]
    pub fn has_event_in(&self, name: &str) -> Option<FieldType> {
        find(&self.event_ins, name).map(|decl| decl.field_type)
    }

    #[must_use]
    pub fn has_event_out(&self, name: &str) -> Option<FieldType> {
        find(&self.event_outs, name).map(|decl| decl.field_type)
    }

    /// Het type van de exposedField, of `None` als een van de drie delen
    /// ontbreekt of hun typen verschillen.
    #[must_use]
    pub fn has_exposed_field(&self, name: &str) -> Option<FieldType> {
        let field_type = self.has_field(name)?;
        let event_in = self.has_event_in(&format!("set_{name}"))?;
        let event_out = self.has_event_out(&format!("{name}_changed"))?;
        (field_type == event_in && field_type == event_out).then_some(field_type)
    }

    #[must_use]
    pub fn field_default(&self, name: &str) -> Option<&FieldValue> {
        find(&self.fields, name).and_then(|decl| decl.default.as_ref())
    }

    /// Voegt een IS-doel toe aan de eerste field, eventIn of eventOut met de
    /// naam `interface`.
    pub fn add_is(&mut self, interface: &str, target: IsTarget) -> bool {
        let decl = self
            .fields
            .iter_mut()
            .chain(self.event_ins.iter_mut())
            .chain(self.event_outs.iter_mut())
            .find(|decl| decl.name == interface);
        match decl {
            Some(decl) => {
                if !decl.is_map.contains(&target) {
                    decl.is_map.push(target);
                }
                true
            }
            None => false,
        }
    }

    /// IS-doelen van een interface, opgezocht in dezelfde volgorde als `add_is`.
    #[must_use]
    pub fn is_map(&self, interface: &str) -> &[IsTarget] {
        self.fields
            .iter()
            .chain(&self.event_ins)
            .chain(&self.event_outs)
            .find(|decl| decl.name == interface)
            .map(|decl| decl.is_map.as_slice())
            .unwrap_or(&[])
    }

    /// Elke declaratie met minstens één IS-doel.
    pub fn is_mapped(&self) -> impl Iterator<Item = &Declaration> {
        self.fields
            .iter()
            .chain(&self.event_ins)
            .chain(&self.event_outs)
            .filter(|decl| !decl.is_map.is_empty())
    }

    #[must_use]
    pub fn fields(&self) -> &[Declaration] {
        &self.fields
    }

    #[must_use]
    pub fn event_ins(&self) -> &[Declaration] {
        &self.event_ins
    }

    #[must_use]
    pub fn event_outs(&self) -> &[Declaration] {
        &self.event_outs
    }

    /// Bij `foo_changed` of `set_foo` de exposedField `foo` waar ze bij horen.
    #[must_use]
    pub fn exposed_base<'a>(&self, name: &'a str) -> Option<&'a str> {
        let base = name
            .strip_suffix("_changed")
            .or_else(|| name.strip_prefix("set_"))?;
        self.has_exposed_field(base).map(|_| base)
    }

    /// Canonieke naam en type van een eventIn. Een kale exposedField-naam wordt
    /// zijn `set_`-eventIn.
    #[must_use]
    pub fn resolve_event_in(&self, name: &str) -> Option<(String, FieldType)> {
        if let Some(field_type) = self.has_event_in(name) {
            return Some((name.to_owned(), field_type));
        }
        self.has_exposed_field(name)
            .map(|field_type| (format!("set_{name}"), field_type))
    }

    /// Canonieke naam en type van een eventOut. Een kale exposedField-naam
    /// wordt zijn `_changed`-eventOut.
    #[must_use]
    pub fn resolve_event_out(&self, name: &str) -> Option<(String, FieldType)> {
        if let Some(field_type) = self.has_event_out(name) {
            return Some((name.to_owned(), field_type));
        }
        self.has_exposed_field(name)
            .map(|field_type| (format!("{name}_changed"), field_type))
    }

    /// Opslagslot achter een leesbare naam: het veld zelf, het veld achter een
    /// exposed eventOut of een zuiver eventOut-slot.
    #[must_use]
    pub fn resolve_storage<'a>(&self, name: &'a str) -> Option<(&'a str, FieldType)> {
        if let Some(field_type) = self.has_field(name) {
            return Some((name, field_type));
        }
        if let Some(base) = name.strip_suffix("_changed") {
            if let Some(field_type) = self.has_exposed_field(base) {
                return Some((base, field_type));
            }
        }
        self.has_event_out(name).map(|field_type| (name, field_type))
    }

    /// De declaraties teruggevouwen tot VRML-interfaces, met exposedFields
    /// samengevoegd.
    #[must_use]
    pub fn interfaces(&self) -> Vec<NodeInterface> {
        let mut interfaces = Vec::new();
        for decl in &self.fields {
            let kind = if self.has_exposed_field(&decl.name).is_some() {
                InterfaceKind::ExposedField
            } else {
                InterfaceKind::Field
            };
            interfaces.push(NodeInterface {
                kind,
                field_type: decl.field_type,
                name: decl.name.clone(),
            });
        }
        for decl in &self.event_ins {
            if self.exposed_base(&decl.name).is_none() {
                interfaces.push(NodeInterface {
                    kind: InterfaceKind::EventIn,
                    field_type: decl.field_type,
                    name: decl.name.clone(),
                });
            }
        }
        for decl in &self.event_outs {
            if self.exposed_base(&decl.name).is_none() {
                interfaces.push(NodeInterface {
                    kind: InterfaceKind::EventOut,
                    field_type: decl.field_type,
                    name: decl.name.clone(),
                });
            }
        }
        interfaces
    }

    /// Alle gedeclareerde namen, voor suggesties in diagnostiek.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .chain(&self.event_ins)
            .chain(&self.event_outs)
            .map(|decl| decl.name.as_str())
    }
}

fn find<'a>(decls: &'a [Declaration], name: &str) -> Option<&'a Declaration> {
    decls.iter().find(|decl| decl.name == name)
}

fn upsert(decls: &mut Vec<Declaration>, decl: Declaration) {
    match decls.iter_mut().find(|existing| existing.name == decl.name) {
        Some(existing) => *existing = decl,
        None => decls.push(decl),
    }
}

/// Implementatietoestand van een PROTO- of EXTERNPROTO-type.
#[derive(Debug, Clone, Default)]
pub struct ProtoImplementation {
    /// Archetype-nodes, eigendom van de arena van de scene.
    pub nodes: Vec<NodeId>,
    /// Scope waarin het archetype geparst is.
    pub scope: Option<Rc<Scope>>,
    /// Kandidaat-urls van een EXTERNPROTO; leeg bij een inline PROTO.
    pub urls: Vec<String>,
    /// Url waar de implementatie uiteindelijk vandaan kwam.
    pub actual_url: Option<String>,
    pub loaded: bool,
    /// Gezet zodra het laden van een EXTERNPROTO geprobeerd is.
    pub attempted: bool,
}

#[derive(Debug)]
pub enum Implementation {
    Builtin(NodeClass),
    Proto(RefCell<ProtoImplementation>),
}

/// Een nodetype: een ingebouwde klasse of een PROTO-declaratie.
#[derive(Debug)]
pub struct NodeType {
    name: String,
    declarations: RefCell<Declarations>,
    implementation: Implementation,
}

pub type NodeTypeRef = Rc<NodeType>;

impl NodeType {
    #[must_use]
    pub fn builtin(name: &str, class: NodeClass, declarations: Declarations) -> NodeTypeRef {
        Rc::new(Self {
            name: name.to_owned(),
            declarations: RefCell::new(declarations),
            implementation: Implementation::Builtin(class),
        })
    }

    /// Een PROTO-type. `urls` is leeg bij een inline declaratie en bevat de
    /// kandidaat-locaties van een EXTERNPROTO.
    #[must_use]
    pub fn proto(name: &str, declarations: Declarations, urls: Vec<String>) -> NodeTypeRef {
        let loaded = urls.is_empty();
        Rc::new(Self {
            name: name.to_owned(),
            declarations: RefCell::new(declarations),
            implementation: Implementation::Proto(RefCell::new(ProtoImplementation {
                urls,
                loaded,
                ..ProtoImplementation::default()
            })),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ingebouwde klasse, `None` bij PROTO-typen.
    #[must_use]
    pub fn class(&self) -> Option<NodeClass> {
        match self.implementation {
            Implementation::Builtin(class) => Some(class),
            Implementation::Proto(_) => None,
        }
    }

    #[must_use]
    pub fn is_proto(&self) -> bool {
        matches!(self.implementation, Implementation::Proto(_))
    }

    /// Leent de interfacetabellen. Niet vasthouden over aanroepen die een
    /// EXTERNPROTO kunnen laden.
    #[must_use]
    pub fn declarations(&self) -> Ref<'_, Declarations> {
        self.declarations.borrow()
    }

    pub fn declarations_mut(&self) -> RefMut<'_, Declarations> {
        self.declarations.borrow_mut()
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> Option<FieldType> {
        self.declarations().has_field(name)
    }

    #[must_use]
    pub fn has_event_in(&self, name: &str) -> Option<FieldType> {
        self.declarations().has_event_in(name)
    }

    #[must_use]
    pub fn has_event_out(&self, name: &str) -> Option<FieldType> {
        self.declarations().has_event_out(name)
    }

    #[must_use]
    pub fn has_exposed_field(&self, name: &str) -> Option<FieldType> {
        self.declarations().has_exposed_field(name)
    }

    #[must_use]
    pub fn field_default(&self, name: &str) -> Option<FieldValue> {
        self.declarations().field_default(name).cloned()
    }

    pub fn add_is(&self, interface: &str, target: IsTarget) -> bool {
        self.declarations_mut().add_is(interface, target)
    }

    #[must_use]
    pub fn proto_implementation(&self) -> Option<Ref<'_, ProtoImplementation>> {
        match &self.implementation {
            Implementation::Proto(cell) => Some(cell.borrow()),
            Implementation::Builtin(_) => None,
        }
    }

    pub fn proto_implementation_mut(&self) -> Option<RefMut<'_, ProtoImplementation>> {
        match &self.implementation {
            Implementation::Proto(cell) => Some(cell.borrow_mut()),
            Implementation::Builtin(_) => None,
        }
    }

    /// Neemt interface, IS-tabellen en implementatie over van een opgehaald
    /// PROTO en onthoudt waar het vandaan kwam.
    pub fn adopt(&self, other: &NodeType, actual_url: &str) {
        let declarations = other.declarations().clone();
        *self.declarations_mut() = declarations;

        let fetched = other
            .proto_implementation()
            .map(|implementation| (implementation.nodes.clone(), implementation.scope.clone()));
        if let (Some(mut own), Some((nodes, scope))) = (self.proto_implementation_mut(), fetched) {
            own.nodes = nodes;
            own.scope = scope;
            own.actual_url = Some(actual_url.to_owned());
            own.loaded = true;
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposed_field_synthesizes_three_interfaces() {
        let mut decls = Declarations::default();
        decls.add_exposed_field("translation", FieldType::SFVec3f, None);

        assert_eq!(decls.has_field("translation"), Some(FieldType::SFVec3f));
        assert_eq!(decls.has_event_in("set_translation"), Some(FieldType::SFVec3f));
        assert_eq!(
            decls.has_event_out("translation_changed"),
            Some(FieldType::SFVec3f)
        );
        assert_eq!(
            decls.has_exposed_field("translation"),
            Some(FieldType::SFVec3f)
        );
        assert_eq!(decls.exposed_base("set_translation"), Some("translation"));
        assert_eq!(decls.exposed_base("translation_changed"), Some("translation"));
    }

    #[test]
    fn inconsistent_exposed_field_is_rejected() {
        let mut decls = Declarations::default();
        decls.add_field("size", FieldType::SFFloat, None);
        decls.add_event_in("set_size", FieldType::SFFloat);
        decls.add_event_out("size_changed", FieldType::SFInt32);
        assert_eq!(decls.has_exposed_field("size"), None);
        assert_eq!(decls.exposed_base("size_changed"), None);
    }

    #[test]
    fn resolves_bare_exposed_names() {
        let mut decls = Declarations::default();
        decls.add_exposed_field("on", FieldType::SFBool, None);
        decls.add_event_in("set_fraction", FieldType::SFFloat);
        decls.add_event_out("fraction_changed", FieldType::SFFloat);

        assert_eq!(
            decls.resolve_event_in("on"),
            Some(("set_on".to_owned(), FieldType::SFBool))
        );
        assert_eq!(
            decls.resolve_event_out("on"),
            Some(("on_changed".to_owned(), FieldType::SFBool))
        );
        assert_eq!(
            decls.resolve_event_in("set_fraction"),
            Some(("set_fraction".to_owned(), FieldType::SFFloat))
        );
        assert_eq!(decls.resolve_event_in("fraction"), None);
        assert_eq!(
            decls.resolve_storage("on_changed"),
            Some(("on", FieldType::SFBool))
        );
        assert_eq!(
            decls.resolve_storage("fraction_changed"),
            Some(("fraction_changed", FieldType::SFFloat))
        );
    }

    #[test]
    fn is_targets_search_fields_then_events() {
        let mut decls = Declarations::default();
        decls.add_exposed_field("pos", FieldType::SFVec3f, None);
        decls.add_event_out("done", FieldType::SFTime);

        let target = IsTarget::new(NodeId::new(3), "translation");
        assert!(decls.add_is("pos", target.clone()));
        assert!(decls.add_is("pos", target.clone()));
        assert!(decls.add_is("done", IsTarget::new(NodeId::new(4), "cycleTime")));
        assert!(!decls.add_is("missing", target.clone()));

        assert_eq!(decls.is_map("pos"), [target]);
        assert_eq!(decls.is_map("done").len(), 1);
        assert_eq!(decls.is_mapped().count(), 2);
    }

    #[test]
    fn interfaces_collapse_exposed_fields() {
        let mut decls = Declarations::default();
        decls.add_exposed_field("pos", FieldType::SFVec3f, None);
        decls.add_event_in("go", FieldType::SFBool);

        let kinds: Vec<_> = decls
            .interfaces()
            .into_iter()
            .map(|interface| (interface.name, interface.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("pos".to_owned(), InterfaceKind::ExposedField),
                ("go".to_owned(), InterfaceKind::EventIn),
            ]
        );
    }

    #[test]
    fn extern_proto_starts_unloaded() {
        let inline = NodeType::proto("Inline", Declarations::default(), Vec::new());
        let external = NodeType::proto(
            "External",
            Declarations::default(),
            vec!["lib.x3d#External".to_owned()],
        );
        assert!(inline.proto_implementation().is_some_and(|p| p.loaded));
        assert!(external.proto_implementation().is_some_and(|p| !p.loaded));
        assert_eq!(external.class(), None);
    }
}
