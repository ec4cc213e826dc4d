//! Parser voor de X3D XML-codering van VRML97 werelden.
//!
//! Het document wordt eerst in een lichte elementboom gelezen en daarna
//! node voor node in de scène opgebouwd. Onbekende elementen en attributen
//! worden met een waarschuwing overgeslagen.

use std::rc::Rc;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::SceneParser;
use crate::graph::node::NodeId;
use crate::graph::node_type::{Declarations, InterfaceKind, IsTarget, NodeInterface, NodeType, NodeTypeRef};
use crate::graph::scope::Scope;
use crate::graph::value::{FieldType, FieldValue, NodeList, ValueError};
use crate::scene::Scene;

/// Result type voor het parsen van X3D-documenten.
pub type ParseResult<T> = Result<T, ParseError>;

/// Fouten tijdens het parsen.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Het document is geen goedgevormde XML.
    #[error("XML parsefout: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Een attribuut kon niet gelezen worden.
    #[error("ongeldig attribuut: {0}")]
    Attr(#[from] AttrError),
    /// Een veldwaarde voldoet niet aan de syntax van haar type.
    #[error("ongeldige veldwaarde: {0}")]
    Value(#[from] ValueError),
    /// Het document is geldige XML maar geen bruikbare X3D.
    #[error("ongeldig X3D-document: {0}")]
    Document(String),
}

/// Eén XML-element met zijn attributen en kinderen.
#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> ParseResult<Self> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
        })
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn required(&self, name: &str) -> ParseResult<&str> {
        self.attribute(name).ok_or_else(|| {
            ParseError::Document(format!("<{}> mist attribuut {name}", self.name))
        })
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// Leest de elementboom van een document.
fn read_document(source: &str) -> ParseResult<Element> {
    let mut reader = Reader::from_str(source);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::Document("onverwachte sluittag".to_owned()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(ParseError::Document("document eindigt binnen een element".to_owned()));
    }
    root.ok_or_else(|| ParseError::Document("leeg document".to_owned()))
}

/// De statements van de wereld: de kinderen van `<Scene>`, of het
/// root-element zelf als het document een los fragment is.
fn scene_statements(root: &Element) -> ParseResult<Vec<Element>> {
    match root.name.as_str() {
        "X3D" => root
            .children_named("Scene")
            .next()
            .map(|scene| scene.children.clone())
            .ok_or_else(|| ParseError::Document("<X3D> zonder <Scene>".to_owned())),
        "Scene" => Ok(root.children.clone()),
        _ => Ok(vec![root.clone()]),
    }
}

/// X3D XML-parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct X3dParser;

impl SceneParser for X3dParser {
    fn parse(&self, scene: &mut Scene, source: &str, scope: &Rc<Scope>) -> ParseResult<Vec<NodeId>> {
        let root = read_document(source)?;
        let statements = scene_statements(&root)?;
        log::debug!("X3D document met {} statements", statements.len());
        Builder { scene }.statements(&statements, scope, Context::World)
    }

    fn parse_prototypes(
        &self,
        scene: &mut Scene,
        source: &str,
        scope: &Rc<Scope>,
    ) -> ParseResult<Vec<NodeTypeRef>> {
        let root = read_document(source)?;
        let mut builder = Builder { scene };
        for statement in scene_statements(&root)? {
            match statement.name.as_str() {
                "ProtoDeclare" => builder.proto_declare(&statement, scope)?,
                "ExternProtoDeclare" => builder.extern_proto_declare(&statement, scope)?,
                other => log::debug!("<{other}> overgeslagen in PROTO-bibliotheek"),
            }
        }
        let mut types = scope.proto_types();
        types.reverse();
        Ok(types)
    }
}

/// Attributen die geen veld van de node zijn.
const RESERVED_ATTRIBUTES: [&str; 4] = ["DEF", "USE", "containerField", "class"];

/// Elementen uit de X3D-header die voor de runtime niets betekenen.
const IGNORED_ELEMENTS: [&str; 5] = ["head", "meta", "component", "unit", "MetadataString"];

/// Waar de nodes die gebouwd worden terechtkomen.
#[derive(Clone, Copy)]
enum Context<'a> {
    /// De wereld zelf: nodes worden geregistreerd en PROTO's uitgevouwen.
    World,
    /// De implementatie van een PROTO, alleen bron voor kopieën.
    Body(&'a NodeTypeRef),
    /// Node-waardige standaardwaarde van een PROTO-veld.
    Default,
}

struct Builder<'s> {
    scene: &'s mut Scene,
}

impl Builder<'_> {
    /// Verwerkt een reeks statements en geeft de nodes terug.
    fn statements(
        &mut self,
        elements: &[Element],
        scope: &Rc<Scope>,
        context: Context<'_>,
    ) -> ParseResult<Vec<NodeId>> {
        let mut nodes = Vec::new();
        for element in elements {
            match element.name.as_str() {
                "ProtoDeclare" => self.proto_declare(element, scope)?,
                "ExternProtoDeclare" => self.extern_proto_declare(element, scope)?,
                "ROUTE" => self.route(element, scope),
                name if IGNORED_ELEMENTS.contains(&name) => {}
                _ => nodes.extend(self.node(element, scope, context)?),
            }
        }
        Ok(nodes)
    }

    fn create(&mut self, node_type: &NodeTypeRef, scope: &Rc<Scope>, context: Context<'_>) -> NodeId {
        match context {
            Context::World => self.scene.create_node(node_type, scope),
            Context::Body(_) | Context::Default => self.scene.create_archetype_node(node_type, scope),
        }
    }

    /// Bouwt één node-element, `USE`-verwijzing of `ProtoInstance`.
    fn node(
        &mut self,
        element: &Element,
        scope: &Rc<Scope>,
        context: Context<'_>,
    ) -> ParseResult<Option<NodeId>> {
        if let Some(name) = element.attribute("USE") {
            let found = scope.find_node(name);
            if found.is_none() {
                log::warn!("USE {name}: onbekende DEF-naam");
            }
            return Ok(found);
        }

        let type_name = if element.name == "ProtoInstance" {
            element.required("name")?
        } else {
            element.name.as_str()
        };
        let Some(node_type) = scope.find_type(type_name) else {
            log::warn!("onbekend element <{type_name}> overgeslagen");
            return Ok(None);
        };

        let id = self.create(&node_type, scope, context);
        if let Some(name) = element.attribute("DEF") {
            if let Err(err) = self.scene.set_node_name(id, name) {
                log::warn!("DEF {name}: {err}");
            }
        }

        if element.name != "ProtoInstance" {
            for (name, text) in &element.attributes {
                if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
                    continue;
                }
                let Some(field_type) = node_type.has_field(name) else {
                    log::warn!("<{type_name}>: onbekend attribuut {name} overgeslagen");
                    continue;
                };
                let value = FieldValue::parse(field_type, text)?;
                if let Err(err) = self.scene.set_field(id, name, value) {
                    log::warn!("{type_name}.{name} niet gezet: {err}");
                }
            }
        }

        for child in &element.children {
            match child.name.as_str() {
                "IS" => self.connect(child, id, context),
                "fieldValue" => self.field_value(child, id, &node_type, scope, context)?,
                "ROUTE" => self.route(child, scope),
                "ProtoDeclare" | "ExternProtoDeclare" => {
                    log::warn!("<{}> binnen <{type_name}> overgeslagen", child.name);
                }
                name if IGNORED_ELEMENTS.contains(&name) => {}
                _ => {
                    if let Some(child_id) = self.node(child, scope, context)? {
                        let container = match child.attribute("containerField") {
                            Some(container) => container.to_owned(),
                            None => self.default_container(child_id),
                        };
                        self.attach(id, &container, child_id);
                    }
                }
            }
        }
        Ok(Some(id))
    }

    fn default_container(&self, id: NodeId) -> String {
        self.scene
            .node_type(id)
            .and_then(|node_type| node_type.class())
            .map_or("children", |class| class.default_container())
            .to_owned()
    }

    /// Hangt `child` in veld `container` van `parent`.
    fn attach(&mut self, parent: NodeId, container: &str, child: NodeId) {
        let Some(node_type) = self.scene.node_type(parent) else {
            return;
        };
        let value = match node_type.has_field(container) {
            Some(FieldType::SFNode) => FieldValue::SFNode(Some(child)),
            Some(FieldType::MFNode) => {
                let mut children = self
                    .scene
                    .field(parent, container)
                    .and_then(FieldValue::as_mf_node)
                    .cloned()
                    .unwrap_or_default();
                children.push(child);
                FieldValue::MFNode(children)
            }
            _ => {
                log::warn!("{} heeft geen node-veld {container}", node_type.name());
                self.release_orphan(child);
                return;
            }
        };
        if let Err(err) = self.scene.set_field(parent, container, value) {
            log::warn!("{}.{container}: {err}", node_type.name());
        }
    }

    /// Ruimt een node op die nergens aan gehangen kon worden.
    fn release_orphan(&mut self, id: NodeId) {
        if self.scene.node(id).is_some_and(|node| node.ref_count() == 0)
            && self.scene.retain(id).is_ok()
        {
            self.scene.release(id);
        }
    }

    /// `<IS><connect nodeField=".." protoField=".."/></IS>` binnen een
    /// PROTO-body.
    fn connect(&mut self, element: &Element, id: NodeId, context: Context<'_>) {
        let Context::Body(proto) = context else {
            log::warn!("<IS> buiten een ProtoBody overgeslagen");
            return;
        };
        for connect in element.children_named("connect") {
            let (Some(node_field), Some(proto_field)) =
                (connect.attribute("nodeField"), connect.attribute("protoField"))
            else {
                log::warn!("<connect> zonder nodeField of protoField");
                continue;
            };
            if !proto.add_is(proto_field, IsTarget::new(id, node_field)) {
                log::warn!("PROTO {} heeft geen interface {proto_field}", proto.name());
            }
        }
    }

    /// `<fieldValue name=".." value=".."/>` van een `ProtoInstance`.
    fn field_value(
        &mut self,
        element: &Element,
        id: NodeId,
        node_type: &NodeTypeRef,
        scope: &Rc<Scope>,
        context: Context<'_>,
    ) -> ParseResult<()> {
        let name = element.required("name")?;
        let Some(field_type) = node_type.has_field(name) else {
            log::warn!("PROTO {}: onbekend veld {name}", node_type.name());
            return Ok(());
        };
        let value = self.value(element, field_type, scope, context)?;
        if let Err(err) = self.scene.set_field(id, name, value) {
            log::debug!("{}.{name} niet gezet: {err}", node_type.name());
        }
        Ok(())
    }

    /// Waarde uit een `value`-attribuut, of node-kinderen voor SFNode en
    /// MFNode.
    fn value(
        &mut self,
        element: &Element,
        field_type: FieldType,
        scope: &Rc<Scope>,
        context: Context<'_>,
    ) -> ParseResult<FieldValue> {
        if !field_type.is_node() {
            return match element.attribute("value") {
                Some(text) => Ok(FieldValue::parse(field_type, text)?),
                None => Ok(field_type.default_value()),
            };
        }
        let mut nodes = NodeList::new();
        for child in &element.children {
            if let Some(id) = self.node(child, scope, context)? {
                nodes.push(id);
            }
        }
        Ok(match field_type {
            FieldType::SFNode => FieldValue::SFNode(nodes.get(0)),
            _ => FieldValue::MFNode(nodes),
        })
    }

    /// Een `<field>` uit een `ProtoInterface` of `ExternProtoDeclare`.
    fn interface(
        &mut self,
        element: &Element,
        scope: &Rc<Scope>,
        declarations: &mut Declarations,
    ) -> ParseResult<()> {
        let name = element.required("name")?;
        let type_name = element.required("type")?;
        let field_type = FieldType::from_name(type_name)
            .ok_or_else(|| ParseError::Document(format!("veld {name}: onbekend type {type_name}")))?;
        let access = element.required("accessType")?;
        let kind = InterfaceKind::from_keyword(access)
            .ok_or_else(|| ParseError::Document(format!("veld {name}: onbekend accessType {access}")))?;

        let default = match kind {
            InterfaceKind::Field | InterfaceKind::ExposedField
                if element.attribute("value").is_some() || !element.children.is_empty() =>
            {
                let value = self.value(element, field_type, scope, Context::Default)?;
                // De declaratie is eigenaar van node-waardige standaarden.
                for node in value.node_refs() {
                    if let Err(err) = self.scene.retain(node) {
                        log::debug!("standaardwaarde {name}: {err}");
                    }
                }
                Some(value)
            }
            _ => None,
        };
        declarations.add(
            &NodeInterface {
                kind,
                field_type,
                name: name.to_owned(),
            },
            default,
        );
        Ok(())
    }

    fn declarations(&mut self, elements: &[&Element], scope: &Rc<Scope>) -> ParseResult<Declarations> {
        let mut declarations = Declarations::default();
        for element in elements {
            self.interface(element, scope, &mut declarations)?;
        }
        Ok(declarations)
    }

    fn proto_declare(&mut self, element: &Element, scope: &Rc<Scope>) -> ParseResult<()> {
        let name = element.required("name")?;
        let fields: Vec<&Element> = element
            .children_named("ProtoInterface")
            .flat_map(|interface| interface.children_named("field"))
            .collect();
        let declarations = self.declarations(&fields, scope)?;

        let node_type = NodeType::proto(name, declarations, Vec::new());
        scope.add_type(Rc::clone(&node_type));

        let body_scope = Scope::child(scope, name);
        let nodes = match element.children_named("ProtoBody").next() {
            Some(body) => self.statements(&body.children, &body_scope, Context::Body(&node_type))?,
            None => {
                log::warn!("PROTO {name} zonder <ProtoBody>");
                Vec::new()
            }
        };
        for node in &nodes {
            if let Err(err) = self.scene.retain(*node) {
                log::debug!("PROTO {name}: {err}");
            }
        }
        log::debug!("PROTO {name} gedeclareerd met {} implementatienodes", nodes.len());

        if let Some(mut implementation) = node_type.proto_implementation_mut() {
            implementation.nodes = nodes;
            implementation.scope = Some(body_scope);
        }
        Ok(())
    }

    fn extern_proto_declare(&mut self, element: &Element, scope: &Rc<Scope>) -> ParseResult<()> {
        let name = element.required("name")?;
        let urls = match element.attribute("url") {
            Some(text) => match FieldValue::parse(FieldType::MFString, text)? {
                FieldValue::MFString(urls) => urls,
                _ => Vec::new(),
            },
            None => Vec::new(),
        };
        if urls.is_empty() {
            log::warn!("EXTERNPROTO {name} zonder url");
        }
        let fields: Vec<&Element> = element.children_named("field").collect();
        let declarations = self.declarations(&fields, scope)?;
        scope.add_type(NodeType::proto(name, declarations, urls));
        Ok(())
    }

    fn route(&mut self, element: &Element, scope: &Rc<Scope>) {
        let endpoints = (
            element.attribute("fromNode"),
            element.attribute("fromField"),
            element.attribute("toNode"),
            element.attribute("toField"),
        );
        let (Some(from_node), Some(from_field), Some(to_node), Some(to_field)) = endpoints else {
            log::warn!("onvolledige ROUTE overgeslagen");
            return;
        };
        let (Some(from), Some(to)) = (scope.find_node(from_node), scope.find_node(to_node)) else {
            log::warn!("ROUTE {from_node}.{from_field} TO {to_node}.{to_field}: onbekende DEF-naam");
            return;
        };
        if let Err(err) = self.scene.add_route(from, from_field, to, to_field) {
            log::warn!("ROUTE {from_node}.{from_field} TO {to_node}.{to_field}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(source: &str) -> Scene {
        let mut scene = Scene::default();
        scene.load_str(source, None).unwrap();
        scene
    }

    #[test]
    fn reads_nested_nodes_with_container_fields() {
        let scene = load(
            r#"<X3D><Scene>
                <Transform DEF="T" translation="1 2 3">
                  <Shape>
                    <Appearance><Material diffuseColor="1 0 0"/></Appearance>
                    <Box size="1 1 1"/>
                  </Shape>
                </Transform>
              </Scene></X3D>"#,
        );
        let transform = scene.find_node("T").unwrap();
        assert_eq!(scene.roots(), [transform]);
        assert_eq!(
            scene.get_field(transform, "translation").unwrap(),
            FieldValue::SFVec3f([1.0, 2.0, 3.0])
        );
        let children = scene.get_field(transform, "children").unwrap();
        let shape = children.as_mf_node().unwrap().get(0).unwrap();
        let geometry = scene.get_field(shape, "geometry").unwrap();
        let geometry = geometry.as_node().flatten().unwrap();
        assert_eq!(scene.node(geometry).unwrap().type_name(), "Box");
        assert!(scene.get_field(shape, "appearance").unwrap().as_node().flatten().is_some());
    }

    #[test]
    fn use_shares_the_node_and_mistyped_routes_are_dropped() {
        let scene = load(
            r#"<Scene>
                <TimeSensor DEF="Clock" loop="true"/>
                <Transform DEF="A"><Group DEF="G"/></Transform>
                <Transform DEF="B"><Group USE="G"/></Transform>
                <ROUTE fromNode="Clock" fromField="fraction_changed" toNode="A" toField="set_translation"/>
              </Scene>"#,
        );
        let shared = scene.find_node("G").unwrap();
        assert_eq!(scene.node(shared).unwrap().ref_count(), 2);
        let clock = scene.find_node("Clock").unwrap();
        assert_eq!(scene.node(clock).unwrap().routes().len(), 0);
    }

    #[test]
    fn valid_route_is_recorded() {
        let scene = load(
            r#"<Scene>
                <PositionInterpolator DEF="P" key="0 1" keyValue="0 0 0 1 1 1"/>
                <Transform DEF="A"/>
                <ROUTE fromNode="P" fromField="value_changed" toNode="A" toField="translation"/>
              </Scene>"#,
        );
        let interpolator = scene.find_node("P").unwrap();
        assert_eq!(scene.node(interpolator).unwrap().routes().len(), 1);
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let scene = load(r#"<Scene><Teapot/><Group DEF="G" bogus="1"/></Scene>"#);
        assert_eq!(scene.roots().len(), 1);
        assert!(scene.find_node("G").is_some());
    }

    #[test]
    fn malformed_documents_are_errors() {
        let mut scene = Scene::default();
        assert!(matches!(
            scene.load_str("<Scene><Group></Scene>", None),
            Err(crate::scene::SceneError::Parse(_))
        ));
        assert!(matches!(
            scene.load_str(r#"<Scene><Transform translation="1 2"/></Scene>"#, None),
            Err(crate::scene::SceneError::Parse(ParseError::Value(_)))
        ));
    }
}
