//! De scene: node-arena, wortellijst, eventwachtrij en de updatelus per frame.

use std::rc::Rc;

use thiserror::Error;

use crate::config::SceneConfig;
use crate::graph::event::EventQueue;
use crate::graph::node::{Node, NodeId, NodeState};
use crate::graph::node_type::NodeTypeRef;
use crate::graph::scope::Scope;
use crate::graph::value::FieldType;
use crate::graph::{GraphError, NodeArena};
use crate::nodes::time_sensor::{self, TimerState};
use crate::parse::x3d::{ParseError, X3dParser};
use crate::parse::SceneParser;
use crate::resource::{self, FetchError, FileFetcher, Fetcher};
use crate::viewer::ObjectHandle;

pub mod bindable;
pub mod clone;
pub mod dispatch;
pub mod print;
pub mod proto;
pub mod render;

use bindable::BindableStacks;

/// Resultaattype van scene-operaties.
pub type SceneResult<T> = Result<T, SceneError>;

/// Fouten van scene-operaties. Aflevering vanuit de eventwachtrij logt ze en
/// gaat door.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("node {0} bestaat niet")]
    UnknownNode(NodeId),
    #[error("onbekend node type {0}")]
    UnknownType(String),
    #[error("{type_name} {node}: onbekende interface {name}{}", suggestion_hint(.suggestion))]
    UnknownInterface {
        type_name: String,
        name: String,
        node: String,
        suggestion: Option<String>,
    },
    #[error("{node}.{name} verwacht {expected}, kreeg {found}")]
    TypeMismatch {
        node: String,
        name: String,
        expected: FieldType,
        found: FieldType,
    },
    #[error("{type_name} {node} verwerkt eventIn {name} niet")]
    UnhandledEventIn {
        type_name: String,
        name: String,
        node: String,
    },
    #[error("geen van de urls kon geladen worden: {0:?}")]
    NoLoadableUrl(Vec<String>),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|name| format!(" (bedoelde je {name}?)"))
        .unwrap_or_default()
}

/// Uitgestelde wereldwissel, verwerkt aan het eind van [`Scene::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    LoadUrl(Vec<String>),
    /// Nodes blijven geretaind tot het verzoek verwerkt is.
    ReplaceWorld(Vec<NodeId>),
}

/// Een geladen VRML-wereld en zijn runtime-toestand.
pub struct Scene {
    config: SceneConfig,
    arena: NodeArena,
    roots: Vec<NodeId>,
    scope: Rc<Scope>,
    url: Option<String>,
    queue: EventQueue,
    modified: bool,
    flags_need_updating: bool,
    new_view: bool,
    delta: f64,
    time: f64,
    timers: Vec<NodeId>,
    protos: Vec<NodeId>,
    scoped_lights: Vec<NodeId>,
    bindables: BindableStacks,
    pending: Option<PendingRequest>,
    orphaned_objects: Vec<ObjectHandle>,
    fetcher: Rc<dyn Fetcher>,
    parser: Rc<dyn SceneParser>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("url", &self.url)
            .field("roots", &self.roots)
            .field("nodes", &self.arena.len())
            .field("pending_events", &self.queue.len())
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl Scene {
    #[must_use]
    pub fn new(config: SceneConfig) -> Self {
        let queue = EventQueue::with_capacity(config.max_events);
        let delta = config.default_delta;
        Self {
            config,
            arena: NodeArena::new(),
            roots: Vec::new(),
            scope: Scope::root("world"),
            url: None,
            queue,
            modified: false,
            flags_need_updating: false,
            new_view: true,
            delta,
            time: 0.0,
            timers: Vec::new(),
            protos: Vec::new(),
            scoped_lights: Vec::new(),
            bindables: BindableStacks::default(),
            pending: None,
            orphaned_objects: Vec::new(),
            fetcher: Rc::new(FileFetcher),
            parser: Rc::new(X3dParser),
        }
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Rc<dyn SceneParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Naamruimte van de huidige wereld.
    #[must_use]
    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(id)
    }

    pub(crate) fn require(&self, id: NodeId) -> SceneResult<&Node> {
        self.arena.get(id).ok_or(SceneError::UnknownNode(id))
    }

    /// Aantal levende nodes, PROTO-archetypes inbegrepen.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Zoekt een DEF-naam op in de naamruimte van de wereld.
    #[must_use]
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.scope.find_node(name)
    }

    #[must_use]
    pub fn node_type(&self, id: NodeId) -> Option<NodeTypeRef> {
        self.arena.get(id).map(|node| Rc::clone(node.node_type()))
    }

    /// Huidige simulatietijd, zoals meegegeven aan de laatste update.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Seconden tot de volgende update.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Verlaagt de delta binnen een frame alleen maar.
    pub fn set_delta(&mut self, delta: f64) {
        if delta < self.delta {
            self.delta = delta;
        }
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_scene_modified(&mut self) {
        self.modified = true;
    }

    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    #[must_use]
    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn timers(&self) -> &[NodeId] {
        &self.timers
    }

    #[must_use]
    pub fn proto_instances(&self) -> &[NodeId] {
        &self.protos
    }

    #[must_use]
    pub fn scoped_lights(&self) -> &[NodeId] {
        &self.scoped_lights
    }

    // ─────────────────────────────────────────────────────────────────────
    // Aanmaken en opruimen van nodes
    // ─────────────────────────────────────────────────────────────────────

    /// Maakt een node van `node_type` in `scope`, registreert hem voor
    /// periodieke updates als zijn klasse dat vraagt en vouwt PROTO-typen uit.
    pub fn create_node(&mut self, node_type: &NodeTypeRef, scope: &Rc<Scope>) -> NodeId {
        let id = self.create_archetype_node(node_type, scope);

        match node_type.class() {
            Some(class) => {
                if class.is_timer() {
                    if let Some(node) = self.arena.get_mut(id) {
                        node.state = NodeState::Timer(TimerState::default());
                    }
                    self.timers.push(id);
                }
                if class.is_scoped_light() {
                    self.scoped_lights.push(id);
                }
            }
            None => {
                self.protos.push(id);
                self.instantiate_proto(id, node_type, scope);
            }
        }
        id
    }

    /// Maakt een node zonder registratie of uitvouwen. Voor de inhoud van
    /// PROTO-bodies, die alleen als kopieerbron dient.
    pub fn create_archetype_node(&mut self, node_type: &NodeTypeRef, scope: &Rc<Scope>) -> NodeId {
        let mut node = Node::new(Rc::clone(node_type));
        node.set_scope(Rc::clone(scope));
        let defaults = node.node_refs();
        let id = self.arena.insert(node);
        // Node-standaardwaarden worden gedeeld met de declaratie.
        for child in defaults {
            if let Err(err) = self.arena.retain(child) {
                log::debug!("standaardwaarde verwijst naar ontbrekende node: {err}");
            }
        }
        id
    }

    /// Zoekt het type op in `scope` en maakt er een node van.
    pub fn create_node_by_name(&mut self, type_name: &str, scope: &Rc<Scope>) -> SceneResult<NodeId> {
        let node_type = scope
            .find_type(type_name)
            .ok_or_else(|| SceneError::UnknownType(type_name.to_owned()))?;
        Ok(self.create_node(&node_type, scope))
    }

    /// Geeft een node een DEF-naam in zijn eigen scope.
    pub fn set_node_name(&mut self, id: NodeId, name: &str) -> SceneResult<()> {
        let node = self.arena.get_mut(id).ok_or(SceneError::UnknownNode(id))?;
        if let (Some(old), Some(scope)) = (node.name(), node.scope()) {
            scope.unbind_node(old, id);
        }
        node.set_name(Some(name.to_owned()));
        if let Some(scope) = node.scope() {
            scope.bind_node(name, id);
        }
        Ok(())
    }

    /// Voegt een eigenaarsreferentie toe.
    pub fn retain(&mut self, id: NodeId) -> SceneResult<()> {
        self.arena.retain(id)?;
        Ok(())
    }

    /// Laat een eigenaarsreferentie vallen; zodra niets meer naar de node
    /// verwijst, wordt hij opgeruimd en worden zijn kinderen vrijgegeven.
    pub fn release(&mut self, id: NodeId) {
        let mut worklist = vec![id];
        while let Some(id) = worklist.pop() {
            match self.arena.release(id) {
                Ok(0) => worklist.extend(self.destroy(id)),
                Ok(_) => {}
                Err(err) => log::debug!("release overgeslagen: {err}"),
            }
        }
    }

    /// Haalt een node uit de arena en uit elke tabel die hem noemt. Geeft de
    /// nodes terug waarnaar hij verwees.
    fn destroy(&mut self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.arena.remove(id) else {
            return Vec::new();
        };
        log::trace!("node {} ({}) opgeruimd", node.identity(), node.type_name());

        if let (Some(name), Some(scope)) = (node.name(), node.scope()) {
            scope.unbind_node(name, id);
        }
        self.timers.retain(|other| *other != id);
        self.protos.retain(|other| *other != id);
        self.scoped_lights.retain(|other| *other != id);
        self.bindables.remove_everywhere(id);
        if let Some(object) = node.viewer_object {
            self.orphaned_objects.push(object);
        }

        let mut children = node.node_refs();
        if let NodeState::Proto(instance) = &node.state {
            children.extend(instance.implementation.iter().copied());
        }
        children
    }

    /// Ruimt elke node op die sinds `mark` is aangemaakt, ongeacht de
    /// referentieteller. Oudere nodes verliezen alleen de referenties die de
    /// opgeruimde nodes hielden.
    fn discard_since(&mut self, mark: NodeId) {
        let created: Vec<NodeId> = self.arena.ids().filter(|id| *id >= mark).collect();
        log::debug!("{} half gebouwde nodes opgeruimd", created.len());
        for id in created {
            for child in self.destroy(id) {
                if child < mark {
                    self.release(child);
                }
            }
        }
    }

    /// Voegt een wortelnode toe aan de huidige wereld.
    pub fn add_root(&mut self, id: NodeId) -> SceneResult<()> {
        self.retain(id)?;
        self.roots.push(id);
        self.modified = true;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Laden
    // ─────────────────────────────────────────────────────────────────────

    /// Parst `source` en maakt het meteen de huidige wereld.
    pub fn load_str(&mut self, source: &str, url: Option<&str>) -> SceneResult<()> {
        let scope = Scope::root(url.unwrap_or("world"));
        let previous_url = std::mem::replace(&mut self.url, url.map(str::to_owned));
        let mark = self.arena.next_id();
        let parser = Rc::clone(&self.parser);
        let roots = match parser.parse(self, source, &scope) {
            Ok(roots) => roots,
            Err(err) => {
                self.url = previous_url;
                self.discard_since(mark);
                return Err(err.into());
            }
        };
        for root in &roots {
            self.retain(*root)?;
        }
        self.install_world(roots, Some(scope));
        Ok(())
    }

    /// Haalt de eerste laadbare url op en maakt die de huidige wereld.
    pub fn load_url_now(&mut self, urls: &[String]) -> SceneResult<()> {
        for url in urls {
            let resolved = resource::resolve(self.url.as_deref(), url);
            let (location, _) = resource::split_fragment(&resolved);
            let location = location.to_owned();
            match self.fetcher.fetch(&location) {
                Ok(source) => return self.load_str(&source, Some(&location)),
                Err(err) => log::debug!("kan {location} niet laden: {err}"),
            }
        }
        log::warn!("geen van de urls kon geladen worden: {urls:?}");
        Err(SceneError::NoLoadableUrl(urls.to_vec()))
    }

    /// Vraagt een nieuwe wereld aan voor het eind van de huidige update. Het
    /// leeglopen van de wachtrij stopt zodra er een verzoek openstaat.
    pub fn load_url(&mut self, urls: Vec<String>) {
        if self.pending.is_some() {
            log::debug!("verzoek genegeerd, er staat al een wereldwissel klaar");
            return;
        }
        self.pending = Some(PendingRequest::LoadUrl(urls));
    }

    /// Vraagt dat `nodes` de wereld vervangen aan het eind van de huidige
    /// update.
    pub fn replace_world(&mut self, nodes: Vec<NodeId>) -> SceneResult<()> {
        if self.pending.is_some() {
            log::debug!("verzoek genegeerd, er staat al een wereldwissel klaar");
            return Ok(());
        }
        for node in &nodes {
            self.retain(*node)?;
        }
        self.pending = Some(PendingRequest::ReplaceWorld(nodes));
        Ok(())
    }

    fn process_pending(&mut self) {
        match self.pending.take() {
            Some(PendingRequest::ReplaceWorld(nodes)) => self.install_world(nodes, None),
            Some(PendingRequest::LoadUrl(urls)) => {
                if let Err(err) = self.load_url_now(&urls) {
                    log::warn!("laden van {urls:?} mislukt: {err}");
                }
            }
            None => {}
        }
    }

    /// Wisselt naar een nieuwe wortellijst waarvan de aanroeper de referenties al houdt.
    fn install_world(&mut self, roots: Vec<NodeId>, scope: Option<Rc<Scope>>) {
        let flushed = self.flush_events();
        if flushed > 0 {
            log::debug!("{flushed} events weggegooid bij wereldwissel");
        }

        let old_roots = std::mem::replace(&mut self.roots, roots);
        for root in old_roots {
            self.release(root);
        }
        if let Some(scope) = scope {
            let old_scope = std::mem::replace(&mut self.scope, scope);
            self.release_proto_archetypes(&old_scope);
        }

        self.bindables = BindableStacks::default();
        self.bind_initial();
        self.new_view = true;
        self.modified = true;
        self.flags_need_updating = true;
    }

    /// Gooit alle wachtende events weg.
    pub fn flush_events(&mut self) -> usize {
        self.queue.clear()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Updatelus
    // ─────────────────────────────────────────────────────────────────────

    /// Zet tijdafhankelijke nodes op `time`, levert alle wachtende events af
    /// en verwerkt een openstaande wereldwissel. Een niet-positieve `time`
    /// gebruikt de wandklok. Geeft terug of er opnieuw gerenderd moet worden.
    pub fn update(&mut self, time: f64) -> bool {
        let now = if time <= 0.0 { wall_clock() } else { time };
        self.time = now;
        self.delta = self.config.default_delta;

        for id in self.timers.clone() {
            time_sensor::update(self, id, now);
        }
        self.update_protos();

        self.drain_events();
        self.process_pending();

        self.modified
    }

    fn drain_events(&mut self) {
        while self.pending.is_none() {
            let Some(event) = self.queue.pop() else {
                break;
            };
            if !self.arena.contains(event.to_node) {
                log::debug!(
                    "event {} voor verwijderde node {} overgeslagen",
                    event.to_event_in,
                    event.to_node
                );
                continue;
            }
            if let Err(err) = self.event_in(
                event.to_node,
                &event.to_event_in,
                &event.value,
                event.timestamp,
            ) {
                log::warn!("event {} niet afgeleverd: {err}", event.to_event_in);
            }
        }
    }
}

/// Seconden sinds de Unix-epoch.
fn wall_clock() -> f64 {
    let now = time::OffsetDateTime::now_utc();
    now.unix_timestamp() as f64 + f64::from(now.nanosecond()) * 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::value::FieldValue;
    use super::bindable::BindableKind;

    fn group(scene: &mut Scene) -> NodeId {
        let scope = Rc::clone(scene.scope());
        scene.create_node_by_name("Group", &scope).unwrap()
    }

    #[test]
    fn releasing_last_reference_destroys_subtree() {
        let mut scene = Scene::default();
        let parent = group(&mut scene);
        let child = group(&mut scene);
        scene.set_node_name(child, "Child").unwrap();
        scene
            .set_field(parent, "children", FieldValue::MFNode(vec![child].into()))
            .unwrap();
        scene.add_root(parent).unwrap();
        assert_eq!(scene.node(child).map(Node::ref_count), Some(1));

        scene.release(parent);
        assert!(scene.node(parent).is_none());
        assert!(scene.node(child).is_none());
        assert_eq!(scene.find_node("Child"), None);
    }

    #[test]
    fn shared_child_survives_one_parent() {
        let mut scene = Scene::default();
        let first = group(&mut scene);
        let second = group(&mut scene);
        let shared = group(&mut scene);
        for parent in [first, second] {
            scene
                .set_field(parent, "children", FieldValue::MFNode(vec![shared].into()))
                .unwrap();
            scene.add_root(parent).unwrap();
        }

        scene.release(first);
        assert!(scene.node(shared).is_some());
        scene.release(second);
        assert!(scene.node(shared).is_none());
    }

    #[test]
    fn timers_register_and_unregister() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let timer = scene.create_node_by_name("TimeSensor", &scope).unwrap();
        assert_eq!(scene.timers(), [timer]);
        scene.add_root(timer).unwrap();
        scene.release(timer);
        assert!(scene.timers().is_empty());
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        assert!(matches!(
            scene.create_node_by_name("Teapot", &scope),
            Err(SceneError::UnknownType(name)) if name == "Teapot"
        ));
    }

    #[test]
    fn pending_request_stops_drain_and_replaces_world() {
        let mut scene = Scene::default();
        let old_root = group(&mut scene);
        scene.add_root(old_root).unwrap();
        let new_root = group(&mut scene);

        scene.replace_world(vec![new_root]).unwrap();
        assert!(matches!(
            scene.pending_request(),
            Some(PendingRequest::ReplaceWorld(_))
        ));
        scene.update(1.0);

        assert!(scene.pending_request().is_none());
        assert_eq!(scene.roots(), [new_root]);
        assert!(scene.node(old_root).is_none());
        assert_eq!(scene.node(new_root).map(Node::ref_count), Some(1));
    }

    #[test]
    fn failed_load_leaves_no_nodes_behind() {
        let mut scene = Scene::default();
        scene
            .load_str(r#"<Scene><Group DEF="Kept"/></Scene>"#, Some("kept.x3d"))
            .unwrap();
        let kept = scene.find_node("Kept").unwrap();
        let before = scene.node_count();

        let result = scene.load_str(
            r#"<Scene>
                 <ProtoDeclare name="Lamp">
                   <ProtoBody><PointLight/></ProtoBody>
                 </ProtoDeclare>
                 <TimeSensor DEF="Clock"/>
                 <ProtoInstance name="Lamp"/>
                 <Viewpoint/>
                 <Transform translation="a b"/>
               </Scene>"#,
            Some("broken.x3d"),
        );
        assert!(matches!(result, Err(SceneError::Parse(_))));
        assert!(scene.timers().is_empty());
        assert!(scene.proto_instances().is_empty());
        assert!(scene.scoped_lights().is_empty());
        assert_eq!(scene.bindable_top(BindableKind::Viewpoint), None);
        assert_eq!(scene.node_count(), before);
        assert_eq!(scene.find_node("Kept"), Some(kept));
        assert_eq!(scene.url(), Some("kept.x3d"));
    }
}
