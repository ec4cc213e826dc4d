#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod graph;
pub mod math;
pub mod nodes;
pub mod parse;
pub mod resource;
pub mod scene;
pub mod viewer;

use std::fmt;
use std::rc::Rc;

use config::SceneConfig;
use graph::node::NodeId;
use graph::value::FieldValue;
use resource::MemoryFetcher;
use scene::Scene;
use viewer::TraceViewer;
use wasm_bindgen::JsError;
use wasm_bindgen::prelude::*;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "console_error_panic_hook", target_arch = "wasm32"))] {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            console_error_panic_hook::set_once();
            init_logger();
        }
    } else {
        #[wasm_bindgen(start)]
        pub fn initialize() {
            init_logger();
        }
    }
}

#[cfg(feature = "debug_logs")]
fn init_logger() {
    use log::LevelFilter;
    use wasm_bindgen_console_logger::DEFAULT_LOGGER;
    if log::set_logger(&DEFAULT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(not(feature = "debug_logs"))]
fn init_logger() {}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            #[cfg(target_arch = "wasm32")]
            {
                ::web_sys::console::log_1(&::wasm_bindgen::JsValue::from_str(&format!($($t)*)));
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                println!("{}", format!($($t)*));
            }
        }
    }};
}

/// Publieke ingang voor JavaScript: een scène met documenten uit het
/// geheugen en een viewer die zijn aanroepen opneemt.
#[wasm_bindgen]
pub struct Engine {
    scene: Scene,
    documents: Rc<MemoryFetcher>,
    viewer: TraceViewer,
}

#[wasm_bindgen]
impl Engine {
    /// Maakt een engine, optioneel met een configuratie-object met de
    /// velden van [`SceneConfig`].
    #[wasm_bindgen(constructor)]
    pub fn new(config: Option<JsValue>) -> Result<Engine, JsValue> {
        let config = match config {
            Some(value) if !value.is_undefined() && !value.is_null() => {
                serde_wasm_bindgen::from_value(value).map_err(to_js_error)?
            }
            _ => SceneConfig::default(),
        };
        Ok(Self::with_config(config))
    }

    /// Laadt een X3D-document als de nieuwe wereld.
    #[wasm_bindgen]
    pub fn load_x3d(&mut self, xml: &str) -> Result<(), JsValue> {
        self.scene.load_str(xml, None).map_err(to_js_error)?;
        debug_log!("wereld geladen met {} nodes", self.scene.node_count());
        Ok(())
    }

    /// Maakt een document beschikbaar voor EXTERNPROTO's en `load_url`.
    #[wasm_bindgen]
    pub fn register_document(&mut self, url: &str, xml: &str) {
        self.documents.insert(url, xml);
    }

    /// Werkt de wereld bij tot `time` seconden; `0` gebruikt de klok.
    /// Geeft terug of er opnieuw gerenderd moet worden.
    #[wasm_bindgen]
    pub fn update(&mut self, time: f64) -> bool {
        self.scene.update(time)
    }

    /// Seconden tot de volgende update nodig is.
    #[wasm_bindgen]
    pub fn delta(&self) -> f64 {
        self.scene.delta()
    }

    /// Rendert een frame en geeft de opgenomen viewer-aanroepen terug.
    #[wasm_bindgen]
    pub fn render(&mut self) -> Result<JsValue, JsValue> {
        self.scene.render(&mut self.viewer);
        let calls = self.viewer.take_calls();
        serde_wasm_bindgen::to_value(&calls).map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// Leest een veld of eventOut van een DEF-node als VRML-tekst.
    #[wasm_bindgen]
    pub fn get_field(&self, def: &str, field: &str) -> Result<String, JsValue> {
        let id = self.lookup(def)?;
        let value = self.scene.get_field(id, field).map_err(to_js_error)?;
        Ok(value.to_string())
    }

    /// Zet een veld van een DEF-node vanuit VRML-tekst.
    #[wasm_bindgen]
    pub fn set_field(&mut self, def: &str, field: &str, text: &str) -> Result<(), JsValue> {
        let id = self.lookup(def)?;
        let field_type = self
            .scene
            .node_type(id)
            .and_then(|node_type| node_type.has_field(field))
            .ok_or_else(|| js_error(&format!("{def} heeft geen veld {field}")))?;
        let value = FieldValue::parse(field_type, text).map_err(to_js_error)?;
        self.scene.set_field(id, field, value).map_err(to_js_error)
    }

    /// Stuurt een event naar een DEF-node, met de tijd van de laatste
    /// update als tijdstempel.
    #[wasm_bindgen]
    pub fn send_event(&mut self, def: &str, event_in: &str, text: &str) -> Result<(), JsValue> {
        let id = self.lookup(def)?;
        let node_type = self.scene.node_type(id).ok_or_else(|| js_error("node is verwijderd"))?;
        let resolved = node_type.declarations().resolve_event_in(event_in);
        let (name, field_type) =
            resolved.ok_or_else(|| js_error(&format!("{def} heeft geen eventIn {event_in}")))?;
        let value = FieldValue::parse(field_type, text).map_err(to_js_error)?;
        let timestamp = self.scene.time();
        self.scene
            .event_in(id, &name, &value, timestamp)
            .map_err(to_js_error)
    }

    /// Alle DEF-namen van de huidige wereld, gesorteerd.
    #[wasm_bindgen]
    pub fn node_names(&self) -> Result<JsValue, JsValue> {
        let names = self.scene.scope().node_names();
        serde_wasm_bindgen::to_value(&names).map_err(|err| JsError::new(&err.to_string()).into())
    }

    /// De huidige wereld als VRML97-tekst.
    #[wasm_bindgen]
    pub fn world_text(&self) -> String {
        self.scene.print_world()
    }
}

impl Engine {
    /// Engine voor gebruik zonder JavaScript.
    #[must_use]
    pub fn with_config(config: SceneConfig) -> Self {
        let documents = Rc::new(MemoryFetcher::new());
        let scene = Scene::new(config).with_fetcher(Rc::clone(&documents) as Rc<dyn resource::Fetcher>);
        Self {
            scene,
            documents,
            viewer: TraceViewer::new(),
        }
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn lookup(&self, def: &str) -> Result<NodeId, JsValue> {
        self.scene
            .find_node(def)
            .ok_or_else(|| js_error(&format!("onbekende DEF-naam {def}")))
    }
}

fn to_js_error<E: fmt::Display>(error: E) -> JsValue {
    js_error(&error.to_string())
}

fn js_error(message: &str) -> JsValue {
    #[cfg(target_arch = "wasm32")]
    {
        JsError::new(message).into()
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
        JsValue::NULL
    }
}
