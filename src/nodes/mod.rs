//! Ingebouwde VRML97 node klassen: registraties, interface-declaraties en
//! klasse-specifiek gedrag.

use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue};
use crate::math::BSphere;
use crate::scene::bindable::BindableKind;
use crate::scene::{Scene, SceneResult};
use crate::viewer::Viewer;

pub mod bindable;
pub mod grouping;
pub mod interpolators;
pub mod lights;
pub mod shape;
pub mod time_sensor;

/// Klasse van een ingebouwd node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Grouping(grouping::NodeKind),
    Shape(shape::NodeKind),
    TimeSensor,
    Interpolator(interpolators::NodeKind),
    Bindable(bindable::NodeKind),
    Light(lights::NodeKind),
    WorldInfo,
}

/// Metadata voor een registratie in de tabel met ingebouwde types.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub name: &'static str,
    pub class: NodeClass,
    pub declare: fn(&mut Declarations),
}

/// Registraties die niet bij een specifieke module horen.
pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "TimeSensor",
        class: NodeClass::TimeSensor,
        declare: time_sensor::declare,
    },
    Registration {
        name: "WorldInfo",
        class: NodeClass::WorldInfo,
        declare: declare_world_info,
    },
];

/// Alle ingebouwde registraties.
pub fn registrations() -> impl Iterator<Item = &'static Registration> {
    grouping::REGISTRATIONS
        .iter()
        .chain(shape::REGISTRATIONS)
        .chain(interpolators::REGISTRATIONS)
        .chain(bindable::REGISTRATIONS)
        .chain(lights::REGISTRATIONS)
        .chain(REGISTRATIONS)
}

fn declare_world_info(declarations: &mut Declarations) {
    declarations.add_field("info", FieldType::MFString, None);
    declarations.add_field("title", FieldType::SFString, None);
}

impl NodeClass {
    /// Het bindable-stapeltype, als deze klasse er een heeft.
    #[must_use]
    pub fn bindable(self) -> Option<BindableKind> {
        match self {
            Self::Bindable(kind) => Some(kind.binding()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timer(self) -> bool {
        matches!(self, Self::TimeSensor)
    }

    /// Lichten die vóór de wereld gerenderd worden en de hele scène
    /// belichten.
    #[must_use]
    pub fn is_scoped_light(self) -> bool {
        matches!(self, Self::Light(lights::NodeKind::PointLight))
    }

    #[must_use]
    pub fn is_grouping(self) -> bool {
        matches!(self, Self::Grouping(_))
    }

    /// Of een wijziging van `field` de bounding sphere ongeldig maakt.
    #[must_use]
    pub fn affects_bounds(self, field: &str) -> bool {
        match self {
            Self::Grouping(kind) => kind.affects_bounds(field),
            Self::Shape(kind) => kind.affects_bounds(field),
            _ => false,
        }
    }

    /// Standaard `containerField` in de X3D-codering.
    #[must_use]
    pub fn default_container(self) -> &'static str {
        match self {
            Self::Shape(kind) => kind.default_container(),
            _ => "children",
        }
    }

    /// Klasse-specifieke eventIns. `Ok(false)` laat de gewone
    /// exposedField-afhandeling het event verwerken.
    pub fn process_event(
        self,
        scene: &mut Scene,
        id: NodeId,
        name: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> SceneResult<bool> {
        match self {
            Self::Grouping(_) => grouping::process_event(scene, id, name, value, timestamp),
            Self::TimeSensor => time_sensor::process_event(scene, id, name, value, timestamp),
            Self::Interpolator(kind) => kind.process_event(scene, id, name, value, timestamp),
            Self::Bindable(_) => bindable::process_event(scene, id, name, value, timestamp),
            Self::Shape(_) | Self::Light(_) | Self::WorldInfo => Ok(false),
        }
    }

    pub fn render(self, scene: &mut Scene, id: NodeId, viewer: &mut dyn Viewer) {
        match self {
            Self::Grouping(kind) => grouping::render(scene, id, kind, viewer),
            Self::Shape(shape::NodeKind::Shape) => shape::render(scene, id, viewer),
            Self::Light(lights::NodeKind::DirectionalLight) => {
                lights::render_directional(scene, id, viewer);
            }
            _ => {}
        }
    }

    /// Bounding sphere in de coördinaten van de ouder.
    pub fn bounds(self, scene: &mut Scene, id: NodeId, path: &mut Vec<NodeId>) -> BSphere {
        match self {
            Self::Grouping(kind) => grouping::bounds(scene, id, kind, path),
            Self::Shape(kind) => shape::bounds(scene, id, kind, path),
            _ => BSphere::empty(),
        }
    }
}
