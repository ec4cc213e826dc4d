//! Lichtbronnen. Een `DirectionalLight` belicht alleen zijn broers in de
//! groep; een `PointLight` belicht de hele wereld en wordt vóór de roots
//! gerenderd.

use super::{NodeClass, Registration};
use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue};
use crate::scene::Scene;
use crate::viewer::{PointLightParams, Viewer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    DirectionalLight,
    PointLight,
}

pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "DirectionalLight",
        class: NodeClass::Light(NodeKind::DirectionalLight),
        declare: declare_directional,
    },
    Registration {
        name: "PointLight",
        class: NodeClass::Light(NodeKind::PointLight),
        declare: declare_point,
    },
];

fn declare_light(declarations: &mut Declarations) {
    declarations.add_exposed_field("ambientIntensity", FieldType::SFFloat, None);
    declarations.add_exposed_field(
        "color",
        FieldType::SFColor,
        Some(FieldValue::SFColor([1.0, 1.0, 1.0])),
    );
    declarations.add_exposed_field("intensity", FieldType::SFFloat, Some(FieldValue::SFFloat(1.0)));
    declarations.add_exposed_field("on", FieldType::SFBool, Some(FieldValue::SFBool(true)));
}

fn declare_directional(declarations: &mut Declarations) {
    declare_light(declarations);
    declarations.add_exposed_field(
        "direction",
        FieldType::SFVec3f,
        Some(FieldValue::SFVec3f([0.0, 0.0, -1.0])),
    );
}

fn declare_point(declarations: &mut Declarations) {
    declare_light(declarations);
    declarations.add_exposed_field(
        "attenuation",
        FieldType::SFVec3f,
        Some(FieldValue::SFVec3f([1.0, 0.0, 0.0])),
    );
    declarations.add_exposed_field("location", FieldType::SFVec3f, None);
    declarations.add_exposed_field("radius", FieldType::SFFloat, Some(FieldValue::SFFloat(100.0)));
}

/// Gemeenschappelijke velden van beide lichten.
struct Light {
    on: bool,
    ambient_intensity: f32,
    intensity: f32,
    color: [f32; 3],
}

impl Light {
    fn read(scene: &Scene, id: NodeId) -> Self {
        let float = |name: &str, fallback: f32| {
            scene.field(id, name).and_then(FieldValue::as_float).unwrap_or(fallback)
        };
        Self {
            on: scene.field(id, "on").and_then(FieldValue::as_bool).unwrap_or(true),
            ambient_intensity: float("ambientIntensity", 0.0),
            intensity: float("intensity", 1.0),
            color: scene
                .field(id, "color")
                .and_then(FieldValue::as_color)
                .unwrap_or([1.0; 3]),
        }
    }
}

pub fn render_directional(scene: &mut Scene, id: NodeId, viewer: &mut dyn Viewer) {
    let light = Light::read(scene, id);
    if light.on {
        let direction = scene
            .field(id, "direction")
            .and_then(FieldValue::as_vec3f)
            .unwrap_or([0.0, 0.0, -1.0]);
        viewer.insert_dir_light(light.ambient_intensity, light.intensity, light.color, direction);
    }
    scene.clear_modified(id);
}

/// Rendert een `PointLight` buiten de node-hiërarchie.
pub fn render_scoped(scene: &mut Scene, id: NodeId, viewer: &mut dyn Viewer) {
    let light = Light::read(scene, id);
    if light.on {
        let vec3 = |name: &str, fallback: [f32; 3]| {
            scene
                .field(id, name)
                .and_then(FieldValue::as_vec3f)
                .unwrap_or(fallback)
        };
        let params = PointLightParams {
            ambient_intensity: light.ambient_intensity,
            attenuation: vec3("attenuation", [1.0, 0.0, 0.0]),
            color: light.color,
            intensity: light.intensity,
            location: vec3("location", [0.0; 3]),
            radius: scene
                .field(id, "radius")
                .and_then(FieldValue::as_float)
                .unwrap_or(100.0),
        };
        viewer.insert_point_light(&params);
    }
    scene.clear_modified(id);
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::viewer::{TraceViewer, ViewerCall};

    #[test]
    fn switched_off_light_emits_nothing() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let light = scene.create_node_by_name("PointLight", &scope).unwrap();
        assert_eq!(scene.scoped_lights(), [light]);

        let mut viewer = TraceViewer::new();
        render_scoped(&mut scene, light, &mut viewer);
        assert!(matches!(
            viewer.calls(),
            [ViewerCall::InsertPointLight { light, .. }] if (light.radius - 100.0).abs() < f32::EPSILON
        ));

        scene.set_field(light, "on", FieldValue::SFBool(false)).unwrap();
        let mut viewer = TraceViewer::new();
        render_scoped(&mut scene, light, &mut viewer);
        assert!(viewer.calls().is_empty());
    }
}
