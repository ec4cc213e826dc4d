//! `Shape` met zijn uiterlijk en de primitieve geometrieën.

use super::{NodeClass, Registration};
use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue};
use crate::math::{BSphere, Vec3};
use crate::scene::Scene;
use crate::viewer::{MaterialParams, Viewer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Shape,
    Appearance,
    Material,
    Box,
    Sphere,
    Cone,
    Cylinder,
}

pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "Shape",
        class: NodeClass::Shape(NodeKind::Shape),
        declare: declare_shape,
    },
    Registration {
        name: "Appearance",
        class: NodeClass::Shape(NodeKind::Appearance),
        declare: declare_appearance,
    },
    Registration {
        name: "Material",
        class: NodeClass::Shape(NodeKind::Material),
        declare: declare_material,
    },
    Registration {
        name: "Box",
        class: NodeClass::Shape(NodeKind::Box),
        declare: declare_box,
    },
    Registration {
        name: "Sphere",
        class: NodeClass::Shape(NodeKind::Sphere),
        declare: declare_sphere,
    },
    Registration {
        name: "Cone",
        class: NodeClass::Shape(NodeKind::Cone),
        declare: declare_cone,
    },
    Registration {
        name: "Cylinder",
        class: NodeClass::Shape(NodeKind::Cylinder),
        declare: declare_cylinder,
    },
];

fn declare_shape(declarations: &mut Declarations) {
    declarations.add_exposed_field("appearance", FieldType::SFNode, None);
    declarations.add_exposed_field("geometry", FieldType::SFNode, None);
}

fn declare_appearance(declarations: &mut Declarations) {
    declarations.add_exposed_field("material", FieldType::SFNode, None);
    declarations.add_exposed_field("texture", FieldType::SFNode, None);
    declarations.add_exposed_field("textureTransform", FieldType::SFNode, None);
}

fn declare_material(declarations: &mut Declarations) {
    let defaults = MaterialParams::default();
    declarations.add_exposed_field(
        "ambientIntensity",
        FieldType::SFFloat,
        Some(FieldValue::SFFloat(defaults.ambient_intensity)),
    );
    declarations.add_exposed_field(
        "diffuseColor",
        FieldType::SFColor,
        Some(FieldValue::SFColor(defaults.diffuse_color)),
    );
    declarations.add_exposed_field("emissiveColor", FieldType::SFColor, None);
    declarations.add_exposed_field(
        "shininess",
        FieldType::SFFloat,
        Some(FieldValue::SFFloat(defaults.shininess)),
    );
    declarations.add_exposed_field("specularColor", FieldType::SFColor, None);
    declarations.add_exposed_field("transparency", FieldType::SFFloat, None);
}

fn declare_box(declarations: &mut Declarations) {
    declarations.add_field("size", FieldType::SFVec3f, Some(FieldValue::SFVec3f([2.0, 2.0, 2.0])));
}

fn declare_sphere(declarations: &mut Declarations) {
    declarations.add_field("radius", FieldType::SFFloat, Some(FieldValue::SFFloat(1.0)));
}

fn declare_cone(declarations: &mut Declarations) {
    declarations.add_field("bottomRadius", FieldType::SFFloat, Some(FieldValue::SFFloat(1.0)));
    declarations.add_field("height", FieldType::SFFloat, Some(FieldValue::SFFloat(2.0)));
    declarations.add_field("side", FieldType::SFBool, Some(FieldValue::SFBool(true)));
    declarations.add_field("bottom", FieldType::SFBool, Some(FieldValue::SFBool(true)));
}

fn declare_cylinder(declarations: &mut Declarations) {
    declarations.add_field("bottom", FieldType::SFBool, Some(FieldValue::SFBool(true)));
    declarations.add_field("height", FieldType::SFFloat, Some(FieldValue::SFFloat(2.0)));
    declarations.add_field("radius", FieldType::SFFloat, Some(FieldValue::SFFloat(1.0)));
    declarations.add_field("side", FieldType::SFBool, Some(FieldValue::SFBool(true)));
    declarations.add_field("top", FieldType::SFBool, Some(FieldValue::SFBool(true)));
}

impl NodeKind {
    pub(super) fn affects_bounds(self, field: &str) -> bool {
        match self {
            Self::Shape => field == "geometry",
            Self::Box => field == "size",
            Self::Sphere => field == "radius",
            Self::Cone => field == "height" || field == "bottomRadius",
            Self::Cylinder => field == "height" || field == "radius",
            Self::Appearance | Self::Material => false,
        }
    }

    pub(super) fn default_container(self) -> &'static str {
        match self {
            Self::Shape => "children",
            Self::Appearance => "appearance",
            Self::Material => "material",
            Self::Box | Self::Sphere | Self::Cone | Self::Cylinder => "geometry",
        }
    }
}

fn float(scene: &Scene, id: NodeId, name: &str, fallback: f32) -> f32 {
    scene.field(id, name).and_then(FieldValue::as_float).unwrap_or(fallback)
}

fn flag(scene: &Scene, id: NodeId, name: &str) -> bool {
    scene.field(id, name).and_then(FieldValue::as_bool).unwrap_or(true)
}

fn color(scene: &Scene, id: NodeId, name: &str, fallback: [f32; 3]) -> [f32; 3] {
    scene.field(id, name).and_then(FieldValue::as_color).unwrap_or(fallback)
}

/// Het SFNode-veld, met een PROTO-instantie vervangen door zijn eerste
/// implementatienode.
fn child(scene: &Scene, id: NodeId, name: &str) -> Option<NodeId> {
    let child = scene.field(id, name).and_then(FieldValue::as_node).flatten()?;
    Some(scene.proto_primary_node(child).unwrap_or(child))
}

fn shape_kind(scene: &Scene, id: NodeId) -> Option<NodeKind> {
    match scene.node(id)?.node_type().class()? {
        NodeClass::Shape(kind) => Some(kind),
        _ => None,
    }
}

fn material(scene: &Scene, id: NodeId) -> MaterialParams {
    let defaults = MaterialParams::default();
    MaterialParams {
        ambient_intensity: float(scene, id, "ambientIntensity", defaults.ambient_intensity),
        diffuse_color: color(scene, id, "diffuseColor", defaults.diffuse_color),
        emissive_color: color(scene, id, "emissiveColor", defaults.emissive_color),
        shininess: float(scene, id, "shininess", defaults.shininess),
        specular_color: color(scene, id, "specularColor", defaults.specular_color),
        transparency: float(scene, id, "transparency", defaults.transparency),
    }
}

/// Rendert materiaal en geometrie binnen een eigen viewer-object, dat
/// hergebruikt wordt zolang niets eronder gewijzigd is.
pub(super) fn render(scene: &mut Scene, id: NodeId, viewer: &mut dyn Viewer) {
    let Some(node) = scene.node(id) else {
        return;
    };
    if let Some(object) = node.viewer_object {
        if !node.is_modified() {
            viewer.insert_reference(object);
            return;
        }
        viewer.remove_object(object);
    }

    let handle = viewer.begin_object(node.name());
    let appearance = child(scene, id, "appearance");
    let material_node = appearance.and_then(|appearance| child(scene, appearance, "material"));
    if let Some(material_node) = material_node {
        viewer.set_material(&material(scene, material_node));
    }

    let geometry = child(scene, id, "geometry");
    if let Some(geometry) = geometry {
        match shape_kind(scene, geometry) {
            Some(NodeKind::Box) => {
                let size = scene
                    .field(geometry, "size")
                    .and_then(FieldValue::as_vec3f)
                    .unwrap_or([2.0; 3]);
                viewer.insert_box(size);
            }
            Some(NodeKind::Sphere) => {
                viewer.insert_sphere(float(scene, geometry, "radius", 1.0));
            }
            Some(NodeKind::Cone) => {
                viewer.insert_cone(
                    float(scene, geometry, "height", 2.0),
                    float(scene, geometry, "bottomRadius", 1.0),
                    flag(scene, geometry, "bottom"),
                    flag(scene, geometry, "side"),
                );
            }
            Some(NodeKind::Cylinder) => {
                viewer.insert_cylinder(
                    float(scene, geometry, "height", 2.0),
                    float(scene, geometry, "radius", 1.0),
                    flag(scene, geometry, "bottom"),
                    flag(scene, geometry, "side"),
                    flag(scene, geometry, "top"),
                );
            }
            _ => log::debug!("geometrie {geometry} wordt niet ondersteund"),
        }
    }
    viewer.end_object();

    for rendered in [appearance, material_node, geometry].into_iter().flatten() {
        scene.clear_modified(rendered);
    }
    if let Some(node) = scene.node_mut(id) {
        node.viewer_object = Some(handle);
    }
}

pub(super) fn bounds(scene: &mut Scene, id: NodeId, kind: NodeKind, path: &mut Vec<NodeId>) -> BSphere {
    let center = Vec3::ZERO;
    match kind {
        NodeKind::Shape => match child(scene, id, "geometry") {
            Some(geometry) => scene.compute_bounds(geometry, path),
            None => BSphere::empty(),
        },
        NodeKind::Box => {
            let size = scene
                .field(id, "size")
                .and_then(FieldValue::as_vec3f)
                .unwrap_or([2.0; 3]);
            BSphere::new(center, Vec3::from_f32(size).length() * 0.5)
        }
        NodeKind::Sphere => BSphere::new(center, f64::from(float(scene, id, "radius", 1.0))),
        NodeKind::Cone => {
            let radius = f64::from(float(scene, id, "bottomRadius", 1.0));
            let half_height = f64::from(float(scene, id, "height", 2.0)) * 0.5;
            BSphere::new(center, radius.hypot(half_height))
        }
        NodeKind::Cylinder => {
            let radius = f64::from(float(scene, id, "radius", 1.0));
            let half_height = f64::from(float(scene, id, "height", 2.0)) * 0.5;
            BSphere::new(center, radius.hypot(half_height))
        }
        NodeKind::Appearance | NodeKind::Material => BSphere::empty(),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::graph::value::FieldValue;
    use crate::scene::Scene;
    use crate::viewer::{TraceViewer, ViewerCall};

    #[test]
    fn shape_emits_material_and_geometry() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let shape = scene.create_node_by_name("Shape", &scope).unwrap();
        let appearance = scene.create_node_by_name("Appearance", &scope).unwrap();
        let material = scene.create_node_by_name("Material", &scope).unwrap();
        let sphere = scene.create_node_by_name("Sphere", &scope).unwrap();
        scene
            .set_field(material, "diffuseColor", FieldValue::SFColor([1.0, 0.0, 0.0]))
            .unwrap();
        scene
            .set_field(appearance, "material", FieldValue::SFNode(Some(material)))
            .unwrap();
        scene
            .set_field(shape, "appearance", FieldValue::SFNode(Some(appearance)))
            .unwrap();
        scene
            .set_field(shape, "geometry", FieldValue::SFNode(Some(sphere)))
            .unwrap();
        scene.set_field(sphere, "radius", FieldValue::SFFloat(3.0)).unwrap();

        let mut viewer = TraceViewer::new();
        scene.render_node(shape, &mut viewer);
        let calls = viewer.calls();
        assert!(calls.iter().any(|call| matches!(
            call,
            ViewerCall::SetMaterial { material } if material.diffuse_color == [1.0, 0.0, 0.0]
        )));
        assert!(calls
            .iter()
            .any(|call| matches!(call, ViewerCall::InsertSphere { radius, .. } if (*radius - 3.0).abs() < 1e-6)));
        assert!(!scene.is_node_modified(material));
        assert!((scene.bounding_sphere(shape).radius - 3.0).abs() < 1e-6);
    }
}
