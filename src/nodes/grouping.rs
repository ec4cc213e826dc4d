//! Groeperende nodes: `Group` en `Transform`.

use super::{NodeClass, Registration};
use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue, NodeList};
use crate::math::{BSphere, Mat4, Vec3};
use crate::scene::{Scene, SceneResult};
use crate::viewer::Viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Transform,
}

pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "Group",
        class: NodeClass::Grouping(NodeKind::Group),
        declare: declare_group,
    },
    Registration {
        name: "Transform",
        class: NodeClass::Grouping(NodeKind::Transform),
        declare: declare_transform,
    },
];

const TRANSFORM_FIELDS: [&str; 5] = ["center", "rotation", "scale", "scaleOrientation", "translation"];

fn declare_group(declarations: &mut Declarations) {
    declarations.add_event_in("addChildren", FieldType::MFNode);
    declarations.add_event_in("removeChildren", FieldType::MFNode);
    declarations.add_exposed_field("children", FieldType::MFNode, None);
    declarations.add_field("bboxCenter", FieldType::SFVec3f, None);
    declarations.add_field(
        "bboxSize",
        FieldType::SFVec3f,
        Some(FieldValue::SFVec3f([-1.0, -1.0, -1.0])),
    );
}

fn declare_transform(declarations: &mut Declarations) {
    declare_group(declarations);
    declarations.add_exposed_field("center", FieldType::SFVec3f, None);
    declarations.add_exposed_field(
        "rotation",
        FieldType::SFRotation,
        Some(FieldValue::SFRotation([0.0, 0.0, 1.0, 0.0])),
    );
    declarations.add_exposed_field(
        "scale",
        FieldType::SFVec3f,
        Some(FieldValue::SFVec3f([1.0, 1.0, 1.0])),
    );
    declarations.add_exposed_field(
        "scaleOrientation",
        FieldType::SFRotation,
        Some(FieldValue::SFRotation([0.0, 0.0, 1.0, 0.0])),
    );
    declarations.add_exposed_field("translation", FieldType::SFVec3f, None);
}

impl NodeKind {
    pub(super) fn affects_bounds(self, field: &str) -> bool {
        match self {
            Self::Group => field == "children",
            Self::Transform => field == "children" || TRANSFORM_FIELDS.contains(&field),
        }
    }
}

/// `addChildren` voegt ontbrekende kinderen achteraan toe,
/// `removeChildren` haalt elk voorkomen weg. Beide sturen
/// `children_changed`.
pub(super) fn process_event(
    scene: &mut Scene,
    id: NodeId,
    name: &str,
    value: &FieldValue,
    timestamp: f64,
) -> SceneResult<bool> {
    let adding = match name {
        "addChildren" => true,
        "removeChildren" => false,
        _ => return Ok(false),
    };
    let Some(changes) = value.as_mf_node() else {
        return Err(scene.type_mismatch(id, name, FieldType::MFNode, value.field_type()));
    };

    let mut children = children(scene, id);
    for child in changes.iter() {
        if adding {
            if !children.contains(child) {
                children.push(child);
            }
        } else {
            children.remove_all(child);
        }
    }

    let children = FieldValue::MFNode(children);
    scene.set_field(id, "children", children.clone())?;
    scene.event_out(id, "children_changed", &children, timestamp);
    Ok(true)
}

fn children(scene: &Scene, id: NodeId) -> NodeList {
    scene
        .field(id, "children")
        .and_then(FieldValue::as_mf_node)
        .cloned()
        .unwrap_or_default()
}

/// De lokale matrix van een `Transform`; `None` voor andere nodes.
#[must_use]
pub fn transform_matrix(scene: &Scene, id: NodeId) -> Option<Mat4> {
    let class = scene.node(id)?.node_type().class()?;
    if class != NodeClass::Grouping(NodeKind::Transform) {
        return None;
    }
    let vec3 = |name: &str, fallback: [f32; 3]| {
        scene
            .field(id, name)
            .and_then(FieldValue::as_vec3f)
            .unwrap_or(fallback)
    };
    let rotation = |name: &str| {
        scene
            .field(id, name)
            .and_then(FieldValue::as_rotation)
            .unwrap_or([0.0, 0.0, 1.0, 0.0])
    };
    Some(Mat4::vrml_transform(
        vec3("translation", [0.0; 3]),
        rotation("rotation"),
        vec3("scale", [1.0; 3]),
        rotation("scaleOrientation"),
        vec3("center", [0.0; 3]),
    ))
}

/// Rendert de kinderen binnen één viewer-object. Zolang de node en zijn
/// afstammelingen ongewijzigd zijn wordt het bewaarde object hergebruikt.
pub(super) fn render(scene: &mut Scene, id: NodeId, kind: NodeKind, viewer: &mut dyn Viewer) {
    let Some(node) = scene.node(id) else {
        return;
    };
    let name = node.name().map(str::to_owned);
    if let Some(object) = node.viewer_object {
        if !node.is_modified() {
            viewer.insert_reference(object);
            return;
        }
        viewer.remove_object(object);
    }

    let handle = viewer.begin_object(name.as_deref());
    if kind == NodeKind::Transform {
        if let Some(matrix) = transform_matrix(scene, id) {
            viewer.transform(&matrix);
        }
    }
    for child in children(scene, id).iter() {
        scene.render_node(child, viewer);
    }
    viewer.end_object();

    if let Some(node) = scene.node_mut(id) {
        node.viewer_object = Some(handle);
    }
}

/// Vereniging van de kinderen, of de opgegeven `bboxSize` als die gezet is.
pub(super) fn bounds(scene: &mut Scene, id: NodeId, kind: NodeKind, path: &mut Vec<NodeId>) -> BSphere {
    let bbox_size = scene
        .field(id, "bboxSize")
        .and_then(FieldValue::as_vec3f)
        .filter(|size| size.iter().all(|component| *component >= 0.0));
    let mut sphere = match bbox_size {
        Some(size) => {
            let center = scene
                .field(id, "bboxCenter")
                .and_then(FieldValue::as_vec3f)
                .unwrap_or([0.0; 3]);
            BSphere::new(Vec3::from_f32(center), Vec3::from_f32(size).length() * 0.5)
        }
        None => {
            let mut sphere = BSphere::empty();
            for child in children(scene, id).iter() {
                sphere.extend(&scene.compute_bounds(child, path));
            }
            sphere
        }
    };

    if kind == NodeKind::Transform {
        if let Some(matrix) = transform_matrix(scene, id) {
            sphere = sphere.transform(matrix);
        }
    }
    sphere
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::graph::value::FieldValue;
    use crate::scene::Scene;

    #[test]
    fn add_and_remove_children() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let first = scene.create_node_by_name("Group", &scope).unwrap();
        let second = scene.create_node_by_name("Group", &scope).unwrap();

        let both = FieldValue::MFNode(vec![first, second].into());
        scene.event_in(group, "addChildren", &both, 1.0).unwrap();
        scene.event_in(group, "addChildren", &FieldValue::MFNode(vec![first].into()), 1.0).unwrap();
        assert_eq!(scene.get_field(group, "children").unwrap(), both);
        assert_eq!(scene.node(first).unwrap().ref_count(), 1);

        scene
            .event_in(group, "removeChildren", &FieldValue::MFNode(vec![first].into()), 2.0)
            .unwrap();
        assert_eq!(
            scene.get_field(group, "children").unwrap(),
            FieldValue::MFNode(vec![second].into())
        );
        assert!(scene.node(first).is_none());
    }

    #[test]
    fn transform_matrix_applies_translation_and_scale() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let transform = scene.create_node_by_name("Transform", &scope).unwrap();
        scene
            .set_field(transform, "translation", FieldValue::SFVec3f([1.0, 2.0, 3.0]))
            .unwrap();
        scene
            .set_field(transform, "scale", FieldValue::SFVec3f([2.0, 2.0, 2.0]))
            .unwrap();
        let matrix = super::transform_matrix(&scene, transform).unwrap();
        let point = matrix.apply_point(crate::math::Vec3::new(1.0, 0.0, 0.0));
        assert!((point.x - 3.0).abs() < 1e-9);
        assert!((point.y - 2.0).abs() < 1e-9);
        assert!((point.z - 3.0).abs() < 1e-9);
    }
}
