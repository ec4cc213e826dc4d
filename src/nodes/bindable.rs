//! Bindable nodes: `Viewpoint`, `NavigationInfo`, `Background` en `Fog`.
//!
//! Van elk soort is er hoogstens één tegelijk actief, de top van zijn
//! stapel in [`crate::scene::bindable`].

use super::{NodeClass, Registration};
use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue};
use crate::scene::bindable::BindableKind;
use crate::scene::{Scene, SceneResult};
use crate::viewer::{BackgroundParams, Viewer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Viewpoint,
    NavigationInfo,
    Background,
    Fog,
}

impl NodeKind {
    #[must_use]
    pub fn binding(self) -> BindableKind {
        match self {
            Self::Viewpoint => BindableKind::Viewpoint,
            Self::NavigationInfo => BindableKind::NavigationInfo,
            Self::Background => BindableKind::Background,
            Self::Fog => BindableKind::Fog,
        }
    }
}

pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "Viewpoint",
        class: NodeClass::Bindable(NodeKind::Viewpoint),
        declare: declare_viewpoint,
    },
    Registration {
        name: "NavigationInfo",
        class: NodeClass::Bindable(NodeKind::NavigationInfo),
        declare: declare_navigation_info,
    },
    Registration {
        name: "Background",
        class: NodeClass::Bindable(NodeKind::Background),
        declare: declare_background,
    },
    Registration {
        name: "Fog",
        class: NodeClass::Bindable(NodeKind::Fog),
        declare: declare_fog,
    },
];

fn declare_bind(declarations: &mut Declarations) {
    declarations.add_event_in("set_bind", FieldType::SFBool);
    declarations.add_event_out("isBound", FieldType::SFBool);
}

fn declare_viewpoint(declarations: &mut Declarations) {
    declare_bind(declarations);
    declarations.add_exposed_field(
        "fieldOfView",
        FieldType::SFFloat,
        Some(FieldValue::SFFloat(0.785_398)),
    );
    declarations.add_exposed_field("jump", FieldType::SFBool, Some(FieldValue::SFBool(true)));
    declarations.add_exposed_field(
        "orientation",
        FieldType::SFRotation,
        Some(FieldValue::SFRotation([0.0, 0.0, 1.0, 0.0])),
    );
    declarations.add_exposed_field(
        "position",
        FieldType::SFVec3f,
        Some(FieldValue::SFVec3f([0.0, 0.0, 10.0])),
    );
    declarations.add_field("description", FieldType::SFString, None);
    declarations.add_event_out("bindTime", FieldType::SFTime);
}

fn declare_navigation_info(declarations: &mut Declarations) {
    declare_bind(declarations);
    declarations.add_exposed_field(
        "avatarSize",
        FieldType::MFFloat,
        Some(FieldValue::MFFloat(vec![0.25, 1.6, 0.75])),
    );
    declarations.add_exposed_field("headlight", FieldType::SFBool, Some(FieldValue::SFBool(true)));
    declarations.add_exposed_field("speed", FieldType::SFFloat, Some(FieldValue::SFFloat(1.0)));
    declarations.add_exposed_field(
        "type",
        FieldType::MFString,
        Some(FieldValue::MFString(vec!["WALK".to_owned(), "ANY".to_owned()])),
    );
    declarations.add_exposed_field("visibilityLimit", FieldType::SFFloat, None);
}

fn declare_background(declarations: &mut Declarations) {
    declare_bind(declarations);
    declarations.add_exposed_field("groundAngle", FieldType::MFFloat, None);
    declarations.add_exposed_field("groundColor", FieldType::MFColor, None);
    declarations.add_exposed_field("skyAngle", FieldType::MFFloat, None);
    declarations.add_exposed_field(
        "skyColor",
        FieldType::MFColor,
        Some(FieldValue::MFColor(vec![[0.0, 0.0, 0.0]])),
    );
}

fn declare_fog(declarations: &mut Declarations) {
    declare_bind(declarations);
    declarations.add_exposed_field(
        "color",
        FieldType::SFColor,
        Some(FieldValue::SFColor([1.0, 1.0, 1.0])),
    );
    declarations.add_exposed_field(
        "fogType",
        FieldType::SFString,
        Some(FieldValue::SFString("LINEAR".to_owned())),
    );
    declarations.add_exposed_field("visibilityRange", FieldType::SFFloat, None);
}

/// `set_bind` verplaatst de node op zijn stapel; de rest volgt de
/// gewone exposedField-regels.
pub(super) fn process_event(
    scene: &mut Scene,
    id: NodeId,
    name: &str,
    value: &FieldValue,
    timestamp: f64,
) -> SceneResult<bool> {
    if name != "set_bind" {
        return Ok(false);
    }
    let Some(bind) = value.as_bool() else {
        return Err(scene.type_mismatch(id, name, FieldType::SFBool, value.field_type()));
    };
    scene.set_bind(id, bind, timestamp);
    Ok(true)
}

/// Camera en navigatie van een frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    pub headlight: bool,
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub field_of_view: f32,
    pub avatar_size: f32,
    pub visibility_limit: f32,
}

/// Waarden van de gebonden nodes, aangevuld met de standaarden uit de
/// configuratie waar niets gebonden is.
#[must_use]
pub fn view_settings(
    scene: &Scene,
    navigation: Option<NodeId>,
    viewpoint: Option<NodeId>,
) -> ViewSettings {
    let config = scene.config();
    let defaults = &config.default_viewpoint;
    let mut view = ViewSettings {
        headlight: config.headlight,
        position: defaults.position,
        orientation: defaults.orientation,
        field_of_view: defaults.field_of_view,
        avatar_size: defaults.avatar_size,
        visibility_limit: defaults.visibility_limit,
    };

    if let Some(navigation) = navigation {
        if let Some(headlight) = scene.field(navigation, "headlight").and_then(FieldValue::as_bool) {
            view.headlight = headlight;
        }
        if let Some(size) = scene
            .field(navigation, "avatarSize")
            .and_then(FieldValue::as_mf_float)
            .and_then(|sizes| sizes.first().copied())
        {
            view.avatar_size = size;
        }
        if let Some(limit) = scene
            .field(navigation, "visibilityLimit")
            .and_then(FieldValue::as_float)
        {
            view.visibility_limit = limit;
        }
    }

    if let Some(viewpoint) = viewpoint {
        if let Some(position) = scene.field(viewpoint, "position").and_then(FieldValue::as_vec3f) {
            view.position = position;
        }
        if let Some(orientation) = scene
            .field(viewpoint, "orientation")
            .and_then(FieldValue::as_rotation)
        {
            view.orientation = orientation;
        }
        if let Some(fov) = scene.field(viewpoint, "fieldOfView").and_then(FieldValue::as_float) {
            view.field_of_view = fov;
        }
    }
    view
}

pub fn render_background(scene: &mut Scene, id: NodeId, viewer: &mut dyn Viewer) {
    let floats = |name: &str| {
        scene
            .field(id, name)
            .and_then(FieldValue::as_mf_float)
            .map(<[f32]>::to_vec)
            .unwrap_or_default()
    };
    let colors = |name: &str| {
        scene
            .field(id, name)
            .and_then(FieldValue::as_mf_color)
            .map(<[[f32; 3]]>::to_vec)
            .unwrap_or_default()
    };
    let background = BackgroundParams {
        ground_angle: floats("groundAngle"),
        ground_color: colors("groundColor"),
        sky_angle: floats("skyAngle"),
        sky_color: colors("skyColor"),
    };
    viewer.insert_background(&background);
    scene.clear_modified(id);
}

pub fn render_fog(scene: &mut Scene, id: NodeId, viewer: &mut dyn Viewer) {
    let color = scene
        .field(id, "color")
        .and_then(FieldValue::as_color)
        .unwrap_or([1.0; 3]);
    let range = scene
        .field(id, "visibilityRange")
        .and_then(FieldValue::as_float)
        .unwrap_or(0.0);
    let fog_type = scene
        .field(id, "fogType")
        .and_then(FieldValue::as_string)
        .unwrap_or("LINEAR")
        .to_owned();
    viewer.set_fog(color, range, &fog_type);
    scene.clear_modified(id);
}
