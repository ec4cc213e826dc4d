//! Lineaire interpolatoren: `set_fraction` in, `value_changed` uit.

use super::{NodeClass, Registration};
use crate::graph::node::NodeId;
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue};
use crate::math::{hsv_to_rgb, rgb_to_hsv, Vec3};
use crate::scene::{Scene, SceneResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Scalar,
    Position,
    Color,
    Orientation,
}

pub const REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "ScalarInterpolator",
        class: NodeClass::Interpolator(NodeKind::Scalar),
        declare: declare_scalar,
    },
    Registration {
        name: "PositionInterpolator",
        class: NodeClass::Interpolator(NodeKind::Position),
        declare: declare_position,
    },
    Registration {
        name: "ColorInterpolator",
        class: NodeClass::Interpolator(NodeKind::Color),
        declare: declare_color,
    },
    Registration {
        name: "OrientationInterpolator",
        class: NodeClass::Interpolator(NodeKind::Orientation),
        declare: declare_orientation,
    },
];

fn declare_scalar(declarations: &mut Declarations) {
    declare(declarations, FieldType::MFFloat, FieldType::SFFloat);
}

fn declare_position(declarations: &mut Declarations) {
    declare(declarations, FieldType::MFVec3f, FieldType::SFVec3f);
}

fn declare_color(declarations: &mut Declarations) {
    declare(declarations, FieldType::MFColor, FieldType::SFColor);
}

fn declare_orientation(declarations: &mut Declarations) {
    declare(declarations, FieldType::MFRotation, FieldType::SFRotation);
}

fn declare(declarations: &mut Declarations, key_value: FieldType, value: FieldType) {
    declarations.add_event_in("set_fraction", FieldType::SFFloat);
    declarations.add_exposed_field("key", FieldType::MFFloat, None);
    declarations.add_exposed_field("keyValue", key_value, None);
    declarations.add_event_out("value_changed", value);
}

/// Waar `fraction` tussen de keys valt: de indices van de omliggende
/// keyValues en de relatieve positie ertussen. Buiten het bereik wordt de
/// eerste of laatste waarde vastgehouden.
fn segment(keys: &[f32], fraction: f32) -> Option<(usize, usize, f32)> {
    let last = keys.len().checked_sub(1)?;
    if fraction <= keys[0] {
        return Some((0, 0, 0.0));
    }
    if fraction >= keys[last] {
        return Some((last, last, 0.0));
    }
    let upper = keys.iter().position(|key| *key > fraction)?;
    let lower = upper - 1;
    let span = keys[upper] - keys[lower];
    let t = if span > 0.0 {
        (fraction - keys[lower]) / span
    } else {
        0.0
    };
    Some((lower, upper, t))
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [lerp(a[0], b[0], t), lerp(a[1], b[1], t), lerp(a[2], b[2], t)]
}

/// Interpoleert in HSV, met de tint langs de kortste kant van de cirkel.
fn lerp_color(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    let mut from = rgb_to_hsv(a);
    let mut to = rgb_to_hsv(b);
    if (to[0] - from[0]).abs() > 180.0 {
        if to[0] > from[0] {
            from[0] += 360.0;
        } else {
            to[0] += 360.0;
        }
    }
    let mut hsv = lerp3(from, to, t);
    if hsv[0] >= 360.0 {
        hsv[0] -= 360.0;
    } else if hsv[0] < 0.0 {
        hsv[0] += 360.0;
    }
    hsv_to_rgb(hsv)
}

/// As en hoek apart geïnterpoleerd. Wijzen de assen van elkaar af, dan
/// wordt de tweede rotatie eerst omgedraaid.
fn lerp_rotation(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    let from = Vec3::from_f32([a[0], a[1], a[2]]);
    let mut to = Vec3::from_f32([b[0], b[1], b[2]]);
    let mut to_angle = b[3];
    if from.dot(to) < 0.0 {
        to = Vec3::new(-to.x, -to.y, -to.z);
        to_angle = -to_angle;
    }
    let axis = from.lerp(to, f64::from(t));
    let axis = axis.normalized().unwrap_or(from).to_f32();
    [axis[0], axis[1], axis[2], lerp(a[3], to_angle, t)]
}

fn pick<T: Copy>(values: &[T], (lower, upper, t): (usize, usize, f32), mix: fn(T, T, f32) -> T) -> Option<T> {
    let a = *values.get(lower)?;
    let b = *values.get(upper)?;
    Some(if lower == upper { a } else { mix(a, b, t) })
}

impl NodeKind {
    fn interpolate(self, key_value: &FieldValue, span: (usize, usize, f32)) -> Option<FieldValue> {
        match self {
            Self::Scalar => pick(key_value.as_mf_float()?, span, lerp).map(FieldValue::SFFloat),
            Self::Position => pick(key_value.as_mf_vec3f()?, span, lerp3).map(FieldValue::SFVec3f),
            Self::Color => pick(key_value.as_mf_color()?, span, lerp_color).map(FieldValue::SFColor),
            Self::Orientation => {
                pick(key_value.as_mf_rotation()?, span, lerp_rotation).map(FieldValue::SFRotation)
            }
        }
    }

    /// Verwerkt `set_fraction`. Andere eventIns volgen de gewone
    /// exposedField-regels.
    pub(super) fn process_event(
        self,
        scene: &mut Scene,
        id: NodeId,
        name: &str,
        value: &FieldValue,
        timestamp: f64,
    ) -> SceneResult<bool> {
        if name != "set_fraction" {
            return Ok(false);
        }
        let Some(fraction) = value.as_float() else {
            return Err(scene.type_mismatch(id, name, FieldType::SFFloat, value.field_type()));
        };

        let keys = scene
            .field(id, "key")
            .and_then(FieldValue::as_mf_float)
            .unwrap_or(&[]);
        let interpolated = segment(keys, fraction).and_then(|span| {
            let key_value = scene.field(id, "keyValue")?;
            self.interpolate(key_value, span)
        });

        match interpolated {
            Some(result) => {
                scene.event_out(id, "value_changed", &result, timestamp);
            }
            None => log::debug!("interpolator {id}: geen keyValue voor fractie {fraction}"),
        }
        scene.clear_modified(id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn interpolator(scene: &mut Scene, type_name: &str, key_value: FieldValue) -> NodeId {
        let scope = Rc::clone(scene.scope());
        let id = scene.create_node_by_name(type_name, &scope).unwrap();
        scene
            .set_field(id, "key", FieldValue::MFFloat(vec![0.0, 0.5, 1.0]))
            .unwrap();
        scene.set_field(id, "keyValue", key_value).unwrap();
        id
    }

    fn send(scene: &mut Scene, id: NodeId, fraction: f32) -> FieldValue {
        scene
            .event_in(id, "set_fraction", &FieldValue::SFFloat(fraction), 1.0)
            .unwrap();
        scene.field(id, "value_changed").cloned().unwrap()
    }

    #[test]
    fn scalar_interpolates_and_clamps() {
        let mut scene = Scene::default();
        let id = interpolator(
            &mut scene,
            "ScalarInterpolator",
            FieldValue::MFFloat(vec![0.0, 10.0, 30.0]),
        );
        assert_eq!(send(&mut scene, id, 0.25), FieldValue::SFFloat(5.0));
        assert_eq!(send(&mut scene, id, 0.75), FieldValue::SFFloat(20.0));
        assert_eq!(send(&mut scene, id, -1.0), FieldValue::SFFloat(0.0));
        assert_eq!(send(&mut scene, id, 2.0), FieldValue::SFFloat(30.0));
        assert!(!scene.is_node_modified(id));
    }

    #[test]
    fn position_interpolates_componentwise() {
        let mut scene = Scene::default();
        let id = interpolator(
            &mut scene,
            "PositionInterpolator",
            FieldValue::MFVec3f(vec![[0.0, 0.0, 0.0], [2.0, 4.0, 0.0], [2.0, 4.0, 8.0]]),
        );
        assert_eq!(send(&mut scene, id, 0.25), FieldValue::SFVec3f([1.0, 2.0, 0.0]));
        assert_eq!(send(&mut scene, id, 1.0), FieldValue::SFVec3f([2.0, 4.0, 8.0]));
    }

    #[test]
    fn color_takes_the_short_way_around_the_hue_circle() {
        // Rood (0°) naar magenta (300°) loopt via 330°, niet via groen.
        let blended = lerp_color([1.0, 0.0, 0.0], [1.0, 0.0, 1.0], 0.5);
        assert!((blended[0] - 1.0).abs() < 1e-5);
        assert!(blended[1].abs() < 1e-5);
        assert!((blended[2] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn orientation_flips_opposed_axes() {
        let half = lerp_rotation([0.0, 1.0, 0.0, 1.0], [0.0, -1.0, 0.0, 1.0], 0.5);
        assert!((half[1] - 1.0).abs() < 1e-6);
        assert!(half[3].abs() < 1e-6);
    }

    #[test]
    fn wrong_fraction_type_is_rejected() {
        let mut scene = Scene::default();
        let id = interpolator(&mut scene, "ScalarInterpolator", FieldValue::MFFloat(vec![1.0; 3]));
        assert!(scene
            .event_in(id, "set_fraction", &FieldValue::SFTime(0.5), 1.0)
            .is_err());
    }
}
