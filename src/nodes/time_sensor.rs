//! `TimeSensor`: genereert tijd- en fractie-events terwijl hij actief is.

use crate::graph::node::{NodeId, NodeState};
use crate::graph::node_type::Declarations;
use crate::graph::value::{FieldType, FieldValue};
use crate::scene::{Scene, SceneResult};

/// Fracties binnen deze afstand van nul gelden als het einde van een cyclus.
const FRACTION_EPSILON: f64 = 1.0e-6;

/// Looptijdtoestand die niet in velden staat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerState {
    pub active: bool,
    /// Tijd van de vorige update; `-1` voor de eerste.
    pub last_time: f64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            active: false,
            last_time: -1.0,
        }
    }
}

pub(super) fn declare(declarations: &mut Declarations) {
    declarations.add_exposed_field(
        "cycleInterval",
        FieldType::SFTime,
        Some(FieldValue::SFTime(1.0)),
    );
    declarations.add_exposed_field("enabled", FieldType::SFBool, Some(FieldValue::SFBool(true)));
    declarations.add_exposed_field("loop", FieldType::SFBool, None);
    declarations.add_exposed_field("startTime", FieldType::SFTime, None);
    declarations.add_exposed_field("stopTime", FieldType::SFTime, None);
    declarations.add_event_out("cycleTime", FieldType::SFTime);
    declarations.add_event_out("fraction_changed", FieldType::SFFloat);
    declarations.add_event_out("isActive", FieldType::SFBool);
    declarations.add_event_out("time", FieldType::SFTime);
}

/// Timing-velden op één moment.
#[derive(Debug, Clone, Copy)]
struct Timing {
    enabled: bool,
    looping: bool,
    start: f64,
    stop: f64,
    cycle: f64,
}

impl Timing {
    fn read(scene: &Scene, id: NodeId) -> Self {
        let time = |name: &str| scene.field(id, name).and_then(FieldValue::as_time).unwrap_or(0.0);
        let flag = |name: &str, fallback: bool| {
            scene
                .field(id, name)
                .and_then(FieldValue::as_bool)
                .unwrap_or(fallback)
        };
        Self {
            enabled: flag("enabled", true),
            looping: flag("loop", false),
            start: time("startTime"),
            stop: time("stopTime"),
            cycle: scene
                .field(id, "cycleInterval")
                .and_then(FieldValue::as_time)
                .unwrap_or(1.0),
        }
    }

    /// Fractie van de lopende cyclus op tijdstip `at`. Het exacte einde van
    /// een cyclus geeft 1.
    fn fraction(self, at: f64) -> f32 {
        let remainder = if self.cycle > 0.0 && at > self.start {
            (at - self.start) % self.cycle
        } else {
            0.0
        };
        if remainder.abs() < FRACTION_EPSILON {
            1.0
        } else {
            (remainder / self.cycle) as f32
        }
    }
}

fn state(scene: &Scene, id: NodeId) -> Option<TimerState> {
    match scene.node(id)?.state {
        NodeState::Timer(state) => Some(state),
        _ => None,
    }
}

fn store_state(scene: &mut Scene, id: NodeId, state: TimerState) {
    if let Some(node) = scene.node_mut(id) {
        node.state = NodeState::Timer(state);
    }
}

/// Stap van een geregistreerde TimeSensor naar `now`.
///
/// Een inactieve sensor start zodra `startTime` bereikt is, tenzij een
/// geldige `stopTime` al voorbij is en hij niet herhaalt. Een actieve sensor
/// stuurt `fraction_changed` en `time`, en stopt bij `stopTime` of na één
/// cyclus zonder `loop`.
pub fn update(scene: &mut Scene, id: NodeId, now: f64) {
    let Some(mut state) = state(scene, id) else {
        return;
    };
    let timing = Timing::read(scene, id);
    if !timing.enabled {
        return;
    }
    if state.last_time > now {
        state.last_time = now;
    }

    if !state.active
        && timing.start <= now
        && timing.start >= state.last_time
        && (timing.stop < timing.start || timing.stop > now || timing.looping)
    {
        state.active = true;
        log::trace!("TimeSensor {id} actief op {now}");
        scene.event_out(id, "isActive", &FieldValue::SFBool(true), now);
        scene.event_out(id, "time", &FieldValue::SFTime(now), now);
        scene.event_out(id, "fraction_changed", &FieldValue::SFFloat(0.0), now);
        scene.event_out(id, "cycleTime", &FieldValue::SFTime(now), now);
    } else if state.active {
        let cycle_end = (!timing.looping).then_some(timing.start + timing.cycle);
        let stop_end = (timing.stop > timing.start).then_some(timing.stop);
        let end = match (cycle_end, stop_end) {
            (Some(cycle_end), Some(stop_end)) => Some(cycle_end.min(stop_end)),
            (end, None) | (None, end) => end,
        };

        let (at, deactivate) = match end {
            Some(end) if end <= now => (end, true),
            _ => (now, false),
        };
        if deactivate {
            state.active = false;
        }

        let fraction = timing.fraction(at);
        scene.event_out(id, "fraction_changed", &FieldValue::SFFloat(fraction), at);
        scene.event_out(id, "time", &FieldValue::SFTime(at), at);
        if (fraction - 1.0).abs() < f32::EPSILON {
            scene.event_out(id, "cycleTime", &FieldValue::SFTime(at), at);
        }
        if deactivate {
            log::trace!("TimeSensor {id} inactief op {at}");
            scene.event_out(id, "isActive", &FieldValue::SFBool(false), at);
        }
    }

    if state.active {
        scene.set_delta(0.0);
    }
    state.last_time = now;
    store_state(scene, id, state);
}

/// `cycleInterval` en `startTime` worden genegeerd zolang de sensor actief
/// is; `enabled FALSE` zet een actieve sensor stil. Een TimeSensor vraagt
/// nooit om een nieuwe render.
pub(super) fn process_event(
    scene: &mut Scene,
    id: NodeId,
    name: &str,
    value: &FieldValue,
    timestamp: f64,
) -> SceneResult<bool> {
    let base = name.strip_prefix("set_").unwrap_or(name);
    let mut state = state(scene, id).unwrap_or_default();

    match base {
        "cycleInterval" | "startTime" => {
            if state.active {
                log::debug!("TimeSensor {id}: {base} genegeerd terwijl actief");
                return Ok(true);
            }
            scene.set_field(id, base, value.clone())?;
            state.last_time = timestamp;
            store_state(scene, id, state);
            scene.event_out(id, &format!("{base}_changed"), value, timestamp);
        }
        "enabled" => {
            scene.set_field(id, base, value.clone())?;
            if state.active && value.as_bool() == Some(false) {
                state.active = false;
                store_state(scene, id, state);
                let fraction = Timing::read(scene, id).fraction(timestamp);
                scene.event_out(id, "time", &FieldValue::SFTime(timestamp), timestamp);
                scene.event_out(id, "fraction_changed", &FieldValue::SFFloat(fraction), timestamp);
                scene.event_out(id, "isActive", &FieldValue::SFBool(false), timestamp);
            }
            scene.event_out(id, "enabled_changed", value, timestamp);
        }
        _ => scene.base_event_in(id, name, value, timestamp)?,
    }

    scene.clear_modified(id);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    fn timer(scene: &mut Scene) -> NodeId {
        let scope = Rc::clone(scene.scope());
        scene.create_node_by_name("TimeSensor", &scope).unwrap()
    }

    fn fraction(scene: &Scene, id: NodeId) -> f32 {
        scene
            .field(id, "fraction_changed")
            .and_then(FieldValue::as_float)
            .unwrap()
    }

    #[test]
    fn looping_sensor_reports_cycle_fraction() {
        let mut scene = Scene::default();
        let id = timer(&mut scene);
        scene.set_field(id, "loop", FieldValue::SFBool(true)).unwrap();
        scene.set_field(id, "cycleInterval", FieldValue::SFTime(2.0)).unwrap();

        update(&mut scene, id, 1.0e-6);
        assert_eq!(scene.field(id, "isActive"), Some(&FieldValue::SFBool(true)));
        assert!(fraction(&scene, id).abs() < 1e-6);
        assert!(scene.delta().abs() < f64::EPSILON);

        update(&mut scene, id, 3.0);
        assert!((fraction(&scene, id) - 0.5).abs() < 1e-6);
        update(&mut scene, id, 4.0);
        assert!((fraction(&scene, id) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn single_cycle_ends_with_full_fraction() {
        let mut scene = Scene::default();
        let id = timer(&mut scene);
        scene.set_field(id, "startTime", FieldValue::SFTime(1.0)).unwrap();

        update(&mut scene, id, 0.5);
        assert_eq!(scene.field(id, "isActive"), Some(&FieldValue::SFBool(false)));
        update(&mut scene, id, 1.0);
        assert_eq!(scene.field(id, "isActive"), Some(&FieldValue::SFBool(true)));
        update(&mut scene, id, 3.0);
        assert_eq!(scene.field(id, "isActive"), Some(&FieldValue::SFBool(false)));
        assert!((fraction(&scene, id) - 1.0).abs() < 1e-6);
        assert_eq!(scene.field(id, "time"), Some(&FieldValue::SFTime(2.0)));
    }

    #[test]
    fn start_time_is_ignored_while_active() {
        let mut scene = Scene::default();
        let id = timer(&mut scene);
        scene.set_field(id, "loop", FieldValue::SFBool(true)).unwrap();
        update(&mut scene, id, 1.0e-6);

        scene
            .event_in(id, "set_startTime", &FieldValue::SFTime(50.0), 1.0)
            .unwrap();
        assert_eq!(scene.get_field(id, "startTime").unwrap(), FieldValue::SFTime(0.0));

        scene
            .event_in(id, "set_enabled", &FieldValue::SFBool(false), 1.5)
            .unwrap();
        assert_eq!(scene.field(id, "isActive"), Some(&FieldValue::SFBool(false)));
        assert!(!scene.is_node_modified(id));
    }
}
