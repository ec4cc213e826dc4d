use std::rc::Rc;

use vrml_runtime::Engine;
use vrml_runtime::config::SceneConfig;
use vrml_runtime::graph::value::FieldValue;
use vrml_runtime::resource::{Fetcher, MemoryFetcher};
use vrml_runtime::scene::Scene;
use vrml_runtime::scene::bindable::BindableKind;
use vrml_runtime::viewer::{TraceViewer, ViewerCall};

const ANIMATION: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/animation.x3d"));

fn animated_scene() -> Scene {
    let mut scene = Scene::default();
    scene.load_str(ANIMATION, Some("animation.x3d")).expect("load animation");
    scene
}

fn translation(scene: &Scene, def: &str) -> [f32; 3] {
    let id = scene.find_node(def).expect("DEF exists");
    scene
        .get_field(id, "translation")
        .expect("translation")
        .as_vec3f()
        .expect("SFVec3f")
}

#[test]
fn time_sensor_drives_interpolator_into_transform() {
    let mut scene = animated_scene();
    scene.update(1e-6);
    assert!(translation(&scene, "Mover")[0].abs() < 1e-4);

    for (time, expected) in [(0.5, 1.0), (1.25, 2.5), (2.5, 5.0), (3.75, 7.5), (5.1, 0.2)] {
        assert!(scene.update(time), "update at {time} should request a redraw");
        let [x, y, z] = translation(&scene, "Mover");
        assert!((x - expected).abs() < 1e-4, "t={time}: x={x}, expected {expected}");
        assert!(y.abs() < 1e-6 && z.abs() < 1e-6);
    }
    assert_eq!(scene.delta(), 0.0, "an active TimeSensor keeps the loop running");
}

#[test]
fn first_bindables_are_bound_on_load() {
    let mut scene = animated_scene();
    let front = scene.find_node("Front").unwrap();
    let top = scene.find_node("Top").unwrap();
    assert_eq!(scene.bindable_top(BindableKind::Viewpoint), Some(front));
    assert_eq!(scene.bindable_top(BindableKind::NavigationInfo), scene.find_node("Nav"));
    assert_eq!(scene.bindable_top(BindableKind::Background), None);

    let mut viewer = TraceViewer::new();
    scene.render(&mut viewer);
    let calls = viewer.take_calls();
    assert!(
        !calls.iter().any(|call| matches!(call, ViewerCall::InsertDirLight { .. })),
        "headlight is switched off by NavigationInfo"
    );
    assert!(calls.iter().any(|call| matches!(
        call,
        ViewerCall::SetViewpoint { position, avatar_size, .. }
            if *position == [0.0, 0.0, 12.0] && (*avatar_size - 0.5).abs() < 1e-6
    )));

    scene
        .event_in(top, "set_bind", &FieldValue::SFBool(true), 2.0)
        .unwrap();
    assert_eq!(scene.bindable_stack(BindableKind::Viewpoint), [front, top]);
    assert_eq!(scene.get_field(front, "isBound").unwrap(), FieldValue::SFBool(false));
    assert_eq!(scene.get_field(top, "isBound").unwrap(), FieldValue::SFBool(true));

    scene.render(&mut viewer);
    assert!(viewer.take_calls().iter().any(|call| matches!(
        call,
        ViewerCall::SetViewpoint { position, .. } if *position == [0.0, 12.0, 0.0]
    )));
}

#[test]
fn replace_world_waits_for_the_end_of_update() {
    let mut scene = animated_scene();
    let mover = scene.find_node("Mover").unwrap();
    let scope = Rc::clone(scene.scope());
    let replacement = scene.create_node_by_name("Group", &scope).unwrap();

    scene.replace_world(vec![replacement]).unwrap();
    assert!(scene.node(mover).is_some(), "old world stays until update");
    assert!(scene.pending_request().is_some());

    scene.update(1.0);
    assert_eq!(scene.roots(), [replacement]);
    assert!(scene.node(mover).is_none());
    assert!(scene.pending_request().is_none());
}

#[test]
fn load_url_is_served_by_the_fetcher() {
    let documents = Rc::new(MemoryFetcher::new());
    documents.insert("mem:next.x3d", r#"<X3D><Scene><Group DEF="Next"/></Scene></X3D>"#);
    let mut scene = Scene::new(SceneConfig::default()).with_fetcher(Rc::clone(&documents) as Rc<dyn Fetcher>);
    scene.load_str(ANIMATION, None).unwrap();

    scene.load_url(vec!["mem:missing.x3d".to_owned(), "mem:next.x3d".to_owned()]);
    scene.update(1.0);
    assert!(scene.find_node("Next").is_some());
    assert!(scene.find_node("Mover").is_none());
    assert_eq!(scene.url(), Some("mem:next.x3d"));
}

#[test]
fn world_prints_as_vrml() {
    let mut scene = animated_scene();
    scene.update(1e-6);
    scene.update(2.5);
    let text = scene.print_world();
    assert!(text.starts_with("#VRML V2.0 utf8"));
    assert!(text.contains("DEF Mover Transform"));
    assert!(text.contains("translation 5 0 0"));
}

#[test]
fn engine_reads_and_writes_fields_as_text() {
    let mut engine = Engine::with_config(SceneConfig::default());
    engine.load_x3d(ANIMATION).unwrap();
    engine.set_field("Mover", "translation", "1 2 3").unwrap();
    assert_eq!(engine.get_field("Mover", "translation").unwrap(), "1 2 3");

    engine.set_field("Clock", "enabled", "FALSE").unwrap();
    engine.send_event("Path", "set_fraction", "0.5").unwrap();
    engine.update(1.0);
    assert_eq!(engine.get_field("Mover", "translation").unwrap(), "5 0 0");
    assert!(engine.get_field("Nobody", "translation").is_err());
}

#[test]
fn full_event_queue_keeps_the_newest_events() {
    let config = SceneConfig {
        max_events: 3,
        ..SceneConfig::default()
    };
    let mut scene = Scene::new(config);
    scene
        .load_str(
            r#"<Scene>
                 <TimeSensor DEF="Clock" enabled="false"/>
                 <ScalarInterpolator DEF="Path"/>
                 <ROUTE fromNode="Clock" fromField="fraction_changed" toNode="Path" toField="set_fraction"/>
               </Scene>"#,
            None,
        )
        .unwrap();
    let clock = scene.find_node("Clock").unwrap();
    let path = scene.find_node("Path").unwrap();
    assert!(scene.queue().is_empty());

    for step in 0..5u8 {
        let fraction = f32::from(step) / 10.0;
        assert_eq!(scene.event_out(clock, "fraction_changed", &FieldValue::SFFloat(fraction), 1.0), 1);
    }

    let queued: Vec<_> = scene.queue().iter().map(|event| (event.to_node, event.value.clone())).collect();
    assert_eq!(
        queued,
        [
            (path, FieldValue::SFFloat(0.2)),
            (path, FieldValue::SFFloat(0.3)),
            (path, FieldValue::SFFloat(0.4)),
        ]
    );
    assert_eq!(scene.queue().dropped(), 2);

    scene.update(1.0);
    assert!(scene.queue().is_empty());
}
