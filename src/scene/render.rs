//! Frames renderen, dirty-vlaggen doorgeven en omhullende volumes.

use std::collections::HashSet;

use super::bindable::BindableKind;
use super::Scene;
use crate::graph::node::NodeId;
use crate::math::{BSphere, Mat4};
use crate::nodes::{bindable, grouping, lights};
use crate::viewer::{BackgroundParams, Viewer};

/// Geef de gewijzigd-vlag door aan de voorouders.
pub const MODIFIED: u8 = 1;
/// Geef de dirty-vlag van het omhullende volume door aan de voorouders.
pub const BVOLUME: u8 = 2;

impl Scene {
    /// Stuurt één frame naar `viewer`: eerst het zicht, de gebonden
    /// omgevingsnodes en de scoped lights, dan de wereld.
    ///
    /// Ongewijzigde groeperende nodes worden opnieuw uitgezonden als
    /// verwijzing naar het viewer-object uit een eerder frame.
    pub fn render(&mut self, viewer: &mut dyn Viewer) {
        for object in std::mem::take(&mut self.orphaned_objects) {
            viewer.remove_object(object);
        }
        if self.new_view {
            viewer.reset_user_navigation();
            self.new_view = false;
        }

        let navigation = self.bindable_top(BindableKind::NavigationInfo);
        let view = bindable::view_settings(self, navigation, self.bindable_top(BindableKind::Viewpoint));
        if view.headlight {
            viewer.insert_dir_light(0.3, 1.0, [1.0, 1.0, 1.0], [0.0, 0.0, -1.0]);
        }
        viewer.set_viewpoint(
            view.position,
            view.orientation,
            view.field_of_view,
            view.avatar_size,
            view.visibility_limit,
        );

        match self.bindable_top(BindableKind::Background) {
            Some(background) => bindable::render_background(self, background, viewer),
            None => {
                viewer.insert_background(&BackgroundParams::default());
            }
        }
        if let Some(fog) = self.bindable_top(BindableKind::Fog) {
            bindable::render_fog(self, fog, viewer);
        }

        if self.flags_need_updating {
            self.update_flags();
        }
        self.update_modified(MODIFIED);

        viewer.begin_object(None);
        if let Some(viewpoint) = self.bindable_top(BindableKind::Viewpoint) {
            if let Some(inverse) = self.accumulated_transform(viewpoint).affine_inverse() {
                viewer.transform(&inverse);
            }
        }
        for light in self.scoped_lights.clone() {
            lights::render_scoped(self, light, viewer);
        }
        for root in self.roots.clone() {
            self.render_node(root, viewer);
        }
        viewer.end_object();

        self.modified = false;
        if !self.queue.is_empty() {
            self.delta = 0.0;
        }
    }

    /// Rendert één node. Een PROTO-instantie rendert haar eerste
    /// implementatienode. Cycli worden bij de eerste herhaalde node afgebroken.
    pub fn render_node(&mut self, id: NodeId, viewer: &mut dyn Viewer) {
        let Some(node) = self.node(id) else {
            return;
        };
        if node.is_visited() {
            log::debug!("cyclische verwijzing naar {} overgeslagen", node.identity());
            return;
        }
        let class = node.node_type().class();
        let primary = node
            .proto_instance()
            .and_then(|instance| instance.implementation.first().copied());

        if let Some(node) = self.node_mut(id) {
            node.set_visited(true);
        }
        match (class, primary) {
            (Some(class), _) => class.render(self, id, viewer),
            (None, Some(primary)) => self.render_node(primary, viewer),
            (None, None) => {}
        }
        if let Some(node) = self.node_mut(id) {
            node.set_visited(false);
            node.set_modified_flag(false);
        }
    }

    /// Geeft de gekozen vlaggen van elke gemarkeerde node door aan al zijn
    /// voorouders.
    pub fn update_modified(&mut self, flags: u8) {
        let mut path = Vec::new();
        for root in self.roots.clone() {
            self.propagate_flags(root, flags, &mut path);
        }
    }

    fn propagate_flags(&mut self, id: NodeId, flags: u8, path: &mut Vec<NodeId>) {
        if path.contains(&id) {
            return;
        }
        let Some(node) = self.node(id) else {
            return;
        };
        let modified = flags & MODIFIED != 0 && node.is_modified();
        let dirty = flags & BVOLUME != 0 && node.bvolume_dirty_flag();
        let children = self.children_of(id);

        if modified || dirty {
            for ancestor in path.iter() {
                if let Some(ancestor) = self.arena.get_mut(*ancestor) {
                    if modified {
                        ancestor.set_modified_flag(true);
                    }
                    if dirty {
                        ancestor.set_bvolume_dirty_flag(true);
                    }
                }
            }
        }

        path.push(id);
        for child in children {
            self.propagate_flags(child, flags, path);
        }
        path.pop();
    }

    /// Duwt uitgestelde wijzigingen van omhullende volumes naar de voorouders.
    pub fn update_flags(&mut self) {
        self.update_modified(BVOLUME);
        self.flags_need_updating = false;
    }

    /// Kinderen uit velden plus, bij een PROTO-instantie, haar implementatiewortels.
    pub(crate) fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let mut children = node.node_refs();
        if let Some(instance) = node.proto_instance() {
            children.extend(instance.implementation.iter().copied());
        }
        children
    }

    /// Omhullende bol van een node in de coördinaten van zijn ouder, opnieuw
    /// berekend als hij dirty is.
    pub fn bounding_sphere(&mut self, id: NodeId) -> BSphere {
        if self.flags_need_updating {
            self.update_flags();
        }
        self.compute_bounds(id, &mut Vec::new())
    }

    pub(crate) fn compute_bounds(&mut self, id: NodeId, path: &mut Vec<NodeId>) -> BSphere {
        if path.contains(&id) {
            return BSphere::empty();
        }
        let Some(node) = self.node(id) else {
            return BSphere::empty();
        };
        if !node.bvolume_dirty_flag() {
            return node.bsphere;
        }
        let class = node.node_type().class();
        let primary = node
            .proto_instance()
            .and_then(|instance| instance.implementation.first().copied());

        path.push(id);
        let sphere = match (class, primary) {
            (Some(class), _) => class.bounds(self, id, path),
            (None, Some(primary)) => self.compute_bounds(primary, path),
            (None, None) => BSphere::empty(),
        };
        path.pop();

        if let Some(node) = self.node_mut(id) {
            node.bsphere = sphere;
            node.set_bvolume_dirty_flag(false);
        }
        sphere
    }

    /// Voorouders van `target`, buitenste eerst, langs het eerste pad vanaf
    /// de wortels.
    #[must_use]
    pub fn path_to(&self, target: NodeId) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        self.roots
            .iter()
            .any(|root| self.search(*root, target, &mut path, &mut seen))
            .then_some(path)
    }

    fn search(
        &self,
        id: NodeId,
        target: NodeId,
        path: &mut Vec<NodeId>,
        seen: &mut HashSet<NodeId>,
    ) -> bool {
        if id == target {
            return true;
        }
        if !seen.insert(id) {
            return false;
        }
        path.push(id);
        if self
            .children_of(id)
            .into_iter()
            .any(|child| self.search(child, target, path, seen))
        {
            return true;
        }
        path.pop();
        false
    }

    /// Product van de Transform-matrices boven `id`.
    #[must_use]
    pub fn accumulated_transform(&self, id: NodeId) -> Mat4 {
        self.path_to(id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|ancestor| grouping::transform_matrix(self, ancestor))
            .fold(Mat4::identity(), Mat4::compose)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::graph::node::NodeId;
    use crate::graph::value::FieldValue;
    use crate::scene::Scene;
    use crate::viewer::{TraceViewer, ViewerCall};

    fn world() -> (Scene, NodeId, NodeId, NodeId) {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let transform = scene.create_node_by_name("Transform", &scope).unwrap();
        let shape = scene.create_node_by_name("Shape", &scope).unwrap();
        let geometry = scene.create_node_by_name("Box", &scope).unwrap();
        scene
            .set_field(shape, "geometry", FieldValue::SFNode(Some(geometry)))
            .unwrap();
        scene
            .set_field(transform, "children", FieldValue::MFNode(vec![shape].into()))
            .unwrap();
        scene
            .set_field(group, "children", FieldValue::MFNode(vec![transform].into()))
            .unwrap();
        scene.add_root(group).unwrap();
        (scene, group, transform, geometry)
    }

    #[test]
    fn bounds_change_reaches_ancestors() {
        let (mut scene, group, transform, geometry) = world();
        let before = scene.bounding_sphere(group);
        assert!((before.radius - 3f64.sqrt()).abs() < 1e-6);
        assert!(!scene.is_bvolume_dirty(group));

        scene
            .set_field(geometry, "size", FieldValue::SFVec3f([4.0, 4.0, 4.0]))
            .unwrap();
        assert!(scene.is_bvolume_dirty(transform));
        assert!(scene.is_bvolume_dirty(group));
        let after = scene.bounding_sphere(group);
        assert!((after.radius - 2.0 * 3f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn transform_moves_bounds() {
        let (mut scene, group, transform, _) = world();
        scene
            .set_field(transform, "translation", FieldValue::SFVec3f([10.0, 0.0, 0.0]))
            .unwrap();
        let sphere = scene.bounding_sphere(group);
        assert!((sphere.center.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn unchanged_groups_are_emitted_by_reference() {
        let (mut scene, _, transform, _) = world();
        let mut viewer = TraceViewer::new();
        scene.render(&mut viewer);
        let first = viewer.take_calls();
        assert!(first.iter().any(|call| matches!(call, ViewerCall::InsertBox { .. })));

        scene.render(&mut viewer);
        let second = viewer.take_calls();
        assert!(!second.iter().any(|call| matches!(call, ViewerCall::InsertBox { .. })));
        assert!(second.iter().any(|call| matches!(call, ViewerCall::InsertReference { .. })));

        scene
            .set_field(transform, "translation", FieldValue::SFVec3f([1.0, 0.0, 0.0]))
            .unwrap();
        scene.render(&mut viewer);
        let third = viewer.take_calls();
        assert!(third.iter().any(|call| matches!(call, ViewerCall::RemoveObject { .. })));
        assert!(third.iter().any(|call| matches!(call, ViewerCall::Transform { .. })));
    }

    #[test]
    fn frame_starts_with_headlight_and_default_view() {
        let (mut scene, ..) = world();
        let mut viewer = TraceViewer::new();
        scene.render(&mut viewer);
        let calls = viewer.calls();
        assert!(matches!(calls[0], ViewerCall::ResetUserNavigation));
        assert!(matches!(calls[1], ViewerCall::InsertDirLight { .. }));
        assert!(matches!(
            calls[2],
            ViewerCall::SetViewpoint { position: [0.0, 0.0, 10.0], .. }
        ));
        assert!(!scene.is_modified());
    }
}
