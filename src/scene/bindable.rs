//! Bindstapels voor Viewpoint, NavigationInfo, Background en Fog.

use std::collections::HashSet;

use super::Scene;
use crate::graph::node::NodeId;
use crate::graph::value::FieldValue;

/// De vier soorten bindbare nodes. Elke soort heeft een eigen stapel; de
/// bovenste node is de actieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindableKind {
    Viewpoint,
    NavigationInfo,
    Background,
    Fog,
}

impl BindableKind {
    pub const ALL: [Self; 4] = [
        Self::Viewpoint,
        Self::NavigationInfo,
        Self::Background,
        Self::Fog,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Viewpoint => 0,
            Self::NavigationInfo => 1,
            Self::Background => 2,
            Self::Fog => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindableStacks {
    stacks: [Vec<NodeId>; 4],
}

impl BindableStacks {
    #[must_use]
    pub fn stack(&self, kind: BindableKind) -> &[NodeId] {
        &self.stacks[kind.index()]
    }

    pub fn stack_mut(&mut self, kind: BindableKind) -> &mut Vec<NodeId> {
        &mut self.stacks[kind.index()]
    }

    /// Haalt een opgeruimde node van elke stapel.
    pub fn remove_everywhere(&mut self, id: NodeId) {
        for stack in &mut self.stacks {
            stack.retain(|entry| *entry != id);
        }
    }
}

impl Scene {
    #[must_use]
    pub fn bindable_stack(&self, kind: BindableKind) -> &[NodeId] {
        self.bindables.stack(kind)
    }

    /// De node die nu gebonden is voor een soort.
    #[must_use]
    pub fn bindable_top(&self, kind: BindableKind) -> Option<NodeId> {
        self.bindables.stack(kind).last().copied()
    }

    /// Zet `id` bovenop zijn stapel.
    pub fn bindable_push(&mut self, kind: BindableKind, id: NodeId) {
        let stack = self.bindables.stack_mut(kind);
        stack.retain(|entry| *entry != id);
        stack.push(id);
        if kind == BindableKind::Viewpoint {
            self.new_view = true;
        }
        self.modified = true;
    }

    pub fn bindable_remove(&mut self, kind: BindableKind, id: NodeId) -> bool {
        let stack = self.bindables.stack_mut(kind);
        let before = stack.len();
        stack.retain(|entry| *entry != id);
        let removed = before != stack.len();
        if removed {
            if kind == BindableKind::Viewpoint {
                self.new_view = true;
            }
            self.modified = true;
        }
        removed
    }

    /// Verwerkt `set_bind` op een bindbare node.
    ///
    /// Binden stuurt `isBound FALSE` naar de node die de top verliest, zet de
    /// node bovenaan en stuurt hem `isBound TRUE`. Ontbinden van de bovenste
    /// node haalt hem eraf met `isBound FALSE` en bindt de nieuwe top opnieuw.
    /// Een lager gelegen node wordt alleen verwijderd.
    pub fn set_bind(&mut self, id: NodeId, bind: bool, timestamp: f64) {
        let Some(kind) = self
            .node(id)
            .and_then(|node| node.node_type().class())
            .and_then(|class| class.bindable())
        else {
            return;
        };
        let top = self.bindable_top(kind);

        if bind {
            if top == Some(id) {
                return;
            }
            if let Some(previous) = top {
                self.send_is_bound(previous, false, timestamp);
            }
            self.bindable_push(kind, id);
            self.send_is_bound(id, true, timestamp);
            if self.node(id).is_some_and(|node| node.field("bindTime").is_some()) {
                self.event_out(id, "bindTime", &FieldValue::SFTime(timestamp), timestamp);
            }
        } else if top == Some(id) {
            self.bindable_remove(kind, id);
            self.send_is_bound(id, false, timestamp);
            if let Some(next) = self.bindable_top(kind) {
                self.send_is_bound(next, true, timestamp);
            }
        } else {
            self.bindable_remove(kind, id);
        }
    }

    fn send_is_bound(&mut self, id: NodeId, bound: bool, timestamp: f64) {
        self.event_out(id, "isBound", &FieldValue::SFBool(bound), timestamp);
    }

    /// Bindt de eerste node van elke bindbare soort, in documentvolgorde.
    pub fn bind_initial(&mut self) {
        let mut first: Vec<(BindableKind, NodeId)> = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            if let Some(kind) = node.node_type().class().and_then(|class| class.bindable()) {
                if first.iter().all(|(bound, _)| *bound != kind) {
                    first.push((kind, id));
                }
            }
            let mut children = node.node_refs();
            if let Some(instance) = node.proto_instance() {
                children.extend(instance.implementation.iter().copied());
            }
            stack.extend(children.into_iter().rev());
        }

        for (_, id) in first {
            self.set_bind(id, true, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::BindableKind;
    use crate::graph::node::NodeId;
    use crate::graph::value::FieldValue;
    use crate::scene::Scene;

    fn viewpoints(count: usize) -> (Scene, Vec<NodeId>) {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let ids = (0..count)
            .map(|_| scene.create_node_by_name("Viewpoint", &scope).unwrap())
            .collect();
        (scene, ids)
    }

    #[test]
    fn binding_moves_node_to_top() {
        let (mut scene, ids) = viewpoints(2);
        scene.set_bind(ids[0], true, 1.0);
        scene.set_bind(ids[1], true, 2.0);
        assert_eq!(scene.bindable_stack(BindableKind::Viewpoint), [ids[0], ids[1]]);

        scene.set_bind(ids[0], true, 3.0);
        assert_eq!(scene.bindable_stack(BindableKind::Viewpoint), [ids[1], ids[0]]);
        assert_eq!(scene.bindable_top(BindableKind::Viewpoint), Some(ids[0]));
    }

    #[test]
    fn unbinding_top_rebinds_next() {
        let (mut scene, ids) = viewpoints(2);
        scene.set_bind(ids[0], true, 1.0);
        scene.set_bind(ids[1], true, 2.0);
        scene.set_bind(ids[1], false, 3.0);

        assert_eq!(scene.bindable_top(BindableKind::Viewpoint), Some(ids[0]));
        assert_eq!(scene.field(ids[1], "isBound"), Some(&FieldValue::SFBool(false)));
        assert_eq!(scene.field(ids[0], "isBound"), Some(&FieldValue::SFBool(true)));
    }

    #[test]
    fn unbinding_below_top_is_silent() {
        let (mut scene, ids) = viewpoints(2);
        scene.set_bind(ids[0], true, 1.0);
        scene.set_bind(ids[1], true, 2.0);
        scene.set_bind(ids[0], false, 3.0);
        assert_eq!(scene.bindable_stack(BindableKind::Viewpoint), [ids[1]]);
        assert_eq!(scene.field(ids[1], "isBound"), Some(&FieldValue::SFBool(true)));
    }

    #[test]
    fn destroyed_nodes_leave_the_stack() {
        let (mut scene, ids) = viewpoints(1);
        scene.add_root(ids[0]).unwrap();
        scene.set_bind(ids[0], true, 1.0);
        scene.release(ids[0]);
        assert_eq!(scene.bindable_top(BindableKind::Viewpoint), None);
    }
}
