//! ROUTE-verbindingen tussen een eventOut en een eventIn.

use super::node::NodeId;

/// Een dataflow-verbinding `from_node.from_event_out TO to_node.to_event_in`.
/// Eventnamen staan in canonieke vorm (`set_x`, `x_changed`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub from_node: NodeId,
    pub from_event_out: String,
    pub to_node: NodeId,
    pub to_event_in: String,
}

impl Route {
    #[must_use]
    pub fn new<F, T, O, I>(from_node: F, from_event_out: O, to_node: T, to_event_in: I) -> Self
    where
        F: Into<NodeId>,
        T: Into<NodeId>,
        O: Into<String>,
        I: Into<String>,
    {
        Self {
            from_node: from_node.into(),
            from_event_out: from_event_out.into(),
            to_node: to_node.into(),
            to_event_in: to_event_in.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeId, Route};

    #[test]
    fn route_holds_all_endpoints() {
        let route = Route::new(1usize, "fraction_changed", NodeId::new(2), "set_fraction");
        assert_eq!(route.from_node, NodeId::new(1));
        assert_eq!(route.to_node, NodeId::new(2));
        assert_eq!(route.from_event_out, "fraction_changed");
        assert_eq!(route.to_event_in, "set_fraction");
    }
}
