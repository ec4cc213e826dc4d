//! Parsers die brontekst omzetten in nodes van een [`Scene`].

use std::rc::Rc;

use crate::graph::node::NodeId;
use crate::graph::node_type::NodeTypeRef;
use crate::graph::scope::Scope;
use crate::scene::Scene;

pub mod x3d;

pub use x3d::{ParseError, ParseResult};

/// Bouwt nodes op uit een document. Geproduceerde roots hebben nog geen
/// eigenaar; de aanroeper houdt ze vast.
pub trait SceneParser {
    /// Leest een volledige wereld in `scope` en geeft de roots terug.
    fn parse(&self, scene: &mut Scene, source: &str, scope: &Rc<Scope>) -> ParseResult<Vec<NodeId>>;

    /// Leest alleen de PROTO-declaraties van een document, in
    /// documentvolgorde. Gebruikt voor EXTERNPROTO-bibliotheken.
    fn parse_prototypes(
        &self,
        scene: &mut Scene,
        source: &str,
        scope: &Rc<Scope>,
    ) -> ParseResult<Vec<NodeTypeRef>>;
}
