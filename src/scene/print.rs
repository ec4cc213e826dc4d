//! VRML97-tekstuitvoer van de nodegraaf.

use std::collections::HashSet;
use std::fmt::{self, Write};

use super::Scene;
use crate::graph::node::NodeId;
use crate::graph::value::FieldValue;

const INDENT: usize = 2;

impl Scene {
    /// De huidige wereld als VRML97-tekst. Alleen velden die van hun
    /// gedeclareerde standaardwaarde afwijken worden geschreven.
    #[must_use]
    pub fn print_world(&self) -> String {
        let mut out = String::from("#VRML V2.0 utf8\n");
        let mut named = HashSet::new();
        for root in &self.roots {
            if self.write_node(&mut out, *root, 0, &mut named).is_ok() {
                out.push('\n');
            }
        }
        out
    }

    /// Eén node met zijn deelboom.
    #[must_use]
    pub fn print_node(&self, id: NodeId) -> String {
        let mut out = String::new();
        // Schrijven naar een String faalt niet.
        let _ = self.write_node(&mut out, id, 0, &mut HashSet::new());
        out
    }

    /// Schrijft `DEF name Type { ... }`; een benoemde node die al geschreven
    /// is wordt `USE name`.
    pub fn write_node<W: Write>(
        &self,
        out: &mut W,
        id: NodeId,
        indent: usize,
        named: &mut HashSet<NodeId>,
    ) -> fmt::Result {
        let Some(node) = self.node(id) else {
            return out.write_str("NULL");
        };
        if let Some(name) = node.name() {
            if !named.insert(id) {
                return write!(out, "USE {name}");
            }
            write!(out, "DEF {name} ")?;
        }
        writeln!(out, "{} {{", node.type_name())?;

        let declarations = node.node_type().declarations();
        for declaration in declarations.fields() {
            let Some(value) = node.field(&declaration.name) else {
                continue;
            };
            let default = declaration
                .default
                .clone()
                .unwrap_or_else(|| declaration.field_type.default_value());
            if *value == default {
                continue;
            }
            write!(out, "{:width$}{} ", "", declaration.name, width = indent + INDENT)?;
            self.write_value(out, value, indent + INDENT, named)?;
            out.write_char('\n')?;
        }
        write!(out, "{:indent$}}}", "")
    }

    fn write_value<W: Write>(
        &self,
        out: &mut W,
        value: &FieldValue,
        indent: usize,
        named: &mut HashSet<NodeId>,
    ) -> fmt::Result {
        match value {
            FieldValue::SFNode(Some(child)) => self.write_node(out, *child, indent, named),
            FieldValue::MFNode(children) => {
                out.write_str("[\n")?;
                for child in children.iter() {
                    write!(out, "{:width$}", "", width = indent + INDENT)?;
                    self.write_node(out, child, indent + INDENT, named)?;
                    out.write_char('\n')?;
                }
                write!(out, "{:indent$}]", "")
            }
            other => other.print(out, indent),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::graph::value::FieldValue;
    use crate::scene::Scene;

    #[test]
    fn prints_changed_fields_and_reuses_names() {
        let mut scene = Scene::default();
        let scope = Rc::clone(scene.scope());
        let group = scene.create_node_by_name("Group", &scope).unwrap();
        let transform = scene.create_node_by_name("Transform", &scope).unwrap();
        scene.set_node_name(transform, "Mover").unwrap();
        scene
            .set_field(transform, "translation", FieldValue::SFVec3f([1.0, 0.0, 0.0]))
            .unwrap();
        scene
            .set_field(group, "children", FieldValue::MFNode(vec![transform, transform].into()))
            .unwrap();
        scene.add_root(group).unwrap();

        let text = scene.print_world();
        assert!(text.starts_with("#VRML V2.0 utf8\n"));
        assert!(text.contains("DEF Mover Transform {"));
        assert!(text.contains("translation 1 0 0"));
        assert!(text.contains("USE Mover"));
        assert!(!text.contains("scale"));
    }
}
