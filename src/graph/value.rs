//! Veldwaarden voor elke VRML97-veldsoort.

use core::fmt;

use super::node::NodeId;

/// Absolute tolerantie bij het vergelijken van drijvendekommavelden.
pub const FP_TOLERANCE: f64 = 1.0e-7;

/// De veldsoorten van VRML97.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    SFBool,
    SFColor,
    SFFloat,
    SFImage,
    SFInt32,
    SFNode,
    SFRotation,
    SFString,
    SFTime,
    SFVec2f,
    SFVec3f,
    MFColor,
    MFFloat,
    MFInt32,
    MFNode,
    MFRotation,
    MFString,
    MFTime,
    MFVec2f,
    MFVec3f,
}

const FIELD_TYPE_NAMES: &[(FieldType, &str)] = &[
    (FieldType::SFBool, "SFBool"),
    (FieldType::SFColor, "SFColor"),
    (FieldType::SFFloat, "SFFloat"),
    (FieldType::SFImage, "SFImage"),
    (FieldType::SFInt32, "SFInt32"),
    (FieldType::SFNode, "SFNode"),
    (FieldType::SFRotation, "SFRotation"),
    (FieldType::SFString, "SFString"),
    (FieldType::SFTime, "SFTime"),
    (FieldType::SFVec2f, "SFVec2f"),
    (FieldType::SFVec3f, "SFVec3f"),
    (FieldType::MFColor, "MFColor"),
    (FieldType::MFFloat, "MFFloat"),
    (FieldType::MFInt32, "MFInt32"),
    (FieldType::MFNode, "MFNode"),
    (FieldType::MFRotation, "MFRotation"),
    (FieldType::MFString, "MFString"),
    (FieldType::MFTime, "MFTime"),
    (FieldType::MFVec2f, "MFVec2f"),
    (FieldType::MFVec3f, "MFVec3f"),
];

impl FieldType {
    #[must_use]
    pub fn name(self) -> &'static str {
        FIELD_TYPE_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("SFNode", |(_, name)| *name)
    }

    /// Zoekt een veldtype op met zijn VRML-naam, bijvoorbeeld `"SFVec3f"`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        FIELD_TYPE_NAMES
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(trimmed))
            .map(|(kind, _)| *kind)
    }

    #[must_use]
    pub fn is_node(self) -> bool {
        matches!(self, Self::SFNode | Self::MFNode)
    }

    #[must_use]
    pub fn is_multi(self) -> bool {
        self.name().starts_with("MF")
    }

    /// De impliciete standaardwaarde van dit type als een declaratie er geen
    /// opgeeft.
    #[must_use]
    pub fn default_value(self) -> FieldValue {
        match self {
            Self::SFBool => FieldValue::SFBool(false),
            Self::SFColor => FieldValue::SFColor([0.0; 3]),
            Self::SFFloat => FieldValue::SFFloat(0.0),
            Self::SFImage => FieldValue::SFImage(Image::default()),
            Self::SFInt32 => FieldValue::SFInt32(0),
            Self::SFNode => FieldValue::SFNode(None),
            Self::SFRotation => FieldValue::SFRotation([0.0, 0.0, 1.0, 0.0]),
            Self::SFString => FieldValue::SFString(String::new()),
            Self::SFTime => FieldValue::SFTime(0.0),
            Self::SFVec2f => FieldValue::SFVec2f([0.0; 2]),
            Self::SFVec3f => FieldValue::SFVec3f([0.0; 3]),
            Self::MFColor => FieldValue::MFColor(Vec::new()),
            Self::MFFloat => FieldValue::MFFloat(Vec::new()),
            Self::MFInt32 => FieldValue::MFInt32(Vec::new()),
            Self::MFNode => FieldValue::MFNode(NodeList::default()),
            Self::MFRotation => FieldValue::MFRotation(Vec::new()),
            Self::MFString => FieldValue::MFString(Vec::new()),
            Self::MFTime => FieldValue::MFTime(Vec::new()),
            Self::MFVec2f => FieldValue::MFVec2f(Vec::new()),
            Self::MFVec3f => FieldValue::MFVec3f(Vec::new()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geordende nodeverwijzingen van een `MFNode`-veld. Dezelfde node mag in
/// meerdere lijsten voorkomen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList(Vec<NodeId>);

impl NodeList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.0.get(index).copied()
    }

    /// Vervangt het element op `index` en geeft de vorige verwijzing terug.
    pub fn replace(&mut self, index: usize, node: NodeId) -> Option<NodeId> {
        self.0
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, node))
    }

    pub fn push(&mut self, node: NodeId) {
        self.0.push(node);
    }

    /// Verwijdert elk voorkomen van `node`; geeft terug hoeveel het er waren.
    pub fn remove_all(&mut self, node: NodeId) -> usize {
        let before = self.0.len();
        self.0.retain(|existing| *existing != node);
        before - self.0.len()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.0.contains(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }
}

impl From<Vec<NodeId>> for NodeList {
    fn from(value: Vec<NodeId>) -> Self {
        Self(value)
    }
}

impl FromIterator<NodeId> for NodeList {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ongecomprimeerde `SFImage`-pixels, `components` bytes per pixel, rijen van
/// onder naar boven.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Bouwt een afbeelding als de pixelbuffer bij de afmetingen past.
    #[must_use]
    pub fn new(width: u32, height: u32, components: u8, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|area| area.checked_mul(usize::from(components)));
        if components > 4 || expected != Some(pixels.len()) {
            return None;
        }
        Some(Self {
            width,
            height,
            components,
            pixels,
        })
    }
}

/// Een getypeerde veldwaarde. Een clone is een onafhankelijke diepe kopie;
/// nodeverwijzingen worden als handle gekopieerd.
#[derive(Debug, Clone)]
pub enum FieldValue {
    SFBool(bool),
    SFColor([f32; 3]),
    SFFloat(f32),
    SFImage(Image),
    SFInt32(i32),
    SFNode(Option<NodeId>),
    SFRotation([f32; 4]),
    SFString(String),
    SFTime(f64),
    SFVec2f([f32; 2]),
    SFVec3f([f32; 3]),
    MFColor(Vec<[f32; 3]>),
    MFFloat(Vec<f32>),
    MFInt32(Vec<i32>),
    MFNode(NodeList),
    MFRotation(Vec<[f32; 4]>),
    MFString(Vec<String>),
    MFTime(Vec<f64>),
    MFVec2f(Vec<[f32; 2]>),
    MFVec3f(Vec<[f32; 3]>),
}

impl FieldValue {
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::SFBool(_) => FieldType::SFBool,
            Self::SFColor(_) => FieldType::SFColor,
            Self::SFFloat(_) => FieldType::SFFloat,
            Self::SFImage(_) => FieldType::SFImage,
            Self::SFInt32(_) => FieldType::SFInt32,
            Self::SFNode(_) => FieldType::SFNode,
            Self::SFRotation(_) => FieldType::SFRotation,
            Self::SFString(_) => FieldType::SFString,
            Self::SFTime(_) => FieldType::SFTime,
            Self::SFVec2f(_) => FieldType::SFVec2f,
            Self::SFVec3f(_) => FieldType::SFVec3f,
            Self::MFColor(_) => FieldType::MFColor,
            Self::MFFloat(_) => FieldType::MFFloat,
            Self::MFInt32(_) => FieldType::MFInt32,
            Self::MFNode(_) => FieldType::MFNode,
            Self::MFRotation(_) => FieldType::MFRotation,
            Self::MFString(_) => FieldType::MFString,
            Self::MFTime(_) => FieldType::MFTime,
            Self::MFVec2f(_) => FieldType::MFVec2f,
            Self::MFVec3f(_) => FieldType::MFVec3f,
        }
    }

    /// Faalt met een typefout tenzij deze waarde van type `expected` is.
    pub fn ensure_type(&self, expected: FieldType) -> Result<(), ValueError> {
        let found = self.field_type();
        if found == expected {
            Ok(())
        } else {
            Err(ValueError::type_mismatch(expected, found))
        }
    }

    /// Elke node-handle in deze waarde, op volgorde.
    #[must_use]
    pub fn node_refs(&self) -> Vec<NodeId> {
        match self {
            Self::SFNode(Some(node)) => vec![*node],
            Self::MFNode(list) => list.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Aantal elementen bij MF-waarden, 1 bij SF-waarden.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::MFColor(values) | Self::MFVec3f(values) => values.len(),
            Self::MFFloat(values) => values.len(),
            Self::MFInt32(values) => values.len(),
            Self::MFNode(values) => values.len(),
            Self::MFRotation(values) => values.len(),
            Self::MFString(values) => values.len(),
            Self::MFTime(values) => values.len(),
            Self::MFVec2f(values) => values.len(),
            _ => 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::SFBool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::SFFloat(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Self::SFInt32(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<f64> {
        match self {
            Self::SFTime(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::SFString(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_color(&self) -> Option<[f32; 3]> {
        match self {
            Self::SFColor(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec2f(&self) -> Option<[f32; 2]> {
        match self {
            Self::SFVec2f(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vec3f(&self) -> Option<[f32; 3]> {
        match self {
            Self::SFVec3f(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_rotation(&self) -> Option<[f32; 4]> {
        match self {
            Self::SFRotation(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Self::SFImage(value) => Some(value),
            _ => None,
        }
    }

    /// `Some(None)` is een NULL-`SFNode`; `None` betekent dat de waarde geen
    /// `SFNode` is.
    #[must_use]
    pub fn as_node(&self) -> Option<Option<NodeId>> {
        match self {
            Self::SFNode(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_color(&self) -> Option<&[[f32; 3]]> {
        match self {
            Self::MFColor(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_float(&self) -> Option<&[f32]> {
        match self {
            Self::MFFloat(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_int32(&self) -> Option<&[i32]> {
        match self {
            Self::MFInt32(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_node(&self) -> Option<&NodeList> {
        match self {
            Self::MFNode(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_mf_node_mut(&mut self) -> Option<&mut NodeList> {
        match self {
            Self::MFNode(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_rotation(&self) -> Option<&[[f32; 4]]> {
        match self {
            Self::MFRotation(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_string(&self) -> Option<&[String]> {
        match self {
            Self::MFString(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_time(&self) -> Option<&[f64]> {
        match self {
            Self::MFTime(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_vec2f(&self) -> Option<&[[f32; 2]]> {
        match self {
            Self::MFVec2f(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_mf_vec3f(&self) -> Option<&[[f32; 3]]> {
        match self {
            Self::MFVec3f(values) => Some(values),
            _ => None,
        }
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= FP_TOLERANCE
}

fn close_f32(a: f32, b: f32) -> bool {
    close(f64::from(a), f64::from(b))
}

fn close_all<const N: usize>(a: &[f32; N], b: &[f32; N]) -> bool {
    a.iter().zip(b).all(|(x, y)| close_f32(*x, *y))
}

fn close_lists<const N: usize>(a: &[[f32; N]], b: &[[f32; N]]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| close_all(x, y))
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::SFBool(a), Self::SFBool(b)) => a == b,
            (Self::SFColor(a), Self::SFColor(b)) | (Self::SFVec3f(a), Self::SFVec3f(b)) => {
                close_all(a, b)
            }
            (Self::SFFloat(a), Self::SFFloat(b)) => close_f32(*a, *b),
            (Self::SFImage(a), Self::SFImage(b)) => a == b,
            (Self::SFInt32(a), Self::SFInt32(b)) => a == b,
            (Self::SFNode(a), Self::SFNode(b)) => a == b,
            (Self::SFRotation(a), Self::SFRotation(b)) => close_all(a, b),
            (Self::SFString(a), Self::SFString(b)) => a == b,
            (Self::SFTime(a), Self::SFTime(b)) => close(*a, *b),
            (Self::SFVec2f(a), Self::SFVec2f(b)) => close_all(a, b),
            (Self::MFColor(a), Self::MFColor(b)) | (Self::MFVec3f(a), Self::MFVec3f(b)) => {
                close_lists(a, b)
            }
            (Self::MFFloat(a), Self::MFFloat(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| close_f32(*x, *y))
            }
            (Self::MFInt32(a), Self::MFInt32(b)) => a == b,
            (Self::MFNode(a), Self::MFNode(b)) => a == b,
            (Self::MFRotation(a), Self::MFRotation(b)) => close_lists(a, b),
            (Self::MFString(a), Self::MFString(b)) => a == b,
            (Self::MFTime(a), Self::MFTime(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| close(*x, *y))
            }
            (Self::MFVec2f(a), Self::MFVec2f(b)) => close_lists(a, b),
            _ => false,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::SFBool(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::SFFloat(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::SFInt32(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::SFString(value.to_owned())
    }
}

/// Fout bij het versmallen of parsen van een veldwaarde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    TypeMismatch {
        expected: FieldType,
        found: FieldType,
    },
    Parse {
        field_type: FieldType,
        message: String,
    },
}

impl ValueError {
    #[must_use]
    pub fn type_mismatch(expected: FieldType, found: FieldType) -> Self {
        Self::TypeMismatch { expected, found }
    }

    #[must_use]
    pub fn parse(field_type: FieldType, message: impl Into<String>) -> Self {
        Self::Parse {
            field_type,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected a `{expected}` value but got `{found}`")
            }
            Self::Parse {
                field_type,
                message,
            } => write!(f, "invalid {field_type} value: {message}"),
        }
    }
}

impl std::error::Error for ValueError {}

#[cfg(test)]
mod tests {
    use super::{FieldType, FieldValue, Image, NodeList, ValueError};
    use crate::graph::node::NodeId;

    #[test]
    fn narrowing_returns_none_for_other_kinds() {
        let value = FieldValue::SFVec3f([1.0, 2.0, 3.0]);
        assert_eq!(value.as_vec3f(), Some([1.0, 2.0, 3.0]));
        assert!(value.as_float().is_none());
        assert!(value.as_color().is_none());
        assert!(value.as_mf_node().is_none());
    }

    #[test]
    fn ensure_type_reports_both_kinds() {
        let err = FieldValue::SFFloat(1.0)
            .ensure_type(FieldType::SFTime)
            .unwrap_err();
        assert_eq!(
            err,
            ValueError::type_mismatch(FieldType::SFTime, FieldType::SFFloat)
        );
    }

    #[test]
    fn equality_uses_absolute_tolerance() {
        let a = FieldValue::SFVec3f([0.1, 0.2, 0.3]);
        let b = FieldValue::SFVec3f([0.1 + 1.0e-8, 0.2, 0.3]);
        let c = FieldValue::SFVec3f([0.1 + 1.0e-3, 0.2, 0.3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(FieldValue::SFFloat(1.0), FieldValue::SFTime(1.0));
    }

    #[test]
    fn clones_are_independent() {
        let original = FieldValue::MFFloat(vec![1.0, 2.0]);
        let mut copy = original.clone();
        if let FieldValue::MFFloat(values) = &mut copy {
            values.push(3.0);
        }
        assert_eq!(original.len(), 2);
        assert_eq!(copy.len(), 3);
    }

    #[test]
    fn node_list_supports_indexed_replace() {
        let mut list = NodeList::from(vec![NodeId::new(1), NodeId::new(2), NodeId::new(1)]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.replace(1, NodeId::new(7)), Some(NodeId::new(2)));
        assert_eq!(list.get(1), Some(NodeId::new(7)));
        assert_eq!(list.replace(9, NodeId::new(7)), None);
        assert_eq!(list.remove_all(NodeId::new(1)), 2);
        assert_eq!(list.as_slice(), &[NodeId::new(7)]);
    }

    #[test]
    fn field_type_names_round_trip() {
        for name in ["SFBool", "MFVec3f", "SFRotation", "MFNode"] {
            let kind = FieldType::from_name(name).unwrap();
            assert_eq!(kind.name(), name);
        }
        assert!(FieldType::from_name("SFMatrix").is_none());
        assert!(FieldType::MFString.is_multi());
        assert!(FieldType::SFNode.is_node());
    }

    #[test]
    fn image_requires_matching_buffer() {
        assert!(Image::new(2, 1, 3, vec![0; 6]).is_some());
        assert!(Image::new(2, 2, 3, vec![0; 6]).is_none());
        assert!(Image::new(u32::MAX, u32::MAX, 4, Vec::new()).is_none());
    }
}
