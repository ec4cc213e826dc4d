//! Runtime-instellingen van een scene.

use serde::{Deserialize, Serialize};

use crate::graph::event::MAX_EVENTS;

/// Instellingen van een [`crate::scene::Scene`]. Laadt uit een XML-element
/// `<sceneConfig maxEvents="..." .../>` of, in de browser, uit een gewoon
/// JS-object met dezelfde camelCase-sleutels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneConfig {
    #[serde(alias = "@maxEvents")]
    pub max_events: usize,
    /// Seconden tot de volgende update als er niets animeert.
    #[serde(alias = "@defaultDelta")]
    pub default_delta: f64,
    /// Koplamp als er geen NavigationInfo gebonden is.
    #[serde(alias = "@headlight")]
    pub headlight: bool,
    #[serde(alias = "viewpoint")]
    pub default_viewpoint: ViewpointDefaults,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_events: MAX_EVENTS,
            default_delta: 0.5,
            headlight: true,
            default_viewpoint: ViewpointDefaults::default(),
        }
    }
}

/// Camera als er geen Viewpoint gebonden is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewpointDefaults {
    #[serde(alias = "@position", deserialize_with = "floats::deserialize")]
    pub position: [f32; 3],
    #[serde(alias = "@orientation", deserialize_with = "floats::deserialize")]
    pub orientation: [f32; 4],
    #[serde(alias = "@fieldOfView")]
    pub field_of_view: f32,
    #[serde(alias = "@avatarSize")]
    pub avatar_size: f32,
    #[serde(alias = "@visibilityLimit")]
    pub visibility_limit: f32,
}

impl Default for ViewpointDefaults {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 10.0],
            orientation: [0.0, 0.0, 1.0, 0.0],
            field_of_view: 0.785_398,
            avatar_size: 0.25,
            visibility_limit: 0.0,
        }
    }
}

impl SceneConfig {
    /// Parst een `<sceneConfig/>`-element.
    pub fn from_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        quick_xml::de::from_str(xml)
    }
}

/// Floatreeksen met vaste lengte, gegeven als reeks of als attribuuttekst
/// met witruimte ertussen.
mod floats {
    use serde::de::{self, Deserializer};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        List(Vec<f32>),
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[f32; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let values = match Raw::deserialize(deserializer)? {
            Raw::List(values) => values,
            Raw::Text(text) => text
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|part| !part.is_empty())
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(de::Error::custom)?,
        };
        values
            .try_into()
            .map_err(|values: Vec<f32>| de::Error::invalid_length(values.len(), &"a float tuple"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_runtime_constants() {
        let config = SceneConfig::default();
        assert_eq!(config.max_events, 400);
        assert!((config.default_delta - 0.5).abs() < f64::EPSILON);
        assert!(config.headlight);
        assert_eq!(config.default_viewpoint.position, [0.0, 0.0, 10.0]);
    }

    #[test]
    fn loads_from_xml_attributes() {
        let xml = r#"<sceneConfig maxEvents="16" headlight="false">
            <viewpoint position="1 2 3" fieldOfView="0.5"/>
        </sceneConfig>"#;
        let config = SceneConfig::from_xml(xml).unwrap();
        assert_eq!(config.max_events, 16);
        assert!(!config.headlight);
        assert!((config.default_delta - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.default_viewpoint.position, [1.0, 2.0, 3.0]);
        assert!((config.default_viewpoint.field_of_view - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.default_viewpoint.orientation, [0.0, 0.0, 1.0, 0.0]);
    }
}
