//! Tekstuele veldsyntax van VRML97: attribuuttekst parsen naar
//! [`FieldValue`]s en waarden weer uitschrijven.

use core::fmt::{self, Write};
use std::str::FromStr;

use super::value::{FieldType, FieldValue, Image, NodeList, ValueError};

/// Langere MF-waarden worden met één element per regel geschreven.
const INLINE_ELEMENTS: usize = 6;

impl FieldValue {
    /// Parst VRML/X3D-tekst voor een veld van type `field_type`.
    ///
    /// Getallen mogen door witruimte of komma's gescheiden zijn en MF-waarden
    /// mogen tussen haken staan. Node-velden accepteren alleen `NULL` of een
    /// lege lijst.
    pub fn parse(field_type: FieldType, text: &str) -> Result<Self, ValueError> {
        let body = strip_brackets(text.trim());
        let value = match field_type {
            FieldType::SFBool => Self::SFBool(parse_bool(field_type, body)?),
            FieldType::SFColor => Self::SFColor(single::<3>(field_type, body)?),
            FieldType::SFFloat => Self::SFFloat(single::<1>(field_type, body)?[0]),
            FieldType::SFImage => Self::SFImage(parse_image(body)?),
            FieldType::SFInt32 => {
                let values = integers(field_type, body)?;
                match values.as_slice() {
                    [value] => Self::SFInt32(*value),
                    _ => return Err(count_error(field_type, 1, values.len())),
                }
            }
            FieldType::SFNode => {
                if body.is_empty() || body == "NULL" {
                    Self::SFNode(None)
                } else {
                    return Err(ValueError::parse(
                        field_type,
                        "node values cannot be given as text",
                    ));
                }
            }
            FieldType::SFRotation => Self::SFRotation(single::<4>(field_type, body)?),
            FieldType::SFString => Self::SFString(parse_sf_string(body)?),
            FieldType::SFTime => {
                let values = numbers::<f64>(field_type, body)?;
                match values.as_slice() {
                    [value] => Self::SFTime(*value),
                    _ => return Err(count_error(field_type, 1, values.len())),
                }
            }
            FieldType::SFVec2f => Self::SFVec2f(single::<2>(field_type, body)?),
            FieldType::SFVec3f => Self::SFVec3f(single::<3>(field_type, body)?),
            FieldType::MFColor => Self::MFColor(tuples::<3>(field_type, body)?),
            FieldType::MFFloat => Self::MFFloat(numbers::<f32>(field_type, body)?),
            FieldType::MFInt32 => Self::MFInt32(integers(field_type, body)?),
            FieldType::MFNode => {
                if body.is_empty() || body == "NULL" {
                    Self::MFNode(NodeList::new())
                } else {
                    return Err(ValueError::parse(
                        field_type,
                        "node values cannot be given as text",
                    ));
                }
            }
            FieldType::MFRotation => Self::MFRotation(tuples::<4>(field_type, body)?),
            FieldType::MFString => Self::MFString(parse_mf_string(body)?),
            FieldType::MFTime => Self::MFTime(numbers::<f64>(field_type, body)?),
            FieldType::MFVec2f => Self::MFVec2f(tuples::<2>(field_type, body)?),
            FieldType::MFVec3f => Self::MFVec3f(tuples::<3>(field_type, body)?),
        };
        Ok(value)
    }

    /// Schrijft de waarde in VRML97-syntax. Lange MF-waarden lopen over
    /// meerdere regels die `indent` spaties inspringen.
    pub fn print<W: Write>(&self, out: &mut W, indent: usize) -> fmt::Result {
        match self {
            Self::SFBool(value) => out.write_str(if *value { "TRUE" } else { "FALSE" }),
            Self::SFColor(value) | Self::SFVec3f(value) => write_floats(out, value),
            Self::SFFloat(value) => write!(out, "{value}"),
            Self::SFImage(image) => write_image(out, image),
            Self::SFInt32(value) => write!(out, "{value}"),
            Self::SFNode(None) => out.write_str("NULL"),
            Self::SFNode(Some(node)) => write!(out, "{node}"),
            Self::SFRotation(value) => write_floats(out, value),
            Self::SFString(value) => write_quoted(out, value),
            Self::SFTime(value) => write!(out, "{value}"),
            Self::SFVec2f(value) => write_floats(out, value),
            Self::MFColor(values) | Self::MFVec3f(values) => {
                write_list(out, values, indent, |out, v| write_floats(out, v))
            }
            Self::MFFloat(values) => write_list(out, values, indent, |out, v| write!(out, "{v}")),
            Self::MFInt32(values) => write_list(out, values, indent, |out, v| write!(out, "{v}")),
            Self::MFNode(values) => {
                write_list(out, values.as_slice(), indent, |out, v| write!(out, "{v}"))
            }
            Self::MFRotation(values) => {
                write_list(out, values, indent, |out, v| write_floats(out, v))
            }
            Self::MFString(values) => write_list(out, values, indent, |out, v| write_quoted(out, v)),
            Self::MFTime(values) => write_list(out, values, indent, |out, v| write!(out, "{v}")),
            Self::MFVec2f(values) => write_list(out, values, indent, |out, v| write_floats(out, v)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f, 0)
    }
}

fn strip_brackets(text: &str) -> &str {
    match text.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        Some(inner) => inner.trim(),
        None => text,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
}

fn count_error(field_type: FieldType, expected: usize, found: usize) -> ValueError {
    ValueError::parse(
        field_type,
        format!("expected {expected} component(s), found {found}"),
    )
}

fn numbers<T: FromStr>(field_type: FieldType, text: &str) -> Result<Vec<T>, ValueError> {
    tokens(text)
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| ValueError::parse(field_type, format!("`{token}` is not a number")))
        })
        .collect()
}

fn integers(field_type: FieldType, text: &str) -> Result<Vec<i32>, ValueError> {
    tokens(text)
        .map(|token| parse_int(token).ok_or_else(|| {
            ValueError::parse(field_type, format!("`{token}` is not an integer"))
        }))
        .collect()
}

fn parse_int(token: &str) -> Option<i32> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    let value = if negative { -magnitude } else { magnitude };
    // Hexadecimale literals zoals 0xFFFFFFFF zijn bitpatronen, geen grootheden.
    i32::try_from(value)
        .ok()
        .or_else(|| u32::try_from(value).ok().map(|bits| bits as i32))
}

fn single<const N: usize>(field_type: FieldType, text: &str) -> Result<[f32; N], ValueError> {
    let values = numbers::<f32>(field_type, text)?;
    let found = values.len();
    values
        .try_into()
        .map_err(|_| count_error(field_type, N, found))
}

fn tuples<const N: usize>(field_type: FieldType, text: &str) -> Result<Vec<[f32; N]>, ValueError> {
    let values = numbers::<f32>(field_type, text)?;
    if values.len() % N != 0 {
        return Err(ValueError::parse(
            field_type,
            format!("{} numbers do not form whole {N}-tuples", values.len()),
        ));
    }
    Ok(values
        .chunks_exact(N)
        .map(|chunk| {
            let mut tuple = [0.0; N];
            tuple.copy_from_slice(chunk);
            tuple
        })
        .collect())
}

fn parse_bool(field_type: FieldType, text: &str) -> Result<bool, ValueError> {
    match text {
        "TRUE" | "true" => Ok(true),
        "FALSE" | "false" => Ok(false),
        other => Err(ValueError::parse(
            field_type,
            format!("`{other}` is not TRUE or FALSE"),
        )),
    }
}

fn parse_image(text: &str) -> Result<Image, ValueError> {
    let field_type = FieldType::SFImage;
    let values = integers(field_type, text)?;
    let [width, height, components, pixels @ ..] = values.as_slice() else {
        return Err(ValueError::parse(
            field_type,
            "expected width, height and component count",
        ));
    };
    let (Ok(width), Ok(height), Ok(components)) = (
        u32::try_from(*width),
        u32::try_from(*height),
        u8::try_from(*components),
    ) else {
        return Err(ValueError::parse(field_type, "negative image dimensions"));
    };
    if components > 4 {
        return Err(ValueError::parse(field_type, "unsupported component count"));
    }
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| ValueError::parse(field_type, "image dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(ValueError::parse(
            field_type,
            format!("expected {expected} pixels, found {}", pixels.len()),
        ));
    }
    let mut bytes = Vec::with_capacity(pixels.len() * usize::from(components));
    for pixel in pixels {
        let bits = *pixel as u32;
        for component in (0..components).rev() {
            bytes.push(((bits >> (8 * u32::from(component))) & 0xFF) as u8);
        }
    }
    Image::new(width, height, components, bytes)
        .ok_or_else(|| ValueError::parse(field_type, "unsupported component count"))
}

fn parse_sf_string(text: &str) -> Result<String, ValueError> {
    if text.starts_with('"') {
        let mut strings = quoted_strings(FieldType::SFString, text)?;
        match strings.len() {
            1 => Ok(strings.remove(0)),
            found => Err(count_error(FieldType::SFString, 1, found)),
        }
    } else {
        Ok(text.to_owned())
    }
}

fn parse_mf_string(text: &str) -> Result<Vec<String>, ValueError> {
    if text.is_empty() {
        Ok(Vec::new())
    } else if text.starts_with('"') {
        quoted_strings(FieldType::MFString, text)
    } else {
        Ok(vec![text.to_owned()])
    }
}

fn quoted_strings(field_type: FieldType, text: &str) -> Result<Vec<String>, ValueError> {
    let mut strings = Vec::new();
    let mut chars = text.chars();

    loop {
        let Some(c) = chars.find(|c| !(c.is_whitespace() || *c == ',')) else {
            return Ok(strings);
        };
        if c != '"' {
            return Err(ValueError::parse(
                field_type,
                format!("unexpected `{c}` outside quotes"),
            ));
        }

        let mut current = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '"' => {
                    closed = true;
                    break;
                }
                other => current.push(other),
            }
        }
        if !closed {
            return Err(ValueError::parse(field_type, "unterminated string"));
        }
        strings.push(current);
    }
}

fn write_floats<W: Write>(out: &mut W, values: &[f32]) -> fmt::Result {
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            out.write_char(' ')?;
        }
        write!(out, "{value}")?;
    }
    Ok(())
}

fn write_quoted<W: Write>(out: &mut W, value: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.write_char('\\')?;
        }
        out.write_char(c)?;
    }
    out.write_char('"')
}

fn write_image<W: Write>(out: &mut W, image: &Image) -> fmt::Result {
    write!(out, "{} {} {}", image.width, image.height, image.components)?;
    let stride = usize::from(image.components.max(1));
    for pixel in image.pixels.chunks(stride) {
        let bits = pixel
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
        write!(out, " 0x{bits:0width$X}", width = stride * 2)?;
    }
    Ok(())
}

fn write_list<W, T, F>(out: &mut W, values: &[T], indent: usize, mut element: F) -> fmt::Result
where
    W: Write,
    F: FnMut(&mut W, &T) -> fmt::Result,
{
    if values.len() <= INLINE_ELEMENTS {
        out.write_str("[ ")?;
        for (index, value) in values.iter().enumerate() {
            if index > 0 {
                out.write_str(", ")?;
            }
            element(out, value)?;
        }
        return out.write_str(" ]");
    }

    out.write_str("[\n")?;
    for value in values {
        write!(out, "{:width$}", "", width = indent + 2)?;
        element(out, value)?;
        out.write_str(",\n")?;
    }
    write!(out, "{:width$}]", "", width = indent)
}

#[cfg(test)]
mod tests {
    use super::FieldValue;
    use crate::graph::value::{FieldType, ValueError};

    #[test]
    fn parses_vectors_with_commas_and_brackets() {
        let value = FieldValue::parse(FieldType::MFVec3f, "[0 0 0, 1 2 3]").unwrap();
        assert_eq!(
            value,
            FieldValue::MFVec3f(vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]])
        );
    }

    #[test]
    fn rejects_partial_tuples() {
        let err = FieldValue::parse(FieldType::MFVec3f, "0 0 0 1").unwrap_err();
        assert!(matches!(err, ValueError::Parse { field_type: FieldType::MFVec3f, .. }));
        assert!(FieldValue::parse(FieldType::SFVec2f, "1 2 3").is_err());
    }

    #[test]
    fn parses_booleans_in_both_encodings() {
        assert_eq!(
            FieldValue::parse(FieldType::SFBool, "TRUE").unwrap(),
            FieldValue::SFBool(true)
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFBool, "false").unwrap(),
            FieldValue::SFBool(false)
        );
        assert!(FieldValue::parse(FieldType::SFBool, "yes").is_err());
    }

    #[test]
    fn parses_quoted_and_bare_strings() {
        let value = FieldValue::parse(FieldType::MFString, r#""a.x3d#P" "say \"hi\"""#).unwrap();
        assert_eq!(
            value,
            FieldValue::MFString(vec!["a.x3d#P".to_owned(), "say \"hi\"".to_owned()])
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFString, "Front view").unwrap(),
            FieldValue::SFString("Front view".to_owned())
        );
        assert!(FieldValue::parse(FieldType::MFString, r#""open"#).is_err());
    }

    #[test]
    fn parses_images_with_hex_pixels() {
        let value = FieldValue::parse(FieldType::SFImage, "2 1 3 0xFF0000 0x00FF00").unwrap();
        let image = value.as_image().unwrap();
        assert_eq!(image.pixels, vec![0xFF, 0, 0, 0, 0xFF, 0]);
        assert_eq!(value.to_string(), "2 1 3 0xFF0000 0x00FF00");
    }

    #[test]
    fn oversized_images_are_rejected() {
        assert!(FieldValue::parse(FieldType::SFImage, "4294967295 4294967295 4").is_err());
        assert!(FieldValue::parse(FieldType::SFImage, "65536 65536 4 0").is_err());
        assert!(FieldValue::parse(FieldType::SFImage, "1 1 9 0").is_err());
    }

    #[test]
    fn node_fields_accept_only_null() {
        assert_eq!(
            FieldValue::parse(FieldType::SFNode, "NULL").unwrap(),
            FieldValue::SFNode(None)
        );
        assert!(FieldValue::parse(FieldType::MFNode, "Group {}").is_err());
    }

    #[test]
    fn prints_vrml_syntax() {
        assert_eq!(FieldValue::SFBool(true).to_string(), "TRUE");
        assert_eq!(FieldValue::SFVec3f([1.0, 0.5, -2.0]).to_string(), "1 0.5 -2");
        assert_eq!(
            FieldValue::MFString(vec!["a".to_owned(), "b\"c".to_owned()]).to_string(),
            r#"[ "a", "b\"c" ]"#
        );
        assert_eq!(FieldValue::SFNode(None).to_string(), "NULL");
    }

    #[test]
    fn long_lists_break_across_lines() {
        let value = FieldValue::MFFloat((0..8).map(|i| i as f32).collect());
        let mut out = String::new();
        value.print(&mut out, 2).unwrap();
        assert!(out.starts_with("[\n    0,\n"));
        assert!(out.ends_with("\n  ]"));
    }
}
