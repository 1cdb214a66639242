use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const TAG_KEY: &str = "tag";
const CHILDREN_KEY: &str = "children";

/// Scalar value of a shape attribute as emitted by the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => Ok(()),
            AttrValue::Bool(value) => write!(f, "{value}"),
            AttrValue::Number(value) => write!(f, "{value}"),
            AttrValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value.into())
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Number(i64::from(value).into())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(AttrValue::Number)
            .unwrap_or(AttrValue::Null)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

/// One drawable node. `tag` and `children` never appear in `attributes`;
/// attribute and child order is kept exactly as received.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shape {
    pub tag: String,
    pub attributes: Vec<(String, AttrValue)>,
    pub children: Vec<Shape>,
}

impl Shape {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        set_attribute(&mut self.attributes, name.into(), value.into());
        self
    }

    pub fn child(mut self, child: Shape) -> Self {
        self.children.push(child);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// A repeated name keeps its first position and takes the latest value.
fn set_attribute(attributes: &mut Vec<(String, AttrValue)>, name: String, value: AttrValue) {
    match attributes.iter_mut().find(|(existing, _)| *existing == name) {
        Some(slot) => slot.1 = value,
        None => attributes.push((name, value)),
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(!self.children.is_empty());
        let mut map = serializer.serialize_map(Some(self.attributes.len() + 1 + extra))?;
        map.serialize_entry(TAG_KEY, &self.tag)?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        if !self.children.is_empty() {
            map.serialize_entry(CHILDREN_KEY, &self.children)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Shape {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ShapeVisitor)
    }
}

struct ShapeVisitor;

impl<'de> Visitor<'de> for ShapeVisitor {
    type Value = Shape;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a shape object with a `tag` field")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Shape, A::Error> {
        let mut tag: Option<String> = None;
        let mut children: Option<Vec<Shape>> = None;
        let mut attributes = Vec::new();
        while let Some(key) = access.next_key::<String>()? {
            match key.as_str() {
                TAG_KEY => {
                    if tag.is_some() {
                        return Err(de::Error::duplicate_field(TAG_KEY));
                    }
                    tag = Some(access.next_value()?);
                }
                CHILDREN_KEY => {
                    if children.is_some() {
                        return Err(de::Error::duplicate_field(CHILDREN_KEY));
                    }
                    let value: Option<Vec<Shape>> = access.next_value()?;
                    children = Some(value.unwrap_or_default());
                }
                _ => {
                    let value: AttrValue = access.next_value()?;
                    set_attribute(&mut attributes, key, value);
                }
            }
        }
        let tag = tag.ok_or_else(|| de::Error::missing_field(TAG_KEY))?;
        Ok(Shape {
            tag,
            attributes,
            children: children.unwrap_or_default(),
        })
    }
}
