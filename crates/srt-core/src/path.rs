use crate::RecordError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// An ordered sequence of object keys and list indices into a record tree.
///
/// Resolution never fails: an out-of-range index, a missing key, a shape
/// mismatch or a `null` anywhere along the way all resolve to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(PathSegment::Index(index));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Prefix this path with `prefix`, e.g. to address the same stat on a
    /// teammate instead of the acting player.
    pub fn under(&self, prefix: &FieldPath) -> FieldPath {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        FieldPath { segments }
    }

    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut node = present(root)?;
        for segment in &self.segments {
            node = match segment {
                PathSegment::Key(key) => node.as_object()?.get(key.as_str())?,
                PathSegment::Index(index) => node.as_array()?.get(*index)?,
            };
            node = present(node)?;
        }
        Some(node)
    }

    pub fn resolve_f64(&self, root: &Value) -> Option<f64> {
        self.resolve(root).and_then(numeric)
    }
}

fn present(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

/// Numeric view of a leaf. Numeric strings count (stat.ink serializes
/// `danger_rate` as a string).
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl FromStr for FieldPath {
    type Err = RecordError;

    /// Accepts `my_data weapons 0 key` or `my_data.weapons.0.key`; all-digit
    /// segments are list indices.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let segments = input
            .split(|ch: char| ch == '.' || ch.is_whitespace())
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                if segment.bytes().all(|byte| byte.is_ascii_digit()) {
                    segment
                        .parse::<usize>()
                        .map(PathSegment::Index)
                        .map_err(|_| RecordError::InvalidPath(input.to_string()))
                } else {
                    Ok(PathSegment::Key(segment.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if segments.is_empty() {
            return Err(RecordError::InvalidPath(input.to_string()));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "my_data": { "splatnet_id": "abc", "weapons": [{ "key": "sharp" }] },
            "teammates": [{ "splatnet_id": "t0", "weapons": null }],
            "quota": [16, 17, 19],
            "danger_rate": "140.2"
        })
    }

    #[test]
    fn parses_space_and_dot_separated_paths() {
        let spaced: FieldPath = "my_data weapons 0 key".parse().expect("path");
        let dotted: FieldPath = "my_data.weapons.0.key".parse().expect("path");
        assert_eq!(spaced, dotted);
        assert_eq!(
            spaced,
            FieldPath::default()
                .key("my_data")
                .key("weapons")
                .index(0)
                .key("key")
        );
        assert_eq!(dotted.to_string(), "my_data.weapons.0.key");
        assert!("  ".parse::<FieldPath>().is_err());
    }

    #[test]
    fn out_of_range_and_null_nodes_resolve_to_absent() {
        let value = sample();
        let weapon_slot: FieldPath = "my_data weapons 2 key".parse().expect("path");
        let null_weapons: FieldPath = "teammates 0 weapons 0".parse().expect("path");
        let missing_mate: FieldPath = "teammates 3 splatnet_id".parse().expect("path");
        let index_into_object: FieldPath = "my_data 0".parse().expect("path");

        assert_eq!(weapon_slot.resolve(&value), None);
        assert_eq!(null_weapons.resolve(&value), None);
        assert_eq!(missing_mate.resolve(&value), None);
        assert_eq!(index_into_object.resolve(&value), None);
    }

    #[test]
    fn numeric_strings_resolve_as_numbers() {
        let value = sample();
        let rate: FieldPath = "danger_rate".parse().expect("path");
        let quota: FieldPath = "quota 1".parse().expect("path");
        let id: FieldPath = "my_data splatnet_id".parse().expect("path");
        assert_eq!(rate.resolve_f64(&value), Some(140.2));
        assert_eq!(quota.resolve_f64(&value), Some(17.0));
        assert_eq!(id.resolve_f64(&value), None);
    }

    proptest! {
        #[test]
        fn indices_past_the_end_never_panic(index in 0usize..64) {
            let value = sample();
            let path = FieldPath::default().key("quota").index(index);
            let expected = value["quota"].as_array().and_then(|quota| quota.get(index));
            prop_assert_eq!(path.resolve(&value), expected);
        }
    }
}
