use crate::{Error, Result, Value};
use ::serde_json::Value as Json;

static NATURAL_TAG: &str = "natural";

/// Which side of a cursor a bound keeps.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, IsVariant, PartialEq, Serialize)]
pub enum CursorDirection {
    /// Rows strictly after the cursor (`after`, the lower bound).
    Following,
    /// Rows strictly before the cursor (`before`, the upper bound).
    Preceding,
}

impl CursorDirection {
    pub fn is_after(self) -> bool {
        self.is_following()
    }
}

/// A decoded cursor.
///
/// Relative cursors carry the query's shared prefix followed by one value per
/// order entry. Natural cursors carry a 1-based row position.
#[derive(Clone, Debug, Deserialize, IsVariant, PartialEq, Serialize)]
pub enum CursorValue {
    Relative { prefix: Vec<Value>, values: Vec<Value> },
    Natural(i64),
}

impl CursorValue {
    pub fn relative(prefix: Vec<Value>, values: Vec<Value>) -> Self {
        Self::Relative { prefix, values }
    }

    pub fn is_valid_natural(&self) -> bool {
        matches!(self, Self::Natural(position) if *position >= 0)
    }

    /// The json shape emitted by the plan's cursor column:
    /// `[prefix..., [values...]]` or `["natural", n]`.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Relative { prefix, values } => {
                let mut items = prefix.iter().map(Value::to_json).collect::<Vec<_>>();
                items.push(Json::Array(values.iter().map(Value::to_json).collect()));
                Json::Array(items)
            }
            Self::Natural(position) => Json::Array(vec![Json::from(NATURAL_TAG), Json::from(*position)]),
        }
    }

    pub fn from_json(json: &Json) -> Result<Self> {
        let Json::Array(items) = json else {
            return Err(Error::malformed("expected a json array"));
        };
        match items.as_slice() {
            [Json::String(tag), Json::Number(position)] if tag == NATURAL_TAG => position
                .as_i64()
                .map(Self::Natural)
                .ok_or_else(|| Error::malformed("natural cursor position must be an integer")),
            [prefix @ .., Json::Array(values)] => Ok(Self::Relative {
                prefix: prefix.iter().map(Value::from_json).collect(),
                values: values.iter().map(Value::from_json).collect(),
            }),
            _ => Err(Error::malformed("expected a trailing list of order values")),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_json(&serde_json::from_str(text)?)
    }
}

/// Connection arguments after the transport layer decoded any cursors.
///
/// `first` / `before` bound the end of the page, `last` / `after` its start.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PaginationRequest {
    pub first: Option<u32>,
    pub last: Option<u32>,
    pub before: Option<CursorValue>,
    pub after: Option<CursorValue>,
    pub offset: Option<u32>,
}

impl PaginationRequest {
    pub fn uses_cursor_features(&self) -> bool {
        self.first.is_some() || self.last.is_some() || self.has_cursor()
    }

    pub fn has_cursor(&self) -> bool {
        self.before.is_some() || self.after.is_some()
    }

    pub fn cursors(&self) -> impl Iterator<Item = &CursorValue> {
        self.after.iter().chain(self.before.iter())
    }

    pub fn validate(&self, max_count: Option<u32>) -> Result<()> {
        if let Some(first) = self.first {
            crate::env::check_count("first", first, max_count)?;
        }
        if let Some(last) = self.last {
            crate::env::check_count("last", last, max_count)?;
        }
        Ok(())
    }
}
