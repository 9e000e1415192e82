use ::chrono::NaiveDateTime;
use ::std::cmp::Ordering;

/// A scalar bound into a fragment or carried inside a cursor.
#[derive(Clone, Debug, Deserialize, From, IsVariant, PartialEq, Serialize)]
pub enum Value {
    #[from(ignore)]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
}

impl Value {
    /// Orders two values of the same kind. Mixed kinds and nulls are unordered.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(lhs), Self::Bool(rhs)) => Some(lhs.cmp(rhs)),
            (Self::Int(lhs), Self::Int(rhs)) => Some(lhs.cmp(rhs)),
            (Self::Float(lhs), Self::Float(rhs)) => lhs.partial_cmp(rhs),
            (Self::Int(lhs), Self::Float(rhs)) => (*lhs as f64).partial_cmp(rhs),
            (Self::Float(lhs), Self::Int(rhs)) => lhs.partial_cmp(&(*rhs as f64)),
            (Self::Text(lhs), Self::Text(rhs)) => Some(lhs.cmp(rhs)),
            (Self::Timestamp(lhs), Self::Timestamp(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(value) => Json::Bool(*value),
            Self::Int(value) => Json::from(*value),
            Self::Float(value) => serde_json::Number::from_f64(*value).map_or(Json::Null, Json::Number),
            Self::Text(value) => Json::String(value.clone()),
            Self::Timestamp(value) => Json::String(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::Json(value) => value.clone(),
        }
    }

    /// Reads a cursor scalar back from json. Arrays and objects stay opaque.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(value) => Self::Bool(*value),
            Json::Number(number) => match number.as_i64() {
                Some(value) => Self::Int(value),
                None => number.as_f64().map_or(Self::Null, Self::Float),
            },
            Json::String(value) => Self::Text(value.clone()),
            Json::Array(_) | Json::Object(_) => Self::Json(json.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
