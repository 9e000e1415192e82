/// Errors raised while compiling a paginated query plan.
///
/// Malformed cursors whose shape decodes but does not match the active order
/// are not errors; they compile to a bound that matches no rows.
#[derive(Debug, Display, Error, From, IsVariant)]
pub enum Error {
    #[display("{}", _0)]
    UnsupportedCursor(#[error(not(source))] String),

    #[display("malformed cursor: {}", _0)]
    MalformedCursor(#[error(not(source))] String),

    #[display("`{name}` is too large, must be less than or equal to {max} (got {count})")]
    CountTooLarge {
        name: &'static str,
        count: u32,
        max: u32,
    },

    #[display("invalid cursor json: {}", _0)]
    #[from]
    Json(serde_json::Error),
}

impl Error {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedCursor(message.into())
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCursor(message.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
