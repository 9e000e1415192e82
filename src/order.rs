use crate::sql::{self, Fragment};
use crate::{CursorValue, Error, PaginationRequest, Result};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, IsVariant, PartialEq, Serialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    pub(crate) fn keyword(self) -> Fragment {
        match self {
            Self::Ascending => sql::raw("asc"),
            Self::Descending => sql::raw("desc"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderEntry {
    pub expression: Fragment,
    pub direction: Direction,
}

/// Row ordering, most significant entry first.
///
/// `unique` must only be set when the entries fully determine row order
/// (e.g. they end with a primary key); keyset pagination relies on it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderSpec {
    entries: Vec<OrderEntry>,
    unique: bool,
}

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expression: impl Into<Fragment>, direction: Direction) {
        self.entries.push(OrderEntry {
            expression: expression.into(),
            direction,
        });
    }

    pub fn then(mut self, expression: impl Into<Fragment>, direction: Direction) -> Self {
        self.push(expression, direction);
        self
    }

    pub fn set_unique(&mut self, unique: bool) {
        self.unique = unique;
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn entries(&self) -> &[OrderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Keyset pagination needs at least one entry and a unique order.
    pub fn supports_keyset(&self) -> bool {
        self.unique && !self.entries.is_empty()
    }

    pub fn reversed(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|entry| OrderEntry {
                    expression: entry.expression.clone(),
                    direction: entry.direction.reverse(),
                })
                .collect(),
            unique: self.unique,
        }
    }

    pub(crate) fn to_clause(&self) -> Fragment {
        sql::join(
            self.entries
                .iter()
                .map(|entry| sql!(entry.expression.clone(), " ", entry.direction.keyword())),
            ", ",
        )
    }
}

/// How a request is paginated once the order is known.
#[derive(Clone, Copy, Debug, Eq, IsVariant, PartialEq)]
pub enum PaginationMode {
    /// No `first`, `last`, `before` or `after`.
    NoPagination,
    /// Keyset pagination over a unique order.
    Relative,
    /// Offset/limit pagination driven by `natural` cursors.
    Natural,
}

impl PaginationMode {
    pub fn classify(order: &OrderSpec, request: &PaginationRequest) -> Result<Self> {
        let mode = if !request.uses_cursor_features() {
            Self::NoPagination
        } else if order.supports_keyset() {
            Self::Relative
        } else if request.has_cursor() && request.cursors().all(CursorValue::is_valid_natural) {
            Self::Natural
        } else {
            return Err(Error::unsupported("cannot paginate by cursor without an order"));
        };
        tracing::debug!(?mode, order_len = order.len(), unique = order.is_unique(), "classified pagination");
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn unique_order() -> OrderSpec {
        OrderSpec::new().then(sql::raw("id"), Direction::Ascending).unique(true)
    }

    #[test]
    fn empty_request_is_not_paginated() {
        let mode = PaginationMode::classify(&OrderSpec::new(), &PaginationRequest::default()).unwrap();
        assert_eq!(mode, PaginationMode::NoPagination);

        let offset_only = PaginationRequest {
            offset: Some(3),
            ..Default::default()
        };
        assert!(PaginationMode::classify(&OrderSpec::new(), &offset_only).unwrap().is_no_pagination());
    }

    #[test]
    fn unique_order_is_relative() {
        let request = PaginationRequest {
            first: Some(10),
            ..Default::default()
        };
        assert_eq!(PaginationMode::classify(&unique_order(), &request).unwrap(), PaginationMode::Relative);
    }

    #[test]
    fn unique_but_empty_order_is_not_keyset() {
        let order = OrderSpec::new().unique(true);
        assert!(!order.supports_keyset());
    }

    #[test]
    fn natural_cursor_without_unique_order_is_natural() {
        let order = OrderSpec::new().then(sql::raw("name"), Direction::Ascending);
        let request = PaginationRequest {
            first: Some(5),
            after: Some(CursorValue::Natural(10)),
            ..Default::default()
        };
        assert_eq!(PaginationMode::classify(&order, &request).unwrap(), PaginationMode::Natural);
    }

    #[test]
    fn cursor_features_without_order_fail() {
        let order = OrderSpec::new().then(sql::raw("name"), Direction::Ascending);
        let requests = [
            PaginationRequest {
                first: Some(1),
                ..Default::default()
            },
            PaginationRequest {
                last: Some(1),
                ..Default::default()
            },
            PaginationRequest {
                after: Some(CursorValue::relative(vec![], vec![Value::Int(1)])),
                ..Default::default()
            },
            PaginationRequest {
                before: Some(CursorValue::Natural(-1)),
                ..Default::default()
            },
        ];
        for request in requests {
            let err = PaginationMode::classify(&order, &request).unwrap_err();
            assert_eq!(err.to_string(), "cannot paginate by cursor without an order");
        }
    }

    #[test]
    fn reversing_flips_every_direction() {
        let order = OrderSpec::new()
            .then(sql::raw("a"), Direction::Ascending)
            .then(sql::raw("id"), Direction::Descending)
            .unique(true);
        let reversed = order.reversed();
        assert_eq!(reversed.entries()[0].direction, Direction::Descending);
        assert_eq!(reversed.entries()[1].direction, Direction::Ascending);
        assert!(reversed.is_unique());
        assert_eq!(order.to_clause().compile().sql, "a asc, id desc");
    }
}
