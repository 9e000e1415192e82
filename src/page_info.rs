//! `hasNextPage` / `hasPreviousPage` as expressions over the materialized page.

use crate::builder::cursor_column;
use crate::sql::{self, Alias, Fragment};
use crate::{BuildOptions, CursorDirection, QueryBuilder, Value};

/// What is known about one side of the page.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExistenceInputs {
    /// The order is unique, so rows can be told apart by their cursor.
    pub can_have_cursor_in_where: bool,
    /// A cursor bound is installed on the side being tested.
    pub query_has_opposite_bound: bool,
    /// The page size is limited on the side being tested.
    pub query_has_limit_on_this_side: bool,
    pub offset: u64,
    /// Forward limit of the window the page is read from.
    pub window_limit: Option<u64>,
    /// The page keeps only this many trailing rows of its window.
    pub last: Option<u64>,
    /// Test for a previous page rather than a next one.
    pub invert: bool,
}

impl ExistenceInputs {
    pub fn direction(&self) -> CursorDirection {
        match self.invert {
            false => CursorDirection::Preceding,
            true => CursorDirection::Following,
        }
    }
}

/// How the existence of a neighbouring page is decided, in priority order.
#[derive(Clone, Copy, Debug, Eq, Hash, IsVariant, PartialEq)]
pub enum ExistenceStrategy {
    /// Nothing limits this side, so no neighbour can exist.
    NoBoundPossible,
    /// A row excluded by the installed cursor bound exists.
    ReuseOppositeBound,
    /// A row outside the page exists, told apart by cursor.
    KeysetExclusion,
    /// A row past `count(page) + offset` exists, or past `offset + limit` for
    /// a trimmed window. Backwards this assumes a previous page whenever
    /// `offset > 0` without counting prior rows; otherwise a page kept from the
    /// end of its window has one when the window holds more than `last` rows.
    OffsetFallback,
}

impl ExistenceStrategy {
    pub fn select(inputs: &ExistenceInputs) -> Self {
        if !inputs.query_has_opposite_bound
            && !inputs.query_has_limit_on_this_side
            && !(inputs.invert && inputs.offset > 0)
        {
            Self::NoBoundPossible
        } else if inputs.query_has_opposite_bound {
            Self::ReuseOppositeBound
        } else if inputs.can_have_cursor_in_where && !inputs.trims_window() {
            Self::KeysetExclusion
        } else {
            Self::OffsetFallback
        }
    }

    /// Renders the strategy as a boolean expression. `page` names the
    /// materialized page, which must expose the cursor column.
    pub fn to_fragment(
        self,
        builder: &dyn QueryBuilder,
        page: Alias,
        inputs: &ExistenceInputs,
        options: &BuildOptions,
    ) -> Fragment {
        let unbounded = sql!(
            "select 1 from ",
            builder.table_expression(),
            " as ",
            builder.table_alias()
        );
        let common = || {
            sql!(
                &unbounded,
                " where ",
                builder.build_where_clause(!inputs.invert, inputs.invert, options)
            )
        };

        match self {
            Self::NoBoundPossible => sql::literal(false),
            Self::ReuseOppositeBound => sql!(
                "exists(",
                &unbounded,
                " where ",
                builder.build_where_clause(false, false, options),
                " and not (",
                builder.build_where_bound_clause(inputs.direction()),
                "))"
            ),
            Self::KeysetExclusion => {
                let cursor = builder.cursor_expression().unwrap_or_else(sql::null);
                let offset = match inputs.offset {
                    0 => sql::blank(),
                    offset => sql!(" offset ", sql::value(Value::Int(offset as i64))),
                };
                sql!(
                    "exists(",
                    common(),
                    " and (",
                    cursor,
                    ")::text not in (select ",
                    cursor_column(),
                    "::text from ",
                    page,
                    ")",
                    offset,
                    ")"
                )
            }
            Self::OffsetFallback if inputs.invert => match inputs.last {
                _ if inputs.offset > 0 => sql::literal(true),
                Some(last) if inputs.window_limit.map_or(true, |limit| limit > last) => {
                    sql!("exists(", common(), " offset ", sql::value(Value::Int(last as i64)), ")")
                }
                _ => sql::literal(false),
            },
            Self::OffsetFallback => match (inputs.window_limit, inputs.last) {
                (Some(limit), Some(_)) => sql!(
                    "exists(",
                    common(),
                    " offset ",
                    sql::value(Value::Int(inputs.offset.saturating_add(limit) as i64)),
                    ")"
                ),
                _ => sql!(
                    "exists(",
                    common(),
                    " offset ((select count(*) from ",
                    page,
                    ") + ",
                    sql::value(Value::Int(inputs.offset as i64)),
                    "))"
                ),
            },
        }
    }
}

/// Chooses and renders the existence check for one side.
pub fn page_exists_beyond(
    builder: &dyn QueryBuilder,
    page: Alias,
    inputs: &ExistenceInputs,
    options: &BuildOptions,
) -> Fragment {
    let strategy = ExistenceStrategy::select(inputs);
    tracing::debug!(?strategy, invert = inputs.invert, "selected page existence strategy");
    strategy.to_fragment(builder, page, inputs, options)
}
