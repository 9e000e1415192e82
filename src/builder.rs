//! The row-query collaborator consumed by the pagination compiler.
//!
//! [`QueryBuilder`] is the seam: anything that can describe its table,
//! filters, order and window can be paginated. [`SelectBuilder`] is a plain
//! implementation that accumulates those pieces for a single table.

use crate::sql::{self, Fragment};
use crate::{CursorDirection, OrderSpec, PageWindow};
use ::dyn_clone::DynClone;

static CURSOR_COLUMN: &str = "__cursor";
static JSON_COLUMN: &str = "value";
static POSITION_COLUMN: &str = "__position";

/// Projection and filtering hints forwarded to the row-query builder.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BuildOptions {
    /// Project the fields as one json object column named `value`.
    pub as_json: bool,
    /// Aggregate the rows into a single json array.
    pub as_json_aggregate: bool,
    /// With `as_json`, select only the json column.
    pub only_json_field: bool,
    /// Keep rows whose table alias is null (nullable composite sources).
    pub add_null_case: bool,
}

/// Cursor bound conditions, `lower` from `after` and `upper` from `before`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundClause {
    pub lower: Vec<Fragment>,
    pub upper: Vec<Fragment>,
}

impl BoundClause {
    pub fn push(&mut self, condition: Fragment, direction: CursorDirection) {
        self.side_mut(direction).push(condition);
    }

    pub fn side(&self, direction: CursorDirection) -> &[Fragment] {
        match direction {
            CursorDirection::Following => &self.lower,
            CursorDirection::Preceding => &self.upper,
        }
    }

    fn side_mut(&mut self, direction: CursorDirection) -> &mut Vec<Fragment> {
        match direction {
            CursorDirection::Following => &mut self.lower,
            CursorDirection::Preceding => &mut self.upper,
        }
    }

    pub fn is_bound(&self, direction: CursorDirection) -> bool {
        !self.side(direction).is_empty()
    }

    /// All conditions on one side and-ed together, `true` when unbounded.
    pub fn clause(&self, direction: CursorDirection) -> Fragment {
        and_all(self.side(direction).to_vec())
    }
}

fn and_all(clauses: Vec<Fragment>) -> Fragment {
    if clauses.is_empty() {
        sql::literal(true)
    } else {
        sql!("(", sql::join(clauses, ") and ("), ")")
    }
}

pub trait QueryBuilder: DynClone {
    fn table_expression(&self) -> Fragment;
    fn table_alias(&self) -> Fragment;

    /// All filters, plus the cursor bounds of the requested sides.
    fn build_where_clause(&self, include_lower_bound: bool, include_upper_bound: bool, options: &BuildOptions) -> Fragment;
    fn build_where_bound_clause(&self, direction: CursorDirection) -> Fragment;

    fn order(&self) -> &OrderSpec;

    fn select_cursor(&mut self, cursor: Fragment);
    fn cursor_expression(&self) -> Option<Fragment>;

    fn where_bound(&mut self, condition: Fragment, direction: CursorDirection);
    fn bounds(&self) -> &BoundClause;

    fn offset(&mut self, offset: u64);
    /// Caps the window read forward from the offset.
    fn limit(&mut self, limit: u64);
    /// Keeps only the trailing `count` rows of the window.
    fn last(&mut self, count: u64);

    fn select_fields_count(&self) -> usize;
    fn final_limit(&self) -> Option<u64>;
    fn final_last(&self) -> Option<u64>;
    fn final_offset(&self) -> Option<u64>;

    fn build(&self, options: &BuildOptions) -> Fragment;
}

dyn_clone::clone_trait_object!(QueryBuilder);

#[derive(Clone, Debug)]
pub struct SelectBuilder {
    table: Fragment,
    alias: Fragment,
    fields: Vec<(Fragment, String)>,
    filters: Vec<Fragment>,
    bounds: BoundClause,
    order: OrderSpec,
    window: PageWindow,
    cursor: Option<Fragment>,
}

impl SelectBuilder {
    pub fn new(table: impl Into<Fragment>, alias: impl Into<Fragment>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            fields: Vec::new(),
            filters: Vec::new(),
            bounds: BoundClause::default(),
            order: OrderSpec::default(),
            window: PageWindow::default(),
            cursor: None,
        }
    }

    pub fn select(mut self, expression: impl Into<Fragment>, name: impl Into<String>) -> Self {
        self.fields.push((expression.into(), name.into()));
        self
    }

    pub fn filter(mut self, condition: impl Into<Fragment>) -> Self {
        self.filters.push(condition.into());
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order = order;
        self
    }

    /// Output columns as `(expression, name)`.
    fn columns(&self, options: &BuildOptions) -> Vec<(Fragment, String)> {
        let cursor = self
            .cursor
            .as_ref()
            .map(|cursor| (cursor.clone(), CURSOR_COLUMN.to_owned()));

        let mut columns = Vec::new();
        if options.as_json {
            let object = sql!(
                "json_build_object(",
                sql::join(
                    self.fields.iter().map(|(expression, name)| sql!(sql::text(name), ", ", expression)),
                    ", "
                ),
                ")"
            );
            let object = match options.add_null_case {
                true => sql!("case when (", &self.alias, " is null) then null else ", object, " end"),
                false => object,
            };
            columns.push((object, JSON_COLUMN.to_owned()));
            if !options.only_json_field {
                columns.extend(cursor);
            }
        } else {
            columns.extend(self.fields.iter().cloned());
            columns.extend(cursor);
        }
        columns
    }

    fn project(columns: impl IntoIterator<Item = (Fragment, String)>) -> Fragment {
        let columns = sql::join(
            columns
                .into_iter()
                .map(|(expression, name)| sql!(expression, " as ", sql::identifier([name]))),
            ", ",
        );
        match columns.is_empty() {
            true => sql::raw("1"),
            false => columns,
        }
    }

    fn scan(&self, projection: Fragment, order: &OrderSpec, limit: Option<u64>, options: &BuildOptions) -> Fragment {
        let mut query = sql!(
            "select ",
            projection,
            " from ",
            &self.table,
            " as ",
            &self.alias,
            " where ",
            self.build_where_clause(true, true, options)
        );
        if !order.is_empty() {
            query.push(sql!(" order by ", order.to_clause()));
        }
        if let Some(limit) = limit {
            query.push(sql!(" limit ", sql::integer(limit)));
        }
        if let Some(offset) = self.window.final_offset() {
            query.push(sql!(" offset ", sql::integer(offset)));
        }
        query
    }

    /// Rows of the page in the requested order.
    ///
    /// With `last`, every row carries its position in the requested order so
    /// the page can be restored after reading it from the other end. A unique
    /// order with neither a forward limit nor an offset is scanned backwards;
    /// otherwise the forward window is read and its highest positions kept.
    /// Offsets always skip rows from the start of the order.
    fn rows(&self, options: &BuildOptions) -> Fragment {
        let columns = self.columns(options);
        let Some(last) = self.window.final_last() else {
            return self.scan(Self::project(columns), &self.order, self.window.final_limit(), options);
        };

        let position = sql::identifier([POSITION_COLUMN]);
        let numbering = match self.order.is_empty() {
            true => sql::blank(),
            false => sql!("order by ", self.order.to_clause()),
        };
        let projection = sql!(
            Self::project(columns.iter().cloned()),
            ", row_number() over (",
            numbering,
            ") as ",
            &position
        );

        let backwards = self.window.final_limit().is_none()
            && self.window.final_offset().is_none()
            && self.order.supports_keyset();
        let rows = match backwards {
            true => self.scan(projection, &self.order.reversed(), Some(last), options),
            false => {
                let window = sql::identifier(["__window"]);
                sql!(
                    "select * from (",
                    self.scan(projection, &self.order, self.window.final_limit(), options),
                    ") as ",
                    &window,
                    " order by ",
                    &window,
                    ".",
                    &position,
                    " desc limit ",
                    sql::integer(last)
                )
            }
        };

        let reversed = sql::identifier(["__reversed"]);
        let outer = columns
            .into_iter()
            .map(|(_, name)| (sql!(&reversed, ".", sql::identifier([name.as_str()])), name));
        sql!(
            "select ",
            Self::project(outer),
            " from (",
            rows,
            ") as ",
            &reversed,
            " order by ",
            &reversed,
            ".",
            position
        )
    }
}

impl QueryBuilder for SelectBuilder {
    fn table_expression(&self) -> Fragment {
        self.table.clone()
    }

    fn table_alias(&self) -> Fragment {
        self.alias.clone()
    }

    fn build_where_clause(&self, include_lower_bound: bool, include_upper_bound: bool, options: &BuildOptions) -> Fragment {
        let mut clauses = self.filters.clone();
        if include_lower_bound {
            clauses.extend(self.bounds.lower.iter().cloned());
        }
        if include_upper_bound {
            clauses.extend(self.bounds.upper.iter().cloned());
        }
        let clause = and_all(clauses);
        match options.add_null_case {
            true => sql!("((", &self.alias, " is null) or ", clause, ")"),
            false => clause,
        }
    }

    fn build_where_bound_clause(&self, direction: CursorDirection) -> Fragment {
        self.bounds.clause(direction)
    }

    fn order(&self) -> &OrderSpec {
        &self.order
    }

    fn select_cursor(&mut self, cursor: Fragment) {
        self.cursor = Some(cursor);
    }

    fn cursor_expression(&self) -> Option<Fragment> {
        self.cursor.clone()
    }

    fn where_bound(&mut self, condition: Fragment, direction: CursorDirection) {
        self.bounds.push(condition, direction);
    }

    fn bounds(&self) -> &BoundClause {
        &self.bounds
    }

    fn offset(&mut self, offset: u64) {
        self.window.add_offset(offset);
    }

    fn limit(&mut self, limit: u64) {
        self.window.limit(limit);
    }

    fn last(&mut self, count: u64) {
        self.window.keep_last(count);
    }

    fn select_fields_count(&self) -> usize {
        self.fields.len()
    }

    fn final_limit(&self) -> Option<u64> {
        self.window.final_limit()
    }

    fn final_last(&self) -> Option<u64> {
        self.window.final_last()
    }

    fn final_offset(&self) -> Option<u64> {
        self.window.final_offset()
    }

    fn build(&self, options: &BuildOptions) -> Fragment {
        let mut query = self.rows(options);

        if options.as_json_aggregate {
            let rows = sql::identifier(["__rows"]);
            let element = match options.as_json {
                true => sql!(&rows, ".", sql::identifier([JSON_COLUMN])),
                false => sql!("to_json(", &rows, ")"),
            };
            query = sql!(
                "select coalesce(json_agg(",
                element,
                "), '[]'::json) from (",
                query,
                ") as ",
                rows
            );
        }

        query
    }
}

pub(crate) fn cursor_column() -> Fragment {
    sql::identifier([CURSOR_COLUMN])
}

pub(crate) fn json_column() -> Fragment {
    sql::identifier([JSON_COLUMN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;
    use ::pretty_assertions::assert_eq;

    fn users() -> SelectBuilder {
        SelectBuilder::new(sql::identifier(["app", "users"]), sql::identifier(["u"]))
            .select(sql::raw(r#""u"."name""#), "name")
            .filter(sql::raw(r#""u"."active""#))
            .order_by(
                OrderSpec::new()
                    .then(sql::raw(r#""u"."id""#), Direction::Ascending)
                    .unique(true),
            )
    }

    #[test]
    fn builds_plain_select() {
        let mut builder = users();
        builder.limit(10);
        builder.offset(2);
        assert_eq!(
            builder.build(&BuildOptions::default()).compile().sql,
            r#"select "u"."name" as "name" from "app"."users" as "u" where ("u"."active") order by "u"."id" asc limit 10 offset 2"#
        );
    }

    #[test]
    fn where_clause_includes_requested_bounds() {
        let mut builder = users();
        builder.where_bound(sql::raw("lower"), CursorDirection::Following);
        builder.where_bound(sql::raw("upper"), CursorDirection::Preceding);
        let options = BuildOptions::default();
        assert_eq!(builder.build_where_clause(true, false, &options).compile().sql, r#"("u"."active") and (lower)"#);
        assert_eq!(builder.build_where_clause(false, true, &options).compile().sql, r#"("u"."active") and (upper)"#);
        assert_eq!(builder.build_where_clause(false, false, &options).compile().sql, r#"("u"."active")"#);
        assert_eq!(builder.build_where_bound_clause(CursorDirection::Following).compile().sql, "(lower)");
    }

    #[test]
    fn unbounded_side_is_true() {
        let builder = SelectBuilder::new(sql::raw("t"), sql::raw("a"));
        assert_eq!(builder.build_where_bound_clause(CursorDirection::Preceding).compile().sql, "true");
        assert_eq!(builder.build_where_clause(true, true, &BuildOptions::default()).compile().sql, "true");
        assert!(!builder.bounds().is_bound(CursorDirection::Preceding));
    }

    #[test]
    fn last_reads_backwards_and_restores_order_by_position() {
        let mut builder = users();
        builder.last(3);
        assert_eq!(builder.final_last(), Some(3));
        assert_eq!(builder.final_limit(), None);
        assert_eq!(
            builder.build(&BuildOptions::default()).compile().sql,
            r#"select "__reversed"."name" as "name" from (select "u"."name" as "name", row_number() over (order by "u"."id" asc) as "__position" from "app"."users" as "u" where ("u"."active") order by "u"."id" desc limit 3) as "__reversed" order by "__reversed"."__position""#
        );
    }

    #[test]
    fn last_trims_a_limited_window() {
        let mut builder = users();
        builder.limit(5);
        builder.last(2);
        builder.select_cursor(sql::raw("c"));
        assert_eq!(
            builder.build(&BuildOptions::default()).compile().sql,
            r#"select "__reversed"."name" as "name", "__reversed"."__cursor" as "__cursor" from (select * from (select "u"."name" as "name", c as "__cursor", row_number() over (order by "u"."id" asc) as "__position" from "app"."users" as "u" where ("u"."active") order by "u"."id" asc limit 5) as "__window" order by "__window"."__position" desc limit 2) as "__reversed" order by "__reversed"."__position""#
        );
    }

    #[test]
    fn last_over_natural_order_trims_the_forward_window() {
        let mut builder = SelectBuilder::new(sql::raw("t"), sql::raw("a"))
            .order_by(OrderSpec::new().then(sql::raw("a.name"), Direction::Ascending));
        builder.offset(4);
        builder.last(2);
        assert_eq!(
            builder.build(&BuildOptions::default()).compile().sql,
            r#"select 1 from (select * from (select 1, row_number() over (order by a.name asc) as "__position" from t as a where true order by a.name asc offset 4) as "__window" order by "__window"."__position" desc limit 2) as "__reversed" order by "__reversed"."__position""#
        );
    }

    #[test]
    fn json_projection_with_null_case_and_aggregate() {
        let mut builder = users();
        builder.select_cursor(sql::raw("c"));
        let options = BuildOptions {
            as_json: true,
            as_json_aggregate: true,
            only_json_field: false,
            add_null_case: true,
        };
        assert_eq!(
            builder.build(&options).compile().sql,
            r#"select coalesce(json_agg("__rows"."value"), '[]'::json) from (select case when ("u" is null) then null else json_build_object('name', "u"."name") end as "value", c as "__cursor" from "app"."users" as "u" where (("u" is null) or ("u"."active")) order by "u"."id" asc) as "__rows""#
        );
    }

    #[test]
    fn only_json_field_drops_cursor_column() {
        let mut builder = users();
        builder.select_cursor(sql::raw("c"));
        let options = BuildOptions {
            as_json: true,
            only_json_field: true,
            ..Default::default()
        };
        let sql = builder.build(&options).compile().sql;
        assert!(sql.starts_with(r#"select json_build_object('name', "u"."name") as "value" from"#), "{sql}");
    }

    #[test]
    fn builder_without_fields_selects_constant() {
        let builder = SelectBuilder::new(sql::raw("t"), sql::raw("a"));
        assert_eq!(builder.select_fields_count(), 0);
        assert_eq!(builder.build(&BuildOptions::default()).compile().sql, "select 1 from t as a where true");
    }
}
