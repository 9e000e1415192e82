use crate::builder::json_column;
use crate::comparator::CursorComparator;
use crate::page_info::{page_exists_beyond, ExistenceInputs};
use crate::sql::{self, Alias, AliasGenerator, Fragment};
use crate::{
    pagination_max_count, BuildOptions, CursorDirection, CursorValue, OrderSpec, PaginationMode, PaginationRequest,
    QueryBuilder, Result, Value,
};

static DATA_KEY: &str = "data";
static HAS_NEXT_PAGE_KEY: &str = "hasNextPage";
static HAS_PREVIOUS_PAGE_KEY: &str = "hasPreviousPage";
static TOTAL_COUNT_KEY: &str = "totalCount";
static NATURAL_TAG: &str = "natural";

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CompileOptions {
    /// Run the full pipeline and return one structured json value.
    pub with_pagination: bool,
    /// Run the full pipeline and return each requested field as its own column.
    pub with_pagination_as_fields: bool,
    pub calculate_has_next_page: bool,
    pub calculate_has_previous_page: bool,
    pub calculate_total_count: bool,
    /// Prepended to every relative cursor; cursors with another prefix match nothing.
    pub cursor_prefix: Vec<Value>,
    pub build: BuildOptions,
}

impl CompileOptions {
    pub fn wants_pagination(&self) -> bool {
        self.with_pagination || self.with_pagination_as_fields
    }
}

/// The pagination intent for one row query.
///
/// Created once the order is known, before any cursor is decoded; cursors are
/// then installed through [`PaginationPlan::apply_cursor`].
#[derive(Clone, Debug)]
pub struct PaginationPlan {
    mode: PaginationMode,
    comparator: CursorComparator,
}

impl PaginationPlan {
    pub fn new(builder: &mut dyn QueryBuilder, request: &PaginationRequest, cursor_prefix: Vec<Value>) -> Result<Self> {
        request.validate(pagination_max_count())?;

        let order = builder.order().clone();
        let mode = PaginationMode::classify(&order, request)?;

        builder.select_cursor(cursor_expression(&order, &cursor_prefix));
        Ok(Self {
            mode,
            comparator: CursorComparator::new(order, cursor_prefix),
        })
    }

    pub fn mode(&self) -> PaginationMode {
        self.mode
    }

    pub fn apply_cursor(
        &self,
        builder: &mut dyn QueryBuilder,
        cursor: &CursorValue,
        direction: CursorDirection,
    ) -> Result<()> {
        self.comparator.apply(builder, cursor, direction)
    }

    /// Installs the request's offset, cursors and page size.
    ///
    /// The offset goes first so a natural `before` cursor can stop relative to
    /// it. `first` caps the window and `last` keeps the tail of that window.
    pub fn apply_request(&self, builder: &mut dyn QueryBuilder, request: &PaginationRequest) -> Result<()> {
        if let Some(offset) = request.offset {
            builder.offset(offset as u64);
        }
        if let Some(after) = request.after.as_ref() {
            self.apply_cursor(builder, after, CursorDirection::Following)?;
        }
        if let Some(before) = request.before.as_ref() {
            self.apply_cursor(builder, before, CursorDirection::Preceding)?;
        }
        if let Some(first) = request.first {
            builder.limit(first as u64);
        }
        if let Some(last) = request.last {
            builder.last(last as u64);
        }
        Ok(())
    }

    /// Composes the page, its page info and the total count into one query.
    pub fn assemble(&self, builder: &dyn QueryBuilder, options: &CompileOptions, aliases: &mut AliasGenerator) -> Fragment {
        let row_options = BuildOptions {
            as_json_aggregate: false,
            only_json_field: false,
            ..options.build
        };
        let query = builder.build(&row_options);
        let page = aliases.fresh("page");
        let summary = aliases.fresh("summary");
        let have_fields = builder.select_fields_count() > 0;

        let mut fields = Vec::<(Fragment, &'static str)>::new();
        if have_fields {
            fields.push((
                sql!(
                    "coalesce((select ",
                    summary,
                    ".",
                    sql::identifier([DATA_KEY]),
                    " from ",
                    summary,
                    "), '[]'::json)"
                ),
                DATA_KEY,
            ));
        }

        let (has_next_page, has_previous_page) = self.page_info(builder, page, &options.build);
        if options.calculate_has_next_page {
            fields.push((has_next_page, HAS_NEXT_PAGE_KEY));
        }
        if options.calculate_has_previous_page {
            fields.push((has_previous_page, HAS_PREVIOUS_PAGE_KEY));
        }
        if options.calculate_total_count {
            fields.push((
                sql!(
                    "(select count(*) from ",
                    builder.table_expression(),
                    " as ",
                    builder.table_alias(),
                    " where ",
                    builder.build_where_clause(false, false, &options.build),
                    ")::integer"
                ),
                TOTAL_COUNT_KEY,
            ));
        }

        let mut with = sql!("with ", page, " as (", query, ")");
        if have_fields {
            let element = match options.build.as_json {
                true => sql!(page, ".", json_column()),
                false => sql!("to_json(", page, ")"),
            };
            with.push(sql!(
                ", ",
                summary,
                " as (select json_agg(",
                element,
                ") as ",
                sql::identifier([DATA_KEY]),
                " from ",
                page,
                ")"
            ));
        }

        let select = match options.with_pagination_as_fields {
            true => sql::join(
                fields
                    .into_iter()
                    .map(|(expression, key)| sql!(expression, " as ", sql::identifier([key]))),
                ", ",
            ),
            false => sql!(
                "json_build_object(",
                sql::join(
                    fields
                        .into_iter()
                        .map(|(expression, key)| sql!(sql::text(key), ", ", expression)),
                    ", "
                ),
                ") as ",
                json_column()
            ),
        };

        sql!(with, " select ", select)
    }

    fn page_info(&self, builder: &dyn QueryBuilder, page: Alias, options: &BuildOptions) -> (Fragment, Fragment) {
        let window_limit = builder.final_limit();
        let last = builder.final_last();
        if window_limit == Some(0) || last == Some(0) {
            return (sql::literal(false), sql::literal(false));
        }

        let can_have_cursor_in_where = builder.order().supports_keyset();
        let offset = builder.final_offset().unwrap_or_default();
        let bounds = builder.bounds();

        let next = ExistenceInputs {
            can_have_cursor_in_where,
            query_has_opposite_bound: bounds.is_bound(CursorDirection::Preceding),
            query_has_limit_on_this_side: window_limit.is_some(),
            offset,
            window_limit,
            last,
            invert: false,
        };
        let previous = ExistenceInputs {
            can_have_cursor_in_where,
            query_has_opposite_bound: bounds.is_bound(CursorDirection::Following),
            query_has_limit_on_this_side: last.is_some(),
            offset,
            window_limit,
            last,
            invert: true,
        };

        (
            page_exists_beyond(builder, page, &next, options),
            page_exists_beyond(builder, page, &previous, options),
        )
    }
}

/// The per-row cursor: `[prefix..., [order values...]]` for a unique order,
/// otherwise `["natural", position]` with 1-based positions in query order.
fn cursor_expression(order: &OrderSpec, prefix: &[Value]) -> Fragment {
    if order.supports_keyset() {
        let values = sql!(
            "json_build_array(",
            sql::join(order.entries().iter().map(|entry| entry.expression.clone()), ", "),
            ")"
        );
        let items = prefix.iter().cloned().map(sql::value).chain(std::iter::once(values));
        sql!("json_build_array(", sql::join(items, ", "), ")")
    } else {
        let window = match order.is_empty() {
            true => sql::blank(),
            false => sql!("order by ", order.to_clause()),
        };
        sql!(
            "json_build_array(",
            sql::text(NATURAL_TAG),
            ", row_number() over (",
            window,
            "))"
        )
    }
}

/// Compiles a row query and pagination request into one executable plan.
///
/// Without `with_pagination` / `with_pagination_as_fields` only the bounded row
/// query is returned, and a request with no pagination at all returns the
/// collaborator's row query as is. The caller's builder is never mutated.
pub fn compile(builder: &dyn QueryBuilder, request: &PaginationRequest, options: &CompileOptions) -> Result<Fragment> {
    compile_with_aliases(builder, request, options, &mut AliasGenerator::new())
}

pub fn compile_with_aliases(
    builder: &dyn QueryBuilder,
    request: &PaginationRequest,
    options: &CompileOptions,
    aliases: &mut AliasGenerator,
) -> Result<Fragment> {
    if !options.wants_pagination() && !request.uses_cursor_features() && request.offset.is_none() {
        return Ok(builder.build(&options.build));
    }

    let mut builder = dyn_clone::clone_box(builder);
    let plan = PaginationPlan::new(builder.as_mut(), request, options.cursor_prefix.clone())?;
    plan.apply_request(builder.as_mut(), request)?;
    if !options.wants_pagination() {
        return Ok(builder.build(&options.build));
    }
    Ok(plan.assemble(builder.as_ref(), options, aliases))
}
