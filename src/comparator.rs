use crate::offset::natural_limit_before;
use crate::sql::{self, Fragment};
use crate::{CursorDirection, CursorValue, Direction, Error, OrderSpec, QueryBuilder, Result, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparison {
    GreaterThan,
    LessThan,
}

impl Comparison {
    fn for_entry(direction: Direction, cursor: CursorDirection) -> Self {
        match direction.is_ascending() == cursor.is_after() {
            true => Self::GreaterThan,
            false => Self::LessThan,
        }
    }

    fn operator(self) -> Fragment {
        match self {
            Self::GreaterThan => sql::raw(" > "),
            Self::LessThan => sql::raw(" < "),
        }
    }
}

/// Lexicographic keyset condition over the order entries.
///
/// Each step reads `(entry OP value) or (entry = value and rest)`, with the
/// most significant entry outermost and `False` innermost.
#[derive(Clone, Debug, PartialEq)]
pub enum KeysetPredicate {
    False,
    Step {
        entry: usize,
        comparison: Comparison,
        value: Value,
        rest: Box<KeysetPredicate>,
    },
}

impl KeysetPredicate {
    pub fn build(order: &OrderSpec, values: &[Value], direction: CursorDirection) -> Self {
        let mut predicate = Self::False;
        // least significant first, so the first entry ends up outermost
        for (index, (entry, value)) in order.entries().iter().zip(values).enumerate().rev() {
            predicate = Self::Step {
                entry: index,
                comparison: Comparison::for_entry(entry.direction, direction),
                value: value.clone(),
                rest: Box::new(predicate),
            };
        }
        predicate
    }

    /// Renders the condition. The innermost `or (x = v and false)` step is
    /// elided, so a single entry renders as just `(x OP v)`.
    pub fn to_fragment(&self, order: &OrderSpec) -> Fragment {
        match self {
            Self::False => sql::literal(false),
            Self::Step {
                entry,
                comparison,
                value,
                rest,
            } => {
                let expression = &order.entries()[*entry].expression;
                let strict = sql!("(", expression, comparison.operator(), sql::value(value.clone()), ")");
                match **rest {
                    Self::False => strict,
                    _ => sql!(
                        "(",
                        strict,
                        " or (",
                        expression,
                        " = ",
                        sql::value(value.clone()),
                        " and ",
                        rest.to_fragment(order),
                        "))"
                    ),
                }
            }
        }
    }

    /// Evaluates the condition against one row's order values.
    /// Comparisons between incomparable values (including nulls) and entries
    /// missing from a short row are false.
    pub fn evaluate(&self, row: &[Value]) -> bool {
        match self {
            Self::False => false,
            Self::Step {
                entry,
                comparison,
                value,
                rest,
            } => {
                use ::std::cmp::Ordering::*;
                match (row.get(*entry).and_then(|row| row.compare(value)), comparison) {
                    (Some(Greater), Comparison::GreaterThan) | (Some(Less), Comparison::LessThan) => true,
                    (Some(Equal), _) => rest.evaluate(row),
                    _ => false,
                }
            }
        }
    }
}

/// Turns a decoded cursor into a bound on the row query.
#[derive(Clone, Debug)]
pub struct CursorComparator {
    order: OrderSpec,
    prefix: Vec<Value>,
}

impl CursorComparator {
    pub fn new(order: OrderSpec, prefix: Vec<Value>) -> Self {
        Self { order, prefix }
    }

    pub fn apply(&self, builder: &mut dyn QueryBuilder, cursor: &CursorValue, direction: CursorDirection) -> Result<()> {
        if self.order.supports_keyset() {
            let condition = match self.keyset_values(cursor) {
                Some(values) => KeysetPredicate::build(&self.order, values, direction).to_fragment(&self.order),
                None => {
                    tracing::warn!(?direction, "cursor does not match the query order, bounding to no rows");
                    sql::literal(false)
                }
            };
            builder.where_bound(condition, direction);
            return Ok(());
        }

        match cursor {
            CursorValue::Natural(position) if *position >= 0 => {
                let position = *position as u64;
                match direction {
                    CursorDirection::Following => builder.offset(position),
                    CursorDirection::Preceding => {
                        let offset = builder.final_offset().unwrap_or_default();
                        builder.limit(natural_limit_before(position, offset));
                    }
                }
                Ok(())
            }
            _ => Err(Error::unsupported("cannot use cursors without an order")),
        }
    }

    fn keyset_values<'c>(&self, cursor: &'c CursorValue) -> Option<&'c [Value]> {
        match cursor {
            CursorValue::Relative { prefix, values } if *prefix == self.prefix && values.len() == self.order.len() => {
                Some(values)
            }
            _ => None,
        }
    }
}
