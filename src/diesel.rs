//! Runs compiled plans through diesel.
//!
//! Raw text, identifiers and binds are replayed onto diesel's `AstPass`, so
//! placeholders and identifier quoting follow the connection's backend.

use crate::sql::{Fragment, Node};
use crate::Value;
use ::chrono::NaiveDateTime;
use ::diesel::backend::Backend;
use ::diesel::query_builder::*;
use ::diesel::serialize::ToSql;
use ::diesel::sql_types::{BigInt, Bool, Double, HasSqlType, Text, Timestamp, Untyped};
use ::diesel::{Connection, QueryResult, RunQueryDsl};

#[derive(Clone, Debug, PartialEq)]
enum Piece {
    Sql(String),
    Identifier(Vec<String>),
    Bind(Bind),
}

#[derive(Clone, Debug, PartialEq)]
enum Bind {
    Null,
    Bool(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl From<&Value> for Bind {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(value) => Self::Bool(*value),
            Value::Int(value) => Self::BigInt(*value),
            Value::Float(value) => Self::Double(*value),
            Value::Text(value) => Self::Text(value.clone()),
            Value::Timestamp(value) => Self::Timestamp(*value),
            Value::Json(value) => Self::Text(value.to_string()),
        }
    }
}

/// A compiled plan ready to be loaded with `RunQueryDsl`, rows are read
/// through `QueryableByName`.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanQuery {
    pieces: Vec<Piece>,
}

impl From<&Fragment> for PlanQuery {
    fn from(fragment: &Fragment) -> Self {
        let pieces = fragment
            .nodes()
            .iter()
            .map(|node| match node {
                Node::Raw(raw) => Piece::Sql(raw.to_string()),
                Node::Identifier(parts) => Piece::Identifier(parts.clone()),
                Node::Alias(alias) => Piece::Identifier(vec![alias.name()]),
                Node::Value(value) => Piece::Bind(value.into()),
            })
            .collect();
        Self { pieces }
    }
}

impl From<Fragment> for PlanQuery {
    fn from(fragment: Fragment) -> Self {
        Self::from(&fragment)
    }
}

impl<DB> QueryFragment<DB> for PlanQuery
where
    DB: Backend + HasSqlType<Bool> + HasSqlType<BigInt> + HasSqlType<Double> + HasSqlType<Text> + HasSqlType<Timestamp>,
    bool: ToSql<Bool, DB>,
    i64: ToSql<BigInt, DB>,
    f64: ToSql<Double, DB>,
    str: ToSql<Text, DB>,
    NaiveDateTime: ToSql<Timestamp, DB>,
{
    fn walk_ast<'b>(&'b self, mut pass: AstPass<'_, 'b, DB>) -> QueryResult<()> {
        pass.unsafe_to_cache_prepared();

        for piece in &self.pieces {
            match piece {
                Piece::Sql(sql) => pass.push_sql(sql),
                Piece::Identifier(parts) => {
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            pass.push_sql(".");
                        }
                        pass.push_identifier(part)?;
                    }
                }
                Piece::Bind(bind) => match bind {
                    Bind::Null => pass.push_sql("null"),
                    Bind::Bool(value) => pass.push_bind_param::<Bool, _>(value)?,
                    Bind::BigInt(value) => pass.push_bind_param::<BigInt, _>(value)?,
                    Bind::Double(value) => pass.push_bind_param::<Double, _>(value)?,
                    Bind::Text(value) => pass.push_bind_param::<Text, str>(value.as_str())?,
                    Bind::Timestamp(value) => pass.push_bind_param::<Timestamp, _>(value)?,
                },
            }
        }

        Ok(())
    }
}

impl QueryId for PlanQuery {
    type QueryId = ();

    const HAS_STATIC_QUERY_ID: bool = false;
}

// Query impl also produces auto-impl of AsQuery
impl Query for PlanQuery {
    type SqlType = Untyped;
}

impl<C: Connection> RunQueryDsl<C> for PlanQuery {}
