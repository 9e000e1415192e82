//! A small SQL fragment algebra.
//!
//! Fragments are built from raw text, bound [`Value`]s, quoted identifiers
//! and per-compilation [`Alias`]es, then compiled once into text with
//! positional `$n` placeholders plus the ordered list of binds.

use crate::Value;
use ::derivative::Derivative;
use ::either::Either::*;
use ::itertools::intersperse;
use ::std::borrow::Cow;
use ::std::fmt::Write;
use ::uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    nodes: Vec<Node>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Raw(Cow<'static, str>),
    Identifier(Vec<String>),
    Alias(Alias),
    Value(Value),
}

/// A generated relation/column name, unique to the [`AliasGenerator`] that produced it.
#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Eq, Hash, PartialEq)]
pub struct Alias {
    scope: u128,
    id: u32,
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    hint: &'static str,
}

impl Alias {
    pub fn name(&self) -> String {
        format!("__{}_{:032x}_{}", self.hint, self.scope, self.id)
    }
}

/// Hands out fresh aliases for one compilation.
///
/// Every generator takes a fresh v4 uuid as its scope, so plans compiled
/// separately and later nested inside each other never collide.
#[derive(Debug)]
pub struct AliasGenerator {
    scope: u128,
    next: u32,
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self::with_scope(Uuid::new_v4().as_u128())
    }

    pub fn with_scope(scope: u128) -> Self {
        Self { scope, next: 0 }
    }

    pub fn fresh(&mut self, hint: &'static str) -> Alias {
        let id = self.next;
        self.next += 1;
        Alias {
            scope: self.scope,
            id,
            hint,
        }
    }
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Fragment {
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|node| matches!(node, Node::Raw(raw) if raw.is_empty()))
    }

    pub fn push(&mut self, fragment: impl Into<Fragment>) {
        self.nodes.extend(fragment.into().nodes);
    }

    pub fn concat<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = Fragment>,
    {
        let mut out = Self::default();
        for fragment in fragments {
            out.nodes.extend(fragment.nodes);
        }
        out
    }

    #[cfg(feature = "diesel")]
    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn compile(&self) -> CompiledQuery {
        let mut sql = String::new();
        let mut binds = Vec::new();
        for node in &self.nodes {
            match node {
                Node::Raw(raw) => sql.push_str(raw),
                Node::Identifier(parts) => sql.push_str(&quote_identifier(parts)),
                Node::Alias(alias) => sql.push_str(&quote_identifier(&[alias.name()])),
                Node::Value(value) => {
                    binds.push(value.clone());
                    // writing to a String cannot fail
                    let _ = write!(sql, "${}", binds.len());
                }
            }
        }
        tracing::trace!(sql = %sql, binds = binds.len(), "compiled fragment");
        CompiledQuery { sql, binds }
    }
}

impl From<&'static str> for Fragment {
    fn from(raw: &'static str) -> Self {
        raw_fragment(Cow::Borrowed(raw))
    }
}

impl From<Alias> for Fragment {
    fn from(alias: Alias) -> Self {
        Self {
            nodes: vec![Node::Alias(alias)],
        }
    }
}

impl From<&Fragment> for Fragment {
    fn from(fragment: &Fragment) -> Self {
        fragment.clone()
    }
}

fn raw_fragment(raw: Cow<'static, str>) -> Fragment {
    Fragment {
        nodes: vec![Node::Raw(raw)],
    }
}

pub(crate) fn quote_identifier<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|part| format!("\"{}\"", part.as_ref().replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Concatenates anything convertible into a [`Fragment`].
///
/// String literals are inserted verbatim; use [`value`] for data.
#[macro_export]
macro_rules! sql {
    ($($part:expr),* $(,)?) => {
        $crate::sql::Fragment::concat([$($crate::sql::Fragment::from($part)),*])
    };
}

pub fn raw(raw: &'static str) -> Fragment {
    raw_fragment(Cow::Borrowed(raw))
}

pub fn blank() -> Fragment {
    Fragment::default()
}

pub fn null() -> Fragment {
    raw("null")
}

pub fn literal(value: bool) -> Fragment {
    raw(if value { "true" } else { "false" })
}

/// An integer inlined into the query text rather than bound.
pub fn integer(value: u64) -> Fragment {
    raw_fragment(Cow::Owned(value.to_string()))
}

/// A single-quoted string literal, used for json object keys.
pub fn text(value: &str) -> Fragment {
    raw_fragment(Cow::Owned(format!("'{}'", value.replace('\'', "''"))))
}

pub fn value(value: impl Into<Value>) -> Fragment {
    Fragment {
        nodes: vec![Node::Value(value.into())],
    }
}

/// A quoted identifier; each segment is quoted separately and joined with `.`.
pub fn identifier<I, S>(parts: I) -> Fragment
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Fragment {
        nodes: vec![Node::Identifier(parts.into_iter().map(Into::into).collect())],
    }
}

pub fn join<I>(fragments: I, separator: &'static str) -> Fragment
where
    I: IntoIterator<Item = Fragment>,
{
    let mut out = Fragment::default();
    for item in intersperse(fragments.into_iter().map(Left), Right(())) {
        match item {
            Left(fragment) => out.push(fragment),
            Right(_) => out.push(raw(separator)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::pretty_assertions::assert_eq;

    #[test]
    fn compiles_placeholders_in_order() {
        let fragment = sql!("select ", value(1i64), " + ", value("two"), " as ", identifier(["x"]));
        let compiled = fragment.compile();
        assert_eq!(compiled.sql, r#"select $1 + $2 as "x""#);
        assert_eq!(compiled.binds, vec![Value::Int(1), Value::from("two")]);
    }

    #[test]
    fn quotes_identifiers_and_text() {
        let fragment = sql!(identifier(["app", "we\"ird"]), " = ", text("it's"));
        assert_eq!(fragment.compile().sql, r#""app"."we""ird" = 'it''s'"#);
    }

    #[test]
    fn joins_with_separator() {
        let fragment = join([raw("a"), raw("b"), raw("c")], ", ");
        assert_eq!(fragment.compile().sql, "a, b, c");
        assert!(join(Vec::new(), ", ").is_empty());
    }

    #[test]
    fn aliases_are_unique_per_generator() {
        let mut aliases = AliasGenerator::with_scope(0xabc);
        let first = aliases.fresh("page");
        let second = aliases.fresh("page");
        assert_ne!(first, second);
        assert_eq!(first.name(), "__page_00000000000000000000000000000abc_0");
        assert_eq!(second.name(), "__page_00000000000000000000000000000abc_1");

        let mut other = AliasGenerator::with_scope(0xdef);
        assert_ne!(other.fresh("page"), first);
    }

    #[test]
    fn fresh_generators_carry_the_whole_uuid() {
        let (mut lhs, mut rhs) = (AliasGenerator::new(), AliasGenerator::new());
        let (lhs, rhs) = (lhs.fresh("summary"), rhs.fresh("summary"));
        assert_ne!(lhs, rhs);
        let name = lhs.name();
        assert_eq!(name.len(), "__summary_".len() + 32 + "_0".len());
        assert!(name.len() <= 63, "postgres truncates identifiers past 63 bytes");
    }
}
