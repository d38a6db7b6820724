//! Canonical query serialization
//!
//! Two queries that differ only in field order, in context contents or in the
//! spelling of a number must produce the same [`CacheKey`]. The canonical form
//! is whitespace-free JSON with:
//!
//! - object keys sorted lexicographically at every level
//! - every omitted field (by default `context`) replaced by `{}` wherever it
//!   appears, keeping the key so the shape of the document is stable
//! - integral floats within ±2^53 written as integers, `-0.0` written as `0`,
//!   other floats in their shortest round-trip form
//!
//! Arrays keep their order. NaN and the infinities are serialization errors.

use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Field dropped from every key by default
pub const CONTEXT_FIELD: &str = "context";

/// Largest magnitude at which every integer is exactly representable as f64
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

const DEFAULT_MAX_DEPTH: usize = 128;

/// Derives cache keys from serializable queries
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    omitted_fields: BTreeSet<String>,
    max_depth: usize,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self {
            omitted_fields: BTreeSet::from([CONTEXT_FIELD.to_string()]),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also blank out `field` wherever it appears
    pub fn omit_field(mut self, field: impl Into<String>) -> Self {
        self.omitted_fields.insert(field.into());
        self
    }

    /// Set the nesting limit beyond which input is rejected
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn omitted_fields(&self) -> impl Iterator<Item = &str> {
        self.omitted_fields.iter().map(String::as_str)
    }

    /// Canonicalize any serializable query
    pub fn canonicalize<T: Serialize + ?Sized>(&self, query: &T) -> Result<CacheKey> {
        let tree = serde_json::to_value(query)?;
        self.canonicalize_value(&tree)
    }

    /// Canonicalize an already built JSON tree
    pub fn canonicalize_value(&self, tree: &Value) -> Result<CacheKey> {
        let mut out = String::with_capacity(256);
        self.write_value(tree, 0, &mut out)?;
        Ok(CacheKey::from_canonical(out))
    }

    fn write_value(&self, value: &Value, depth: usize, out: &mut String) -> Result<()> {
        if depth > self.max_depth {
            return Err(CacheError::Serialization(format!(
                "query nesting exceeds {} levels",
                self.max_depth
            )));
        }

        match value {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => write_number(n, out)?,
            Value::String(s) => write_string(s, out)?,
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_value(item, depth + 1, out)?;
                }
                out.push(']');
            }
            Value::Object(fields) => self.write_object(fields, depth, out)?,
        }
        Ok(())
    }

    fn write_object(
        &self,
        fields: &Map<String, Value>,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();

        out.push('{');
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_string(name, out)?;
            out.push(':');
            if self.omitted_fields.contains(name.as_str()) {
                out.push_str("{}");
            } else {
                self.write_value(&fields[name.as_str()], depth + 1, out)?;
            }
        }
        out.push('}');
        Ok(())
    }
}

fn write_string(s: &str, out: &mut String) -> Result<()> {
    out.push_str(&serde_json::to_string(s)?);
    Ok(())
}

fn write_number(n: &Number, out: &mut String) -> Result<()> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{}", i);
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{}", u);
        return Ok(());
    }

    let f = n
        .as_f64()
        .ok_or_else(|| CacheError::Serialization(format!("unrepresentable number {}", n)))?;
    if !f.is_finite() {
        return Err(CacheError::Serialization(format!("non-finite number {}", f)));
    }

    if f == 0.0 {
        out.push('0');
    } else if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT {
        let _ = write!(out, "{}", f as i64);
    } else {
        let _ = write!(out, "{}", n);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_core::{
        Aggregation, AggregationQuery, Filter, Granularity, Interval, PostAggregation, QueryType,
    };
    use serde_json::json;

    fn base_query() -> query_core::AggregationQueryBuilder {
        AggregationQuery::builder(QueryType::GroupBy, "wiki")
            .dimension("country")
            .aggregation(Aggregation::count("count"))
            .filter(Filter::selector("country", "US"))
            .granularity(Granularity::Day)
            .interval(Interval::parse("2020-01-01/2020-01-02").unwrap())
    }

    #[test]
    fn test_sorts_keys_and_strips_whitespace() {
        let c = Canonicalizer::new();
        let key = c
            .canonicalize_value(&json!({"b": 1, "a": {"d": [1, 2], "c": "x y"}}))
            .unwrap();
        assert_eq!(key.as_str(), r#"{"a":{"c":"x y","d":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_context_blanked_at_every_level() {
        let c = Canonicalizer::new();
        let key = c
            .canonicalize_value(&json!({
                "context": {"traceId": "abc"},
                "inner": {"context": {"debug": true}, "v": 1}
            }))
            .unwrap();
        assert_eq!(key.as_str(), r#"{"context":{},"inner":{"context":{},"v":1}}"#);
    }

    #[test]
    fn test_context_does_not_change_key() {
        let c = Canonicalizer::new();
        let q1 = base_query().context("traceId", "abc").build().unwrap();
        let q2 = base_query().context("traceId", "xyz").build().unwrap();
        let q3 = base_query().build().unwrap();

        let k1 = c.canonicalize(&q1).unwrap();
        assert_eq!(k1, c.canonicalize(&q2).unwrap());
        assert_eq!(k1, c.canonicalize(&q3).unwrap());
    }

    #[test]
    fn test_field_order_does_not_change_key() {
        let c = Canonicalizer::new();
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": {"p": true, "q": null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": {"q": null, "p": true}, "x": 1}"#).unwrap();
        assert_eq!(
            c.canonicalize_value(&a).unwrap(),
            c.canonicalize_value(&b).unwrap()
        );
    }

    #[test]
    fn test_relevant_fields_change_key() {
        let c = Canonicalizer::new();
        let base = c.canonicalize(&base_query().build().unwrap()).unwrap();

        let other_filter = base_query()
            .filter(Filter::selector("country", "CA"))
            .build()
            .unwrap();
        let other_interval = base_query()
            .interval(Interval::parse("2020-01-02/2020-01-03").unwrap())
            .build()
            .unwrap();
        let other_granularity = base_query().granularity(Granularity::Hour).build().unwrap();
        let other_dimension = base_query().dimension("page").build().unwrap();

        for query in [other_filter, other_interval, other_granularity, other_dimension] {
            assert_ne!(base, c.canonicalize(&query).unwrap());
        }
    }

    #[test]
    fn test_interval_spelling_does_not_change_key() {
        let c = Canonicalizer::new();
        let a = base_query().build().unwrap();
        let mut b = a.clone();
        b.intervals =
            vec![Interval::parse("2020-01-01T00:00:00Z/2020-01-02T00:00:00.000Z").unwrap()];
        assert_eq!(c.canonicalize(&a).unwrap(), c.canonicalize(&b).unwrap());
    }

    #[test]
    fn test_key_agrees_with_interval_equality() {
        let c = Canonicalizer::new();
        let q = |interval: &str| {
            let mut query = base_query().build().unwrap();
            query.intervals = vec![Interval::parse(interval).unwrap()];
            query
        };
        let a = q("2020-01-01T00:00:00.000100Z/2020-01-02");
        let b = q("2020-01-01T00:00:00.000900Z/2020-01-02");
        let d = q("2020-01-01T00:00:00.001Z/2020-01-02");

        assert_eq!(a, b);
        assert_eq!(c.canonicalize(&a).unwrap(), c.canonicalize(&b).unwrap());
        assert_ne!(a, d);
        assert_ne!(c.canonicalize(&a).unwrap(), c.canonicalize(&d).unwrap());
    }

    #[test]
    fn test_numbers_have_one_form() {
        let c = Canonicalizer::new();
        let int = c.canonicalize_value(&json!({"v": 2})).unwrap();
        let float = c.canonicalize_value(&json!({"v": 2.0})).unwrap();
        assert_eq!(int, float);

        let neg_zero = c.canonicalize_value(&json!({"v": -0.0})).unwrap();
        assert_eq!(neg_zero.as_str(), r#"{"v":0}"#);

        let frac = c.canonicalize_value(&json!({"v": 0.1})).unwrap();
        assert_eq!(frac.as_str(), r#"{"v":0.1}"#);
    }

    #[test]
    fn test_non_finite_constant_is_error() {
        let c = Canonicalizer::new();
        let query = base_query()
            .post_aggregation(PostAggregation::Constant {
                name: "inf".to_string(),
                value: f64::INFINITY,
            })
            .build()
            .unwrap();
        assert!(matches!(
            c.canonicalize(&query),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let c = Canonicalizer::new().with_max_depth(3);
        assert!(c.canonicalize_value(&json!({"a": {"b": 1}})).is_ok());
        assert!(c
            .canonicalize_value(&json!({"a": {"b": {"c": {"d": 1}}}}))
            .is_err());
    }

    #[test]
    fn test_extra_omitted_field() {
        let c = Canonicalizer::new().omit_field("priority");
        let a = c
            .canonicalize_value(&json!({"priority": 1, "v": 1}))
            .unwrap();
        let b = c
            .canonicalize_value(&json!({"priority": 9, "v": 1}))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"{"priority":{},"v":1}"#);
        assert_eq!(c.omitted_fields().count(), 2);
    }

    #[test]
    fn test_deterministic_across_calls() {
        let c = Canonicalizer::new();
        let query = base_query().context("traceId", "abc").build().unwrap();
        let keys: Vec<CacheKey> = (0..5).map(|_| c.canonicalize(&query).unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }
}
