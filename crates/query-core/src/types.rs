//! Aggregation query model
//!
//! The structured form of a query as the gateway hands it to the backend.
//! Everything except [`QueryContext`] affects the computed result.

use crate::error::{QueryError, Result};
use crate::interval::Interval;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    GroupBy,
    Timeseries,
    TopN,
}

/// Where the backend reads data from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataSource {
    Table { name: String },
    Union { names: Vec<String> },
}

impl DataSource {
    pub fn table(name: impl Into<String>) -> Self {
        DataSource::Table { name: name.into() }
    }

    /// All physical table names this data source reads
    pub fn table_names(&self) -> Vec<&str> {
        match self {
            DataSource::Table { name } => vec![name.as_str()],
            DataSource::Union { names } => names.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for DataSource {
    fn from(name: &str) -> Self {
        DataSource::table(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Granularity {
    All,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationKind {
    Count,
    LongSum,
    DoubleSum,
    LongMin,
    LongMax,
    DoubleMin,
    DoubleMax,
    LongLast,
    Cardinality,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    #[serde(rename = "type")]
    pub kind: AggregationKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

impl Aggregation {
    pub fn new(kind: AggregationKind, name: impl Into<String>, field_name: Option<&str>) -> Self {
        Self {
            kind,
            name: name.into(),
            field_name: field_name.map(str::to_string),
        }
    }

    pub fn count(name: impl Into<String>) -> Self {
        Self::new(AggregationKind::Count, name, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticFn {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
}

/// Expressions evaluated over aggregated values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PostAggregation {
    #[serde(rename_all = "camelCase")]
    Arithmetic {
        name: String,
        #[serde(rename = "fn")]
        function: ArithmeticFn,
        fields: Vec<PostAggregation>,
    },
    #[serde(rename_all = "camelCase")]
    FieldAccess { name: String, field_name: String },
    Constant {
        name: String,
        #[serde(serialize_with = "serialize_finite")]
        value: f64,
    },
}

/// NaN and the infinities have no canonical JSON form, so they fail to serialize
fn serialize_finite<S: Serializer>(
    value: &f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(serde::ser::Error::custom(format!(
            "non-finite float {} cannot be serialized",
            value
        )));
    }
    serializer.serialize_f64(*value)
}

/// Row filters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Filter {
    Selector {
        dimension: String,
        value: String,
    },
    In {
        dimension: String,
        values: Vec<String>,
    },
    Bound {
        dimension: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lower: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upper: Option<String>,
    },
    And {
        fields: Vec<Filter>,
    },
    Or {
        fields: Vec<Filter>,
    },
    Not {
        field: Box<Filter>,
    },
}

impl Filter {
    pub fn selector(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Selector {
            dimension: dimension.into(),
            value: value.into(),
        }
    }
}

/// Per-request bookkeeping (trace ids, debug flags, priorities)
///
/// Carried to the backend but never part of a query's identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryContext(BTreeMap<String, Value>);

impl QueryContext {
    pub const QUERY_ID: &'static str = "queryId";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn query_id(&self) -> Option<&str> {
        self.0.get(Self::QUERY_ID).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An aggregation query against a columnar backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationQuery {
    pub query_type: QueryType,
    pub data_source: DataSource,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub post_aggregations: Vec<PostAggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    pub granularity: Granularity,
    pub intervals: Vec<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default)]
    pub context: QueryContext,
}

impl AggregationQuery {
    pub fn builder(
        query_type: QueryType,
        data_source: impl Into<DataSource>,
    ) -> AggregationQueryBuilder {
        AggregationQueryBuilder::new(query_type, data_source.into())
    }

    /// Check structural constraints the backend relies on
    pub fn validate(&self) -> Result<()> {
        if self.intervals.is_empty() {
            return Err(QueryError::InvalidQuery(
                "query must cover at least one interval".to_string(),
            ));
        }
        if self.data_source.table_names().is_empty() {
            return Err(QueryError::InvalidQuery(
                "data source names no tables".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for name in self.aggregations.iter().map(|a| a.name.as_str()) {
            if !names.insert(name) {
                return Err(QueryError::InvalidQuery(format!(
                    "duplicate aggregation name '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Copy of this query carrying a different context
    pub fn with_context(&self, context: QueryContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    pub fn query_id(&self) -> Option<&str> {
        self.context.query_id()
    }
}

/// Builder for [`AggregationQuery`]
#[derive(Debug, Clone)]
pub struct AggregationQueryBuilder {
    query: AggregationQuery,
}

impl AggregationQueryBuilder {
    fn new(query_type: QueryType, data_source: DataSource) -> Self {
        Self {
            query: AggregationQuery {
                query_type,
                data_source,
                dimensions: Vec::new(),
                aggregations: Vec::new(),
                post_aggregations: Vec::new(),
                filter: None,
                granularity: Granularity::All,
                intervals: Vec::new(),
                limit: None,
                context: QueryContext::new(),
            },
        }
    }

    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.query.dimensions.push(dimension.into());
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.query.aggregations.push(aggregation);
        self
    }

    pub fn post_aggregation(mut self, post_aggregation: PostAggregation) -> Self {
        self.query.post_aggregations.push(post_aggregation);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.query.granularity = granularity;
        self
    }

    pub fn interval(mut self, interval: Interval) -> Self {
        self.query.intervals.push(interval);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.context.insert(key, value);
        self
    }

    pub fn build(self) -> Result<AggregationQuery> {
        self.query.validate()?;
        Ok(self.query)
    }
}
