// SPDX-License-Identifier: Apache-2.0

//! Concept and datasource types for the modeling language

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::types::Dialect;

/// Namespace for declarations made outside any alias.
pub const DEFAULT_NAMESPACE: &str = "local";

/// Semantic type of a concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Float,
    Numeric,
    String,
    Bool,
    Date,
    Datetime,
    Timestamp,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Numeric => "numeric",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "numeric" => Ok(DataType::Numeric),
            "string" => Ok(DataType::String),
            "bool" | "boolean" => Ok(DataType::Bool),
            "date" => Ok(DataType::Date),
            "datetime" => Ok(DataType::Datetime),
            "timestamp" => Ok(DataType::Timestamp),
            other => Err(format!("unknown type '{other}'")),
        }
    }
}

/// Role a concept plays in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Key,
    Property,
    Metric,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(Aggregate::Count),
            "count_distinct" => Some(Aggregate::CountDistinct),
            "sum" => Some(Aggregate::Sum),
            "avg" => Some(Aggregate::Avg),
            "min" => Some(Aggregate::Min),
            "max" => Some(Aggregate::Max),
            _ => None,
        }
    }

    /// Type produced when aggregating an input of type `input`.
    pub fn output_type(&self, input: DataType) -> DataType {
        match self {
            Aggregate::Count | Aggregate::CountDistinct => DataType::Int,
            Aggregate::Avg => DataType::Float,
            Aggregate::Sum | Aggregate::Min | Aggregate::Max => input,
        }
    }

    pub fn render(&self, expr: &str) -> String {
        match self {
            Aggregate::Count => format!("COUNT({expr})"),
            Aggregate::CountDistinct => format!("COUNT(DISTINCT {expr})"),
            Aggregate::Sum => format!("SUM({expr})"),
            Aggregate::Avg => format!("AVG({expr})"),
            Aggregate::Min => format!("MIN({expr})"),
            Aggregate::Max => format!("MAX({expr})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn datatype(&self) -> DataType {
        match self {
            Literal::Bool(_) => DataType::Bool,
            Literal::Int(_) => DataType::Int,
            Literal::Float(_) => DataType::Float,
            Literal::String(_) => DataType::String,
        }
    }

    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            // SQL Server has no boolean literals
            Literal::Bool(b) if dialect == Dialect::SqlServer => {
                (if *b { "1" } else { "0" }).to_string()
            }
            Literal::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => format!("{f:?}"),
            Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// How a concept is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lineage {
    Root,
    Keyed { key: String },
    Aggregate { function: Aggregate, input: String },
    Constant { value: Literal },
}

/// A typed, purpose-tagged field a connection exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub namespace: String,
    pub datatype: DataType,
    pub purpose: Purpose,
    pub lineage: Lineage,
}

impl Concept {
    pub fn address(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Output column name for compiled queries.
    ///
    /// `baz` in the default namespace stays `baz`; `bar` in namespace
    /// `foo` becomes `foo_bar`.
    pub fn display_name(&self) -> String {
        if self.namespace == DEFAULT_NAMESPACE {
            self.name.replace('.', "_")
        } else {
            self.address().replace('.', "_")
        }
    }

    pub fn is_private(&self) -> bool {
        self.name.starts_with('_')
    }

    /// Address of the concept a physical column must be bound to for this
    /// concept to be computable.
    pub fn binding_address(&self) -> Option<String> {
        match &self.lineage {
            Lineage::Constant { .. } => None,
            Lineage::Aggregate { input, .. } => Some(input.clone()),
            Lineage::Root | Lineage::Keyed { .. } => Some(self.address()),
        }
    }
}

/// Physical column → concept mapping inside a datasource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBinding {
    pub column: String,
    pub concept: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceSource {
    /// Dotted table address, e.g. `project.dataset.table`
    Address(Vec<String>),
    /// Inline SQL used as a derived table
    Query(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datasource {
    pub name: String,
    pub namespace: String,
    pub columns: Vec<ColumnBinding>,
    pub source: DatasourceSource,
}

impl Datasource {
    pub fn column_for(&self, concept_address: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|binding| binding.concept == concept_address)
            .map(|binding| binding.column.as_str())
    }
}
