// SPDX-License-Identifier: Apache-2.0

//! Query compiler
//!
//! `QueryCompiler` is the seam between the execution pipeline and the
//! modeling language: `compile` turns query text into statement plans,
//! `render` turns one plan into dialect SQL. `ModelCompiler` is the
//! implementation shipped with the gateway.

use std::collections::HashSet;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::Dialect;
use crate::model::environment::Environment;
use crate::model::parser::{Comparison, Direction, Path, SelectStatement};
use crate::model::types::{Concept, Datasource, DatasourceSource, Lineage, Literal, Purpose};

/// One compiled query statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementPlan {
    /// Output columns, in select order.
    pub output_columns: Vec<Concept>,
    /// Row limit; `None` means unset.
    pub limit: Option<u64>,
    pub(crate) body: PlanBody,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PlanBody {
    pub(crate) datasource: Option<Datasource>,
    pub(crate) filters: Vec<(Concept, Comparison, Literal)>,
    pub(crate) order_by: Vec<(Concept, Direction)>,
}

impl StatementPlan {
    pub fn new(output_columns: Vec<Concept>, limit: Option<u64>) -> Self {
        Self {
            output_columns,
            limit,
            body: PlanBody::default(),
        }
    }
}

pub trait QueryCompiler: Send + Sync {
    /// Compiles query text against an environment into plans, in source
    /// order. Declarations in the text are visible to later statements of
    /// the same text only.
    fn compile(&self, text: &str, environment: &Environment) -> EngineResult<Vec<StatementPlan>>;

    /// Renders one plan as SQL for `dialect`.
    fn render(&self, plan: &StatementPlan, dialect: Dialect) -> EngineResult<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelCompiler;

impl ModelCompiler {
    pub fn new() -> Self {
        Self
    }

    fn plan(&self, environment: &Environment, select: SelectStatement) -> EngineResult<StatementPlan> {
        let scope = crate::model::types::DEFAULT_NAMESPACE;
        let resolve = |path: &Path| -> EngineResult<Concept> {
            environment
                .resolve(path, scope)
                .cloned()
                .map_err(|e| EngineError::compile_failure(e.to_string()))
        };

        let output_columns = select
            .items
            .iter()
            .map(&resolve)
            .collect::<EngineResult<Vec<Concept>>>()?;

        let mut filters = Vec::with_capacity(select.filters.len());
        for filter in &select.filters {
            let concept = resolve(&filter.concept)?;
            match concept.purpose {
                Purpose::Metric => {
                    return Err(EngineError::compile_failure(format!(
                        "metric '{}' cannot be used in a where clause",
                        concept.address()
                    )))
                }
                Purpose::Constant => {
                    return Err(EngineError::compile_failure(format!(
                        "constant '{}' cannot be used in a where clause",
                        concept.address()
                    )))
                }
                Purpose::Key | Purpose::Property => {}
            }
            filters.push((concept, filter.op, filter.value.clone()));
        }

        let mut order_by = Vec::with_capacity(select.order_by.len());
        for (path, direction) in &select.order_by {
            let concept = resolve(path)?;
            if !output_columns.iter().any(|c| c.address() == concept.address()) {
                return Err(EngineError::compile_failure(format!(
                    "order by '{}' must reference a selected concept",
                    concept.address()
                )));
            }
            order_by.push((concept, *direction));
        }

        let mut seen = HashSet::new();
        let required: Vec<String> = output_columns
            .iter()
            .chain(filters.iter().map(|(c, _, _)| c))
            .filter_map(Concept::binding_address)
            .filter(|address| seen.insert(address.clone()))
            .collect();

        let datasource = if required.is_empty() {
            None
        } else {
            let found = environment
                .datasources()
                .iter()
                .find(|ds| required.iter().all(|address| ds.column_for(address).is_some()))
                .cloned();
            match found {
                Some(ds) => Some(ds),
                None => {
                    return Err(EngineError::compile_failure(format!(
                        "no datasource binds all of: {}",
                        required.join(", ")
                    )))
                }
            }
        };

        Ok(StatementPlan {
            output_columns,
            limit: select.limit,
            body: PlanBody {
                datasource,
                filters,
                order_by,
            },
        })
    }
}

impl QueryCompiler for ModelCompiler {
    fn compile(&self, text: &str, environment: &Environment) -> EngineResult<Vec<StatementPlan>> {
        let mut scratch = environment.clone();
        let selects = scratch
            .parse(text, None)
            .map_err(|e| EngineError::compile_failure(e.to_string()))?;

        selects
            .into_iter()
            .map(|select| self.plan(&scratch, select))
            .collect()
    }

    fn render(&self, plan: &StatementPlan, dialect: Dialect) -> EngineResult<String> {
        let body = &plan.body;
        let alias = body.datasource.as_ref().map(|ds| ds.name.as_str());

        let column_ref = |concept: &Concept, address: &str| -> EngineResult<String> {
            let (Some(ds), Some(alias)) = (body.datasource.as_ref(), alias) else {
                return Err(EngineError::internal(format!(
                    "'{}' has no datasource",
                    concept.address()
                )));
            };
            let column = ds.column_for(address).ok_or_else(|| {
                EngineError::internal(format!("'{address}' is not bound by '{}'", ds.name))
            })?;
            Ok(format!(
                "{}.{}",
                quote_ident(dialect, alias),
                quote_ident(dialect, column)
            ))
        };

        let expression = |concept: &Concept| -> EngineResult<String> {
            match &concept.lineage {
                Lineage::Constant { value } => Ok(value.to_sql(dialect)),
                Lineage::Aggregate { function, input } => {
                    Ok(function.render(&column_ref(concept, input)?))
                }
                Lineage::Root | Lineage::Keyed { .. } => column_ref(concept, &concept.address()),
            }
        };

        let mut sql = String::from("SELECT ");
        if dialect == Dialect::SqlServer {
            if let Some(limit) = plan.limit {
                sql.push_str(&format!("TOP {limit} "));
            }
        }

        let projections = plan
            .output_columns
            .iter()
            .map(|c| {
                Ok(format!(
                    "{} AS {}",
                    expression(c)?,
                    quote_ident(dialect, &c.display_name())
                ))
            })
            .collect::<EngineResult<Vec<String>>>()?;
        sql.push_str(&projections.join(", "));

        if let (Some(ds), Some(alias)) = (body.datasource.as_ref(), alias) {
            let source = match &ds.source {
                DatasourceSource::Address(parts) => quote_path(dialect, parts),
                DatasourceSource::Query(query) => {
                    format!("({})", query.trim().trim_end_matches(';').trim_end())
                }
            };
            sql.push_str(&format!(" FROM {source} AS {}", quote_ident(dialect, alias)));
        }

        if !body.filters.is_empty() {
            let conditions = body
                .filters
                .iter()
                .map(|(concept, op, value)| {
                    Ok(format!(
                        "{} {} {}",
                        expression(concept)?,
                        op.as_sql(),
                        value.to_sql(dialect)
                    ))
                })
                .collect::<EngineResult<Vec<String>>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let has_metric = plan
            .output_columns
            .iter()
            .any(|c| c.purpose == Purpose::Metric);
        if has_metric {
            let groups = plan
                .output_columns
                .iter()
                .filter(|c| matches!(c.purpose, Purpose::Key | Purpose::Property))
                .map(&expression)
                .collect::<EngineResult<Vec<String>>>()?;
            if !groups.is_empty() {
                sql.push_str(" GROUP BY ");
                sql.push_str(&groups.join(", "));
            }
        }

        if !body.order_by.is_empty() {
            let orders: Vec<String> = body
                .order_by
                .iter()
                .map(|(concept, direction)| {
                    format!(
                        "{} {}",
                        quote_ident(dialect, &concept.display_name()),
                        direction.as_sql()
                    )
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if dialect != Dialect::SqlServer {
            if let Some(limit) = plan.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }

        Ok(sql)
    }
}

/// Quotes one identifier for `dialect`.
pub fn quote_ident(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::BigQuery => format!("`{}`", name.replace('`', "\\`")),
        Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
        _ => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Quotes a dotted table address. BigQuery takes the whole path in one
/// pair of backticks; everything else quotes per part.
fn quote_path(dialect: Dialect, parts: &[String]) -> String {
    match dialect {
        Dialect::BigQuery => quote_ident(dialect, &parts.join(".")),
        _ => parts
            .iter()
            .map(|part| quote_ident(dialect, part))
            .collect::<Vec<_>>()
            .join("."),
    }
}
