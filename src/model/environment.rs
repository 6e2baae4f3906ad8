// SPDX-License-Identifier: Apache-2.0

//! Schema Environment
//!
//! In-memory catalog of the concepts and datasources one connection exposes.
//! `Clone` is a deep copy: templates in the model inventory are cloned into
//! each connection, and queries compile against a scratch clone, so nothing
//! ever writes back into a shared template.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::parser::{parse_statements, ParseError, Path, SelectStatement, SourceSpec, Statement};
use crate::model::types::{
    ColumnBinding, Concept, Datasource, DatasourceSource, Lineage, Purpose, DEFAULT_NAMESPACE,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    namespaces: BTreeSet<String>,
    /// Keyed by address (`namespace.name`)
    concepts: BTreeMap<String, Concept>,
    /// In declaration order; binding picks the first match.
    datasources: Vec<Datasource>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.datasources.is_empty()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    pub fn concepts(&self) -> impl Iterator<Item = (&str, &Concept)> {
        self.concepts.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn concept(&self, address: &str) -> Option<&Concept> {
        self.concepts.get(address)
    }

    pub fn datasources(&self) -> &[Datasource] {
        &self.datasources
    }

    /// Parses `text` and applies its declarations.
    ///
    /// Declarations land in `namespace` (or the default namespace). Names
    /// resolve in that namespace first, then in the default one. Either the
    /// whole text applies or none of it does. Select statements are
    /// returned in source order for the caller to compile.
    pub fn parse(
        &mut self,
        text: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<SelectStatement>, ParseError> {
        let namespace = namespace
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE);

        let statements = parse_statements(text)?;

        let mut staged = self.clone();
        staged.namespaces.insert(namespace.to_string());
        let mut selects = Vec::new();
        for statement in statements {
            if let Some(select) = staged.apply(statement, namespace)? {
                selects.push(select);
            }
        }

        *self = staged;
        Ok(selects)
    }

    fn apply(
        &mut self,
        statement: Statement,
        namespace: &str,
    ) -> Result<Option<SelectStatement>, ParseError> {
        match statement {
            Statement::Key { name, datatype } => {
                self.declare(&name, namespace, datatype, Purpose::Key, Lineage::Root);
            }
            Statement::Property {
                key,
                name,
                datatype,
            } => {
                let key = self.resolve(&key, namespace)?;
                if key.purpose != Purpose::Key && key.purpose != Purpose::Property {
                    return Err(ParseError::at(
                        &name,
                        format!("'{}' cannot key a property", key.address()),
                    ));
                }
                let lineage = Lineage::Keyed { key: key.address() };
                self.declare(&name, namespace, datatype, Purpose::Property, lineage);
            }
            Statement::Metric {
                name,
                function,
                input,
            } => {
                let input_concept = self.resolve(&input, namespace)?;
                if matches!(input_concept.purpose, Purpose::Metric | Purpose::Constant) {
                    return Err(ParseError::at(
                        &input,
                        format!("cannot aggregate '{}'", input_concept.address()),
                    ));
                }
                let datatype = function.output_type(input_concept.datatype);
                let lineage = Lineage::Aggregate {
                    function,
                    input: input_concept.address(),
                };
                self.declare(&name, namespace, datatype, Purpose::Metric, lineage);
            }
            Statement::Const { name, value } => {
                let datatype = value.datatype();
                self.declare(&name, namespace, datatype, Purpose::Constant, Lineage::Constant { value });
            }
            Statement::Datasource {
                name,
                columns,
                source,
            } => {
                let mut bindings = Vec::with_capacity(columns.len());
                for (column, path) in columns {
                    let concept = self.resolve(&path, namespace)?;
                    if matches!(concept.purpose, Purpose::Metric | Purpose::Constant) {
                        return Err(ParseError::at(
                            &path,
                            format!("'{}' cannot be bound to a column", concept.address()),
                        ));
                    }
                    bindings.push(ColumnBinding {
                        column,
                        concept: concept.address(),
                    });
                }
                let datasource = Datasource {
                    name: name.dotted(),
                    namespace: namespace.to_string(),
                    columns: bindings,
                    source: match source {
                        SourceSpec::Address(parts) => DatasourceSource::Address(parts),
                        SourceSpec::Query(sql) => DatasourceSource::Query(sql),
                    },
                };
                match self
                    .datasources
                    .iter_mut()
                    .find(|ds| ds.name == datasource.name && ds.namespace == datasource.namespace)
                {
                    Some(existing) => *existing = datasource,
                    None => self.datasources.push(datasource),
                }
            }
            Statement::Select(select) => return Ok(Some(select)),
        }
        Ok(None)
    }

    fn declare(
        &mut self,
        name: &Path,
        namespace: &str,
        datatype: crate::model::types::DataType,
        purpose: Purpose,
        lineage: Lineage,
    ) {
        let concept = Concept {
            name: name.dotted(),
            namespace: namespace.to_string(),
            datatype,
            purpose,
            lineage,
        };
        self.concepts.insert(concept.address(), concept);
    }

    /// Resolves a reference written inside `scope`.
    ///
    /// A bare name is looked up in `scope`, then in the default namespace.
    /// A dotted name is taken as a full address.
    pub fn resolve(&self, path: &Path, scope: &str) -> Result<&Concept, ParseError> {
        let found = match path.parts.as_slice() {
            [name] => self
                .concepts
                .get(&format!("{scope}.{name}"))
                .or_else(|| self.concepts.get(&format!("{DEFAULT_NAMESPACE}.{name}"))),
            _ => self.concepts.get(&path.dotted()),
        };
        found.ok_or_else(|| {
            ParseError::at(path, format!("unresolved concept '{}'", path.dotted()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::DataType;

    const ORDERS: &str = r#"
        key order_id int;
        property order_id.amount float;
        metric revenue <- sum(amount);
        datasource orders (id: order_id, amount: amount) address shop.orders;
    "#;

    #[test]
    fn test_parse_into_default_namespace() {
        let mut env = Environment::new();
        let selects = env.parse(ORDERS, None).unwrap();
        assert!(selects.is_empty());

        let revenue = env.concept("local.revenue").unwrap();
        assert_eq!(revenue.purpose, Purpose::Metric);
        assert_eq!(revenue.datatype, DataType::Float);
        assert_eq!(
            revenue.lineage,
            Lineage::Aggregate {
                function: crate::model::types::Aggregate::Sum,
                input: "local.amount".into()
            }
        );
        assert_eq!(env.datasources().len(), 1);
        assert_eq!(env.namespaces().collect::<Vec<_>>(), vec!["local"]);
    }

    #[test]
    fn test_alias_namespace_falls_back_to_local() {
        let mut env = Environment::new();
        env.parse("key customer_id int;", None).unwrap();
        env.parse("property customer_id.name string;", Some("crm")).unwrap();

        let name = env.concept("crm.name").unwrap();
        assert_eq!(name.display_name(), "crm_name");
        assert_eq!(
            name.lineage,
            Lineage::Keyed {
                key: "local.customer_id".into()
            }
        );
        assert_eq!(env.namespaces().collect::<Vec<_>>(), vec!["crm", "local"]);
    }

    #[test]
    fn test_failed_parse_leaves_environment_untouched() {
        let mut env = Environment::new();
        env.parse("key a int;", None).unwrap();
        let before = env.clone();

        let err = env.parse("key b int;\nmetric c <- sum(missing);", None).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unresolved concept 'missing'"));
        assert_eq!(env, before);
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut template = Environment::new();
        template.parse(ORDERS, None).unwrap();

        let mut copy = template.clone();
        copy.parse("key extra int;", None).unwrap();

        assert!(template.concept("local.extra").is_none());
        assert!(copy.concept("local.extra").is_some());
    }

    #[test]
    fn test_metric_cannot_be_bound_to_column() {
        let mut env = Environment::new();
        let err = env
            .parse(
                "key id int; metric n <- count(id); datasource t (n: n) address t;",
                None,
            )
            .unwrap_err();
        assert!(err.message.contains("cannot be bound"));
    }

    #[test]
    fn test_selects_are_returned_in_order() {
        let mut env = Environment::new();
        env.parse(ORDERS, None).unwrap();
        let selects = env.parse("select order_id; select revenue;", None).unwrap();
        assert_eq!(selects.len(), 2);
        assert_eq!(selects[1].items[0].dotted(), "revenue");
    }
}
