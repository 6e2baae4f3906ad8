// SPDX-License-Identifier: Apache-2.0

//! Modeling language: concepts, schema environments, the parser, the
//! reference compiler and the pre-built model inventory.

pub mod compiler;
pub mod environment;
pub mod inventory;
pub mod parser;
pub mod types;

pub use compiler::{ModelCompiler, QueryCompiler, StatementPlan};
pub use environment::Environment;
pub use inventory::{ModelConcept, ModelInventory, ModelListing};
pub use parser::ParseError;
pub use types::{Concept, DataType, Purpose, DEFAULT_NAMESPACE};
