// SPDX-License-Identifier: Apache-2.0

//! Model listing command

use serde::Serialize;

use crate::model::ModelListing;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ListModelResponse {
    pub models: Vec<ModelListing>,
}

/// Lists the pre-built models a connection can be created from
pub fn list_models(state: &AppState) -> ListModelResponse {
    ListModelResponse {
        models: state.models.list(),
    }
}
