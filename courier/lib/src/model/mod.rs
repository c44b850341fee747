//! Workspace data model: API definitions, collections and environments.

mod api;
mod collection;
mod environment;
mod params;

pub use api::{builder_state, ApiDefinition, ApiDefinitionBuilder, RequestSettings};
pub use collection::Collection;
pub use environment::{
    Environment, EnvironmentVariable, SharedEnvironment, VariableChange, VariableKind, MASK,
};
pub use params::{
    Header, Headers, Param, ParamList, PathParam, PathParams, QueryParam, QueryParams,
    RequestParameters,
};
