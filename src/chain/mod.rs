//! Chain definitions and the engine that executes them

mod config;
mod executor;
mod template;

pub use config::{
    load_chain_config, ChainConfig, ChainDefinition, ChainStep, ChainVariable, OnFailure,
    VariableType, WaitFor, CHAIN_CONFIG_PATH,
};
pub use executor::{ChainExecutor, ChainState, ChainStatus, ChainUpdate, StepResult, StepStatus};
pub use template::{interpolate, unresolved_refs, InterpolationContext};
