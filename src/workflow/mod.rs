//! Workflow file model, discovery, and input validation

mod parser;
mod validate;

pub use parser::{
    discover_workflows, parse_workflow, InputType, WorkflowDispatch, WorkflowFile, WorkflowInput,
};
pub use validate::{validate_value, ValidationRule};
