//! Module extensions
//!
//! Identity, the callable abstraction, the context it runs in, and the
//! evaluator that runs it once per stale fetch.

pub mod callable;
pub mod context;
pub mod declarative;
pub mod evaluator;
pub mod id;
pub mod inputs;
pub mod sink;

pub use callable::{ExtensionResolver, ModuleExtension, StaticResolver};
pub use context::ExtensionContext;
pub use declarative::{TomlExtension, TomlExtensionResolver};
pub use evaluator::{Demand, EvaluationOutput, ExtensionEvaluator};
pub use id::ExtensionId;
pub use inputs::{
    env_key, first_changed_input, InputSource, ProcessInputs, RecordedInputs, StaticInputs,
    DEFINITION_KEY,
};
pub use sink::{CollectingSink, DiagnosticSink, StderrSink};
