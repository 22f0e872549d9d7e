//! Script Generator
//!
//! Turns filter sets, compiled queries and mutations into automation-script
//! text. Generated text never contains request values: those travel as
//! parameters through `bridge::build_script`.

pub mod filter_block;
pub mod helpers;
pub mod iteration;
pub mod mutation;
pub mod secondary;

pub use filter_block::{generate_filter_block, FilterBlock, Guard};
pub use helpers::{prelude, Dialect};
pub use iteration::{
    generate_query_script, generate_task_iteration_script, GeneratedScript, IterationOptions,
};
pub use mutation::generate_mutation_script;
pub use secondary::{
    apply_verdicts, evaluate_wrapper, finalize_records, generate_secondary_batch_script,
    sort_records, Verdict,
};
