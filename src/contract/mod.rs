//! Contract layer: the filter and mutation specifications and the compiled
//! request types built from them.
//!
//! Nothing in here touches a script or a process. Every value in this module
//! has already passed validation.

pub mod analysis;
pub mod dates;
pub mod filters;
pub mod mutation;
pub mod mutations;
pub mod query;

pub use analysis::{
    AnalysisScope, CompiledAnalysis, MeetingNotesParams, ScopeDateRange, ScopedAnalysis,
    ScopedAnalysisKind,
};
pub use dates::{normalize_date, DateBound, DateRange};
pub use filters::{
    FilterProperty, FilterSet, FilterValue, Operator, PropertySpec, TagOperator, ValueType,
    FILTER_SPECIFICATION, PROJECT_STATUSES,
};
pub use mutation::{
    BatchMutation, CompiledMutation, CompleteMutation, CreateMutation, DeleteMutation, EntityRef,
    MutationOp, MutationTarget, UpdateMutation,
};
pub use mutations::{
    ChangeSet, Frequency, MutableProperty, MutablePropertySpec, MutationValue, RepetitionRule,
    MUTATION_SPECIFICATION,
};
pub use query::{
    CompiledQuery, OutputField, QueryEntity, QueryMode, SortDirection, SortField, SortSpec,
};
