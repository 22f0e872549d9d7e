//! Compiled queries
//!
//! `CompiledQuery` is the only shape the script generator and the cache see.
//! Two compilations of the same external request produce equal values and the
//! same cache key.

use focus_types::EntityType;
use serde::{Deserialize, Serialize};

use super::filters::FilterSet;
use crate::cache::{cache_key, CacheCategory};

/// Collection a query walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryEntity {
    Tasks,
    Projects,
    Tags,
}

impl QueryEntity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            QueryEntity::Tasks => EntityType::Task,
            QueryEntity::Projects => EntityType::Project,
            QueryEntity::Tags => EntityType::Tag,
        }
    }

    pub fn cache_category(&self) -> CacheCategory {
        CacheCategory::for_entity(self.entity_type())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryEntity::Tasks => "tasks",
            QueryEntity::Projects => "projects",
            QueryEntity::Tags => "tags",
        }
    }

    /// Fields returned when the request names none
    pub fn default_fields(&self) -> Vec<OutputField> {
        use OutputField as F;
        match self {
            QueryEntity::Tasks => vec![
                F::Id,
                F::Name,
                F::Completed,
                F::Flagged,
                F::DueDate,
                F::DeferDate,
                F::Tags,
                F::Project,
            ],
            QueryEntity::Projects => vec![
                F::Id,
                F::Name,
                F::Status,
                F::Flagged,
                F::DueDate,
                F::Folder,
                F::TaskCount,
            ],
            QueryEntity::Tags => vec![F::Id, F::Name, F::TaskCount],
        }
    }
}

impl std::fmt::Display for QueryEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Preset that expands into filters at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    All,
    Inbox,
    Flagged,
    Available,
    Today,
    Overdue,
    Upcoming,
    Search,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::All => "all",
            QueryMode::Inbox => "inbox",
            QueryMode::Flagged => "flagged",
            QueryMode::Available => "available",
            QueryMode::Today => "today",
            QueryMode::Overdue => "overdue",
            QueryMode::Upcoming => "upcoming",
            QueryMode::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    DueDate,
    DeferDate,
    Flagged,
    Added,
    Modified,
    CompletionDate,
    PlannedDate,
}

impl SortField {
    /// The output field holding the sort key
    pub fn output_field(&self) -> OutputField {
        match self {
            SortField::Name => OutputField::Name,
            SortField::DueDate => OutputField::DueDate,
            SortField::DeferDate => OutputField::DeferDate,
            SortField::Flagged => OutputField::Flagged,
            SortField::Added => OutputField::Added,
            SortField::Modified => OutputField::Modified,
            SortField::CompletionDate => OutputField::CompletionDate,
            SortField::PlannedDate => OutputField::PlannedDate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Fields a query can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputField {
    Id,
    Name,
    Note,
    Completed,
    Dropped,
    Flagged,
    Available,
    Blocked,
    InInbox,
    DueDate,
    DeferDate,
    PlannedDate,
    CompletionDate,
    Added,
    Modified,
    Tags,
    Project,
    ProjectId,
    EstimatedMinutes,
    RepetitionRule,
    Status,
    Folder,
    TaskCount,
}

impl OutputField {
    pub fn name(&self) -> &'static str {
        match self {
            OutputField::Id => "id",
            OutputField::Name => "name",
            OutputField::Note => "note",
            OutputField::Completed => "completed",
            OutputField::Dropped => "dropped",
            OutputField::Flagged => "flagged",
            OutputField::Available => "available",
            OutputField::Blocked => "blocked",
            OutputField::InInbox => "inInbox",
            OutputField::DueDate => "dueDate",
            OutputField::DeferDate => "deferDate",
            OutputField::PlannedDate => "plannedDate",
            OutputField::CompletionDate => "completionDate",
            OutputField::Added => "added",
            OutputField::Modified => "modified",
            OutputField::Tags => "tags",
            OutputField::Project => "project",
            OutputField::ProjectId => "projectId",
            OutputField::EstimatedMinutes => "estimatedMinutes",
            OutputField::RepetitionRule => "repetitionRule",
            OutputField::Status => "status",
            OutputField::Folder => "folder",
            OutputField::TaskCount => "taskCount",
        }
    }

    /// Values the primary dialect cannot read reliably
    pub fn requires_secondary(&self) -> bool {
        matches!(
            self,
            OutputField::PlannedDate
                | OutputField::CompletionDate
                | OutputField::Modified
                | OutputField::RepetitionRule
        )
    }

    pub fn applies_to(&self, entity: QueryEntity) -> bool {
        use OutputField as F;
        match entity {
            QueryEntity::Tasks => !matches!(self, F::Status | F::Folder | F::TaskCount),
            QueryEntity::Projects => matches!(
                self,
                F::Id
                    | F::Name
                    | F::Note
                    | F::Completed
                    | F::Flagged
                    | F::DueDate
                    | F::DeferDate
                    | F::CompletionDate
                    | F::Added
                    | F::Modified
                    | F::RepetitionRule
                    | F::Status
                    | F::Folder
                    | F::TaskCount
            ),
            QueryEntity::Tags => matches!(self, F::Id | F::Name | F::TaskCount),
        }
    }
}

/// A fully validated query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub entity: QueryEntity,
    pub mode: QueryMode,
    pub filters: FilterSet,
    pub fields: Vec<OutputField>,
    pub sort: Vec<SortSpec>,
    pub limit: usize,
    pub offset: usize,
    pub count_only: bool,
}

impl CompiledQuery {
    /// Stable cache key; independent of how the request spelled its keys
    pub fn cache_key(&self) -> String {
        cache_key(self)
    }

    pub fn cache_category(&self) -> CacheCategory {
        self.entity.cache_category()
    }

    pub fn operation_name(&self) -> String {
        format!("query:{}", self.entity)
    }

    /// Whether the secondary context must take part in answering
    pub fn needs_secondary(&self) -> bool {
        !self.filters.secondary_properties().is_empty() || !self.secondary_fields().is_empty()
    }

    /// Fields, including sort keys, that only the secondary context can read
    pub fn secondary_fields(&self) -> Vec<OutputField> {
        if self.count_only {
            return Vec::new();
        }
        let mut fields: Vec<OutputField> = self
            .fields
            .iter()
            .copied()
            .chain(self.sort.iter().map(|s| s.field.output_field()))
            .filter(OutputField::requires_secondary)
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }

    /// Primary fields the generated script must read: `id`, requested
    /// fields and sort keys
    pub fn primary_fields(&self) -> Vec<OutputField> {
        let mut fields = vec![OutputField::Id];
        if !self.count_only {
            fields.extend(self.fields.iter().copied());
            fields.extend(self.sort.iter().map(|s| s.field.output_field()));
        }
        fields.retain(|f| !f.requires_secondary());
        fields.sort_unstable();
        fields.dedup();
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::filters::{FilterProperty, FilterValue};

    fn query(fields: Vec<OutputField>) -> CompiledQuery {
        CompiledQuery {
            entity: QueryEntity::Tasks,
            mode: QueryMode::All,
            filters: FilterSet::new(),
            fields,
            sort: Vec::new(),
            limit: 25,
            offset: 0,
            count_only: false,
        }
    }

    #[test]
    fn test_field_names_match_serde() {
        for field in [
            OutputField::InInbox,
            OutputField::EstimatedMinutes,
            OutputField::TaskCount,
            OutputField::RepetitionRule,
        ] {
            assert_eq!(
                serde_json::to_value(field).unwrap(),
                serde_json::json!(field.name())
            );
        }
    }

    #[test]
    fn test_primary_only_query() {
        let q = query(vec![OutputField::Name, OutputField::DueDate]);
        assert!(!q.needs_secondary());
        assert_eq!(
            q.primary_fields(),
            vec![OutputField::Id, OutputField::Name, OutputField::DueDate]
        );
    }

    #[test]
    fn test_secondary_field_or_sort_triggers_two_phase() {
        let q = query(vec![OutputField::Name, OutputField::Modified]);
        assert!(q.needs_secondary());
        assert_eq!(q.secondary_fields(), vec![OutputField::Modified]);

        let mut sorted = query(vec![OutputField::Name]);
        sorted.sort.push(SortSpec {
            field: SortField::PlannedDate,
            direction: SortDirection::Desc,
        });
        assert_eq!(sorted.secondary_fields(), vec![OutputField::PlannedDate]);
    }

    #[test]
    fn test_secondary_filter_triggers_two_phase() {
        let mut q = query(vec![OutputField::Name]);
        q.filters
            .insert(FilterProperty::HasRepetition, FilterValue::Bool(true))
            .unwrap();
        assert!(q.needs_secondary());
    }

    #[test]
    fn test_count_only_ignores_fields() {
        let mut q = query(vec![OutputField::Modified]);
        q.count_only = true;
        assert!(!q.needs_secondary());
        assert_eq!(q.primary_fields(), vec![OutputField::Id]);
    }

    #[test]
    fn test_cache_key_tracks_content() {
        let a = query(vec![OutputField::Name]);
        let b = query(vec![OutputField::Name]);
        let mut c = query(vec![OutputField::Name]);
        c.limit = 10;
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }
}
