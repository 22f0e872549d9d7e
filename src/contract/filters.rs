//! Filter Specification
//!
//! `FILTER_SPECIFICATION` is the only place a filterable property is named.
//! Compilers resolve external vocabulary into `FilterProperty` values through
//! this table, and the script generator matches exhaustively on
//! `FilterProperty`, so a property cannot exist in one layer and be missing
//! from another.

use std::collections::BTreeMap;

use focus_types::EntityType;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::dates::DateRange;
use crate::error::ContractError;

// =============================================================================
// PROPERTIES
// =============================================================================

/// Every queryable property. Declaration order is canonical emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterProperty {
    Id,
    Completed,
    Dropped,
    Flagged,
    Available,
    Blocked,
    InInbox,
    Text,
    Project,
    ProjectId,
    Tags,
    DueDate,
    DeferDate,
    PlannedDate,
    CompletionDate,
    Modified,
    HasRepetition,
    ProjectStatus,
    Folder,
}

impl FilterProperty {
    pub const ALL: [FilterProperty; 19] = [
        FilterProperty::Id,
        FilterProperty::Completed,
        FilterProperty::Dropped,
        FilterProperty::Flagged,
        FilterProperty::Available,
        FilterProperty::Blocked,
        FilterProperty::InInbox,
        FilterProperty::Text,
        FilterProperty::Project,
        FilterProperty::ProjectId,
        FilterProperty::Tags,
        FilterProperty::DueDate,
        FilterProperty::DeferDate,
        FilterProperty::PlannedDate,
        FilterProperty::CompletionDate,
        FilterProperty::Modified,
        FilterProperty::HasRepetition,
        FilterProperty::ProjectStatus,
        FilterProperty::Folder,
    ];

    /// Specification row for this property
    pub fn spec(&self) -> &'static PropertySpec {
        // Rows are declared in enum order; see test_table_matches_enum_order
        &FILTER_SPECIFICATION[*self as usize]
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn requires_secondary(&self) -> bool {
        self.spec().requires_secondary
    }

    pub fn from_name(name: &str) -> Option<Self> {
        FILTER_SPECIFICATION
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.property)
    }

    pub fn applies_to(&self, entity: EntityType) -> bool {
        self.spec().applies_to.contains(&entity)
    }
}

impl std::fmt::Display for FilterProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Value type a property accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    String,
    /// String, or null meaning "none"
    NullableString,
    StringSet,
    DateRange,
    Enum(&'static [&'static str]),
}

impl ValueType {
    pub fn describe(&self) -> String {
        match self {
            ValueType::Boolean => "boolean".to_string(),
            ValueType::String => "string".to_string(),
            ValueType::NullableString => "string or null".to_string(),
            ValueType::StringSet => "list of strings".to_string(),
            ValueType::DateRange => "date range".to_string(),
            ValueType::Enum(values) => format!("one of {}", values.join("|")),
        }
    }
}

/// Operators a property supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    And,
    Or,
    NotIn,
    Before,
    After,
    Between,
}

/// One row of the specification
#[derive(Debug)]
pub struct PropertySpec {
    pub property: FilterProperty,
    /// Stable internal name, also the key in generated script parameters
    pub name: &'static str,
    pub value_type: ValueType,
    pub operators: &'static [Operator],
    pub applies_to: &'static [EntityType],
    /// Primary dialect cannot read this property without conversion failures
    pub requires_secondary: bool,
}

pub const PROJECT_STATUSES: &[&str] = &["active", "onHold", "done", "dropped"];

const SET_OPS: &[Operator] = &[Operator::And, Operator::Or, Operator::NotIn];
const DATE_OPS: &[Operator] = &[Operator::Before, Operator::After, Operator::Between];
const NO_OPS: &[Operator] = &[];

const TASK: &[EntityType] = &[EntityType::Task];
const PROJECT: &[EntityType] = &[EntityType::Project];
const TASK_PROJECT: &[EntityType] = &[EntityType::Task, EntityType::Project];
const ALL_ENTITIES: &[EntityType] = &[EntityType::Task, EntityType::Project, EntityType::Tag];

const fn row(
    property: FilterProperty,
    name: &'static str,
    value_type: ValueType,
    operators: &'static [Operator],
    applies_to: &'static [EntityType],
    requires_secondary: bool,
) -> PropertySpec {
    PropertySpec {
        property,
        name,
        value_type,
        operators,
        applies_to,
        requires_secondary,
    }
}

/// The filter specification
pub static FILTER_SPECIFICATION: [PropertySpec; 19] = [
    row(FilterProperty::Id, "id", ValueType::String, NO_OPS, ALL_ENTITIES, false),
    row(FilterProperty::Completed, "completed", ValueType::Boolean, NO_OPS, TASK_PROJECT, false),
    row(FilterProperty::Dropped, "dropped", ValueType::Boolean, NO_OPS, TASK, false),
    row(FilterProperty::Flagged, "flagged", ValueType::Boolean, NO_OPS, TASK_PROJECT, false),
    row(FilterProperty::Available, "available", ValueType::Boolean, NO_OPS, TASK, false),
    row(FilterProperty::Blocked, "blocked", ValueType::Boolean, NO_OPS, TASK, false),
    row(FilterProperty::InInbox, "inInbox", ValueType::Boolean, NO_OPS, TASK, false),
    row(FilterProperty::Text, "text", ValueType::String, NO_OPS, ALL_ENTITIES, false),
    row(FilterProperty::Project, "project", ValueType::NullableString, NO_OPS, TASK, false),
    row(FilterProperty::ProjectId, "projectId", ValueType::String, NO_OPS, TASK, false),
    row(FilterProperty::Tags, "tags", ValueType::StringSet, SET_OPS, TASK, false),
    row(FilterProperty::DueDate, "dueDate", ValueType::DateRange, DATE_OPS, TASK_PROJECT, false),
    row(FilterProperty::DeferDate, "deferDate", ValueType::DateRange, DATE_OPS, TASK_PROJECT, false),
    row(FilterProperty::PlannedDate, "plannedDate", ValueType::DateRange, DATE_OPS, TASK, true),
    row(
        FilterProperty::CompletionDate,
        "completionDate",
        ValueType::DateRange,
        DATE_OPS,
        TASK_PROJECT,
        true,
    ),
    row(FilterProperty::Modified, "modified", ValueType::DateRange, DATE_OPS, TASK_PROJECT, true),
    row(FilterProperty::HasRepetition, "hasRepetition", ValueType::Boolean, NO_OPS, TASK, true),
    row(
        FilterProperty::ProjectStatus,
        "projectStatus",
        ValueType::Enum(PROJECT_STATUSES),
        NO_OPS,
        PROJECT,
        false,
    ),
    row(FilterProperty::Folder, "folder", ValueType::String, NO_OPS, PROJECT, false),
];

// =============================================================================
// VALUES
// =============================================================================

/// Set-membership operator for `tags`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagOperator {
    And,
    Or,
    NotIn,
}

impl TagOperator {
    fn operator(&self) -> Operator {
        match self {
            TagOperator::And => Operator::And,
            TagOperator::Or => Operator::Or,
            TagOperator::NotIn => Operator::NotIn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TagOperator::And => "AND",
            TagOperator::Or => "OR",
            TagOperator::NotIn => "NOT_IN",
        }
    }
}

/// A typed filter value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Bool(bool),
    Text(String),
    OptionalText(Option<String>),
    TagSet {
        tags: Vec<String>,
        operator: TagOperator,
    },
    DateRange(DateRange),
    Enum(String),
}

impl FilterValue {
    fn type_name(&self) -> &'static str {
        match self {
            FilterValue::Bool(_) => "boolean",
            FilterValue::Text(_) => "string",
            FilterValue::OptionalText(_) => "string or null",
            FilterValue::TagSet { .. } => "tag set",
            FilterValue::DateRange(_) => "date range",
            FilterValue::Enum(_) => "enum",
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Text(s) | FilterValue::Enum(s) => Value::String(s.clone()),
            FilterValue::OptionalText(s) => s.clone().map(Value::String).unwrap_or(Value::Null),
            FilterValue::TagSet { tags, .. } => {
                Value::Array(tags.iter().cloned().map(Value::String).collect())
            }
            FilterValue::DateRange(range) => {
                serde_json::to_value(range).unwrap_or(Value::Null)
            }
        }
    }
}

fn check_value(spec: &PropertySpec, value: &FilterValue) -> Result<(), ContractError> {
    let mismatch = || ContractError::InvalidValue {
        field: spec.name.to_string(),
        expected: spec.value_type.describe(),
        found: value.type_name().to_string(),
    };

    match (&spec.value_type, value) {
        (ValueType::Boolean, FilterValue::Bool(_)) => Ok(()),
        (ValueType::String, FilterValue::Text(s)) => {
            if s.trim().is_empty() {
                Err(ContractError::InvalidValue {
                    field: spec.name.to_string(),
                    expected: "non-empty string".to_string(),
                    found: "empty string".to_string(),
                })
            } else {
                Ok(())
            }
        }
        (ValueType::NullableString, FilterValue::OptionalText(_)) => Ok(()),
        (ValueType::StringSet, FilterValue::TagSet { tags, operator }) => {
            if !spec.operators.contains(&operator.operator()) {
                return Err(ContractError::UnsupportedOperator {
                    property: spec.name,
                    operator: operator.as_str().to_string(),
                });
            }
            if tags.is_empty() {
                return Err(ContractError::InvalidValue {
                    field: spec.name.to_string(),
                    expected: "non-empty list of strings".to_string(),
                    found: "empty list".to_string(),
                });
            }
            Ok(())
        }
        (ValueType::DateRange, FilterValue::DateRange(_)) => Ok(()),
        (ValueType::Enum(allowed), FilterValue::Enum(v)) => {
            if allowed.contains(&v.as_str()) {
                Ok(())
            } else {
                Err(ContractError::InvalidValue {
                    field: spec.name.to_string(),
                    expected: spec.value_type.describe(),
                    found: format!("\"{}\"", v),
                })
            }
        }
        _ => Err(mismatch()),
    }
}

// =============================================================================
// FILTER SET
// =============================================================================

/// Validated set of filters, keyed by property in canonical order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSet {
    entries: BTreeMap<FilterProperty, FilterValue>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a filter after checking it against the specification
    pub fn insert(
        &mut self,
        property: FilterProperty,
        value: FilterValue,
    ) -> Result<(), ContractError> {
        check_value(property.spec(), &value)?;
        self.entries.insert(property, value);
        Ok(())
    }

    /// Insert by internal name; unknown names are a mapping error
    pub fn insert_named(
        &mut self,
        name: &str,
        value: FilterValue,
        entity: EntityType,
    ) -> Result<(), ContractError> {
        let property = FilterProperty::from_name(name).ok_or_else(|| {
            ContractError::UnknownFilter {
                key: name.to_string(),
                entity,
            }
        })?;
        self.insert(property, value)
    }

    pub fn remove(&mut self, property: FilterProperty) -> Option<FilterValue> {
        self.entries.remove(&property)
    }

    pub fn get(&self, property: FilterProperty) -> Option<&FilterValue> {
        self.entries.get(&property)
    }

    pub fn contains(&self, property: FilterProperty) -> bool {
        self.entries.contains_key(&property)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterProperty, &FilterValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn properties(&self) -> impl Iterator<Item = FilterProperty> + '_ {
        self.entries.keys().copied()
    }

    /// Convenience accessor for the completion filter
    pub fn completed(&self) -> Option<bool> {
        match self.get(FilterProperty::Completed) {
            Some(FilterValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Properties that must be evaluated in the secondary context
    pub fn secondary_properties(&self) -> Vec<FilterProperty> {
        self.properties()
            .filter(FilterProperty::requires_secondary)
            .collect()
    }

    /// Reject properties that do not apply to `entity`
    pub fn validate_for(&self, entity: EntityType) -> Result<(), ContractError> {
        match self.properties().find(|p| !p.applies_to(entity)) {
            Some(property) => Err(ContractError::FilterNotApplicable {
                property: property.name(),
                entity,
            }),
            None => Ok(()),
        }
    }

    /// Parameter object handed to generated scripts
    pub fn to_params(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

impl Serialize for FilterSet {
    /// Flat internal shape: `tags` is accompanied by `tagsOperator`
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.contains(FilterProperty::Tags));
        let mut map = serializer.serialize_map(Some(self.entries.len() + extra))?;
        for (property, value) in &self.entries {
            map.serialize_entry(property.name(), &value.to_json())?;
            if let FilterValue::TagSet { operator, .. } = value {
                map.serialize_entry("tagsOperator", operator.as_str())?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::dates::DateBound;
    use serde_json::json;

    #[test]
    fn test_table_matches_enum_order() {
        for (index, row) in FILTER_SPECIFICATION.iter().enumerate() {
            assert_eq!(row.property as usize, index, "row {} out of order", row.name);
        }
        assert_eq!(FilterProperty::ALL.len(), FILTER_SPECIFICATION.len());
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = FILTER_SPECIFICATION.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FILTER_SPECIFICATION.len());
    }

    #[test]
    fn test_name_round_trip() {
        for property in FilterProperty::ALL {
            assert_eq!(FilterProperty::from_name(property.name()), Some(property));
        }
        assert_eq!(FilterProperty::from_name("colour"), None);
    }

    #[test]
    fn test_serde_name_matches_table() {
        for property in FilterProperty::ALL {
            assert_eq!(serde_json::to_value(property).unwrap(), json!(property.name()));
        }
    }

    #[test]
    fn test_unknown_name_is_typed_error() {
        let mut filters = FilterSet::new();
        let err = filters
            .insert_named("priority", FilterValue::Bool(true), EntityType::Task)
            .unwrap_err();
        assert_eq!(
            err,
            ContractError::UnknownFilter {
                key: "priority".into(),
                entity: EntityType::Task
            }
        );
        assert!(filters.is_empty());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut filters = FilterSet::new();
        assert!(filters
            .insert(FilterProperty::Completed, FilterValue::Text("yes".into()))
            .is_err());
        assert!(filters
            .insert(
                FilterProperty::ProjectStatus,
                FilterValue::Enum("archived".into())
            )
            .is_err());
        assert!(filters
            .insert(
                FilterProperty::Tags,
                FilterValue::TagSet {
                    tags: vec![],
                    operator: TagOperator::Or
                }
            )
            .is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let mut filters = FilterSet::new();
        filters
            .insert(
                FilterProperty::Tags,
                FilterValue::TagSet {
                    tags: vec!["urgent".into(), "home".into()],
                    operator: TagOperator::Or,
                },
            )
            .unwrap();
        filters
            .insert(FilterProperty::Completed, FilterValue::Bool(true))
            .unwrap();
        filters
            .insert(
                FilterProperty::DueDate,
                FilterValue::DateRange(DateRange::before(DateBound::Now)),
            )
            .unwrap();

        assert_eq!(
            filters.to_params(),
            json!({
                "completed": true,
                "tags": ["urgent", "home"],
                "tagsOperator": "OR",
                "dueDate": {"before": {"kind": "now"}, "inclusive": false}
            })
        );
    }

    #[test]
    fn test_applicability() {
        let mut filters = FilterSet::new();
        filters
            .insert(FilterProperty::InInbox, FilterValue::Bool(true))
            .unwrap();
        assert!(filters.validate_for(EntityType::Task).is_ok());
        assert!(matches!(
            filters.validate_for(EntityType::Project),
            Err(ContractError::FilterNotApplicable {
                property: "inInbox",
                ..
            })
        ));
    }

    #[test]
    fn test_secondary_properties() {
        let mut filters = FilterSet::new();
        filters
            .insert(FilterProperty::Flagged, FilterValue::Bool(true))
            .unwrap();
        filters
            .insert(FilterProperty::HasRepetition, FilterValue::Bool(true))
            .unwrap();
        assert_eq!(
            filters.secondary_properties(),
            vec![FilterProperty::HasRepetition]
        );
    }
}
