//! Mutation Specification
//!
//! Declares every property a mutation may set, which entity types accept it,
//! how its external value is validated, and whether it must be written from
//! the secondary scripting context.

use std::collections::BTreeMap;

use focus_types::EntityType;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::dates::normalize_date;
use super::filters::PROJECT_STATUSES;
use crate::error::ContractError;

/// Every mutable property. Declaration order is canonical emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutableProperty {
    Name,
    Note,
    Flagged,
    DueDate,
    DeferDate,
    PlannedDate,
    EstimatedMinutes,
    Tags,
    AddTags,
    RemoveTags,
    Project,
    ParentTaskId,
    Sequential,
    Folder,
    Status,
    ReviewIntervalDays,
    RepetitionRule,
}

/// How an external value is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationValueType {
    NonEmptyString,
    String,
    /// String, or null to clear / mean "none"
    NullableString,
    Boolean,
    /// Date string, or null to clear
    NullableDate,
    /// Non-negative minutes, or null to clear
    NullableMinutes,
    StringSet,
    Enum(&'static [&'static str]),
    PositiveInteger,
    /// `{frequency, interval}` or null to clear
    Repetition,
}

#[derive(Debug)]
pub struct MutablePropertySpec {
    pub property: MutableProperty,
    pub name: &'static str,
    pub value_type: MutationValueType,
    pub task: bool,
    pub project: bool,
    pub requires_secondary: bool,
}

const fn row(
    property: MutableProperty,
    name: &'static str,
    value_type: MutationValueType,
    task: bool,
    project: bool,
    requires_secondary: bool,
) -> MutablePropertySpec {
    MutablePropertySpec {
        property,
        name,
        value_type,
        task,
        project,
        requires_secondary,
    }
}

use MutationValueType as T;

/// The mutation specification
pub static MUTATION_SPECIFICATION: [MutablePropertySpec; 17] = [
    row(MutableProperty::Name, "name", T::NonEmptyString, true, true, false),
    row(MutableProperty::Note, "note", T::String, true, true, false),
    row(MutableProperty::Flagged, "flagged", T::Boolean, true, true, false),
    row(MutableProperty::DueDate, "dueDate", T::NullableDate, true, true, false),
    row(MutableProperty::DeferDate, "deferDate", T::NullableDate, true, true, false),
    row(MutableProperty::PlannedDate, "plannedDate", T::NullableDate, true, false, true),
    row(MutableProperty::EstimatedMinutes, "estimatedMinutes", T::NullableMinutes, true, false, false),
    row(MutableProperty::Tags, "tags", T::StringSet, true, false, false),
    row(MutableProperty::AddTags, "addTags", T::StringSet, true, false, false),
    row(MutableProperty::RemoveTags, "removeTags", T::StringSet, true, false, false),
    row(MutableProperty::Project, "project", T::NullableString, true, false, false),
    row(MutableProperty::ParentTaskId, "parentTaskId", T::String, true, false, false),
    row(MutableProperty::Sequential, "sequential", T::Boolean, false, true, false),
    row(MutableProperty::Folder, "folder", T::String, false, true, false),
    row(MutableProperty::Status, "status", T::Enum(PROJECT_STATUSES), false, true, false),
    row(MutableProperty::ReviewIntervalDays, "reviewIntervalDays", T::PositiveInteger, false, true, true),
    row(MutableProperty::RepetitionRule, "repetitionRule", T::Repetition, true, true, true),
];

impl MutableProperty {
    pub fn spec(&self) -> &'static MutablePropertySpec {
        &MUTATION_SPECIFICATION[*self as usize]
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn requires_secondary(&self) -> bool {
        self.spec().requires_secondary
    }

    pub fn from_name(name: &str) -> Option<Self> {
        MUTATION_SPECIFICATION
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.property)
    }

    pub fn applies_to(&self, entity: EntityType) -> bool {
        match entity {
            EntityType::Task => self.spec().task,
            EntityType::Project => self.spec().project,
            EntityType::Tag => false,
        }
    }

    /// Validate an external JSON value against this property's rules
    pub fn parse_value(&self, raw: &Value) -> Result<MutationValue, ContractError> {
        let name = self.name();
        match self.spec().value_type {
            T::NonEmptyString => match raw.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => Ok(MutationValue::Text(s.to_string())),
                _ => Err(ContractError::invalid_value(name, "non-empty string", raw)),
            },
            T::String => raw
                .as_str()
                .map(|s| MutationValue::Text(s.to_string()))
                .ok_or_else(|| ContractError::invalid_value(name, "string", raw)),
            T::NullableString => match raw {
                Value::Null => Ok(MutationValue::OptionalText(None)),
                Value::String(s) if !s.trim().is_empty() => {
                    Ok(MutationValue::OptionalText(Some(s.trim().to_string())))
                }
                _ => Err(ContractError::invalid_value(name, "string or null", raw)),
            },
            T::Boolean => raw
                .as_bool()
                .map(MutationValue::Bool)
                .ok_or_else(|| ContractError::invalid_value(name, "boolean", raw)),
            T::NullableDate => match raw {
                Value::Null => Ok(MutationValue::Date(None)),
                Value::String(s) => Ok(MutationValue::Date(Some(normalize_date(name, s)?))),
                _ => Err(ContractError::invalid_value(name, "date string or null", raw)),
            },
            T::NullableMinutes => match raw {
                Value::Null => Ok(MutationValue::Minutes(None)),
                _ => raw
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(|n| MutationValue::Minutes(Some(n)))
                    .ok_or_else(|| {
                        ContractError::invalid_value(name, "non-negative integer or null", raw)
                    }),
            },
            T::StringSet => {
                let items = raw
                    .as_array()
                    .ok_or_else(|| ContractError::invalid_value(name, "list of strings", raw))?;
                let mut tags = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str().map(str::trim) {
                        Some(s) if !s.is_empty() => {
                            if !tags.iter().any(|t: &String| t == s) {
                                tags.push(s.to_string());
                            }
                        }
                        _ => {
                            return Err(ContractError::invalid_value(
                                name,
                                "non-empty tag name",
                                item,
                            ))
                        }
                    }
                }
                Ok(MutationValue::Tags(tags))
            }
            T::Enum(allowed) => match raw.as_str() {
                Some(s) if allowed.contains(&s) => Ok(MutationValue::Enum(s.to_string())),
                _ => Err(ContractError::invalid_value(
                    name,
                    format!("one of {}", allowed.join("|")),
                    raw,
                )),
            },
            T::PositiveInteger => raw
                .as_u64()
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .map(MutationValue::Integer)
                .ok_or_else(|| ContractError::invalid_value(name, "positive integer", raw)),
            T::Repetition => match raw {
                Value::Null => Ok(MutationValue::Repetition(None)),
                _ => {
                    let rule: RepetitionRule =
                        serde_json::from_value(raw.clone()).map_err(|e| {
                            ContractError::InvalidValue {
                                field: name.to_string(),
                                expected: "{frequency, interval}".to_string(),
                                found: e.to_string(),
                            }
                        })?;
                    if rule.interval == 0 {
                        return Err(ContractError::invalid_value(
                            name,
                            "interval of at least 1",
                            raw,
                        ));
                    }
                    Ok(MutationValue::Repetition(Some(rule)))
                }
            },
        }
    }
}

impl std::fmt::Display for MutableProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepetitionRule {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
}

fn default_interval() -> u32 {
    1
}

/// A validated mutation value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MutationValue {
    Text(String),
    OptionalText(Option<String>),
    Bool(bool),
    Date(Option<String>),
    Minutes(Option<u32>),
    Tags(Vec<String>),
    Enum(String),
    Integer(u32),
    Repetition(Option<RepetitionRule>),
}

impl MutationValue {
    fn to_json(&self) -> Value {
        match self {
            MutationValue::Text(s) | MutationValue::Enum(s) => Value::String(s.clone()),
            MutationValue::OptionalText(s) | MutationValue::Date(s) => {
                s.clone().map(Value::String).unwrap_or(Value::Null)
            }
            MutationValue::Bool(b) => Value::Bool(*b),
            MutationValue::Minutes(m) => m.map(Value::from).unwrap_or(Value::Null),
            MutationValue::Tags(tags) => {
                Value::Array(tags.iter().cloned().map(Value::String).collect())
            }
            MutationValue::Integer(n) => Value::from(*n),
            MutationValue::Repetition(rule) => rule
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok())
                .unwrap_or(Value::Null),
        }
    }
}

/// Validated property changes for one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChangeSet {
    entries: BTreeMap<MutableProperty, MutationValue>,
}

impl ChangeSet {
    /// Validate an external property map for `entity`.
    ///
    /// Every key must be a specification property valid for the entity type;
    /// `context` names the request part in error messages.
    pub fn from_external(
        entity: EntityType,
        raw: &Map<String, Value>,
        context: &str,
    ) -> Result<Self, ContractError> {
        let mut changes = ChangeSet::default();
        for (key, value) in raw {
            let property =
                MutableProperty::from_name(key).ok_or_else(|| ContractError::UnknownField {
                    field: key.clone(),
                    context: context.to_string(),
                })?;
            if !property.applies_to(entity) {
                return Err(ContractError::PropertyNotMutable {
                    property: key.clone(),
                    entity,
                });
            }
            changes
                .entries
                .insert(property, property.parse_value(value)?);
        }

        if changes.contains(MutableProperty::Tags)
            && (changes.contains(MutableProperty::AddTags)
                || changes.contains(MutableProperty::RemoveTags))
        {
            return Err(ContractError::InvalidValue {
                field: "tags".to_string(),
                expected: "either tags (replace) or addTags/removeTags".to_string(),
                found: "both".to_string(),
            });
        }
        if changes.contains(MutableProperty::Project)
            && changes.contains(MutableProperty::ParentTaskId)
        {
            return Err(ContractError::InvalidValue {
                field: "parentTaskId".to_string(),
                expected: "either project or parentTaskId".to_string(),
                found: "both".to_string(),
            });
        }
        Ok(changes)
    }

    pub fn get(&self, property: MutableProperty) -> Option<&MutationValue> {
        self.entries.get(&property)
    }

    pub fn contains(&self, property: MutableProperty) -> bool {
        self.entries.contains_key(&property)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn properties(&self) -> impl Iterator<Item = MutableProperty> + '_ {
        self.entries.keys().copied()
    }

    /// Changes the primary dialect applies directly
    pub fn primary_params(&self) -> Value {
        self.params_where(|p| !p.requires_secondary())
    }

    /// Changes routed through the secondary context
    pub fn secondary_params(&self) -> Value {
        self.params_where(MutableProperty::requires_secondary)
    }

    pub fn has_secondary(&self) -> bool {
        self.properties().any(|p| p.requires_secondary())
    }

    fn params_where(&self, keep: impl Fn(&MutableProperty) -> bool) -> Value {
        Value::Object(
            self.entries
                .iter()
                .filter(|(p, _)| keep(p))
                .map(|(p, v)| (p.name().to_string(), v.to_json()))
                .collect(),
        )
    }
}

impl Serialize for ChangeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (property, value) in &self.entries {
            map.serialize_entry(property.name(), &value.to_json())?;
        }
        map.end()
    }
}
