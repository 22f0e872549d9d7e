//! Query compiler
//!
//! The only place the external filter vocabulary meets the filter
//! specification. Modes are expanded into the same `FilterSet` that explicit
//! filters produce, so every mode runs through identical guards.

use focus_types::EntityType;
use serde_json::{Map, Value};
use tracing::debug;

use super::request::QueryRequest;
use crate::config::QueryConfig;
use crate::contract::{
    CompiledQuery, DateBound, DateRange, FilterProperty, FilterSet, FilterValue, OutputField,
    QueryEntity, QueryMode, TagOperator, ValueType,
};
use crate::error::ContractError;

/// Window used by `upcoming` when `daysAhead` is not given
pub const DEFAULT_DAYS_AHEAD: i64 = 7;
const MAX_DAYS_AHEAD: i64 = 365;

#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    limits: QueryConfig,
}

impl QueryCompiler {
    pub fn new(limits: QueryConfig) -> Self {
        Self { limits }
    }

    pub fn compile(&self, request: &QueryRequest) -> Result<CompiledQuery, ContractError> {
        let entity = request.entity;
        let filters = self.transform_filters(entity, request.mode, &request.filters)?;

        let fields = match &request.fields {
            Some(requested) if !requested.is_empty() => {
                let mut fields = Vec::with_capacity(requested.len());
                for field in requested {
                    if !field.applies_to(entity) {
                        return Err(ContractError::UnknownField {
                            field: field.name().to_string(),
                            context: format!("{} fields", entity),
                        });
                    }
                    if !fields.contains(field) {
                        fields.push(*field);
                    }
                }
                fields
            }
            _ => entity.default_fields(),
        };

        for spec in &request.sort {
            if !spec.field.output_field().applies_to(entity) {
                return Err(ContractError::InvalidValue {
                    field: "sort".to_string(),
                    expected: format!("a field {} can be sorted by", entity),
                    found: spec.field.output_field().name().to_string(),
                });
            }
        }

        let limit = request.limit.unwrap_or(self.limits.default_limit);
        if limit == 0 || limit > self.limits.max_limit {
            return Err(ContractError::InvalidValue {
                field: "limit".to_string(),
                expected: format!("between 1 and {}", self.limits.max_limit),
                found: limit.to_string(),
            });
        }

        let query = CompiledQuery {
            entity,
            mode: request.mode,
            filters,
            fields,
            sort: request.sort.clone(),
            limit,
            offset: request.offset.unwrap_or(0),
            count_only: request.count_only,
        };
        debug!(
            entity = %entity,
            mode = query.mode.as_str(),
            filters = query.filters.len(),
            two_phase = query.needs_secondary(),
            "Compiled query"
        );
        Ok(query)
    }

    /// Translate external filters (plus whatever `mode` implies) into a
    /// validated `FilterSet`. Explicit filters override mode-implied values.
    pub fn transform_filters(
        &self,
        entity: QueryEntity,
        mode: QueryMode,
        external: &Map<String, Value>,
    ) -> Result<FilterSet, ContractError> {
        let entity_type = entity.entity_type();
        let days_ahead = match external.get("daysAhead") {
            None => DEFAULT_DAYS_AHEAD,
            Some(_) if mode != QueryMode::Upcoming => {
                return Err(ContractError::InvalidValue {
                    field: "daysAhead".to_string(),
                    expected: "only with mode 'upcoming'".to_string(),
                    found: format!("mode '{}'", mode.as_str()),
                })
            }
            Some(raw) => raw
                .as_i64()
                .filter(|d| (1..=MAX_DAYS_AHEAD).contains(d))
                .ok_or_else(|| {
                    ContractError::invalid_value(
                        "daysAhead",
                        format!("integer between 1 and {}", MAX_DAYS_AHEAD),
                        raw,
                    )
                })?,
        };

        let mut filters = mode_filters(mode, days_ahead)?;

        for (key, raw) in external {
            match key.as_str() {
                "daysAhead" => {}
                "status" => apply_status(&mut filters, entity_type, raw)?,
                "tags" => {
                    let value = tag_filter(raw)?;
                    filters.insert(FilterProperty::Tags, value)?;
                }
                "search" if external.contains_key("text") => {}
                "search" | "text" => {
                    filters.insert(FilterProperty::Text, text_value(key, raw)?)?;
                }
                name => {
                    let property = FilterProperty::from_name(name).ok_or_else(|| {
                        ContractError::UnknownFilter {
                            key: name.to_string(),
                            entity: entity_type,
                        }
                    })?;
                    filters.insert(property, parse_value(property, raw)?)?;
                }
            }
        }

        if mode == QueryMode::Search && !filters.contains(FilterProperty::Text) {
            return Err(ContractError::MissingField {
                field: "text".to_string(),
                context: "search mode".to_string(),
            });
        }

        filters.validate_for(entity_type)?;
        Ok(filters)
    }
}

fn mode_filters(mode: QueryMode, days_ahead: i64) -> Result<FilterSet, ContractError> {
    let mut filters = FilterSet::new();
    let open = FilterValue::Bool(false);
    match mode {
        QueryMode::All | QueryMode::Search => {}
        QueryMode::Inbox => filters.insert(FilterProperty::InInbox, FilterValue::Bool(true))?,
        QueryMode::Flagged => filters.insert(FilterProperty::Flagged, FilterValue::Bool(true))?,
        QueryMode::Available => {
            filters.insert(FilterProperty::Available, FilterValue::Bool(true))?;
            filters.insert(FilterProperty::Completed, open)?;
        }
        QueryMode::Today => {
            filters.insert(
                FilterProperty::DueDate,
                FilterValue::DateRange(DateRange::before(DateBound::EndOfToday)),
            )?;
            filters.insert(FilterProperty::Completed, open)?;
        }
        QueryMode::Overdue => {
            filters.insert(
                FilterProperty::DueDate,
                FilterValue::DateRange(DateRange::before(DateBound::Now)),
            )?;
            filters.insert(FilterProperty::Completed, open)?;
        }
        QueryMode::Upcoming => {
            filters.insert(
                FilterProperty::DueDate,
                FilterValue::DateRange(DateRange::between(
                    DateBound::Now,
                    DateBound::DaysFromNow { days: days_ahead },
                )),
            )?;
            filters.insert(FilterProperty::Completed, open)?;
        }
    }
    Ok(filters)
}

/// `status` is completion for tasks and lifecycle for projects
fn apply_status(
    filters: &mut FilterSet,
    entity: EntityType,
    raw: &Value,
) -> Result<(), ContractError> {
    let status = raw.as_str().unwrap_or_default();
    match (entity, status) {
        (EntityType::Task, "completed") => {
            filters.insert(FilterProperty::Completed, FilterValue::Bool(true))
        }
        (EntityType::Task, "active") => {
            filters.insert(FilterProperty::Completed, FilterValue::Bool(false))
        }
        (EntityType::Task, "dropped") => {
            filters.remove(FilterProperty::Completed);
            filters.insert(FilterProperty::Dropped, FilterValue::Bool(true))
        }
        (EntityType::Task, _) => Err(ContractError::invalid_value(
            "status",
            "one of completed|active|dropped",
            raw,
        )),
        (EntityType::Project, "active" | "done" | "dropped") => filters.insert(
            FilterProperty::ProjectStatus,
            FilterValue::Enum(status.to_string()),
        ),
        (EntityType::Project, "on_hold") => filters.insert(
            FilterProperty::ProjectStatus,
            FilterValue::Enum("onHold".to_string()),
        ),
        (EntityType::Project, _) => Err(ContractError::invalid_value(
            "status",
            "one of active|on_hold|done|dropped",
            raw,
        )),
        (EntityType::Tag, _) => Err(ContractError::UnknownFilter {
            key: "status".to_string(),
            entity,
        }),
    }
}

/// `{any|all|none: [..]}`; the first non-empty list in that order wins
fn tag_filter(raw: &Value) -> Result<FilterValue, ContractError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| ContractError::invalid_value("tags", "object with any/all/none", raw))?;
    if let Some(key) = obj.keys().find(|k| !matches!(k.as_str(), "any" | "all" | "none")) {
        return Err(ContractError::UnknownField {
            field: key.clone(),
            context: "tags filter".to_string(),
        });
    }

    for (key, operator) in [
        ("any", TagOperator::Or),
        ("all", TagOperator::And),
        ("none", TagOperator::NotIn),
    ] {
        let Some(list) = obj.get(key) else {
            continue;
        };
        let tags = string_list(&format!("tags.{}", key), list)?;
        if !tags.is_empty() {
            return Ok(FilterValue::TagSet { tags, operator });
        }
    }
    Err(ContractError::invalid_value(
        "tags",
        "a non-empty any, all or none list",
        raw,
    ))
}

fn string_list(field: &str, raw: &Value) -> Result<Vec<String>, ContractError> {
    let items = raw
        .as_array()
        .ok_or_else(|| ContractError::invalid_value(field, "list of strings", raw))?;
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => {
                if !out.iter().any(|t| t == s) {
                    out.push(s.to_string());
                }
            }
            _ => return Err(ContractError::invalid_value(field, "non-empty string", item)),
        }
    }
    Ok(out)
}

fn text_value(key: &str, raw: &Value) -> Result<FilterValue, ContractError> {
    match raw.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(FilterValue::Text(s.to_string())),
        _ => Err(ContractError::invalid_value(key, "non-empty string", raw)),
    }
}

/// Parse an internally-named filter by its specification value type
fn parse_value(property: FilterProperty, raw: &Value) -> Result<FilterValue, ContractError> {
    let name = property.name();
    match property.spec().value_type {
        ValueType::Boolean => raw
            .as_bool()
            .map(FilterValue::Bool)
            .ok_or_else(|| ContractError::invalid_value(name, "boolean", raw)),
        ValueType::String => text_value(name, raw),
        ValueType::NullableString => match raw {
            Value::Null => Ok(FilterValue::OptionalText(None)),
            Value::String(s) if !s.trim().is_empty() => {
                Ok(FilterValue::OptionalText(Some(s.trim().to_string())))
            }
            _ => Err(ContractError::invalid_value(name, "string or null", raw)),
        },
        ValueType::StringSet => tag_filter(raw),
        ValueType::DateRange => Ok(FilterValue::DateRange(DateRange::from_external(name, raw)?)),
        ValueType::Enum(_) => raw
            .as_str()
            .map(|s| FilterValue::Enum(s.to_string()))
            .ok_or_else(|| ContractError::invalid_value(name, "string", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{SortDirection, SortField, SortSpec};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn filters(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn compile_tasks(v: Value) -> Result<FilterSet, ContractError> {
        QueryCompiler::default().transform_filters(QueryEntity::Tasks, QueryMode::All, &filters(v))
    }

    #[test]
    fn test_status_and_any_tags() {
        let set = compile_tasks(json!({
            "status": "completed",
            "tags": {"any": ["urgent", "home"]}
        }))
        .unwrap();
        assert_eq!(
            set.to_params(),
            json!({"completed": true, "tags": ["urgent", "home"], "tagsOperator": "OR"})
        );
    }

    #[test]
    fn test_active_and_empty() {
        assert_eq!(
            compile_tasks(json!({"status": "active"})).unwrap().completed(),
            Some(false)
        );
        assert_eq!(compile_tasks(json!({})).unwrap().completed(), None);
    }

    #[test]
    fn test_dropped_does_not_touch_completion() {
        let set = compile_tasks(json!({"status": "dropped"})).unwrap();
        assert_eq!(set.completed(), None);
        assert_eq!(
            set.get(FilterProperty::Dropped),
            Some(&FilterValue::Bool(true))
        );
    }

    #[test]
    fn test_tag_precedence() {
        let set = compile_tasks(json!({
            "tags": {"none": ["x"], "all": ["a", "b"], "any": []}
        }))
        .unwrap();
        assert_eq!(
            set.get(FilterProperty::Tags),
            Some(&FilterValue::TagSet {
                tags: vec!["a".into(), "b".into()],
                operator: TagOperator::And,
            })
        );
        assert!(compile_tasks(json!({"tags": {"any": []}})).is_err());
        assert!(compile_tasks(json!({"tags": {"some": ["a"]}})).is_err());
    }

    #[test]
    fn test_text_wins_over_search() {
        let set = compile_tasks(json!({"search": "b", "text": "a"})).unwrap();
        assert_eq!(
            set.get(FilterProperty::Text),
            Some(&FilterValue::Text("a".into()))
        );
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let err = compile_tasks(json!({"colour": "red"})).unwrap_err();
        assert_eq!(
            err,
            ContractError::UnknownFilter {
                key: "colour".into(),
                entity: EntityType::Task
            }
        );
    }

    #[test]
    fn test_modes_expand_into_filters() {
        let compiler = QueryCompiler::default();
        let today = compiler
            .transform_filters(QueryEntity::Tasks, QueryMode::Today, &Map::new())
            .unwrap();
        assert_eq!(
            today.to_params(),
            json!({
                "completed": false,
                "dueDate": {"before": {"kind": "endOfToday"}, "inclusive": false}
            })
        );

        let upcoming = compiler
            .transform_filters(
                QueryEntity::Tasks,
                QueryMode::Upcoming,
                &filters(json!({"daysAhead": 3})),
            )
            .unwrap();
        assert_eq!(
            upcoming.to_params()["dueDate"]["before"],
            json!({"kind": "daysFromNow", "days": 3})
        );

        let overridden = compiler
            .transform_filters(
                QueryEntity::Tasks,
                QueryMode::Available,
                &filters(json!({"status": "completed"})),
            )
            .unwrap();
        assert_eq!(overridden.completed(), Some(true));
    }

    #[test]
    fn test_search_mode_requires_text() {
        let err = QueryCompiler::default()
            .transform_filters(QueryEntity::Tasks, QueryMode::Search, &Map::new())
            .unwrap_err();
        assert!(matches!(err, ContractError::MissingField { .. }));
    }

    #[test]
    fn test_project_status_mapping() {
        let set = QueryCompiler::default()
            .transform_filters(
                QueryEntity::Projects,
                QueryMode::All,
                &filters(json!({"status": "on_hold", "folder": "Work"})),
            )
            .unwrap();
        assert_eq!(
            set.to_params(),
            json!({"projectStatus": "onHold", "folder": "Work"})
        );
    }

    #[test]
    fn test_inbox_mode_rejected_for_projects() {
        assert!(QueryCompiler::default()
            .transform_filters(QueryEntity::Projects, QueryMode::Inbox, &Map::new())
            .is_err());
    }

    #[test]
    fn test_compile_defaults_and_limits() {
        let compiler = QueryCompiler::default();
        let mut request = QueryRequest::new(QueryEntity::Tasks);
        let query = compiler.compile(&request).unwrap();
        assert_eq!(query.limit, 25);
        assert_eq!(query.fields, QueryEntity::Tasks.default_fields());

        request.limit = Some(501);
        assert!(compiler.compile(&request).is_err());

        request.limit = Some(5);
        request.fields = Some(vec![OutputField::Status]);
        assert!(compiler.compile(&request).is_err());
    }

    #[test]
    fn test_compile_is_idempotent() {
        let compiler = QueryCompiler::default();
        let mut request = QueryRequest::new(QueryEntity::Tasks);
        request.filters = filters(json!({"flagged": true, "dueDate": {"before": "2026-12-01"}}));
        request.sort = vec![SortSpec {
            field: SortField::DueDate,
            direction: SortDirection::Asc,
        }];
        let a = compiler.compile(&request).unwrap();
        let b = compiler.compile(&request).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    proptest! {
        #[test]
        fn prop_cache_key_ignores_key_order(
            flagged in any::<bool>(),
            text in "[a-z]{1,8}",
            reverse in any::<bool>(),
        ) {
            let mut pairs = vec![
                ("flagged".to_string(), json!(flagged)),
                ("text".to_string(), json!(text)),
                ("tags".to_string(), json!({"all": ["a", "b"]})),
            ];
            if reverse {
                pairs.reverse();
            }
            let compiler = QueryCompiler::default();
            let mut shuffled = QueryRequest::new(QueryEntity::Tasks);
            shuffled.filters = pairs.into_iter().collect();
            let mut canonical = QueryRequest::new(QueryEntity::Tasks);
            canonical.filters = filters(json!({
                "tags": {"all": ["a", "b"]}, "text": text, "flagged": flagged
            }));
            prop_assert_eq!(
                compiler.compile(&shuffled).unwrap().cache_key(),
                compiler.compile(&canonical).unwrap().cache_key()
            );
        }
    }
}
