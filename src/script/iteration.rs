//! Iteration scripts
//!
//! Wraps a filter block in a walk over one collection of the default
//! document. The script reads only primary-dialect values; when a query
//! needs the secondary context the script returns candidates instead of a
//! final page.

use serde_json::{json, Value};

use super::filter_block::{generate_filter_block, FilterBlock};
use super::helpers::{prelude, Dialect};
use crate::bridge::{build_script, ScriptParams};
use crate::contract::{CompiledQuery, FilterProperty, FilterSet, OutputField, QueryEntity, SortSpec};
use crate::error::{ContractError, ScriptBuildError};

const ITERATION_TEMPLATE: &str = r#"(() => {
  const app = Application('OmniFocus');
  const doc = app.defaultDocument;
  const F = {{filters}};
  const LIMIT = {{limit}};
  const OFFSET = {{offset}};
  const COUNT_ONLY = {{countOnly}};
  const FIELDS = {{fields}};
  const SORT = {{sort}};
/*HELPERS*/
  const READ = {
/*READERS*/
  };
  const collection = /*COLLECTION*/;
  const records = [];
  let matched = 0;
  let truncated = false;
  const stopAt = SORT.length === 0 ? OFFSET + LIMIT : Infinity;
  for (let i = 0; i < collection.length; i++) {
    const item = collection[i];
/*GUARDS*/
    matched++;
    if (COUNT_ONLY) continue;
    if (records.length >= stopAt) { truncated = true; break; }
    const record = {};
    for (const name in READ) record[name] = READ[name](item);
    records.push(record);
  }
  if (COUNT_ONLY) return JSON.stringify({ count: matched });
  const ordered = sortRecords(records, SORT);
  if (ordered.length > OFFSET + LIMIT) truncated = true;
  const page = ordered.slice(OFFSET, OFFSET + LIMIT).map(r => pick(r, FIELDS));
  return JSON.stringify({ items: page, count: page.length, truncated: truncated });
})()"#;

/// A template plus the parameters that complete it
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedScript {
    pub template: String,
    pub params: ScriptParams,
    /// Output is a candidate list awaiting the secondary pass
    pub two_phase: bool,
    /// Filter properties the secondary pass must still evaluate
    pub deferred: Vec<FilterProperty>,
}

impl GeneratedScript {
    pub fn build(&self) -> Result<String, ScriptBuildError> {
        build_script(&self.template, &self.params)
    }
}

/// Knobs for one iteration script
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOptions {
    pub collection: QueryEntity,
    pub limit: usize,
    pub offset: usize,
    pub count_only: bool,
    /// Values to read per match; secondary-only fields are skipped
    pub read: Vec<OutputField>,
    /// Fields kept in each returned record
    pub project: Vec<OutputField>,
    pub sort: Vec<SortSpec>,
}

impl IterationOptions {
    pub fn new(collection: QueryEntity, limit: usize) -> Self {
        Self {
            collection,
            limit,
            offset: 0,
            count_only: false,
            read: vec![OutputField::Id],
            project: vec![OutputField::Id],
            sort: Vec::new(),
        }
    }
}

/// Walk `options.collection`, apply every primary guard for `filters`, and
/// collect up to `limit` matches (or only count them).
pub fn generate_task_iteration_script(
    filters: &FilterSet,
    options: &IterationOptions,
) -> Result<GeneratedScript, ContractError> {
    let entity = options.collection.entity_type();
    let block = generate_filter_block(entity, filters)?;
    Ok(assemble(&block, filters, options))
}

/// Script for a compiled query.
///
/// Primary-only queries get their final page from the script. Otherwise the
/// script returns up to `candidate_cap` candidates carrying every primary
/// field, and paging happens after the secondary pass.
pub fn generate_query_script(
    query: &CompiledQuery,
    candidate_cap: usize,
) -> Result<GeneratedScript, ContractError> {
    let primary_fields = query.primary_fields();
    let two_phase = query.needs_secondary();
    let options = if two_phase {
        IterationOptions {
            collection: query.entity,
            limit: candidate_cap,
            offset: 0,
            count_only: false,
            read: primary_fields.clone(),
            project: primary_fields,
            sort: Vec::new(),
        }
    } else {
        IterationOptions {
            collection: query.entity,
            limit: query.limit,
            offset: query.offset,
            count_only: query.count_only,
            read: primary_fields,
            project: query.fields.clone(),
            sort: query.sort.clone(),
        }
    };
    let mut script = generate_task_iteration_script(&query.filters, &options)?;
    script.two_phase = two_phase;
    Ok(script)
}

fn assemble(block: &FilterBlock, filters: &FilterSet, options: &IterationOptions) -> GeneratedScript {
    let readers = options
        .read
        .iter()
        .filter_map(|field| {
            primary_reader(*field, options.collection)
                .map(|reader| format!("    {}: (item) => {},", field.name(), reader))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let template = ITERATION_TEMPLATE
        .replace("/*HELPERS*/", &prelude(Dialect::Primary))
        .replace("/*READERS*/", &readers)
        .replace("/*COLLECTION*/", collection_expr(options.collection))
        .replace("/*GUARDS*/", &block.render_primary("    "));

    let fields: Vec<&str> = options.project.iter().map(OutputField::name).collect();
    let mut params = ScriptParams::new();
    params.insert("filters".into(), filters.to_params());
    params.insert("limit".into(), json!(options.limit));
    params.insert("offset".into(), json!(options.offset));
    params.insert("countOnly".into(), Value::Bool(options.count_only));
    params.insert("fields".into(), json!(fields));
    params.insert(
        "sort".into(),
        serde_json::to_value(&options.sort).unwrap_or_else(|_| json!([])),
    );

    GeneratedScript {
        template,
        params,
        two_phase: block.has_deferred(),
        deferred: block.deferred.clone(),
    }
}

fn collection_expr(entity: QueryEntity) -> &'static str {
    match entity {
        QueryEntity::Tasks => "doc.flattenedTasks()",
        QueryEntity::Projects => "doc.flattenedProjects()",
        QueryEntity::Tags => "doc.flattenedTags()",
    }
}

/// Primary-dialect reader for `field`; `None` for values only the secondary
/// context can read
pub(crate) fn primary_reader(field: OutputField, entity: QueryEntity) -> Option<&'static str> {
    let reader = match field {
        OutputField::Id => "safe(() => item.id(), null)",
        OutputField::Name => "safe(() => item.name(), null)",
        OutputField::Note => "safe(() => item.note(), null)",
        OutputField::Completed => "safe(() => item.completed(), false)",
        OutputField::Dropped => "safe(() => item.dropped(), false)",
        OutputField::Flagged => "safe(() => item.flagged(), false)",
        OutputField::Available => "isAvailable(item)",
        OutputField::Blocked => "safe(() => item.blocked(), false)",
        OutputField::InInbox => "safe(() => item.inInbox(), false)",
        OutputField::DueDate => "isoOrNull(safe(() => item.dueDate(), null))",
        OutputField::DeferDate => "isoOrNull(safe(() => item.deferDate(), null))",
        OutputField::Added => "isoOrNull(safe(() => item.creationDate(), null))",
        OutputField::Tags => "tagNames(item)",
        OutputField::Project => "projectName(item)",
        OutputField::ProjectId => "projectId(item)",
        OutputField::EstimatedMinutes => "safe(() => item.estimatedMinutes(), null)",
        OutputField::Status => "projectStatus(item)",
        OutputField::Folder => "folderName(item)",
        OutputField::TaskCount => match entity {
            QueryEntity::Tags => "safe(() => item.tasks().length, 0)",
            QueryEntity::Projects | QueryEntity::Tasks => {
                "safe(() => item.flattenedTasks().length, 0)"
            }
        },
        OutputField::PlannedDate
        | OutputField::CompletionDate
        | OutputField::Modified
        | OutputField::RepetitionRule => return None,
    };
    Some(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::placeholders;
    use crate::contract::{
        DateBound, DateRange, FilterValue, QueryMode, SortDirection, SortField, TagOperator,
    };
    use std::collections::BTreeSet;

    fn tasks_query(filters: FilterSet) -> CompiledQuery {
        CompiledQuery {
            entity: QueryEntity::Tasks,
            mode: QueryMode::All,
            filters,
            fields: vec![OutputField::Id, OutputField::Name, OutputField::DueDate],
            sort: Vec::new(),
            limit: 25,
            offset: 0,
            count_only: false,
        }
    }

    fn flagged_and_tagged() -> FilterSet {
        let mut filters = FilterSet::new();
        filters.insert(FilterProperty::Flagged, FilterValue::Bool(true)).unwrap();
        filters
            .insert(
                FilterProperty::Tags,
                FilterValue::TagSet {
                    tags: vec!["home".into()],
                    operator: TagOperator::Or,
                },
            )
            .unwrap();
        filters
    }

    #[test]
    fn test_template_placeholders_match_params() {
        let script = generate_query_script(&tasks_query(flagged_and_tagged()), 2_000).unwrap();
        let expected: BTreeSet<String> = script.params.keys().cloned().collect();
        assert_eq!(placeholders(&script.template), expected);
        assert!(script.build().is_ok());
    }

    #[test]
    fn test_guards_and_readers_are_inlined() {
        let script = generate_query_script(&tasks_query(flagged_and_tagged()), 2_000).unwrap();
        assert!(!script.two_phase);
        assert!(script
            .template
            .contains("if (!(safe(() => item.flagged(), false) === F.flagged)) continue;"));
        assert!(script
            .template
            .contains("if (!(matchesTags(tagNames(item), F.tags, F.tagsOperator))) continue;"));
        assert!(script.template.contains("dueDate: (item) => isoOrNull"));
        assert!(script.template.contains("doc.flattenedTasks()"));
        assert_eq!(script.params["limit"], json!(25));
        assert_eq!(script.params["fields"], json!(["id", "name", "dueDate"]));
    }

    #[test]
    fn test_same_filters_same_template_across_modes() {
        let mut inbox = tasks_query(flagged_and_tagged());
        inbox.mode = QueryMode::Inbox;
        inbox.limit = 5;
        let all = tasks_query(flagged_and_tagged());
        assert_eq!(
            generate_query_script(&inbox, 2_000).unwrap().template,
            generate_query_script(&all, 2_000).unwrap().template
        );
    }

    #[test]
    fn test_two_phase_returns_candidates() {
        let mut filters = flagged_and_tagged();
        filters
            .insert(
                FilterProperty::PlannedDate,
                FilterValue::DateRange(DateRange::before(DateBound::EndOfToday)),
            )
            .unwrap();
        let mut query = tasks_query(filters);
        query.offset = 10;
        query.sort = vec![SortSpec {
            field: SortField::Name,
            direction: SortDirection::Asc,
        }];

        let script = generate_query_script(&query, 500).unwrap();
        assert!(script.two_phase);
        assert_eq!(script.deferred, vec![FilterProperty::PlannedDate]);
        assert!(!script.template.contains("item.plannedDate"));
        assert_eq!(script.params["limit"], json!(500));
        assert_eq!(script.params["offset"], json!(0));
        assert_eq!(script.params["sort"], json!([]));
    }

    #[test]
    fn test_count_only() {
        let mut query = tasks_query(FilterSet::new());
        query.count_only = true;
        let script = generate_query_script(&query, 2_000).unwrap();
        assert_eq!(script.params["countOnly"], json!(true));
        assert!(script.template.contains("return JSON.stringify({ count: matched });"));
    }

    #[test]
    fn test_every_primary_field_has_reader() {
        for entity in [QueryEntity::Tasks, QueryEntity::Projects, QueryEntity::Tags] {
            for field in entity.default_fields() {
                assert!(primary_reader(field, entity).is_some(), "{entity} {:?}", field);
            }
        }
        assert!(primary_reader(OutputField::Modified, QueryEntity::Tasks).is_none());
    }
}
