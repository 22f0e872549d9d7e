//! Secondary-context batch evaluation
//!
//! Properties the primary dialect cannot read are evaluated for all
//! candidates of one query in a single `evaluateJavascript` call. The batch
//! returns a verdict per id; filtering, sorting and paging of the merged
//! records then happen here.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::filter_block::FilterBlock;
use super::helpers::{prelude, Dialect};
use crate::bridge::{build_script, ScriptParams};
use crate::contract::{CompiledQuery, FilterSet, OutputField, QueryEntity, SortDirection, SortSpec};
use crate::error::ScriptBuildError;

const BATCH_TEMPLATE: &str = r#"(() => {
  const F = {{filters}};
  const IDS = {{ids}};
  const KIND = {{kind}};
/*HELPERS*/
  const READ = {
/*READERS*/
  };
  function verdict(item) {
/*GUARDS*/
    return true;
  }
  const verdicts = {};
  for (const id of IDS) {
    const item = findEntity(KIND, id);
    if (!item) { verdicts[id] = { pass: false, missing: true }; continue; }
    if (!verdict(item)) { verdicts[id] = { pass: false }; continue; }
    const fields = {};
    for (const name in READ) fields[name] = READ[name](item);
    verdicts[id] = { pass: true, fields: fields };
  }
  return JSON.stringify({ verdicts: verdicts });
})()"#;

/// Primary-dialect shell that hands an OmniJS program to the application
const EVALUATE_TEMPLATE: &str = r#"(() => {
  const app = Application('OmniFocus');
  const source = {{source}};
  const result = app.evaluateJavascript(source);
  return typeof result === 'string' ? result : JSON.stringify(result);
})()"#;

/// Wrap an OmniJS program so the primary host evaluates it
pub fn evaluate_wrapper(source: &str) -> Result<String, ScriptBuildError> {
    let mut params = ScriptParams::new();
    params.insert("source".into(), Value::String(source.to_string()));
    build_script(EVALUATE_TEMPLATE, &params)
}

/// Build the OmniJS program judging `ids` against the deferred guards of
/// `block` and reading `fields`
pub fn generate_secondary_batch_script(
    entity: QueryEntity,
    block: &FilterBlock,
    filters: &FilterSet,
    ids: &[String],
    fields: &[OutputField],
) -> Result<String, ScriptBuildError> {
    let readers = fields
        .iter()
        .filter_map(|field| {
            secondary_reader(*field)
                .map(|reader| format!("    {}: (item) => {},", field.name(), reader))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let template = BATCH_TEMPLATE
        .replace("/*HELPERS*/", &prelude(Dialect::Secondary))
        .replace("/*READERS*/", &readers)
        .replace("/*GUARDS*/", &block.render_secondary("    "));

    let mut params = ScriptParams::new();
    params.insert("filters".into(), filters.to_params());
    params.insert("ids".into(), json!(ids));
    params.insert("kind".into(), json!(entity.entity_type().as_str()));
    build_script(&template, &params)
}

/// Secondary-dialect reader for `field`; `None` for primary values
fn secondary_reader(field: OutputField) -> Option<&'static str> {
    match field {
        OutputField::PlannedDate => Some("isoOrNull(item.plannedDate || null)"),
        OutputField::CompletionDate => Some("isoOrNull(item.completionDate || null)"),
        OutputField::Modified => Some("isoOrNull(item.modified || null)"),
        OutputField::RepetitionRule => Some("repetitionOf(item)"),
        OutputField::Id
        | OutputField::Name
        | OutputField::Note
        | OutputField::Completed
        | OutputField::Dropped
        | OutputField::Flagged
        | OutputField::Available
        | OutputField::Blocked
        | OutputField::InInbox
        | OutputField::DueDate
        | OutputField::DeferDate
        | OutputField::Added
        | OutputField::Tags
        | OutputField::Project
        | OutputField::ProjectId
        | OutputField::EstimatedMinutes
        | OutputField::Status
        | OutputField::Folder
        | OutputField::TaskCount => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub missing: bool,
}

/// Keep candidates whose verdict passed, merging in the secondary fields.
/// Candidates without a verdict are dropped.
pub fn apply_verdicts(
    candidates: Vec<Map<String, Value>>,
    verdicts: &HashMap<String, Verdict>,
) -> Vec<Map<String, Value>> {
    candidates
        .into_iter()
        .filter_map(|mut record| {
            let id = record.get("id").and_then(Value::as_str)?;
            let verdict = verdicts.get(id).filter(|v| v.pass)?;
            for (name, value) in &verdict.fields {
                record.insert(name.clone(), value.clone());
            }
            Some(record)
        })
        .collect()
}

/// Stable multi-key sort; nulls sort last in either direction
pub fn sort_records(records: &mut [Map<String, Value>], sort: &[SortSpec]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for spec in sort {
            let key = spec.field.output_field().name();
            let (x, y) = (a.get(key), b.get(key));
            let ordering = match (is_null(x), is_null(y)) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_values(x, y);
                    match spec.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn is_null(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => compare_text(x, y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Case-folded UTF-16 code-unit order, ties broken on the original text.
/// `compareText` in the generated scripts uses the same collation.
fn compare_text(x: &str, y: &str) -> Ordering {
    x.to_lowercase()
        .encode_utf16()
        .cmp(y.to_lowercase().encode_utf16())
        .then_with(|| x.encode_utf16().cmp(y.encode_utf16()))
}

/// Turn merged two-phase records into the final query payload
pub fn finalize_records(mut records: Vec<Map<String, Value>>, query: &CompiledQuery) -> Value {
    if query.count_only {
        return json!({ "count": records.len() });
    }
    sort_records(&mut records, &query.sort);
    let total = records.len();
    let page: Vec<Value> = records
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(|record| Value::Object(project(record, &query.fields)))
        .collect();
    json!({
        "count": page.len(),
        "truncated": total > query.offset + query.limit,
        "items": page,
    })
}

fn project(mut record: Map<String, Value>, fields: &[OutputField]) -> Map<String, Value> {
    fields
        .iter()
        .map(|f| {
            let name = f.name();
            (name.to_string(), record.remove(name).unwrap_or(Value::Null))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::placeholders;
    use crate::contract::{
        DateBound, DateRange, FilterProperty, FilterValue, QueryMode, SortField,
    };
    use crate::script::filter_block::generate_filter_block;
    use focus_types::EntityType;
    use pretty_assertions::assert_eq;

    fn record(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_batch_script_embeds_ids_and_deferred_guards() {
        let mut filters = FilterSet::new();
        filters.insert(FilterProperty::Flagged, FilterValue::Bool(true)).unwrap();
        filters
            .insert(
                FilterProperty::Modified,
                FilterValue::DateRange(DateRange::after(DateBound::StartOfToday)),
            )
            .unwrap();
        let block = generate_filter_block(EntityType::Task, &filters).unwrap();

        let source = generate_secondary_batch_script(
            QueryEntity::Tasks,
            &block,
            &filters,
            &["a\"b".to_string(), "c".to_string()],
            &[OutputField::Modified, OutputField::Name],
        )
        .unwrap();

        assert!(source.contains(r#"const IDS = ["a\"b","c"];"#));
        assert!(source.contains("if (!(inDateRange(item.modified || null, F.modified))) return false;"));
        assert!(!source.contains("F.flagged)) return false"));
        assert!(source.contains("modified: (item) => isoOrNull(item.modified || null),"));
        assert!(!source.contains("name: (item)"));
        assert!(placeholders(&source).is_empty());
    }

    #[test]
    fn test_evaluate_wrapper_quotes_source() {
        let script = evaluate_wrapper("(() => 'x\n')()").unwrap();
        assert!(script.contains(r#"const source = "(() => 'x\n')()";"#));
        assert!(script.contains("app.evaluateJavascript(source)"));
    }

    #[test]
    fn test_apply_verdicts() {
        let candidates = vec![
            record(json!({"id": "a", "name": "A"})),
            record(json!({"id": "b", "name": "B"})),
            record(json!({"id": "c", "name": "C"})),
        ];
        let verdicts: HashMap<String, Verdict> = serde_json::from_value(json!({
            "a": {"pass": true, "fields": {"modified": "2026-01-02T00:00:00.000Z"}},
            "b": {"pass": false}
        }))
        .unwrap();

        let kept = apply_verdicts(candidates, &verdicts);
        assert_eq!(
            kept,
            vec![record(
                json!({"id": "a", "name": "A", "modified": "2026-01-02T00:00:00.000Z"})
            )]
        );
    }

    #[test]
    fn test_text_sort_ignores_locale() {
        let mut records: Vec<_> = ["école", "Zoë", "apple", "Éclair", "Apple"]
            .iter()
            .map(|name| record(json!({"name": name})))
            .collect();
        let by_name = [SortSpec {
            field: SortField::Name,
            direction: SortDirection::Asc,
        }];
        sort_records(&mut records, &by_name);
        let names: Vec<_> = records.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(
            names,
            vec![json!("Apple"), json!("apple"), json!("Zoë"), json!("Éclair"), json!("école")]
        );
    }

    #[test]
    fn test_sort_nulls_last_both_directions() {
        let mut records = vec![
            record(json!({"id": "1", "dueDate": null})),
            record(json!({"id": "2", "dueDate": "2026-01-02"})),
            record(json!({"id": "3", "dueDate": "2026-01-01"})),
        ];
        let asc = [SortSpec {
            field: SortField::DueDate,
            direction: SortDirection::Asc,
        }];
        sort_records(&mut records, &asc);
        let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("3"), json!("2"), json!("1")]);

        let desc = [SortSpec {
            field: SortField::DueDate,
            direction: SortDirection::Desc,
        }];
        sort_records(&mut records, &desc);
        let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("2"), json!("3"), json!("1")]);
    }

    #[test]
    fn test_finalize_pages_and_projects() {
        let query = CompiledQuery {
            entity: QueryEntity::Tasks,
            mode: QueryMode::All,
            filters: FilterSet::new(),
            fields: vec![OutputField::Name, OutputField::PlannedDate],
            sort: vec![SortSpec {
                field: SortField::Name,
                direction: SortDirection::Asc,
            }],
            limit: 1,
            offset: 1,
            count_only: false,
        };
        let records = vec![
            record(json!({"id": "2", "name": "beta", "plannedDate": null})),
            record(json!({"id": "1", "name": "Alpha", "plannedDate": "2026-02-01"})),
            record(json!({"id": "3", "name": "gamma"})),
        ];
        assert_eq!(
            finalize_records(records, &query),
            json!({
                "count": 1,
                "truncated": true,
                "items": [{"name": "beta", "plannedDate": null}]
            })
        );
    }
}
