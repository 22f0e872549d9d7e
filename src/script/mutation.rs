//! Mutation scripts
//!
//! One primary-dialect script per operation. Property writes come from the
//! mutation specification: each property has exactly one setter, in the
//! dialect its table row names. Secondary setters are compiled into a single
//! OmniJS function that the primary script evaluates once.

use serde_json::{json, Value};

use crate::bridge::{build_script, ScriptParams};
use crate::contract::{
    ChangeSet, CompleteMutation, CreateMutation, DeleteMutation, MutableProperty, MutationOp,
    MutationTarget, UpdateMutation,
};
use crate::error::ScriptBuildError;

const MUTATION_TEMPLATE: &str = r#"(() => {
  const app = Application('OmniFocus');
  app.includeStandardAdditions = false;
  const doc = app.defaultDocument;
  const KIND = {{kind}};
  const ID = {{id}};
  const C = {{changes}};
  const S = {{secondary}};
  const DATE = {{completionDate}};
  const SECONDARY = {{secondarySource}};
/*HELPERS*/
  try {
/*BODY*/
  } catch (e) {
    return JSON.stringify({ error: true, message: String(e && e.message ? e.message : e) });
  }
})()"#;

const MUTATION_HELPERS: &str = r#"
function first(list) {
  return list.length > 0 ? list[0] : null;
}
function findTask(id) {
  return first(doc.flattenedTasks.whose({ id: id })());
}
function findProject(ref) {
  return first(doc.flattenedProjects.whose({ id: ref })()) || first(doc.flattenedProjects.whose({ name: ref })());
}
function findFolder(name) {
  return first(doc.flattenedFolders.whose({ name: name })());
}
function findOrCreateTag(name) {
  const found = first(doc.flattenedTags.whose({ name: name })());
  if (found) return found;
  const tag = app.Tag({ name: name });
  doc.tags.push(tag);
  return tag;
}
function toDate(value) {
  return value === null ? null : new Date(value);
}
function addTags(item, names) {
  for (const name of names) app.add(findOrCreateTag(name), { to: item.tags });
}
function removeTags(item, names) {
  const drop = new Set(names.map(n => n.toLowerCase()));
  for (const tag of item.tags()) {
    if (drop.has(tag.name().toLowerCase())) app.remove(tag, { from: item.tags });
  }
}
function replaceTags(item, names) {
  for (const tag of item.tags()) app.remove(tag, { from: item.tags });
  addTags(item, names);
}
function moveToProject(item, ref) {
  if (ref === null) {
    app.move(item, { to: doc.inboxTasks.end });
    return;
  }
  const project = findProject(ref);
  if (!project) throw new Error('Project not found: ' + ref);
  app.move(item, { to: project.tasks.end });
}
function moveUnder(item, parentId) {
  const parent = findTask(parentId);
  if (!parent) throw new Error('Parent task not found: ' + parentId);
  app.move(item, { to: parent.tasks.end });
}
function moveToFolder(item, name) {
  const folder = findFolder(name);
  if (!folder) throw new Error('Folder not found: ' + name);
  app.move(item, { to: folder.projects.end });
}
function statusValue(status) {
  return { active: 'active status', onHold: 'on hold status', done: 'done status', dropped: 'dropped status' }[status];
}
function notFound(what, id) {
  return JSON.stringify({ error: true, message: what + ' not found: ' + id });
}
function callSecondary(source, args) {
  const raw = app.evaluateJavascript(source + '(' + args.map(a => JSON.stringify(a)).join(',') + ')');
  const parsed = typeof raw === 'string' ? JSON.parse(raw) : raw;
  if (parsed && parsed.error) throw new Error(parsed.message);
  return parsed;
}
"#;

const SECONDARY_FUNCTION: &str = r#"(function (kind, id, S) {
  const item = kind === 'project' ? Project.byIdentifier(id) : Task.byIdentifier(id);
  if (!item) return JSON.stringify({ error: true, message: 'Not found: ' + id });
/*SETTERS*/
  return JSON.stringify({ ok: true });
})"#;

const COMPLETE_FUNCTION: &str = r#"(function (kind, id, date) {
  const item = kind === 'project' ? Project.byIdentifier(id) : Task.byIdentifier(id);
  if (!item) return JSON.stringify({ error: true, message: 'Not found: ' + id });
  item.markComplete(new Date(date));
  return JSON.stringify({ ok: true });
})"#;

/// Complete primary-dialect script for one operation
pub fn generate_mutation_script(op: &MutationOp) -> Result<String, ScriptBuildError> {
    let (body, params) = match op {
        MutationOp::Create(m) => create(m),
        MutationOp::Update(m) => update(m),
        MutationOp::Complete(m) => complete(m),
        MutationOp::Delete(m) => delete(m),
    };
    let template = MUTATION_TEMPLATE
        .replace("/*HELPERS*/", MUTATION_HELPERS)
        .replace("/*BODY*/", &body);
    build_script(&template, &params)
}

fn base_params(kind: MutationTarget, id: Option<&str>) -> ScriptParams {
    let mut params = ScriptParams::new();
    params.insert("kind".into(), json!(kind.entity_type().as_str()));
    params.insert("id".into(), json!(id));
    params.insert("changes".into(), json!({}));
    params.insert("secondary".into(), json!({}));
    params.insert("completionDate".into(), Value::Null);
    params.insert("secondarySource".into(), Value::Null);
    params
}

fn with_changes(params: &mut ScriptParams, changes: &ChangeSet) {
    params.insert("changes".into(), changes.primary_params());
    params.insert("secondary".into(), changes.secondary_params());
    if changes.has_secondary() {
        params.insert(
            "secondarySource".into(),
            Value::String(secondary_function(changes)),
        );
    }
}

fn find_line(target: MutationTarget) -> &'static str {
    match target {
        MutationTarget::Task => {
            "    const item = findTask(ID);\n    if (!item) return notFound('Task', ID);"
        }
        MutationTarget::Project => {
            "    const item = findProject(ID);\n    if (!item) return notFound('Project', ID);"
        }
    }
}

const APPLY_SECONDARY: &str =
    "    if (SECONDARY !== null) callSecondary(SECONDARY, [KIND, item.id(), S]);";

fn create(m: &CreateMutation) -> (String, ScriptParams) {
    let placement = match m.target {
        MutationTarget::Task => {
            r#"    let container = null;
    if (C.parentTaskId !== undefined) {
      container = findTask(C.parentTaskId);
      if (!container) return notFound('Parent task', C.parentTaskId);
    } else if (C.project !== undefined && C.project !== null) {
      container = findProject(C.project);
      if (!container) return notFound('Project', C.project);
    }
    const item = app.Task({ name: C.name });
    (container ? container.tasks : doc.inboxTasks).push(item);"#
        }
        MutationTarget::Project => {
            r#"    let folder = null;
    if (C.folder !== undefined) {
      folder = findFolder(C.folder);
      if (!folder) return notFound('Folder', C.folder);
    }
    const item = app.Project({ name: C.name });
    (folder ? folder.projects : doc.projects).push(item);"#
        }
    };
    let placed = [
        MutableProperty::Name,
        MutableProperty::Project,
        MutableProperty::ParentTaskId,
        MutableProperty::Folder,
    ];
    let body = [
        placement.to_string(),
        primary_setters(&m.data, &placed),
        APPLY_SECONDARY.to_string(),
        "    return JSON.stringify({ id: item.id(), name: item.name(), created: true });"
            .to_string(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n");

    let mut params = base_params(m.target, None);
    with_changes(&mut params, &m.data);
    (body, params)
}

fn update(m: &UpdateMutation) -> (String, ScriptParams) {
    let target = m.entity.target();
    let body = [
        find_line(target).to_string(),
        primary_setters(&m.changes, &[]),
        APPLY_SECONDARY.to_string(),
        "    return JSON.stringify({ id: item.id(), name: item.name(), updated: true, changed: Object.keys(C).concat(Object.keys(S)) });"
            .to_string(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n");

    let mut params = base_params(target, Some(m.entity.id()));
    with_changes(&mut params, &m.changes);
    (body, params)
}

fn complete(m: &CompleteMutation) -> (String, ScriptParams) {
    let target = m.entity.target();
    let body = format!(
        "{}\n{}",
        find_line(target),
        r#"    if (DATE === null) app.markComplete(item);
    else callSecondary(SECONDARY, [KIND, item.id(), DATE]);
    return JSON.stringify({ id: item.id(), name: item.name(), completed: true, completionDate: DATE });"#
    );

    let mut params = base_params(target, Some(m.entity.id()));
    if let Some(date) = &m.completion_date {
        params.insert("completionDate".into(), json!(date));
        params.insert("secondarySource".into(), json!(COMPLETE_FUNCTION));
    }
    (body, params)
}

fn delete(m: &DeleteMutation) -> (String, ScriptParams) {
    let target = m.entity.target();
    let body = format!(
        "{}\n{}",
        find_line(target),
        r#"    const id = item.id();
    const name = item.name();
    app.delete(item);
    return JSON.stringify({ id: id, name: name, deleted: true });"#
    );
    (body, base_params(target, Some(m.entity.id())))
}

fn primary_setters(changes: &ChangeSet, skip: &[MutableProperty]) -> String {
    changes
        .properties()
        .filter(|p| !skip.contains(p))
        .filter_map(primary_setter)
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn secondary_function(changes: &ChangeSet) -> String {
    let setters = changes
        .properties()
        .filter_map(secondary_setter)
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    SECONDARY_FUNCTION.replace("/*SETTERS*/", &setters)
}

/// Primary-dialect write for `property`; `None` when the secondary context
/// owns it
fn primary_setter(property: MutableProperty) -> Option<&'static str> {
    let line = match property {
        MutableProperty::Name => "item.name = C.name;",
        MutableProperty::Note => "item.note = C.note;",
        MutableProperty::Flagged => "item.flagged = C.flagged;",
        MutableProperty::DueDate => "item.dueDate = toDate(C.dueDate);",
        MutableProperty::DeferDate => "item.deferDate = toDate(C.deferDate);",
        MutableProperty::EstimatedMinutes => "item.estimatedMinutes = C.estimatedMinutes;",
        MutableProperty::Tags => "replaceTags(item, C.tags);",
        MutableProperty::AddTags => "addTags(item, C.addTags);",
        MutableProperty::RemoveTags => "removeTags(item, C.removeTags);",
        MutableProperty::Project => "moveToProject(item, C.project);",
        MutableProperty::ParentTaskId => "moveUnder(item, C.parentTaskId);",
        MutableProperty::Sequential => "item.sequential = C.sequential;",
        MutableProperty::Folder => "moveToFolder(item, C.folder);",
        MutableProperty::Status => "item.status = statusValue(C.status);",
        MutableProperty::PlannedDate
        | MutableProperty::ReviewIntervalDays
        | MutableProperty::RepetitionRule => return None,
    };
    Some(line)
}

/// Secondary-dialect write for `property`, reading from `S`
fn secondary_setter(property: MutableProperty) -> Option<&'static str> {
    let line = match property {
        MutableProperty::PlannedDate => {
            "item.plannedDate = S.plannedDate === null ? null : new Date(S.plannedDate);"
        }
        MutableProperty::ReviewIntervalDays => {
            "{ const interval = item.reviewInterval; interval.steps = S.reviewIntervalDays; interval.unit = 'days'; item.reviewInterval = interval; }"
        }
        MutableProperty::RepetitionRule => {
            "item.repetitionRule = S.repetitionRule === null ? null : new Task.RepetitionRule('FREQ=' + S.repetitionRule.frequency.toUpperCase() + ';INTERVAL=' + S.repetitionRule.interval, Task.RepetitionMethod.Fixed);"
        }
        MutableProperty::Name
        | MutableProperty::Note
        | MutableProperty::Flagged
        | MutableProperty::DueDate
        | MutableProperty::DeferDate
        | MutableProperty::EstimatedMinutes
        | MutableProperty::Tags
        | MutableProperty::AddTags
        | MutableProperty::RemoveTags
        | MutableProperty::Project
        | MutableProperty::ParentTaskId
        | MutableProperty::Sequential
        | MutableProperty::Folder
        | MutableProperty::Status => return None,
    };
    Some(line)
}
