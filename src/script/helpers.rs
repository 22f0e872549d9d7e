//! Predicate helper library embedded in generated scripts
//!
//! Guards call these helpers instead of inlining logic, so every query mode
//! evaluates a property the same way. Helpers never contain placeholders.

/// Which scripting context a fragment runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// JXA: iterates collections, properties are accessor calls (`t.name()`)
    Primary,
    /// Omni Automation via `evaluateJavascript`: plain properties
    /// (`t.name`), reads values the primary dialect cannot convert
    Secondary,
}

/// Date bounds are resolved here so compiled queries stay clock-free
const DATE_HELPERS: &str = r#"
function resolveBound(bound) {
  if (!bound) return null;
  const now = new Date();
  switch (bound.kind) {
    case 'absolute': return new Date(bound.at);
    case 'now': return now;
    case 'startOfToday': { const d = new Date(now); d.setHours(0, 0, 0, 0); return d; }
    case 'endOfToday': { const d = new Date(now); d.setHours(23, 59, 59, 999); return d; }
    case 'daysFromNow': { const d = new Date(now); d.setDate(d.getDate() + bound.days); return d; }
  }
  return null;
}
function inDateRange(value, range) {
  if (!value) return false;
  const t = value.getTime();
  const after = resolveBound(range.after);
  const before = resolveBound(range.before);
  if (range.inclusive) {
    if (after && t < after.getTime()) return false;
    if (before && t > before.getTime()) return false;
  } else {
    if (after && t <= after.getTime()) return false;
    if (before && t >= before.getTime()) return false;
  }
  return true;
}
function isoOrNull(value) {
  return value ? value.toISOString() : null;
}
function matchesTags(names, wanted, operator) {
  const have = new Set(names.map(n => n.toLowerCase()));
  const want = wanted.map(w => w.toLowerCase());
  if (operator === 'AND') return want.every(w => have.has(w));
  if (operator === 'NOT_IN') return want.every(w => !have.has(w));
  return want.some(w => have.has(w));
}
"#;

const PRIMARY_HELPERS: &str = r#"
function safe(read, fallback) {
  try {
    const value = read();
    return value === undefined ? fallback : value;
  } catch (e) {
    return fallback;
  }
}
function tagNames(item) {
  return safe(() => item.tags().map(t => t.name()), []);
}
function containingProject(task) {
  return safe(() => task.containingProject(), null);
}
function projectName(task) {
  const project = containingProject(task);
  return project ? safe(() => project.name(), null) : null;
}
function projectId(task) {
  const project = containingProject(task);
  return project ? safe(() => project.id(), null) : null;
}
function matchesText(item, needle) {
  const n = needle.toLowerCase();
  const name = String(safe(() => item.name(), '') || '');
  const note = String(safe(() => item.note(), '') || '');
  return name.toLowerCase().includes(n) || note.toLowerCase().includes(n);
}
function isAvailable(task) {
  if (safe(() => task.completed(), false)) return false;
  if (safe(() => task.dropped(), false)) return false;
  if (safe(() => task.blocked(), false)) return false;
  const defer = safe(() => task.deferDate(), null);
  return !defer || defer.getTime() <= Date.now();
}
function projectStatus(project) {
  const raw = String(safe(() => project.status(), ''));
  if (raw.indexOf('active') === 0) return 'active';
  if (raw.indexOf('on hold') === 0) return 'onHold';
  if (raw.indexOf('done') === 0) return 'done';
  if (raw.indexOf('dropped') === 0) return 'dropped';
  return raw;
}
function folderName(project) {
  const folder = safe(() => project.folder(), null);
  return folder ? safe(() => folder.name(), null) : null;
}
function sameText(a, b) {
  return String(a || '').toLowerCase() === String(b || '').toLowerCase();
}
function compareText(a, b) {
  const x = a.toLowerCase();
  const y = b.toLowerCase();
  if (x !== y) return x < y ? -1 : 1;
  return a < b ? -1 : a > b ? 1 : 0;
}
function compareValues(a, b) {
  if (a === b) return 0;
  if (a === null || a === undefined) return 1;
  if (b === null || b === undefined) return -1;
  if (typeof a === 'string' && typeof b === 'string') return compareText(a, b);
  return a < b ? -1 : 1;
}
function sortRecords(records, sort) {
  if (sort.length === 0) return records;
  return records.sort((x, y) => {
    for (const s of sort) {
      const c = compareValues(x[s.field], y[s.field]);
      if (c !== 0) {
        if (x[s.field] === null || x[s.field] === undefined || y[s.field] === null || y[s.field] === undefined) return c;
        return s.direction === 'desc' ? -c : c;
      }
    }
    return 0;
  });
}
function pick(record, fields) {
  const out = {};
  for (const f of fields) out[f] = record[f] === undefined ? null : record[f];
  return out;
}
"#;

const SECONDARY_HELPERS: &str = r#"
function repetitionOf(item) {
  const rule = item.repetitionRule;
  if (!rule) return null;
  return { ruleString: rule.ruleString, method: String(rule.method) };
}
function findEntity(kind, id) {
  if (kind === 'project') return Project.byIdentifier(id);
  if (kind === 'tag') return Tag.byIdentifier(id);
  return Task.byIdentifier(id);
}
"#;

/// Helper prelude for `dialect`
pub fn prelude(dialect: Dialect) -> String {
    let specific = match dialect {
        Dialect::Primary => PRIMARY_HELPERS,
        Dialect::Secondary => SECONDARY_HELPERS,
    };
    let mut out = String::with_capacity(DATE_HELPERS.len() + specific.len());
    out.push_str(DATE_HELPERS);
    out.push_str(specific);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::placeholders;

    #[test]
    fn test_helpers_have_no_placeholders() {
        for dialect in [Dialect::Primary, Dialect::Secondary] {
            assert!(placeholders(&prelude(dialect)).is_empty());
        }
    }

    #[test]
    fn test_dialects_share_date_logic() {
        assert!(prelude(Dialect::Primary).contains("function inDateRange"));
        assert!(prelude(Dialect::Secondary).contains("function inDateRange"));
        assert!(!prelude(Dialect::Secondary).contains("function safe("));
    }
}
