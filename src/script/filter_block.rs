//! Filter block generation
//!
//! One guard per filter key. Guards read their operands from the `F`
//! parameter object, so guard text depends only on which keys are present:
//! every call site compiling the same `FilterSet` emits identical guards.

use focus_types::EntityType;

use super::helpers::Dialect;
use crate::contract::{FilterProperty, FilterSet};
use crate::error::ContractError;

/// A single generated guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub property: FilterProperty,
    pub dialect: Dialect,
    /// Boolean expression over `item` and `F`
    pub predicate: String,
}

impl Guard {
    /// Statement form: primary guards sit in a loop body, secondary guards in
    /// a per-item verdict function
    pub fn render(&self) -> String {
        match self.dialect {
            Dialect::Primary => format!("if (!({})) continue;", self.predicate),
            Dialect::Secondary => format!("if (!({})) return false;", self.predicate),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterBlock {
    pub guards: Vec<Guard>,
    /// Properties left for the secondary pass
    pub deferred: Vec<FilterProperty>,
}

impl FilterBlock {
    pub fn primary(&self) -> impl Iterator<Item = &Guard> {
        self.guards
            .iter()
            .filter(|g| g.dialect == Dialect::Primary)
    }

    pub fn secondary(&self) -> impl Iterator<Item = &Guard> {
        self.guards
            .iter()
            .filter(|g| g.dialect == Dialect::Secondary)
    }

    pub fn render_primary(&self, indent: &str) -> String {
        render(self.primary(), indent)
    }

    pub fn render_secondary(&self, indent: &str) -> String {
        render(self.secondary(), indent)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }
}

fn render<'a>(guards: impl Iterator<Item = &'a Guard>, indent: &str) -> String {
    guards
        .map(|g| format!("{}{}", indent, g.render()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Generate guards for every filter in `filters`.
///
/// Properties that do not apply to `entity` are a contract violation and are
/// rejected before any text is produced.
pub fn generate_filter_block(
    entity: EntityType,
    filters: &FilterSet,
) -> Result<FilterBlock, ContractError> {
    filters.validate_for(entity)?;

    let mut block = FilterBlock::default();
    for property in filters.properties() {
        let dialect = if property.requires_secondary() {
            block.deferred.push(property);
            Dialect::Secondary
        } else {
            Dialect::Primary
        };
        block.guards.push(Guard {
            property,
            dialect,
            predicate: predicate(property),
        });
    }
    Ok(block)
}

/// Predicate text for one property.
///
/// Secondary properties use plain property access (`item.modified`);
/// primary ones go through accessor calls wrapped in `safe`.
fn predicate(property: FilterProperty) -> String {
    let text = match property {
        FilterProperty::Id => "safe(() => item.id(), null) === F.id",
        FilterProperty::Completed => "safe(() => item.completed(), false) === F.completed",
        FilterProperty::Dropped => "safe(() => item.dropped(), false) === F.dropped",
        FilterProperty::Flagged => "safe(() => item.flagged(), false) === F.flagged",
        FilterProperty::Available => "isAvailable(item) === F.available",
        FilterProperty::Blocked => "safe(() => item.blocked(), false) === F.blocked",
        FilterProperty::InInbox => "safe(() => item.inInbox(), false) === F.inInbox",
        FilterProperty::Text => "matchesText(item, F.text)",
        FilterProperty::Project => {
            "F.project === null ? containingProject(item) === null : sameText(projectName(item), F.project)"
        }
        FilterProperty::ProjectId => "projectId(item) === F.projectId",
        FilterProperty::Tags => "matchesTags(tagNames(item), F.tags, F.tagsOperator)",
        FilterProperty::DueDate => "inDateRange(safe(() => item.dueDate(), null), F.dueDate)",
        FilterProperty::DeferDate => "inDateRange(safe(() => item.deferDate(), null), F.deferDate)",
        FilterProperty::PlannedDate => "inDateRange(item.plannedDate || null, F.plannedDate)",
        FilterProperty::CompletionDate => {
            "inDateRange(item.completionDate || null, F.completionDate)"
        }
        FilterProperty::Modified => "inDateRange(item.modified || null, F.modified)",
        FilterProperty::HasRepetition => "(item.repetitionRule ? true : false) === F.hasRepetition",
        FilterProperty::ProjectStatus => "projectStatus(item) === F.projectStatus",
        FilterProperty::Folder => "sameText(folderName(item), F.folder)",
    };
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{DateBound, DateRange, FilterValue, TagOperator};
    use proptest::prelude::*;

    fn sample(property: FilterProperty) -> FilterValue {
        use crate::contract::ValueType;
        match property.spec().value_type {
            ValueType::Boolean => FilterValue::Bool(true),
            ValueType::String => FilterValue::Text("x".into()),
            ValueType::NullableString => FilterValue::OptionalText(None),
            ValueType::StringSet => FilterValue::TagSet {
                tags: vec!["a".into()],
                operator: TagOperator::Or,
            },
            ValueType::DateRange => FilterValue::DateRange(DateRange::before(DateBound::Now)),
            ValueType::Enum(values) => FilterValue::Enum(values[0].to_string()),
        }
    }

    fn balanced(text: &str) -> bool {
        let mut stack = Vec::new();
        for c in text.chars() {
            match c {
                '(' | '[' | '{' => stack.push(c),
                ')' => {
                    if stack.pop() != Some('(') {
                        return false;
                    }
                }
                ']' => {
                    if stack.pop() != Some('[') {
                        return false;
                    }
                }
                '}' => {
                    if stack.pop() != Some('{') {
                        return false;
                    }
                }
                _ => {}
            }
        }
        stack.is_empty()
    }

    #[test]
    fn test_every_property_has_balanced_predicate() {
        for property in FilterProperty::ALL {
            let text = predicate(property);
            assert!(!text.is_empty());
            assert!(balanced(&text), "{property}: {text}");
            assert!(text.contains(&format!("F.{}", property.name())), "{property}");
        }
    }

    #[test]
    fn test_secondary_predicates_use_plain_properties() {
        for property in FilterProperty::ALL {
            let text = predicate(property);
            if property.requires_secondary() {
                assert!(!text.contains("safe("), "{property}: {text}");
            }
        }
    }

    #[test]
    fn test_secondary_properties_are_deferred() {
        let mut filters = FilterSet::new();
        filters.insert(FilterProperty::Flagged, FilterValue::Bool(true)).unwrap();
        filters
            .insert(
                FilterProperty::Modified,
                FilterValue::DateRange(DateRange::after(DateBound::StartOfToday)),
            )
            .unwrap();

        let block = generate_filter_block(EntityType::Task, &filters).unwrap();
        assert_eq!(block.deferred, vec![FilterProperty::Modified]);
        assert!(!block.render_primary("").contains("item.modified"));
        assert!(block.render_secondary("").contains("item.modified"));
        assert!(block.render_primary("").ends_with("continue;"));
    }

    #[test]
    fn test_inapplicable_property_rejected() {
        let mut filters = FilterSet::new();
        filters.insert(FilterProperty::InInbox, FilterValue::Bool(true)).unwrap();
        assert!(generate_filter_block(EntityType::Project, &filters).is_err());
    }

    proptest! {
        #[test]
        fn prop_one_guard_per_key_in_any_order(
            picks in proptest::sample::subsequence(
                FilterProperty::ALL
                    .iter()
                    .copied()
                    .filter(|p| p.applies_to(EntityType::Task))
                    .collect::<Vec<_>>(),
                0..=16,
            ),
            reverse in any::<bool>(),
        ) {
            let mut order = picks.clone();
            if reverse {
                order.reverse();
            }

            let mut forward = FilterSet::new();
            for p in &picks {
                forward.insert(*p, sample(*p)).unwrap();
            }
            let mut shuffled = FilterSet::new();
            for p in &order {
                shuffled.insert(*p, sample(*p)).unwrap();
            }

            let a = generate_filter_block(EntityType::Task, &forward).unwrap();
            let b = generate_filter_block(EntityType::Task, &shuffled).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.guards.len(), picks.len());
            let all = format!("{}\n{}", a.render_primary(""), a.render_secondary(""));
            prop_assert!(balanced(&all));
            for guard in &a.guards {
                prop_assert!(!guard.predicate.is_empty());
            }
        }
    }
}
