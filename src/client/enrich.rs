use std::collections::HashMap;

use crate::models::{Criteria, Rubric, RubricCriterionEntry};

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Fill missing name, description and definition on rubric entries from the
/// criteria list. Values already present are kept.
pub fn enrich_entries(entries: &mut [RubricCriterionEntry], criteria: &[Criteria]) {
    let by_id: HashMap<&str, &Criteria> = criteria.iter().map(|c| (c.id.as_str(), c)).collect();
    for entry in entries {
        let Some(source) = by_id.get(entry.criteria_id.as_str()) else {
            continue;
        };
        if is_blank(&entry.name) {
            entry.name = Some(source.name.clone());
        }
        if is_blank(&entry.description) {
            entry.description = Some(source.description.clone());
        }
        if is_blank(&entry.definition) {
            entry.definition = Some(source.definition.clone());
        }
    }
}

pub fn enrich_rubric(rubric: &mut Rubric, criteria: &[Criteria]) {
    enrich_entries(&mut rubric.criteria, criteria);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_only_missing_fields() {
        let criteria = vec![Criteria {
            id: "c1".into(),
            name: "Speed".into(),
            description: "Delivery speed".into(),
            definition: "5 = same day".into(),
        }];
        let mut described = RubricCriterionEntry::new("c1", 0.5);
        described.description = Some("Custom".into());
        described.name = Some(" ".into());
        let mut entries = vec![described, RubricCriterionEntry::new("unknown", 0.5)];

        enrich_entries(&mut entries, &criteria);

        assert_eq!(entries[0].name.as_deref(), Some("Speed"));
        assert_eq!(entries[0].description.as_deref(), Some("Custom"));
        assert_eq!(entries[0].definition.as_deref(), Some("5 = same day"));
        assert!(entries[1].name.is_none());
    }
}
