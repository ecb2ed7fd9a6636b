use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::Difficulty;

/// Immutable description of which questions to show.
///
/// An empty filter matches every question. Filters are never edited in
/// place; a new one is built from a [`FilterSelection`] whenever the
/// selection changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PersistedFilter", into = "PersistedFilter")]
pub struct QuestionFilter {
    pub tags: BTreeSet<String>,
    pub companies: BTreeSet<String>,
    pub levels: BTreeSet<Difficulty>,
    pub top_liked: bool,
    pub top_interviewed: bool,
    pub saved: Option<bool>,
    pub solved: Option<bool>,
}

impl QuestionFilter {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.companies.is_empty()
            && self.levels.is_empty()
            && !self.top_liked
            && !self.top_interviewed
            && self.saved != Some(true)
            && self.solved != Some(true)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_companies<I, S>(mut self, companies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.companies = companies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_levels(mut self, levels: impl IntoIterator<Item = Difficulty>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    /// Short human-readable description, used as reminder notification text
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.levels.iter().map(|level| level.label().to_string()));
        parts.extend(self.tags.iter().cloned());
        parts.extend(self.companies.iter().cloned());
        if self.top_liked {
            parts.push(Remark::TopLiked.label().to_string());
        }
        if self.top_interviewed {
            parts.push(Remark::TopInterviewed.label().to_string());
        }
        if self.saved == Some(true) {
            parts.push(Remark::Saved.label().to_string());
        }
        if parts.is_empty() {
            "All questions".to_string()
        } else {
            parts.join(" · ")
        }
    }

    pub fn to_persisted(&self) -> PersistedFilter {
        PersistedFilter::from(self.clone())
    }

    pub fn from_persisted(persisted: PersistedFilter) -> Self {
        Self::from(persisted)
    }
}

/// Serializable form of [`QuestionFilter`], embedded in reminder rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFilter {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub levels: Vec<i64>,
    #[serde(default)]
    pub top_liked: bool,
    #[serde(default)]
    pub top_interviewed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved: Option<bool>,
}

impl From<QuestionFilter> for PersistedFilter {
    fn from(filter: QuestionFilter) -> Self {
        PersistedFilter {
            tags: filter.tags.into_iter().collect(),
            companies: filter.companies.into_iter().collect(),
            levels: filter.levels.into_iter().map(Difficulty::level).collect(),
            top_liked: filter.top_liked,
            top_interviewed: filter.top_interviewed,
            saved: filter.saved,
            solved: filter.solved,
        }
    }
}

impl From<PersistedFilter> for QuestionFilter {
    fn from(persisted: PersistedFilter) -> Self {
        QuestionFilter {
            tags: persisted.tags.into_iter().collect(),
            companies: persisted.companies.into_iter().collect(),
            // Levels outside 1..=3 come from newer datasets; drop them
            levels: persisted
                .levels
                .into_iter()
                .filter_map(Difficulty::from_level)
                .collect(),
            top_liked: persisted.top_liked,
            top_interviewed: persisted.top_interviewed,
            saved: persisted.saved,
            solved: persisted.solved,
        }
    }
}

/// Content classification or user-state facet offered by the filter screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remark {
    TopLiked,
    TopInterviewed,
    Saved,
}

impl Remark {
    pub const ALL: [Remark; 3] = [Remark::TopLiked, Remark::TopInterviewed, Remark::Saved];

    pub fn label(self) -> &'static str {
        match self {
            Remark::TopLiked => "Top Liked",
            Remark::TopInterviewed => "Top Interviewed",
            Remark::Saved => "Saved",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Remark::ALL.into_iter().find(|remark| remark.label() == label)
    }
}

/// Selections accumulated by an open filter screen.
///
/// Each toggle adds the label when absent and removes it when present.
/// Nothing is validated until [`FilterSelection::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default)]
    pub remarks: Vec<String>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a selection from the filter being edited
    pub fn from_filter(filter: &QuestionFilter) -> Self {
        let mut remarks = Vec::new();
        if filter.top_liked {
            remarks.push(Remark::TopLiked.label().to_string());
        }
        if filter.top_interviewed {
            remarks.push(Remark::TopInterviewed.label().to_string());
        }
        if filter.saved == Some(true) {
            remarks.push(Remark::Saved.label().to_string());
        }

        FilterSelection {
            categories: filter.tags.iter().cloned().collect(),
            companies: filter.companies.iter().cloned().collect(),
            levels: filter
                .levels
                .iter()
                .map(|level| level.label().to_string())
                .collect(),
            remarks,
        }
    }

    pub fn toggle_category(&mut self, name: &str) {
        toggle(&mut self.categories, name);
    }

    pub fn toggle_company(&mut self, name: &str) {
        toggle(&mut self.companies, name);
    }

    pub fn toggle_level(&mut self, label: &str) {
        toggle(&mut self.levels, label);
    }

    pub fn toggle_remark(&mut self, label: &str) {
        toggle(&mut self.remarks, label);
    }

    pub fn is_category_selected(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c == name)
    }

    pub fn is_company_selected(&self, name: &str) -> bool {
        self.companies.iter().any(|c| c == name)
    }

    pub fn is_level_selected(&self, label: &str) -> bool {
        self.levels.iter().any(|l| l == label)
    }

    pub fn is_remark_selected(&self, label: &str) -> bool {
        self.remarks.iter().any(|r| r == label)
    }

    /// Compile the selection into a filter.
    ///
    /// `clear_all` yields the empty filter but leaves the accumulated
    /// selection untouched.
    pub fn build(&self, clear_all: bool) -> QuestionFilter {
        if clear_all {
            return QuestionFilter::empty();
        }

        let remarks: Vec<Remark> = self
            .remarks
            .iter()
            .filter_map(|label| Remark::from_label(label))
            .collect();

        QuestionFilter {
            tags: self.categories.iter().cloned().collect(),
            companies: self.companies.iter().cloned().collect(),
            levels: self
                .levels
                .iter()
                .filter_map(|label| Difficulty::from_label(label))
                .collect(),
            top_liked: remarks.contains(&Remark::TopLiked),
            top_interviewed: remarks.contains(&Remark::TopInterviewed),
            saved: remarks.contains(&Remark::Saved).then_some(true),
            solved: None,
        }
    }
}

fn toggle(selection: &mut Vec<String>, value: &str) {
    if let Some(position) = selection.iter().position(|v| v == value) {
        selection.remove(position);
    } else {
        selection.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_set(values: &[String]) -> BTreeSet<String> {
        values.iter().cloned().collect()
    }

    #[test]
    fn test_toggle_pairs_cancel_out() {
        let mut selection = FilterSelection::new();
        selection.toggle_category("Tree");
        let before = as_set(&selection.categories);

        for _ in 0..4 {
            selection.toggle_category("Array");
        }
        assert_eq!(as_set(&selection.categories), before);

        // Removing and re-adding an existing entry keeps the set the same
        selection.toggle_category("Tree");
        selection.toggle_category("Tree");
        assert_eq!(as_set(&selection.categories), before);
    }

    #[test]
    fn test_odd_toggles_flip_membership() {
        let mut selection = FilterSelection::new();
        for _ in 0..3 {
            selection.toggle_category("Array");
        }
        assert_eq!(selection.categories, vec!["Array".to_string()]);
        assert!(selection.is_category_selected("Array"));

        for _ in 0..5 {
            selection.toggle_category("Array");
        }
        assert!(selection.categories.is_empty());
    }

    #[test]
    fn test_build_maps_labels() {
        let mut selection = FilterSelection::new();
        selection.toggle_category("Array");
        selection.toggle_company("Google");
        selection.toggle_level("Medium");
        selection.toggle_level("Hard");
        selection.toggle_level("Legendary");
        selection.toggle_remark("Top Liked");
        selection.toggle_remark("Saved");

        let filter = selection.build(false);
        assert_eq!(filter.tags, BTreeSet::from(["Array".to_string()]));
        assert_eq!(filter.companies, BTreeSet::from(["Google".to_string()]));
        assert_eq!(
            filter.levels,
            BTreeSet::from([Difficulty::Medium, Difficulty::Hard])
        );
        assert!(filter.top_liked);
        assert!(!filter.top_interviewed);
        assert_eq!(filter.saved, Some(true));
        assert_eq!(filter.solved, None);
    }

    #[test]
    fn test_clear_all_returns_empty_filter_and_keeps_selection() {
        let mut selection = FilterSelection::new();
        selection.toggle_category("Graph");
        selection.toggle_remark("Top Interviewed");

        let filter = selection.build(true);
        assert_eq!(filter, QuestionFilter::empty());
        assert!(filter.is_empty());
        assert!(selection.is_category_selected("Graph"));
        assert!(selection.is_remark_selected("Top Interviewed"));
    }

    #[test]
    fn test_selection_seeded_from_filter_rebuilds_same_filter() {
        let filter = QuestionFilter {
            top_interviewed: true,
            saved: Some(true),
            ..QuestionFilter::empty()
                .with_tags(["Dynamic Programming"])
                .with_companies(["Amazon", "Apple"])
                .with_levels([Difficulty::Easy])
        };

        let selection = FilterSelection::from_filter(&filter);
        assert!(selection.is_level_selected("Easy"));
        assert!(selection.is_remark_selected("Saved"));
        assert_eq!(selection.build(false), filter);
    }

    #[test]
    fn test_persisted_encoding() {
        let filter = QuestionFilter {
            top_liked: true,
            ..QuestionFilter::empty()
                .with_tags(["Array"])
                .with_levels([Difficulty::Medium])
        };

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["tags"], serde_json::json!(["Array"]));
        assert_eq!(json["companies"], serde_json::json!([]));
        assert_eq!(json["levels"], serde_json::json!([2]));
        assert_eq!(json["top_liked"], true);
        assert_eq!(json["top_interviewed"], false);
        assert!(json.get("saved").is_none());

        let decoded: QuestionFilter = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn test_persisted_unknown_levels_are_dropped() {
        let decoded: QuestionFilter =
            serde_json::from_str(r#"{"tags": [], "levels": [1, 9]}"#).unwrap();
        assert_eq!(decoded.levels, BTreeSet::from([Difficulty::Easy]));
        assert!(!decoded.top_liked);
    }

    #[test]
    fn test_summary() {
        assert_eq!(QuestionFilter::empty().summary(), "All questions");
        let filter = QuestionFilter::empty()
            .with_levels([Difficulty::Hard])
            .with_tags(["Graph"]);
        assert_eq!(filter.summary(), "Hard · Graph");
    }
}
