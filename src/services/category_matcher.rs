use crate::models::FALLBACK_CATEGORY;

/// Shortest label allowed to match by being contained in a category name, so a
/// stray one- or two-letter label cannot match every category.
const MIN_CONTAINED_LABEL_LEN: usize = 3;

/// Maps ranked labels onto the category taxonomy.
///
/// Labels are tried in order and the first one that case-insensitively contains a
/// category name (or is contained in one, e.g. "Bag" in "Bags") wins. Falls back to
/// [`FALLBACK_CATEGORY`].
pub fn match_category(labels: &[String], categories: &[String]) -> String {
    for label in labels {
        let label_lower = label.trim().to_lowercase();
        if label_lower.is_empty() {
            continue;
        }

        let hit = categories.iter().find(|category| {
            let category_lower = category.trim().to_lowercase();
            if category_lower.is_empty() {
                return false;
            }
            label_lower.contains(&category_lower)
                || (label_lower.chars().count() >= MIN_CONTAINED_LABEL_LEN
                    && category_lower.contains(&label_lower))
        });

        if let Some(category) = hit {
            return category.clone();
        }
    }

    FALLBACK_CATEGORY.to_string()
}

/// Category stored on an item: whatever the first image's labels resolve to.
/// Labels of later images are kept on the item but never change its category.
pub fn resolve_item_category(labels_per_image: &[Vec<String>], categories: &[String]) -> String {
    labels_per_image
        .first()
        .map(|labels| match_category(labels, categories))
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
}
