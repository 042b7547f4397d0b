use crate::models::Category;

// ============ GROUP KEYWORDS ============
// Checked in order; the first category with a keyword contained in the
// lower-cased group wins. Movies come before tv so "Live Movie Night" is a movie.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Movies, &["movie", "movies", "vod", "film", "cinema"]),
    (Category::Series, &["series", "shows", "show", "season", "episode"]),
    (
        Category::Tv,
        &["live", "tv", "sports", "sport", "news", "kids", "music", "entertainment"],
    ),
];

/// Category classifier for playlist groups
pub struct ContentClassifier;

impl ContentClassifier {
    /// Derive a category from a raw group label
    pub fn classify(group: &str) -> Category {
        let normalized = group.trim().to_lowercase();
        if normalized.is_empty() {
            return Category::Other;
        }

        CATEGORY_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| normalized.contains(kw)))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Other)
    }

    /// Keep a raw category that already names a known category, otherwise
    /// derive it from the group (or from the raw value when group is blank)
    pub fn coerce(raw_category: Option<&str>, group: &str) -> Category {
        let raw = raw_category.unwrap_or_default();
        if let Some(category) = Category::from_name(raw) {
            return category;
        }

        if group.trim().is_empty() {
            Self::classify(raw)
        } else {
            Self::classify(group)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_tv() {
        assert_eq!(ContentClassifier::classify("News"), Category::Tv);
        assert_eq!(ContentClassifier::classify("US | Sports"), Category::Tv);
        assert_eq!(ContentClassifier::classify("KIDS"), Category::Tv);
    }

    #[test]
    fn test_classify_movies_and_series() {
        assert_eq!(ContentClassifier::classify("VOD | Action"), Category::Movies);
        assert_eq!(ContentClassifier::classify("Cinema Classics"), Category::Movies);
        assert_eq!(ContentClassifier::classify("TV Shows"), Category::Series);
        assert_eq!(ContentClassifier::classify("Season Pass"), Category::Series);
    }

    #[test]
    fn test_movies_take_precedence_over_tv() {
        assert_eq!(ContentClassifier::classify("Live Movie Night"), Category::Movies);
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(ContentClassifier::classify(""), Category::Other);
        assert_eq!(ContentClassifier::classify("Unknown"), Category::Other);
        assert_eq!(ContentClassifier::classify("Adult"), Category::Other);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(ContentClassifier::coerce(Some("movies"), "News"), Category::Movies);
        assert_eq!(ContentClassifier::coerce(Some(" TV "), "Unknown"), Category::Tv);
        assert_eq!(ContentClassifier::coerce(Some("sports"), "VOD"), Category::Movies);
        assert_eq!(ContentClassifier::coerce(Some("sports"), ""), Category::Tv);
        assert_eq!(ContentClassifier::coerce(None, "Random"), Category::Other);
    }
}
