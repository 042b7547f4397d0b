use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::services::classifier::ContentClassifier;

/// Fallback for missing names and groups
pub const UNKNOWN: &str = "Unknown";

/// Placeholder stream URL for entries without a URL line
pub const BLANK_URL: &str = "about:blank";

/// Channel classification derived from the provider group label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tv,
    Movies,
    Series,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::Tv, Category::Movies, Category::Series, Category::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tv => "tv",
            Category::Movies => "movies",
            Category::Series => "series",
            Category::Other => "other",
        }
    }

    /// Exact (case-insensitive, trimmed) match against the four category names
    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == normalized)
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Other
    }
}

/// Single playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub group: String,
    pub category: Category,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_chno: Option<String>,
}

impl Channel {
    /// Build a channel with defaults filled and the category coerced.
    ///
    /// `raw_category` is kept when it already names one of the four categories,
    /// otherwise the category is derived from `group`.
    pub fn new(name: &str, group: &str, raw_category: Option<&str>, url: &str) -> Self {
        let group = non_blank(Some(group)).unwrap_or_else(|| UNKNOWN.to_string());
        let category = ContentClassifier::coerce(raw_category, &group);

        Self {
            name: non_blank(Some(name)).unwrap_or_else(|| UNKNOWN.to_string()),
            group,
            category,
            url: non_blank(Some(url)).unwrap_or_else(|| BLANK_URL.to_string()),
            tvg_id: None,
            tvg_name: None,
            tvg_logo: None,
            tvg_chno: None,
        }
    }

    /// Entry for a URL line that had no preceding `#EXTINF`
    pub fn placeholder(url: &str) -> Self {
        Self::new(UNKNOWN, UNKNOWN, Some(Category::Other.as_str()), url)
    }

    /// Re-apply defaults and category coercion (used on every save and load)
    pub fn normalized(self) -> Self {
        let raw_category = self.category.as_str();
        Self {
            tvg_id: non_blank(self.tvg_id.as_deref()),
            tvg_name: non_blank(self.tvg_name.as_deref()),
            tvg_logo: non_blank(self.tvg_logo.as_deref()),
            tvg_chno: non_blank(self.tvg_chno.as_deref()),
            ..Self::new(&self.name, &self.group, Some(raw_category), &self.url)
        }
    }

    /// Lenient decoding of a stored record.
    ///
    /// Returns `None` for anything that is not a JSON object. Fields with the
    /// wrong type are treated as missing.
    pub fn from_stored(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let mut channel = Self::new(
            text_field(obj, "name").unwrap_or(UNKNOWN),
            text_field(obj, "group").unwrap_or(UNKNOWN),
            text_field(obj, "category"),
            text_field(obj, "url").unwrap_or(BLANK_URL),
        );
        channel.tvg_id = non_blank(text_field(obj, "tvg_id"));
        channel.tvg_name = non_blank(text_field(obj, "tvg_name"));
        channel.tvg_logo = non_blank(text_field(obj, "tvg_logo"));
        // Some providers emit channel numbers as JSON numbers
        channel.tvg_chno = match obj.get("tvg_chno") {
            Some(Value::Number(n)) => Some(n.to_string()),
            other => non_blank(other.and_then(Value::as_str)),
        };

        Some(channel)
    }
}

/// Per-category counts; `total` is always the sum of the four buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub tv: usize,
    pub movies: usize,
    pub series: usize,
    pub other: usize,
    pub total: usize,
}

impl CategoryStats {
    pub fn from_channels<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> Self {
        let mut stats = Self::default();
        for channel in channels {
            stats.record(channel.category);
        }
        stats
    }

    pub fn record(&mut self, category: Category) {
        match category {
            Category::Tv => self.tv += 1,
            Category::Movies => self.movies += 1,
            Category::Series => self.series += 1,
            Category::Other => self.other += 1,
        }
        self.total += 1;
    }

    /// True when the buckets add up to `total` and `total` matches `expected_total`
    pub fn is_consistent(&self, expected_total: usize) -> bool {
        self.tv + self.movies + self.series + self.other == self.total && self.total == expected_total
    }
}

fn text_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
