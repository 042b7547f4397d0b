use crate::models::{Category, Channel, ChannelsQuery};

/// One page of filtered channels; `total` counts all matches
#[derive(Debug, Default)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Normalized filter over a cached channel list.
///
/// Filtering happens before pagination; `search` and `group` are
/// case-insensitive substring matches, `category` must match exactly.
#[derive(Debug)]
pub struct ChannelQuery {
    search: Option<String>,
    group: Option<String>,
    category: CategoryFilter,
    page: usize,
    page_size: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum CategoryFilter {
    Any,
    Only(Category),
    /// Requested value is not a known category: nothing matches
    Unknown,
}

fn lowered(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

impl ChannelQuery {
    pub fn from_request(query: &ChannelsQuery, max_page_size: usize) -> Self {
        let category = match lowered(query.category.as_deref()) {
            None => CategoryFilter::Any,
            Some(raw) => Category::from_name(&raw)
                .map(CategoryFilter::Only)
                .unwrap_or(CategoryFilter::Unknown),
        };

        Self {
            search: lowered(query.search.as_deref()),
            group: lowered(query.group.as_deref()),
            category,
            page: query.page.max(1),
            page_size: query.page_size.clamp(1, max_page_size.max(1)),
        }
    }

    fn matches(&self, channel: &Channel) -> bool {
        let category_ok = match self.category {
            CategoryFilter::Any => true,
            CategoryFilter::Only(category) => channel.category == category,
            CategoryFilter::Unknown => false,
        };

        category_ok
            && self
                .search
                .as_deref()
                .map_or(true, |s| channel.name.to_lowercase().contains(s))
            && self
                .group
                .as_deref()
                .map_or(true, |g| channel.group.to_lowercase().contains(g))
    }

    pub fn apply(&self, channels: &[Channel]) -> ChannelPage {
        let offset = (self.page - 1).saturating_mul(self.page_size);
        let mut page = ChannelPage {
            channels: Vec::with_capacity(self.page_size.min(channels.len())),
            total: 0,
            page: self.page,
            page_size: self.page_size,
        };

        if self.category == CategoryFilter::Unknown {
            tracing::info!("Unknown category filter, returning empty page");
            return page;
        }

        for channel in channels.iter().filter(|c| self.matches(c)) {
            if page.total >= offset && page.channels.len() < self.page_size {
                page.channels.push(channel.clone());
            }
            page.total += 1;
        }

        page
    }
}
