use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::channel::{Channel, BLANK_URL, UNKNOWN};

const EXTINF_MARKER: &str = "#EXTINF";

/// Attribute keys tried in order when resolving the group label
const GROUP_KEYS: [&str; 5] = ["group-title", "group", "category", "type", "tvg-group"];

lazy_static! {
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap();
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: HashMap<String, String>,
    title: String,
}

impl ExtinfData {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Inline title, then tvg-name, then tvg-id, then "Unknown"
    fn display_name(&self) -> &str {
        let title = self.title.trim();
        if !title.is_empty() {
            return title;
        }
        self.attr("tvg-name")
            .or_else(|| self.attr("tvg-id"))
            .unwrap_or(UNKNOWN)
    }

    fn group(&self) -> &str {
        GROUP_KEYS
            .iter()
            .find_map(|key| self.attr(key))
            .unwrap_or(UNKNOWN)
    }

    /// Channel awaiting its URL line
    fn into_pending(self) -> Channel {
        let mut channel = Channel::new(self.display_name(), self.group(), None, BLANK_URL);
        channel.tvg_id = self.attr("tvg-id").map(str::to_string);
        channel.tvg_name = self.attr("tvg-name").map(str::to_string);
        channel.tvg_logo = self.attr("tvg-logo").map(str::to_string);
        channel.tvg_chno = self.attr("tvg-chno").map(str::to_string);
        channel
    }
}

/// Split an EXTINF line at the first comma outside a quoted attribute value.
/// Returns `None` when there is no such comma.
fn split_extinf(line: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some((&line[..idx], &line[idx + 1..])),
            _ => {}
        }
    }
    // unbalanced quote: the title still follows the last comma
    line.rsplit_once(',')
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> Option<ExtinfData> {
    if !line.starts_with(EXTINF_MARKER) {
        return None;
    }

    let (header, title) = split_extinf(line)?;

    let attributes = ATTR_REGEX
        .captures_iter(header)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect();

    Some(ExtinfData {
        attributes,
        title: title.trim().to_string(),
    })
}

/// Parser state between lines
#[derive(Debug)]
enum ParserState {
    ExpectEntry,
    HasPendingEntry(Channel),
}

/// Output of a playlist parse
#[derive(Debug, Default)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    /// `#EXTINF` lines that could not be parsed
    pub malformed_entries: usize,
    /// Pending entries replaced by a later `#EXTINF` before a URL arrived
    pub superseded_entries: usize,
}

/// Parse M3U text into channels.
///
/// Never fails: malformed entry lines are logged and dropped, URL lines
/// without an entry become placeholder channels, and a trailing entry without
/// a URL is kept with `about:blank`.
pub fn parse_m3u(text: &str) -> ParsedPlaylist {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut parsed = ParsedPlaylist::default();
    let mut state = ParserState::ExpectEntry;

    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF_MARKER) {
            let previous = std::mem::replace(&mut state, ParserState::ExpectEntry);
            if matches!(previous, ParserState::HasPendingEntry(_)) {
                parsed.superseded_entries += 1;
            }

            match parse_extinf(line) {
                Some(extinf) => state = ParserState::HasPendingEntry(extinf.into_pending()),
                None => {
                    parsed.malformed_entries += 1;
                    tracing::debug!(line = line_no + 1, "Skipping malformed EXTINF line: {}", line);
                }
            }
            continue;
        }

        // Other directives and comments (#EXTM3U, #EXTGRP, ...)
        if line.starts_with('#') {
            continue;
        }

        // Stream URL line
        match std::mem::replace(&mut state, ParserState::ExpectEntry) {
            ParserState::HasPendingEntry(mut channel) => {
                channel.url = line.to_string();
                parsed.channels.push(channel);
            }
            ParserState::ExpectEntry => parsed.channels.push(Channel::placeholder(line)),
        }
    }

    if let ParserState::HasPendingEntry(channel) = state {
        // URL already defaults to about:blank
        parsed.channels.push(channel);
    }

    parsed
}

/// Keep channels whose name contains any of the keywords (case-insensitive).
/// An empty keyword list keeps everything.
pub fn filter_channels(channels: Vec<Channel>, keywords: &[String]) -> Vec<Channel> {
    let lowered: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if lowered.is_empty() {
        return channels;
    }

    let filtered: Vec<Channel> = channels
        .into_iter()
        .filter(|ch| {
            let name = ch.name.to_lowercase();
            lowered.iter().any(|k| name.contains(k.as_str()))
        })
        .collect();

    tracing::debug!(count = filtered.len(), keywords = ?lowered, "Filtered channels");
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn test_parse_extinf() {
        let line = r#"#EXTINF:-1 tvg-id="globo" tvg-name="Globo HD" tvg-logo="http://logo.com/globo.png" group-title="TV",Globo HD"#;
        let extinf = parse_extinf(line).unwrap();

        assert_eq!(extinf.title, "Globo HD");
        assert_eq!(extinf.attributes.get("tvg-id"), Some(&"globo".to_string()));
        assert_eq!(extinf.attributes.get("group-title"), Some(&"TV".to_string()));
    }

    #[test]
    fn test_parse_extinf_minimal() {
        let extinf = parse_extinf("#EXTINF:-1,Canal Teste").unwrap();
        assert_eq!(extinf.title, "Canal Teste");
        assert!(extinf.attributes.is_empty());
    }

    #[test]
    fn test_parse_extinf_comma_inside_quotes() {
        let extinf = parse_extinf(r#"#EXTINF:-1 group-title="News, World",CNN"#).unwrap();
        assert_eq!(extinf.title, "CNN");
        assert_eq!(extinf.group(), "News, World");
    }

    #[test]
    fn test_parse_extinf_without_delimiter() {
        assert!(parse_extinf(r#"#EXTINF:-1 tvg-name="CNN""#).is_none());
    }

    #[test]
    fn test_unbalanced_quote_keeps_entry() {
        let text = "#EXTINF:-1 tvg-logo=\"http://x/a.png group-title=\"News\",CNN\nhttp://x/cnn.ts\n";
        let parsed = parse_m3u(text);

        assert_eq!(parsed.malformed_entries, 0);
        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].name, "CNN");
        assert_eq!(parsed.channels[0].url, "http://x/cnn.ts");
    }

    #[test]
    fn test_end_to_end_example() {
        let text = "#EXTINF:-1 group-title=\"News\",CNN\nhttp://x/cnn.ts\n#EXTINF:-1,Unknown\nhttp://x/u.ts";
        let parsed = parse_m3u(text);

        assert_eq!(parsed.channels.len(), 2);
        assert_eq!(parsed.channels[0], Channel::new("CNN", "News", Some("tv"), "http://x/cnn.ts"));
        assert_eq!(parsed.channels[0].category, Category::Tv);

        let second = &parsed.channels[1];
        assert_eq!(second.name, "Unknown");
        assert_eq!(second.group, "Unknown");
        assert_eq!(second.category, Category::Other);
        assert_eq!(second.url, "http://x/u.ts");
    }

    #[test]
    fn test_malformed_entry_is_dropped_and_parsing_continues() {
        let text = "#EXTM3U\n#EXTINF:-1 tvg-name=\"Broken\"\n#EXTINF:-1 group-title=\"Movies\",Matrix\nhttp://x/matrix.mp4\n";
        let parsed = parse_m3u(text);

        assert_eq!(parsed.malformed_entries, 1);
        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].name, "Matrix");
        assert_eq!(parsed.channels[0].category, Category::Movies);
        assert_eq!(parsed.channels[0].url, "http://x/matrix.mp4");
    }

    #[test]
    fn test_malformed_entry_drops_previous_pending() {
        let text = "#EXTINF:-1,First\n#EXTINF:-1 broken\nhttp://x/1.ts";
        let parsed = parse_m3u(text);

        assert_eq!(parsed.channels.len(), 1);
        assert_eq!(parsed.channels[0].name, "Unknown");
        assert_eq!(parsed.channels[0].url, "http://x/1.ts");
        assert_eq!(parsed.superseded_entries, 1);
    }

    #[test]
    fn test_name_fallbacks() {
        let text = concat!(
            "#EXTINF:-1 tvg-name=\"From Name\" tvg-id=\"id1\",\n",
            "http://x/1.ts\n",
            "#EXTINF:-1 tvg-id=\"id2\",  \n",
            "http://x/2.ts\n",
            "#EXTINF:-1,\n",
            "http://x/3.ts\n",
        );
        let parsed = parse_m3u(text);
        let names: Vec<&str> = parsed.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["From Name", "id2", "Unknown"]);
    }

    #[test]
    fn test_group_key_order() {
        let text = concat!(
            "#EXTINF:-1 type=\"series\" tvg-group=\"ignored\",A\n",
            "http://x/a\n",
            "#EXTINF:-1 group=\"  \" category=\"VOD\",B\n",
            "http://x/b\n",
        );
        let parsed = parse_m3u(text);
        assert_eq!(parsed.channels[0].group, "series");
        assert_eq!(parsed.channels[0].category, Category::Series);
        assert_eq!(parsed.channels[1].group, "VOD");
        assert_eq!(parsed.channels[1].category, Category::Movies);
    }

    #[test]
    fn test_passthrough_metadata() {
        let text = "#EXTINF:-1 tvg-id=\"cnn.us\" tvg-logo=\"http://logo/cnn.png\" tvg-chno=\"12\" tvg-name=\"\",CNN\nhttp://x/cnn.ts";
        let channel = &parse_m3u(text).channels[0];

        assert_eq!(channel.tvg_id.as_deref(), Some("cnn.us"));
        assert_eq!(channel.tvg_logo.as_deref(), Some("http://logo/cnn.png"));
        assert_eq!(channel.tvg_chno.as_deref(), Some("12"));
        assert!(channel.tvg_name.is_none());
    }

    #[test]
    fn test_orphan_url_and_trailing_entry() {
        let text = "\u{feff}#EXTM3U\r\n\r\nhttp://x/orphan.ts\r\n#EXTGRP:Ignored\r\n#EXTINF:-1 group-title=\"Kids\",Cartoons\r\n";
        let parsed = parse_m3u(text);

        assert_eq!(parsed.channels.len(), 2);
        assert_eq!(parsed.channels[0].name, "Unknown");
        assert_eq!(parsed.channels[0].category, Category::Other);
        assert_eq!(parsed.channels[0].url, "http://x/orphan.ts");

        assert_eq!(parsed.channels[1].name, "Cartoons");
        assert_eq!(parsed.channels[1].category, Category::Tv);
        assert_eq!(parsed.channels[1].url, BLANK_URL);
    }

    #[test]
    fn test_filter_channels() {
        let channels = vec![
            Channel::new("UFC 300", "Sports", None, "u1"),
            Channel::new("CNN", "News", None, "u2"),
            Channel::new("Paramount+", "Movies", None, "u3"),
        ];

        let kept = filter_channels(channels.clone(), &["ufc".to_string(), "PARAMOUNT".to_string()]);
        assert_eq!(kept.len(), 2);

        let all = filter_channels(channels, &[]);
        assert_eq!(all.len(), 3);
    }
}
