use serde::{Deserialize, Serialize};

use crate::article::ArticleRecord;
use crate::thread::{CommentSummary, ThreadRecord};

/// Embed side-bar colour, as a 24-bit RGB value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accent(pub u32);

impl Accent {
    pub const GREEN: Accent = Accent(0x2E_CC_71);
    pub const ORANGE: Accent = Accent(0xE6_7E_22);
}

/// A display-ready notification, independent of any chat library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub title: String,
    pub body: String,
    pub url: String,
    pub accent_color: Accent,
    pub thumbnail_url: Option<String>,
    /// Plain message text posted alongside the embed.
    pub announcement: Option<String>,
}

const RESULTS_RULE: &str = "----------";

pub fn build_article_payload(record: &ArticleRecord) -> Payload {
    let headline = record.title.replace("VALORANT", "");
    Payload {
        title: record.title.clone(),
        body: format!("### {}\n{}", record.display_date(), record.body_summary),
        url: record.url.clone(),
        accent_color: Accent::GREEN,
        thumbnail_url: record.thumbnail_url.clone(),
        announcement: Some(format!("## {}\n@here", headline.trim())),
    }
}

pub fn build_thread_payload(record: &ThreadRecord, comments: &CommentSummary) -> Payload {
    let body = format!(
        "## {}\n\n{}\n\n{RESULTS_RULE}\n### Top Comments\n{}\n\n[Reddit Link]({})",
        record.result_header(),
        record.map_results.join("\n"),
        comments.render(),
        record.permalink,
    );
    Payload {
        title: record.event.clone(),
        body,
        url: record.reference_url.clone(),
        accent_color: Accent::ORANGE,
        thumbnail_url: None,
        announcement: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::summarize_comments;
    use chrono::NaiveDate;

    fn thread() -> ThreadRecord {
        ThreadRecord {
            id: "abc".into(),
            team_a: "Sentinels".into(),
            team_b: "LOUD".into(),
            event: "Masters Toronto".into(),
            score_line: " 2-1 ".into(),
            reference_url: "https://www.vlr.gg/1".into(),
            map_results: vec!["Ascent 13-11".into(), "Bind 9-13".into()],
            top_comments: Vec::new(),
            permalink: "https://www.reddit.com/r/ValorantCompetitive/comments/abc/".into(),
        }
    }

    #[test]
    fn article_payload_uses_date_header_and_thumbnail() {
        let record = ArticleRecord {
            title: "VALORANT Patch Notes 8.0".into(),
            url: "https://playvalorant.com/en-us/news/x".into(),
            published_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            body_summary: "Notes body".into(),
            thumbnail_url: Some("http://img".into()),
        };
        let payload = build_article_payload(&record);
        assert_eq!(payload.body, "### 1/1/2024\nNotes body");
        assert_eq!(payload.accent_color, Accent::GREEN);
        assert_eq!(payload.thumbnail_url.as_deref(), Some("http://img"));
        assert_eq!(payload.announcement.as_deref(), Some("## Patch Notes 8.0\n@here"));
    }

    #[test]
    fn thread_payload_layout() {
        let comments = summarize_comments(&["gg"], 3);
        let payload = build_thread_payload(&thread(), &comments);
        assert_eq!(payload.title, "Masters Toronto");
        assert_eq!(payload.url, "https://www.vlr.gg/1");
        assert_eq!(payload.accent_color, Accent::ORANGE);
        assert_eq!(
            payload.body,
            "## Sentinels 2-1 LOUD\n\nAscent 13-11\nBind 9-13\n\n----------\n### Top Comments\n• gg\n\n[Reddit Link](https://www.reddit.com/r/ValorantCompetitive/comments/abc/)"
        );
    }

    #[test]
    fn thread_payload_without_comments_shows_sentinel() {
        let payload = build_thread_payload(&thread(), &CommentSummary::default());
        assert!(payload.body.contains("### Top Comments\nNo top comments found.\n"));
    }
}
