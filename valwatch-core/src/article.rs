//! Patch-notes extraction from the news listing page.
//!
//! The listing renders each article card as an anchor whose text holds the
//! publish timestamp, the title and a teaser. The thumbnail only exists in a
//! JSON blob that the page's client script hydrates, so the extractor reads
//! both and merges them into one [`ArticleRecord`].

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ArticleSettings;
use crate::error::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub url: String,
    pub published_date: NaiveDate,
    pub body_summary: String,
    pub thumbnail_url: Option<String>,
}

impl ArticleRecord {
    /// `M/D/YYYY`, without zero padding.
    pub fn display_date(&self) -> String {
        format!(
            "{}/{}/{}",
            self.published_date.month(),
            self.published_date.day(),
            self.published_date.year()
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScriptBlob {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    media: Option<BlobMedia>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobMedia {
    #[serde(default)]
    url: Option<String>,
}

/// Returns the latest patch notes if they differ from `last_seen_url`.
///
/// Never fails: a page that does not look the way we expect just means there
/// is nothing new this cycle.
pub fn extract(
    html: &str,
    last_seen_url: Option<&str>,
    settings: &ArticleSettings,
) -> Option<ArticleRecord> {
    match try_extract(html, settings) {
        Ok(record) if Some(record.url.as_str()) == last_seen_url => {
            debug!(url = %record.url, "latest patch notes already delivered");
            None
        }
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "no patch notes extracted this cycle");
            None
        }
    }
}

/// Same as [`extract`] without the novelty check, surfacing why extraction failed.
pub fn try_extract(html: &str, settings: &ArticleSettings) -> Result<ArticleRecord, ExtractError> {
    let document = Html::parse_document(html);

    let anchor = find_labelled_anchor(&document, &settings.label_marker)?;
    let script = find_data_script(&document, settings)?;
    let blob = parse_script_blob(&script, settings)?;

    let text = rendered_text(anchor);
    let lines: Vec<&str> = text.split('\n').collect();
    let fields = AnchorFields::from_lines(&lines)?;

    let href = anchor
        .value()
        .attr("href")
        .ok_or(ExtractError::NotFound("href on patch notes anchor"))?;
    let url = absolute_url(&settings.site_origin, href);

    let title = if fields.title.is_empty() {
        blob.title.unwrap_or_default()
    } else {
        fields.title
    };

    Ok(ArticleRecord {
        title,
        url,
        published_date: fields.published_date,
        body_summary: fields.body_summary,
        thumbnail_url: blob.media.and_then(|m| m.url),
    })
}

/// Positional fields of the anchor's rendered text.
#[derive(Debug, PartialEq, Eq)]
struct AnchorFields {
    published_date: NaiveDate,
    title: String,
    body_summary: String,
}

impl AnchorFields {
    const TIMESTAMP_LINE: usize = 1;
    const TITLE_LINE: usize = 2;
    const BODY_START: usize = 3;

    fn from_lines(lines: &[&str]) -> Result<Self, ExtractError> {
        let timestamp = line_at(lines, Self::TIMESTAMP_LINE, "timestamp")?;
        let title = line_at(lines, Self::TITLE_LINE, "title")?;
        let body = lines.get(Self::BODY_START..).unwrap_or_default();

        Ok(Self {
            published_date: parse_published_date(timestamp)?,
            title: title.trim().to_string(),
            body_summary: body.join(" ").trim().to_string(),
        })
    }
}

fn line_at<'a>(lines: &[&'a str], index: usize, field: &str) -> Result<&'a str, ExtractError> {
    lines.get(index).copied().ok_or_else(|| {
        ExtractError::MalformedData(format!(
            "anchor text has {} lines, {field} expected at line {index}",
            lines.len()
        ))
    })
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector is valid"))
}

fn find_labelled_anchor<'a>(
    document: &'a Html,
    label_marker: &str,
) -> Result<ElementRef<'a>, ExtractError> {
    static LABELLED: OnceLock<Selector> = OnceLock::new();
    document
        .select(selector(&LABELLED, "a[aria-label]"))
        .find(|a| {
            a.value()
                .attr("aria-label")
                .is_some_and(|label| label.contains(label_marker))
        })
        .ok_or(ExtractError::NotFound("anchor labelled with the patch notes marker"))
}

fn find_data_script(document: &Html, settings: &ArticleSettings) -> Result<String, ExtractError> {
    static SCRIPTS: OnceLock<Selector> = OnceLock::new();
    document
        .select(selector(&SCRIPTS, "script"))
        .map(|script| script.text().collect::<String>())
        .find(|text| text.contains(&settings.title_marker) && text.contains(&settings.media_marker))
        .ok_or(ExtractError::NotFound("script with patch notes data"))
}

/// Cuts the JSON object for the article out of the hydration script and decodes it.
///
/// The object starts `blob_lead` characters before the title marker and ends
/// `blob_tail` characters after the start of the date marker.
fn parse_script_blob(script: &str, settings: &ArticleSettings) -> Result<ScriptBlob, ExtractError> {
    let span = blob_span(script, settings)?;
    serde_json::from_str(span).map_err(|e| ExtractError::MalformedData(e.to_string()))
}

fn blob_span<'a>(script: &'a str, settings: &ArticleSettings) -> Result<&'a str, ExtractError> {
    let title_at = script
        .find(&settings.title_marker)
        .ok_or(ExtractError::NotFound("title marker in script"))?;
    let start = title_at.checked_sub(settings.blob_lead).ok_or_else(|| {
        ExtractError::MalformedData("title marker too close to the start of the script".into())
    })?;
    let rest = script
        .get(start..)
        .ok_or_else(|| ExtractError::MalformedData("blob start splits a character".into()))?;

    let date_at = rest
        .find(&settings.date_marker)
        .ok_or(ExtractError::NotFound("publish date marker in script"))?;
    rest.get(..date_at + settings.blob_tail)
        .ok_or_else(|| ExtractError::MalformedData("blob end is past the end of the script".into()))
}

/// Text nodes of the element joined by line breaks.
fn rendered_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join("\n")
}

fn parse_published_date(raw: &str) -> Result<NaiveDate, ExtractError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ").map(|dt| dt.date()))
        .map_err(|e| ExtractError::MalformedData(format!("bad publish timestamp {raw:?}: {e}")))
}

/// Site origin followed by the href, exactly as written.
///
/// The result is the dedup key, so it is never normalized. An href that is
/// already absolute is kept as is.
fn absolute_url(origin: &str, href: &str) -> String {
    if href.starts_with("https://") || href.starts_with("http://") {
        return href.to_string();
    }
    format!("{}{}", origin.trim_end_matches('/'), href)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ArticleSettings {
        ArticleSettings::default()
    }

    #[test]
    fn anchor_fields_follow_line_positions() {
        let lines = ["", "2024-01-01T00:00:00.000Z", "Patch 8.0", "Notes body", "more"];
        let fields = AnchorFields::from_lines(&lines).unwrap();
        assert_eq!(fields.published_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(fields.title, "Patch 8.0");
        assert_eq!(fields.body_summary, "Notes body more");
    }

    #[test]
    fn missing_title_line_is_malformed() {
        let lines = ["", "2024-01-01T00:00:00.000Z"];
        assert!(matches!(
            AnchorFields::from_lines(&lines),
            Err(ExtractError::MalformedData(_))
        ));
    }

    #[test]
    fn blob_span_uses_fixed_offsets() {
        let script = r#"x=[{"title":"VALORANT Patch Notes 8.0","media":{"url":"http://img"},"publishDate": "2024-01-01T00:00:00.000Z"},{"n":1}]"#;
        let span = blob_span(script, &settings()).unwrap();
        assert!(span.starts_with(r#"{"title""#));
        assert!(span.ends_with(r#".000Z"}"#));
        let blob: ScriptBlob = serde_json::from_str(span).unwrap();
        assert_eq!(blob.media.and_then(|m| m.url).as_deref(), Some("http://img"));
    }

    #[test]
    fn blob_span_past_end_is_malformed() {
        let script = r#"{"title":"VALORANT Patch Notes","media":{},"publishDate":"x"}"#;
        assert!(matches!(
            blob_span(script, &settings()),
            Err(ExtractError::MalformedData(_))
        ));
    }

    #[test]
    fn title_marker_at_script_start_is_malformed() {
        let script = r#"VALORANT Patch Notes "media":{ publishDate"#;
        assert!(matches!(
            blob_span(script, &settings()),
            Err(ExtractError::MalformedData(_))
        ));
    }

    #[test]
    fn display_date_is_unpadded() {
        let record = ArticleRecord {
            title: String::new(),
            url: String::new(),
            published_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            body_summary: String::new(),
            thumbnail_url: None,
        };
        assert_eq!(record.display_date(), "3/5/2024");
    }

    #[test]
    fn relative_href_joins_origin() {
        assert_eq!(
            absolute_url("https://playvalorant.com/", "/en-us/news/x"),
            "https://playvalorant.com/en-us/news/x"
        );
    }

    #[test]
    fn href_is_kept_verbatim() {
        assert_eq!(
            absolute_url("https://playvalorant.com", "/ja-jp/news/パッチノート 9.01/../x"),
            "https://playvalorant.com/ja-jp/news/パッチノート 9.01/../x"
        );
        assert_eq!(
            absolute_url("https://playvalorant.com", "https://cdn.example/notes"),
            "https://cdn.example/notes"
        );
    }
}
