//! Post-match thread parsing.
//!
//! Thread bodies follow a human-maintained template: the first lines hold the
//! series score, a link to the match page and per-map results, and a `---`
//! line closes the data region. Every position the parser relies on comes from
//! [`ThreadLayout`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ThreadLayout, ThreadSettings};
use crate::error::ExtractError;

/// Shown in place of the comment block when a thread has no replies yet.
pub const NO_COMMENTS: &str = "No top comments found.";

const LINK_PREFIX: &str = "https://";
const COMMENT_MAX_CHARS: usize = 150;
const COMMENT_KEEP_CHARS: usize = 147;
const BULLET: &str = "• ";

/// A thread as returned by the forum search, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadCandidate {
    pub id: String,
    pub title: String,
    pub body: String,
    pub permalink: String,
    /// Top-level reply bodies in forum order, when already fetched.
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub team_a: String,
    pub team_b: String,
    pub event: String,
    pub score_line: String,
    pub reference_url: String,
    pub map_results: Vec<String>,
    pub top_comments: Vec<String>,
    pub permalink: String,
}

impl ThreadRecord {
    /// `TeamA<score>TeamB`, with the score fragment kept as written.
    pub fn result_header(&self) -> String {
        format!("{}{}{}", self.team_a, self.score_line, self.team_b)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejected {
    #[error("event {event:?} filtered out by tags")]
    Filtered { event: String },
    #[error(transparent)]
    Malformed(#[from] ExtractError),
}

/// Inclusion/exclusion over the whitespace-separated tokens of an event name.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    include: HashSet<String>,
    exclude: HashSet<String>,
}

impl TagFilter {
    pub fn new<I, E, S>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_settings(settings: &ThreadSettings) -> Self {
        Self::new(settings.include.iter().cloned(), settings.exclude.iter().cloned())
    }

    /// An excluded token rejects even when included tokens are present.
    pub fn accepts(&self, event: &str) -> bool {
        let mut included = false;
        for token in event.split_whitespace() {
            if self.exclude.contains(token) {
                return false;
            }
            included |= self.include.contains(token);
        }
        included
    }
}

impl ThreadCandidate {
    pub fn parse(&self, filter: &TagFilter, layout: &ThreadLayout) -> Result<ThreadRecord, Rejected> {
        let mut record = parse_candidate(&self.title, &self.body, &self.id, filter, layout)?;
        record.permalink = self.permalink.clone();
        Ok(record)
    }
}

/// Builds a record from a thread's title and body.
///
/// The tag filter runs as soon as the event name is known, so a thread for an
/// excluded event is rejected whatever its body looks like.
pub fn parse_candidate(
    title: &str,
    body: &str,
    id: &str,
    filter: &TagFilter,
    layout: &ThreadLayout,
) -> Result<ThreadRecord, Rejected> {
    let (team_a, team_b, event) = split_title(title)?;
    if !filter.accepts(event) {
        return Err(Rejected::Filtered {
            event: event.to_string(),
        });
    }

    let lines: Vec<&str> = body.lines().collect();
    let data = data_region(&lines, &layout.delimiter)?;

    let score_line = score_fragment(line_at(data, layout.score_line, "score")?, layout.score_width)?;
    let reference_url = markdown_link_target(line_at(data, layout.link_line, "reference link")?)?;
    let map_results = map_results(data, layout);

    Ok(ThreadRecord {
        id: id.to_string(),
        team_a: team_a.to_string(),
        team_b: team_b.to_string(),
        event: event.to_string(),
        score_line,
        reference_url,
        map_results,
        top_comments: Vec::new(),
        permalink: String::new(),
    })
}

/// `"<team a> vs <team b> / <event>"`.
fn split_title(title: &str) -> Result<(&str, &str, &str), ExtractError> {
    let mut parts = title.split(" / ");
    let (Some(teams), Some(event)) = (parts.next(), parts.next()) else {
        return Err(ExtractError::MalformedTitle(format!("no ' / ' in {title:?}")));
    };
    let mut sides = teams.split(" vs ");
    let (Some(team_a), Some(team_b)) = (sides.next(), sides.next()) else {
        return Err(ExtractError::MalformedTitle(format!("no ' vs ' in {teams:?}")));
    };
    Ok((team_a, team_b, event))
}

/// Lines before the first line that is exactly the delimiter.
fn data_region<'a, 'b>(lines: &'a [&'b str], delimiter: &str) -> Result<&'a [&'b str], ExtractError> {
    let end = lines
        .iter()
        .position(|line| *line == delimiter)
        .ok_or_else(|| ExtractError::MalformedBody(format!("no {delimiter:?} line")))?;
    Ok(&lines[..end])
}

fn line_at<'a>(data: &[&'a str], index: usize, field: &str) -> Result<&'a str, ExtractError> {
    data.get(index).copied().ok_or_else(|| {
        ExtractError::MalformedBody(format!(
            "{field} expected at line {index}, data region has {} lines",
            data.len()
        ))
    })
}

/// Text between the first and second `)`, cut to `width` characters.
fn score_fragment(line: &str, width: usize) -> Result<String, ExtractError> {
    let (_, after) = line
        .split_once(')')
        .ok_or_else(|| ExtractError::MalformedBody(format!("no ')' in score line {line:?}")))?;
    let segment = after.split(')').next().unwrap_or_default();
    Ok(segment.chars().take(width).collect())
}

/// Target of the first `[text](url)` on the line.
fn markdown_link_target(line: &str) -> Result<String, ExtractError> {
    let (_, after) = line
        .split_once("](")
        .ok_or_else(|| ExtractError::MalformedBody(format!("no markdown link in {line:?}")))?;
    let (target, _) = after
        .split_once(')')
        .ok_or_else(|| ExtractError::MalformedBody(format!("unterminated markdown link in {line:?}")))?;
    if target.trim().is_empty() {
        return Err(ExtractError::MalformedBody(format!("empty link target in {line:?}")));
    }
    Ok(target.trim().to_string())
}

fn map_results(data: &[&str], layout: &ThreadLayout) -> Vec<String> {
    data.get(layout.maps_start..)
        .unwrap_or_default()
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.replace(&layout.bold_marker, ""))
        .collect()
}

/// Bulleted, link-free, length-capped versions of a thread's top replies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSummary {
    bullets: Vec<String>,
}

impl CommentSummary {
    pub fn has_comments(&self) -> bool {
        !self.bullets.is_empty()
    }

    pub fn bullets(&self) -> &[String] {
        &self.bullets
    }

    pub fn into_bullets(self) -> Vec<String> {
        self.bullets
    }

    /// Bullets separated by blank lines, or [`NO_COMMENTS`].
    pub fn render(&self) -> String {
        if self.has_comments() {
            self.bullets.join("\n\n")
        } else {
            NO_COMMENTS.to_string()
        }
    }
}

pub fn summarize_comments<S: AsRef<str>>(raw_comments: &[S], limit: usize) -> CommentSummary {
    let bullets = raw_comments
        .iter()
        .take(limit)
        .map(|comment| format!("{BULLET}{}", summarize_comment(comment.as_ref())))
        .collect();
    CommentSummary { bullets }
}

fn summarize_comment(comment: &str) -> String {
    let collapsed = comment.trim().replace("\n\n", " ");
    truncate_comment(strip_links(&collapsed))
}

/// Removes every `https://` link, including the character that ends it.
///
/// A link ends at the first `)` or space, or at the end of the text. When the
/// link is the target of a markdown link the opening `(` goes too, leaving the
/// `[text]` part behind.
fn strip_links(text: &str) -> String {
    let mut out = text.to_string();
    while let Some(mut start) = out.find(LINK_PREFIX) {
        if start > 0 && out.as_bytes()[start - 1] == b'(' {
            start -= 1;
        }
        let tail = &out[start..];
        let end = start
            + [tail.find(')'), tail.find(' ')]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(tail.len());
        out = format!("{}{}", &out[..start], out.get(end + 1..).unwrap_or_default());
    }
    out
}

fn truncate_comment(text: String) -> String {
    if text.chars().count() > COMMENT_MAX_CHARS {
        let kept: String = text.chars().take(COMMENT_KEEP_CHARS).collect();
        format!("{kept}...")
    } else {
        text
    }
}
