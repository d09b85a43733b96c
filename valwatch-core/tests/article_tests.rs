use chrono::NaiveDate;
use valwatch_core::article::try_extract;
use valwatch_core::{check_articles, extract, Accent, ArticleSettings, ArticleStore, ExtractError};

const LISTING: &str = include_str!("fixtures/news_listing.html");

fn minimal_page(script: &str) -> String {
    format!(
        r#"<html><body>
<a aria-label="VALORANT Patch Notes 8.0" href="/en-us/news/x"> <time>2024-01-01T00:00:00.000Z</time><span>Patch 8.0</span><span>Notes body</span></a>
<script>{script}</script>
</body></html>"#
    )
}

const BLOB_SCRIPT: &str = r#"self.__data=[{"title":"VALORANT Patch Notes 8.0","media":{"url":"http://img"},"publishDate": "2024-01-01T00:00:00.000Z"}];"#;

#[test]
fn new_article_is_extracted() {
    let html = minimal_page(BLOB_SCRIPT);
    let record = extract(&html, None, &ArticleSettings::default()).expect("new article");

    assert_eq!(record.url, "https://playvalorant.com/en-us/news/x");
    assert_eq!(record.published_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(record.display_date(), "1/1/2024");
    assert_eq!(record.title, "Patch 8.0");
    assert_eq!(record.body_summary, "Notes body");
    assert_eq!(record.thumbnail_url.as_deref(), Some("http://img"));
}

#[test]
fn duplicate_article_is_absent() {
    let html = minimal_page(BLOB_SCRIPT);
    let seen = "https://playvalorant.com/en-us/news/x";
    assert!(extract(&html, Some(seen), &ArticleSettings::default()).is_none());
}

#[test]
fn second_check_after_accepting_is_absent() {
    let settings = ArticleSettings::default();
    let mut store = ArticleStore::in_memory();

    let first = check_articles(LISTING, &store, &settings).expect("first check finds notes");
    assert_eq!(first.payload.accent_color, Accent::GREEN);
    store.accept(first.record.url.clone());

    assert!(check_articles(LISTING, &store, &settings).is_none());
}

#[test]
fn older_url_in_store_still_reports_latest() {
    let mut store = ArticleStore::in_memory();
    store.accept("https://playvalorant.com/en-us/news/game-updates/valorant-patch-notes-9-0/");
    let accepted = check_articles(LISTING, &store, &ArticleSettings::default()).unwrap();
    assert!(accepted.record.url.ends_with("valorant-patch-notes-9-01/"));
}

#[test]
fn page_snapshot_merges_anchor_and_script() {
    let record = try_extract(LISTING, &ArticleSettings::default()).unwrap();
    assert_eq!(record.title, "VALORANT Patch Notes 9.01");
    assert_eq!(
        record.url,
        "https://playvalorant.com/en-us/news/game-updates/valorant-patch-notes-9-01/"
    );
    assert_eq!(record.display_date(), "7/9/2024");
    assert_eq!(record.body_summary, "Agent updates, map rotation changes and bug fixes.");
    assert_eq!(
        record.thumbnail_url.as_deref(),
        Some("https://images.example/patch-9-01.jpg")
    );
}

#[test]
fn page_without_labelled_anchor_is_not_found() {
    let html = r#"<html><body><a href="/en-us/news/y">Other</a><script>"VALORANT Patch Notes" "media":{</script></body></html>"#;
    let err = try_extract(html, &ArticleSettings::default()).unwrap_err();
    assert!(matches!(err, ExtractError::NotFound(_)));
    assert!(extract(html, None, &ArticleSettings::default()).is_none());
}

#[test]
fn page_without_data_script_is_not_found() {
    let html = minimal_page("window.x = 1;");
    let err = try_extract(&html, &ArticleSettings::default()).unwrap_err();
    assert!(matches!(err, ExtractError::NotFound(_)));
}

#[test]
fn broken_blob_json_is_malformed_and_degrades_to_absent() {
    let script = r#"self.__data=[{"title":"VALORANT Patch Notes 8.0","media":{"url":http://img},"publishDate": "2024-01-01T00:00:00.000Z"}];"#;
    let html = minimal_page(script);
    let err = try_extract(&html, &ArticleSettings::default()).unwrap_err();
    assert!(matches!(err, ExtractError::MalformedData(_)));
    assert!(extract(&html, None, &ArticleSettings::default()).is_none());
}

#[test]
fn anchor_with_too_few_lines_degrades_to_absent() {
    let html = format!(
        r#"<html><body><a aria-label="Patch Notes" href="/en-us/news/x">only one line</a><script>{BLOB_SCRIPT}</script></body></html>"#
    );
    assert!(extract(&html, None, &ArticleSettings::default()).is_none());
}

#[test]
fn non_ascii_href_is_stored_as_written() {
    let html = minimal_page(BLOB_SCRIPT).replace("/en-us/news/x", "/ja-jp/news/パッチノート-8-0/");
    let record = extract(&html, None, &ArticleSettings::default()).expect("new article");
    assert_eq!(record.url, "https://playvalorant.com/ja-jp/news/パッチノート-8-0/");

    assert!(extract(&html, Some(&record.url), &ArticleSettings::default()).is_none());
}
