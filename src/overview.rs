//! Story overview (table-of-contents) page parsing.
//!
//! Seeds a crawl with the once-only ledger fields and the first chapter URL.
//! Everything except the first chapter link is best-effort; without that
//! link the crawl cannot proceed, so it is the one hard error here.

use reqwest::Url;
use scraper::{Html, Selector};

use crate::crawler::error::CrawlError;
use crate::crawler::{sanitize_filename, Fetch};
use crate::model::StoryMetadata;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Fetch the overview page and parse the seed metadata bundle.
pub fn fetch_story_metadata(
    fetcher: &mut dyn Fetch,
    overview_url: &str,
) -> Result<StoryMetadata, CrawlError> {
    log::info!("Fetching metadata from overview page: {}", overview_url);
    let page = fetcher.fetch(overview_url)?;
    parse_story_metadata(overview_url, &page.body)
}

/// Parse the overview HTML. Errors only when no first-chapter link is found.
pub fn parse_story_metadata(
    overview_url: &str,
    html: &str,
) -> Result<StoryMetadata, CrawlError> {
    let doc = Html::parse_document(html);
    let json_ld = parse_json_ld(&doc);

    let story_title = select_text(&doc, "div.fic-title h1.font-white")
        .or_else(|| {
            select_text(&doc, "title")
                .map(|t| t.split('|').next().unwrap_or("").trim().to_string())
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let author_name = select_text(&doc, "div.fic-title h4 span a[href*=\"/profile/\"]")
        .or_else(|| select_text(&doc, "div.fic-title h4 a[href*=\"/profile/\"]"))
        .or_else(|| json_ld.as_ref().and_then(author_from_json_ld))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    if author_name == UNKNOWN_AUTHOR {
        log::warn!("Author not found on overview page: {}", overview_url);
    }

    let description = select_attr(&doc, "meta[property=\"og:description\"]", "content")
        .or_else(|| select_attr(&doc, "meta[name=\"twitter:description\"]", "content"))
        .or_else(|| {
            json_ld
                .as_ref()
                .and_then(|v| v.get("description"))
                .and_then(|d| d.as_str())
                .map(String::from)
        });

    let cover_image_url = select_attr(&doc, "meta[property=\"og:image\"]", "content")
        .or_else(|| select_attr(&doc, "meta[name=\"twitter:image\"]", "content"))
        .or_else(|| {
            json_ld
                .as_ref()
                .and_then(|v| v.get("image"))
                .and_then(|i| i.as_str())
                .map(String::from)
        })
        .and_then(|href| resolve(overview_url, &href));

    let tags = collect_tags(&doc, json_ld.as_ref());

    let story_id = story_id_from_url(overview_url);

    let first_chapter_url =
        first_chapter_link(&doc, overview_url).ok_or_else(|| CrawlError::MissingFirstChapter {
            url: overview_url.to_string(),
        })?;
    log::info!("First chapter URL found: {}", first_chapter_url);

    let story_slug = if story_title != UNKNOWN_TITLE {
        sanitize_filename(&story_title)
    } else if let Some(ref id) = story_id {
        sanitize_filename(&format!("story_{}", id))
    } else {
        slug_from_url_tail(overview_url)
    };

    Ok(StoryMetadata {
        overview_url: overview_url.to_string(),
        story_title,
        author_name,
        story_slug,
        first_chapter_url,
        description,
        cover_image_url,
        tags,
        story_id,
    })
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let text = doc
        .select(&sel)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()?
        .value()
        .attr(attr)
        .map(String::from)
        .filter(|s| !s.is_empty())
}

fn resolve(base: &str, href: &str) -> Option<String> {
    if let Ok(abs) = Url::parse(href) {
        return Some(abs.to_string());
    }
    Url::parse(base)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}

fn parse_json_ld(doc: &Html) -> Option<serde_json::Value> {
    let sel = Selector::parse("script[type=\"application/ld+json\"]").ok()?;
    let raw = doc.select(&sel).next()?.text().collect::<String>();
    match serde_json::from_str(raw.trim()) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Error parsing JSON-LD block: {}", e);
            None
        }
    }
}

/// JSON-LD author comes in string, object, and list shapes.
fn author_from_json_ld(v: &serde_json::Value) -> Option<String> {
    let author = v.get("author")?;
    let name = match author {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o.get("name").and_then(|n| n.as_str()).map(String::from),
        serde_json::Value::Array(items) => items.first().and_then(|first| match first {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(o) => {
                o.get("name").and_then(|n| n.as_str()).map(String::from)
            }
            _ => None,
        }),
        _ => None,
    };
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Tags from the keywords meta plus JSON-LD genre/keywords, deduped sorted.
fn collect_tags(doc: &Html, json_ld: Option<&serde_json::Value>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    if let Some(content) = select_attr(doc, "meta[name=\"keywords\"]", "content") {
        tags.extend(
            content
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
        );
    }
    if let Some(v) = json_ld {
        for key in ["genre", "keywords"] {
            match v.get(key) {
                Some(serde_json::Value::String(s)) => {
                    if key == "keywords" {
                        tags.extend(
                            s.split(',')
                                .map(str::trim)
                                .filter(|t| !t.is_empty())
                                .map(String::from),
                        );
                    } else if !s.trim().is_empty() {
                        tags.push(s.trim().to_string());
                    }
                }
                Some(serde_json::Value::Array(items)) => {
                    tags.extend(
                        items
                            .iter()
                            .filter_map(|i| i.as_str())
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(String::from),
                    );
                }
                _ => {}
            }
        }
    }
    tags.sort();
    tags.dedup();
    tags
}

/// First chapter link: the "Start Reading" button, else the first row of the
/// chapter table.
fn first_chapter_link(doc: &Html, overview_url: &str) -> Option<String> {
    if let Some(href) = select_attr(doc, "a.btn.btn-primary[href*=\"/chapter/\"]", "href") {
        return resolve(overview_url, &href);
    }
    log::warn!(
        "First chapter button not found on overview page, trying chapter table: {}",
        overview_url
    );
    select_attr(doc, "table#chapters tbody tr[data-url] a", "href")
        .and_then(|href| resolve(overview_url, &href))
}

/// Numeric story id after a `/fiction/` or `/story/` path marker.
pub fn story_id_from_url(url: &str) -> Option<String> {
    for marker in ["/fiction/", "/story/"] {
        if let Some(pos) = url.find(marker) {
            let digits: String = url[pos + marker.len()..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                return Some(digits);
            }
        }
    }
    None
}

/// Last-resort slug from the final URL path components.
fn slug_from_url_tail(url: &str) -> String {
    let tail = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown_story");
    let cleaned: String = tail
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    sanitize_filename(&format!("story_{}", cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERVIEW_URL: &str = "https://www.royalroad.com/fiction/117255/rend";

    fn overview_html() -> String {
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <title>REND | Royal Road</title>
    <meta property="og:description" content="A retired god tends bar." />
    <meta property="og:image" content="https://cdn.example/covers/117255-rend.jpg" />
    <meta name="keywords" content="rend, temple, web fiction" />
    <script type="application/ld+json">
    {
        "@type": "Book",
        "name": "REND",
        "author": { "@type": "Person", "name": "Temple" },
        "genre": ["Comedy", "Urban Fantasy"]
    }
    </script>
</head>
<body>
    <div class="fic-title">
        <h1 class="font-white">REND</h1>
        <h4>by <a href="/profile/85078" class="font-white">Temple</a></h4>
    </div>
    <a href="/fiction/117255/rend/chapter/2291798/11-crappy-monday" class="btn btn-lg btn-primary">Start Reading</a>
    <table id="chapters"><tbody>
        <tr data-url="/fiction/117255/rend/chapter/2291798/11-crappy-monday">
            <td><a href="/fiction/117255/rend/chapter/2291798/11-crappy-monday">1.1 Crappy Monday</a></td>
        </tr>
    </tbody></table>
</body>
</html>"##
            .to_string()
    }

    #[test]
    fn parses_full_overview_page() -> Result<(), CrawlError> {
        let meta = parse_story_metadata(OVERVIEW_URL, &overview_html())?;
        assert_eq!(meta.story_title, "REND");
        assert_eq!(meta.author_name, "Temple");
        assert_eq!(
            meta.first_chapter_url,
            "https://www.royalroad.com/fiction/117255/rend/chapter/2291798/11-crappy-monday"
        );
        assert_eq!(meta.story_slug, "REND");
        assert_eq!(meta.story_id.as_deref(), Some("117255"));
        assert_eq!(meta.description.as_deref(), Some("A retired god tends bar."));
        assert_eq!(
            meta.cover_image_url.as_deref(),
            Some("https://cdn.example/covers/117255-rend.jpg")
        );
        assert_eq!(
            meta.tags,
            vec!["Comedy", "Urban Fantasy", "rend", "temple", "web fiction"]
        );
        Ok(())
    }

    #[test]
    fn title_falls_back_to_page_title_before_pipe() -> Result<(), CrawlError> {
        let html = r#"<html><head><title>REND | Royal Road</title></head><body>
            <a href="/fiction/117255/rend/chapter/1/one" class="btn btn-primary">Start Reading</a>
        </body></html>"#;
        let meta = parse_story_metadata(OVERVIEW_URL, html)?;
        assert_eq!(meta.story_title, "REND");
        Ok(())
    }

    #[test]
    fn author_from_json_ld_string_and_list_shapes() {
        let v: serde_json::Value = serde_json::json!({ "author": "Temple" });
        assert_eq!(author_from_json_ld(&v).as_deref(), Some("Temple"));
        let v = serde_json::json!({ "author": [{ "name": "First" }, { "name": "Second" }] });
        assert_eq!(author_from_json_ld(&v).as_deref(), Some("First"));
        let v = serde_json::json!({ "author": 7 });
        assert_eq!(author_from_json_ld(&v), None);
    }

    #[test]
    fn first_chapter_falls_back_to_table_row() -> Result<(), CrawlError> {
        let html = r#"<html><body>
            <table id="chapters"><tbody>
                <tr data-url="/fiction/117255/rend/chapter/1/one">
                    <td><a href="/fiction/117255/rend/chapter/1/one">One</a></td>
                </tr>
            </tbody></table>
        </body></html>"#;
        let meta = parse_story_metadata(OVERVIEW_URL, html)?;
        assert_eq!(
            meta.first_chapter_url,
            "https://www.royalroad.com/fiction/117255/rend/chapter/1/one"
        );
        Ok(())
    }

    #[test]
    fn missing_first_chapter_link_is_an_error() {
        let html = "<html><body><p>No chapters listed.</p></body></html>";
        match parse_story_metadata(OVERVIEW_URL, html) {
            Err(CrawlError::MissingFirstChapter { url }) => assert_eq!(url, OVERVIEW_URL),
            other => panic!("expected MissingFirstChapter, got {:?}", other),
        }
    }

    #[test]
    fn slug_uses_story_id_when_title_unknown() -> Result<(), CrawlError> {
        let html = r#"<html><body>
            <a href="/fiction/117255/rend/chapter/1/one" class="btn btn-primary">Start Reading</a>
        </body></html>"#;
        let meta = parse_story_metadata(OVERVIEW_URL, html)?;
        assert_eq!(meta.story_title, "Unknown Title");
        assert_eq!(meta.story_slug, "story_117255");
        Ok(())
    }

    #[test]
    fn story_id_from_url_patterns() {
        assert_eq!(
            story_id_from_url("https://e/fiction/123/slug").as_deref(),
            Some("123")
        );
        assert_eq!(
            story_id_from_url("https://e/story/77/slug").as_deref(),
            Some("77")
        );
        assert_eq!(story_id_from_url("https://e/other/1"), None);
    }
}
