//! Best-effort extraction of {title, content, next link} from chapter HTML.
//!
//! Each value is produced by an ordered list of strategies, tried until one
//! matches. Extraction never fails: when nothing matches, explicit
//! placeholders are returned and the crawler decides what to do with them.

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::model::ExtractedPage;

/// Placeholder title when no heading strategy matches.
pub const UNKNOWN_TITLE: &str = "Unknown Title";
/// Placeholder fragment when no content container matches. Guessing at
/// arbitrary page regions would capture navigation or ads instead.
pub const CONTENT_NOT_FOUND: &str = "<p>Content not found.</p>";

/// Known main-content container markers, most specific first.
const CONTENT_CONTAINERS: &[&str] = &["div.chapter-content", "div.prose"];

/// Visible-text vocabulary for next-page links, in more than one language.
const NEXT_VOCAB: &[&str] = &["next", "próximo", "proximo"];
/// Vocabulary that disqualifies a link as a previous-page control.
const PREV_VOCAB: &[&str] = &["previous", "anterior"];

/// Extract title, main content, and next-chapter link from a chapter page.
/// `page_url` is the URL the page was fetched from; relative links are
/// resolved against it.
pub fn extract(html: &str, page_url: &str) -> ExtractedPage {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    if base.is_none() {
        log::warn!("Page URL is not absolute, relative links will be dropped: {}", page_url);
    }

    let title_strategies: &[fn(&Html) -> Option<String>] = &[
        title_from_article_header,
        title_from_content_heading,
        title_from_any_heading,
        title_from_page_title,
    ];
    let title = title_strategies
        .iter()
        .find_map(|s| s(&doc))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let content_html = content_container(&doc).unwrap_or_else(|| {
        log::warn!(
            "Chapter content container not found (tried {:?}) at {}",
            CONTENT_CONTAINERS,
            page_url
        );
        CONTENT_NOT_FOUND.to_string()
    });

    let next_strategies: &[fn(&Html, Option<&Url>) -> Option<String>] = &[
        next_from_link_rel,
        next_from_button_links,
        next_from_any_link,
    ];
    let next_url = next_strategies
        .iter()
        .find_map(|s| s(&doc, base.as_ref()));
    if next_url.is_none() {
        log::debug!("No next chapter link found at {}", page_url);
    }

    ExtractedPage {
        title,
        content_html,
        next_url,
    }
}

fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// (1) Heading scoped to the page's article header.
fn title_from_article_header(doc: &Html) -> Option<String> {
    let el = select_first(
        doc,
        "div.fic-header h1.font-white.break-word, h1.break-word[property=\"name\"]",
    )?;
    non_empty(element_text(el))
}

/// (2) Heading inside the known content container.
fn title_from_content_heading(doc: &Html) -> Option<String> {
    let el = select_first(doc, "div.chapter-content h1")?;
    non_empty(element_text(el))
}

/// (3) First heading-level element anywhere in the document.
fn title_from_any_heading(doc: &Html) -> Option<String> {
    let el = select_first(doc, "h1")?;
    non_empty(element_text(el))
}

/// (4) Document `<title>`, cut at the first separator. Page titles often
/// read "Chapter Name - Story Name"; when the first dash-separated segment
/// is the shorter one it is the chapter-like part, so prefer it.
fn title_from_page_title(doc: &Html) -> Option<String> {
    let el = select_first(doc, "title")?;
    let full = element_text(el);
    let before_pipe = full.split('|').next().unwrap_or("").trim();
    let parts: Vec<&str> = before_pipe.split(" - ").collect();
    let title = if parts.len() > 1 && parts[0].len() < parts[1].len() {
        parts[0].trim()
    } else {
        before_pipe
    };
    non_empty(title.to_string())
}

/// Outer HTML of the first matching content container.
fn content_container(doc: &Html) -> Option<String> {
    CONTENT_CONTAINERS
        .iter()
        .find_map(|sel| select_first(doc, sel).map(|el| el.html()))
}

/// True for anchors with empty or placeholder targets that go nowhere.
fn is_dead_href(href: &str) -> bool {
    href.is_empty() || href == "#" || href.contains("javascript:void(0)")
}

/// Resolve an href to an absolute URL: absolute as-is, relative against the
/// page URL. Unresolvable hrefs yield None.
fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    if let Ok(abs) = Url::parse(href) {
        return Some(abs.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

fn text_has_any(text: &str, vocab: &[&str]) -> bool {
    vocab.iter().any(|w| text.contains(w))
}

/// Chapter-like URLs contain a chapter path segment or end in a numeric
/// path component; anything else is likely unrelated navigation.
fn looks_like_chapter_url(href: &str) -> bool {
    if href.contains("/chapter/") || href.contains("/fiction/") {
        return true;
    }
    if !href.contains('/') {
        return false;
    }
    match href.trim_end_matches('/').rsplit('/').next() {
        Some(seg) if !seg.is_empty() => seg.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// (1) The standard next-page link relation.
fn next_from_link_rel(doc: &Html, base: Option<&Url>) -> Option<String> {
    let el = select_first(doc, "link[rel=\"next\"]")?;
    let href = el.value().attr("href")?;
    if is_dead_href(href) {
        return None;
    }
    resolve_href(base, href)
}

fn anchors<'a>(doc: &'a Html) -> Vec<ElementRef<'a>> {
    match Selector::parse("a[href]") {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// (2) Button-styled links whose visible text matches next-page vocabulary.
fn next_from_button_links(doc: &Html, base: Option<&Url>) -> Option<String> {
    for el in anchors(doc) {
        let button_styled = el.value().classes().any(|c| {
            c == "btn" || c == "button" || c.to_ascii_lowercase().contains("next")
        });
        if !button_styled {
            continue;
        }
        let text = element_text(el).to_lowercase();
        if !text_has_any(&text, NEXT_VOCAB) {
            continue;
        }
        let href = match el.value().attr("href") {
            Some(h) if !is_dead_href(h) => h,
            _ => continue,
        };
        if let Some(url) = resolve_href(base, href) {
            return Some(url);
        }
    }
    None
}

/// (3) Broad scan: any link whose text matches next-page but not
/// previous-page vocabulary, restricted to chapter-like targets.
fn next_from_any_link(doc: &Html, base: Option<&Url>) -> Option<String> {
    for el in anchors(doc) {
        let text = element_text(el).to_lowercase();
        if !text_has_any(&text, NEXT_VOCAB) || text_has_any(&text, PREV_VOCAB) {
            continue;
        }
        let href = match el.value().attr("href") {
            Some(h) if !is_dead_href(h) => h,
            _ => continue,
        };
        if !looks_like_chapter_url(href) {
            continue;
        }
        if let Some(url) = resolve_href(base, href) {
            return Some(url);
        }
    }
    None
}
