//! Sitemap seeding
//!
//! Fetches a sitemap and extracts its `<loc>` entries to seed the crawl
//! frontier. Works for both plain `<urlset>` sitemaps and `<sitemapindex>`
//! files (index entries are returned like any other location; the caller's
//! URL filtering decides what to do with them). Malformed XML yields the
//! locations parsed up to the error.

use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;
use url::Url;

/// Fetch a sitemap and return its `<loc>` URLs.
pub async fn fetch_sitemap_urls(
    client: &reqwest::Client,
    sitemap_url: &str,
    timeout: Duration,
) -> anyhow::Result<Vec<Url>> {
    let response = client.get(sitemap_url).timeout(timeout).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("sitemap fetch returned {}", response.status());
    }
    let body = response.text().await?;
    Ok(parse_sitemap(&body))
}

/// Extract `<loc>` entries from sitemap XML.
pub fn parse_sitemap(xml: &str) -> Vec<Url> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    match Url::parse(text.trim()) {
                        Ok(url) => urls.push(url),
                        Err(e) => debug!("ignoring invalid sitemap loc '{}': {}", text, e),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("sitemap parse stopped: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_locations() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>https://example.com/about</loc></url>
  <url><loc>https://example.com/blog/post-1</loc></url>
</urlset>"#;

        let urls = parse_sitemap(xml);
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0].as_str(), "https://example.com/");
        assert_eq!(urls[2].path(), "/blog/post-1");
    }

    #[test]
    fn parses_sitemap_index_locations() {
        let xml = r#"<sitemapindex>
  <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
  <sitemap><loc>https://example.com/sitemap-2.xml</loc></sitemap>
</sitemapindex>"#;

        let urls = parse_sitemap(xml);
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn invalid_locations_are_skipped() {
        let xml = "<urlset><url><loc>not a url</loc></url><url><loc>https://example.com/ok</loc></url></urlset>";
        let urls = parse_sitemap(xml);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].path(), "/ok");
    }

    #[test]
    fn malformed_xml_keeps_earlier_entries() {
        let xml = "<urlset><url><loc>https://example.com/a</loc></url><url><loc>https://example";
        let urls = parse_sitemap(xml);
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(parse_sitemap("").is_empty());
    }
}
