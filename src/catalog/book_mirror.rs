//! Book mirror search adapter.
//!
//! Scrapes the mirror's HTML search page. The results table has a fixed
//! column layout; see [`parse_search_results`].

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{fetch_text, resolve_url, Candidate, CatalogAdapter};
use crate::acquisition::{AcquisitionError, BookPayload, MediaKind, QueuePayload, RetryPolicy};

/// Stand-in for rows whose link carries no usable id. Rows are kept so the
/// result order matches the page.
pub const INVALID_EXTERNAL_ID: &str = "-1";

const RESULTS_PER_PAGE: u32 = 50;

lazy_static! {
    static ref RESULTS_TABLE: Selector =
        Selector::parse("table#tablelibgen").expect("valid results table selector");
    static ref RESULT_ROWS: Selector = Selector::parse("tbody > tr").expect("valid row selector");
    static ref CELLS: Selector = Selector::parse("td").expect("valid cell selector");
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect("valid anchor selector");
    static ref IMAGE: Selector = Selector::parse("img[src]").expect("valid image selector");
}

mod column {
    pub const AUTHOR: usize = 0;
    pub const TITLE: usize = 1;
    pub const PUBLISHER: usize = 2;
    pub const YEAR: usize = 3;
    pub const LANGUAGE: usize = 4;
    pub const PAGES: usize = 5;
    pub const SIZE: usize = 6;
    pub const EXTENSION: usize = 7;
    pub const MIRROR: usize = 8;
    pub const COVER: usize = 9;
}

pub struct BookMirrorAdapter {
    client: Client,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl BookMirrorAdapter {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Result<Self, AcquisitionError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            retry_policy,
        })
    }

    fn search_url(&self, terms: &str) -> String {
        format!(
            "{}/search.php?req={}&res={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(terms),
            RESULTS_PER_PAGE
        )
    }
}

#[async_trait]
impl CatalogAdapter for BookMirrorAdapter {
    fn kind(&self) -> MediaKind {
        MediaKind::Book
    }

    async fn search(&self, terms: &str) -> Result<Vec<Candidate>, AcquisitionError> {
        let url = self.search_url(terms);
        debug!("Searching book mirror: {}", url);
        let html = fetch_text(&self.client, &url, &self.retry_policy).await?;
        parse_search_results(&html, &self.base_url)
    }
}

/// Parse the search results page into candidates, in page order.
///
/// Cells map positionally to author, title, publisher, year, language,
/// pages, size, extension, mirror link and cover image.
pub fn parse_search_results(html: &str, base_url: &str) -> Result<Vec<Candidate>, AcquisitionError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&RESULTS_TABLE)
        .next()
        .ok_or_else(|| AcquisitionError::parse("results table not found"))?;

    let mut candidates = Vec::new();
    for row in table.select(&RESULT_ROWS) {
        let cells: Vec<ElementRef> = row.select(&CELLS).collect();
        if cells.is_empty() {
            continue;
        }
        candidates.push(parse_row(&cells, base_url));
    }
    Ok(candidates)
}

fn parse_row(cells: &[ElementRef], base_url: &str) -> Candidate {
    let text = |index: usize| cells.get(index).map(cell_text).unwrap_or_default();
    let link = |index: usize| {
        cells
            .get(index)
            .and_then(|cell| cell.select(&ANCHOR).next())
            .and_then(|a| a.value().attr("href"))
    };

    let external_id = link(column::TITLE)
        .and_then(|href| extract_id(href, base_url))
        .unwrap_or_else(|| INVALID_EXTERNAL_ID.to_string());

    let mirror = link(column::MIRROR)
        .and_then(|href| resolve_url(base_url, href).ok())
        .map(|url| url.to_string());

    let cover_url = cells
        .get(column::COVER)
        .and_then(|cell| cell.select(&IMAGE).next())
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve_url(base_url, src).ok())
        .map(|url| url.to_string());

    let payload = BookPayload {
        title: text(column::TITLE),
        author: text(column::AUTHOR),
        publisher: text(column::PUBLISHER),
        year: text(column::YEAR),
        language: text(column::LANGUAGE),
        pages: text(column::PAGES),
        size: text(column::SIZE),
        extension: text(column::EXTENSION),
        mirror: mirror.clone().unwrap_or_default(),
    };

    Candidate {
        external_id,
        title: payload.title.clone(),
        subtitle: format!("{} ({})", payload.author, payload.year),
        cover_url,
        source_mirror: mirror,
        payload: QueuePayload::Book(payload),
    }
}

/// Text content of a cell with markup removed, cut to its first non-empty line.
fn cell_text(cell: &ElementRef) -> String {
    let text: String = cell.text().collect();
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Numeric `id` query parameter of a link.
fn extract_id(href: &str, base_url: &str) -> Option<String> {
    let url = resolve_url(base_url, href).ok()?;
    let (_, id) = url.query_pairs().find(|(key, _)| key == "id")?;
    id.parse::<u64>().ok().map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://mirror.example";

    const RESULTS_PAGE: &str = r#"
        <html><body>
        <table id="tablelibgen">
          <thead><tr><th>Author</th><th>Title</th></tr></thead>
          <tbody>
            <tr>
              <td><a href="/author?name=herbert">Frank Herbert</a></td>
              <td><a href="book/index.php?id=1234&md5=abc"><b>Dune</b>
                  <i>Deluxe edition</i></a></td>
              <td>Chilton Books</td>
              <td>1965</td>
              <td>English</td>
              <td>412</td>
              <td>1 Mb</td>
              <td>epub</td>
              <td><a href="/ads.php?md5=abc">[1]</a></td>
              <td><img src="/covers/1234.jpg"></td>
            </tr>
            <tr>
              <td>Ursula K. Le Guin</td>
              <td><a href="book/index.php?md5=def">The Dispossessed</a></td>
              <td>Harper</td>
              <td>1974</td>
              <td>English</td>
              <td>387</td>
              <td>2 Mb</td>
              <td>pdf</td>
              <td><a href="https://cdn.example/get?md5=def">[1]</a></td>
              <td></td>
            </tr>
          </tbody>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_parses_rows_in_order() {
        let candidates = parse_search_results(RESULTS_PAGE, BASE).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Dune");
        assert_eq!(candidates[1].title, "The Dispossessed");
    }

    #[test]
    fn test_maps_cells_positionally() {
        let candidates = parse_search_results(RESULTS_PAGE, BASE).unwrap();
        let dune = &candidates[0];
        assert_eq!(dune.external_id, "1234");
        assert_eq!(dune.subtitle, "Frank Herbert (1965)");
        assert_eq!(
            dune.cover_url.as_deref(),
            Some("http://mirror.example/covers/1234.jpg")
        );
        assert_eq!(
            dune.source_mirror.as_deref(),
            Some("http://mirror.example/ads.php?md5=abc")
        );

        match &dune.payload {
            QueuePayload::Book(book) => {
                assert_eq!(book.author, "Frank Herbert");
                assert_eq!(book.publisher, "Chilton Books");
                assert_eq!(book.language, "English");
                assert_eq!(book.pages, "412");
                assert_eq!(book.size, "1 Mb");
                assert_eq!(book.extension, "epub");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_title_is_truncated_to_first_line() {
        let candidates = parse_search_results(RESULTS_PAGE, BASE).unwrap();
        assert_eq!(candidates[0].title, "Dune");
    }

    #[test]
    fn test_unparseable_id_uses_sentinel() {
        let candidates = parse_search_results(RESULTS_PAGE, BASE).unwrap();
        let second = &candidates[1];
        assert_eq!(second.external_id, INVALID_EXTERNAL_ID);
        assert!(second.cover_url.is_none());
        assert_eq!(
            second.source_mirror.as_deref(),
            Some("https://cdn.example/get?md5=def")
        );
    }

    #[test]
    fn test_missing_table_is_parse_error() {
        let result = parse_search_results("<html><body><p>maintenance</p></body></html>", BASE);
        assert!(matches!(result, Err(AcquisitionError::Parse(_))));
    }

    #[test]
    fn test_empty_table_yields_no_candidates() {
        let html = r#"<table id="tablelibgen"><tbody></tbody></table>"#;
        assert!(parse_search_results(html, BASE).unwrap().is_empty());
    }

    #[test]
    fn test_search_url_encodes_terms() {
        let adapter = BookMirrorAdapter::new(
            "http://mirror.example/",
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            adapter.search_url("dune messiah"),
            "http://mirror.example/search.php?req=dune%20messiah&res=50"
        );
    }
}
