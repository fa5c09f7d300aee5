//! `PageSession` over plain HTTP: the "current page" is the last document
//! fetched, controls are followed as links, and tables are read with
//! `scraper`.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Mutex;
use url::Url;

use crate::source::{ContentReader, PageControls, TableCell, TableRow, collapse_whitespace};

const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
const USER_AGENT_VALUE: &str = "catalogscout/0.1";

#[derive(Debug, Clone)]
struct LoadedPage {
    url: Url,
    html: String,
}

pub struct HttpPortal {
    client: reqwest::Client,
    current: Mutex<Option<LoadedPage>>,
}

impl HttpPortal {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build portal http client")?;
        Ok(Self {
            client,
            current: Mutex::new(None),
        })
    }

    async fn fetch(&self, url: &Url) -> anyhow::Result<(Url, String)> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} failed ({status})");
        }
        let final_url = response.url().clone();
        let (text, truncated) = read_text_limited(response, MAX_BODY_BYTES).await?;
        if truncated {
            tracing::warn!(%url, limit = MAX_BODY_BYTES, "response body truncated");
        }
        Ok((final_url, text))
    }

    async fn load(&self, url: Url) -> anyhow::Result<()> {
        let (url, html) = self.fetch(&url).await?;
        tracing::debug!(%url, bytes = html.len(), "page loaded");
        *self.current.lock().await = Some(LoadedPage { url, html });
        Ok(())
    }

    async fn current(&self) -> anyhow::Result<LoadedPage> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no page is open"))
    }
}

#[async_trait]
impl ContentReader for HttpPortal {
    async fn read_rows(&self, locator: &str) -> anyhow::Result<Option<Vec<TableRow>>> {
        let page = self.current().await?;
        parse_table(&page.html, &page.url, locator)
    }

    async fn read_page(&self, address: &str) -> anyhow::Result<String> {
        let url = parse_http_url(address)?;
        let (_, html) = self.fetch(&url).await?;
        Ok(html)
    }
}

#[async_trait]
impl PageControls for HttpPortal {
    async fn open(&self, address: &str) -> anyhow::Result<()> {
        let url = parse_http_url(address)?;
        self.load(url).await
    }

    async fn maximize_page_size(&self, locator: &str) -> anyhow::Result<bool> {
        let page = self.current().await?;
        let Some((name, value)) = page_size_choice(&page.html, locator)? else {
            return Ok(false);
        };
        let url = with_query_param(&page.url, &name, &value);
        tracing::debug!(%url, name, value, "page size set to maximum");
        self.load(url).await?;
        Ok(true)
    }

    async fn next_page(&self, locator: &str) -> anyhow::Result<bool> {
        let page = self.current().await?;
        let Some(target) = control_target(&page.html, &page.url, locator)? else {
            return Ok(false);
        };
        self.load(target).await?;
        Ok(true)
    }

    async fn has_element(&self, locator: &str) -> anyhow::Result<bool> {
        let page = self.current().await?;
        contains_element(&page.html, locator)
    }

    async fn activate(&self, locator: &str) -> anyhow::Result<bool> {
        let page = self.current().await?;
        let Some(target) = control_target(&page.html, &page.url, locator)? else {
            return Ok(false);
        };
        self.fetch(&target).await?;
        Ok(true)
    }

    async fn reload(&self) -> anyhow::Result<()> {
        let page = self.current().await?;
        self.load(page.url).await
    }
}

fn parse_http_url(address: &str) -> anyhow::Result<Url> {
    let url = Url::parse(address.trim()).with_context(|| format!("parse url: {address}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http/https: {url}");
    }
    Ok(url)
}

fn parse_selector(locator: &str) -> anyhow::Result<Selector> {
    Selector::parse(locator).map_err(|err| anyhow::anyhow!("invalid selector {locator:?}: {err}"))
}

fn contains_element(html: &str, locator: &str) -> anyhow::Result<bool> {
    let document = Html::parse_document(html);
    let selector = parse_selector(locator)?;
    let found = document.select(&selector).next().is_some();
    Ok(found)
}

fn parse_table(html: &str, base: &Url, locator: &str) -> anyhow::Result<Option<Vec<TableRow>>> {
    let document = Html::parse_document(html);
    let table_selector = parse_selector(locator)?;
    let Some(table) = document.select(&table_selector).next() else {
        return Ok(None);
    };

    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td")?;
    let link_selector = parse_selector("a[href]")?;
    let image_selector = parse_selector("img[src]")?;

    let mut rows = Vec::new();
    for tr in table.select(&row_selector) {
        let cells = tr
            .select(&cell_selector)
            .map(|td| table_cell(td, base, &link_selector, &image_selector))
            .collect::<Vec<_>>();
        // Header rows only have <th>.
        if cells.is_empty() {
            continue;
        }
        rows.push(TableRow::new(cells));
    }
    Ok(Some(rows))
}

fn table_cell(td: ElementRef<'_>, base: &Url, links: &Selector, images: &Selector) -> TableCell {
    let segments = td
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();
    TableCell {
        text: collapse_whitespace(&segments.join(" ")),
        segments,
        links: td
            .select(links)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| resolve(base, href))
            .collect(),
        images: td
            .select(images)
            .filter_map(|img| img.value().attr("src"))
            .map(|src| resolve(base, src))
            .collect(),
    }
}

fn resolve(base: &Url, reference: &str) -> String {
    let reference = reference.trim();
    base.join(reference)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| reference.to_owned())
}

/// Name of the page-size control and its largest option.
fn page_size_choice(html: &str, locator: &str) -> anyhow::Result<Option<(String, String)>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(locator)?;
    let Some(control) = document.select(&selector).next() else {
        return Ok(None);
    };
    let Some(name) = control.value().attr("name") else {
        tracing::warn!(locator, "page size control has no name");
        return Ok(None);
    };

    let option_selector = parse_selector("option")?;
    let values = control
        .select(&option_selector)
        .map(|option| {
            option
                .value()
                .attr("value")
                .map(str::to_owned)
                .unwrap_or_else(|| collapse_whitespace(&option.text().collect::<String>()))
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>();

    let largest = values
        .iter()
        .filter_map(|value| value.parse::<u64>().ok().map(|n| (n, value)))
        .max_by_key(|(n, _)| *n)
        .map(|(_, value)| value.clone())
        .or_else(|| values.last().cloned());

    Ok(largest.map(|value| (name.to_owned(), value)))
}

/// Where a link (`href`) or form (`action`) control points.
fn control_target(html: &str, base: &Url, locator: &str) -> anyhow::Result<Option<Url>> {
    let document = Html::parse_document(html);
    let selector = parse_selector(locator)?;
    let Some(control) = document.select(&selector).next() else {
        return Ok(None);
    };
    let Some(reference) = control
        .value()
        .attr("href")
        .or_else(|| control.value().attr("action"))
    else {
        return Ok(None);
    };
    let target = base
        .join(reference.trim())
        .with_context(|| format!("resolve control target: {reference}"))?;
    Ok(Some(target))
}

fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let pairs = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    let mut out = url.clone();
    out.set_fragment(None);
    {
        let mut query = out.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
        query.append_pair(name, value);
    }
    out
}

async fn read_text_limited(
    mut resp: reqwest::Response,
    limit: usize,
) -> anyhow::Result<(String, bool)> {
    let mut out: Vec<u8> = Vec::new();
    let mut truncated = false;

    while let Some(chunk) = resp.chunk().await.context("read response chunk")? {
        if out.len() + chunk.len() > limit {
            let remaining = limit.saturating_sub(out.len());
            out.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        out.extend_from_slice(&chunk);
    }

    Ok((String::from_utf8_lossy(&out).into_owned(), truncated))
}
