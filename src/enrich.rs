use anyhow::Context as _;
use scraper::{Html, Selector};
use url::Url;

use crate::formats::{AFFILIATE_GOOD, AFFILIATE_ISSUE, ArticleRecord};
use crate::layout::{DetailLayout, FieldLocator};
use crate::pipeline::WorkflowState;
use crate::progress::{ProgressChannel, ProgressEvent};
use crate::source::{ContentReader, collapse_whitespace};

const ASC_SUBTAG_MARKER: &str = "ascsubtag";

/// Supplementary fields read from a record's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub affiliate_url: String,
    pub seo_title: String,
    pub description: String,
    pub description2: String,
}

#[derive(Debug, Clone)]
pub struct Enricher {
    layout: DetailLayout,
}

impl Enricher {
    pub fn new(layout: DetailLayout) -> Self {
        Self { layout }
    }

    /// Fetch and parse one detail page. Any failure yields the all-empty
    /// enrichment; nothing propagates.
    pub async fn enrich<R>(&self, reader: &R, address: &str) -> Enrichment
    where
        R: ContentReader + ?Sized,
    {
        if address.trim().is_empty() {
            tracing::debug!("record has no detail address; skipping enrichment");
            return Enrichment::default();
        }

        match self.try_enrich(reader, address).await {
            Ok(enrichment) => enrichment,
            Err(err) => {
                tracing::warn!(address, ?err, "enrichment failed; keeping empty fields");
                Enrichment::default()
            }
        }
    }

    async fn try_enrich<R>(&self, reader: &R, address: &str) -> anyhow::Result<Enrichment>
    where
        R: ContentReader + ?Sized,
    {
        let html = reader
            .read_page(address)
            .await
            .with_context(|| format!("read detail page: {address}"))?;
        self.parse(&html)
    }

    pub fn parse(&self, html: &str) -> anyhow::Result<Enrichment> {
        let document = Html::parse_document(html);
        Ok(Enrichment {
            affiliate_url: read_field(&document, &self.layout.affiliate_link)
                .context("affiliate link")?,
            seo_title: read_field(&document, &self.layout.seo_title).context("seo title")?,
            description: read_field(&document, &self.layout.description)
                .context("description")?,
            description2: read_field(&document, &self.layout.description2)
                .context("description2")?,
        })
    }

    /// Enrich every record in order, one fetch at a time, reporting
    /// `(index + 1) / total` after each record.
    pub async fn enrich_all<R>(
        &self,
        reader: &R,
        records: &mut [ArticleRecord],
        progress: &ProgressChannel,
    ) where
        R: ContentReader + ?Sized,
    {
        let total = records.len();
        for (index, record) in records.iter_mut().enumerate() {
            let enrichment = self.enrich(reader, &record.source_url).await;
            apply_enrichment(record, enrichment, &self.layout.affiliate_tag);

            let done = index + 1;
            progress
                .emit(
                    ProgressEvent::new(
                        WorkflowState::EnrichingRecords,
                        format!("Scraping article {done} of {total}"),
                    )
                    .with_fraction(done as f64 / total as f64),
                )
                .await;
        }
    }
}

pub fn apply_enrichment(record: &mut ArticleRecord, enrichment: Enrichment, affiliate_tag: &str) {
    record.affiliate_base_url = affiliate_base_url(&enrichment.affiliate_url);
    record.affiliate_validation = affiliate_validation(&enrichment.affiliate_url, affiliate_tag)
        .to_owned();
    record.affiliate_url = enrichment.affiliate_url;
    record.seo_title = enrichment.seo_title;
    record.description = enrichment.description;
    record.description2 = enrichment.description2;
}

/// `Good` when the link carries both `ascsubtag` and the exact tag, `Issue`
/// otherwise. Empty links are not assessed. A blank tag matches nothing.
pub fn affiliate_validation(affiliate_url: &str, affiliate_tag: &str) -> &'static str {
    if affiliate_url.is_empty() {
        return "";
    }
    let affiliate_tag = affiliate_tag.trim();
    if !affiliate_tag.is_empty()
        && affiliate_url.contains(ASC_SUBTAG_MARKER)
        && affiliate_url.contains(affiliate_tag)
    {
        AFFILIATE_GOOD
    } else {
        AFFILIATE_ISSUE
    }
}

pub fn affiliate_base_url(affiliate_url: &str) -> String {
    let Ok(mut url) = Url::parse(affiliate_url.trim()) else {
        return String::new();
    };
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

fn read_field(document: &Html, locator: &FieldLocator) -> anyhow::Result<String> {
    let selector = Selector::parse(&locator.selector)
        .map_err(|err| anyhow::anyhow!("invalid selector {:?}: {err}", locator.selector))?;
    let Some(element) = document.select(&selector).next() else {
        return Ok(String::new());
    };
    let value = match locator.attr.as_deref() {
        Some(attr) => element.value().attr(attr).unwrap_or_default().trim().to_owned(),
        None => collapse_whitespace(&element.text().collect::<String>()),
    };
    Ok(value)
}
