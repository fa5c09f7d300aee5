use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cli::LayoutInitArgs;

/// Locators for the pages the pipeline drives. Every field has a default so a
/// layout file only needs to list what differs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub catalog: CatalogLayout,
    pub detail: DetailLayout,
    pub report: ReportLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogLayout {
    pub table: String,
    pub page_size_control: String,
    pub next_page_control: String,
    pub columns: CatalogColumns,
    pub labels: DetailLabels,
}

impl Default for CatalogLayout {
    fn default() -> Self {
        Self {
            table: "table#articles".to_owned(),
            page_size_control: "select[name=\"per_page\"]".to_owned(),
            next_page_control: "a[rel=\"next\"]".to_owned(),
            columns: CatalogColumns::default(),
            labels: DetailLabels::default(),
        }
    }
}

/// Cell index per catalog field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogColumns {
    pub id: usize,
    pub title: usize,
    pub author: usize,
    pub post_date: usize,
    pub last_edited: usize,
    pub details: usize,
    pub thumbnail: usize,
}

impl Default for CatalogColumns {
    fn default() -> Self {
        Self {
            id: 0,
            title: 1,
            author: 2,
            post_date: 3,
            last_edited: 4,
            details: 5,
            thumbnail: 6,
        }
    }
}

/// Labels of the `Label: value` segments inside the details cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailLabels {
    pub content_type: String,
    pub is_editorial: String,
    pub word_count: String,
}

impl Default for DetailLabels {
    fn default() -> Self {
        Self {
            content_type: "Content Type".to_owned(),
            is_editorial: "Editorial".to_owned(),
            word_count: "Word Count".to_owned(),
        }
    }
}

/// Element text when `attr` is unset, otherwise the attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLocator {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

impl FieldLocator {
    pub fn attr(selector: &str, attr: &str) -> Self {
        Self {
            selector: selector.to_owned(),
            attr: Some(attr.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailLayout {
    pub affiliate_link: FieldLocator,
    pub seo_title: FieldLocator,
    pub description: FieldLocator,
    pub description2: FieldLocator,
    /// Exact tracking tag a valid affiliate link must carry next to `ascsubtag`.
    pub affiliate_tag: String,
}

impl Default for DetailLayout {
    fn default() -> Self {
        Self {
            affiliate_link: FieldLocator::attr("a[href*=\"amazon.\"]", "href"),
            seo_title: FieldLocator::attr("meta[property=\"og:title\"]", "content"),
            description: FieldLocator::attr("meta[name=\"description\"]", "content"),
            description2: FieldLocator::attr("meta[property=\"og:description\"]", "content"),
            affiliate_tag: "tag=catalogscout-20".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportLayout {
    /// Navigation anchor that proves the report page is the right one.
    pub anchor: String,
    pub export_control: String,
    pub table: String,
    pub columns: ReportColumns,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            anchor: "a#ad-creative-report".to_owned(),
            export_control: "a#export-report".to_owned(),
            table: "table#report".to_owned(),
            columns: ReportColumns::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportColumns {
    pub id: usize,
    pub post: usize,
    pub creative_count: usize,
}

impl Default for ReportColumns {
    fn default() -> Self {
        Self {
            id: 0,
            post: 1,
            creative_count: 2,
        }
    }
}

pub fn load(path: Option<&Path>) -> anyhow::Result<Layout> {
    let Some(path) = path else {
        return Ok(Layout::default());
    };
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("read layout: {}", path.display()))?;
    serde_yaml::from_str(&yaml).with_context(|| format!("parse layout: {}", path.display()))
}

pub fn init(args: LayoutInitArgs) -> anyhow::Result<()> {
    let out = Path::new(&args.out);
    if out.exists() && !args.force {
        anyhow::bail!(
            "layout file already exists (use --force): {}",
            out.display()
        );
    }
    let yaml = serde_yaml::to_string(&Layout::default()).context("serialize layout")?;
    std::fs::write(out, yaml).with_context(|| format!("write layout: {}", out.display()))?;
    Ok(())
}
