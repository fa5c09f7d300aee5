use serde::{Deserialize, Serialize};

pub const AFFILIATE_GOOD: &str = "Good";
pub const AFFILIATE_ISSUE: &str = "Issue, Please fix";

/// One catalog entry, keyed by `id` across the catalog scan, the report scan
/// and the backend augmentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleRecord {
    pub id: u64,
    #[serde(rename = "articleURL")]
    pub source_url: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "postDate")]
    pub post_date: String,
    #[serde(rename = "lastEdited")]
    pub last_edited: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "isEditorial")]
    pub is_editorial: String,
    #[serde(rename = "wordCount")]
    pub word_count: String,
    #[serde(rename = "image")]
    pub thumbnail_url: String,

    #[serde(rename = "amazonURL")]
    pub affiliate_url: String,
    #[serde(rename = "amazonBasicURL")]
    pub affiliate_base_url: String,
    #[serde(rename = "amazonValidation")]
    pub affiliate_validation: String,
    #[serde(rename = "seoTitle")]
    pub seo_title: String,
    pub description: String,
    pub description2: String,

    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "pageCount")]
    pub page_count: u64,
}

/// A row of the ad-creative report. Lives only for one reconcile run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryTableRow {
    pub id: u64,
    pub post: String,
    #[serde(rename = "creativeCount")]
    pub creative_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateLink {
    pub id: u64,
    #[serde(rename = "amazonURL")]
    pub amazon_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    #[serde(rename = "amazonURLs")]
    pub amazon_urls: Vec<AffiliateLink>,
    #[serde(rename = "currentTimestamp")]
    pub current_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCountResult {
    pub id: u64,
    #[serde(rename = "pageCount")]
    pub page_count: u64,
}
