//! The narrow capability set the pipeline needs from whatever drives the
//! target pages. The pipeline only talks to these traits; `portal` provides
//! the HTTP implementation.

use async_trait::async_trait;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCell {
    /// All text of the cell, whitespace-collapsed and trimmed.
    pub text: String,
    /// Each non-empty text node of the cell, trimmed, in document order.
    pub segments: Vec<String>,
    pub links: Vec<String>,
    pub images: Vec<String>,
}

impl TableCell {
    pub fn from_text(text: &str) -> Self {
        let segments = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();
        Self {
            text: collapse_whitespace(text),
            segments,
            links: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn with_link(mut self, href: &str) -> Self {
        self.links.push(href.to_owned());
        self
    }

    pub fn with_image(mut self, src: &str) -> Self {
        self.images.push(src.to_owned());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

impl TableRow {
    pub fn new(cells: Vec<TableCell>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, index: usize) -> Option<&TableCell> {
        self.cells.get(index)
    }
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
pub trait ContentReader: Send + Sync {
    /// Rows of the first table matching `locator` in the current document.
    /// `None` when no such table is present.
    async fn read_rows(&self, locator: &str) -> anyhow::Result<Option<Vec<TableRow>>>;

    /// Fetch a document by address and return its body. Non-2xx is an error.
    async fn read_page(&self, address: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait PageControls: Send + Sync {
    async fn open(&self, address: &str) -> anyhow::Result<()>;

    /// Select the largest option of the page-size control. `false` when the
    /// control is absent.
    async fn maximize_page_size(&self, locator: &str) -> anyhow::Result<bool>;

    /// Follow the pagination control. `false` when there is no next page.
    async fn next_page(&self, locator: &str) -> anyhow::Result<bool>;

    async fn has_element(&self, locator: &str) -> anyhow::Result<bool>;

    /// Trigger the control at `locator` without leaving the current page.
    /// `false` when the control is absent.
    async fn activate(&self, locator: &str) -> anyhow::Result<bool>;

    /// Re-read the current page.
    async fn reload(&self) -> anyhow::Result<()>;
}

pub trait PageSession: ContentReader + PageControls {}

impl<T: ContentReader + PageControls> PageSession for T {}
