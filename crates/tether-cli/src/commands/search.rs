//! Search command handler

use anyhow::{Context, Result};

use tether_core::{Sdk, SearchOptions};

use super::parse_object;
use crate::output::Output;

/// Pagination flags
#[derive(Debug, Default)]
pub struct Paging {
    pub size: Option<u64>,
    pub from: Option<u64>,
    pub scroll: Option<String>,
    /// Follow the cursor until every hit is fetched
    pub all: bool,
}

/// Search a collection and print the hits
pub async fn run(
    sdk: &Sdk,
    index: &str,
    collection: &str,
    body: Option<&str>,
    paging: Paging,
    output: &Output,
) -> Result<()> {
    let body = parse_object(body)?;
    // Paging with --all needs a strategy; default to from/size
    let from = match (paging.all, paging.scroll.is_some(), paging.from) {
        (true, false, None) => Some(0),
        (_, _, from) => from,
    };
    let size = match (paging.all, paging.size) {
        (true, None) => Some(100),
        (_, size) => size,
    };
    let options = SearchOptions {
        from,
        size,
        scroll: paging.scroll,
        ..SearchOptions::default()
    };

    let mut page = sdk
        .document()
        .search(index, collection, body, options)
        .await
        .context("Search failed")?;
    output.print_documents(&page.hits);

    if paging.all {
        while let Some(next) = page.next().await.context("Failed to fetch the next page")? {
            output.print_documents(&next.hits);
            page = next;
        }
    }

    output.print_search_summary(page.fetched, page.total);
    Ok(())
}
