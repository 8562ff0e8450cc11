use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::{
    error::Result,
    listing::{ItemList, ListingPage},
    text_manipulators::extract_text,
};

static JSON_LD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector is valid")
});

/// Extracts the listing embedded as JSON-LD in a search result page.
///
/// A page without a JSON-LD script has no results and yields `Ok(None)`.
/// A script whose JSON is malformed or lacks a required field is an error.
pub fn parse_listing_page(html: &str) -> Result<Option<ListingPage>> {
    let document = Html::parse_document(html);
    let Some(script) = document.select(&JSON_LD_SELECTOR).next() else {
        return Ok(None);
    };
    let json = extract_text(script);
    let list: ItemList = serde_json::from_str(json.trim())?;
    Ok(Some(ListingPage {
        businesses: list
            .item_list_element
            .into_iter()
            .map(|element| element.item)
            .collect(),
    }))
}
