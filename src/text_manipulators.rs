use scraper::ElementRef;

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// Percent-encodes a query parameter value.
pub fn quote_param(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
