use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::{
    error::{Result, ScrapeError},
    text_manipulators::quote_param,
};

/// Sort order requested from the directory site.
pub const SORT_ORDER: &str = "01";

// `<prefix>_<keyword>[_<page>].<ext>`; only the page part varies between fixture files.
static FIXTURE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^_]+)_([^_.]+)(?:_[^.]*)?(\.[^.]*)?$").expect("static regex is valid")
});

/// Result offset of a 1-based page.
pub fn page_offset(page: u32, per_page: u32) -> u32 {
    page.saturating_sub(1) * per_page
}

/// A page holding fewer listings than `per_page` is the last one of its area.
pub fn is_last_page(listed: usize, per_page: u32) -> bool {
    listed < per_page as usize
}

/// URL of the search result page for `area` and `keyword` starting at offset `from`.
///
/// For `file://` bases the base file is the first page and later pages live next to it,
/// named after their offset (`tp_kaigo_00.html`, `tp_kaigo_20.html`, ...).
pub fn search_url(uri: &str, area: &str, keyword: &str, from: u32) -> Result<String> {
    let base = Url::parse(uri).map_err(|_| ScrapeError::UrlInvalid(uri.to_string()))?;
    match base.scheme() {
        "http" | "https" => Ok(format!(
            "{}/keyword?areaword={}&keyword={}&sort={SORT_ORDER}&from={from}",
            uri.trim_end_matches('/'),
            quote_param(area),
            quote_param(keyword),
        )),
        "file" => fixture_page_url(base, from),
        _ => Err(ScrapeError::UrlInvalid(uri.to_string())),
    }
}

fn fixture_page_url(mut base: Url, from: u32) -> Result<String> {
    base.set_query(None);
    if from == 0 {
        return Ok(base.into());
    }

    let original = base.to_string();
    let invalid = || ScrapeError::UrlInvalid(original.clone());
    let file_name = base
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .ok_or_else(invalid)?
        .to_string();
    let caps = FIXTURE_NAME.captures(&file_name).ok_or_else(invalid)?;
    let paged = format!(
        "{}_{}_{:02}{}",
        &caps[1],
        &caps[2],
        from,
        caps.get(3).map_or("", |ext| ext.as_str())
    );

    base.path_segments_mut()
        .map_err(|_| invalid())?
        .pop()
        .push(&paged);
    Ok(base.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_page_size() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(2, 20), 20);
        assert_eq!(page_offset(5, 20), 80);
    }

    #[test]
    fn short_page_is_last() {
        assert!(is_last_page(19, 20));
        assert!(is_last_page(0, 20));
        assert!(!is_last_page(20, 20));
    }

    #[test]
    fn http_url_has_encoded_params_and_offset() {
        let url = search_url("https://directory.example.com/", "新宿区", "介護", 0).unwrap();
        assert_eq!(
            url,
            "https://directory.example.com/keyword?areaword=%E6%96%B0%E5%AE%BF%E5%8C%BA\
             &keyword=%E4%BB%8B%E8%AD%B7&sort=01&from=0"
        );
        assert!(search_url("https://directory.example.com", "a", "b", 40)
            .unwrap()
            .ends_with("&from=40"));
    }

    #[test]
    fn file_base_is_first_page() {
        let url = search_url("file:///opt/html/tp_kaigo_00.html", "新宿区", "介護", 0).unwrap();
        assert_eq!(url, "file:///opt/html/tp_kaigo_00.html");
    }

    #[test]
    fn file_pages_are_named_after_offset() {
        let base = "file:///opt/html/tp_kaigo_00.html";
        assert_eq!(
            search_url(base, "a", "b", 20).unwrap(),
            "file:///opt/html/tp_kaigo_20.html"
        );
        assert_eq!(
            search_url(base, "a", "b", 2).unwrap(),
            "file:///opt/html/tp_kaigo_02.html"
        );
    }

    #[test]
    fn two_part_fixture_name_gains_a_page_suffix() {
        assert_eq!(
            search_url("file:///opt/html/tp_kaigo.html", "a", "b", 20).unwrap(),
            "file:///opt/html/tp_kaigo_20.html"
        );
        assert_eq!(
            search_url("file:///opt/html/tp_kaigo", "a", "b", 20).unwrap(),
            "file:///opt/html/tp_kaigo_20"
        );
    }

    #[test]
    fn unpaginated_fixture_name_is_invalid() {
        let err = search_url("file:///opt/html/index.html", "a", "b", 20).unwrap_err();
        assert!(matches!(err, ScrapeError::UrlInvalid(_)));
    }

    #[test]
    fn unsupported_scheme_is_invalid() {
        assert!(search_url("ftp://example.com", "a", "b", 0).is_err());
        assert!(search_url("not a url", "a", "b", 0).is_err());
    }
}
