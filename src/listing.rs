use serde::Deserialize;

/// One business entry of a result page's JSON-LD `ItemList`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Business {
    pub name: String,
    pub telephone: String,
    pub address: PostalAddress,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub address_locality: String,
    #[serde(default)]
    pub street_address: Option<String>,
}

impl PostalAddress {
    /// Locality followed directly by the street address, as shown on the site.
    pub fn full(&self) -> String {
        format!(
            "{}{}",
            self.address_locality,
            self.street_address.as_deref().unwrap_or_default()
        )
    }
}

impl Business {
    /// The CSV record for this business, matching [`crate::csv_export::CSV_HEADER`].
    pub fn to_row(&self, keyword: &str, area: &str, scraped_at: &str) -> [String; 7] {
        [
            self.name.clone(),
            self.telephone.clone(),
            self.address.full(),
            self.url.clone(),
            keyword.to_string(),
            area.to_string(),
            scraped_at.to_string(),
        ]
    }
}

/// The businesses listed on one result page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingPage {
    pub businesses: Vec<Business>,
}

impl ListingPage {
    pub fn len(&self) -> usize {
        self.businesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.businesses.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemList {
    pub item_list_element: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListItem {
    pub item: Business,
}
