pub mod browser;
pub mod cli;
pub mod config;
pub mod csv_export;
pub mod csv_job;
pub mod directory_scraper;
pub mod error;
pub mod listing;
mod ratelimit;
pub mod requests;
pub mod scraping_context;
pub mod search;
mod text_manipulators;
pub mod user_agent;

pub use csv_job::{CsvJob, JobOptions, JobReport};
pub use directory_scraper::parse_listing_page;
pub use error::ScrapeError;
pub use scraping_context::Engine;
