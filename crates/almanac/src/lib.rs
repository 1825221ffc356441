pub mod checkpoint;
pub mod era;
pub mod locator;
pub mod parser;
pub mod pipeline;
pub mod rows;
pub mod scraper;
pub mod sink;
pub mod types;
pub mod utils;

pub use pipeline::{Pipeline, PipelineConfig};
pub use scraper::Fetcher;

pub const BASE_URL: &str = "https://www.baseball-almanac.com";
