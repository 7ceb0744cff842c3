pub mod portfolio;
pub mod proxy;
pub mod reports;

use axum::http::{header, HeaderName};

pub const CACHE_ESG: &str = "public, max-age=3600, s-maxage=3600, stale-while-revalidate=86400";
pub const CACHE_LISTS: &str = "public, max-age=1800, s-maxage=1800, stale-while-revalidate=43200";
pub const CACHE_LOGO: &str = "public, max-age=86400, s-maxage=86400, stale-while-revalidate=604800";

pub fn cache_control(value: &'static str) -> [(HeaderName, &'static str); 1] {
    [(header::CACHE_CONTROL, value)]
}
