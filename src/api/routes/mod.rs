//! API Routes
//!
//! Route handlers organized by functionality.

pub mod add;
pub mod health;
pub mod query;

/// GET /
pub async fn banner() -> &'static str {
    "insightful event analytics"
}
