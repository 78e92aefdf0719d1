pub mod analytics_service;
pub mod holdings_store;
pub mod price_service;
pub mod sync_controller;
pub mod token_search;
