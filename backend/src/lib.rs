//! Buy image-generation credits with SOL and spend them on AI images.

pub mod app;
pub mod chain;
pub mod config;
pub mod error;
pub mod flows;
pub mod imagegen;
pub mod ledger;
pub mod model;
pub mod notifier;
pub mod page;

pub use app::{App, AppParts};
