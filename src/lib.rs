pub mod app;
pub mod batch;
pub mod config;
pub mod database;
pub mod fanout;
pub mod logging;
pub mod model;
pub mod pagination;
pub mod statistics;
pub mod store;
pub mod util;

pub use app::App;

#[cfg(test)]
pub(crate) mod test_utils;
