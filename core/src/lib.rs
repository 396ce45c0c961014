pub mod children;
pub mod db;
pub mod error;
pub mod models;
pub mod ordering;
pub mod reconcile;

pub use error::{Error, Result};
