pub mod model;

mod handler;

pub use handler::{login, me, register};
