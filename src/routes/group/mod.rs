pub mod model;
pub mod workflow;

mod handler;

pub use handler::{create_group, delete_group, show_group, update_group};
