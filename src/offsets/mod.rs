mod manager;
mod record;


pub use manager::*;
pub use record::*;
