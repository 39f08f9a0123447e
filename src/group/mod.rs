mod coordinator;
mod metadata;


pub use coordinator::*;
pub use metadata::*;
