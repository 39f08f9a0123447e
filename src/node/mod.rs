mod builder;
mod node;
mod tasks;


pub use builder::*;
pub use node::*;
pub(crate) use tasks::*;
