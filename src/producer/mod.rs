mod id_registry;
mod session;

#[cfg(test)]
mod id_registry_test;
#[cfg(test)]
mod session_test;

pub use id_registry::*;
pub use session::*;
