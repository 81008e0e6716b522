// Infrastructure layer
pub mod file_system;
pub mod node_resolver;
pub mod processors;

pub use file_system::*;
pub use node_resolver::*;
pub use processors::*;
