pub mod types;
pub mod compiler;
pub mod loader;
pub mod validator;
pub mod resolved;

pub use types::*;
pub use compiler::*;
pub use loader::*;
pub use validator::*;
pub use resolved::*;
