//! Distributed key generation: membership discovery, dealing and local
//! key-share assembly.

pub mod assembler;
pub mod dealer;
pub mod directory;
pub mod types;

pub use assembler::ShareAssembler;
pub use dealer::{DealOutcome, DealerProtocol};
pub use directory::MemberDirectory;
pub use types::LocalState;
