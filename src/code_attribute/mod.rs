mod bytecode;
mod types;

pub use self::bytecode::*;
pub use self::types::*;
