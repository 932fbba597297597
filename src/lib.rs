pub mod anim;
pub mod asset;
pub mod audio;
pub mod backlog;
pub mod cursor;
pub mod effect;
pub mod game;
pub mod gfx;
pub mod host;
pub mod ini;
pub mod input;
pub mod isaku;
pub mod memory;
pub mod menu;
pub mod opcodes;
pub mod savedata;
pub mod sys;
pub mod text;
pub mod util;
pub mod vm;
pub mod yuno;

use thiserror::Error;

pub use game::Game;
pub use ini::Config;
pub use memory::Memory;
pub use vm::Vm;

/// Fatal interpreter conditions. Anything recoverable is logged as a
/// warning at the call site instead and never propagates.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("tried to pop from empty stack")]
    StackUnderflow,
    #[error("stack pointer is non-zero at end of expression")]
    StackNotEmpty,
    #[error("out-of-bounds memory access: {offset:#x} (+{len:#x})")]
    OutOfBounds { offset: u32, len: u32 },
    #[error("failed to load MES file \"{0}\"")]
    MesLoad(String),
    #[error("call stack overflow")]
    CallStackOverflow,
    #[error("invalid procedure number: {0}")]
    BadProcedure(u32),
    #[error("procedure {0} not defined")]
    UndefinedProcedure(u32),
    #[error("too many parameters")]
    TooManyParams,
    #[error("too few parameters")]
    TooFewParams,
    #[error("expected string parameter")]
    ExpectedString,
    #[error("expected expression parameter")]
    ExpectedExpression,
    #[error("string parameter overflowed buffer")]
    StringParamOverflow,
    #[error("tried to farcall to invalid address {0:#x}")]
    BadFarcall(u32),
    #[error("invalid save number: {0}")]
    BadSaveNumber(u32),
    #[error("invalid surface number: {0}")]
    BadSurface(u32),
    #[error("invalid animation stream index: {0}")]
    BadAnimStream(u32),
    #[error("invalid bpp for {0}")]
    BadBpp(&'static str),
    #[error("invalid mask pointer")]
    BadMaskPointer,
    #[error("quit requested")]
    Quit,
    #[error("{0}")]
    User(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VmError>;
