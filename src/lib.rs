pub mod codec;
pub mod defaults;
pub mod engine;
pub mod manager;
pub mod registry;
pub mod scalar;
pub mod variants;
pub mod wire;
pub mod wrap;

pub use codec::{Codec, CodecError, Obj};
pub use defaults::{describe_defaults, install_defaults};
pub use engine::{Engine, ReadCtx, WriteCtx};
pub use manager::SerializationManager;
pub use registry::{Registration, Registry};
pub use wire::{Sink, Source};
