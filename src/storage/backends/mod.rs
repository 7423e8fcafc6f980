mod filesystem;
mod memory;
mod register;

pub use filesystem::FileSystemBackend;
pub use memory::MemoryBackend;
pub use register::BackendConfigs;
