//! Architecture-specific glue. The core targets x86_64 exclusively (§1
//! Non-goals); the module split mirrors where other architectures would
//! plug in, but only `x86_64` is implemented.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use self::x86_64 as current;
