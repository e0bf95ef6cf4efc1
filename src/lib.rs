pub mod compositor;
pub mod crt;
pub mod encoding;
pub mod engine;
pub mod frame;
pub mod glyphs;
pub mod layout;
pub mod manifest;
pub mod noise;
#[cfg(feature = "play")]
pub mod play;
pub mod schema;
pub mod text;
pub mod timeline;
