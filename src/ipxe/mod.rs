//! iPXE binary and script serving (spec §4.B, §4.C).

pub mod images;
pub mod script;

pub use images::{IpxeImage, IpxeImageSet};
pub use script::{render as render_script, ScriptConfig};
