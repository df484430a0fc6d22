pub mod batch;
pub mod config;
pub mod crop;
pub mod error;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod paste;
pub mod pdf;
pub mod preview;
pub mod region;
pub mod session;

#[cfg(feature = "desktop")]
mod desktop;

pub use error::{AnnotatorError, Result};
pub use filter::{apply_filter, Comparison, FilterSettings};
pub use loader::open_image;
pub use region::{Region, RegionManifest};
pub use session::{EditorSession, Mode};

#[cfg(feature = "desktop")]
pub use desktop::run;
