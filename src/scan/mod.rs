//! Face and text scan sessions built on the shared session controller.

mod face;
mod resolver;
mod text;

pub use face::FaceScanSession;
pub use text::TextScanSession;

pub(crate) use resolver::Resolver;
