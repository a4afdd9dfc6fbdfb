//! Slide layer: opening containers and sharing them between requests.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideRegistry                │
//! │   (LRU of open slides, singleflight)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   Slide = ContainerIndex + RangeReader  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  SlideSource (LocalSlideSource: *.dpt)  │
//! └─────────────────────────────────────────┘
//! ```

mod reader;
mod registry;
mod source;

pub use reader::{LayerInfo, Slide};
pub use registry::SlideRegistry;
pub use source::{LocalSlideSource, SlideSource, SLIDE_EXTENSION};
