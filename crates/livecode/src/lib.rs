//! Client for the livecode execution sandbox plus the SVG rendering and
//! caching built on top of it.

pub mod cache;
pub mod classify;
pub mod client;
pub mod error;
pub mod raster;
pub mod record;
pub mod render;
pub mod result;
pub mod sketch;

pub use cache::{DirCache, KeyValueCache, MemoryCache, RenderCache};
pub use classify::{classify, ExceptionDetails};
pub use client::{execute, Executor, LiveCode};
pub use error::LivecodeError;
pub use raster::svg_to_png;
pub use record::{execute_recorded, CodeRun, FileRecorder, Recorder, RunContext};
pub use render::{render_svg, DEFAULT_IMAGE};
pub use result::{ExecutionResult, ExecutionStatus, FailureReason};
pub use sketch::{ImageMode, ImageRequest, Sketch};
