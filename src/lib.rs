//! PaintCore: raster paint-engine core.
//!
//! Layer compositing with blend modes and non-destructive effects, stroke
//! smoothing, colour math, region selection, transforms, adjustments and
//! filters. Everything works on plain data (`PixelBuffer`, `Mask`, sample
//! points); the host application owns windows, input and file I/O.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod logger;

pub mod canvas;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod ops;
pub mod pixels;
pub mod stroke;
pub mod task;

pub use canvas::{BlendMode, Layer, LayerId, LayerKind, LayerStack, SharedLayerStack};
pub use color::{Color, ColorHarmony, HarmonyType};
pub use compositor::{BrushParams, BrushTip, Compositor};
pub use config::EngineConfig;
pub use error::{CoreError, Result};
pub use geometry::{Affine, Point};
pub use ops::adjustments::{AdjustmentLayer, AdjustmentPipeline};
pub use ops::effects::Effect;
pub use ops::filters::{FilterEngine, FilterKind, FilterSpec};
pub use ops::selection::{Selection, SelectionEngine, SelectionMode};
pub use ops::transform::{TransformParams, TransformSession};
pub use pixels::{Mask, PixelBuffer, Rect};
pub use stroke::{Path, PathSmoother, Stroke, StrokeBuilder, StrokePoint, ToolKind, ToolProfile};
pub use task::{CancelToken, TaskHandle, TaskOutcome, TaskSlot};
