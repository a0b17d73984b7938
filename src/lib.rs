//! ModelView: 3D model ingestion for native and WebAssembly viewers.
//!
//! # Layered Architecture
//!
//! The pipeline is composed of independent, swappable layers:
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Bytes        │ ──▶ │  Format       │ ──▶ │  Accumulate   │ ──▶ │  Model        │
//! │  (stream +    │     │  (STL / OBJ / │     │  (bounds,     │     │  (buffers,    │
//! │   filename)   │     │   PLY)        │     │   center,     │     │   transform)  │
//! │               │     │  🧀 hole:     │     │   normals)    │     │  🧀 hole:     │
//! │               │     │  add 3MF, …   │     │               │     │  add LOD, …   │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Each layer is a module boundary. Add new formats by producing a `Model`
//! from a stream, without touching existing parsers.

pub mod binary;
pub mod error;
pub mod geometry;
pub mod model;
pub mod obj;
pub mod ply;
pub mod stl;
pub mod text;

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wasm_bindgen::prelude::*;

pub use error::{ModelError, ModelResult};
pub use model::{Model, ModelFormat, ModelSummary, DEFAULT_BOUND_SIZE, VR_BOUND_SIZE};

/// Buffer size for stream readers.
pub const INPUT_BUFFER_SIZE: usize = 0x10000;

// ── Viewer configuration (JSON from JS) ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_bound_size")]
    pub bound_size: f32,
    #[serde(default = "default_vr_bound_size")]
    pub vr_bound_size: f32,
    #[serde(default)]
    pub vr: bool,
}

fn default_bound_size() -> f32 {
    DEFAULT_BOUND_SIZE
}
fn default_vr_bound_size() -> f32 {
    VR_BOUND_SIZE
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            bound_size: default_bound_size(),
            vr_bound_size: default_vr_bound_size(),
            vr: false,
        }
    }
}

impl ViewerConfig {
    /// Edge length of the display volume currently in use.
    pub fn active_bound_size(&self) -> f32 {
        if self.vr {
            self.vr_bound_size
        } else {
            self.bound_size
        }
    }
}

// ── Format dispatch ──────────────────────────────────────────────────

/// Parse a model from a stream, choosing the parser by filename suffix.
///
/// The model's title is set to the file name part of `filename`.
pub fn load<R: Read + Seek>(reader: &mut R, filename: Option<&str>) -> ModelResult<Model> {
    let format = match filename {
        Some(name) => ModelFormat::from_extension(name).unwrap_or_else(|| {
            warn!("unrecognized extension on '{name}', reading as STL");
            ModelFormat::Stl
        }),
        None => ModelFormat::Stl,
    };
    info!("loading {:?} model {:?}", format, filename.unwrap_or("<unnamed>"));

    let mut model = match format {
        ModelFormat::Stl => stl::parse_stl(reader)?,
        ModelFormat::Obj => obj::parse_obj(reader)?,
        ModelFormat::Ply => ply::parse_ply(reader)?,
    };
    if let Some(name) = filename {
        model.title = display_name(name).to_string();
    }
    info!(
        "loaded model: {} vertices, {} indices",
        model.vertex_count(),
        model.index_count()
    );
    Ok(model)
}

/// Parse a model held entirely in memory.
pub fn load_bytes(data: &[u8], filename: Option<&str>) -> ModelResult<Model> {
    load(&mut Cursor::new(data), filename)
}

/// Open and parse a model file; the file name picks the format.
pub fn load_path(path: &Path) -> ModelResult<Model> {
    let mut file = File::open(path)
        .map_err(|e| ModelError::invalid(format!("cannot open {}: {e}", path.display())))?;
    let name = path.file_name().and_then(|n| n.to_str());
    load(&mut file, name)
}

fn display_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

// ── WASM entry points ────────────────────────────────────────────────

/// Parse a model and return its summary (bounds, center, transform) as JSON.
#[wasm_bindgen]
pub fn load_model_summary(
    data: &[u8],
    filename: Option<String>,
    config_json: &str,
) -> Result<String, JsValue> {
    let config: ViewerConfig =
        serde_json::from_str(config_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let summary = summarize(data, filename.as_deref(), &config)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_json::to_string(&summary).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn summarize(data: &[u8], filename: Option<&str>, config: &ViewerConfig) -> ModelResult<ModelSummary> {
    let mut model = load_bytes(data, filename)?;
    model.setup(config.active_bound_size());
    Ok(model.summary())
}

/// A parsed model held on the Rust side; buffers are copied out on request.
#[wasm_bindgen]
pub struct WasmModel {
    inner: Model,
}

#[wasm_bindgen]
impl WasmModel {
    #[wasm_bindgen(constructor)]
    pub fn new(data: &[u8], filename: Option<String>) -> Result<WasmModel, JsValue> {
        let inner =
            load_bytes(data, filename.as_deref()).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(WasmModel { inner })
    }

    pub fn vertices(&self) -> js_sys::Float32Array {
        js_sys::Float32Array::from(self.inner.vertices())
    }

    pub fn normals(&self) -> Option<js_sys::Float32Array> {
        self.inner.normals().map(js_sys::Float32Array::from)
    }

    pub fn indices(&self) -> Option<js_sys::Uint32Array> {
        self.inner.indices().map(js_sys::Uint32Array::from)
    }

    #[wasm_bindgen(js_name = vertexCount)]
    pub fn vertex_count(&self) -> usize {
        self.inner.vertex_count()
    }

    #[wasm_bindgen(js_name = indexCount)]
    pub fn index_count(&self) -> usize {
        self.inner.index_count()
    }

    /// Recompute the transform for a display volume (e.g. when entering VR).
    pub fn setup(&mut self, bound_size: f32) {
        self.inner.setup(bound_size);
    }

    /// Column-major 4×4 model matrix.
    #[wasm_bindgen(js_name = modelMatrix)]
    pub fn model_matrix(&self) -> js_sys::Float32Array {
        js_sys::Float32Array::from(&self.inner.model_matrix().to_cols_array()[..])
    }

    #[wasm_bindgen(js_name = floorOffset)]
    pub fn floor_offset(&self) -> f32 {
        self.inner.floor_offset()
    }

    #[wasm_bindgen(getter)]
    pub fn title(&self) -> String {
        self.inner.title.clone()
    }

    #[wasm_bindgen(setter)]
    pub fn set_title(&mut self, title: String) {
        self.inner.title = title;
    }

    pub fn summary(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.summary()).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
