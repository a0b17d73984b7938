/// The normalized model record and its display transform.
///
/// Layer: **Model record**
/// Parsers hand finished buffers and their `Accumulator` to `Model::new`,
/// which validates everything before a record exists. After that only the
/// title and the display transform (`setup`) change.
use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::geometry::{Accumulator, BoundingBox, Vec3};

/// Edge length of the regular display volume.
pub const DEFAULT_BOUND_SIZE: f32 = 50.0;
/// Edge length of the VR display volume.
pub const VR_BOUND_SIZE: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Stl,
    Obj,
    Ply,
}

impl ModelFormat {
    /// Format named by a filename suffix (case-insensitive), or `None` when
    /// the suffix is not one we read.
    pub fn from_extension(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        [
            (".stl", ModelFormat::Stl),
            (".obj", ModelFormat::Obj),
            (".ply", ModelFormat::Ply),
        ]
        .into_iter()
        .find(|(ext, _)| lower.ends_with(*ext))
        .map(|(_, format)| format)
    }

    /// Pick a format from a filename. Anything unrecognized, or no name at
    /// all, is treated as STL.
    pub fn from_filename(name: Option<&str>) -> Self {
        name.and_then(Self::from_extension).unwrap_or(ModelFormat::Stl)
    }

    /// Fixed rotation (degrees about X, Y, Z) that puts the format's native
    /// up axis on the display's up axis.
    pub fn rotation_degrees(self) -> [f32; 3] {
        match self {
            ModelFormat::Stl => [-90.0, 0.0, 180.0],
            ModelFormat::Obj | ModelFormat::Ply => [0.0, 180.0, 0.0],
        }
    }

    /// Native axis that ends up pointing up after canonicalization.
    pub fn up_axis(self) -> usize {
        match self {
            ModelFormat::Stl => 2,
            ModelFormat::Obj | ModelFormat::Ply => 1,
        }
    }

    pub fn canonicalize(self, bounds: &BoundingBox, center: Vec3, bound_size: f32) -> Canonical {
        let divisor = bound_scale(bounds, bound_size);
        let usable = divisor != 0.0 && divisor.is_finite();
        let scale = if usable { 1.0 / divisor } else { 1.0 };
        let floor_divisor = if usable { divisor } else { 1.0 };
        let axis = self.up_axis();
        Canonical {
            rotation_degrees: self.rotation_degrees(),
            scale,
            translation: Vec3::new(-center.x, -center.y, -center.z),
            floor_offset: (bounds.min.axis(axis) - center.axis(axis)) / floor_divisor,
        }
    }
}

/// Largest ratio of bounding-box extent to `bound_size` over the three axes.
pub fn bound_scale(bounds: &BoundingBox, bound_size: f32) -> f32 {
    let e = bounds.extent();
    (e.x / bound_size).max(e.y / bound_size).max(e.z / bound_size)
}

/// Result of canonicalizing a model for a given display volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canonical {
    pub rotation_degrees: [f32; 3],
    pub scale: f32,
    pub translation: Vec3,
    pub floor_offset: f32,
}

impl Canonical {
    /// `Rx * Ry * Rz * S * T`: a point is centered first, then scaled, then rotated.
    pub fn matrix(&self) -> Mat4 {
        let [rx, ry, rz] = self.rotation_degrees;
        Mat4::from_rotation_x(rx.to_radians())
            * Mat4::from_rotation_y(ry.to_radians())
            * Mat4::from_rotation_z(rz.to_radians())
            * Mat4::from_scale(glam::Vec3::splat(self.scale))
            * Mat4::from_translation(self.translation.into())
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    format: ModelFormat,
    pub title: String,
    vertices: Vec<f32>,
    normals: Option<Vec<f32>>,
    indices: Option<Vec<u32>>,
    bounds: BoundingBox,
    center_mass: Vec3,
    floor_offset: f32,
    model_matrix: Mat4,
}

impl Model {
    /// Validate parsed buffers and build the record. Nothing partially built
    /// escapes: any inconsistency is an `InvalidModel`.
    pub fn new(
        format: ModelFormat,
        vertices: Vec<f32>,
        normals: Option<Vec<f32>>,
        indices: Option<Vec<u32>>,
        acc: Accumulator,
    ) -> ModelResult<Self> {
        if vertices.is_empty() {
            return Err(ModelError::invalid("no vertices"));
        }
        if vertices.len() % 3 != 0 {
            return Err(ModelError::invalid("vertex buffer is not a multiple of 3"));
        }
        if let Some(n) = &normals {
            if n.len() != vertices.len() {
                return Err(ModelError::invalid(format!(
                    "normal buffer length {} does not match vertex buffer length {}",
                    n.len(),
                    vertices.len()
                )));
            }
        }
        let vertex_count = vertices.len() / 3;
        if let Some(idx) = &indices {
            if idx.is_empty() || idx.len() % 3 != 0 {
                return Err(ModelError::invalid("index buffer is empty or not made of triangles"));
            }
            if let Some(&bad) = idx.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(ModelError::invalid(format!(
                    "index {bad} out of range (vertex count = {vertex_count})"
                )));
            }
        }
        let (bounds, center_mass) = acc
            .finish()
            .ok_or_else(|| ModelError::invalid("no vertices accepted"))?;

        let mut model = Self {
            format,
            title: String::new(),
            vertices,
            normals,
            indices,
            bounds,
            center_mass,
            floor_offset: 0.0,
            model_matrix: Mat4::IDENTITY,
        };
        model.setup(DEFAULT_BOUND_SIZE);
        Ok(model)
    }

    /// Recompute the display transform and floor offset for a display volume.
    pub fn setup(&mut self, bound_size: f32) -> Canonical {
        let canonical = self
            .format
            .canonicalize(&self.bounds, self.center_mass, bound_size);
        self.model_matrix = canonical.matrix();
        self.floor_offset = canonical.floor_offset;
        canonical
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn normals(&self) -> Option<&[f32]> {
        self.normals.as_deref()
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn index_count(&self) -> usize {
        self.indices.as_ref().map_or(0, Vec::len)
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn center_mass(&self) -> Vec3 {
        self.center_mass
    }

    pub fn floor_offset(&self) -> f32 {
        self.floor_offset
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            title: self.title.clone(),
            format: self.format,
            vertex_count: self.vertex_count(),
            index_count: self.index_count(),
            has_normals: self.normals.is_some(),
            bounds: self.bounds,
            center_mass: self.center_mass,
            floor_offset: self.floor_offset,
            model_matrix: self.model_matrix.to_cols_array(),
        }
    }
}

/// Everything about a model except its raw buffers (JSON for the front end).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub title: String,
    pub format: ModelFormat,
    pub vertex_count: usize,
    pub index_count: usize,
    pub has_normals: bool,
    pub bounds: BoundingBox,
    pub center_mass: Vec3,
    pub floor_offset: f32,
    /// Column-major 4×4.
    pub model_matrix: [f32; 16],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube_acc(size: f32) -> Accumulator {
        [Vec3::ZERO, Vec3::new(size, size, size)].into_iter().collect()
    }

    #[test]
    fn test_from_filename() {
        assert_eq!(ModelFormat::from_filename(Some("a.STL")), ModelFormat::Stl);
        assert_eq!(ModelFormat::from_filename(Some("dir/b.Obj")), ModelFormat::Obj);
        assert_eq!(ModelFormat::from_filename(Some("c.ply")), ModelFormat::Ply);
        assert_eq!(ModelFormat::from_filename(Some("d.3mf")), ModelFormat::Stl);
        assert_eq!(ModelFormat::from_filename(Some("ply")), ModelFormat::Stl);
        assert_eq!(ModelFormat::from_filename(None), ModelFormat::Stl);
    }

    #[test]
    fn test_from_extension_reports_unknown_suffix() {
        assert_eq!(ModelFormat::from_extension("a.STL"), Some(ModelFormat::Stl));
        assert_eq!(ModelFormat::from_extension("b.Ply"), Some(ModelFormat::Ply));
        assert_eq!(ModelFormat::from_extension("c.3mf"), None);
        assert_eq!(ModelFormat::from_extension("obj"), None);
    }

    #[test]
    fn test_bound_scale_picks_largest_axis() {
        let bounds = BoundingBox {
            min: Vec3::ZERO,
            max: Vec3::new(10.0, 100.0, 20.0),
        };
        assert_relative_eq!(bound_scale(&bounds, 50.0), 2.0);
    }

    #[test]
    fn test_zero_extent_falls_back_to_unit_scale() {
        let p = Vec3::new(3.0, 3.0, 3.0);
        let acc: Accumulator = [p, p, p].into_iter().collect();
        let (bounds, center) = acc.finish().unwrap();
        let c = ModelFormat::Obj.canonicalize(&bounds, center, DEFAULT_BOUND_SIZE);
        assert_eq!(c.scale, 1.0);
        assert_eq!(c.floor_offset, 0.0);
        assert!(c.matrix().is_finite());
    }

    #[test]
    fn test_stl_floor_offset_uses_z() {
        let acc: Accumulator = [Vec3::new(0.0, -40.0, -10.0), Vec3::new(100.0, 40.0, 10.0)]
            .into_iter()
            .collect();
        let (bounds, center) = acc.finish().unwrap();
        let c = ModelFormat::Stl.canonicalize(&bounds, center, 50.0);
        // bound scale = 100 / 50 = 2, so offset = (-10 - 0) / 2
        assert_relative_eq!(c.floor_offset, -5.0);
        assert_relative_eq!(c.scale, 0.5);
    }

    #[test]
    fn test_obj_floor_offset_uses_y() {
        let acc: Accumulator = [Vec3::new(0.0, -40.0, -10.0), Vec3::new(100.0, 40.0, 10.0)]
            .into_iter()
            .collect();
        let (bounds, center) = acc.finish().unwrap();
        let c = ModelFormat::Obj.canonicalize(&bounds, center, 50.0);
        assert_relative_eq!(c.floor_offset, -20.0);
    }

    #[test]
    fn test_matrix_centers_before_scaling() {
        let acc: Accumulator = [Vec3::new(10.0, 10.0, 10.0), Vec3::new(20.0, 20.0, 20.0)]
            .into_iter()
            .collect();
        let (bounds, center) = acc.finish().unwrap();
        let m = ModelFormat::Ply.canonicalize(&bounds, center, 5.0).matrix();
        let origin = m.transform_point3(glam::Vec3::new(15.0, 15.0, 15.0));
        assert_relative_eq!(origin.length(), 0.0, epsilon = 1e-5);
        // corner (20,20,20) → scaled by 0.5, then 180° about Y flips x and z
        let corner = m.transform_point3(glam::Vec3::new(20.0, 20.0, 20.0));
        assert_relative_eq!(corner.x, -2.5, epsilon = 1e-5);
        assert_relative_eq!(corner.y, 2.5, epsilon = 1e-5);
        assert_relative_eq!(corner.z, -2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_stl_rotation_puts_z_up() {
        let acc = cube_acc(2.0);
        let (bounds, _) = acc.finish().unwrap();
        let c = ModelFormat::Stl.canonicalize(&bounds, Vec3::ZERO, 2.0);
        let up = c.matrix().transform_vector3(glam::Vec3::Z);
        assert_relative_eq!(up.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_new_rejects_mismatched_normals() {
        let err = Model::new(
            ModelFormat::Stl,
            vec![0.0; 9],
            Some(vec![0.0; 6]),
            None,
            cube_acc(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidModel(_)));
    }

    #[test]
    fn test_new_rejects_out_of_range_index() {
        let err = Model::new(
            ModelFormat::Obj,
            vec![0.0; 9],
            Some(vec![0.0; 9]),
            Some(vec![0, 1, 3]),
            cube_acc(1.0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_setup_recomputes_for_vr_volume() {
        let mut model = Model::new(
            ModelFormat::Ply,
            vec![0.0, 0.0, 0.0, 10.0, 10.0, 10.0],
            None,
            None,
            cube_acc(10.0),
        )
        .unwrap();
        let regular = model.floor_offset();
        model.setup(VR_BOUND_SIZE);
        // bound scale 10/50 = 0.2 vs 10/5 = 2
        assert_relative_eq!(regular, -25.0);
        assert_relative_eq!(model.floor_offset(), -2.5);
        assert_eq!(model.summary().vertex_count, 2);
    }
}
