//! Vertex displacement error metric
//!
//! Each bone carries three virtual vertices, one along each local axis at the
//! bone's vertex distance. A lossy pose is measured by pushing those vertices
//! through the exact and the lossy object-space chains and taking the largest
//! displacement over every axis and sample.

use glam::{Affine3A, Vec3};

use crate::math::BoneTransform;

/// Object-space transforms of one bone at every sample
pub(crate) fn compose(
    parent: Option<&[Affine3A]>,
    local: &[BoneTransform],
    additive: bool,
) -> Vec<Affine3A> {
    match parent {
        Some(parent) => local
            .iter()
            .zip(parent)
            .map(|(local, parent)| *parent * local.to_affine(additive))
            .collect(),
        None => local.iter().map(|l| l.to_affine(additive)).collect(),
    }
}

/// Largest virtual vertex displacement between two object-space tracks
pub(crate) fn vertex_error(exact: &[Affine3A], lossy: &[Affine3A], vertex_distance: f32) -> f32 {
    let vertices = [
        Vec3::X * vertex_distance,
        Vec3::Y * vertex_distance,
        Vec3::Z * vertex_distance,
    ];

    exact
        .iter()
        .zip(lossy)
        .flat_map(|(exact, lossy)| {
            vertices.iter().map(move |v| {
                exact
                    .transform_point3(*v)
                    .distance(lossy.transform_point3(*v))
            })
        })
        .fold(0.0, f32::max)
}
