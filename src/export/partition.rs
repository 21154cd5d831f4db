//! Per-part vertex ranges derived from index contiguity.
//!
//! The binary format stores no vertex count per mesh part. Each part owns the
//! vertices following the previous part's block, and the block size is the
//! number of distinct indices above the block start plus the start itself.
use std::collections::HashSet;
use std::ops::Range;

use crate::error::{DaeError, Result};
use crate::model::Mesh;

/// The slice of a mesh owned by one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartBlock {
    /// Position of the part in [Mesh::parts].
    pub part: usize,
    pub index_range: Range<usize>,
    pub vertex_range: Range<usize>,
    /// The part's indices relative to `vertex_range.start`.
    pub indices: Vec<u32>,
}

impl PartBlock {
    pub fn vertex_count(&self) -> usize {
        self.vertex_range.len()
    }

    /// The suffix used in element ids, empty for the first part.
    pub fn id_suffix(&self) -> String {
        part_suffix(self.part)
    }
}

pub fn part_suffix(part: usize) -> String {
    if part == 0 {
        String::new()
    } else {
        format!(".{part}")
    }
}

/// Split a mesh's buffers into its parts' blocks.
///
/// Parts with no indices own no vertices and are left out.
pub fn partition_mesh(mesh_index: usize, mesh: &Mesh) -> Result<Vec<PartBlock>> {
    let indices = &mesh.vertex_data.indices;
    let vertex_total = mesh.vertex_data.positions.len();

    let mut blocks = Vec::with_capacity(mesh.parts.len());
    let mut prev_index_count = 0usize;
    let mut total_vertices = 0usize;

    for (part, mesh_part) in mesh.parts.iter().enumerate() {
        let index_count = mesh_part.index_count;
        if index_count == 0 {
            continue;
        }

        let layout_error = |reason: String| DaeError::InvalidLayout {
            mesh: mesh_index,
            part,
            reason,
        };

        let index_range = prev_index_count..prev_index_count + index_count;
        let part_indices = indices.get(index_range.clone()).ok_or_else(|| {
            layout_error(format!(
                "index range {index_range:?} exceeds the {} indices of the mesh",
                indices.len()
            ))
        })?;

        let distinct: HashSet<u32> = part_indices
            .iter()
            .copied()
            .filter(|&i| i as usize > total_vertices)
            .collect();
        let vertex_count = distinct.len() + 1;
        let vertex_range = total_vertices..total_vertices + vertex_count;

        if vertex_range.end > vertex_total {
            return Err(layout_error(format!(
                "vertex range {vertex_range:?} exceeds the {vertex_total} vertices of the mesh"
            )));
        }

        let normalized = part_indices
            .iter()
            .map(|&index| {
                let local = index as i64 - total_vertices as i64;
                if local < 0 || local >= vertex_count as i64 {
                    Err(layout_error(format!(
                        "index {index} falls outside vertex block {vertex_range:?}"
                    )))
                } else {
                    Ok(local as u32)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "Mesh {mesh_index} part {part}: indices {index_range:?}, vertices {vertex_range:?}"
        );

        prev_index_count += index_count;
        total_vertices += vertex_count;

        blocks.push(PartBlock {
            part,
            index_range,
            vertex_range,
            indices: normalized,
        });
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MeshPart, VertexData};
    use glam::Vec3;
    use pretty_assertions::assert_eq;

    fn mesh(vertex_count: usize, indices: Vec<u32>, part_counts: &[usize]) -> Mesh {
        Mesh {
            vertex_data: VertexData {
                positions: vec![Vec3::ZERO; vertex_count],
                indices,
                ..Default::default()
            },
            parts: part_counts
                .iter()
                .map(|&index_count| MeshPart { index_count })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_part() {
        let mesh = mesh(4, vec![0, 1, 2, 2, 1, 3], &[6]);
        let blocks = partition_mesh(0, &mesh).unwrap();
        assert_eq!(
            blocks,
            vec![PartBlock {
                part: 0,
                index_range: 0..6,
                vertex_range: 0..4,
                indices: vec![0, 1, 2, 2, 1, 3],
            }]
        );
    }

    #[test]
    fn test_parts_are_contiguous() {
        // Part 0 uses vertices 0..4, part 1 uses 4..7, part 2 uses 7..10.
        let mesh = mesh(
            10,
            vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 7, 8, 9, 9, 8, 7],
            &[6, 3, 6],
        );
        let blocks = partition_mesh(0, &mesh).unwrap();
        let ranges: Vec<_> = blocks.iter().map(|b| b.vertex_range.clone()).collect();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
        assert_eq!(blocks[1].indices, vec![0, 1, 2]);
        assert_eq!(blocks[2].indices, vec![0, 1, 2, 2, 1, 0]);

        let total: usize = blocks.iter().map(PartBlock::vertex_count).sum();
        assert_eq!(total, mesh.vertex_data.positions.len());
    }

    #[test]
    fn test_empty_part_is_skipped() {
        let mesh = mesh(6, vec![0, 1, 2, 3, 4, 5], &[3, 0, 3]);
        let blocks = partition_mesh(0, &mesh).unwrap();
        let parts: Vec<_> = blocks.iter().map(|b| b.part).collect();
        assert_eq!(parts, vec![0, 2]);
        assert_eq!(blocks[1].index_range, 3..6);
        assert_eq!(blocks[1].vertex_range, 3..6);
        assert_eq!(blocks[1].id_suffix(), ".2");
        assert_eq!(blocks[0].id_suffix(), "");
    }

    #[test]
    fn test_index_before_block_is_rejected() {
        // Part 1 reuses vertex 0 from part 0.
        let mesh = mesh(6, vec![0, 1, 2, 3, 4, 0], &[3, 3]);
        let result = partition_mesh(2, &mesh);
        assert!(matches!(
            result,
            Err(DaeError::InvalidLayout { mesh: 2, part: 1, .. })
        ));
    }

    #[test]
    fn test_index_range_past_buffer() {
        let mesh = mesh(3, vec![0, 1, 2], &[6]);
        assert!(matches!(
            partition_mesh(0, &mesh),
            Err(DaeError::InvalidLayout { part: 0, .. })
        ));
    }

    #[test]
    fn test_vertex_range_past_buffer() {
        let mesh = mesh(2, vec![0, 1, 2], &[3]);
        assert!(matches!(
            partition_mesh(0, &mesh),
            Err(DaeError::InvalidLayout { .. })
        ));
    }
}
