//! Skeleton database records and the per-model bone subset.
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{DaeError, DuplicateKind, Result};
use crate::model::Model;

/// Parent number of a bone with no parent.
pub const ROOT_PARENT: i32 = -1;

/// One bone of a race skeleton, stored as a single JSON line in a `.skel` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SkeletonRecord {
    pub bone_name: String,
    pub bone_number: i32,
    pub bone_parent: i32,
    /// Row-major pose matrix.
    pub pose_matrix: [f32; 16],
    /// Row-major inverse of the pose matrix.
    pub inverse_pose_matrix: [f32; 16],
}

impl SkeletonRecord {
    pub fn is_root(&self) -> bool {
        self.bone_parent == ROOT_PARENT
    }

    /// The pose matrix as written to a joint node's `<matrix>`.
    pub fn collada_pose(&self, scale: f32) -> [f32; 16] {
        collada_matrix(&self.pose_matrix, scale)
    }

    /// The inverse pose matrix as written to a skin's bind poses.
    pub fn collada_inverse_pose(&self, scale: f32) -> [f32; 16] {
        collada_matrix(&self.inverse_pose_matrix, scale)
    }
}

/// Transpose a row-major matrix and scale its translation terms.
fn collada_matrix(m: &[f32; 16], scale: f32) -> [f32; 16] {
    let mut values = Mat4::from_cols_array(m).transpose().to_cols_array();
    for w in values.iter_mut().skip(3).step_by(4).take(3) {
        *w *= scale;
    }
    values
}

/// A full race skeleton, viewable by bone name and by bone number.
#[derive(Debug, Clone, Default)]
pub struct SkeletonDatabase {
    /// Label used in error messages, usually the race code.
    pub name: String,
    by_name: HashMap<String, SkeletonRecord>,
    by_number: HashMap<i32, String>,
}

impl SkeletonDatabase {
    /// Read `<skeleton_dir>/<race>.skel` for the model's race code.
    pub fn load_for_model(skeleton_dir: &Path, model: &Model) -> Result<Self> {
        let path = skeleton_dir.join(format!("{}.skel", model.race_code()));
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DaeError::SkeletonNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_json_lines(&name, &text)
    }

    /// Parse one JSON bone record per line. Blank lines are ignored.
    pub fn from_json_lines(name: &str, text: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(line)
                .map_err(|source| DaeError::SkeletonRecord { line: i + 1, source })?;
            records.push(record);
        }
        Self::from_records(name, records)
    }

    pub fn from_records(
        name: &str,
        records: impl IntoIterator<Item = SkeletonRecord>,
    ) -> Result<Self> {
        let mut database = Self {
            name: name.to_string(),
            ..Default::default()
        };
        for record in records {
            if database.by_name.contains_key(&record.bone_name) {
                return Err(DaeError::Duplicate {
                    kind: DuplicateKind::SkeletonBone,
                    key: record.bone_name,
                });
            }
            if database.by_number.contains_key(&record.bone_number) {
                return Err(DaeError::Duplicate {
                    kind: DuplicateKind::SkeletonBone,
                    key: format!("#{} ({})", record.bone_number, record.bone_name),
                });
            }
            database
                .by_number
                .insert(record.bone_number, record.bone_name.clone());
            database.by_name.insert(record.bone_name.clone(), record);
        }
        log::debug!(
            "Loaded skeleton '{}' with {} bones",
            database.name,
            database.by_name.len()
        );
        Ok(database)
    }

    pub fn get(&self, bone_name: &str) -> Option<&SkeletonRecord> {
        self.by_name.get(bone_name)
    }

    pub fn get_by_number(&self, bone_number: i32) -> Option<&SkeletonRecord> {
        self.by_number
            .get(&bone_number)
            .and_then(|name| self.by_name.get(name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// The bones a model needs: every bone it references plus each one's
/// ancestor chain up to the root, each included once.
///
/// Records keep insertion order so the written hierarchy is stable.
#[derive(Debug, Clone, Default)]
pub struct SkeletonSubset {
    records: Vec<SkeletonRecord>,
    by_name: HashMap<String, usize>,
}

impl SkeletonSubset {
    /// Resolve the subset for `bone_list`.
    ///
    /// Fails if any referenced bone or ancestor is missing from the database.
    pub fn resolve(database: &SkeletonDatabase, bone_list: &[String]) -> Result<Self> {
        let mut subset = Self::default();
        for bone_name in bone_list {
            let mut record =
                database
                    .get(bone_name)
                    .ok_or_else(|| DaeError::BoneNotInSkeleton {
                        skeleton: database.name.clone(),
                        bone: bone_name.clone(),
                    })?;
            if !subset.insert(record) {
                continue;
            }
            while !record.is_root() {
                record = database.get_by_number(record.bone_parent).ok_or_else(|| {
                    DaeError::BoneNotInSkeleton {
                        skeleton: database.name.clone(),
                        bone: format!("#{} (parent of {})", record.bone_parent, record.bone_name),
                    }
                })?;
                // A bone already present brought its whole chain with it.
                if !subset.insert(record) {
                    break;
                }
            }
        }
        Ok(subset)
    }

    /// Returns false if the bone was already present.
    fn insert(&mut self, record: &SkeletonRecord) -> bool {
        if self.by_name.contains_key(&record.bone_name) {
            return false;
        }
        self.by_name
            .insert(record.bone_name.clone(), self.records.len());
        self.records.push(record.clone());
        true
    }

    pub fn get(&self, bone_name: &str) -> Option<&SkeletonRecord> {
        self.by_name.get(bone_name).map(|&i| &self.records[i])
    }

    pub fn contains(&self, bone_name: &str) -> bool {
        self.by_name.contains_key(bone_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkeletonRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The first of `candidates` present in the subset.
    pub fn find_root<S: AsRef<str>>(&self, candidates: &[S]) -> Option<&SkeletonRecord> {
        candidates.iter().find_map(|name| self.get(name.as_ref()))
    }
}

/// Child lists for every bone in a [SkeletonSubset], built once.
#[derive(Debug)]
pub struct BoneTree<'a> {
    subset: &'a SkeletonSubset,
    children: HashMap<i32, Vec<usize>>,
}

impl<'a> BoneTree<'a> {
    pub fn new(subset: &'a SkeletonSubset) -> Self {
        let mut children: HashMap<i32, Vec<usize>> = HashMap::new();
        for (i, record) in subset.records.iter().enumerate() {
            if !record.is_root() {
                children.entry(record.bone_parent).or_default().push(i);
            }
        }
        Self { subset, children }
    }

    pub fn children(&self, bone: &SkeletonRecord) -> impl Iterator<Item = &'a SkeletonRecord> + '_ {
        let subset = self.subset;
        self.children
            .get(&bone.bone_number)
            .into_iter()
            .flatten()
            .map(move |&i| &subset.records[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, number: i32, parent: i32) -> SkeletonRecord {
        let mut pose = Mat4::IDENTITY.to_cols_array();
        pose[12] = number as f32;
        SkeletonRecord {
            bone_name: name.to_string(),
            bone_number: number,
            bone_parent: parent,
            pose_matrix: pose,
            inverse_pose_matrix: Mat4::IDENTITY.to_cols_array(),
        }
    }

    // n_root -> j_kosi -> j_sebo_a -> j_sebo_b, plus an unrelated branch.
    fn chain_database() -> SkeletonDatabase {
        SkeletonDatabase::from_records(
            "c0101",
            [
                record("n_root", 0, -1),
                record("j_kosi", 1, 0),
                record("j_sebo_a", 2, 1),
                record("j_sebo_b", 3, 2),
                record("j_asi_a_l", 4, 1),
            ],
        )
        .unwrap()
    }

    fn names(subset: &SkeletonSubset) -> Vec<&str> {
        let mut names: Vec<_> = subset.iter().map(|r| r.bone_name.as_str()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_subset_union_of_root_paths() {
        let database = chain_database();
        let bone_list: Vec<String> = ["n_root", "j_sebo_a", "j_sebo_b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let subset = SkeletonSubset::resolve(&database, &bone_list).unwrap();
        assert_eq!(names(&subset), vec!["j_kosi", "j_sebo_a", "j_sebo_b", "n_root"]);
    }

    #[test]
    fn test_subset_independent_of_order() {
        let database = chain_database();
        let forward: Vec<String> = vec!["n_root".into(), "j_sebo_a".into(), "j_sebo_b".into()];
        let reverse: Vec<String> = forward.iter().rev().cloned().collect();

        let a = SkeletonSubset::resolve(&database, &forward).unwrap();
        let b = SkeletonSubset::resolve(&database, &reverse).unwrap();
        assert_eq!(a.len(), 4);
        assert_eq!(b.len(), 4);
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_subset_missing_bone() {
        let database = chain_database();
        let result = SkeletonSubset::resolve(&database, &["j_kami_a".to_string()]);
        assert!(matches!(
            result,
            Err(DaeError::BoneNotInSkeleton { ref bone, .. }) if bone == "j_kami_a"
        ));
    }

    #[test]
    fn test_subset_missing_parent() {
        let database =
            SkeletonDatabase::from_records("c0101", [record("j_kosi", 1, 0)]).unwrap();
        let result = SkeletonSubset::resolve(&database, &["j_kosi".to_string()]);
        assert!(matches!(result, Err(DaeError::BoneNotInSkeleton { .. })));
    }

    #[test]
    fn test_database_duplicate_bone() {
        let result = SkeletonDatabase::from_records(
            "c0101",
            [record("n_root", 0, -1), record("n_root", 1, -1)],
        );
        assert!(matches!(
            result,
            Err(DaeError::Duplicate {
                kind: DuplicateKind::SkeletonBone,
                ..
            })
        ));
    }

    #[test]
    fn test_database_json_lines() {
        let root = serde_json::to_string(&record("n_root", 0, -1)).unwrap();
        let child = serde_json::to_string(&record("j_kosi", 1, 0)).unwrap();
        let text = format!("{root}\n\n{child}\n");
        let database = SkeletonDatabase::from_json_lines("c0101", &text).unwrap();
        assert_eq!(database.len(), 2);
        assert_eq!(database.get_by_number(1).unwrap().bone_name, "j_kosi");
        assert!(root.contains("\"BoneName\":\"n_root\""));
    }

    #[test]
    fn test_database_bad_line() {
        let result = SkeletonDatabase::from_json_lines("c0101", "{\"BoneName\": 5}");
        assert!(matches!(result, Err(DaeError::SkeletonRecord { line: 1, .. })));
    }

    #[test]
    fn test_database_missing_file() {
        let result = SkeletonDatabase::load(Path::new("does/not/exist/c0101.skel"));
        assert!(matches!(result, Err(DaeError::SkeletonNotFound(_))));
    }

    #[test]
    fn test_bone_tree_children() {
        let database = chain_database();
        let bone_list: Vec<String> = vec!["j_sebo_b".into(), "j_asi_a_l".into()];
        let subset = SkeletonSubset::resolve(&database, &bone_list).unwrap();
        let tree = BoneTree::new(&subset);

        let root = subset.find_root(&["n_root", "j_kao"]).unwrap();
        let kosi: Vec<_> = tree.children(root).map(|r| r.bone_name.as_str()).collect();
        assert_eq!(kosi, vec!["j_kosi"]);

        let kosi = subset.get("j_kosi").unwrap();
        let mut children: Vec<_> = tree.children(kosi).map(|r| r.bone_name.as_str()).collect();
        children.sort();
        assert_eq!(children, vec!["j_asi_a_l", "j_sebo_a"]);
    }

    #[test]
    fn test_find_root_fallback() {
        let database = SkeletonDatabase::from_records(
            "c0101f0001",
            [record("j_kao", 0, -1), record("j_ago", 1, 0)],
        )
        .unwrap();
        let subset = SkeletonSubset::resolve(&database, &["j_ago".to_string()]).unwrap();
        assert_eq!(
            subset.find_root(&["n_root", "j_kao"]).unwrap().bone_name,
            "j_kao"
        );
        assert!(subset.find_root(&["n_root"]).is_none());
    }

    #[test]
    fn test_collada_matrix_transposes_and_scales_translation() {
        // Row-major with translation in the bottom row.
        let mut m = Mat4::IDENTITY.to_cols_array();
        m[12] = 1.0;
        m[13] = 2.0;
        m[14] = 3.0;
        let out = collada_matrix(&m, 10.0);
        assert_eq!(
            out,
            [
                1.0, 0.0, 0.0, 10.0, //
                0.0, 1.0, 0.0, 20.0, //
                0.0, 0.0, 1.0, 30.0, //
                0.0, 0.0, 0.0, 1.0,
            ]
        );
    }
}
