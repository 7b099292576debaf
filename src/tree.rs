//! Folder tree over the mounted virtual paths

use std::collections::BTreeMap;

use serde::Serialize;

/// One folder of the virtual file system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetFolder {
    pub name: String,
    /// Folder path from the root, without trailing slash
    pub path: String,
    /// Full virtual paths of the files directly inside, sorted
    pub assets: Vec<String>,
    pub folders: BTreeMap<String, AssetFolder>,
}

impl AssetFolder {
    /// Group virtual paths into a tree rooted at an unnamed folder
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = AssetFolder::default();
        for path in paths {
            let path = path.as_ref().trim_start_matches('/');
            if path.is_empty() {
                continue;
            }

            let mut folder = &mut root;
            let mut parts: Vec<&str> = path.split('/').collect();
            parts.pop();
            for part in parts.into_iter().filter(|p| !p.is_empty()) {
                let child_path = if folder.path.is_empty() {
                    part.to_string()
                } else {
                    format!("{}/{}", folder.path, part)
                };
                folder = folder
                    .folders
                    .entry(part.to_string())
                    .or_insert_with(|| AssetFolder {
                        name: part.to_string(),
                        path: child_path,
                        ..Default::default()
                    });
            }
            folder.assets.push(path.to_string());
        }
        root.sort_assets();
        root
    }

    fn sort_assets(&mut self) {
        self.assets.sort();
        self.assets.dedup();
        for folder in self.folders.values_mut() {
            folder.sort_assets();
        }
    }

    /// Look up a folder by path, case-insensitively; `""` is this folder
    pub fn find(&self, path: &str) -> Option<&AssetFolder> {
        let mut folder = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            folder = folder
                .folders
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .map(|(_, child)| child)?;
        }
        Some(folder)
    }

    /// Number of assets in this folder and below
    pub fn asset_count(&self) -> usize {
        self.assets.len()
            + self
                .folders
                .values()
                .map(AssetFolder::asset_count)
                .sum::<usize>()
    }

    /// Assets in walk order: own assets first, then each subfolder depth-first
    pub fn walk(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.asset_count());
        self.walk_into(&mut out);
        out
    }

    fn walk_into<'a>(&'a self, out: &mut Vec<&'a str>) {
        out.extend(self.assets.iter().map(String::as_str));
        for folder in self.folders.values() {
            folder.walk_into(out);
        }
    }
}
