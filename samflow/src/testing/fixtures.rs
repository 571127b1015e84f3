//! On-disk fixtures for workflow tests.

use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Lays out a project directory: raw data files, a sample sheet and a
/// mapping directory.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    root: PathBuf,
    rows: Vec<(String, String, Option<String>)>,
    maps: Vec<String>,
}

impl ProjectFixture {
    /// Starts a fixture rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            rows: Vec::new(),
            maps: Vec::new(),
        }
    }

    /// Adds a sample with a raw data file `<key>.h5ad`.
    #[must_use]
    pub fn with_sample(mut self, key: &str, annotation: Option<&str>) -> Self {
        self.rows
            .push((key.to_string(), format!("{key}.h5ad"), annotation.map(ToString::to_string)));
        self
    }

    /// Adds a mapping table `<a>_to_<b>.txt`.
    #[must_use]
    pub fn with_map(mut self, from: &str, to: &str) -> Self {
        self.maps.push(format!("{from}_to_{to}.txt"));
        self
    }

    /// Writes everything and returns the layout.
    pub fn write(&self) -> io::Result<ProjectLayout> {
        let data_dir = self.root.join("data");
        let maps_dir = self.root.join("maps");
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&maps_dir)?;

        let mut sheet = String::from("id2,h5ad,annotation\n");
        for (key, file, annotation) in &self.rows {
            let data_path = data_dir.join(file);
            fs::write(&data_path, format!("raw counts for {key}\n"))?;
            sheet.push_str(&format!(
                "{key},{},{}\n",
                data_path.display(),
                annotation.as_deref().unwrap_or_default()
            ));
        }
        let sheet_path = self.root.join("samples.csv");
        fs::write(&sheet_path, sheet)?;

        for map in &self.maps {
            fs::write(maps_dir.join(map), "gene_a\tgene_b\t1e-30\n")?;
        }

        Ok(ProjectLayout {
            root: self.root.clone(),
            sheet: sheet_path,
            data_dir,
            maps_dir,
        })
    }
}

/// Paths produced by [`ProjectFixture::write`].
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    /// Fixture root.
    pub root: PathBuf,
    /// The sample sheet.
    pub sheet: PathBuf,
    /// Directory of raw data files.
    pub data_dir: PathBuf,
    /// Mapping directory.
    pub maps_dir: PathBuf,
}

impl ProjectLayout {
    /// A subdirectory of the root, not created.
    #[must_use]
    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// A scoring payload with one row and one column per label.
#[must_use]
pub fn mapping_scores_payload(labels: &[&str]) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let values: Vec<f64> = (0..labels.len())
                .map(|j| if i == j { 1.0 } else { 0.25 })
                .collect();
            json!({"label": label, "values": values})
        })
        .collect();
    let table = json!({"columns": labels, "rows": rows});
    json!({"hms": table.clone(), "pms": table})
}

/// Reads a CSV file into rows of fields.
pub fn read_csv_rows(path: &Path) -> io::Result<Vec<Vec<String>>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(|line| line.split(',').map(ToString::to_string).collect())
        .collect())
}
