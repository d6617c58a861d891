// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use appcatalog::Config;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Compose file used by most fixtures: one web service and a database
pub const WEB_AND_DB: &str = r#"
services:
  web:
    image: org/demo:1.0.0
    container_name: demo
    environment:
      - TZ=UTC
    ports:
      - "8080:8080"
    volumes:
      - demo_data:/data
      - ./config:/config
    depends_on:
      - db
  db:
    image: postgres:16
    volumes:
      - demo_db:/var/lib/postgresql/data
volumes:
  demo_data: {}
  demo_db: {}
"#;

/// Every platform marked supported
pub const ALL_PLATFORMS: &str = r#"{
    "casaos": {}, "portainer": {}, "runtipi": {}, "dockge": {}, "cosmos": {}, "umbrel": {}
}"#;

/// Temporary catalog with `apps/` input and `out/` output directories.
///
/// Keep the struct alive for the duration of the test; dropping it removes
/// the whole tree.
pub struct Catalog {
    pub temp: TempDir,
}

impl Catalog {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("apps")).unwrap();
        Self { temp }
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.temp.path().join("apps")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    /// Config pointing at this catalog, icons never fetched
    pub fn config(&self) -> Config {
        let mut config = Config {
            apps_dir: self.apps_dir(),
            output_dir: self.output_dir(),
            ..Config::default()
        };
        config.assets.fetch = false;
        config
    }

    /// Write `<apps>/<id>/app.json` and `docker-compose.yml`
    pub fn add_record(&self, id: &str, compatibility: &str, compose: &str) {
        self.add_raw(id, &record_json(id, compatibility, None), compose);
    }

    /// Same as [`Catalog::add_record`] with an explicit icon URL
    pub fn add_record_with_icon(&self, id: &str, compatibility: &str, compose: &str, icon: &str) {
        self.add_raw(id, &record_json(id, compatibility, Some(icon)), compose);
    }

    pub fn add_raw(&self, dir: &str, app_json: &str, compose: &str) {
        let dir = self.apps_dir().join(dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("app.json"), app_json).unwrap();
        std::fs::write(dir.join("docker-compose.yml"), compose).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.output_dir().join(relative)).unwrap()
    }

    pub fn read_yaml(&self, relative: &str) -> serde_yaml::Value {
        serde_yaml::from_str(&self.read(relative)).unwrap()
    }

    pub fn read_json(&self, relative: &str) -> serde_json::Value {
        serde_json::from_str(&self.read(relative)).unwrap()
    }
}

/// A complete record; `icon` defaults to none
pub fn record_json(id: &str, compatibility: &str, icon: Option<&str>) -> String {
    let visual = match icon {
        Some(url) => format!(r#"{{"icon": "{url}"}}"#),
        None => "{}".to_string(),
    };
    format!(
        r#"{{
            "metadata": {{
                "id": "{id}", "name": "{id}", "version": "1.0.0",
                "description": "The {id} app.", "author": "Demo Org",
                "category": "Utilities",
                "created": "2024-01-02T03:04:05Z", "updated": "2024-02-03T04:05:06Z"
            }},
            "visual": {visual},
            "technical": {{
                "architectures": ["amd64", "arm64"],
                "main_image": "org/{id}", "default_port": "8080"
            }},
            "compatibility": {compatibility}
        }}"#
    )
}

/// Relative path -> bytes for every file under `root`
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, std::fs::read(e.path()).unwrap())
        })
        .collect()
}
