//! Temporary source trees for reconciliation runs
//!
//! A `Workspace` owns a temp directory with an `items/` folder and an
//! optional aggregate document, plus the `Config` pointing at them.

use depweave::Config;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Source files and configuration for one test scenario
#[derive(Debug)]
pub struct Workspace {
    _dir: TempDir,
    items: PathBuf,
    root: PathBuf,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().to_path_buf();
        let items = root.join("items");
        fs::create_dir(&items).expect("create items dir");
        let config = Config {
            repository: Some("owner/app".into()),
            items_dir: Some(items.clone()),
            ..Config::default()
        };
        Self {
            _dir: dir,
            items,
            root,
            config,
        }
    }

    /// Write one item source file.
    pub fn item(&mut self, file: &str, text: &str) -> &mut Self {
        fs::write(self.items.join(file), text).expect("write item source");
        self
    }

    /// Write the aggregate document and point the config at it.
    pub fn aggregate(&mut self, text: &str) -> &mut Self {
        let path = self.root.join("ROADMAP.md");
        fs::write(&path, text).expect("write aggregate");
        self.config.aggregate = Some(path);
        self
    }

    pub fn dry_run(&mut self) -> &mut Self {
        self.config.dry_run = true;
        self
    }
}

/// Markdown for an item with optional Dependencies and Related bullets.
pub fn item_source(title: &str, depends_on: &[&str], related: &[&str]) -> String {
    let mut text = format!("# {}\n\nSome description.\n", title);
    if !depends_on.is_empty() {
        text.push_str("\n## Dependencies\n\n");
        for line in depends_on {
            text.push_str(&format!("- {}\n", line));
        }
    }
    if !related.is_empty() {
        text.push_str("\n## Related\n\n");
        for line in related {
            text.push_str(&format!("- {}\n", line));
        }
    }
    text
}
