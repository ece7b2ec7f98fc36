#![allow(dead_code)]

use engine_core::store::StoreLocation;
use engine_runtime::executor::Executor;
use serde_json::{Value, json};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

pub async fn row_count(executor: &Executor, location: &StoreLocation, table: &str) -> u64 {
    executor
        .stores()
        .structures(location, table)
        .await
        .expect("open store")
        .count()
        .await
        .expect("count rows")
}

pub async fn stored_version(
    executor: &Executor,
    location: &StoreLocation,
    dataset: &str,
) -> Option<String> {
    executor
        .stores()
        .versions(location)
        .await
        .expect("open version store")
        .get(dataset)
        .await
        .expect("read version")
}

/// Writes one JSON document per line into `dir/name`.
pub fn write_jsonl(dir: &Path, name: &str, docs: &[Value]) -> PathBuf {
    fs::create_dir_all(dir).expect("create data dir");
    let path = dir.join(name);
    let mut file = File::create(&path).expect("create jsonl file");
    for doc in docs {
        writeln!(file, "{doc}").expect("write line");
    }
    path
}

/// Raw structure document; `elements` is left out entirely when empty.
pub fn material(id: &str, elements: &[&str], modified: &str) -> Value {
    let mut attributes = json!({ "band_gap": 1.2, "last_modified": modified });
    if !elements.is_empty() {
        attributes["elements"] = json!(elements);
    }
    json!({ "id": id, "type": "structures", "attributes": attributes })
}
