//! Packs `fs-root/` into `$OUT_DIR/fs-root.tar` for the `ivm-boot` image.

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=fs-root");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let tar_path = out_dir.join("fs-root.tar");
    let file = File::create(&tar_path).expect("create fs-root.tar");

    let mut builder = tar::Builder::new(file);
    // Reproducible image: no mtimes, uids or host permissions
    builder.mode(tar::HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    let root = Path::new("fs-root");
    if root.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(root)
            .expect("read fs-root")
            .map(|entry| entry.expect("read fs-root entry").path())
            .collect();
        entries.sort();

        for path in entries {
            let name = path.strip_prefix(root).expect("entry under fs-root");
            if path.is_dir() {
                builder
                    .append_dir_all(name, &path)
                    .expect("pack directory into archive");
            } else {
                builder
                    .append_path_with_name(&path, name)
                    .expect("pack file into archive");
            }
        }
    } else {
        println!("cargo:warning=fs-root/ missing; embedding an empty archive");
    }

    builder.finish().expect("finish fs-root.tar");
}
