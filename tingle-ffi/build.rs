// Publishes the C header for tingle-ffi.
//
// With `cbindgen` on PATH the header is regenerated from src/lib.rs and the
// checked-in copy is refreshed. Without it, the checked-in `include/tingle.h`
// is copied to $OUT_DIR so build systems find it in one place either way.

use std::{env, fs, path::Path, path::PathBuf, process::Command};

const HEADER: &str = "tingle.h";

fn cbindgen_available() -> bool {
    Command::new("cbindgen")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn generate(crate_dir: &Path, out: &Path) -> bool {
    Command::new("cbindgen")
        .args(["--crate", "tingle-ffi", "--lang", "C", "--output"])
        .arg(out)
        .current_dir(crate_dir)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/{HEADER}");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("cargo sets OUT_DIR"));
    let checked_in = crate_dir.join("include").join(HEADER);
    let generated = out_dir.join(HEADER);

    if cbindgen_available() && generate(&crate_dir, &generated) {
        let _ = fs::copy(&generated, &checked_in);
        println!("cargo:warning=tingle-ffi: header generated with cbindgen -> {}", generated.display());
        return;
    }

    if let Err(e) = fs::copy(&checked_in, &generated) {
        println!("cargo:warning=tingle-ffi: could not publish {}: {e}", checked_in.display());
    }
}
