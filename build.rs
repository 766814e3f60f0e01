use std::env;
use std::path::PathBuf;

fn main() {
    // Only regenerate the header when the FFI source changes.
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => return,
    };
    let output_file = crate_dir.join("include").join("docket.h");

    // A missing header must not break library builds, so failures are
    // reported as warnings.
    if let Err(e) = std::fs::create_dir_all(crate_dir.join("include")) {
        println!("cargo:warning=could not create include/: {e}");
        return;
    }

    let config = match cbindgen::Config::from_file(crate_dir.join("cbindgen.toml")) {
        Ok(config) => config,
        Err(e) => {
            println!("cargo:warning=could not read cbindgen.toml: {e}");
            return;
        }
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(&output_file);
            println!("cargo:warning=C header written to {}", output_file.display());
        }
        Err(e) => println!("cargo:warning=cbindgen failed to generate bindings: {e}"),
    }
}
