fn main() {
    // opencv's own build script reads LIBCLANG_PATH from the caller's
    // environment; it cannot be set from here.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos")
        && std::env::var_os("CARGO_FEATURE_OPENCV").is_some()
        && std::env::var_os("LIBCLANG_PATH").is_none()
    {
        println!(
            "cargo:warning=LIBCLANG_PATH is unset; if the opencv build fails, export \
             LIBCLANG_PATH=/Library/Developer/CommandLineTools/usr/lib \
             or build with --no-default-features"
        );
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=LIBCLANG_PATH");
}
