// Links binaries with a 128 MB main stack.
fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();

    let link_arg = match (target_os.as_str(), target_env.as_str()) {
        ("windows", "msvc") => "/STACK:134217728",
        ("windows", "gnu") => "-Wl,--stack,134217728",
        ("linux", _) => "-Wl,-z,stack-size=134217728",
        ("macos", _) => "-Wl,-stack_size,0x8000000",
        _ => return,
    };
    println!("cargo:rustc-link-arg-bins={}", link_arg);
}
