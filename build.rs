pub fn main() {
    // Generate git version info using vergen
    generate_version_info();

    println!("cargo:rerun-if-changed=build.rs");
}

/// Generate version information from git tags using vergen
///
/// The version is derived from `git describe --tags --always --dirty`:
/// - For tagged commits: the tag name (e.g., "v0.1.4")
/// - For commits after a tag: tag + commits + hash (e.g., "v0.1.4-2-ge930185")
/// - For non-git environments vergen emits placeholder values and a warning
///
/// Read at runtime with `option_env!("VERGEN_GIT_DESCRIBE")`.
fn generate_version_info() {
    use vergen_git2::{BuildBuilder, CargoBuilder, Emitter, Git2Builder};

    let build = BuildBuilder::default()
        .build_timestamp(true)
        .build()
        .expect("Failed to configure build info");

    let cargo = CargoBuilder::default()
        .target_triple(true)
        .build()
        .expect("Failed to configure cargo info");

    let git2 = Git2Builder::default()
        .describe(true, true, None) // Enable describe with dirty flag, no pattern match
        .sha(true) // Include commit SHA
        .build()
        .expect("Failed to configure git info");

    Emitter::default()
        .add_instructions(&build)
        .expect("Failed to add build instructions")
        .add_instructions(&cargo)
        .expect("Failed to add cargo instructions")
        .add_instructions(&git2)
        .expect("Failed to add git instructions")
        .emit()
        .expect("Failed to emit version info");
}
