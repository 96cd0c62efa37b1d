// Build script compiling the viewer's GLSL shaders to SPIR-V
//
// Output lands in `<workspace>/target/shaders/<name>.<stage>.spv`, one of the
// locations `ShaderConfig` searches. Without glslc the viewer still runs and
// renders clear-only frames, so a missing compiler is only a warning.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 2] = ["vert", "frag"];

fn find_glslc() -> Option<PathBuf> {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let bin = if cfg!(target_os = "windows") { "Bin/glslc.exe" } else { "bin/glslc" };
        let path = Path::new(&sdk).join(bin);
        if path.exists() {
            return Some(path);
        }
    }

    // Fall back to whatever is on PATH
    Command::new("glslc")
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|_| PathBuf::from("glslc"))
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn compile(glslc: &Path, source: &Path, output: &Path) -> Result<(), String> {
    let status = Command::new(glslc)
        .arg(source)
        .arg("-o")
        .arg(output)
        .status()
        .map_err(|e| format!("failed to run glslc: {e}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!("glslc exited with {}", status.code().unwrap_or(-1)))
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string()));
    let shader_dir = manifest_dir.join("shaders");
    println!("cargo:rerun-if-changed={}", shader_dir.display());

    if env::var("SKIP_SHADERS").is_ok() {
        println!("cargo:warning=SKIP_SHADERS set, not compiling shaders");
        return;
    }

    let Some(glslc) = find_glslc() else {
        println!("cargo:warning=glslc not found, the viewer will render clear-only frames");
        return;
    };

    let target_dir = manifest_dir.join("../target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=cannot create {}: {e}", target_dir.display());
        return;
    }

    let Ok(entries) = std::fs::read_dir(&shader_dir) else {
        return;
    };

    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_STAGES.contains(&ext));
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_stage {
            continue;
        }

        let output = target_dir.join(format!("{file_name}.spv"));
        if !needs_compile(&path, &output) {
            continue;
        }

        if let Err(e) = compile(&glslc, &path, &output) {
            panic!("Shader compilation failed for {}: {e}", path.display());
        }
    }
}
