use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Vertex shader: interleaved vec4 position + vec4 color, binding 0.
    //   - location 0: R32G32B32A32_SFLOAT (position, already in clip space)
    //   - location 1: R32G32B32A32_SFLOAT (color)
    let vs_src = r#"
#version 450
layout(location = 0) in vec4 inPos;
layout(location = 1) in vec4 inColor;

layout(location = 0) out vec4 vColor;

void main() {
    vColor = inColor;
    gl_Position = inPos;
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec4 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vColor;
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "strip.vert",
            "main",
            Some(&opts),
        )
        .unwrap();
    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "strip.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("strip.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("strip.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
