use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Full-screen quad. Must match the pipeline's vertex layout:
    //   - binding 0, location 0: R32G32_SFLOAT (position)
    //   - binding 0, location 1: R32G32_SFLOAT (texcoord)
    // and the 64-byte vertex-stage push constant block.
    let vs_src = r#"
#version 450
layout(location = 0) in vec2 inPosition;
layout(location = 1) in vec2 inTexCoord;

layout(push_constant) uniform PushConstants { mat4 transform; } pc;

layout(location = 0) out vec2 vTexCoord;

void main() {
    vTexCoord = inTexCoord;
    gl_Position = pc.transform * vec4(inPosition, 0.0, 1.0);
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec2 vTexCoord;
layout(set = 0, binding = 0) uniform sampler2D uFrame;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = texture(uFrame, vTexCoord);
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();

    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_1 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let vs_spv = comp
        .compile_into_spirv(
            vs_src,
            shaderc::ShaderKind::Vertex,
            "quad.vert",
            "main",
            Some(&opts),
        )
        .unwrap();

    let fs_spv = comp
        .compile_into_spirv(
            fs_src,
            shaderc::ShaderKind::Fragment,
            "quad.frag",
            "main",
            Some(&opts),
        )
        .unwrap();

    fs::write(out.join("quad.vert.spv"), vs_spv.as_binary_u8()).unwrap();
    fs::write(out.join("quad.frag.spv"), fs_spv.as_binary_u8()).unwrap();

    println!("cargo:rerun-if-changed=build.rs");
}
