use ffgen_core::{
    asm_generation::{AssembledCode, Assembler, LabelResolver},
    asm_lang::{EfoMode, HwInstruction, Opcode},
    compile_pipeline, compile_pipeline_with,
    register_allocation::{ConstantPlacement, ConstantUsage, RegisterUsage},
    uniflex::UfOpcode,
    BuildConfig, CodegenMode, GeneratedProgram, OutputKind, ProgramCode,
};
use ffgen_error::error::CompileError;
use ffgen_types::{
    BindingTag, Capabilities, CoordMask, Feature, LightKind, PipelineDescriptor, Target,
    TextureUnitGen,
};
use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;

fn executable(program: &GeneratedProgram) -> Vec<&HwInstruction> {
    program
        .hw_instructions()
        .iter()
        .filter(|inst| !inst.opcode.is_annotation() && inst.opcode != Opcode::Nop)
        .collect()
}

fn opcodes(program: &GeneratedProgram) -> Vec<Opcode> {
    executable(program).iter().map(|inst| inst.opcode).collect()
}

fn standard_transformation() -> PipelineDescriptor {
    PipelineDescriptor::default().with_feature(Feature::StandardTransformation)
}

/// Touches every pass at once.
fn everything() -> PipelineDescriptor {
    PipelineDescriptor::default()
        .with_feature(Feature::StandardTransformation)
        .with_feature(Feature::NormaliseNormals)
        .with_feature(Feature::RescaleNormals)
        .with_feature(Feature::Clipping)
        .with_clip_planes(0b11)
        .with_feature(Feature::Fog)
        .with_feature(Feature::FogCoordRadial)
        .with_feature(Feature::FogExp)
        .with_feature(Feature::PointSize)
        .with_feature(Feature::PointAttenuation)
        .with_feature(Feature::Lighting)
        .with_feature(Feature::TwoSidedLighting)
        .with_feature(Feature::SeparateSpecular)
        .with_feature(Feature::LocalViewer)
        .with_feature(Feature::ColourMaterialDiffuse)
        .with_light(0, LightKind::InfinitePoint, true)
        .with_light(1, LightKind::LocalSpot, true)
        .with_light(2, LightKind::LocalPoint, false)
        .with_feature(Feature::Texturing)
        .with_texture_unit(
            0,
            TextureUnitGen {
                passthrough: CoordMask::ST,
                texture_matrix: true,
                ..Default::default()
            },
        )
        .with_texture_unit(
            1,
            TextureUnitGen {
                sphere_map: CoordMask::ST,
                ..Default::default()
            },
        )
        .with_texture_unit(
            2,
            TextureUnitGen {
                eye_linear: CoordMask::STR,
                object_linear: CoordMask::Q,
                texture_matrix: true,
                ..Default::default()
            },
        )
}

fn hardware_targets() -> impl Iterator<Item = Target> {
    Target::iter().filter(|target| *target != Target::Uniflex)
}

#[test]
fn standard_transformation_only() {
    let program = compile_pipeline(&standard_transformation(), &BuildConfig::new(Target::Sgx530))
        .unwrap();
    assert_eq!(
        opcodes(&program),
        vec![Opcode::Dp4, Opcode::Dp4, Opcode::Dp4, Opcode::Dp4, Opcode::End]
    );
    assert_eq!(
        program.constants,
        vec![ConstantUsage {
            binding: BindingTag::ModelViewProjection,
            placement: ConstantPlacement::Secondary,
            offset: 4,
            size: 16,
        }]
    );
    assert_eq!(
        program.inputs,
        vec![RegisterUsage {
            binding: BindingTag::InputPosition,
            offset: 0,
            size: 4,
        }]
    );
    assert_eq!(
        program.outputs,
        vec![RegisterUsage {
            binding: BindingTag::OutputPosition,
            offset: 0,
            size: 4,
        }]
    );
    assert_eq!(program.temp_count, 0);
    assert!(program.warnings.is_empty());
}

#[test]
fn standard_transformation_lowering_per_target() {
    let compile = |target| {
        opcodes(&compile_pipeline(&standard_transformation(), &BuildConfig::new(target)).unwrap())
    };
    assert_eq!(compile(Target::Sgx543), vec![Opcode::Vdp4, Opcode::End]);

    let efo = compile(Target::Sgx535);
    assert_eq!(efo.len(), 8);
    assert!(efo[..7].iter().all(|op| matches!(op, Opcode::Efo(_))));
    assert_eq!(efo[3], Opcode::Efo(EfoMode::FinishReseed));
}

#[test]
fn specular_adds_a_facing_test() {
    let lit = |specular| {
        let desc = standard_transformation()
            .with_feature(Feature::Lighting)
            .with_light(0, LightKind::InfinitePoint, specular);
        compile_pipeline(&desc, &BuildConfig::new(Target::Sgx543)).unwrap()
    };
    let diffuse = lit(false);
    let specular = lit(true);

    let count = |program: &GeneratedProgram, opcode| {
        opcodes(program).into_iter().filter(|op| *op == opcode).count()
    };
    assert_eq!(count(&diffuse, Opcode::Test), 0);
    assert_eq!(count(&specular, Opcode::Test), 1);
    assert_eq!(count(&diffuse, Opcode::Label), 1);
    assert_eq!(count(&specular, Opcode::Label), 2);
    assert_eq!(count(&specular, Opcode::Exp), 1);
    assert_eq!(
        diffuse
            .labels
            .iter()
            .filter(|name| name.starts_with("EndOfLight"))
            .count(),
        1
    );
}

#[test]
fn every_enabled_feature_is_handled() {
    for target in Target::iter() {
        let config = BuildConfig::new(target).verify_feature_coverage(true);
        let program = match compile_pipeline(&everything(), &config) {
            Ok(program) => program,
            Err(err) => panic!("{target}: {err}"),
        };
        assert!(program.warnings.is_empty(), "{target}");
        assert!(program.code.instruction_count() > 0, "{target}");
    }
}

#[test]
fn blending_handles_normals_and_lighting() {
    let desc = PipelineDescriptor::default()
        .with_feature(Feature::MatrixPaletteBlending)
        .with_matrix_palette(8)
        .with_blend_units(3)
        .with_feature(Feature::Lighting)
        .with_light(0, LightKind::LocalPoint, true);
    for target in hardware_targets() {
        let config = BuildConfig::new(target).verify_feature_coverage(true);
        let program = compile_pipeline(&desc, &config).unwrap();
        assert!(program
            .constants
            .iter()
            .any(|usage| usage.binding == BindingTag::NormalPalette(8)));
    }
}

#[test]
fn one_and_two_pass_agree() {
    let desc = standard_transformation()
        .with_feature(Feature::Lighting)
        .with_light(0, LightKind::InfinitePoint, true)
        .with_feature(Feature::Fog)
        .with_feature(Feature::FogCoordEyeZ)
        .with_feature(Feature::FogLinear);
    for target in hardware_targets() {
        let one = compile_pipeline(&desc, &BuildConfig::new(target)).unwrap();
        let two = compile_pipeline(
            &desc,
            &BuildConfig::new(target).codegen(CodegenMode::TwoPass),
        )
        .unwrap();
        assert_eq!(one.words(), two.words(), "{target}");
        assert_eq!(one.constants, two.constants, "{target}");
    }
}

#[test]
fn two_pass_compacts_the_palette() {
    let desc = PipelineDescriptor::default()
        .with_feature(Feature::MatrixPaletteBlending)
        .with_matrix_palette(4)
        .with_blend_units(2);
    let palette_offset = |codegen| {
        let program =
            compile_pipeline(&desc, &BuildConfig::new(Target::Sgx535).codegen(codegen)).unwrap();
        let palette = program
            .constants
            .iter()
            .find(|usage| usage.binding == BindingTag::MatrixPalette(4))
            .copied()
            .unwrap();
        assert_eq!(palette.placement, ConstantPlacement::Indexable);
        (palette.offset, program.code.instruction_count())
    };
    let (one_pass, one_count) = palette_offset(CodegenMode::OnePass);
    let (two_pass, two_count) = palette_offset(CodegenMode::TwoPass);
    assert_eq!(one_pass, 128);
    assert!(two_pass < one_pass);
    assert_eq!(one_count, two_count);
}

/// Every run of fused multiply-accumulates is entered and executed without a deschedule point.
fn assert_efo_runs_are_pinned(program: &GeneratedProgram, caps: &Capabilities) {
    let stream = program
        .hw_instructions()
        .iter()
        .filter(|inst| !inst.opcode.is_annotation())
        .collect::<Vec<_>>();
    let is_efo = |inst: &HwInstruction| matches!(inst.opcode, Opcode::Efo(_));

    let mut i = 0;
    while i < stream.len() {
        if !is_efo(stream[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < stream.len() && is_efo(stream[i]) {
            i += 1;
        }
        let run = &stream[start..i];
        assert!(run[..run.len() - 1].iter().all(|inst| inst.flags.no_sched));

        let pinned = stream[..start]
            .iter()
            .rev()
            .take(caps.no_sched_lookback.max(caps.no_sched_padding) as usize)
            .take_while(|inst| !inst.opcode.forces_deschedule())
            .any(|inst| inst.flags.no_sched);
        assert!(pinned, "unpinned run starting at {start}");
    }
}

#[test]
fn efo_chains_cannot_be_descheduled() {
    for target in [Target::Sgx535, Target::Sgx540, Target::Sgx545] {
        let config = BuildConfig::new(target);
        for desc in [standard_transformation(), everything()] {
            let program = compile_pipeline(&desc, &config).unwrap();
            assert!(opcodes(&program)
                .iter()
                .any(|op| matches!(op, Opcode::Efo(_))));
            assert_efo_runs_are_pinned(&program, config.caps());
        }
    }
}

#[test]
fn uniflex_output() {
    let program =
        compile_pipeline(&standard_transformation(), &BuildConfig::new(Target::Uniflex)).unwrap();
    let ProgramCode::Uniflex(code) = &program.code else {
        panic!("portable output expected");
    };
    let ops = code.iter().map(|inst| inst.opcode).collect::<Vec<_>>();
    assert_eq!(
        ops,
        vec![UfOpcode::Dp4, UfOpcode::Dp4, UfOpcode::Dp4, UfOpcode::Dp4, UfOpcode::End]
    );
    assert!(program.hw_instructions().is_empty());
    assert!(program.words().is_empty());

    // Any target can produce the portable form.
    let program = compile_pipeline(
        &everything(),
        &BuildConfig::new(Target::Sgx543).output(OutputKind::Uniflex),
    )
    .unwrap();
    assert!(matches!(program.code, ProgramCode::Uniflex(_)));
}

#[test]
fn descriptors_load_from_json() {
    let desc: PipelineDescriptor = serde_json::from_str(
        r#"{
            "features": ["StandardTransformation", "Fog", "FogCoordEyeZ", "FogLinear", "Texturing"],
            "texture_units": [{ "passthrough": 3 }]
        }"#,
    )
    .unwrap();
    assert!(desc.has(Feature::FogLinear));
    assert_eq!(desc.texture_units[0].passthrough, CoordMask::ST);
    let program = compile_pipeline(&desc, &BuildConfig::new(Target::Sgx543)).unwrap();
    let outputs = program
        .outputs
        .iter()
        .map(|usage| usage.binding)
        .collect::<Vec<_>>();
    assert_eq!(
        outputs,
        vec![
            BindingTag::OutputPosition,
            BindingTag::OutputFog,
            BindingTag::OutputTexCoord(0)
        ]
    );
}

#[test]
fn raw_enable_words_round_trip() {
    let desc = everything();
    let (enables1, enables2) = desc.features.to_enables();
    let raw = PipelineDescriptor::from_enables(enables1, enables2).unwrap();
    assert_eq!(raw.features, desc.features);
    assert!(PipelineDescriptor::from_enables(1 << 31, 0).is_err());
}

/// Counts what it is given and encodes one word per instruction.
#[derive(Default)]
struct CountingAssembler {
    seen: usize,
}

impl Assembler for CountingAssembler {
    fn assemble(
        &mut self,
        program: &[HwInstruction],
        _caps: &Capabilities,
        _labels: &mut dyn LabelResolver,
    ) -> Result<AssembledCode, CompileError> {
        let words = program
            .iter()
            .filter(|inst| !inst.opcode.is_annotation())
            .map(|inst| inst.opcode.code())
            .collect::<Vec<_>>();
        self.seen += words.len();
        Ok(AssembledCode {
            instruction_count: words.len() as u32,
            words,
        })
    }
}

#[test]
fn custom_assembler_receives_the_program() {
    let mut assembler = CountingAssembler::default();
    let program = compile_pipeline_with(
        &standard_transformation(),
        &BuildConfig::new(Target::Sgx530),
        &mut assembler,
    )
    .unwrap();
    assert_eq!(assembler.seen, 5);
    assert_eq!(program.words().len(), 5);
    assert_eq!(program.code.instruction_count(), 5);
}
