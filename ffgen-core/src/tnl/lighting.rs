//! Per-vertex lighting.
//!
//! Each face starts from the emission and global ambient term of its material. Every enabled
//! light then adds its attenuated ambient, diffuse and specular contributions:
//!
//! ```text
//! colour = emission + global_ambient * ambient
//!        + sum(att * spot * (ambient_l + max(n.l, 0) * diffuse_l + (n.h)^s * specular_l))
//! ```
//!
//! A spot light whose cone does not contain the vertex is skipped with a predicated branch to
//! the light's end label. For a light with a specular term the diffuse and specular
//! contributions sit in a block only entered when `n.l > 0`.

use crate::{
    asm_lang::{Instruction, Opcode, Operand, Predicate, TestCondition},
    register_allocation::Register,
    session::CompilationSession,
};

use ffgen_error::{error::CompileError, warning::Warning};
use ffgen_types::{
    fixed, light_source, light_terms, material, BindingTag, EnabledLight, Feature,
};

/// Predicate set when a spot light does not reach the vertex.
const SPOT_PREDICATE: u8 = 0;
/// Predicate set when the light faces the vertex.
const FACING_PREDICATE: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Front,
    Back,
}

impl Side {
    fn material(self) -> BindingTag {
        match self {
            Side::Front => BindingTag::FrontMaterial,
            Side::Back => BindingTag::BackMaterial,
        }
    }

    fn products(self, light: u8) -> BindingTag {
        match self {
            Side::Front => BindingTag::LightProducts(light),
            Side::Back => BindingTag::BackLightProducts(light),
        }
    }

    fn outputs(self) -> (BindingTag, BindingTag) {
        match self {
            Side::Front => (
                BindingTag::OutputFrontColour0,
                BindingTag::OutputFrontColour1,
            ),
            Side::Back => (BindingTag::OutputBackColour0, BindingTag::OutputBackColour1),
        }
    }

    fn end_of_light(self, light: u8) -> String {
        match self {
            Side::Front => format!("EndOfLight{light}"),
            Side::Back => format!("EndOfBackLight{light}"),
        }
    }
}

/// Material properties replaced by the vertex colour.
#[derive(Clone, Copy, Debug, Default)]
struct ColourMaterial {
    colour: Option<Register>,
    ambient: bool,
    diffuse: bool,
    specular: bool,
    emission: bool,
}

impl ColourMaterial {
    fn any(&self) -> bool {
        self.ambient || self.diffuse || self.specular || self.emission
    }

    /// The vertex colour if it stands in for a property.
    fn replaces(&self, property: bool) -> Option<Register> {
        if property {
            self.colour
        } else {
            None
        }
    }
}

/// State shared by every light of one face.
#[derive(Clone, Copy, Debug)]
struct Shading {
    side: Side,
    material: Register,
    zero: Register,
    one: Register,
    colour_material: ColourMaterial,
    local_viewer: bool,
    /// Primary colour accumulator.
    colour: Register,
    /// Separate specular colour accumulator.
    specular: Option<Register>,
}

pub(super) fn lighting(s: &mut CompilationSession) -> Result<(), CompileError> {
    let enabled = s.consume(Feature::Lighting);
    let two_sided = s.consume(Feature::TwoSidedLighting);
    let separate_specular = s.consume(Feature::SeparateSpecular);
    let local_viewer = s.consume(Feature::LocalViewer);
    let mut colour_material = ColourMaterial {
        colour: None,
        ambient: s.consume(Feature::ColourMaterialAmbient),
        diffuse: s.consume(Feature::ColourMaterialDiffuse),
        specular: s.consume(Feature::ColourMaterialSpecular),
        emission: s.consume(Feature::ColourMaterialEmission),
    };
    if !enabled {
        return Ok(());
    }

    let lights = s.desc.lights.enabled();
    if lights.is_empty() {
        s.warn(Warning::LightingWithoutLights);
    }
    if colour_material.any() {
        colour_material.colour = Some(s.input(BindingTag::InputColour0, 4)?);
    }
    let zero = s.fixed(fixed::ZERO)?;
    let one = s.fixed(fixed::ONE)?;

    let sides: &[Side] = if two_sided {
        &[Side::Front, Side::Back]
    } else {
        &[Side::Front]
    };
    for side in sides {
        shade(
            s,
            *side,
            &lights,
            ShadeOptions {
                zero,
                one,
                colour_material,
                local_viewer,
                separate_specular,
            },
        )?;
    }

    s.release(one);
    s.release(zero);
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct ShadeOptions {
    zero: Register,
    one: Register,
    colour_material: ColourMaterial,
    local_viewer: bool,
    separate_specular: bool,
}

/// Lights one face and writes its colour outputs.
fn shade(
    s: &mut CompilationSession,
    side: Side,
    lights: &[EnabledLight],
    options: ShadeOptions,
) -> Result<(), CompileError> {
    s.comment(format!("{side:?} face"))?;
    let cm = options.colour_material;
    let material = s.constant(side.material())?;

    let colour = s.alloc_temp(4)?;
    if cm.emission || cm.ambient {
        let emission = cm
            .replaces(cm.emission)
            .unwrap_or(material.sub(material::EMISSION, 4));
        let ambient = cm
            .replaces(cm.ambient)
            .unwrap_or(material.sub(material::AMBIENT, 4));
        s.emit(
            Instruction::alu(
                Opcode::Mad,
                colour,
                [ambient, material.sub(material::GLOBAL_AMBIENT, 4), emission],
            )
            .with_comment("scene colour"),
        )?;
    } else {
        s.emit(Instruction::mov(colour, material.sub(material::SCENE_COLOUR, 4)))?;
    }
    let specular = if options.separate_specular {
        let specular = s.alloc_temp(4)?;
        s.emit(Instruction::mov(specular, options.zero))?;
        Some(specular)
    } else {
        None
    };

    let shading = Shading {
        side,
        material,
        zero: options.zero,
        one: options.one,
        colour_material: cm,
        local_viewer: options.local_viewer,
        colour,
        specular,
    };
    for light in lights {
        shade_light(s, &shading, *light)?;
    }

    let alpha = cm
        .replaces(cm.diffuse)
        .map(|colour| colour.at(3))
        .unwrap_or(material.at(material::DIFFUSE_ALPHA));
    s.emit(Instruction::mov(colour.at(3), alpha).with_comment("diffuse alpha"))?;

    let (primary, secondary) = side.outputs();
    let primary = s.output(primary)?;
    s.emit(Instruction::mov(primary, colour))?;
    if let Some(specular) = specular {
        let secondary = s.output(secondary)?;
        s.emit(Instruction::mov(secondary, specular))?;
        s.release(specular);
    }
    s.release(colour);
    s.release(material);
    Ok(())
}

/// `acc += scale * term`, where the term is the light's precomputed product with the material
/// or, when `vertex_colour` is given, the light colour times the vertex colour.
fn accumulate_term(
    s: &mut CompilationSession,
    shading: &Shading,
    acc: Register,
    light: u8,
    term: u32,
    vertex_colour: Option<Register>,
    scale: Option<Register>,
) -> Result<(), CompileError> {
    let product = match vertex_colour {
        Some(vertex_colour) => {
            let light_colour = s.constant_view(BindingTag::LightColours(light), term, 4)?;
            let product = s.alloc_temp(4)?;
            s.emit(Instruction::alu(
                Opcode::Mul,
                product,
                [vertex_colour, light_colour],
            ))?;
            s.release(light_colour);
            product
        }
        None => s.constant_view(shading.side.products(light), term, 4)?,
    };
    let inst = match scale {
        Some(scale) => Instruction::alu(Opcode::Mad, acc, [scale, product, acc]),
        None => Instruction::alu(Opcode::Add, acc, [acc, product]),
    };
    s.emit(inst)?;
    s.release(product);
    Ok(())
}

/// `value *= attenuation` when there is one.
fn attenuate(
    s: &mut CompilationSession,
    value: Register,
    attenuation: Option<Register>,
) -> Result<(), CompileError> {
    match attenuation {
        Some(attenuation) => s.emit(Instruction::alu(Opcode::Mul, value, [value, attenuation])),
        None => Ok(()),
    }
}

fn shade_light(
    s: &mut CompilationSession,
    shading: &Shading,
    light: EnabledLight,
) -> Result<(), CompileError> {
    let index = light.index;
    s.comment(format!("light {index}: {}", light.kind))?;
    let end = s.new_label(shading.side.end_of_light(index))?;
    let eye = s.eye_position()?.first(3);
    let normal = s.eye_normal()?.first(3);
    let normal: Operand = match shading.side {
        Side::Front => normal.into(),
        Side::Back => normal.neg(),
    };
    let source = s.constant(BindingTag::LightSource(index))?;

    // Normalised direction to the light. Local lights also get a distance attenuation.
    let (direction, mut attenuation) = if light.kind.is_local() {
        let direction = s.alloc_temp(3)?;
        s.emit(Instruction::alu(
            Opcode::Add,
            direction,
            [eye.neg(), source.sub(light_source::POSITION, 3).into()],
        ))?;
        let d2 = s.alloc_temp(1)?;
        let inv_d = s.alloc_temp(1)?;
        s.emit(Instruction::alu(Opcode::Dp3, d2, [direction, direction]))?;
        s.emit(Instruction::alu(Opcode::Rsq, inv_d, [d2]))?;
        s.emit(Instruction::alu(Opcode::Mul, direction, [direction, inv_d]))?;

        let k = source.sub(light_source::ATTENUATION, 3);
        let attenuation = s.alloc_temp(1)?;
        s.emit(Instruction::alu(Opcode::Rcp, attenuation, [inv_d]))?;
        s.emit(Instruction::alu(
            Opcode::Mad,
            attenuation,
            [attenuation, k.at(1), k.at(0)],
        ))?;
        s.emit(Instruction::alu(
            Opcode::Mad,
            attenuation,
            [d2, k.at(2), attenuation],
        ))?;
        s.emit(
            Instruction::alu(Opcode::Rcp, attenuation, [attenuation]).with_comment("attenuation"),
        )?;
        s.release(inv_d);
        s.release(d2);
        (direction, Some(attenuation))
    } else {
        // Infinite lights hold their normalised direction in the position.
        (source.sub(light_source::POSITION, 3), None)
    };

    if light.kind.is_spot() {
        let cos = s.alloc_temp(1)?;
        let t = s.alloc_temp(1)?;
        s.emit(Instruction::alu(
            Opcode::Dp3,
            cos,
            [direction.neg(), source.sub(light_source::SPOT_DIRECTION, 3).into()],
        ))?;
        s.emit(Instruction::alu(
            Opcode::Add,
            t,
            [cos.into(), source.at(light_source::SPOT_COS_CUTOFF).neg()],
        ))?;
        s.emit(Instruction::test(SPOT_PREDICATE, t, TestCondition::Lt))?;
        s.emit(
            Instruction::branch(end)
                .with_predicate(Predicate::new(SPOT_PREDICATE))
                .with_comment("outside the cone"),
        )?;
        s.release(t);

        s.emit(Instruction::alu(Opcode::Log, cos, [cos]))?;
        s.emit(Instruction::alu(
            Opcode::Mul,
            cos,
            [cos, source.at(light_source::SPOT_EXPONENT)],
        ))?;
        s.emit(Instruction::alu(Opcode::Exp, cos, [cos]).with_comment("spot factor"))?;
        attenuation = match attenuation {
            Some(attenuation) => {
                s.emit(Instruction::alu(Opcode::Mul, attenuation, [attenuation, cos]))?;
                s.release(cos);
                Some(attenuation)
            }
            None => Some(cos),
        };
    }

    let cm = shading.colour_material;
    accumulate_term(
        s,
        shading,
        shading.colour,
        index,
        light_terms::AMBIENT,
        cm.replaces(cm.ambient),
        attenuation,
    )?;

    let n_dot_l = s.alloc_temp(1)?;
    s.emit(Instruction::alu(
        Opcode::Dp3,
        n_dot_l,
        [normal, direction.into()],
    ))?;
    if light.specular {
        s.emit(Instruction::test(FACING_PREDICATE, n_dot_l, TestCondition::Gt))?;
        s.if_pred(FACING_PREDICATE)?;
        attenuate(s, n_dot_l, attenuation)?;
        accumulate_term(
            s,
            shading,
            shading.colour,
            index,
            light_terms::DIFFUSE,
            cm.replaces(cm.diffuse),
            Some(n_dot_l),
        )?;
        specular_term(s, shading, light, source, direction, normal, attenuation)?;
        s.end_pred()?;
    } else {
        s.emit(Instruction::alu(
            Opcode::Max,
            n_dot_l,
            [n_dot_l, shading.zero],
        ))?;
        attenuate(s, n_dot_l, attenuation)?;
        accumulate_term(
            s,
            shading,
            shading.colour,
            index,
            light_terms::DIFFUSE,
            cm.replaces(cm.diffuse),
            Some(n_dot_l),
        )?;
    }
    s.place_label(end)?;

    s.release(n_dot_l);
    if let Some(attenuation) = attenuation {
        s.release(attenuation);
    }
    if light.kind.is_local() {
        s.release(direction);
    }
    s.release(source);
    Ok(())
}

fn specular_term(
    s: &mut CompilationSession,
    shading: &Shading,
    light: EnabledLight,
    source: Register,
    direction: Register,
    normal: Operand,
    attenuation: Option<Register>,
) -> Result<(), CompileError> {
    let half = s.alloc_temp(3)?;
    if shading.local_viewer {
        let eye_vector = s
            .carried
            .eye_vector
            .ok_or(CompileError::Internal("local viewer without an eye vector"))?;
        s.emit(Instruction::alu(Opcode::Add, half, [eye_vector, direction]))?;
        s.normalise(half)?;
    } else if light.kind.is_local() {
        // The viewer is at infinity along +z.
        s.emit(Instruction::mov(half, direction))?;
        s.emit(Instruction::alu(
            Opcode::Add,
            half.at(2),
            [half.at(2), shading.one],
        ))?;
        s.normalise(half)?;
    } else {
        s.emit(Instruction::mov(
            half,
            source.sub(light_source::HALF_VECTOR, 3),
        ))?;
    }

    let n_dot_h = s.alloc_temp(1)?;
    s.emit(Instruction::alu(Opcode::Dp3, n_dot_h, [normal, half.into()]))?;
    s.emit(Instruction::alu(
        Opcode::Max,
        n_dot_h,
        [n_dot_h, shading.zero],
    ))?;
    s.emit(Instruction::alu(Opcode::Log, n_dot_h, [n_dot_h]))?;
    s.emit(Instruction::alu(
        Opcode::Mul,
        n_dot_h,
        [n_dot_h, shading.material.at(material::SHININESS)],
    ))?;
    s.emit(Instruction::alu(Opcode::Exp, n_dot_h, [n_dot_h]).with_comment("specular factor"))?;
    attenuate(s, n_dot_h, attenuation)?;

    let cm = shading.colour_material;
    accumulate_term(
        s,
        shading,
        shading.specular.unwrap_or(shading.colour),
        light.index,
        light_terms::SPECULAR,
        cm.replaces(cm.specular),
        Some(n_dot_h),
    )?;
    s.release(n_dot_h);
    s.release(half);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::{compile, listing, opcodes};
    use crate::asm_lang::Opcode;
    use ffgen_error::warning::Warning;
    use ffgen_types::{BindingTag, Feature, LightKind, PipelineDescriptor, Target};

    fn lit(kind: LightKind, specular: bool) -> PipelineDescriptor {
        PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::Lighting)
            .with_light(0, kind, specular)
    }

    fn count(ops: &[Opcode], opcode: Opcode) -> usize {
        ops.iter().filter(|op| **op == opcode).count()
    }

    #[test]
    fn one_end_of_light_label_per_light() {
        let program = compile(&lit(LightKind::InfinitePoint, true), Target::Sgx543);
        let ends = program
            .labels
            .iter()
            .filter(|name| name.starts_with("EndOfLight"))
            .count();
        assert_eq!(ends, 1);
        let ops = opcodes(&program);
        assert_eq!(count(&ops, Opcode::Test), 1);
        assert_eq!(count(&ops, Opcode::Label), 2);
    }

    #[test]
    fn spot_lights_branch_out_of_the_cone() {
        let program = compile(&lit(LightKind::LocalSpot, false), Target::Sgx543);
        let ops = opcodes(&program);
        assert_eq!(count(&ops, Opcode::Br), 1);
        let lines = listing(&program);
        let branch = lines
            .iter()
            .find(|line| line.contains(" br "))
            .unwrap();
        assert!(branch.starts_with("    (p0) br L0"));
        // Attenuation and spot factor are both applied.
        assert_eq!(count(&ops, Opcode::Exp), 1);
        assert_eq!(count(&ops, Opcode::Rcp), 2);
    }

    #[test]
    fn two_sided_lighting_negates_the_normal() {
        let program = compile(
            &lit(LightKind::InfinitePoint, false).with_feature(Feature::TwoSidedLighting),
            Target::Sgx543,
        );
        assert!(program.labels.contains(&"EndOfBackLight0".to_string()));
        let diffuse_dots = listing(&program)
            .into_iter()
            .filter(|line| line.starts_with("    dp3 "))
            .collect::<Vec<_>>();
        // The normal transform is vectorised, leaving one n.l per face.
        assert_eq!(diffuse_dots.len(), 2);
        assert!(!diffuse_dots[0].contains(", -r"));
        assert!(diffuse_dots[1].contains(", -r"));
        assert!(program
            .constants
            .iter()
            .any(|usage| usage.binding == BindingTag::BackLightProducts(0)));
    }

    #[test]
    fn no_lights_writes_the_scene_colour() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::Lighting);
        let program = compile(&desc, Target::Sgx543);
        assert_eq!(
            program.warnings[0].warning_content,
            Warning::LightingWithoutLights
        );
        assert_eq!(
            opcodes(&program),
            vec![
                Opcode::Vdp4,
                Opcode::Mov,
                Opcode::Mov,
                Opcode::Mov,
                Opcode::End
            ]
        );
    }

    #[test]
    fn colour_material_uses_the_light_colours() {
        let desc = lit(LightKind::InfinitePoint, false)
            .with_feature(Feature::ColourMaterialAmbient)
            .with_feature(Feature::ColourMaterialDiffuse);
        let program = compile(&desc, Target::Sgx543);
        let constants = program
            .constants
            .iter()
            .map(|usage| usage.binding)
            .collect::<Vec<_>>();
        assert!(constants.contains(&BindingTag::LightColours(0)));
        assert!(!constants.contains(&BindingTag::LightProducts(0)));
        assert!(program
            .inputs
            .iter()
            .any(|usage| usage.binding == BindingTag::InputColour0));
    }

    #[test]
    fn separate_specular_goes_to_the_secondary_colour() {
        let desc = lit(LightKind::LocalPoint, true)
            .with_feature(Feature::SeparateSpecular)
            .with_feature(Feature::LocalViewer);
        let program = compile(&desc, Target::Sgx543);
        assert!(program
            .outputs
            .iter()
            .any(|usage| usage.binding == BindingTag::OutputFrontColour1));
        let lines = listing(&program);
        let writes = lines
            .iter()
            .filter(|line| line.starts_with("    mov.r4 o"))
            .count();
        assert_eq!(writes, 2);
    }

    #[test]
    fn lighting_bits_are_consumed_when_lighting_is_off() {
        let desc = PipelineDescriptor::default()
            .with_feature(Feature::StandardTransformation)
            .with_feature(Feature::TwoSidedLighting)
            .with_feature(Feature::LocalViewer)
            .with_feature(Feature::ColourMaterialEmission);
        let program = compile(&desc, Target::Sgx543);
        assert_eq!(opcodes(&program), vec![Opcode::Vdp4, Opcode::End]);
    }
}
