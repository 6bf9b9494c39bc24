use color_eyre::eyre::Result as EyreResult;
use saavy_host::control::params::{BindingKind, MidiBinding, ParameterTable, Scope};
use saavy_host::memory::{LayoutRequest, MemoryPlan, Polyphony};
use saavy_host::module::ModuleMetadata;
use saavy_host::EngineConfig;

/// Print the arena plan and the parameter table a processor would use.
pub fn print_module(
    metadata: &ModuleMetadata,
    effect: Option<&ModuleMetadata>,
    config: &EngineConfig,
) -> EyreResult<()> {
    let polyphony = Polyphony::for_requested(config.voices);
    let effect = effect.filter(|_| polyphony.is_poly());

    let mut request = LayoutRequest::new(
        metadata.size,
        metadata.inputs,
        metadata.outputs,
        config.block_len,
    )
    .voices(config.voices)
    .ptr_width(config.ptr_width()?)
    .page_size(config.page_size);
    if let Some(effect) = effect {
        request = request.effect(effect.size);
    }
    let plan = request.plan()?;

    println!(
        "Module: {} ({} in, {} out, {} byte instance)",
        metadata.name, metadata.inputs, metadata.outputs, metadata.size
    );
    print_plan(&plan);
    println!();

    let table = ParameterTable::build(metadata, effect, polyphony.is_poly());
    print_table(&table);
    Ok(())
}

fn print_plan(plan: &MemoryPlan) {
    match plan.polyphony() {
        Polyphony::Mono => println!("Mode: monophonic"),
        Polyphony::Poly { voices } => println!("Mode: polyphonic, {} voices", voices),
    }
    println!(
        "Arena: {} bytes ({} pages of {}), {} used",
        plan.arena_size(),
        plan.pages(),
        plan.page_size(),
        plan.used_bytes()
    );

    let mut regions = plan.regions();
    regions.sort_by_key(|(_, range)| range.start);
    for (kind, range) in regions {
        println!("  {:>8} .. {:<8} {:?}", range.start, range.end, kind);
    }
}

fn print_table(table: &ParameterTable) {
    println!("Controls: {}", table.len());
    for (_, binding) in table.iter() {
        let kind = match binding.kind {
            BindingKind::Input(widget) => format!("{:?}", widget),
            BindingKind::Output => "Bargraph".to_string(),
        };
        let midi = match binding.midi {
            MidiBinding::None => String::new(),
            MidiBinding::ContinuousController(n) => format!(" cc {}", n),
            MidiBinding::PitchWheel => " pitchwheel".to_string(),
        };
        let scope = match binding.scope {
            Scope::Voice => "",
            Scope::Effect => " [effect]",
        };
        println!(
            "  {:<32} {:<9} @{:<5} {} .. {} (default {}){}{}",
            binding.path, kind, binding.index, binding.min, binding.max, binding.default, midi, scope
        );
    }

    let descriptors = table.descriptors();
    println!();
    println!("Automatable: {}", descriptors.len());
    for d in descriptors {
        println!("  {}", d.path);
    }
}
