//! Writes control values into instance memory.
//!
//! A binding lives at the same byte offset in every instance of its module.
//! Instrument bindings are broadcast to every voice (or to the single mono
//! instance); effect bindings go to the effect instance only. Reads come from
//! voice 0 or the effect.

use crate::memory::{Arena, InstanceRegion, MemoryPlan};

use super::params::{BindingId, ParameterBinding, ParameterTable, Scope};

/// Borrowed view of one processor's memory and parameter table.
pub struct Route<'a> {
    pub arena: &'a mut Arena,
    pub plan: &'a MemoryPlan,
    pub table: &'a ParameterTable,
}

fn store(arena: &mut Arena, region: InstanceRegion, binding: &ParameterBinding, value: f32) {
    // Metadata validation keeps every index inside the instance footprint.
    if let Some(addr) = region.field(binding.index) {
        let stored = arena.store_f32(addr, value);
        debug_assert!(stored.is_ok(), "binding {} outside arena", binding.path);
    }
}

fn load(arena: &Arena, region: InstanceRegion, binding: &ParameterBinding) -> Option<f32> {
    region
        .field(binding.index)
        .and_then(|addr| arena.load_f32(addr).ok())
}

/// Instance a read of `binding` comes from.
fn read_region(plan: &MemoryPlan, binding: &ParameterBinding) -> Option<InstanceRegion> {
    match binding.scope {
        Scope::Voice => plan.voice_instance(0),
        Scope::Effect => plan.effect_instance(),
    }
}

impl Route<'_> {
    /// Write `value` to every instance holding `id`.
    pub fn set(&mut self, id: BindingId, value: f32) {
        let Some(binding) = self.table.get(id) else {
            return;
        };

        match binding.scope {
            Scope::Voice => {
                for region in self.plan.voice_instances() {
                    store(self.arena, region, binding, value);
                }
            }
            Scope::Effect => {
                if let Some(region) = self.plan.effect_instance() {
                    store(self.arena, region, binding, value);
                }
            }
        }
    }

    /// Write `value` to `id` in one voice instance.
    pub fn set_on_voice(&mut self, region: InstanceRegion, id: BindingId, value: f32) {
        if let Some(binding) = self.table.get(id) {
            store(self.arena, region, binding, value);
        }
    }

    /// Write by control path. Returns `false` for unknown, output-only and
    /// voice-managed paths.
    pub fn set_path(&mut self, path: &str, value: f32) -> bool {
        match self.table.lookup(path) {
            Some(id) if self.table.is_automatable(id) => {
                self.set(id, value);
                true
            }
            _ => false,
        }
    }

    /// Remap a CC value onto every control bound to `controller`.
    pub fn control_change(&mut self, controller: u8, value: u8) {
        let table = self.table;
        for &id in table.controller(controller) {
            if let Some(binding) = table.get(id) {
                self.set(id, binding.remap_cc(value));
            }
        }
    }

    /// Remap a pitch-wheel value onto every control bound to the wheel.
    pub fn pitch_wheel(&mut self, value: u16) {
        let table = self.table;
        for &id in table.pitch_wheel() {
            if let Some(binding) = table.get(id) {
                self.set(id, binding.remap_pitch_wheel(value));
            }
        }
    }

    pub fn read(&self, id: BindingId) -> Option<f32> {
        read(self.arena, self.plan, self.table, id)
    }
}

/// Current value of `id`: voice 0 for instrument controls, the effect otherwise.
pub fn read(arena: &Arena, plan: &MemoryPlan, table: &ParameterTable, id: BindingId) -> Option<f32> {
    let binding = table.get(id)?;
    load(arena, read_region(plan, binding)?, binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LayoutRequest;
    use crate::module::ModuleMetadata;

    const VOICE: &str = r#"{
        "name": "v", "size": 16, "inputs": 0, "outputs": 1,
        "ui": [{ "type": "vgroup", "label": "v", "items": [
            { "type": "hslider", "label": "cutoff", "address": "/v/cutoff", "index": 0,
              "init": 1000, "min": 100, "max": 10000, "step": 1, "meta": [{ "midi": "ctrl 74" }] },
            { "type": "hslider", "label": "bend", "address": "/v/bend", "index": 4,
              "init": 0, "min": -2, "max": 2, "step": 0.01, "meta": [{ "midi": "pitchwheel" }] },
            { "type": "hbargraph", "label": "level", "address": "/v/level", "index": 8,
              "min": 0, "max": 1 }
        ]}]
    }"#;

    const EFFECT: &str = r#"{
        "name": "fx", "size": 8, "inputs": 1, "outputs": 1,
        "ui": [{ "type": "vgroup", "label": "fx", "items": [
            { "type": "hslider", "label": "mix", "address": "/fx/mix", "index": 4,
              "init": 0.5, "min": 0, "max": 1, "step": 0.01 }
        ]}]
    }"#;

    fn fixture() -> (Arena, MemoryPlan, ParameterTable) {
        let voice = ModuleMetadata::parse(VOICE).unwrap();
        let effect = ModuleMetadata::parse(EFFECT).unwrap();
        let plan = LayoutRequest::new(16, 0, 1, 8)
            .voices(4)
            .effect(8)
            .plan()
            .unwrap();
        let table = ParameterTable::build(&voice, Some(&effect), true);
        (Arena::for_plan(&plan), plan, table)
    }

    fn voice_values(arena: &Arena, plan: &MemoryPlan, index: usize) -> Vec<f32> {
        plan.voice_instances()
            .map(|r| arena.load_f32(r.offset() + index).unwrap())
            .collect()
    }

    #[test]
    fn instrument_controls_reach_every_voice() {
        let (mut arena, plan, table) = fixture();
        let mut route = Route {
            arena: &mut arena,
            plan: &plan,
            table: &table,
        };

        assert!(route.set_path("/v/cutoff", 500.0));
        assert_eq!(voice_values(&arena, &plan, 0), vec![500.0; 4]);

        let effect = plan.effect_instance().unwrap();
        assert_eq!(arena.load_f32(effect.offset()).unwrap(), 0.0);
    }

    #[test]
    fn effect_controls_reach_only_the_effect() {
        let (mut arena, plan, table) = fixture();
        let mut route = Route {
            arena: &mut arena,
            plan: &plan,
            table: &table,
        };

        assert!(route.set_path("/fx/mix", 0.75));
        assert_eq!(route.read(table.lookup("/fx/mix").unwrap()), Some(0.75));
        assert_eq!(voice_values(&arena, &plan, 4), vec![0.0; 4]);
    }

    #[test]
    fn rejects_unknown_and_output_paths() {
        let (mut arena, plan, table) = fixture();
        let mut route = Route {
            arena: &mut arena,
            plan: &plan,
            table: &table,
        };

        assert!(!route.set_path("/v/nope", 1.0));
        assert!(!route.set_path("/v/level", 1.0));
    }

    #[test]
    fn midi_controls_are_remapped() {
        let (mut arena, plan, table) = fixture();
        let mut route = Route {
            arena: &mut arena,
            plan: &plan,
            table: &table,
        };

        route.control_change(74, 127);
        route.pitch_wheel(0);
        // Nothing is bound to CC 1.
        route.control_change(1, 64);

        assert_eq!(voice_values(&arena, &plan, 0), vec![10_000.0; 4]);
        assert_eq!(voice_values(&arena, &plan, 4), vec![-2.0; 4]);
    }

    #[test]
    fn single_voice_write() {
        let (mut arena, plan, table) = fixture();
        let third = plan.voice_instance(2).unwrap();
        let mut route = Route {
            arena: &mut arena,
            plan: &plan,
            table: &table,
        };

        route.set_on_voice(third, table.lookup("/v/cutoff").unwrap(), 220.0);
        assert_eq!(voice_values(&arena, &plan, 0), vec![0.0, 0.0, 220.0, 0.0]);
    }
}
