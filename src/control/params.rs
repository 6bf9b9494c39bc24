//! Parameter table built from a module's UI tree.
//!
//! Every widget becomes a [`ParameterBinding`] addressed by its control path.
//! Inputs are written into instances by the router; bargraphs are output-only
//! and read back for host feedback. Controls annotated with `midi` metadata
//! are indexed by controller number (or the pitch wheel) so a MIDI message
//! resolves to its bindings without searching.

use std::collections::HashMap;

use serde::Serialize;

use crate::module::metadata::{self, Bargraph, InputControl, MetaEntry, UiVisitor, Widget};
use crate::module::ModuleMetadata;

/// Number of MIDI continuous controllers.
pub const CONTROLLER_COUNT: usize = 128;
/// Highest CC value.
pub const CC_MAX: f32 = 127.0;
/// Highest pitch-wheel value.
pub const PITCH_WHEEL_MAX: f32 = 16_383.0;

/// Path suffixes driven by the voice manager in polyphonic mode.
const GATE_SUFFIX: &str = "/gate";
const FREQ_SUFFIX: &str = "/freq";
const GAIN_SUFFIX: &str = "/gain";

/// Exact affine interpolation of `value` from `[in_min, in_max]` to `[out_min, out_max]`.
#[inline]
pub fn remap(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) / (in_max - in_min) * (out_max - out_min) + out_min
}

/// Dense handle of a binding inside its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u32);

impl BindingId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// MIDI source declared for a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MidiBinding {
    #[default]
    None,
    ContinuousController(u8),
    PitchWheel,
}

impl MidiBinding {
    /// Read the first `midi` annotation of a control.
    ///
    /// Accepts `pitchwheel` and `ctrl N` with N in 0..=127; anything else is
    /// treated as unbound.
    pub fn from_meta(meta: &[MetaEntry]) -> Self {
        let Some(annotation) = meta.iter().find_map(|m| m.get("midi")) else {
            return MidiBinding::None;
        };

        let mut words = annotation.split_whitespace();
        match words.next() {
            Some("pitchwheel") => MidiBinding::PitchWheel,
            Some("ctrl") => match words.next().map(str::parse::<u8>) {
                Some(Ok(n)) if (n as usize) < CONTROLLER_COUNT => MidiBinding::ContinuousController(n),
                _ => {
                    log::warn!(target: "saavy_host::control", "ignoring invalid midi annotation {:?}", annotation);
                    MidiBinding::None
                }
            },
            _ => {
                log::debug!(target: "saavy_host::control", "unsupported midi annotation {:?}", annotation);
                MidiBinding::None
            }
        }
    }
}

/// Direction of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindingKind {
    Input(Widget),
    /// Bargraph: written by the module, read by the host.
    Output,
}

/// Which instances a binding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scope {
    /// Every voice instance, or the single instance in mono mode.
    Voice,
    /// The effect instance.
    Effect,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterBinding {
    pub path: String,
    /// Byte offset of the value inside one instance.
    pub index: usize,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub step: f32,
    pub kind: BindingKind,
    pub midi: MidiBinding,
    pub scope: Scope,
}

impl ParameterBinding {
    pub fn is_output(&self) -> bool {
        self.kind == BindingKind::Output
    }

    /// CC value 0..=127 mapped into this control's range.
    pub fn remap_cc(&self, value: u8) -> f32 {
        remap(value as f32, 0.0, CC_MAX, self.min, self.max)
    }

    /// Pitch-wheel value 0..=16383 mapped into this control's range.
    pub fn remap_pitch_wheel(&self, value: u16) -> f32 {
        remap(value as f32, 0.0, PITCH_WHEEL_MAX, self.min, self.max)
    }

    fn is_voice_key(&self) -> bool {
        is_voice_key(&self.path)
    }
}

/// Whether `path` is one of the gate/freq/gain controls the voice manager drives.
pub fn is_voice_key(path: &str) -> bool {
    path.ends_with(GATE_SUFFIX) || path.ends_with(FREQ_SUFFIX) || path.ends_with(GAIN_SUFFIX)
}

/// Automation parameter exposed to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub path: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// The controls a NoteOn/NoteOff writes on the selected voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceKeys {
    pub gate: Option<BindingId>,
    pub freq: Option<BindingId>,
    pub gain: Option<BindingId>,
}

/// All bindings of a module (and its effect), plus MIDI lookup tables.
#[derive(Debug, Clone)]
pub struct ParameterTable {
    bindings: Vec<ParameterBinding>,
    by_path: HashMap<String, BindingId>,
    controllers: Vec<Vec<BindingId>>,
    pitch_wheel: Vec<BindingId>,
    outputs: Vec<BindingId>,
    keys: VoiceKeys,
    polyphonic: bool,
}

/// Visitor turning one UI tree into bindings.
struct TableBuilder<'t> {
    table: &'t mut ParameterTable,
    scope: Scope,
}

impl TableBuilder<'_> {
    fn push(&mut self, binding: ParameterBinding) {
        let id = BindingId(self.table.bindings.len() as u32);

        match binding.midi {
            MidiBinding::ContinuousController(n) => self.table.controllers[n as usize].push(id),
            MidiBinding::PitchWheel => self.table.pitch_wheel.push(id),
            MidiBinding::None => {}
        }
        if binding.is_output() {
            self.table.outputs.push(id);
        }

        if self.scope == Scope::Voice && self.table.polyphonic {
            let keys = &mut self.table.keys;
            let slot = if binding.path.ends_with(GATE_SUFFIX) {
                Some(&mut keys.gate)
            } else if binding.path.ends_with(FREQ_SUFFIX) {
                Some(&mut keys.freq)
            } else if binding.path.ends_with(GAIN_SUFFIX) {
                Some(&mut keys.gain)
            } else {
                None
            };
            if let Some(slot) = slot {
                slot.get_or_insert(id);
            }
        }

        // Effect controls shadow instrument controls with the same path.
        if let Some(previous) = self.table.by_path.insert(binding.path.clone(), id) {
            log::warn!(
                target: "saavy_host::control",
                "{} shadows binding {} with the same path",
                binding.path,
                previous.index()
            );
        }
        self.table.bindings.push(binding);
    }
}

impl UiVisitor for TableBuilder<'_> {
    fn input(&mut self, control: InputControl<'_>) {
        self.push(ParameterBinding {
            path: control.address.to_string(),
            index: control.index,
            min: control.min,
            max: control.max,
            default: control.init,
            step: control.step,
            kind: BindingKind::Input(control.widget),
            midi: MidiBinding::from_meta(control.meta),
            scope: self.scope,
        });
    }

    fn output(&mut self, meter: &Bargraph) {
        self.push(ParameterBinding {
            path: meter.address.clone(),
            index: meter.index,
            min: meter.min,
            max: meter.max,
            default: meter.min,
            step: 0.0,
            kind: BindingKind::Output,
            midi: MidiBinding::from_meta(&meter.meta),
            scope: self.scope,
        });
    }

    fn unsupported(&mut self) {
        log::debug!(target: "saavy_host::control", "skipping unsupported widget");
    }
}

impl ParameterTable {
    /// Build the table from an instrument tree and an optional effect tree.
    pub fn build(voice: &ModuleMetadata, effect: Option<&ModuleMetadata>, polyphonic: bool) -> Self {
        let mut table = Self {
            bindings: Vec::new(),
            by_path: HashMap::new(),
            controllers: vec![Vec::new(); CONTROLLER_COUNT],
            pitch_wheel: Vec::new(),
            outputs: Vec::new(),
            keys: VoiceKeys::default(),
            polyphonic,
        };

        metadata::walk(
            &voice.ui,
            &mut TableBuilder {
                table: &mut table,
                scope: Scope::Voice,
            },
        );
        if let Some(effect) = effect {
            metadata::walk(
                &effect.ui,
                &mut TableBuilder {
                    table: &mut table,
                    scope: Scope::Effect,
                },
            );
        }

        table
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_polyphonic(&self) -> bool {
        self.polyphonic
    }

    pub fn get(&self, id: BindingId) -> Option<&ParameterBinding> {
        self.bindings.get(id.index())
    }

    pub fn lookup(&self, path: &str) -> Option<BindingId> {
        self.by_path.get(path).copied()
    }

    pub fn binding(&self, path: &str) -> Option<&ParameterBinding> {
        self.lookup(path).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &ParameterBinding)> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(i, b)| (BindingId(i as u32), b))
    }

    /// Bindings registered for controller `n`.
    pub fn controller(&self, n: u8) -> &[BindingId] {
        self.controllers
            .get(n as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pitch_wheel(&self) -> &[BindingId] {
        &self.pitch_wheel
    }

    /// Output-only (bargraph) bindings.
    pub fn outputs(&self) -> &[BindingId] {
        &self.outputs
    }

    pub fn voice_keys(&self) -> VoiceKeys {
        self.keys
    }

    /// Whether the host may write `id` directly, by path or automation.
    pub fn is_automatable(&self, id: BindingId) -> bool {
        self.get(id).is_some_and(|b| self.accepts(b))
    }

    /// Whether `id` is a gate/freq/gain control owned by the voice manager.
    pub fn is_voice_managed(&self, id: BindingId) -> bool {
        self.get(id)
            .is_some_and(|b| self.polyphonic && b.scope == Scope::Voice && b.is_voice_key())
    }

    fn accepts(&self, binding: &ParameterBinding) -> bool {
        !binding.is_output() && !(self.polyphonic && binding.scope == Scope::Voice && binding.is_voice_key())
    }

    /// Input parameters the host may automate.
    ///
    /// In polyphonic mode gate/freq/gain belong to the voice manager and are left out.
    pub fn descriptors(&self) -> Vec<ParameterDescriptor> {
        self.bindings
            .iter()
            .filter(|b| self.accepts(b))
            .map(|b| ParameterDescriptor {
                path: b.path.clone(),
                min: b.min,
                max: b.max,
                default: b.default,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNTH: &str = r#"{
        "name": "synth", "size": 64, "inputs": 0, "outputs": 1,
        "ui": [{ "type": "vgroup", "label": "synth", "items": [
            { "type": "hslider", "label": "freq", "address": "/synth/freq", "index": 0,
              "init": 440, "min": 20, "max": 2000, "step": 1 },
            { "type": "hslider", "label": "gain", "address": "/synth/gain", "index": 4,
              "init": 0.5, "min": 0, "max": 1, "step": 0.01 },
            { "type": "button", "label": "gate", "address": "/synth/gate", "index": 8 },
            { "type": "hgroup", "label": "tone", "items": [
                { "type": "hslider", "label": "cutoff", "address": "/synth/tone/cutoff", "index": 12,
                  "init": 1000, "min": 100, "max": 10000, "step": 1, "meta": [{ "midi": "ctrl 74" }] },
                { "type": "vslider", "label": "bend", "address": "/synth/tone/bend", "index": 16,
                  "init": 0, "min": -2, "max": 2, "step": 0.01, "meta": [{ "midi": "pitchwheel" }] },
                { "type": "checkbox", "label": "hold", "address": "/synth/tone/hold", "index": 20,
                  "meta": [{ "midi": "ctrl 64" }] }
            ]},
            { "type": "vbargraph", "label": "env", "address": "/synth/env", "index": 24,
              "min": 0, "max": 1 }
        ]}]
    }"#;

    const EFFECT: &str = r#"{
        "name": "effect", "size": 8, "inputs": 1, "outputs": 1,
        "ui": [{ "type": "vgroup", "label": "effect", "items": [
            { "type": "hslider", "label": "mix", "address": "/effect/mix", "index": 0,
              "init": 0.5, "min": 0, "max": 1, "step": 0.01, "meta": [{ "midi": "ctrl 74" }] }
        ]}]
    }"#;

    fn table(polyphonic: bool, with_effect: bool) -> ParameterTable {
        let voice = ModuleMetadata::parse(SYNTH).unwrap();
        let effect = ModuleMetadata::parse(EFFECT).unwrap();
        ParameterTable::build(&voice, with_effect.then_some(&effect), polyphonic)
    }

    #[test]
    fn remap_is_exact_affine() {
        assert_eq!(remap(0.0, 0.0, 127.0, 100.0, 10_000.0), 100.0);
        assert_eq!(remap(127.0, 0.0, 127.0, 100.0, 10_000.0), 10_000.0);
        assert_eq!(remap(63.5, 0.0, 127.0, 100.0, 10_000.0), 5_050.0);
        assert_eq!(remap(8_191.5, 0.0, 16_383.0, -2.0, 2.0), 0.0);
        assert_eq!(remap(16_383.0, 0.0, 16_383.0, -2.0, 2.0), 2.0);
    }

    #[test]
    fn remap_is_monotonic() {
        let mut last = f32::NEG_INFINITY;
        for v in 0..=127u8 {
            let out = remap(v as f32, 0.0, 127.0, -1.0, 3.0);
            assert!(out > last);
            last = out;
        }
    }

    #[test]
    fn parses_midi_annotations() {
        let meta = |s: &str| -> Vec<MetaEntry> {
            vec![[("midi".to_string(), s.to_string())].into_iter().collect()]
        };
        assert_eq!(MidiBinding::from_meta(&meta("ctrl 7")), MidiBinding::ContinuousController(7));
        assert_eq!(MidiBinding::from_meta(&meta("  ctrl   0 ")), MidiBinding::ContinuousController(0));
        assert_eq!(MidiBinding::from_meta(&meta("pitchwheel")), MidiBinding::PitchWheel);
        assert_eq!(MidiBinding::from_meta(&meta("ctrl 128")), MidiBinding::None);
        assert_eq!(MidiBinding::from_meta(&meta("ctrl")), MidiBinding::None);
        assert_eq!(MidiBinding::from_meta(&meta("keyon 60")), MidiBinding::None);
        assert_eq!(MidiBinding::from_meta(&[]), MidiBinding::None);
    }

    #[test]
    fn walks_nested_groups() {
        let table = table(false, false);
        assert_eq!(table.len(), 7);

        let cutoff = table.binding("/synth/tone/cutoff").unwrap();
        assert_eq!(cutoff.index, 12);
        assert_eq!(cutoff.midi, MidiBinding::ContinuousController(74));
        assert_eq!(cutoff.kind, BindingKind::Input(Widget::HSlider));

        let hold = table.binding("/synth/tone/hold").unwrap();
        assert_eq!((hold.min, hold.max, hold.default), (0.0, 1.0, 0.0));

        let env = table.lookup("/synth/env").unwrap();
        assert_eq!(table.outputs(), &[env]);
        assert!(table.get(env).unwrap().is_output());
    }

    #[test]
    fn indexes_controllers_and_pitch_wheel() {
        let table = table(true, true);

        let ids: Vec<&str> = table
            .controller(74)
            .iter()
            .map(|&id| table.get(id).unwrap().path.as_str())
            .collect();
        assert_eq!(ids, vec!["/synth/tone/cutoff", "/effect/mix"]);
        assert_eq!(table.controller(64).len(), 1);
        assert!(table.controller(1).is_empty());
        assert_eq!(table.pitch_wheel(), &[table.lookup("/synth/tone/bend").unwrap()]);
        assert_eq!(table.binding("/effect/mix").unwrap().scope, Scope::Effect);
    }

    #[test]
    fn voice_keys_only_in_poly_mode() {
        let poly = table(true, false);
        let keys = poly.voice_keys();
        assert_eq!(keys.freq, poly.lookup("/synth/freq"));
        assert_eq!(keys.gain, poly.lookup("/synth/gain"));
        assert_eq!(keys.gate, poly.lookup("/synth/gate"));

        assert_eq!(table(false, false).voice_keys(), VoiceKeys::default());
    }

    #[test]
    fn descriptors_hide_voice_keys_when_polyphonic() {
        let paths = |t: &ParameterTable| -> Vec<String> {
            t.descriptors().into_iter().map(|d| d.path).collect()
        };

        assert_eq!(
            paths(&table(true, true)),
            vec!["/synth/tone/cutoff", "/synth/tone/bend", "/synth/tone/hold", "/effect/mix"]
        );
        assert_eq!(
            paths(&table(false, false)),
            vec![
                "/synth/freq",
                "/synth/gain",
                "/synth/gate",
                "/synth/tone/cutoff",
                "/synth/tone/bend",
                "/synth/tone/hold"
            ]
        );
    }

    #[test]
    fn voice_keys_are_not_automatable_when_polyphonic() {
        let poly = table(true, true);
        let id = |path: &str| poly.lookup(path).unwrap();
        assert!(poly.is_voice_managed(id("/synth/gate")));
        assert!(!poly.is_automatable(id("/synth/freq")));
        assert!(poly.is_automatable(id("/synth/tone/cutoff")));
        assert!(poly.is_automatable(id("/effect/mix")));
        assert!(!poly.is_automatable(id("/synth/env")));

        let mono = table(false, false);
        assert!(mono.is_automatable(mono.lookup("/synth/gate").unwrap()));
        assert!(!mono.is_voice_managed(mono.lookup("/synth/gate").unwrap()));
    }

    #[test]
    fn binding_remaps_into_declared_range() {
        let table = table(true, false);
        let cutoff = table.binding("/synth/tone/cutoff").unwrap();
        assert_eq!(cutoff.remap_cc(0), 100.0);
        assert_eq!(cutoff.remap_cc(127), 10_000.0);

        let bend = table.binding("/synth/tone/bend").unwrap();
        assert_eq!(bend.remap_pitch_wheel(0), -2.0);
        assert_eq!(bend.remap_pitch_wheel(16_383), 2.0);
    }
}
