//! Side-channel description emitted by the compiler next to each binary.
//!
//! The document is JSON. Its `ui` member is a tree of groups and widgets; each
//! widget carries a control path (`address`) and the byte offset (`index`) of
//! its value inside one module instance. Older compilers emit numbers as
//! strings, so numeric fields are parsed leniently.

use std::collections::{BTreeMap, HashSet};

use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};

/// One `meta` entry: a single-key object such as `{"midi": "ctrl 7"}`.
pub type MetaEntry = BTreeMap<String, String>;

/// Top-level module description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub name: String,
    #[serde(default)]
    pub filename: String,
    /// Instance footprint in bytes.
    #[serde(deserialize_with = "lenient_usize")]
    pub size: usize,
    #[serde(deserialize_with = "lenient_usize")]
    pub inputs: usize,
    #[serde(deserialize_with = "lenient_usize")]
    pub outputs: usize,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
    pub ui: Vec<UiItem>,
}

/// A node of the UI tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UiItem {
    VGroup(Group),
    HGroup(Group),
    TGroup(Group),
    HSlider(Slider),
    VSlider(Slider),
    NEntry(Slider),
    Button(Toggle),
    Checkbox(Toggle),
    HBargraph(Bargraph),
    VBargraph(Bargraph),
    /// Widgets this host does not drive (e.g. soundfiles).
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub label: String,
    #[serde(default)]
    pub items: Vec<UiItem>,
}

/// Continuous input: sliders and numeric entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slider {
    pub label: String,
    pub address: String,
    #[serde(deserialize_with = "lenient_usize")]
    pub index: usize,
    #[serde(deserialize_with = "lenient_f32")]
    pub init: f32,
    #[serde(deserialize_with = "lenient_f32")]
    pub min: f32,
    #[serde(deserialize_with = "lenient_f32")]
    pub max: f32,
    #[serde(default, deserialize_with = "lenient_f32")]
    pub step: f32,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
}

/// Two-state input: buttons and checkboxes (range 0..1, default 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toggle {
    pub label: String,
    pub address: String,
    #[serde(deserialize_with = "lenient_usize")]
    pub index: usize,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
}

/// Output-only meter written by the module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bargraph {
    pub label: String,
    pub address: String,
    #[serde(deserialize_with = "lenient_usize")]
    pub index: usize,
    #[serde(deserialize_with = "lenient_f32")]
    pub min: f32,
    #[serde(deserialize_with = "lenient_f32")]
    pub max: f32,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
}

fn lenient_f32<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    match Lenient::deserialize(d)? {
        Lenient::Number(n) => Ok(n as f32),
        Lenient::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

fn lenient_usize<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
    match Lenient::deserialize(d)? {
        Lenient::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => {
            Ok(n as usize)
        }
        Lenient::Number(n) => Err(D::Error::custom(format!("expected a byte count, got {}", n))),
        Lenient::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

/// Input widget flavours, kept for descriptors and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Widget {
    HSlider,
    VSlider,
    NEntry,
    Button,
    Checkbox,
}

/// Uniform view of an input widget.
#[derive(Debug, Clone, Copy)]
pub struct InputControl<'a> {
    pub widget: Widget,
    pub address: &'a str,
    pub index: usize,
    pub init: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub meta: &'a [MetaEntry],
}

/// Callbacks for a depth-first walk of the UI tree.
pub trait UiVisitor {
    fn enter_group(&mut self, _label: &str) {}

    fn exit_group(&mut self, _label: &str) {}

    fn input(&mut self, control: InputControl<'_>);

    fn output(&mut self, meter: &Bargraph);

    fn unsupported(&mut self) {}
}

impl UiItem {
    /// Visit this node and everything below it.
    pub fn accept<V: UiVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            UiItem::VGroup(g) | UiItem::HGroup(g) | UiItem::TGroup(g) => {
                visitor.enter_group(&g.label);
                walk(&g.items, visitor);
                visitor.exit_group(&g.label);
            }
            UiItem::HSlider(s) => visitor.input(s.view(Widget::HSlider)),
            UiItem::VSlider(s) => visitor.input(s.view(Widget::VSlider)),
            UiItem::NEntry(s) => visitor.input(s.view(Widget::NEntry)),
            UiItem::Button(t) => visitor.input(t.view(Widget::Button)),
            UiItem::Checkbox(t) => visitor.input(t.view(Widget::Checkbox)),
            UiItem::HBargraph(b) | UiItem::VBargraph(b) => visitor.output(b),
            UiItem::Unsupported => visitor.unsupported(),
        }
    }
}

/// Visit a list of sibling nodes in order.
pub fn walk<V: UiVisitor + ?Sized>(items: &[UiItem], visitor: &mut V) {
    for item in items {
        item.accept(visitor);
    }
}

impl Slider {
    fn view(&self, widget: Widget) -> InputControl<'_> {
        InputControl {
            widget,
            address: &self.address,
            index: self.index,
            init: self.init,
            min: self.min,
            max: self.max,
            step: self.step,
            meta: &self.meta,
        }
    }
}

impl Toggle {
    fn view(&self, widget: Widget) -> InputControl<'_> {
        InputControl {
            widget,
            address: &self.address,
            index: self.index,
            init: 0.0,
            min: 0.0,
            max: 1.0,
            step: 1.0,
            meta: &self.meta,
        }
    }
}

/// Errors that can occur when reading module metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The document is not valid JSON or misses required fields
    Malformed(String),
    /// A control's value would lie outside the instance footprint
    IndexOutOfRange { path: String, index: usize, size: usize },
    /// Two controls share a path
    DuplicatePath(String),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Malformed(msg) => write!(f, "malformed module metadata: {}", msg),
            MetadataError::IndexOutOfRange { path, index, size } => write!(
                f,
                "control {} at byte {} lies outside the {}-byte instance",
                path, index, size
            ),
            MetadataError::DuplicatePath(path) => write!(f, "duplicate control path {}", path),
        }
    }
}

impl std::error::Error for MetadataError {}

/// Collects every control address and checks it against the footprint.
struct Validator<'a> {
    size: usize,
    seen: HashSet<&'a str>,
    error: Option<MetadataError>,
}

impl<'a> Validator<'a> {
    fn check(&mut self, address: &str, index: usize) {
        if self.error.is_some() {
            return;
        }
        if index.checked_add(4).map_or(true, |end| end > self.size) {
            self.error = Some(MetadataError::IndexOutOfRange {
                path: address.to_string(),
                index,
                size: self.size,
            });
        }
    }
}

impl ModuleMetadata {
    /// Parse and validate a metadata document.
    pub fn parse(json: &str) -> Result<Self, MetadataError> {
        let meta: ModuleMetadata =
            serde_json::from_str(json).map_err(|e| MetadataError::Malformed(e.to_string()))?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<(), MetadataError> {
        // Duplicate detection needs borrowed addresses, so walk manually.
        fn collect<'a>(items: &'a [UiItem], v: &mut Validator<'a>) {
            for item in items {
                let (address, index) = match item {
                    UiItem::VGroup(g) | UiItem::HGroup(g) | UiItem::TGroup(g) => {
                        collect(&g.items, v);
                        continue;
                    }
                    UiItem::HSlider(s) | UiItem::VSlider(s) | UiItem::NEntry(s) => {
                        (s.address.as_str(), s.index)
                    }
                    UiItem::Button(t) | UiItem::Checkbox(t) => (t.address.as_str(), t.index),
                    UiItem::HBargraph(b) | UiItem::VBargraph(b) => (b.address.as_str(), b.index),
                    UiItem::Unsupported => continue,
                };
                v.check(address, index);
                if !v.seen.insert(address) && v.error.is_none() {
                    v.error = Some(MetadataError::DuplicatePath(address.to_string()));
                }
            }
        }

        let mut validator = Validator {
            size: self.size,
            seen: HashSet::new(),
            error: None,
        };
        collect(&self.ui, &mut validator);
        validator.error.map_or(Ok(()), Err)
    }
}

/// Nest an instrument tree and an effect tree as two panels of one document.
///
/// Without an effect the instrument tree is returned unchanged.
pub fn combined_ui(instrument: &[UiItem], effect: Option<&[UiItem]>) -> Vec<UiItem> {
    match effect {
        None => instrument.to_vec(),
        Some(effect) => vec![UiItem::TGroup(Group {
            label: "Sequencer".to_string(),
            items: vec![
                UiItem::VGroup(Group {
                    label: "Instrument".to_string(),
                    items: instrument.to_vec(),
                }),
                UiItem::VGroup(Group {
                    label: "Effect".to_string(),
                    items: effect.to_vec(),
                }),
            ],
        })],
    }
}
