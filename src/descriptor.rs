//! Parameter descriptors and their classification.
//!
//! A compiled module reports one [`ParameterDescriptor`] per exposed parameter.
//! The raw type tag the module uses (`"hslider"`, `"button"`, ...) is mapped to a
//! [`ControlShape`] once, when the descriptor is built, so nothing downstream
//! ever looks at the tag string again.
//!
//! Classification answers two questions for each descriptor:
//! - which kind of port should represent it ([`ControlShape`])
//! - whether note events drive it instead of its own port ([`is_voice_controlled`])

use hashbrown::HashMap;

/// Annotation key that marks a parameter as driven by note events.
pub const VOICE_ANNOTATION: &str = "midi";

/// How a parameter's port behaves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlShape {
    /// A value that can take any number in its range (sliders, number entries)
    #[default]
    Continuous,
    /// Button-like: fires a 1, then resets to 0 after the pulse width
    Momentary,
    /// Checkbox-like: flips the value the module currently holds
    Toggle,
}

impl ControlShape {
    /// Map a module type tag to a shape. Unknown tags are [`ControlShape::Continuous`].
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "button" => ControlShape::Momentary,
            "checkbox" => ControlShape::Toggle,
            _ => ControlShape::Continuous,
        }
    }

    /// `true` for shapes represented by a trigger port rather than a value port
    #[inline]
    pub fn is_discrete(&self) -> bool {
        matches!(self, ControlShape::Momentary | ControlShape::Toggle)
    }
}

/// Role a reserved parameter name plays in polyphonic dispatch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VoiceRole {
    /// `freq` / `key`
    Frequency,
    /// `gate`
    Gate,
    /// `gain` / `vel` / `velocity`
    Velocity,
}

/// The reserved vocabulary recognised under the polyphonic convention.
pub fn voice_role(label: &str) -> Option<VoiceRole> {
    match label {
        "freq" | "key" => Some(VoiceRole::Frequency),
        "gate" => Some(VoiceRole::Gate),
        "gain" | "vel" | "velocity" => Some(VoiceRole::Velocity),
        _ => None,
    }
}

/// Whether the module is run with one voice or a bank of voices.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VoiceMode {
    #[default]
    Monophonic,
    Polyphonic,
}

/// Static metadata for one parameter of one module instance.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterDescriptor {
    /// Hierarchical path, unique within one module instance (e.g. `/dsp/freq`)
    pub address: String,
    /// Short display name, used to label the port
    pub label: String,
    pub shape: ControlShape,
    pub annotations: HashMap<String, String>,
}

impl ParameterDescriptor {
    /// Build a descriptor from the module's raw fields.
    ///
    /// An empty `label` falls back to the last segment of `address`.
    pub fn new(address: impl Into<String>, label: impl Into<String>, type_tag: &str) -> Self {
        let address = address.into();
        let mut label = label.into();
        if label.is_empty() {
            label = address
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(address.as_str())
                .to_string();
        }

        Self {
            address,
            label,
            shape: ControlShape::from_type_tag(type_tag),
            annotations: HashMap::new(),
        }
    }

    /// Attach an annotation (builder style)
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// `true` if the author explicitly marked this parameter as note-driven
    pub fn has_voice_annotation(&self) -> bool {
        self.annotations
            .get(VOICE_ANNOTATION)
            .map(|value| is_truthy(value))
            .unwrap_or(false)
    }
}

/// Result of [`classify`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Classification {
    pub shape: ControlShape,
    /// `Some` when the parameter is voice-controlled. The inner role is `None`
    /// for annotated parameters whose label is not in the reserved vocabulary.
    pub voice: Option<Option<VoiceRole>>,
}

impl Classification {
    #[inline]
    pub fn is_voice_controlled(&self) -> bool {
        self.voice.is_some()
    }
}

/// Classify a descriptor under the given voice mode.
pub fn classify(descriptor: &ParameterDescriptor, mode: VoiceMode) -> Classification {
    let voice = is_voice_controlled(descriptor, mode).then(|| voice_role(&descriptor.label));
    Classification {
        shape: descriptor.shape,
        voice,
    }
}

/// Explicit annotation, or a reserved label while running polyphonically.
pub fn is_voice_controlled(descriptor: &ParameterDescriptor, mode: VoiceMode) -> bool {
    descriptor.has_voice_annotation()
        || (mode == VoiceMode::Polyphonic && voice_role(&descriptor.label).is_some())
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "off" | "false" | "0")
}

/// A single module-level option value.
#[derive(Clone, PartialEq, Debug)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Module-level options, declared by the author as `[key:value]` groups.
///
/// ```
/// use wandel::descriptor::ModuleOptions;
///
/// let options = ModuleOptions::parse("[midi:on][nvoices:8]");
/// assert!(options.midi());
/// assert_eq!(options.nvoices(), Some(8));
/// ```
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ModuleOptions {
    entries: Vec<(String, OptionValue)>,
}

impl ModuleOptions {
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find('[') {
            let after = &rest[open + 1..];
            let Some(close) = after.find(']') else {
                break;
            };
            let group = &after[..close];
            rest = &after[close + 1..];

            let Some((key, value)) = group.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                continue;
            }

            let value = match value {
                "on" | "true" => OptionValue::Bool(true),
                "off" | "false" => OptionValue::Bool(false),
                _ => value
                    .parse::<i64>()
                    .map(OptionValue::Int)
                    .unwrap_or_else(|_| OptionValue::Text(value.to_string())),
            };
            entries.push((key.to_string(), value));
        }

        Self { entries }
    }

    /// Last value declared for `key`
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Module asks for note events regardless of voice mode
    pub fn midi(&self) -> bool {
        matches!(self.get("midi"), Some(OptionValue::Bool(true)))
    }

    /// Voice count requested by the module
    pub fn nvoices(&self) -> Option<usize> {
        match self.get("nvoices") {
            Some(OptionValue::Int(n)) if *n > 0 => Some(*n as usize),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
