//! Engine configuration.

use std::time::Duration;

/// Default pulse width for momentary controls and voice gates
pub const DEFAULT_PULSE_WIDTH: Duration = Duration::from_millis(20);

/// Velocity used when neither the event nor the module supplies one
pub const DEFAULT_VELOCITY: f32 = 127.0;

/// Tunables shared by every binding an engine creates.
///
/// ```
/// use std::time::Duration;
/// use wandel::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_pulse_width(Duration::from_millis(10))
///     .with_error_category("FaustError");
/// assert_eq!(config.pulse_width, Duration::from_millis(10));
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// How long a momentary control stays at 1 before resetting to 0,
    /// and how long a voice is held before it is released
    pub pulse_width: Duration,
    pub default_velocity: f32,
    /// Category passed to [`PortHost::report_error`](crate::PortHost::report_error)
    pub error_category: String,
    /// Label of the note event port
    pub voice_port_label: String,
    /// Audio input ports are labelled `"{prefix} {index}"`
    pub audio_port_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pulse_width: DEFAULT_PULSE_WIDTH,
            default_velocity: DEFAULT_VELOCITY,
            error_category: "DspError".to_string(),
            voice_port_label: "Midi".to_string(),
            audio_port_prefix: "Audio".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_pulse_width(mut self, pulse_width: Duration) -> Self {
        self.pulse_width = pulse_width;
        self
    }

    pub fn with_default_velocity(mut self, velocity: f32) -> Self {
        self.default_velocity = velocity;
        self
    }

    pub fn with_error_category(mut self, category: impl Into<String>) -> Self {
        self.error_category = category.into();
        self
    }

    pub fn with_voice_port_label(mut self, label: impl Into<String>) -> Self {
        self.voice_port_label = label.into();
        self
    }

    pub fn with_audio_port_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.audio_port_prefix = prefix.into();
        self
    }

    pub(crate) fn audio_port_label(&self, index: usize) -> String {
        format!("{} {}", self.audio_port_prefix, index)
    }
}
