//! Decoder configuration.
//!
//! [`DecoderConfig`] holds every tunable the decoder accepts before
//! initialisation. Values arrive one key at a time through
//! [`DecoderConfig::set`] (the path the public `configure` call takes) or in
//! bulk from a JSON object through [`DecoderConfig::from_json`]. Unknown keys
//! and mistyped values are rejected softly: `set` returns `false` and the
//! config is left as it was, so a caller written against a newer decoder
//! still initialises on an older one.
//!
//! Validation is deferred to [`DecoderConfig::validate`], which runs once at
//! initialisation and reports every problem it finds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::event::EventKind;

// ---------------------------------------------------------------------------
// Config value
// ---------------------------------------------------------------------------

/// A value passed to [`DecoderConfig::set`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
}

impl ConfigValue {
    /// Convert a JSON value, or `None` if it has no config representation
    /// (null, objects, mixed arrays).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(|f| Self::Float(f as f32)),
            },
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => Self::array_from_json(items),
            Value::Null | Value::Object(_) => None,
        }
    }

    fn array_from_json(items: &[Value]) -> Option<Self> {
        if items.is_empty() {
            return Some(Self::IntArray(Vec::new()));
        }
        if let Some(bools) = items.iter().map(Value::as_bool).collect::<Option<Vec<_>>>() {
            return Some(Self::BoolArray(bools));
        }
        let ints = items
            .iter()
            .map(|v| v.as_i64().and_then(|i| i32::try_from(i).ok()))
            .collect::<Option<Vec<_>>>();
        if let Some(ints) = ints {
            return Some(Self::IntArray(ints));
        }
        if let Some(floats) = items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
            return Some(Self::FloatArray(floats.into_iter().map(|f| f as f32).collect()));
        }
        items
            .iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .map(Self::StringArray)
    }
}

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// When the base picture is passed through unenhanced.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassthroughPolicy {
    /// Never pass through; a frame without enhancement data fails.
    Disable = -1,
    /// Pass through only when enhancement data is missing or late.
    #[default]
    Allow = 0,
    /// Always pass through, even when enhancement data is present.
    Force = 1,
}

impl PassthroughPolicy {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Self::Disable),
            0 => Some(Self::Allow),
            1 => Some(Self::Force),
            _ => None,
        }
    }
}

/// How the predicted-average step of upscaling is applied.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictedAverageMethod {
    None = 0,
    #[default]
    Standard = 1,
    /// Approximated inside the upscale kernel.
    BakedIntoKernel = 2,
}

impl PredictedAverageMethod {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Standard),
            2 => Some(Self::BakedIntoKernel),
            _ => None,
        }
    }
}

/// Log verbosity, as configured through `log_level` keys.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Disabled = 0,
    Fatal = 1,
    Error = 2,
    Warning = 3,
    #[default]
    Info = 4,
    Debug = 5,
    Trace = 6,
}

impl LogLevel {
    /// One past the highest valid raw level.
    pub const COUNT: i32 = 7;

    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Fatal),
            2 => Some(Self::Error),
            3 => Some(Self::Warning),
            4 => Some(Self::Info),
            5 => Some(Self::Debug),
            6 => Some(Self::Trace),
            _ => None,
        }
    }
}

/// Parts of the decoder that accept their own `log_level_<name>` key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogComponent {
    Api = 0,
    BufferManager = 1,
    CoreDecoder = 2,
    Decoder = 3,
    DecoderConfig = 4,
    Interface = 5,
    LcevcProcessor = 6,
    Log = 7,
    Picture = 8,
}

impl LogComponent {
    pub const COUNT: usize = 9;

    pub const ALL: [LogComponent; Self::COUNT] = [
        Self::Api,
        Self::BufferManager,
        Self::CoreDecoder,
        Self::Decoder,
        Self::DecoderConfig,
        Self::Interface,
        Self::LcevcProcessor,
        Self::Log,
        Self::Picture,
    ];

    /// Suffix of the component's `log_level_` key.
    pub fn name(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::BufferManager => "buffer_manager",
            Self::CoreDecoder => "core_decoder",
            Self::Decoder => "decoder",
            Self::DecoderConfig => "decoder_config",
            Self::Interface => "interface",
            Self::LcevcProcessor => "lcevc_processor",
            Self::Log => "log",
            Self::Picture => "picture",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Decoder config
// ---------------------------------------------------------------------------

/// Every setting accepted by the decoder, with its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub allow_dithering: bool,
    /// Engine worker threads; -1 lets the engine decide.
    pub core_threads: i32,
    pub disable_simd: bool,
    /// -1 for a random seed.
    pub dither_seed: i32,
    /// -1 to use the strength signalled in the stream.
    pub dither_strength: i32,
    pub enable_logo_overlay: bool,
    /// Raw [`EventKind`] values to deliver. Empty means none.
    pub events: Vec<i32>,
    pub generate_cmdbuffers: bool,
    pub highlight_residuals: bool,
    /// Run the engine in precision mode rather than speed mode.
    pub high_precision: bool,
    /// Global log level, see [`LogLevel`].
    pub log_level: i32,
    /// Per-component log levels, indexed by [`LogComponent`]. The effective
    /// level of a component is the higher of this and `log_level`.
    pub component_log_levels: [i32; LogComponent::COUNT],
    /// Install a stdout log subscriber at initialisation.
    pub log_stdout: bool,
    pub logo_overlay_delay_frames: i32,
    pub logo_overlay_position_x: i32,
    pub logo_overlay_position_y: i32,
    /// Shared capacity of the base, pending output and enhancement data
    /// queues. -1 means unbounded.
    pub loq_unprocessed_cap: i32,
    pub parallel_decode: bool,
    /// Raw [`PassthroughPolicy`].
    pub passthrough_mode: i32,
    /// Raw [`PredictedAverageMethod`].
    pub predicted_average_method: i32,
    /// Residual surface format override: -1 auto, 0 8-bit, otherwise 16-bit.
    pub pss_surface_fp_setting: i32,
    /// Capacity of the results queue. -1 means unbounded.
    pub results_queue_cap: i32,
    /// Sharpening filter strength; negative uses the stream's value.
    pub s_filter_strength: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            allow_dithering: true,
            core_threads: -1,
            disable_simd: false,
            dither_seed: -1,
            dither_strength: -1,
            enable_logo_overlay: false,
            events: Vec::new(),
            generate_cmdbuffers: false,
            highlight_residuals: false,
            high_precision: false,
            log_level: LogLevel::Info as i32,
            component_log_levels: [0; LogComponent::COUNT],
            log_stdout: false,
            logo_overlay_delay_frames: -1,
            logo_overlay_position_x: -1,
            logo_overlay_position_y: -1,
            loq_unprocessed_cap: 100,
            parallel_decode: false,
            passthrough_mode: PassthroughPolicy::Allow as i32,
            predicted_average_method: PredictedAverageMethod::Standard as i32,
            pss_surface_fp_setting: -1,
            results_queue_cap: 24,
            s_filter_strength: -1.0,
        }
    }
}

fn bind_bool(field: &mut bool, value: ConfigValue) -> bool {
    match value {
        ConfigValue::Bool(v) => {
            *field = v;
            true
        }
        _ => false,
    }
}

fn bind_int(field: &mut i32, value: ConfigValue) -> bool {
    match value {
        ConfigValue::Int(v) => {
            *field = v;
            true
        }
        _ => false,
    }
}

fn bind_float(field: &mut f32, value: ConfigValue) -> bool {
    match value {
        ConfigValue::Float(v) => *field = v,
        ConfigValue::Int(v) => *field = v as f32,
        _ => return false,
    }
    true
}

fn bind_int_array(field: &mut Vec<i32>, value: ConfigValue) -> bool {
    match value {
        ConfigValue::IntArray(v) => {
            *field = v;
            true
        }
        _ => false,
    }
}

/// `-1` means unbounded; other negatives are rejected by validation.
fn capacity(raw: i32) -> usize {
    usize::try_from(raw).unwrap_or(usize::MAX)
}

impl DecoderConfig {
    /// Set one setting by name.
    ///
    /// Returns `false`, leaving the config unchanged, when the name is
    /// unknown or the value has the wrong type. Integers are accepted for
    /// float settings.
    pub fn set(&mut self, name: &str, value: ConfigValue) -> bool {
        let bound = match name {
            "allow_dithering" => bind_bool(&mut self.allow_dithering, value),
            "core_threads" => bind_int(&mut self.core_threads, value),
            "disable_simd" => bind_bool(&mut self.disable_simd, value),
            "dither_seed" => bind_int(&mut self.dither_seed, value),
            "dither_strength" => bind_int(&mut self.dither_strength, value),
            "enable_logo_overlay" => bind_bool(&mut self.enable_logo_overlay, value),
            "events" => bind_int_array(&mut self.events, value),
            "generate_cmdbuffers" => bind_bool(&mut self.generate_cmdbuffers, value),
            "highlight_residuals" => bind_bool(&mut self.highlight_residuals, value),
            "high_precision" => bind_bool(&mut self.high_precision, value),
            "log_level" => bind_int(&mut self.log_level, value),
            "log_stdout" => bind_bool(&mut self.log_stdout, value),
            "logo_overlay_delay_frames" => bind_int(&mut self.logo_overlay_delay_frames, value),
            "logo_overlay_position_x" => bind_int(&mut self.logo_overlay_position_x, value),
            "logo_overlay_position_y" => bind_int(&mut self.logo_overlay_position_y, value),
            "loq_unprocessed_cap" => bind_int(&mut self.loq_unprocessed_cap, value),
            "parallel_decode" => bind_bool(&mut self.parallel_decode, value),
            "passthrough_mode" => bind_int(&mut self.passthrough_mode, value),
            "predicted_average_method" => bind_int(&mut self.predicted_average_method, value),
            "pss_surface_fp_setting" => bind_int(&mut self.pss_surface_fp_setting, value),
            "results_queue_cap" => bind_int(&mut self.results_queue_cap, value),
            "s_filter_strength" => bind_float(&mut self.s_filter_strength, value),
            _ => match name.strip_prefix("log_level_").and_then(LogComponent::from_name) {
                Some(component) => {
                    bind_int(&mut self.component_log_levels[component as usize], value)
                }
                None => false,
            },
        };
        if !bound {
            debug!(name, "Config key unknown or value of the wrong type");
        }
        bound
    }

    /// Current value of a setting, or `None` for an unknown name.
    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        use ConfigValue::{Bool, Float, Int, IntArray};
        let value = match name {
            "allow_dithering" => Bool(self.allow_dithering),
            "core_threads" => Int(self.core_threads),
            "disable_simd" => Bool(self.disable_simd),
            "dither_seed" => Int(self.dither_seed),
            "dither_strength" => Int(self.dither_strength),
            "enable_logo_overlay" => Bool(self.enable_logo_overlay),
            "events" => IntArray(self.events.clone()),
            "generate_cmdbuffers" => Bool(self.generate_cmdbuffers),
            "highlight_residuals" => Bool(self.highlight_residuals),
            "high_precision" => Bool(self.high_precision),
            "log_level" => Int(self.log_level),
            "log_stdout" => Bool(self.log_stdout),
            "logo_overlay_delay_frames" => Int(self.logo_overlay_delay_frames),
            "logo_overlay_position_x" => Int(self.logo_overlay_position_x),
            "logo_overlay_position_y" => Int(self.logo_overlay_position_y),
            "loq_unprocessed_cap" => Int(self.loq_unprocessed_cap),
            "parallel_decode" => Bool(self.parallel_decode),
            "passthrough_mode" => Int(self.passthrough_mode),
            "predicted_average_method" => Int(self.predicted_average_method),
            "pss_surface_fp_setting" => Int(self.pss_surface_fp_setting),
            "results_queue_cap" => Int(self.results_queue_cap),
            "s_filter_strength" => Float(self.s_filter_strength),
            _ => {
                let component = name.strip_prefix("log_level_").and_then(LogComponent::from_name)?;
                Int(self.component_log_levels[component as usize])
            }
        };
        Some(value)
    }

    /// Apply every key of a JSON object through [`DecoderConfig::set`].
    ///
    /// Returns the keys that were rejected (unknown, or of an unusable type).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotAnObject`] if `json` is not an object.
    pub fn from_json(&mut self, json: &Value) -> Result<Vec<String>, ConfigError> {
        let object = json.as_object().ok_or_else(|| ConfigError::NotAnObject {
            found: json_type_name(json).to_owned(),
        })?;

        let mut rejected = Vec::new();
        for (key, value) in object {
            let accepted = ConfigValue::from_json(value)
                .map(|v| self.set(key, v))
                .unwrap_or(false);
            if !accepted {
                rejected.push(key.clone());
            }
        }
        Ok(rejected)
    }

    /// Parse `text` as JSON and apply it with [`DecoderConfig::from_json`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] on malformed JSON, or
    /// [`ConfigError::NotAnObject`] if the document is not an object.
    pub fn from_json_str(&mut self, text: &str) -> Result<Vec<String>, ConfigError> {
        let json: Value =
            serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))?;
        self.from_json(&json)
    }

    /// Check every setting, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing each invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.dither_seed != -1 && (self.dither_strength == 0 || !self.allow_dithering) {
            warn!(
                dither_seed = self.dither_seed,
                "Custom dither seed set while dithering is disabled; no dithering will occur"
            );
        }

        if self.dither_strength > 1 && !self.allow_dithering {
            problems.push(format!(
                "dither_strength {} forces dithering while allow_dithering is false",
                self.dither_strength
            ));
        }

        for &event in &self.events {
            if EventKind::from_raw(event).is_none() {
                problems.push(format!(
                    "event type {event} outside [0, {})",
                    EventKind::COUNT
                ));
            }
        }

        if LogLevel::from_raw(self.log_level).is_none() {
            problems.push(format!(
                "log_level {} outside [0, {})",
                self.log_level,
                LogLevel::COUNT
            ));
        }
        for component in LogComponent::ALL {
            let level = self.component_log_levels[component as usize];
            if LogLevel::from_raw(level).is_none() {
                problems.push(format!(
                    "log_level_{} {level} outside [0, {})",
                    component.name(),
                    LogLevel::COUNT
                ));
            }
        }

        if self.loq_unprocessed_cap < -1 {
            problems.push(format!(
                "loq_unprocessed_cap {} is less than -1",
                self.loq_unprocessed_cap
            ));
        }
        if self.results_queue_cap < -1 {
            problems.push(format!(
                "results_queue_cap {} is less than -1",
                self.results_queue_cap
            ));
        }

        if PredictedAverageMethod::from_raw(self.predicted_average_method).is_none() {
            problems.push(format!(
                "predicted_average_method {} outside [0, 3)",
                self.predicted_average_method
            ));
        }
        if PassthroughPolicy::from_raw(self.passthrough_mode).is_none() {
            problems.push(format!(
                "passthrough_mode {} outside [-1, 1]",
                self.passthrough_mode
            ));
        }

        if problems.is_empty() {
            debug!(
                log_level = self.log_level,
                events = ?self.events,
                loq_unprocessed_cap = self.loq_unprocessed_cap,
                results_queue_cap = self.results_queue_cap,
                passthrough_mode = self.passthrough_mode,
                "Decoder config validated"
            );
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    // -- Typed getters ------------------------------------------------------

    pub fn passthrough_policy(&self) -> PassthroughPolicy {
        PassthroughPolicy::from_raw(self.passthrough_mode).unwrap_or_default()
    }

    pub fn predicted_average(&self) -> PredictedAverageMethod {
        PredictedAverageMethod::from_raw(self.predicted_average_method).unwrap_or_default()
    }

    /// Shared capacity of the three input queues.
    pub fn unprocessed_capacity(&self) -> usize {
        capacity(self.loq_unprocessed_cap)
    }

    pub fn results_capacity(&self) -> usize {
        capacity(self.results_queue_cap)
    }

    /// Enable mask over [`EventKind`] built from `events`.
    pub fn event_mask(&self) -> u16 {
        EventKind::mask_from_raw(&self.events)
    }

    pub fn global_log_level(&self) -> LogLevel {
        LogLevel::from_raw(self.log_level).unwrap_or_default()
    }

    /// Effective level of one component: the higher of the global level and
    /// the component's own.
    pub fn log_level_for(&self, component: LogComponent) -> LogLevel {
        let raw = self.log_level.max(self.component_log_levels[component as usize]);
        LogLevel::from_raw(raw).unwrap_or_default()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let cfg = DecoderConfig::default();
        assert_eq!(cfg.loq_unprocessed_cap, 100);
        assert_eq!(cfg.results_queue_cap, 24);
        assert_eq!(cfg.passthrough_policy(), PassthroughPolicy::Allow);
        assert_eq!(cfg.predicted_average(), PredictedAverageMethod::Standard);
        assert_eq!(cfg.global_log_level(), LogLevel::Info);
        assert!(cfg.events.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn every_key_round_trips() {
        let cases = [
            ("allow_dithering", ConfigValue::Bool(false)),
            ("core_threads", ConfigValue::Int(4)),
            ("disable_simd", ConfigValue::Bool(true)),
            ("dither_seed", ConfigValue::Int(7)),
            ("dither_strength", ConfigValue::Int(0)),
            ("enable_logo_overlay", ConfigValue::Bool(true)),
            ("events", ConfigValue::IntArray(vec![1, 5])),
            ("generate_cmdbuffers", ConfigValue::Bool(true)),
            ("highlight_residuals", ConfigValue::Bool(true)),
            ("high_precision", ConfigValue::Bool(true)),
            ("log_level", ConfigValue::Int(6)),
            ("log_stdout", ConfigValue::Bool(true)),
            ("logo_overlay_delay_frames", ConfigValue::Int(10)),
            ("logo_overlay_position_x", ConfigValue::Int(20)),
            ("logo_overlay_position_y", ConfigValue::Int(30)),
            ("loq_unprocessed_cap", ConfigValue::Int(-1)),
            ("parallel_decode", ConfigValue::Bool(true)),
            ("passthrough_mode", ConfigValue::Int(1)),
            ("predicted_average_method", ConfigValue::Int(2)),
            ("pss_surface_fp_setting", ConfigValue::Int(1)),
            ("results_queue_cap", ConfigValue::Int(3)),
            ("s_filter_strength", ConfigValue::Float(0.5)),
            ("log_level_lcevc_processor", ConfigValue::Int(5)),
        ];

        let mut cfg = DecoderConfig::default();
        for (name, value) in cases.clone() {
            assert!(cfg.set(name, value), "{name} rejected");
        }
        for (name, value) in cases {
            assert_eq!(cfg.get(name), Some(value), "{name} did not round trip");
        }
    }

    #[test]
    fn unknown_key_and_wrong_type_are_rejected_softly() {
        let mut cfg = DecoderConfig::default();
        assert!(!cfg.set("no_such_key", ConfigValue::Int(1)));
        assert!(!cfg.set("log_level_nonsense", ConfigValue::Int(1)));
        assert!(!cfg.set("log_stdout", ConfigValue::Int(1)));
        assert!(!cfg.set("events", ConfigValue::FloatArray(vec![1.0])));
        assert_eq!(cfg, DecoderConfig::default());
        assert_eq!(cfg.get("no_such_key"), None);
    }

    #[test]
    fn int_accepted_for_float_key() {
        let mut cfg = DecoderConfig::default();
        assert!(cfg.set("s_filter_strength", ConfigValue::Int(2)));
        assert_eq!(cfg.s_filter_strength, 2.0);
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut cfg = DecoderConfig::default();
        cfg.events = vec![0, 8];
        cfg.log_level = 7;
        cfg.results_queue_cap = -2;
        cfg.passthrough_mode = 2;
        cfg.component_log_levels[LogComponent::Picture as usize] = -1;

        let Err(ConfigError::Invalid { problems }) = cfg.validate() else {
            panic!("expected invalid config");
        };
        assert_eq!(problems.len(), 5, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("log_level_picture")));
    }

    #[test]
    fn forced_dither_without_dithering_is_invalid() {
        let mut cfg = DecoderConfig::default();
        cfg.allow_dithering = false;
        cfg.dither_strength = 3;
        assert!(cfg.validate().is_err());

        // A custom seed with dithering off only warns.
        cfg.dither_strength = -1;
        cfg.dither_seed = 42;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unbounded_capacities() {
        let mut cfg = DecoderConfig::default();
        cfg.loq_unprocessed_cap = -1;
        cfg.results_queue_cap = 0;
        assert_eq!(cfg.unprocessed_capacity(), usize::MAX);
        assert_eq!(cfg.results_capacity(), 0);
    }

    #[test]
    fn component_level_never_lowers_global() {
        let mut cfg = DecoderConfig::default();
        cfg.component_log_levels[LogComponent::Decoder as usize] = LogLevel::Trace as i32;
        cfg.component_log_levels[LogComponent::Picture as usize] = LogLevel::Error as i32;
        assert_eq!(cfg.log_level_for(LogComponent::Decoder), LogLevel::Trace);
        assert_eq!(cfg.log_level_for(LogComponent::Picture), LogLevel::Info);
    }

    #[test]
    fn json_object_applies_known_keys() {
        let mut cfg = DecoderConfig::default();
        let rejected = cfg
            .from_json(&json!({
                "results_queue_cap": 8,
                "events": [2, 3, 4],
                "s_filter_strength": 0.25,
                "high_precision": true,
                "mystery": 1,
                "log_level_decoder": null,
            }))
            .unwrap();

        assert_eq!(cfg.results_queue_cap, 8);
        assert_eq!(cfg.events, vec![2, 3, 4]);
        assert_eq!(cfg.s_filter_strength, 0.25);
        assert!(cfg.high_precision);
        let mut rejected = rejected;
        rejected.sort();
        assert_eq!(rejected, vec!["log_level_decoder".to_string(), "mystery".to_string()]);
    }

    #[test]
    fn json_must_be_an_object() {
        let mut cfg = DecoderConfig::default();
        assert_eq!(
            cfg.from_json(&json!([1, 2])),
            Err(ConfigError::NotAnObject {
                found: "array".into()
            })
        );
        assert!(matches!(
            cfg.from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn json_arrays_pick_narrowest_type() {
        assert_eq!(
            ConfigValue::from_json(&json!([true, false])),
            Some(ConfigValue::BoolArray(vec![true, false]))
        );
        assert_eq!(
            ConfigValue::from_json(&json!([1, 2.5])),
            Some(ConfigValue::FloatArray(vec![1.0, 2.5]))
        );
        assert_eq!(
            ConfigValue::from_json(&json!(["a", "b"])),
            Some(ConfigValue::StringArray(vec!["a".into(), "b".into()]))
        );
        assert_eq!(ConfigValue::from_json(&json!([1, "a"])), None);
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let cfg: DecoderConfig = serde_json::from_value(json!({ "log_level": 2 })).unwrap();
        assert_eq!(cfg.log_level, 2);
        assert_eq!(cfg.loq_unprocessed_cap, 100);
    }
}
