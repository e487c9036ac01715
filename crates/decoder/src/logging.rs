//! Log setup from the decoder config.
//!
//! The decoder only emits `tracing` events. When `log_stdout` is set, a fmt
//! subscriber is installed at the configured levels; a subscriber the host
//! application installed first is left in place.

use lcevc_common::{DecoderConfig, LogComponent, LogLevel};
use tracing_subscriber::EnvFilter;

/// `tracing` target of each component's log output.
pub fn component_target(component: LogComponent) -> &'static str {
    match component {
        LogComponent::Api => "lcevc_decoder::registry",
        LogComponent::BufferManager => "lcevc_decoder::buffer_manager",
        LogComponent::CoreDecoder => "lcevc_decoder::core",
        LogComponent::Decoder => "lcevc_decoder::decoder",
        LogComponent::DecoderConfig => "lcevc_common::config",
        LogComponent::Interface => "lcevc_decoder::layout",
        LogComponent::LcevcProcessor => "lcevc_decoder::lcevc_processor",
        LogComponent::Log => "lcevc_decoder::logging",
        LogComponent::Picture => "lcevc_decoder::picture",
    }
}

fn directive_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Disabled => "off",
        LogLevel::Fatal | LogLevel::Error => "error",
        LogLevel::Warning => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

/// `EnvFilter` directives for `config`: the global level, then one
/// directive per component that logs more than that.
pub fn filter_directives(config: &DecoderConfig) -> String {
    let global = config.global_log_level();
    let mut directives = vec![directive_level(global).to_string()];
    for component in LogComponent::ALL {
        let level = config.log_level_for(component);
        if level != global {
            directives.push(format!(
                "{}={}",
                component_target(component),
                directive_level(level)
            ));
        }
    }
    directives.join(",")
}

/// Install a stdout subscriber if `log_stdout` is set. Returns whether one
/// was installed by this call.
pub fn init_logs(config: &DecoderConfig) -> bool {
    if !config.log_stdout {
        return false;
    }
    let directives = filter_directives(config);
    let filter = match EnvFilter::try_new(&directives) {
        Ok(filter) => filter,
        Err(e) => {
            tracing::warn!(%directives, error = %e, "Invalid log filter, logs not initialised");
            return false;
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
