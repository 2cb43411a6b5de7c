//! Default value functions for configuration.

/// Plain IRC port.
pub const DEFAULT_PORT: u16 = 6667;

/// IRC over TLS port.
pub const DEFAULT_PORT_TLS: u16 = 6697;

pub fn default_command_prefix() -> String {
    "!".to_string()
}

pub fn default_ping_interval() -> u64 {
    90
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_command_rate() -> u32 {
    20
}

pub fn default_port(tls: bool) -> u16 {
    if tls { DEFAULT_PORT_TLS } else { DEFAULT_PORT }
}

/// Login name of the invoking user, if the environment says.
pub fn login_name() -> Option<String> {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
}
